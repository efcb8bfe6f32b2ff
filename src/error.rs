//! Error types for zman calculation.
//!
//! Every failure is a value: the evaluator and resolver return one [`Result`] per zman key so a
//! malformed or unreachable zman never aborts the rest of a batch.

use crate::formula::SyntaxError;
use crate::types::{Direction, PolarCondition};
use chrono::{DateTime, Utc};
use core::fmt;
use thiserror::Error;

/// Result type alias for operations in this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur while parsing or evaluating zmanim.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Invalid latitude value (must be between -90 and +90 degrees).
    #[error("invalid latitude {value}° (must be between -90° and +90°)")]
    InvalidLatitude {
        /// The invalid latitude value provided.
        value: f64,
    },
    /// Invalid longitude value (must be between -180 and +180 degrees).
    #[error("invalid longitude {value}° (must be between -180° and +180°)")]
    InvalidLongitude {
        /// The invalid longitude value provided.
        value: f64,
    },
    /// Elevation that is not a finite number of meters.
    #[error("invalid elevation {value} m (must be finite)")]
    InvalidElevation {
        /// The invalid elevation value provided.
        value: f64,
    },
    /// Zenith angle outside [0, 180] degrees.
    #[error("invalid zenith angle {value}° (must be between 0° and 180°)")]
    InvalidZenithAngle {
        /// The invalid zenith angle provided.
        value: f64,
    },
    /// Calendar date that cannot be used for a calculation.
    #[error("invalid date: {message}")]
    InvalidDate {
        /// Description of the date problem.
        message: String,
    },
    /// Time zone identifier not present in the IANA database.
    #[error("unknown time zone `{name}`")]
    UnknownTimezone {
        /// The identifier that failed to resolve.
        name: String,
    },
    /// Formula text does not parse.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    /// The sun does not cross the requested zenith angle on this date at this latitude.
    #[error("sun does not reach zenith {zenith}° {direction} ({condition})")]
    AngleNotReached {
        /// Target zenith angle in degrees.
        zenith: f64,
        /// Which crossing was requested.
        direction: Direction,
        /// Whether the sun stays above or below the angle all day.
        condition: PolarCondition,
    },
    /// A proportional-hour frame whose end is not after its start.
    #[error("degenerate day frame: end {end} is not after start {start}")]
    DegenerateDayFrame {
        /// Frame start.
        start: DateTime<Utc>,
        /// Frame end.
        end: DateTime<Utc>,
    },
    /// A reference to a key absent from the batch.
    #[error("unknown reference `@{key}`")]
    UnknownReference {
        /// The missing key.
        key: String,
    },
    /// A referenced zman failed; carries the referenced key and its failure.
    #[error("reference `@{key}` failed: {source}")]
    ReferenceFailed {
        /// The referenced key.
        key: String,
        /// Why the referenced zman failed.
        source: Box<Error>,
    },
    /// The key participates in a dependency cycle.
    #[error("circular reference: {}", .cycle.join(" -> "))]
    CircularReference {
        /// Cycle path, starting and ending at the reported key.
        cycle: Vec<String>,
    },
    /// Duration overflow, division by zero, or a value of the wrong type at runtime.
    #[error("invalid arithmetic: {message}")]
    InvalidArithmetic {
        /// Description of the arithmetic failure.
        message: String,
    },
}

impl Error {
    /// Creates an invalid latitude error.
    #[must_use]
    pub const fn invalid_latitude(value: f64) -> Self {
        Self::InvalidLatitude { value }
    }

    /// Creates an invalid longitude error.
    #[must_use]
    pub const fn invalid_longitude(value: f64) -> Self {
        Self::InvalidLongitude { value }
    }

    /// Creates an invalid elevation error.
    #[must_use]
    pub const fn invalid_elevation(value: f64) -> Self {
        Self::InvalidElevation { value }
    }

    /// Creates an invalid zenith angle error.
    #[must_use]
    pub const fn invalid_zenith_angle(value: f64) -> Self {
        Self::InvalidZenithAngle { value }
    }

    /// Creates an invalid date error.
    #[must_use]
    pub fn invalid_date(message: impl Into<String>) -> Self {
        Self::InvalidDate {
            message: message.into(),
        }
    }

    /// Creates an unknown time zone error.
    #[must_use]
    pub fn unknown_timezone(name: impl Into<String>) -> Self {
        Self::UnknownTimezone { name: name.into() }
    }

    /// Creates an angle-not-reached error.
    #[must_use]
    pub const fn angle_not_reached(
        zenith: f64,
        direction: Direction,
        condition: PolarCondition,
    ) -> Self {
        Self::AngleNotReached {
            zenith,
            direction,
            condition,
        }
    }

    /// Creates a degenerate day frame error.
    #[must_use]
    pub const fn degenerate_day_frame(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::DegenerateDayFrame { start, end }
    }

    /// Creates an unknown reference error.
    #[must_use]
    pub fn unknown_reference(key: impl Into<String>) -> Self {
        Self::UnknownReference { key: key.into() }
    }

    /// Wraps the failure of a referenced zman.
    #[must_use]
    pub fn reference_failed(key: impl Into<String>, source: Self) -> Self {
        Self::ReferenceFailed {
            key: key.into(),
            source: Box::new(source),
        }
    }

    /// Creates a circular reference error.
    #[must_use]
    pub const fn circular_reference(cycle: Vec<String>) -> Self {
        Self::CircularReference { cycle }
    }

    /// Creates an invalid arithmetic error.
    #[must_use]
    pub fn invalid_arithmetic(message: impl Into<String>) -> Self {
        Self::InvalidArithmetic {
            message: message.into(),
        }
    }

    /// Follows `ReferenceFailed` links down to the failure that started the chain.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        let mut current = self;
        while let Self::ReferenceFailed { source, .. } = current {
            current = source;
        }
        current
    }

    /// Taxonomy kind reported to callers. Reference failures report the kind of their root cause.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ReferenceFailed { source, .. } => source.kind(),
            Self::InvalidLatitude { .. }
            | Self::InvalidLongitude { .. }
            | Self::InvalidElevation { .. }
            | Self::InvalidZenithAngle { .. }
            | Self::InvalidDate { .. }
            | Self::UnknownTimezone { .. } => ErrorKind::InvalidInput,
            Self::Syntax(syntax) if syntax.kind.is_arity_or_range() => ErrorKind::ArityOrRange,
            Self::Syntax(_) => ErrorKind::Syntax,
            Self::AngleNotReached { .. } => ErrorKind::AngleNotReached,
            Self::DegenerateDayFrame { .. } => ErrorKind::DegenerateDayFrame,
            Self::UnknownReference { .. } => ErrorKind::UnknownReference,
            Self::CircularReference { .. } => ErrorKind::CircularReference,
            Self::InvalidArithmetic { .. } => ErrorKind::InvalidArithmetic,
        }
    }
}

/// Failure taxonomy exposed on the calculation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ErrorKind {
    /// Formula text does not parse.
    #[cfg_attr(feature = "serde", serde(rename = "syntax_error"))]
    Syntax,
    /// Solar angle not crossed on this date (polar day or night).
    AngleNotReached,
    /// Proportional-hour frame collapsed or reversed.
    DegenerateDayFrame,
    /// Reference to a key absent from the batch.
    UnknownReference,
    /// Dependency cycle.
    CircularReference,
    /// Wrong argument count or out-of-range literal.
    #[cfg_attr(feature = "serde", serde(rename = "arity_or_range_error"))]
    ArityOrRange,
    /// Invalid location, date, or time zone.
    InvalidInput,
    /// Duration overflow or division by zero.
    InvalidArithmetic,
}

impl ErrorKind {
    /// Stable snake_case identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Syntax => "syntax_error",
            Self::AngleNotReached => "angle_not_reached",
            Self::DegenerateDayFrame => "degenerate_day_frame",
            Self::UnknownReference => "unknown_reference",
            Self::CircularReference => "circular_reference",
            Self::ArityOrRange => "arity_or_range_error",
            Self::InvalidInput => "invalid_input",
            Self::InvalidArithmetic => "invalid_arithmetic",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates latitude is within the valid range (-90 to +90 degrees).
///
/// # Errors
/// Returns `InvalidLatitude` if latitude is outside -90 to +90 degrees.
pub fn check_latitude(latitude: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(Error::invalid_latitude(latitude));
    }
    Ok(())
}

/// Validates longitude is within the valid range (-180 to +180 degrees).
///
/// # Errors
/// Returns `InvalidLongitude` if longitude is outside -180 to +180 degrees.
pub fn check_longitude(longitude: f64) -> Result<()> {
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(Error::invalid_longitude(longitude));
    }
    Ok(())
}

/// Validates both latitude and longitude are within valid ranges.
///
/// # Errors
/// Returns `InvalidLatitude` or `InvalidLongitude` for out-of-range coordinates.
pub fn check_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    check_latitude(latitude)?;
    check_longitude(longitude)?;
    Ok(())
}

/// Validates an elevation in meters. Negative values (Dead Sea, Death Valley) are allowed.
///
/// # Errors
/// Returns `InvalidElevation` if the elevation is not finite.
pub fn check_elevation(elevation: f64) -> Result<()> {
    if !elevation.is_finite() {
        return Err(Error::invalid_elevation(elevation));
    }
    Ok(())
}

/// Validates a zenith angle to be within the range [0, 180] degrees.
///
/// # Errors
/// Returns `InvalidZenithAngle` if the angle is not finite or outside the valid range.
pub fn check_zenith_angle(zenith: f64) -> Result<f64> {
    if !(0.0..=180.0).contains(&zenith) {
        return Err(Error::invalid_zenith_angle(zenith));
    }
    Ok(zenith)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{Position, SyntaxErrorKind};

    #[test]
    fn test_latitude_validation() {
        assert!(check_latitude(0.0).is_ok());
        assert!(check_latitude(90.0).is_ok());
        assert!(check_latitude(-90.0).is_ok());

        assert!(check_latitude(91.0).is_err());
        assert!(check_latitude(-91.0).is_err());
        assert!(check_latitude(f64::NAN).is_err());
        assert!(check_latitude(f64::INFINITY).is_err());
    }

    #[test]
    fn test_longitude_validation() {
        assert!(check_longitude(180.0).is_ok());
        assert!(check_longitude(-180.0).is_ok());
        assert!(check_longitude(35.2137).is_ok());

        assert!(check_longitude(181.0).is_err());
        assert!(check_longitude(f64::NAN).is_err());
    }

    #[test]
    fn test_elevation_validation() {
        assert!(check_elevation(-430.0).is_ok());
        assert!(check_elevation(8848.0).is_ok());
        assert!(check_elevation(f64::NAN).is_err());
        assert!(check_elevation(f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn test_check_zenith_angle() {
        assert!(check_zenith_angle(0.0).is_ok());
        assert!(check_zenith_angle(90.833).is_ok());
        assert!(check_zenith_angle(180.0).is_ok());

        assert!(check_zenith_angle(-1.0).is_err());
        assert!(check_zenith_angle(181.0).is_err());
        assert!(check_zenith_angle(f64::NAN).is_err());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::invalid_latitude(95.0).to_string(),
            "invalid latitude 95° (must be between -90° and +90°)"
        );
        assert_eq!(
            Error::circular_reference(vec!["a".into(), "b".into(), "a".into()]).to_string(),
            "circular reference: a -> b -> a"
        );
        assert_eq!(
            Error::unknown_reference("alos").to_string(),
            "unknown reference `@alos`"
        );
    }

    #[test]
    fn test_reference_failure_reports_root_kind() {
        let polar = Error::angle_not_reached(108.0, Direction::BeforeSunrise, PolarCondition::AlwaysAbove);
        let chained = Error::reference_failed("alos", Error::reference_failed("dawn", polar.clone()));

        assert_eq!(chained.kind(), ErrorKind::AngleNotReached);
        assert_eq!(chained.root_cause(), &polar);
        assert!(chained.to_string().starts_with("reference `@alos` failed"));
    }

    #[test]
    fn test_syntax_kinds() {
        let range = Error::from(SyntaxError::new(
            SyntaxErrorKind::OutOfRange,
            "angle out of range",
            Position::new(1, 7),
        ));
        assert_eq!(range.kind(), ErrorKind::ArityOrRange);

        let token = Error::from(SyntaxError::new(
            SyntaxErrorKind::UnexpectedToken,
            "expected `)`",
            Position::new(2, 1),
        ));
        assert_eq!(token.kind(), ErrorKind::Syntax);
        assert_eq!(ErrorKind::Syntax.as_str(), "syntax_error");
    }
}
