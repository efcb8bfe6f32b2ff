//! Core data types for zman calculations.

use crate::error::{check_coordinates, check_elevation, check_zenith_angle};
use crate::time::{add_duration, duration_from_minutes, duration_minutes};
use crate::{Error, Result};
use chrono::{DateTime, TimeDelta, Utc};
use core::fmt;

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// An observer's position on Earth.
///
/// # Example
/// ```
/// # use zmanim_engine::GeoLocation;
/// let jerusalem = GeoLocation::new(31.7683, 35.2137, 750.0).unwrap();
/// assert_eq!(jerusalem.elevation(), 750.0);
/// assert!(GeoLocation::new(91.0, 0.0, 0.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoLocation {
    latitude: f64,
    longitude: f64,
    elevation: f64,
}

impl GeoLocation {
    /// Creates a location from degrees and meters above sea level.
    ///
    /// # Errors
    /// Returns `InvalidLatitude`, `InvalidLongitude` or `InvalidElevation` for out-of-range values.
    pub fn new(latitude: f64, longitude: f64, elevation: f64) -> Result<Self> {
        check_coordinates(latitude, longitude)?;
        check_elevation(elevation)?;
        Ok(Self {
            latitude,
            longitude,
            elevation,
        })
    }

    /// Latitude in degrees, north positive.
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees, east positive.
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Elevation in meters.
    #[must_use]
    pub const fn elevation(&self) -> f64 {
        self.elevation
    }

    /// Dip of the horizon seen from this elevation, `arccos(R / (R + h))` in degrees.
    ///
    /// Zero at or below sea level.
    #[must_use]
    pub fn horizon_dip(&self, earth_radius: f64) -> f64 {
        if self.elevation <= 0.0 {
            return 0.0;
        }
        crate::math::acos_deg(earth_radius / (earth_radius + self.elevation))
    }
}

/// Which of the two daily crossings of a zenith angle is wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Morning crossing (the sun is rising through the angle).
    BeforeSunrise,
    /// Evening crossing (the sun is setting through the angle).
    AfterSunset,
}

impl Direction {
    /// Canonical formula spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeSunrise => "before_sunrise",
            Self::AfterSunset => "after_sunset",
        }
    }

    /// Sign applied to the hour angle: morning crossings are east of the meridian.
    pub(crate) const fn hour_angle_sign(self) -> f64 {
        match self {
            Self::BeforeSunrise => 1.0,
            Self::AfterSunset => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a zenith angle is never crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolarCondition {
    /// The sun stays closer to the zenith than the angle all day (polar day for that angle).
    AlwaysAbove,
    /// The sun never rises as high as the angle (polar night for that angle).
    AlwaysBelow,
}

impl fmt::Display for PolarCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AlwaysAbove => "sun stays above it all day",
            Self::AlwaysBelow => "sun stays below it all day",
        })
    }
}

/// Predefined zenith angles for horizon crossings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Horizon {
    /// Geometric horizon, sun's center at 90°.
    Geometric,
    /// Visible sunrise/sunset: upper limb on the horizon, refraction included (90.833°).
    Visible,
    /// Civil twilight (sun 6° below the horizon).
    CivilTwilight,
    /// Nautical twilight (sun 12° below the horizon).
    NauticalTwilight,
    /// Astronomical twilight (sun 18° below the horizon).
    AstronomicalTwilight,
    /// Arbitrary zenith angle in degrees.
    Custom(f64),
}

impl Horizon {
    /// Zenith angle in degrees for this horizon definition.
    #[must_use]
    pub const fn zenith_angle(&self) -> f64 {
        match self {
            Self::Geometric => 90.0,
            Self::Visible => 90.833,
            Self::CivilTwilight => 96.0,
            Self::NauticalTwilight => 102.0,
            Self::AstronomicalTwilight => 108.0,
            Self::Custom(zenith) => *zenith,
        }
    }

    /// Creates a custom horizon with the specified zenith angle.
    ///
    /// # Errors
    /// Returns `InvalidZenithAngle` if the zenith is outside 0 to 180 degrees.
    pub fn custom(zenith: f64) -> Result<Self> {
        check_zenith_angle(zenith).map(Self::Custom)
    }

    /// A horizon `degrees` below the geometric horizon (`zenith = 90 + degrees`).
    ///
    /// # Errors
    /// Returns `InvalidZenithAngle` if the resulting zenith is outside 0 to 180 degrees.
    pub fn below_horizon(degrees: f64) -> Result<Self> {
        Self::custom(90.0 + degrees)
    }
}

impl Eq for Horizon {}

impl core::hash::Hash for Horizon {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        match self {
            Self::Geometric => 0.hash(state),
            Self::Visible => 1.hash(state),
            Self::CivilTwilight => 2.hash(state),
            Self::NauticalTwilight => 3.hash(state),
            Self::AstronomicalTwilight => 4.hash(state),
            Self::Custom(zenith) => {
                5.hash(state);
                // Normalize -0.0 and +0.0 so hashing remains consistent with PartialEq
                let normalized = if *zenith == 0.0 { 0.0 } else { *zenith };
                normalized.to_bits().hash(state);
            }
        }
    }
}

/// A request for the instant the sun crosses a zenith angle.
///
/// # Example
/// ```
/// # use zmanim_engine::{Direction, Horizon, SolarAngleQuery};
/// let alos = SolarAngleQuery::new(Horizon::below_horizon(16.1).unwrap(), Direction::BeforeSunrise);
/// assert!((alos.base_zenith() - 106.1).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SolarAngleQuery {
    horizon: Horizon,
    direction: Direction,
    elevation_adjusted: bool,
}

impl SolarAngleQuery {
    /// Sea-level crossing of `horizon`.
    #[must_use]
    pub const fn new(horizon: Horizon, direction: Direction) -> Self {
        Self {
            horizon,
            direction,
            elevation_adjusted: false,
        }
    }

    /// Same query with the horizon lowered by the observer's horizon dip.
    #[must_use]
    pub const fn with_elevation_adjustment(self) -> Self {
        Self {
            elevation_adjusted: true,
            ..self
        }
    }

    /// The horizon definition.
    #[must_use]
    pub const fn horizon(&self) -> Horizon {
        self.horizon
    }

    /// Morning or evening crossing.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Whether the observer's elevation lowers the horizon.
    #[must_use]
    pub const fn is_elevation_adjusted(&self) -> bool {
        self.elevation_adjusted
    }

    /// Zenith angle before any elevation adjustment.
    #[must_use]
    pub const fn base_zenith(&self) -> f64 {
        self.horizon.zenith_angle()
    }

    /// Zenith angle to solve for at `location`.
    #[must_use]
    pub fn zenith_for(&self, location: &GeoLocation, earth_radius: f64) -> f64 {
        if self.elevation_adjusted {
            self.base_zenith() + location.horizon_dip(earth_radius)
        } else {
            self.base_zenith()
        }
    }
}

/// A solar event the ephemeris can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolarEvent {
    /// Upper transit (`solar_noon`).
    Transit,
    /// Lower transit following the day's upper transit (`solar_midnight`).
    AntiTransit,
    /// Crossing of a zenith angle.
    Crossing(SolarAngleQuery),
}

impl SolarEvent {
    /// Shorthand for a sea-level crossing.
    #[must_use]
    pub const fn crossing(horizon: Horizon, direction: Direction) -> Self {
        Self::Crossing(SolarAngleQuery::new(horizon, direction))
    }
}

/// The (start, end) pair a proportional hour is measured against.
///
/// `end` is always after `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolarDayFrame {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl SolarDayFrame {
    /// Creates a frame.
    ///
    /// # Errors
    /// Returns `DegenerateDayFrame` when `end` is not after `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(Error::degenerate_day_frame(start, end));
        }
        Ok(Self { start, end })
    }

    /// Frame start.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Frame end.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Frame length.
    #[must_use]
    pub fn length(&self) -> TimeDelta {
        self.end - self.start
    }

    /// One twelfth of the frame, in minutes.
    #[must_use]
    pub fn proportional_hour_minutes(&self) -> f64 {
        duration_minutes(self.length()) / 12.0
    }

    /// `start + hours × length / 12`. `hours` may be negative or exceed 12.
    ///
    /// # Errors
    /// Returns `InvalidArithmetic` if the offset overflows.
    pub fn at_hours(&self, hours: f64) -> Result<DateTime<Utc>> {
        let offset = duration_from_minutes(hours * self.proportional_hour_minutes())?;
        add_duration(self.start, offset)
    }
}

/// Meteorological season, hemisphere aware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Season {
    /// December to February in the north.
    Winter,
    /// March to May in the north.
    Spring,
    /// June to August in the north.
    Summer,
    /// September to November in the north.
    Autumn,
}

impl Season {
    /// Season of `month` at `latitude`; the equator counts as northern.
    #[must_use]
    pub const fn of(month: u32, latitude: f64) -> Self {
        let northern = match month {
            3..=5 => Self::Spring,
            6..=8 => Self::Summer,
            9..=11 => Self::Autumn,
            _ => Self::Winter,
        };
        if latitude >= 0.0 {
            northern
        } else {
            northern.opposite()
        }
    }

    const fn opposite(self) -> Self {
        match self {
            Self::Winter => Self::Summer,
            Self::Spring => Self::Autumn,
            Self::Summer => Self::Winter,
            Self::Autumn => Self::Spring,
        }
    }

    /// Lowercase name used in formulas.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Winter => "winter",
            Self::Spring => "spring",
            Self::Summer => "summer",
            Self::Autumn => "autumn",
        }
    }

    /// Parses a lowercase season name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Winter, Self::Spring, Self::Summer, Self::Autumn]
            .into_iter()
            .find(|season| season.as_str() == name)
    }
}
