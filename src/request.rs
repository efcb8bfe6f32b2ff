//! JSON calculation surface: `{ date, timezone, location, zmanim }` in, `{ key: time | error }` out.

use crate::config::EngineConfig;
use crate::error::ErrorKind;
use crate::resolver::{ZmanCalculator, ZmanDefinition};
use crate::time::{CalculationDate, parse_timezone};
use crate::types::GeoLocation;
use crate::{Error, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Observer position as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationInput {
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
    /// Meters above sea level.
    #[serde(default)]
    pub elevation: f64,
}

/// One formula to evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaInput {
    /// Batch key.
    pub key: String,
    /// Formula source.
    pub formula: String,
    /// Optional label, carried through for callers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// A batch of formulas for one date and place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationRequest {
    /// Civil date, `YYYY-MM-DD`.
    pub date: NaiveDate,
    /// IANA time zone of the civil date and of the returned times.
    pub timezone: String,
    /// Observer position.
    pub location: LocationInput,
    /// Formulas keyed by `key`.
    #[serde(alias = "defs")]
    pub zmanim: Vec<FormulaInput>,
    /// Engine settings; defaults apply when omitted.
    #[serde(default)]
    pub config: EngineConfig,
}

/// Result for one key: a local time or a tagged failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ZmanOutcome {
    /// Rounded local time with its UTC offset.
    Time(DateTime<FixedOffset>),
    /// Why the zman could not be computed.
    Failed {
        /// Failure category.
        #[serde(rename = "errorKind")]
        error_kind: ErrorKind,
        /// Human-readable detail, including the reference chain for dependent failures.
        detail: String,
    },
}

impl ZmanOutcome {
    /// Outcome describing `error`.
    #[must_use]
    pub fn failed(error: &Error) -> Self {
        Self::Failed {
            error_kind: error.kind(),
            detail: error.to_string(),
        }
    }

    /// The time, when the zman was computed.
    #[must_use]
    pub const fn time(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::Time(time) => Some(time),
            Self::Failed { .. } => None,
        }
    }

    /// The failure category, when the zman failed.
    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Time(_) => None,
            Self::Failed { error_kind, .. } => Some(*error_kind),
        }
    }
}

/// One outcome per requested key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalculationResponse {
    /// Outcomes by key.
    pub results: BTreeMap<String, ZmanOutcome>,
}

impl CalculationRequest {
    /// Evaluates every formula of the request.
    ///
    /// # Errors
    /// Only request-level problems fail the call: an unknown time zone or coordinates out of range.
    /// Per-zman failures are reported inside the response.
    ///
    /// # Example
    /// ```
    /// use zmanim_engine::CalculationRequest;
    ///
    /// let request: CalculationRequest = serde_json::from_str(r#"{
    ///     "date": "2024-06-21",
    ///     "timezone": "Asia/Jerusalem",
    ///     "location": { "latitude": 31.7683, "longitude": 35.2137, "elevation": 750 },
    ///     "zmanim": [
    ///         { "key": "sunrise", "formula": "sunrise" },
    ///         { "key": "broken", "formula": "sunrise +" }
    ///     ]
    /// }"#).unwrap();
    ///
    /// let response = serde_json::to_value(request.calculate().unwrap()).unwrap();
    /// assert_eq!(response["sunrise"], "2024-06-21T05:34:00+03:00");
    /// assert_eq!(response["broken"]["errorKind"], "syntax_error");
    /// ```
    pub fn calculate(&self) -> Result<CalculationResponse> {
        let date = CalculationDate::new(self.date, parse_timezone(&self.timezone)?);
        let location = GeoLocation::new(
            self.location.latitude,
            self.location.longitude,
            self.location.elevation,
        )?;
        let definitions: Vec<ZmanDefinition> = self
            .zmanim
            .iter()
            .map(|input| {
                let definition = ZmanDefinition::new(&input.key, &input.formula);
                match &input.display_name {
                    Some(name) => definition.with_display_name(name),
                    None => definition,
                }
            })
            .collect();

        let calculator = ZmanCalculator::new(self.config.ephemeris());
        let results = calculator
            .evaluate_all(&definitions, &date, &location)
            .into_iter()
            .map(|(key, result)| {
                let outcome = result
                    .and_then(|instant| self.config.rounding.apply(instant))
                    .map_or_else(
                        |error| ZmanOutcome::failed(&error),
                        |instant| ZmanOutcome::Time(date.to_local(instant).fixed_offset()),
                    );
                (key, outcome)
            })
            .collect();

        Ok(CalculationResponse { results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoundingMode;

    fn request(zmanim: &[(&str, &str)]) -> CalculationRequest {
        CalculationRequest {
            date: NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
            timezone: "Asia/Jerusalem".to_owned(),
            location: LocationInput {
                latitude: 31.7683,
                longitude: 35.2137,
                elevation: 750.0,
            },
            zmanim: zmanim
                .iter()
                .map(|(key, formula)| FormulaInput {
                    key: (*key).to_owned(),
                    formula: (*formula).to_owned(),
                    display_name: None,
                })
                .collect(),
            config: EngineConfig::default(),
        }
    }

    #[test]
    fn test_outcomes_per_key() {
        let response = request(&[("netz", "sunrise"), ("cycle", "@cycle + 1min")])
            .calculate()
            .unwrap();

        let netz = response.results["netz"].time().unwrap();
        assert_eq!(netz.format("%H:%M:%S %:z").to_string(), "05:34:00 +03:00");
        assert_eq!(
            response.results["cycle"].error_kind(),
            Some(ErrorKind::CircularReference)
        );
    }

    #[test]
    fn test_rounding_follows_config() {
        let mut ceil = request(&[("netz", "sunrise")]);
        ceil.config.rounding = RoundingMode::Ceil;
        let response = ceil.calculate().unwrap();
        assert_eq!(
            response.results["netz"].time().unwrap().format("%H:%M").to_string(),
            "05:35"
        );
    }

    #[test]
    fn test_request_level_errors() {
        let mut bad_zone = request(&[]);
        bad_zone.timezone = "Mars/Olympus_Mons".to_owned();
        assert_eq!(bad_zone.calculate().unwrap_err().kind(), ErrorKind::InvalidInput);

        let mut bad_latitude = request(&[]);
        bad_latitude.location.latitude = 91.0;
        assert_eq!(bad_latitude.calculate().unwrap_err().kind(), ErrorKind::InvalidInput);
    }
}
