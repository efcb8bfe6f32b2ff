//! Caller-supplied engine settings and presentation rounding.

use crate::ephemeris::NoaaEphemeris;
use crate::time::add_duration;
use crate::types::EARTH_RADIUS_METERS;
use crate::{Error, Result};
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How an instant is rounded to the minute for display.
///
/// Rounding is never applied inside evaluation; the same instant can be shown with a stringent
/// or a lenient rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum RoundingMode {
    /// Drop the seconds.
    Floor,
    /// Any seconds move to the next minute.
    Ceil,
    /// 30 seconds or more move to the next minute.
    #[default]
    RoundHalfUp,
}

impl RoundingMode {
    /// Rounds `instant` to a whole UTC minute. Zones with whole-minute offsets see the same result
    /// on their local clock.
    ///
    /// # Errors
    /// Returns `InvalidArithmetic` at the edges of the representable range.
    pub fn apply(self, instant: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let minute = TimeDelta::minutes(1);
        let floor = instant
            .duration_trunc(minute)
            .map_err(|error| Error::invalid_arithmetic(error.to_string()))?;

        let round_up = match self {
            Self::Floor => false,
            Self::Ceil => floor != instant,
            Self::RoundHalfUp => instant - floor >= TimeDelta::seconds(30),
        };
        if round_up {
            add_duration(floor, minute)
        } else {
            Ok(floor)
        }
    }
}

/// Engine settings. There are no files or environment variables; callers pass this value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(default, rename_all = "camelCase")
)]
pub struct EngineConfig {
    /// Rounding for presented times.
    pub rounding: RoundingMode,
    /// Earth radius in meters for the horizon dip of elevated sunrise and sunset.
    pub earth_radius_meters: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rounding: RoundingMode::default(),
            earth_radius_meters: EARTH_RADIUS_METERS,
        }
    }
}

impl EngineConfig {
    /// The ephemeris these settings describe.
    #[must_use]
    pub const fn ephemeris(&self) -> NoaaEphemeris {
        NoaaEphemeris::with_earth_radius(self.earth_radius_meters)
    }
}
