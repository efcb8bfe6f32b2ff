//! The ephemeris seam: solar events for a civil date at a location.
//!
//! [`Ephemeris`] is the trait the evaluator calls; [`NoaaEphemeris`] implements it with the
//! [`noaa`](crate::noaa) calculator and [`CachedEphemeris`] memoizes any implementation for the
//! lifetime of one calculation batch.

use crate::error::check_zenith_angle;
use crate::noaa;
use crate::time::{
    CalculationDate, JulianDate, MINUTES_PER_DAY, duration_minutes, utc_day_start, utc_instant,
};
use crate::types::{EARTH_RADIUS_METERS, GeoLocation, SolarEvent};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use std::cell::RefCell;
use std::collections::HashMap;

/// Source of solar event instants.
///
/// Implementations must be deterministic: the same `(date, location, event)` always yields the
/// same result.
pub trait Ephemeris {
    /// Computes `event` on `date` at `location`.
    ///
    /// # Errors
    /// Returns `AngleNotReached` when a crossing does not occur, or a validation error for
    /// out-of-range inputs.
    fn solar_event(
        &self,
        date: &CalculationDate,
        location: &GeoLocation,
        event: SolarEvent,
    ) -> Result<DateTime<Utc>>;
}

impl<E: Ephemeris + ?Sized> Ephemeris for &E {
    fn solar_event(
        &self,
        date: &CalculationDate,
        location: &GeoLocation,
        event: SolarEvent,
    ) -> Result<DateTime<Utc>> {
        (**self).solar_event(date, location, event)
    }
}

/// NOAA mid-precision ephemeris.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoaaEphemeris {
    earth_radius: f64,
}

impl Default for NoaaEphemeris {
    fn default() -> Self {
        Self::new()
    }
}

impl NoaaEphemeris {
    /// Ephemeris using the mean Earth radius for elevation adjustments.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            earth_radius: EARTH_RADIUS_METERS,
        }
    }

    /// Ephemeris using a custom Earth radius (meters) for elevation adjustments.
    #[must_use]
    pub const fn with_earth_radius(earth_radius: f64) -> Self {
        Self { earth_radius }
    }

    /// Earth radius used for the horizon dip.
    #[must_use]
    pub const fn earth_radius(&self) -> f64 {
        self.earth_radius
    }

    /// The UTC day whose solar transit lies nearest local noon of the civil date.
    ///
    /// Equal to the civil date except where the zone offset disagrees with the longitude by
    /// more than half a day (Kiribati, Samoa).
    fn solar_day(date: &CalculationDate, location: &GeoLocation) -> Result<NaiveDate> {
        let day = date.date();
        let out_of_range = || Error::invalid_date(format!("{day} is out of range"));
        let transit_seconds = (60.0 * (MINUTES_PER_DAY / 2.0 - 4.0 * location.longitude())) as i64;
        let mean_transit = utc_day_start(day)
            .checked_add_signed(TimeDelta::seconds(transit_seconds))
            .ok_or_else(out_of_range)?;
        let offset_days =
            (duration_minutes(date.local_noon()? - mean_transit) / MINUTES_PER_DAY).round();

        if offset_days == 0.0 {
            return Ok(day);
        }
        day.checked_add_signed(TimeDelta::days(offset_days as i64))
            .ok_or_else(out_of_range)
    }
}

impl Ephemeris for NoaaEphemeris {
    fn solar_event(
        &self,
        date: &CalculationDate,
        location: &GeoLocation,
        event: SolarEvent,
    ) -> Result<DateTime<Utc>> {
        let day = Self::solar_day(date, location)?;
        let jd = JulianDate::from_date(day);

        let minutes = match event {
            SolarEvent::Transit => noaa::transit_minutes(jd, location.longitude()),
            SolarEvent::AntiTransit => noaa::anti_transit_minutes(jd, location.longitude()),
            SolarEvent::Crossing(query) => {
                let zenith = check_zenith_angle(query.zenith_for(location, self.earth_radius))?;
                noaa::crossing_minutes(
                    jd,
                    location.latitude(),
                    location.longitude(),
                    zenith,
                    query.direction(),
                )
                .map_err(|condition| Error::angle_not_reached(zenith, query.direction(), condition))?
            }
        };

        log::trace!(
            "{event:?} on {} at ({}, {}): {minutes:.3} min after {day} 00:00 UTC",
            date.date(),
            location.latitude(),
            location.longitude(),
        );
        utc_instant(day, minutes)
    }
}

/// Computes one solar event with the default NOAA ephemeris.
///
/// # Errors
/// Returns `AngleNotReached` when a crossing does not occur on that date.
///
/// # Example
/// ```
/// # use zmanim_engine::{compute_solar_event, CalculationDate, GeoLocation, SolarEvent};
/// let date = CalculationDate::parse("2024-06-21", "Asia/Jerusalem").unwrap();
/// let jerusalem = GeoLocation::new(31.7683, 35.2137, 750.0).unwrap();
/// let noon = compute_solar_event(&date, &jerusalem, SolarEvent::Transit).unwrap();
/// assert_eq!(date.to_local(noon).format("%H:%M").to_string(), "12:41");
/// ```
pub fn compute_solar_event(
    date: &CalculationDate,
    location: &GeoLocation,
    event: SolarEvent,
) -> Result<DateTime<Utc>> {
    NoaaEphemeris::new().solar_event(date, location, event)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    date: CalculationDate,
    latitude: u64,
    longitude: u64,
    elevation: u64,
    event: SolarEvent,
}

impl CacheKey {
    fn new(date: &CalculationDate, location: &GeoLocation, event: SolarEvent) -> Self {
        Self {
            date: *date,
            latitude: location.latitude().to_bits(),
            longitude: location.longitude().to_bits(),
            elevation: location.elevation().to_bits(),
            event,
        }
    }
}

/// Memoizing wrapper: each distinct query reaches the inner ephemeris once.
///
/// Failures are cached too. Single-threaded by construction; build one per calculation batch.
#[derive(Debug)]
pub struct CachedEphemeris<E> {
    inner: E,
    cache: RefCell<HashMap<CacheKey, Result<DateTime<Utc>>>>,
}

impl<E: Ephemeris> CachedEphemeris<E> {
    /// Wraps an ephemeris with an empty cache.
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Number of distinct queries computed so far.
    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    /// True when nothing has been computed yet.
    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }

    /// Returns the wrapped ephemeris.
    pub fn into_inner(self) -> E {
        self.inner
    }
}

impl<E: Ephemeris> Ephemeris for CachedEphemeris<E> {
    fn solar_event(
        &self,
        date: &CalculationDate,
        location: &GeoLocation,
        event: SolarEvent,
    ) -> Result<DateTime<Utc>> {
        let key = CacheKey::new(date, location, event);
        let cached = self.cache.borrow().get(&key).cloned();
        if let Some(result) = cached {
            return result;
        }

        let result = self.inner.solar_event(date, location, event);
        self.cache.borrow_mut().insert(key, result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, Horizon, PolarCondition};
    use std::cell::Cell;

    struct CountingEphemeris {
        calls: Cell<usize>,
    }

    impl Ephemeris for CountingEphemeris {
        fn solar_event(
            &self,
            date: &CalculationDate,
            location: &GeoLocation,
            event: SolarEvent,
        ) -> Result<DateTime<Utc>> {
            self.calls.set(self.calls.get() + 1);
            NoaaEphemeris::new().solar_event(date, location, event)
        }
    }

    fn jerusalem() -> (CalculationDate, GeoLocation) {
        (
            CalculationDate::parse("2024-06-21", "Asia/Jerusalem").unwrap(),
            GeoLocation::new(31.7683, 35.2137, 750.0).unwrap(),
        )
    }

    #[test]
    fn test_last_representable_date_is_an_error() {
        // Mean transit at 180°W falls on the day after chrono's last date
        let date = CalculationDate::new(NaiveDate::MAX, chrono_tz::Pacific::Pago_Pago);
        let location = GeoLocation::new(-14.28, -180.0, 0.0).unwrap();

        let error = compute_solar_event(&date, &location, SolarEvent::Transit).unwrap_err();
        assert!(matches!(error, Error::InvalidDate { .. }), "{error}");
    }

    #[test]
    fn test_sunrise_sea_level_and_elevated() {
        let (date, location) = jerusalem();
        let sunrise = SolarEvent::crossing(Horizon::Visible, Direction::BeforeSunrise);
        let elevated = match sunrise {
            SolarEvent::Crossing(query) => SolarEvent::Crossing(query.with_elevation_adjustment()),
            _ => unreachable!(),
        };

        let sea_level = compute_solar_event(&date, &location, sunrise).unwrap();
        let high = compute_solar_event(&date, &location, elevated).unwrap();

        assert_eq!(date.to_local(sea_level).format("%H:%M:%S").to_string(), "05:34:14");
        let gain = duration_minutes(sea_level - high);
        assert!((4.0..5.5).contains(&gain), "elevation moved sunrise by {gain} min");
    }

    #[test]
    fn test_angle_not_reached_at_midnight_sun() {
        let date = CalculationDate::parse("2024-06-21", "Europe/Oslo").unwrap();
        let tromso = GeoLocation::new(69.65, 18.96, 0.0).unwrap();
        let result = compute_solar_event(
            &date,
            &tromso,
            SolarEvent::crossing(Horizon::Visible, Direction::AfterSunset),
        );

        assert_eq!(
            result,
            Err(Error::angle_not_reached(90.833, Direction::AfterSunset, PolarCondition::AlwaysAbove))
        );
    }

    #[test]
    fn test_date_line_zone_keeps_civil_date() {
        let date = CalculationDate::parse("2024-03-20", "Pacific/Kiritimati").unwrap();
        let kiritimati = GeoLocation::new(1.87, -157.4, 0.0).unwrap();

        for event in [
            SolarEvent::Transit,
            SolarEvent::crossing(Horizon::Visible, Direction::BeforeSunrise),
            SolarEvent::crossing(Horizon::Visible, Direction::AfterSunset),
        ] {
            let instant = compute_solar_event(&date, &kiritimati, event).unwrap();
            assert_eq!(date.to_local(instant).date_naive(), date.date(), "{event:?}");
        }
    }

    #[test]
    fn test_cached_ephemeris_computes_each_query_once() {
        let (date, location) = jerusalem();
        let cached = CachedEphemeris::new(CountingEphemeris { calls: Cell::new(0) });
        let sunset = SolarEvent::crossing(Horizon::Visible, Direction::AfterSunset);

        let first = cached.solar_event(&date, &location, sunset).unwrap();
        for _ in 0..10 {
            assert_eq!(cached.solar_event(&date, &location, sunset).unwrap(), first);
        }
        cached.solar_event(&date, &location, SolarEvent::Transit).unwrap();

        assert_eq!(cached.len(), 2);
        assert_eq!(cached.into_inner().calls.get(), 2);
    }

    #[test]
    fn test_cached_ephemeris_keys_on_location() {
        let (date, location) = jerusalem();
        let elsewhere = GeoLocation::new(32.0853, 34.7818, 0.0).unwrap();
        let cached = CachedEphemeris::new(NoaaEphemeris::new());

        let a = cached.solar_event(&date, &location, SolarEvent::Transit).unwrap();
        let b = cached.solar_event(&date, &elsewhere, SolarEvent::Transit).unwrap();
        assert_ne!(a, b);
        assert_eq!(cached.len(), 2);
    }
}
