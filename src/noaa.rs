//! NOAA mid-precision solar calculator.
//!
//! Implements the algorithm behind the NOAA Solar Calculator (Meeus, "Astronomical Algorithms",
//! chapters 25 and 28): Julian century, geometric mean longitude and anomaly, equation of center,
//! apparent longitude, corrected obliquity, declination, equation of time, and the hour angle for a
//! target zenith. Results are minutes after 00:00 UTC of the Julian day passed in; they may be
//! negative or exceed one day.
//!
//! Accuracy is well under a minute for latitudes below ±72° and years 1800 to 2100.

#![allow(clippy::unreadable_literal)]

use crate::math::{
    acos_deg, asin_deg, cos_deg, degrees_to_radians, normalize_degrees_0_to_360, polynomial,
    radians_to_degrees, sin_deg, tan_deg,
};
use crate::time::{JulianDate, MINUTES_PER_DAY};
use crate::types::{Direction, PolarCondition};

/// Minutes of time per degree of longitude.
const MINUTES_PER_DEGREE: f64 = 4.0;

/// 12:00 UTC in minutes.
const NOON_MINUTES: f64 = MINUTES_PER_DAY / 2.0;

/// Sun position quantities needed for event times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarCoordinates {
    /// Apparent declination in degrees.
    pub declination: f64,
    /// Equation of time in minutes (apparent minus mean solar time).
    pub equation_of_time: f64,
}

/// Computes declination and equation of time at a Julian date.
#[must_use]
pub fn solar_coordinates(jd: JulianDate) -> SolarCoordinates {
    let t = jd.julian_century();

    let l0 = geometric_mean_longitude(t);
    let m = geometric_mean_anomaly(t);
    let e = earth_orbit_eccentricity(t);
    let omega = 125.04 - 1934.136 * t;

    let true_longitude = l0 + equation_of_center(t, m);
    let apparent_longitude = true_longitude - 0.00569 - 0.00478 * sin_deg(omega);
    let obliquity = mean_obliquity(t) + 0.00256 * cos_deg(omega);

    SolarCoordinates {
        declination: asin_deg(sin_deg(obliquity) * sin_deg(apparent_longitude)),
        equation_of_time: equation_of_time(l0, m, e, obliquity),
    }
}

fn geometric_mean_longitude(t: f64) -> f64 {
    normalize_degrees_0_to_360(polynomial(&[280.46646, 36000.76983, 0.0003032], t))
}

fn geometric_mean_anomaly(t: f64) -> f64 {
    polynomial(&[357.52911, 35999.05029, -0.0001537], t)
}

fn earth_orbit_eccentricity(t: f64) -> f64 {
    polynomial(&[0.016708634, -0.000042037, -0.0000001267], t)
}

fn equation_of_center(t: f64, m: f64) -> f64 {
    sin_deg(m) * polynomial(&[1.914602, -0.004817, -0.000014], t)
        + sin_deg(2.0 * m) * polynomial(&[0.019993, -0.000101], t)
        + sin_deg(3.0 * m) * 0.000289
}

fn mean_obliquity(t: f64) -> f64 {
    let seconds = polynomial(&[21.448, -46.815, -0.00059, 0.001813], t);
    23.0 + (26.0 + seconds / 60.0) / 60.0
}

/// Equation of time in minutes (Meeus 28.3).
fn equation_of_time(l0: f64, m: f64, e: f64, obliquity: f64) -> f64 {
    let y = tan_deg(obliquity / 2.0).powi(2);
    let l0 = degrees_to_radians(l0);
    let m = degrees_to_radians(m);

    let eot = y * (2.0 * l0).sin() - 2.0 * e * m.sin()
        + 4.0 * e * y * m.sin() * (2.0 * l0).cos()
        - 0.5 * y * y * (4.0 * l0).sin()
        - 1.25 * e * e * (2.0 * m).sin();

    radians_to_degrees(eot) * MINUTES_PER_DEGREE
}

/// Hour angle in degrees at which the sun's center reaches `zenith`.
///
/// # Errors
/// Returns the polar condition when the zenith is never reached that day.
pub fn hour_angle(
    latitude: f64,
    declination: f64,
    zenith: f64,
) -> core::result::Result<f64, PolarCondition> {
    let numerator = cos_deg(zenith) - sin_deg(latitude) * sin_deg(declination);
    let denominator = cos_deg(latitude) * cos_deg(declination);

    // At the poles the sun's altitude is constant through the day.
    if denominator.abs() < 1e-12 {
        return Err(if numerator > 0.0 {
            PolarCondition::AlwaysBelow
        } else {
            PolarCondition::AlwaysAbove
        });
    }

    let cos_ha = numerator / denominator;
    if cos_ha > 1.0 {
        Err(PolarCondition::AlwaysBelow)
    } else if cos_ha < -1.0 {
        Err(PolarCondition::AlwaysAbove)
    } else {
        Ok(acos_deg(cos_ha))
    }
}

/// Upper transit in minutes after 00:00 UTC of `day`.
///
/// Two passes: the equation of time is re-evaluated at the first estimate.
#[must_use]
pub fn transit_minutes(day: JulianDate, longitude: f64) -> f64 {
    let mean_noon = NOON_MINUTES - MINUTES_PER_DEGREE * longitude;
    let first = mean_noon - solar_coordinates(day.add_minutes(mean_noon)).equation_of_time;
    mean_noon - solar_coordinates(day.add_minutes(first)).equation_of_time
}

/// Lower transit following the upper transit of `day`, in minutes after 00:00 UTC of `day`.
///
/// The equation of time is evaluated at the anti-transit itself, i.e. on the following day.
#[must_use]
pub fn anti_transit_minutes(day: JulianDate, longitude: f64) -> f64 {
    let mean_midnight = MINUTES_PER_DAY - MINUTES_PER_DEGREE * longitude;
    let estimate = transit_minutes(day, longitude) + NOON_MINUTES;
    let first = mean_midnight - solar_coordinates(day.add_minutes(estimate)).equation_of_time;
    mean_midnight - solar_coordinates(day.add_minutes(first)).equation_of_time
}

/// Crossing of `zenith` in minutes after 00:00 UTC of `day`.
///
/// The first pass uses the sun's position at mean noon; the second refines it at the first
/// estimate.
///
/// # Errors
/// Returns the polar condition when either pass finds the zenith unreachable.
pub fn crossing_minutes(
    day: JulianDate,
    latitude: f64,
    longitude: f64,
    zenith: f64,
    direction: Direction,
) -> core::result::Result<f64, PolarCondition> {
    let pass = |minutes: f64| -> core::result::Result<f64, PolarCondition> {
        let coords = solar_coordinates(day.add_minutes(minutes));
        let ha = hour_angle(latitude, coords.declination, zenith)?;
        Ok(NOON_MINUTES
            - MINUTES_PER_DEGREE * (longitude + direction.hour_angle_sign() * ha)
            - coords.equation_of_time)
    };

    let first = pass(NOON_MINUTES - MINUTES_PER_DEGREE * longitude)?;
    pass(first)
}
