//! Calendar and time-scale handling.
//!
//! Julian dates for the solar calculator, the civil [`CalculationDate`] a request is made for, and
//! conversions between fractional minutes and `chrono` durations.

#![allow(clippy::unreadable_literal)]
#![allow(clippy::many_single_char_names)]

use crate::{Error, Result};
use chrono::{
    DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta, TimeZone, Utc,
};
use chrono_tz::Tz;

/// Julian Day Number for J2000.0 epoch (2000-01-01 12:00:00 UTC)
const J2000_JDN: f64 = 2_451_545.0;

/// Days per Julian century
const DAYS_PER_CENTURY: f64 = 36_525.0;

/// Minutes per day
pub const MINUTES_PER_DAY: f64 = 1_440.0;

/// Largest duration the formula language will represent (about 100 years).
const MAX_DURATION_MINUTES: f64 = 100.0 * 366.0 * MINUTES_PER_DAY;

/// Julian date representation for the solar calculator.
///
/// Universal Time based; the mid-precision algorithm does not distinguish TT from UT.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JulianDate {
    jd: f64,
}

impl JulianDate {
    /// Julian date of 0h UT on the given calendar day.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            jd: calculate_julian_date(date.year(), date.month(), date.day(), 0, 0, 0.0),
        }
    }

    /// Creates a Julian date from year, month, day, hour, minute, and second in UTC.
    ///
    /// # Errors
    /// Returns `InvalidDate` if the day does not exist or a time component is out of range.
    ///
    /// # Example
    /// ```
    /// # use zmanim_engine::time::JulianDate;
    /// let jd = JulianDate::from_utc(2000, 1, 1, 12, 0, 0.0).unwrap();
    /// assert!((jd.julian_date() - 2_451_545.0).abs() < 1e-9);
    /// ```
    pub fn from_utc(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: f64,
    ) -> Result<Self> {
        if NaiveDate::from_ymd_opt(year, month, day).is_none() {
            return Err(Error::invalid_date(format!(
                "{year:04}-{month:02}-{day:02} is not a calendar day"
            )));
        }
        if hour > 23 {
            return Err(Error::invalid_date("hour must be between 0 and 23"));
        }
        if minute > 59 {
            return Err(Error::invalid_date("minute must be between 0 and 59"));
        }
        if !(0.0..60.0).contains(&second) {
            return Err(Error::invalid_date("second must be between 0 and 59.999..."));
        }

        Ok(Self {
            jd: calculate_julian_date(year, month, day, hour, minute, second),
        })
    }

    /// Gets the Julian Date (JD) value.
    #[must_use]
    pub const fn julian_date(&self) -> f64 {
        self.jd
    }

    /// Julian centuries since J2000.0.
    #[must_use]
    pub fn julian_century(&self) -> f64 {
        (self.jd - J2000_JDN) / DAYS_PER_CENTURY
    }

    /// Shifts the date by a (possibly fractional, possibly negative) number of minutes.
    #[must_use]
    pub fn add_minutes(self, minutes: f64) -> Self {
        Self {
            jd: self.jd + minutes / MINUTES_PER_DAY,
        }
    }
}

/// Calculates Julian Date from UTC date/time components.
///
/// Meeus, "Astronomical Algorithms", 2nd edition, chapter 7.
fn calculate_julian_date(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: f64,
) -> f64 {
    let mut y = year;
    let mut m = month as i32;

    // January and February are months 13 and 14 of the previous year
    if m < 3 {
        y -= 1;
        m += 12;
    }

    let d = f64::from(day) + (f64::from(hour) + (f64::from(minute) + second / 60.0) / 60.0) / 24.0;

    let mut jd =
        (365.25 * (f64::from(y) + 4716.0)).floor() + (30.6001 * f64::from(m + 1)).floor() + d - 1524.5;

    // Gregorian calendar correction (JDN 2299161 = 1582-10-15)
    if jd >= 2_299_161.0 {
        let a = (f64::from(y) / 100.0).floor();
        let b = 2.0 - a + (a / 4.0).floor();
        jd += b;
    }

    jd
}

/// A civil calendar day in a known IANA time zone.
///
/// Events are reported as UTC instants; the zone decides which civil day they belong to.
///
/// # Example
/// ```
/// # use zmanim_engine::time::CalculationDate;
/// let date = CalculationDate::parse("2024-06-21", "Asia/Jerusalem").unwrap();
/// assert_eq!(date.day_of_year(), 173);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CalculationDate {
    date: NaiveDate,
    timezone: Tz,
}

impl CalculationDate {
    /// Creates a calculation date.
    #[must_use]
    pub const fn new(date: NaiveDate, timezone: Tz) -> Self {
        Self { date, timezone }
    }

    /// Parses an ISO `YYYY-MM-DD` date and an IANA zone identifier.
    ///
    /// # Errors
    /// Returns `InvalidDate` for a malformed date and `UnknownTimezone` for an unknown zone.
    pub fn parse(date: &str, timezone: &str) -> Result<Self> {
        let date = date
            .parse::<NaiveDate>()
            .map_err(|e| Error::invalid_date(format!("`{date}`: {e}")))?;
        let timezone = parse_timezone(timezone)?;
        Ok(Self { date, timezone })
    }

    /// The civil date.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    /// The time zone.
    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Calendar month, 1 to 12.
    #[must_use]
    pub fn month(&self) -> u32 {
        self.date.month()
    }

    /// Day of month, 1 to 31.
    #[must_use]
    pub fn day(&self) -> u32 {
        self.date.day()
    }

    /// Day of year, 1 to 366.
    #[must_use]
    pub fn day_of_year(&self) -> u32 {
        self.date.ordinal()
    }

    /// Calendar year.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    /// Start of the civil day. When midnight falls into a DST gap the first valid instant is used.
    ///
    /// # Errors
    /// Returns `InvalidDate` when the instant falls outside chrono's range.
    pub fn local_midnight(&self) -> Result<DateTime<Utc>> {
        self.first_valid_instant(self.date.and_time(NaiveTime::MIN))
    }

    /// Local 12:00 of the civil day as a UTC instant.
    ///
    /// # Errors
    /// Returns `InvalidDate` when the instant falls outside chrono's range.
    pub fn local_noon(&self) -> Result<DateTime<Utc>> {
        let noon = self
            .date
            .and_hms_opt(12, 0, 0)
            .ok_or_else(|| self.out_of_range())?;
        self.first_valid_instant(noon)
    }

    /// Converts an instant to this date's zone.
    #[must_use]
    pub fn to_local(&self, instant: DateTime<Utc>) -> DateTime<Tz> {
        instant.with_timezone(&self.timezone)
    }

    /// Same zone, different civil day.
    #[must_use]
    pub const fn with_date(&self, date: NaiveDate) -> Self {
        Self {
            date,
            timezone: self.timezone,
        }
    }

    fn first_valid_instant(&self, local: NaiveDateTime) -> Result<DateTime<Utc>> {
        // Gaps are at most a few hours; probe forward in quarter hours.
        for quarter in 0..16 {
            let Some(probe) = local.checked_add_signed(TimeDelta::minutes(15 * quarter)) else {
                break;
            };
            if let Some(instant) = self.timezone.from_local_datetime(&probe).earliest() {
                return Ok(instant.with_timezone(&Utc));
            }
        }
        let offset = self.timezone.offset_from_utc_datetime(&local).fix();
        local
            .and_utc()
            .checked_sub_signed(TimeDelta::seconds(i64::from(offset.local_minus_utc())))
            .ok_or_else(|| self.out_of_range())
    }

    fn out_of_range(&self) -> Error {
        Error::invalid_date(format!("{} in {} is out of range", self.date, self.timezone))
    }
}

/// Parses an IANA time zone identifier.
///
/// # Errors
/// Returns `UnknownTimezone` when the identifier is not in the database.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| Error::unknown_timezone(name))
}

/// 00:00 UTC of a calendar day.
#[must_use]
pub fn utc_day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// Converts fractional minutes to a duration with microsecond precision.
///
/// # Errors
/// Returns `InvalidArithmetic` for non-finite values or durations beyond about a century.
pub fn duration_from_minutes(minutes: f64) -> Result<TimeDelta> {
    if !minutes.is_finite() || minutes.abs() > MAX_DURATION_MINUTES {
        return Err(Error::invalid_arithmetic(format!(
            "duration of {minutes} minutes is out of range"
        )));
    }
    Ok(TimeDelta::microseconds((minutes * 60_000_000.0).round() as i64))
}

/// Length of a duration in fractional minutes.
#[must_use]
pub fn duration_minutes(duration: TimeDelta) -> f64 {
    duration
        .num_microseconds()
        .map_or_else(|| duration.num_milliseconds() as f64 * 1_000.0, |us| us as f64)
        / 60_000_000.0
}

/// Adds a duration to an instant.
///
/// # Errors
/// Returns `InvalidArithmetic` if the result leaves chrono's representable range.
pub fn add_duration(instant: DateTime<Utc>, duration: TimeDelta) -> Result<DateTime<Utc>> {
    instant
        .checked_add_signed(duration)
        .ok_or_else(|| Error::invalid_arithmetic("instant out of range"))
}

/// An instant a fractional number of minutes after 00:00 UTC of `day`.
///
/// # Errors
/// Returns `InvalidArithmetic` when the minutes are not finite or out of range.
pub fn utc_instant(day: NaiveDate, minutes: f64) -> Result<DateTime<Utc>> {
    add_duration(utc_day_start(day), duration_from_minutes(minutes)?)
}
