//! Formula evaluation.
//!
//! [`evaluate`] walks an [`Expression`] against an [`EvaluationContext`]. Evaluation is pure:
//! solar events come from the context's [`Ephemeris`] and references from its
//! [`ReferenceResolver`], so the same expression and context always produce the same instant.

use crate::ephemeris::Ephemeris;
use crate::formula::{
    BinaryOp, CalendarField, Comparison, Condition, DayFrame, Expression, ExtremumKind, Operand,
};
use crate::time::{CalculationDate, add_duration, duration_from_minutes, duration_minutes};
use crate::types::{Direction, GeoLocation, Horizon, SolarDayFrame, SolarEvent, Season};
use crate::{Error, Result};
use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use std::collections::{BTreeMap, HashMap};

/// Resolves `@key` references to the instants of other zmanim.
pub trait ReferenceResolver {
    /// The instant computed for `key`.
    ///
    /// # Errors
    /// `UnknownReference` when `key` is not defined, otherwise the referenced zman's own failure.
    fn resolve(&self, key: &str) -> Result<DateTime<Utc>>;
}

/// Resolver for standalone formulas: every reference is unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReferences;

impl ReferenceResolver for NoReferences {
    fn resolve(&self, key: &str) -> Result<DateTime<Utc>> {
        Err(Error::unknown_reference(key))
    }
}

impl ReferenceResolver for HashMap<String, Result<DateTime<Utc>>> {
    fn resolve(&self, key: &str) -> Result<DateTime<Utc>> {
        self.get(key)
            .cloned()
            .unwrap_or_else(|| Err(Error::unknown_reference(key)))
    }
}

impl ReferenceResolver for BTreeMap<String, Result<DateTime<Utc>>> {
    fn resolve(&self, key: &str) -> Result<DateTime<Utc>> {
        self.get(key)
            .cloned()
            .unwrap_or_else(|| Err(Error::unknown_reference(key)))
    }
}

static NO_REFERENCES: NoReferences = NoReferences;

/// Everything a formula may observe: the civil date, the location, an ephemeris and the other
/// zmanim of the batch.
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    date: CalculationDate,
    location: GeoLocation,
    ephemeris: &'a dyn Ephemeris,
    references: &'a dyn ReferenceResolver,
}

impl core::fmt::Debug for EvaluationContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("date", &self.date)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl<'a> EvaluationContext<'a> {
    /// Context without references; `@key` fails with `UnknownReference`.
    pub fn new(date: CalculationDate, location: GeoLocation, ephemeris: &'a dyn Ephemeris) -> Self {
        Self {
            date,
            location,
            ephemeris,
            references: &NO_REFERENCES,
        }
    }

    /// Replaces the reference resolver.
    #[must_use]
    pub fn with_references(self, references: &'a dyn ReferenceResolver) -> Self {
        Self { references, ..self }
    }

    /// Calculation date.
    #[must_use]
    pub const fn date(&self) -> &CalculationDate {
        &self.date
    }

    /// Observer location.
    #[must_use]
    pub const fn location(&self) -> &GeoLocation {
        &self.location
    }

    /// Resolves `key` through the context's resolver, attaching `key` to failures.
    ///
    /// # Errors
    /// `UnknownReference` for undefined keys, `ReferenceFailed` wrapping the referenced failure
    /// otherwise.
    pub fn resolve(&self, key: &str) -> Result<DateTime<Utc>> {
        self.references.resolve(key).map_err(|error| {
            if matches!(&error, Error::UnknownReference { key: missing } if missing == key) {
                error
            } else {
                Error::reference_failed(key, error)
            }
        })
    }

    fn event(&self, event: SolarEvent) -> Result<DateTime<Utc>> {
        self.ephemeris.solar_event(&self.date, &self.location, event)
    }

    fn event_on(&self, date: &CalculationDate, event: SolarEvent) -> Result<DateTime<Utc>> {
        self.ephemeris.solar_event(date, &self.location, event)
    }
}

/// Evaluates a time-valued expression.
///
/// # Errors
/// Propagates ephemeris failures (`AngleNotReached`), degenerate day frames, reference failures
/// and arithmetic overflow. Only the taken branch of a conditional is evaluated.
///
/// # Example
/// ```
/// use zmanim_engine::{evaluate, formula, CalculationDate, EvaluationContext, GeoLocation, NoaaEphemeris};
///
/// let date = CalculationDate::parse("2024-06-21", "Asia/Jerusalem").unwrap();
/// let location = GeoLocation::new(31.7683, 35.2137, 750.0).unwrap();
/// let ephemeris = NoaaEphemeris::new();
/// let context = EvaluationContext::new(date, location, &ephemeris);
///
/// let chatzos = evaluate(&formula::parse("midpoint(sunrise, sunset)").unwrap(), &context).unwrap();
/// assert_eq!(date.to_local(chatzos).format("%H:%M").to_string(), "12:41");
/// ```
pub fn evaluate(expression: &Expression, context: &EvaluationContext<'_>) -> Result<DateTime<Utc>> {
    Evaluator { context }.time(expression)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Time(DateTime<Utc>),
    Duration(TimeDelta),
    Number(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Scalar<'s> {
    Number(f64),
    Text(&'s str),
}

struct Evaluator<'c, 'a> {
    context: &'c EvaluationContext<'a>,
}

impl Evaluator<'_, '_> {
    fn time(&self, expression: &Expression) -> Result<DateTime<Utc>> {
        match self.value(expression)? {
            Value::Time(instant) => Ok(instant),
            Value::Duration(_) | Value::Number(_) => Err(Error::invalid_arithmetic(format!(
                "`{expression}` does not produce a time"
            ))),
        }
    }

    fn value(&self, expression: &Expression) -> Result<Value> {
        let context = self.context;
        Ok(match expression {
            Expression::Duration(minutes) => Value::Duration(duration_from_minutes(*minutes)?),
            Expression::Number(n) => Value::Number(*n),
            Expression::Primitive(primitive) => Value::Time(context.event(primitive.solar_event())?),
            Expression::Solar { degrees, direction } => {
                Value::Time(context.event(below_horizon(*degrees, *direction)?)?)
            }
            Expression::SeasonalSolar { degrees, direction } => {
                Value::Time(self.seasonal_solar(*degrees, *direction)?)
            }
            Expression::ProportionalHours { hours, frame } => {
                Value::Time(self.day_frame(frame)?.at_hours(*hours)?)
            }
            Expression::ProportionalMinutes {
                minutes,
                direction,
                geometric,
            } => Value::Time(self.proportional_minutes(*minutes, *direction, *geometric)?),
            Expression::Midpoint(a, b) => {
                Value::Time(SolarDayFrame::new(self.time(a)?, self.time(b)?)?.at_hours(6.0)?)
            }
            Expression::Binary { op, left, right } => {
                arithmetic(*op, self.value(left)?, self.value(right)?)?
            }
            Expression::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.condition(condition)? {
                    self.value(then_branch)?
                } else {
                    self.value(else_branch)?
                }
            }
            Expression::Extremum { kind, operands } => Value::Time(self.extremum(*kind, operands)?),
            Expression::FirstValid(operands) => Value::Time(self.first_valid(operands)?),
            Expression::Reference(key) => Value::Time(context.resolve(key)?),
        })
    }

    fn extremum(&self, kind: ExtremumKind, operands: &[Expression]) -> Result<DateTime<Utc>> {
        let mut best: Option<DateTime<Utc>> = None;
        for operand in operands {
            let instant = self.time(operand)?;
            best = Some(match (best, kind) {
                (None, _) => instant,
                (Some(current), ExtremumKind::Earliest) => current.min(instant),
                (Some(current), ExtremumKind::Latest) => current.max(instant),
            });
        }
        best.ok_or_else(|| Error::invalid_arithmetic("min/max of no operands"))
    }

    fn first_valid(&self, operands: &[Expression]) -> Result<DateTime<Utc>> {
        let mut last_error = Error::invalid_arithmetic("first_valid of no operands");
        for operand in operands {
            match self.time(operand) {
                Ok(instant) => return Ok(instant),
                Err(error) => {
                    log::trace!("first_valid skipping `{operand}`: {error}");
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }

    fn day_frame(&self, frame: &DayFrame) -> Result<SolarDayFrame> {
        let context = self.context;
        let sunrise = || context.event(SolarEvent::crossing(Horizon::Visible, Direction::BeforeSunrise));
        let sunset = || context.event(SolarEvent::crossing(Horizon::Visible, Direction::AfterSunset));
        let degrees = |d: f64| -> Result<(DateTime<Utc>, DateTime<Utc>)> {
            Ok((
                context.event(below_horizon(d, Direction::BeforeSunrise)?)?,
                context.event(below_horizon(d, Direction::AfterSunset)?)?,
            ))
        };

        let (start, end) = match frame {
            DayFrame::Gra => (sunrise()?, sunset()?),
            DayFrame::Mga(minutes) => {
                let offset = duration_from_minutes(f64::from(*minutes))?;
                (offset_before(sunrise()?, offset)?, add_duration(sunset()?, offset)?)
            }
            DayFrame::MgaZmanis(minutes) => {
                let gra = SolarDayFrame::new(sunrise()?, sunset()?)?;
                let offset = duration_from_minutes(
                    duration_minutes(gra.length()) * f64::from(*minutes) / 720.0,
                )?;
                (offset_before(gra.start(), offset)?, add_duration(gra.end(), offset)?)
            }
            DayFrame::MgaDegrees(d) => degrees(*d)?,
            DayFrame::BaalHatanya => degrees(DayFrame::BAAL_HATANYA_DEGREES)?,
            DayFrame::AteretTorah => (
                sunrise()?,
                add_duration(sunset()?, duration_from_minutes(DayFrame::ATERET_TORAH_MINUTES)?)?,
            ),
            DayFrame::Custom { start, end } => (self.time(start)?, self.time(end)?),
        };
        SolarDayFrame::new(start, end)
    }

    /// The equinox offset between the visible horizon and `degrees` below it, scaled by the ratio
    /// of today's day length to the equinox day length.
    fn seasonal_solar(&self, degrees: f64, direction: Direction) -> Result<DateTime<Utc>> {
        let context = self.context;
        let equinox_day = NaiveDate::from_ymd_opt(context.date.year(), 3, 20)
            .ok_or_else(|| Error::invalid_date(format!("no equinox in {}", context.date.year())))?;
        let equinox = context.date.with_date(equinox_day);

        let visible_frame = |date: &CalculationDate| -> Result<SolarDayFrame> {
            SolarDayFrame::new(
                context.event_on(date, SolarEvent::crossing(Horizon::Visible, Direction::BeforeSunrise))?,
                context.event_on(date, SolarEvent::crossing(Horizon::Visible, Direction::AfterSunset))?,
            )
        };
        let today = visible_frame(&context.date)?;
        let reference = visible_frame(&equinox)?;
        let angle = context.event_on(&equinox, below_horizon(degrees, direction)?)?;

        let equinox_offset = match direction {
            Direction::BeforeSunrise => duration_minutes(reference.start() - angle),
            Direction::AfterSunset => duration_minutes(angle - reference.end()),
        };
        let scale = duration_minutes(today.length()) / duration_minutes(reference.length());
        let offset = duration_from_minutes(equinox_offset * scale)?;

        match direction {
            Direction::BeforeSunrise => offset_before(today.start(), offset),
            Direction::AfterSunset => add_duration(today.end(), offset),
        }
    }

    fn proportional_minutes(
        &self,
        minutes: f64,
        direction: Direction,
        geometric: bool,
    ) -> Result<DateTime<Utc>> {
        let horizon = if geometric {
            Horizon::Geometric
        } else {
            Horizon::Visible
        };
        let day = SolarDayFrame::new(
            self.context.event(SolarEvent::crossing(horizon, Direction::BeforeSunrise))?,
            self.context.event(SolarEvent::crossing(horizon, Direction::AfterSunset))?,
        )?;
        let offset = duration_from_minutes(duration_minutes(day.length()) * minutes / 720.0)?;

        match direction {
            Direction::BeforeSunrise => offset_before(day.start(), offset),
            Direction::AfterSunset => add_duration(day.end(), offset),
        }
    }

    fn condition(&self, condition: &Condition) -> Result<bool> {
        Ok(match condition {
            Condition::Compare { left, op, right } => {
                compare(*op, self.scalar(left)?, self.scalar(right)?)?
            }
            Condition::And(a, b) => self.condition(a)? && self.condition(b)?,
            Condition::Or(a, b) => self.condition(a)? || self.condition(b)?,
            Condition::Not(a) => !self.condition(a)?,
        })
    }

    fn scalar<'s>(&self, operand: &'s Operand) -> Result<Scalar<'s>> {
        let date = &self.context.date;
        let location = &self.context.location;
        Ok(match operand {
            Operand::Field(field) => match field {
                CalendarField::Month => Scalar::Number(f64::from(date.month())),
                CalendarField::Day => Scalar::Number(f64::from(date.day())),
                CalendarField::DayOfYear | CalendarField::Date => {
                    Scalar::Number(f64::from(date.day_of_year()))
                }
                CalendarField::Latitude => Scalar::Number(location.latitude()),
                CalendarField::Longitude => Scalar::Number(location.longitude()),
                CalendarField::Elevation => Scalar::Number(location.elevation()),
                CalendarField::Season => {
                    Scalar::Text(Season::of(date.month(), location.latitude()).as_str())
                }
            },
            Operand::Number(n) => Scalar::Number(*n),
            Operand::DayMonth { day, month } => {
                // 29-Feb in a common year falls on 1-Mar
                let first = NaiveDate::from_ymd_opt(date.year(), *month, 1).ok_or_else(|| {
                    Error::invalid_date(format!("month {month} of {}", date.year()))
                })?;
                Scalar::Number(f64::from(first.ordinal() + day - 1))
            }
            Operand::Text(text) => Scalar::Text(text),
        })
    }
}

fn below_horizon(degrees: f64, direction: Direction) -> Result<SolarEvent> {
    Ok(SolarEvent::crossing(Horizon::below_horizon(degrees)?, direction))
}

fn offset_before(instant: DateTime<Utc>, offset: TimeDelta) -> Result<DateTime<Utc>> {
    instant
        .checked_sub_signed(offset)
        .ok_or_else(|| Error::invalid_arithmetic("instant out of range"))
}

fn compare(op: Comparison, left: Scalar<'_>, right: Scalar<'_>) -> Result<bool> {
    match (left, right) {
        (Scalar::Number(a), Scalar::Number(b)) => Ok(op.holds(&a, &b)),
        (Scalar::Text(a), Scalar::Text(b)) => Ok(op.holds(&a, &b)),
        _ => Err(Error::invalid_arithmetic("cannot compare text with a number")),
    }
}

fn scaled(duration: TimeDelta, factor: f64) -> Result<TimeDelta> {
    duration_from_minutes(duration_minutes(duration) * factor)
}

fn finite(n: f64) -> Result<Value> {
    if n.is_finite() {
        Ok(Value::Number(n))
    } else {
        Err(Error::invalid_arithmetic(format!("{n} is not a finite number")))
    }
}

fn arithmetic(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    use Value::{Duration, Number, Time};

    let overflow = || Error::invalid_arithmetic("duration out of range");
    match (op, left, right) {
        (BinaryOp::Add, Time(t), Duration(d)) | (BinaryOp::Add, Duration(d), Time(t)) => {
            add_duration(t, d).map(Time)
        }
        (BinaryOp::Subtract, Time(t), Duration(d)) => offset_before(t, d).map(Time),
        (BinaryOp::Subtract, Time(a), Time(b)) => Ok(Duration(a - b)),
        (BinaryOp::Add, Duration(a), Duration(b)) => a.checked_add(&b).map(Duration).ok_or_else(overflow),
        (BinaryOp::Subtract, Duration(a), Duration(b)) => {
            a.checked_sub(&b).map(Duration).ok_or_else(overflow)
        }
        (BinaryOp::Multiply, Duration(d), Number(n)) | (BinaryOp::Multiply, Number(n), Duration(d)) => {
            scaled(d, n).map(Duration)
        }
        (BinaryOp::Divide, Duration(_), Number(n)) | (BinaryOp::Divide, Number(_), Number(n))
            if n == 0.0 =>
        {
            Err(Error::invalid_arithmetic("division by zero"))
        }
        (BinaryOp::Divide, Duration(d), Number(n)) => scaled(d, n.recip()).map(Duration),
        (BinaryOp::Add, Number(a), Number(b)) => finite(a + b),
        (BinaryOp::Subtract, Number(a), Number(b)) => finite(a - b),
        (BinaryOp::Multiply, Number(a), Number(b)) => finite(a * b),
        (BinaryOp::Divide, Number(a), Number(b)) => finite(a / b),
        (op, left, right) => Err(Error::invalid_arithmetic(format!(
            "cannot apply `{}` to {left:?} and {right:?}",
            op.symbol()
        ))),
    }
}
