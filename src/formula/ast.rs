//! Formula syntax tree.

use super::lexer::MONTHS;
use crate::types::{Direction, Horizon, SolarAngleQuery, SolarEvent};
use core::fmt;
use std::collections::BTreeSet;

/// Static type of an expression's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// An instant.
    Time,
    /// A signed duration.
    Duration,
    /// A bare number (scale factor).
    Number,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Time => "a time",
            Self::Duration => "a duration",
            Self::Number => "a number",
        })
    }
}

/// Solar events available as bare identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// Visible sunrise at sea level (zenith 90.833°).
    Sunrise,
    /// Visible sunset at sea level.
    Sunset,
    /// Visible sunrise with the horizon lowered for the observer's elevation.
    ElevatedSunrise,
    /// Visible sunset with the horizon lowered for the observer's elevation.
    ElevatedSunset,
    /// Sun's center on the geometric horizon, morning.
    GeometricSunrise,
    /// Sun's center on the geometric horizon, evening.
    GeometricSunset,
    /// Upper transit.
    SolarNoon,
    /// Lower transit after solar noon.
    SolarMidnight,
    /// Sun 6° below the horizon, morning.
    CivilDawn,
    /// Sun 6° below the horizon, evening.
    CivilDusk,
    /// Sun 12° below the horizon, morning.
    NauticalDawn,
    /// Sun 12° below the horizon, evening.
    NauticalDusk,
    /// Sun 18° below the horizon, morning.
    AstronomicalDawn,
    /// Sun 18° below the horizon, evening.
    AstronomicalDusk,
}

impl Primitive {
    const ALL: [(&'static str, Self); 16] = [
        ("sunrise", Self::Sunrise),
        ("sunset", Self::Sunset),
        ("visible_sunrise", Self::Sunrise),
        ("visible_sunset", Self::Sunset),
        ("elevated_sunrise", Self::ElevatedSunrise),
        ("elevated_sunset", Self::ElevatedSunset),
        ("geometric_sunrise", Self::GeometricSunrise),
        ("geometric_sunset", Self::GeometricSunset),
        ("solar_noon", Self::SolarNoon),
        ("solar_midnight", Self::SolarMidnight),
        ("civil_dawn", Self::CivilDawn),
        ("civil_dusk", Self::CivilDusk),
        ("nautical_dawn", Self::NauticalDawn),
        ("nautical_dusk", Self::NauticalDusk),
        ("astronomical_dawn", Self::AstronomicalDawn),
        ("astronomical_dusk", Self::AstronomicalDusk),
    ];

    /// Looks up a primitive by its formula name (aliases included).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|&(_, primitive)| primitive)
    }

    /// Canonical formula name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sunrise => "sunrise",
            Self::Sunset => "sunset",
            Self::ElevatedSunrise => "elevated_sunrise",
            Self::ElevatedSunset => "elevated_sunset",
            Self::GeometricSunrise => "geometric_sunrise",
            Self::GeometricSunset => "geometric_sunset",
            Self::SolarNoon => "solar_noon",
            Self::SolarMidnight => "solar_midnight",
            Self::CivilDawn => "civil_dawn",
            Self::CivilDusk => "civil_dusk",
            Self::NauticalDawn => "nautical_dawn",
            Self::NauticalDusk => "nautical_dusk",
            Self::AstronomicalDawn => "astronomical_dawn",
            Self::AstronomicalDusk => "astronomical_dusk",
        }
    }

    /// The ephemeris query this primitive stands for.
    #[must_use]
    pub const fn solar_event(self) -> SolarEvent {
        use Direction::{AfterSunset as Evening, BeforeSunrise as Morning};

        match self {
            Self::Sunrise => SolarEvent::crossing(Horizon::Visible, Morning),
            Self::Sunset => SolarEvent::crossing(Horizon::Visible, Evening),
            Self::ElevatedSunrise => SolarEvent::Crossing(
                SolarAngleQuery::new(Horizon::Visible, Morning).with_elevation_adjustment(),
            ),
            Self::ElevatedSunset => SolarEvent::Crossing(
                SolarAngleQuery::new(Horizon::Visible, Evening).with_elevation_adjustment(),
            ),
            Self::GeometricSunrise => SolarEvent::crossing(Horizon::Geometric, Morning),
            Self::GeometricSunset => SolarEvent::crossing(Horizon::Geometric, Evening),
            Self::SolarNoon => SolarEvent::Transit,
            Self::SolarMidnight => SolarEvent::AntiTransit,
            Self::CivilDawn => SolarEvent::crossing(Horizon::CivilTwilight, Morning),
            Self::CivilDusk => SolarEvent::crossing(Horizon::CivilTwilight, Evening),
            Self::NauticalDawn => SolarEvent::crossing(Horizon::NauticalTwilight, Morning),
            Self::NauticalDusk => SolarEvent::crossing(Horizon::NauticalTwilight, Evening),
            Self::AstronomicalDawn => SolarEvent::crossing(Horizon::AstronomicalTwilight, Morning),
            Self::AstronomicalDusk => SolarEvent::crossing(Horizon::AstronomicalTwilight, Evening),
        }
    }
}

/// The day a proportional hour is a twelfth of.
#[derive(Debug, Clone, PartialEq)]
pub enum DayFrame {
    /// Sunrise to sunset.
    Gra,
    /// Fixed minutes before sunrise to the same after sunset (`mga` is 72).
    Mga(u32),
    /// `minutes / 720` of the GRA day before sunrise and after sunset.
    MgaZmanis(u32),
    /// Sun this many degrees below the horizon, morning to evening.
    MgaDegrees(f64),
    /// Sun 1.583° below the horizon, morning to evening.
    BaalHatanya,
    /// Sunrise to 40 minutes after sunset.
    AteretTorah,
    /// Arbitrary start and end times.
    Custom {
        /// Frame start.
        start: Box<Expression>,
        /// Frame end.
        end: Box<Expression>,
    },
}

impl DayFrame {
    /// Depression of the sun below the horizon for the `baal_hatanya` frame.
    pub const BAAL_HATANYA_DEGREES: f64 = 1.583;

    /// Minutes after sunset ending the `ateret_torah` frame.
    pub const ATERET_TORAH_MINUTES: f64 = 40.0;

    /// Names accepted by [`DayFrame::named`].
    pub const NAMES: [&'static str; 16] = [
        "gra",
        "mga",
        "mga_60",
        "mga_72",
        "mga_90",
        "mga_96",
        "mga_120",
        "mga_72_zmanis",
        "mga_90_zmanis",
        "mga_96_zmanis",
        "mga_16_1",
        "mga_18",
        "mga_19_8",
        "mga_26",
        "baal_hatanya",
        "ateret_torah",
    ];

    /// Resolves a named frame; `custom(...)` is handled by the parser.
    #[must_use]
    pub fn named(name: &str) -> Option<Self> {
        Some(match name {
            "gra" => Self::Gra,
            "mga" | "mga_72" => Self::Mga(72),
            "mga_60" => Self::Mga(60),
            "mga_90" => Self::Mga(90),
            "mga_96" => Self::Mga(96),
            "mga_120" => Self::Mga(120),
            "mga_72_zmanis" => Self::MgaZmanis(72),
            "mga_90_zmanis" => Self::MgaZmanis(90),
            "mga_96_zmanis" => Self::MgaZmanis(96),
            "mga_16_1" => Self::MgaDegrees(16.1),
            "mga_18" => Self::MgaDegrees(18.0),
            "mga_19_8" => Self::MgaDegrees(19.8),
            "mga_26" => Self::MgaDegrees(26.0),
            "baal_hatanya" => Self::BaalHatanya,
            "ateret_torah" => Self::AteretTorah,
            _ => return None,
        })
    }
}

impl fmt::Display for DayFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gra => f.write_str("gra"),
            Self::Mga(72) => f.write_str("mga"),
            Self::Mga(minutes) => write!(f, "mga_{minutes}"),
            Self::MgaZmanis(minutes) => write!(f, "mga_{minutes}_zmanis"),
            Self::MgaDegrees(degrees) => write!(f, "mga_{}", degrees.to_string().replace('.', "_")),
            Self::BaalHatanya => f.write_str("baal_hatanya"),
            Self::AteretTorah => f.write_str("ateret_torah"),
            Self::Custom { start, end } => write!(f, "custom({start}, {end})"),
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
}

impl BinaryOp {
    /// Result type of `left op right`, or `None` when the combination is not allowed.
    #[must_use]
    pub const fn result_kind(self, left: ValueKind, right: ValueKind) -> Option<ValueKind> {
        use ValueKind::{Duration, Number, Time};

        match (self, left, right) {
            (Self::Add, Time, Duration) | (Self::Add, Duration, Time) => Some(Time),
            (Self::Subtract, Time, Duration) => Some(Time),
            (Self::Subtract, Time, Time) => Some(Duration),
            (Self::Add | Self::Subtract, Duration, Duration) => Some(Duration),
            (Self::Multiply, Duration, Number) | (Self::Multiply, Number, Duration) => Some(Duration),
            (Self::Divide, Duration, Number) => Some(Duration),
            (_, Number, Number) => Some(Number),
            _ => None,
        }
    }

    pub(crate) const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
        }
    }

    const fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Subtract => 1,
            Self::Multiply | Self::Divide => 2,
        }
    }
}

/// `min`/`max` selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtremumKind {
    /// The earliest operand (`min`, `earlier_of`).
    Earliest,
    /// The latest operand (`max`, `later_of`).
    Latest,
}

/// Calendar and location scalars available to conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarField {
    /// Month, 1 to 12.
    Month,
    /// Day of month.
    Day,
    /// Day of year.
    DayOfYear,
    /// Day of year, compared with `21-May` style literals.
    Date,
    /// Latitude in degrees.
    Latitude,
    /// Longitude in degrees.
    Longitude,
    /// Elevation in meters.
    Elevation,
    /// `"winter"`, `"spring"`, `"summer"` or `"autumn"`, hemisphere aware.
    Season,
}

impl CalendarField {
    /// Looks up a field by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "month" => Self::Month,
            "day" => Self::Day,
            "day_of_year" => Self::DayOfYear,
            "date" => Self::Date,
            "latitude" => Self::Latitude,
            "longitude" => Self::Longitude,
            "elevation" => Self::Elevation,
            "season" => Self::Season,
            _ => return None,
        })
    }

    /// Formula name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Month => "month",
            Self::Day => "day",
            Self::DayOfYear => "day_of_year",
            Self::Date => "date",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
            Self::Elevation => "elevation",
            Self::Season => "season",
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
}

impl Comparison {
    /// Applies the comparison to two ordered values.
    #[must_use]
    pub fn holds<T: PartialOrd>(self, left: &T, right: &T) -> bool {
        match self {
            Self::Less => left < right,
            Self::LessEqual => left <= right,
            Self::Greater => left > right,
            Self::GreaterEqual => left >= right,
            Self::Equal => left == right,
            Self::NotEqual => left != right,
        }
    }

    /// Only `==` and `!=` apply to text.
    #[must_use]
    pub const fn is_equality(self) -> bool {
        matches!(self, Self::Equal | Self::NotEqual)
    }

    pub(crate) const fn symbol(self) -> &'static str {
        match self {
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
        }
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A calendar or location scalar.
    Field(CalendarField),
    /// Numeric literal.
    Number(f64),
    /// `21-May`, compared as a day of the calculation year.
    DayMonth {
        /// Day of month.
        day: u32,
        /// Month, 1 to 12.
        month: u32,
    },
    /// String literal.
    Text(String),
}

impl Operand {
    /// True for operands that compare as text.
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text(_) | Self::Field(CalendarField::Season))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(field) => f.write_str(field.name()),
            Self::Number(n) => write!(f, "{n}"),
            Self::DayMonth { day, month } => write!(f, "{day}-{}", MONTHS[*month as usize - 1]),
            Self::Text(text) => write!(f, "\"{text}\""),
        }
    }
}

/// Boolean condition over calendar and location scalars.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `left op right`
    Compare {
        /// Left operand.
        left: Operand,
        /// Operator.
        op: Comparison,
        /// Right operand.
        right: Operand,
    },
    /// `a && b`
    And(Box<Condition>, Box<Condition>),
    /// `a || b`
    Or(Box<Condition>, Box<Condition>),
    /// `!a`
    Not(Box<Condition>),
}

impl Condition {
    /// Height of the condition tree; a comparison is 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Compare { .. } => 1,
            Self::And(a, b) | Self::Or(a, b) => 1 + a.depth().max(b.depth()),
            Self::Not(a) => 1 + a.depth(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { left, op, right } => write!(f, "{left} {} {right}", op.symbol()),
            Self::And(a, b) => write!(f, "({a} && {b})"),
            Self::Or(a, b) => write!(f, "({a} || {b})"),
            Self::Not(a) => write!(f, "!({a})"),
        }
    }
}

/// A parsed formula.
///
/// Immutable once parsed. Every name has been resolved, so evaluation is a plain match per
/// variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Duration literal in minutes.
    Duration(f64),
    /// Bare numeric literal.
    Number(f64),
    /// `sunrise`, `solar_noon`, ...
    Primitive(Primitive),
    /// `solar(degrees, direction)`: sun `degrees` below the horizon.
    Solar {
        /// Degrees below the horizon, 0 to 90.
        degrees: f64,
        /// Morning or evening crossing.
        direction: Direction,
    },
    /// `seasonal_solar(degrees, direction)`: the equinox offset for `degrees`, scaled by day length.
    SeasonalSolar {
        /// Degrees below the horizon, 0 to 90.
        degrees: f64,
        /// Morning or evening crossing.
        direction: Direction,
    },
    /// `proportional_hours(hours, frame)`
    ProportionalHours {
        /// Proportional hours after the frame start; may be negative or exceed 12.
        hours: f64,
        /// The day being divided.
        frame: DayFrame,
    },
    /// `proportional_minutes(minutes, direction)`
    ProportionalMinutes {
        /// Minutes on a 12-hour day, scaled to today's GRA day.
        minutes: f64,
        /// Before sunrise or after sunset.
        direction: Direction,
        /// Anchor on the geometric rather than the visible horizon.
        geometric: bool,
    },
    /// `midpoint(a, b)`
    Midpoint(Box<Expression>, Box<Expression>),
    /// Arithmetic.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
    /// `if (condition) { a } else { b }`
    Conditional {
        /// Calendar condition.
        condition: Condition,
        /// Taken when the condition holds.
        then_branch: Box<Expression>,
        /// Taken otherwise.
        else_branch: Box<Expression>,
    },
    /// `min(...)`, `max(...)`, `earlier_of`, `later_of`
    Extremum {
        /// Earliest or latest.
        kind: ExtremumKind,
        /// At least two time-valued operands.
        operands: Vec<Expression>,
    },
    /// `first_valid(...)`: the first operand that evaluates successfully.
    FirstValid(Vec<Expression>),
    /// `@key`
    Reference(String),
}

impl Expression {
    /// Static type, or `None` for an ill-typed tree (never produced by the parser).
    #[must_use]
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Duration(_) => Some(ValueKind::Duration),
            Self::Number(_) => Some(ValueKind::Number),
            Self::Binary { op, left, right } => op.result_kind(left.kind()?, right.kind()?),
            Self::Conditional {
                then_branch,
                else_branch,
                ..
            } => {
                let kind = then_branch.kind()?;
                (else_branch.kind()? == kind).then_some(kind)
            }
            Self::Primitive(_)
            | Self::Solar { .. }
            | Self::SeasonalSolar { .. }
            | Self::ProportionalHours { .. }
            | Self::ProportionalMinutes { .. }
            | Self::Midpoint(..)
            | Self::Extremum { .. }
            | Self::FirstValid(_)
            | Self::Reference(_) => Some(ValueKind::Time),
        }
    }

    /// Height of the expression tree; literals and solar events are 1.
    ///
    /// Evaluation recurses once per level, so the parser rejects trees deeper than
    /// [`MAX_NESTING_DEPTH`](super::MAX_NESTING_DEPTH).
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + match self {
            Self::Binary { left, right, .. } | Self::Midpoint(left, right) => {
                left.depth().max(right.depth())
            }
            Self::Conditional {
                condition,
                then_branch,
                else_branch,
            } => condition
                .depth()
                .max(then_branch.depth())
                .max(else_branch.depth()),
            Self::ProportionalHours {
                frame: DayFrame::Custom { start, end },
                ..
            } => start.depth().max(end.depth()),
            Self::Extremum { operands, .. } | Self::FirstValid(operands) => {
                operands.iter().map(Self::depth).max().unwrap_or(0)
            }
            Self::Duration(_)
            | Self::Number(_)
            | Self::Primitive(_)
            | Self::Solar { .. }
            | Self::SeasonalSolar { .. }
            | Self::ProportionalHours { .. }
            | Self::ProportionalMinutes { .. }
            | Self::Reference(_) => 0,
        }
    }

    /// Keys referenced with `@`, sorted and deduplicated. Both branches of conditionals count.
    #[must_use]
    pub fn references(&self) -> BTreeSet<&str> {
        let mut keys = BTreeSet::new();
        self.collect_references(&mut keys);
        keys
    }

    fn collect_references<'a>(&'a self, keys: &mut BTreeSet<&'a str>) {
        match self {
            Self::Reference(key) => {
                keys.insert(key.as_str());
            }
            Self::Binary { left, right, .. } | Self::Midpoint(left, right) => {
                left.collect_references(keys);
                right.collect_references(keys);
            }
            Self::Conditional {
                then_branch,
                else_branch,
                ..
            } => {
                then_branch.collect_references(keys);
                else_branch.collect_references(keys);
            }
            Self::ProportionalHours {
                frame: DayFrame::Custom { start, end },
                ..
            } => {
                start.collect_references(keys);
                end.collect_references(keys);
            }
            Self::Extremum { operands, .. } | Self::FirstValid(operands) => {
                for operand in operands {
                    operand.collect_references(keys);
                }
            }
            Self::Duration(_)
            | Self::Number(_)
            | Self::Primitive(_)
            | Self::Solar { .. }
            | Self::SeasonalSolar { .. }
            | Self::ProportionalHours { .. }
            | Self::ProportionalMinutes { .. } => {}
        }
    }

    fn binds_looser_than(&self, op: BinaryOp, right_side: bool) -> bool {
        match self {
            Self::Binary { op: inner, .. } => {
                inner.precedence() < op.precedence()
                    || (right_side && inner.precedence() == op.precedence())
            }
            Self::Conditional { .. } => true,
            _ => false,
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, name: &str, operands: &[Expression]) -> fmt::Result {
    write!(f, "{name}(")?;
    for (i, operand) in operands.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{operand}")?;
    }
    f.write_str(")")
}

fn direction_name(direction: Direction, geometric: bool) -> &'static str {
    match (direction, geometric) {
        (Direction::BeforeSunrise, false) => "before_sunrise",
        (Direction::AfterSunset, false) => "after_sunset",
        (Direction::BeforeSunrise, true) => "before_geometric_sunrise",
        (Direction::AfterSunset, true) => "after_geometric_sunset",
    }
}

/// Renders canonical formula text that parses back to an equal tree.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duration(minutes) if *minutes < 0.0 => write!(f, "-{}min", -minutes),
            Self::Duration(minutes) => write!(f, "{minutes}min"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Primitive(primitive) => f.write_str(primitive.name()),
            Self::Solar { degrees, direction } => write!(f, "solar({degrees}, {direction})"),
            Self::SeasonalSolar { degrees, direction } => {
                write!(f, "seasonal_solar({degrees}, {direction})")
            }
            Self::ProportionalHours { hours, frame } => {
                write!(f, "proportional_hours({hours}, {frame})")
            }
            Self::ProportionalMinutes {
                minutes,
                direction,
                geometric,
            } => write!(
                f,
                "proportional_minutes({minutes}, {})",
                direction_name(*direction, *geometric)
            ),
            Self::Midpoint(a, b) => write!(f, "midpoint({a}, {b})"),
            Self::Binary { op, left, right } => {
                if left.binds_looser_than(*op, false) {
                    write!(f, "({left})")?;
                } else {
                    write!(f, "{left}")?;
                }
                write!(f, " {} ", op.symbol())?;
                if right.binds_looser_than(*op, true) {
                    write!(f, "({right})")
                } else {
                    write!(f, "{right}")
                }
            }
            Self::Conditional {
                condition,
                then_branch,
                else_branch,
            } => write!(f, "if ({condition}) {{ {then_branch} }} else {{ {else_branch} }}"),
            Self::Extremum { kind, operands } => write_list(
                f,
                match kind {
                    ExtremumKind::Earliest => "min",
                    ExtremumKind::Latest => "max",
                },
                operands,
            ),
            Self::FirstValid(operands) => write_list(f, "first_valid", operands),
            Self::Reference(key) => write!(f, "@{key}"),
        }
    }
}
