//! Recursive-descent parser.
//!
//! Precedence, loosest first: `+`/`-`, then `*`/`/`, then unary minus (literals only), then
//! primaries. Every node is typed while it is built, so type errors carry the operator's position.

use super::ast::{
    BinaryOp, CalendarField, Comparison, Condition, DayFrame, Expression, ExtremumKind, Operand,
    Primitive, ValueKind,
};
use super::lexer::{Token, TokenKind, tokenize};
use super::{Position, SyntaxError, SyntaxErrorKind};
use crate::types::{Direction, Season};

type ParseResult<T> = Result<T, SyntaxError>;
type Typed = (Expression, ValueKind);

/// Deepest nesting the parser accepts, counting parentheses, calls, conditionals and each link of
/// an operator chain. Evaluation recurses once per level of the resulting tree.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Parses formula source into an expression tree.
///
/// The formula's value must be a time.
///
/// # Errors
/// Returns a [`SyntaxError`] located at the offending token.
pub fn parse(source: &str) -> Result<Expression, SyntaxError> {
    let mut parser = Parser::new(tokenize(source)?);
    let start = parser.peek().position;
    let (expression, kind) = parser.expression()?;

    if parser.peek().kind != TokenKind::Eof {
        return Err(parser.unexpected("an operator or end of formula"));
    }
    if kind != ValueKind::Time {
        return Err(SyntaxError::new(
            SyntaxErrorKind::TypeMismatch,
            format!("a formula must produce a time, found {kind}"),
            start,
        ));
    }
    Ok(expression)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Solar,
    SeasonalSolar,
    ProportionalHours,
    ProportionalMinutes,
    Midpoint,
    Min,
    Max,
    EarlierOf,
    LaterOf,
    FirstValid,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "solar" => Self::Solar,
            "seasonal_solar" => Self::SeasonalSolar,
            "proportional_hours" => Self::ProportionalHours,
            "proportional_minutes" => Self::ProportionalMinutes,
            "midpoint" => Self::Midpoint,
            "min" => Self::Min,
            "max" => Self::Max,
            "earlier_of" => Self::EarlierOf,
            "later_of" => Self::LaterOf,
            "first_valid" => Self::FirstValid,
            _ => return None,
        })
    }
}

/// A direction argument with the flags its spelling carries.
#[derive(Debug, Clone, Copy)]
struct DirectionArg {
    direction: Direction,
    geometric: bool,
    noon: bool,
    /// Spelled from the daytime side (`after_sunrise`, `before_sunset`); only `solar` takes these.
    daytime_side: bool,
    position: Position,
}

/// `(direction, geometric, noon, daytime_side)` for a direction spelling.
fn direction_from_name(name: &str) -> Option<(Direction, bool, bool, bool)> {
    use Direction::{AfterSunset, BeforeSunrise};

    Some(match name {
        "before_sunrise" | "before_visible_sunrise" => (BeforeSunrise, false, false, false),
        "before_geometric_sunrise" => (BeforeSunrise, true, false, false),
        "after_sunrise" | "after_visible_sunrise" => (BeforeSunrise, false, false, true),
        "after_geometric_sunrise" => (BeforeSunrise, true, false, true),
        "before_noon" => (BeforeSunrise, false, true, false),
        "after_sunset" | "after_visible_sunset" => (AfterSunset, false, false, false),
        "after_geometric_sunset" => (AfterSunset, true, false, false),
        "before_sunset" | "before_visible_sunset" => (AfterSunset, false, false, true),
        "before_geometric_sunset" => (AfterSunset, true, false, true),
        "after_noon" => (AfterSunset, false, true, false),
        _ => return None,
    })
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    /// Open function calls, innermost last.
    calls: Vec<(String, Position)>,
    /// Constructs currently open around the parse position.
    nesting: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            index: 0,
            calls: Vec::new(),
            nesting: 0,
        }
    }

    /// Opens a nested construct starting at `position`.
    fn enter(&mut self, position: Position) -> ParseResult<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING_DEPTH {
            return Err(too_deep(position));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    fn peek(&self) -> &Token {
        // tokenize always ends the stream with Eof and advance never moves past it
        &self.tokens[self.index]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.index += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek().kind == *kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        let matched = self.check(kind);
        if matched {
            self.advance();
        }
        matched
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    /// Error for the current token. Running out of input inside a call reports the call.
    fn unexpected(&self, expected: &str) -> SyntaxError {
        let token = self.peek();
        match (&token.kind, self.calls.last()) {
            (TokenKind::Eof, Some((name, position))) => SyntaxError::new(
                SyntaxErrorKind::UnterminatedCall,
                format!("`{name}(` is never closed"),
                *position,
            ),
            (found, _) => SyntaxError::new(
                SyntaxErrorKind::UnexpectedToken,
                format!("expected {expected}, found {found}"),
                token.position,
            ),
        }
    }

    fn arity_error(&self, arity: usize, found: Option<usize>) -> SyntaxError {
        let name = self.calls.last().map_or("call", |(name, _)| name.as_str());
        let plural = if arity == 1 { "" } else { "s" };
        let message = match found {
            Some(found) => format!("`{name}` takes {arity} argument{plural}, found {found}"),
            None => format!("`{name}` takes {arity} argument{plural}"),
        };
        SyntaxError::new(SyntaxErrorKind::Arity, message, self.peek().position)
    }

    fn expression(&mut self) -> ParseResult<Typed> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => return Ok(left),
            };
            let position = self.advance().position;
            let right = self.term()?;
            left = binary(op, left, right, position)?;
        }
    }

    fn term(&mut self) -> ParseResult<Typed> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                _ => return Ok(left),
            };
            let position = self.advance().position;
            let right = self.unary()?;
            left = binary(op, left, right, position)?;
        }
    }

    fn unary(&mut self) -> ParseResult<Typed> {
        if !self.eat(&TokenKind::Minus) {
            return self.primary();
        }
        match self.peek().kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok((Expression::Number(-n), ValueKind::Number))
            }
            TokenKind::Duration(minutes) => {
                self.advance();
                Ok((Expression::Duration(-minutes), ValueKind::Duration))
            }
            _ => Err(self.unexpected("a number or duration after unary `-`")),
        }
    }

    fn primary(&mut self) -> ParseResult<Typed> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok((Expression::Number(n), ValueKind::Number))
            }
            TokenKind::Duration(minutes) => {
                self.advance();
                Ok((Expression::Duration(minutes), ValueKind::Duration))
            }
            TokenKind::Reference(key) => {
                self.advance();
                Ok((Expression::Reference(key), ValueKind::Time))
            }
            TokenKind::LeftParen => {
                self.advance();
                self.enter(token.position)?;
                let inner = self.expression()?;
                self.expect(&TokenKind::RightParen, "`)`")?;
                self.leave();
                Ok(inner)
            }
            TokenKind::If => self.conditional(),
            TokenKind::Identifier(name) => {
                self.advance();
                if self.check(&TokenKind::LeftParen) {
                    self.call(&name, token.position)
                } else {
                    primitive(&name, token.position)
                }
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn call(&mut self, name: &str, position: Position) -> ParseResult<Typed> {
        let Some(function) = Function::from_name(name) else {
            let message = if name == "custom" {
                "`custom(start, end)` is only valid as a proportional_hours frame".to_owned()
            } else {
                format!("unknown function `{name}`")
            };
            return Err(SyntaxError::new(
                SyntaxErrorKind::UnknownIdentifier,
                message,
                position,
            ));
        };

        self.advance();
        self.enter(position)?;
        self.calls.push((name.to_owned(), position));
        let expression = match function {
            Function::Solar | Function::SeasonalSolar => {
                self.open_arguments(2)?;
                let degrees = self.angle()?;
                self.next_argument(1, 2)?;
                let arg = self.direction()?;
                if function == Function::SeasonalSolar && (arg.daytime_side || arg.noon) {
                    return Err(SyntaxError::new(
                        SyntaxErrorKind::UnknownIdentifier,
                        "seasonal_solar counts before sunrise or after sunset",
                        arg.position,
                    ));
                }
                let direction = arg.direction;
                self.close_call(2)?;
                if function == Function::Solar {
                    Expression::Solar { degrees, direction }
                } else {
                    Expression::SeasonalSolar { degrees, direction }
                }
            }
            Function::ProportionalHours => {
                self.open_arguments(2)?;
                let (hours, _) = self.number()?;
                self.next_argument(1, 2)?;
                let frame = self.day_frame()?;
                self.close_call(2)?;
                Expression::ProportionalHours { hours, frame }
            }
            Function::ProportionalMinutes => {
                self.open_arguments(2)?;
                let (minutes, _) = self.number()?;
                self.next_argument(1, 2)?;
                let arg = self.direction()?;
                if arg.noon || arg.daytime_side {
                    return Err(SyntaxError::new(
                        SyntaxErrorKind::UnknownIdentifier,
                        "proportional_minutes counts before sunrise or after sunset",
                        arg.position,
                    ));
                }
                self.close_call(2)?;
                Expression::ProportionalMinutes {
                    minutes,
                    direction: arg.direction,
                    geometric: arg.geometric,
                }
            }
            Function::Midpoint => {
                let (a, b) = self.two_times()?;
                Expression::Midpoint(Box::new(a), Box::new(b))
            }
            Function::EarlierOf | Function::LaterOf => {
                let (a, b) = self.two_times()?;
                Expression::Extremum {
                    kind: if function == Function::EarlierOf {
                        ExtremumKind::Earliest
                    } else {
                        ExtremumKind::Latest
                    },
                    operands: vec![a, b],
                }
            }
            Function::Min => Expression::Extremum {
                kind: ExtremumKind::Earliest,
                operands: self.time_list()?,
            },
            Function::Max => Expression::Extremum {
                kind: ExtremumKind::Latest,
                operands: self.time_list()?,
            },
            Function::FirstValid => Expression::FirstValid(self.time_list()?),
        };
        self.calls.pop();
        self.leave();
        Ok((bounded(expression, position)?, ValueKind::Time))
    }

    fn open_arguments(&self, arity: usize) -> ParseResult<()> {
        if self.check(&TokenKind::RightParen) {
            Err(self.arity_error(arity, Some(0)))
        } else {
            Ok(())
        }
    }

    /// Consumes the comma before argument `index` of a call taking `arity` arguments.
    fn next_argument(&mut self, index: usize, arity: usize) -> ParseResult<()> {
        match self.peek().kind {
            TokenKind::Comma => {
                self.advance();
                Ok(())
            }
            TokenKind::RightParen => Err(self.arity_error(arity, Some(index))),
            _ => Err(self.unexpected("`,`")),
        }
    }

    fn close_call(&mut self, arity: usize) -> ParseResult<()> {
        match self.peek().kind {
            TokenKind::RightParen => {
                self.advance();
                Ok(())
            }
            TokenKind::Comma => Err(self.arity_error(arity, None)),
            _ => Err(self.unexpected("`)`")),
        }
    }

    fn two_times(&mut self) -> ParseResult<(Expression, Expression)> {
        self.open_arguments(2)?;
        let a = self.time_argument()?;
        self.next_argument(1, 2)?;
        let b = self.time_argument()?;
        self.close_call(2)?;
        Ok((a, b))
    }

    /// Two or more comma-separated times.
    fn time_list(&mut self) -> ParseResult<Vec<Expression>> {
        let mut operands = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                operands.push(self.time_argument()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        if !self.check(&TokenKind::RightParen) {
            return Err(self.unexpected("`,` or `)`"));
        }
        if operands.len() < 2 {
            let name = self.calls.last().map_or("call", |(name, _)| name.as_str());
            return Err(SyntaxError::new(
                SyntaxErrorKind::Arity,
                format!("`{name}` takes at least 2 arguments, found {}", operands.len()),
                self.peek().position,
            ));
        }
        self.advance();
        Ok(operands)
    }

    fn time_argument(&mut self) -> ParseResult<Expression> {
        let position = self.peek().position;
        let (expression, kind) = self.expression()?;
        if kind == ValueKind::Time {
            Ok(expression)
        } else {
            Err(SyntaxError::new(
                SyntaxErrorKind::TypeMismatch,
                format!("expected a time, found {kind}"),
                position,
            ))
        }
    }

    /// Numeric literal with an optional leading minus.
    fn number(&mut self) -> ParseResult<(f64, Position)> {
        let position = self.peek().position;
        let sign = if self.eat(&TokenKind::Minus) { -1.0 } else { 1.0 };
        match self.peek().kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok((sign * n, position))
            }
            _ => Err(self.unexpected("a number")),
        }
    }

    /// Degrees below the horizon, 0 to 90.
    fn angle(&mut self) -> ParseResult<f64> {
        let (degrees, position) = self.number()?;
        if (0.0..=90.0).contains(&degrees) {
            Ok(degrees)
        } else {
            Err(SyntaxError::new(
                SyntaxErrorKind::OutOfRange,
                format!("{degrees}° below the horizon is outside 0 to 90"),
                position,
            ))
        }
    }

    fn direction(&mut self) -> ParseResult<DirectionArg> {
        let token = self.peek().clone();
        let TokenKind::Identifier(name) = token.kind else {
            return Err(self.unexpected("a direction such as `before_sunrise`"));
        };
        let (direction, geometric, noon, daytime_side) = direction_from_name(&name).ok_or_else(|| {
            SyntaxError::new(
                SyntaxErrorKind::UnknownIdentifier,
                format!("unknown direction `{name}`"),
                token.position,
            )
        })?;
        self.advance();
        Ok(DirectionArg {
            direction,
            geometric,
            noon,
            daytime_side,
            position: token.position,
        })
    }

    fn day_frame(&mut self) -> ParseResult<DayFrame> {
        let token = self.peek().clone();
        let TokenKind::Identifier(name) = token.kind else {
            return Err(self.unexpected("a day frame such as `gra`"));
        };
        self.advance();

        if name == "custom" {
            self.expect(&TokenKind::LeftParen, "`(` after `custom`")?;
            self.calls.push((name, token.position));
            let (start, end) = self.two_times()?;
            self.calls.pop();
            return Ok(DayFrame::Custom {
                start: Box::new(start),
                end: Box::new(end),
            });
        }

        DayFrame::named(&name).ok_or_else(|| {
            SyntaxError::new(
                SyntaxErrorKind::UnknownIdentifier,
                format!("unknown day frame `{name}`"),
                token.position,
            )
        })
    }

    /// `if (cond) { a } else { b }`; `else if` chains nest in the else branch.
    fn conditional(&mut self) -> ParseResult<Typed> {
        let position = self.expect(&TokenKind::If, "`if`")?.position;
        self.enter(position)?;
        self.expect(&TokenKind::LeftParen, "`(` after `if`")?;
        let condition = self.condition()?;
        self.expect(&TokenKind::RightParen, "`)`")?;
        let (then_branch, then_kind) = self.block()?;

        let else_position = self
            .expect(&TokenKind::Else, "`else` (both branches are required)")?
            .position;
        let (else_branch, else_kind) = if self.check(&TokenKind::If) {
            self.conditional()?
        } else {
            self.block()?
        };

        if then_kind != else_kind {
            return Err(SyntaxError::new(
                SyntaxErrorKind::TypeMismatch,
                format!("`if` yields {then_kind} but `else` yields {else_kind}"),
                else_position,
            ));
        }
        self.leave();
        let expression = Expression::Conditional {
            condition,
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        };
        Ok((bounded(expression, position)?, then_kind))
    }

    fn block(&mut self) -> ParseResult<Typed> {
        self.expect(&TokenKind::LeftBrace, "`{`")?;
        let inner = self.expression()?;
        self.expect(&TokenKind::RightBrace, "`}`")?;
        Ok(inner)
    }

    fn condition(&mut self) -> ParseResult<Condition> {
        let mut left = self.conjunction()?;
        while self.check(&TokenKind::OrOr) {
            let position = self.advance().position;
            let right = self.conjunction()?;
            left = bounded_condition(Condition::Or(Box::new(left), Box::new(right)), position)?;
        }
        Ok(left)
    }

    fn conjunction(&mut self) -> ParseResult<Condition> {
        let mut left = self.negation()?;
        while self.check(&TokenKind::AndAnd) {
            let position = self.advance().position;
            let right = self.negation()?;
            left = bounded_condition(Condition::And(Box::new(left), Box::new(right)), position)?;
        }
        Ok(left)
    }

    fn negation(&mut self) -> ParseResult<Condition> {
        let position = self.peek().position;
        if self.eat(&TokenKind::Bang) {
            self.enter(position)?;
            let inner = self.negation()?;
            self.leave();
            return bounded_condition(Condition::Not(Box::new(inner)), position);
        }
        if self.eat(&TokenKind::LeftParen) {
            self.enter(position)?;
            let inner = self.condition()?;
            self.expect(&TokenKind::RightParen, "`)`")?;
            self.leave();
            return Ok(inner);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult<Condition> {
        let (left, left_position) = self.operand()?;
        let op = match self.peek().kind {
            TokenKind::Less => Comparison::Less,
            TokenKind::LessEqual => Comparison::LessEqual,
            TokenKind::Greater => Comparison::Greater,
            TokenKind::GreaterEqual => Comparison::GreaterEqual,
            TokenKind::EqualEqual => Comparison::Equal,
            TokenKind::NotEqual => Comparison::NotEqual,
            _ => return Err(self.unexpected("a comparison operator")),
        };
        let op_position = self.advance().position;
        let (right, right_position) = self.operand()?;

        check_season_literal(&left, &right, right_position)?;
        check_season_literal(&right, &left, left_position)?;

        let mismatch = |message: String| {
            Err(SyntaxError::new(
                SyntaxErrorKind::TypeMismatch,
                message,
                op_position,
            ))
        };
        if left.is_text() || right.is_text() {
            if !(left.is_text() && right.is_text()) {
                return mismatch(format!("cannot compare {left} with {right}"));
            }
            if !op.is_equality() {
                return mismatch(format!(
                    "text only supports `==` and `!=`, found `{}`",
                    op.symbol()
                ));
            }
        } else if !(is_date_compatible(&left, &right) && is_date_compatible(&right, &left)) {
            return mismatch(format!("cannot compare {left} with {right}"));
        }

        Ok(Condition::Compare { left, op, right })
    }

    fn operand(&mut self) -> ParseResult<(Operand, Position)> {
        let token = self.peek().clone();
        let operand = match token.kind {
            TokenKind::Identifier(name) => {
                CalendarField::from_name(&name).map(Operand::Field).ok_or_else(|| {
                    SyntaxError::new(
                        SyntaxErrorKind::UnknownIdentifier,
                        format!("unknown field `{name}` (conditions use calendar and location fields)"),
                        token.position,
                    )
                })?
            }
            TokenKind::Number(_) | TokenKind::Minus => {
                return self.number().map(|(n, position)| (Operand::Number(n), position));
            }
            TokenKind::DayMonth { day, month } => Operand::DayMonth { day, month },
            TokenKind::Text(text) => Operand::Text(text),
            _ => return Err(self.unexpected("a field, number, date or string")),
        };
        self.advance();
        Ok((operand, token.position))
    }
}

fn too_deep(position: Position) -> SyntaxError {
    SyntaxError::new(
        SyntaxErrorKind::TooDeep,
        format!("formula nests deeper than {MAX_NESTING_DEPTH} levels"),
        position,
    )
}

/// Rejects a freshly built node whose tree exceeds the nesting limit. Children are already bounded.
fn bounded(expression: Expression, position: Position) -> ParseResult<Expression> {
    if expression.depth() > MAX_NESTING_DEPTH {
        return Err(too_deep(position));
    }
    Ok(expression)
}

fn bounded_condition(condition: Condition, position: Position) -> ParseResult<Condition> {
    if condition.depth() > MAX_NESTING_DEPTH {
        return Err(too_deep(position));
    }
    Ok(condition)
}

fn binary(op: BinaryOp, left: Typed, right: Typed, position: Position) -> ParseResult<Typed> {
    let (left, left_kind) = left;
    let (right, right_kind) = right;
    let kind = op.result_kind(left_kind, right_kind).ok_or_else(|| {
        SyntaxError::new(
            SyntaxErrorKind::TypeMismatch,
            format!(
                "cannot apply `{}` to {left_kind} and {right_kind}",
                op.symbol()
            ),
            position,
        )
    })?;
    let expression = Expression::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    };
    Ok((bounded(expression, position)?, kind))
}

fn primitive(name: &str, position: Position) -> ParseResult<Typed> {
    if let Some(primitive) = Primitive::from_name(name) {
        return Ok((Expression::Primitive(primitive), ValueKind::Time));
    }
    let message = if CalendarField::from_name(name).is_some() {
        format!("`{name}` is only available inside an `if` condition")
    } else if DayFrame::named(name).is_some() || direction_from_name(name).is_some() {
        format!("`{name}` is only valid as a function argument")
    } else {
        format!("unknown identifier `{name}`")
    };
    Err(SyntaxError::new(
        SyntaxErrorKind::UnknownIdentifier,
        message,
        position,
    ))
}

/// Day-month literals only compare against dates and days of the year.
fn is_date_compatible(operand: &Operand, other: &Operand) -> bool {
    !matches!(operand, Operand::DayMonth { .. })
        || matches!(
            other,
            Operand::DayMonth { .. }
                | Operand::Field(CalendarField::Date | CalendarField::DayOfYear)
        )
}

/// A string compared with `season` must name a season.
fn check_season_literal(field: &Operand, literal: &Operand, position: Position) -> ParseResult<()> {
    match (field, literal) {
        (Operand::Field(CalendarField::Season), Operand::Text(text))
            if Season::from_name(text).is_none() =>
        {
            Err(SyntaxError::new(
                SyntaxErrorKind::UnknownIdentifier,
                format!("unknown season \"{text}\""),
                position,
            ))
        }
        _ => Ok(()),
    }
}
