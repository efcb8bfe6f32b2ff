//! Tokenizer for formula source.

use super::{Position, SyntaxError, SyntaxErrorKind};
use core::fmt;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Identifier(String),
    Number(f64),
    /// Duration literal, in minutes.
    Duration(f64),
    Text(String),
    /// `21-May`
    DayMonth {
        day: u32,
        month: u32,
    },
    /// `@key`
    Reference(String),
    Plus,
    Minus,
    Star,
    Slash,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    EqualEqual,
    NotEqual,
    AndAnd,
    OrOr,
    Bang,
    If,
    Else,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(name) => write!(f, "identifier `{name}`"),
            Self::Number(n) => write!(f, "number `{n}`"),
            Self::Duration(minutes) => write!(f, "duration `{minutes}min`"),
            Self::Text(text) => write!(f, "string \"{text}\""),
            Self::DayMonth { day, month } => write!(f, "date `{day}-{}`", MONTHS[*month as usize - 1]),
            Self::Reference(key) => write!(f, "reference `@{key}`"),
            Self::Plus => f.write_str("`+`"),
            Self::Minus => f.write_str("`-`"),
            Self::Star => f.write_str("`*`"),
            Self::Slash => f.write_str("`/`"),
            Self::LeftParen => f.write_str("`(`"),
            Self::RightParen => f.write_str("`)`"),
            Self::LeftBrace => f.write_str("`{`"),
            Self::RightBrace => f.write_str("`}`"),
            Self::Comma => f.write_str("`,`"),
            Self::Greater => f.write_str("`>`"),
            Self::GreaterEqual => f.write_str("`>=`"),
            Self::Less => f.write_str("`<`"),
            Self::LessEqual => f.write_str("`<=`"),
            Self::EqualEqual => f.write_str("`==`"),
            Self::NotEqual => f.write_str("`!=`"),
            Self::AndAnd => f.write_str("`&&`"),
            Self::OrOr => f.write_str("`||`"),
            Self::Bang => f.write_str("`!`"),
            Self::If => f.write_str("`if`"),
            Self::Else => f.write_str("`else`"),
            Self::Eof => f.write_str("end of formula"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

pub(crate) const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const DAYS_IN_MONTH: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Splits formula source into tokens, always ending with `Eof`.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

#[derive(Clone, Copy)]
struct Cursor {
    index: usize,
    line: u32,
    column: u32,
}

struct Lexer {
    chars: Vec<char>,
    cursor: Cursor,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            cursor: Cursor {
                index: 0,
                line: 1,
                column: 1,
            },
        }
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.cursor.index + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.cursor.index += 1;
        if c == '\n' {
            self.cursor.line += 1;
            self.cursor.column = 1;
        } else {
            self.cursor.column += 1;
        }
        Some(c)
    }

    fn position(&self) -> Position {
        Position::new(self.cursor.line, self.cursor.column)
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek().filter(|&c| predicate(c)) {
            out.push(c);
            self.bump();
        }
        out
    }

    fn skip_trivia(&mut self) -> Result<(), SyntaxError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    self.take_while(|c| c != '\n');
                }
                (Some('/'), Some('*')) => {
                    let start = self.position();
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                return Err(SyntaxError::new(
                                    SyntaxErrorKind::UnterminatedComment,
                                    "unterminated block comment",
                                    start,
                                ));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, SyntaxError> {
        self.skip_trivia()?;
        let position = self.position();
        let token = |kind| Ok(Token { kind, position });

        let Some(c) = self.peek() else {
            return token(TokenKind::Eof);
        };

        if c.is_ascii_digit() {
            return self.number(position);
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let word = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
            return token(match word.as_str() {
                "if" => TokenKind::If,
                "else" => TokenKind::Else,
                _ => TokenKind::Identifier(word),
            });
        }

        self.bump();
        let two = |lexer: &mut Self, next: char, double: TokenKind, single: Option<TokenKind>| {
            if lexer.peek() == Some(next) {
                lexer.bump();
                Ok(Token { kind: double, position })
            } else {
                single.map(|kind| Token { kind, position }).ok_or_else(|| {
                    SyntaxError::new(
                        SyntaxErrorKind::UnexpectedCharacter,
                        format!("unexpected character `{c}`; did you mean `{c}{next}`?"),
                        position,
                    )
                })
            }
        };

        match c {
            '+' => token(TokenKind::Plus),
            '-' => token(TokenKind::Minus),
            '*' => token(TokenKind::Star),
            '/' => token(TokenKind::Slash),
            '(' => token(TokenKind::LeftParen),
            ')' => token(TokenKind::RightParen),
            '{' => token(TokenKind::LeftBrace),
            '}' => token(TokenKind::RightBrace),
            ',' => token(TokenKind::Comma),
            '>' => two(self, '=', TokenKind::GreaterEqual, Some(TokenKind::Greater)),
            '<' => two(self, '=', TokenKind::LessEqual, Some(TokenKind::Less)),
            '!' => two(self, '=', TokenKind::NotEqual, Some(TokenKind::Bang)),
            '=' => two(self, '=', TokenKind::EqualEqual, None),
            '&' => two(self, '&', TokenKind::AndAnd, None),
            '|' => two(self, '|', TokenKind::OrOr, None),
            '@' => {
                let key = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                if key.is_empty() {
                    return Err(SyntaxError::new(
                        SyntaxErrorKind::UnexpectedCharacter,
                        "expected a zman key after `@`",
                        position,
                    ));
                }
                token(TokenKind::Reference(key))
            }
            '"' => {
                let text = self.take_while(|c| c != '"' && c != '\n');
                if self.bump() != Some('"') {
                    return Err(SyntaxError::new(
                        SyntaxErrorKind::UnterminatedString,
                        "unterminated string literal",
                        position,
                    ));
                }
                token(TokenKind::Text(text))
            }
            other => Err(SyntaxError::new(
                SyntaxErrorKind::UnexpectedCharacter,
                format!("unexpected character `{other}`"),
                position,
            )),
        }
    }

    fn digits(&mut self) -> String {
        let mut text = self.take_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            text.push('.');
            text.push_str(&self.take_while(|c| c.is_ascii_digit()));
        }
        text
    }

    fn number(&mut self, position: Position) -> Result<Token, SyntaxError> {
        let text = self.digits();
        let value: f64 = text.parse().map_err(|_| {
            SyntaxError::new(
                SyntaxErrorKind::UnexpectedToken,
                format!("malformed number `{text}`"),
                position,
            )
        })?;
        if !value.is_finite() {
            return Err(too_large(position));
        }

        if self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            return self.duration(value, position);
        }
        if self.peek() == Some('-') && self.peek_at(1).is_some_and(|c| c.is_ascii_alphabetic()) {
            if let Some(token) = self.day_month(&text, position)? {
                return Ok(token);
            }
        }
        Ok(Token {
            kind: TokenKind::Number(value),
            position,
        })
    }

    /// `72min`, `1.5hr`, `2h`, and the compound `1h 30min`.
    fn duration(&mut self, value: f64, position: Position) -> Result<Token, SyntaxError> {
        let unit_position = self.position();
        let unit = self.take_while(|c| c.is_ascii_alphabetic());
        let mut minutes = match unit.as_str() {
            "min" => value,
            "h" | "hr" => value * 60.0,
            _ => {
                return Err(SyntaxError::new(
                    SyntaxErrorKind::InvalidUnit,
                    format!("unknown duration unit `{unit}`; expected `min`, `h` or `hr`"),
                    unit_position,
                ));
            }
        };

        if unit != "min" {
            let saved = self.cursor;
            self.take_while(|c| c == ' ' || c == '\t');
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                let extra = self.digits();
                if self.take_while(|c| c.is_ascii_alphabetic()) == "min" {
                    minutes += extra.parse::<f64>().unwrap_or(0.0);
                } else {
                    self.cursor = saved;
                }
            } else {
                self.cursor = saved;
            }
        }

        if !minutes.is_finite() {
            return Err(too_large(position));
        }
        Ok(Token {
            kind: TokenKind::Duration(minutes),
            position,
        })
    }

    /// `21-May`. Restores the cursor and returns `None` when the word is not a month.
    fn day_month(&mut self, day_text: &str, position: Position) -> Result<Option<Token>, SyntaxError> {
        let saved = self.cursor;
        self.bump();
        let word = self.take_while(|c| c.is_ascii_alphabetic());
        let Some(month_index) = MONTHS.iter().position(|m| m.eq_ignore_ascii_case(&word)) else {
            self.cursor = saved;
            return Ok(None);
        };

        let day = day_text
            .parse::<u32>()
            .ok()
            .filter(|&d| d >= 1 && d <= DAYS_IN_MONTH[month_index]);
        let Some(day) = day else {
            return Err(SyntaxError::new(
                SyntaxErrorKind::OutOfRange,
                format!("`{day_text}-{}` is not a day of the year", MONTHS[month_index]),
                position,
            ));
        };

        Ok(Some(Token {
            kind: TokenKind::DayMonth {
                day,
                month: month_index as u32 + 1,
            },
            position,
        }))
    }
}

fn too_large(position: Position) -> SyntaxError {
    SyntaxError::new(
        SyntaxErrorKind::OutOfRange,
        "number is too large to be finite",
        position,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_durations() {
        assert_eq!(kinds("72min"), vec![TokenKind::Duration(72.0), TokenKind::Eof]);
        assert_eq!(kinds("1hr"), vec![TokenKind::Duration(60.0), TokenKind::Eof]);
        assert_eq!(kinds("1.5h"), vec![TokenKind::Duration(90.0), TokenKind::Eof]);
        assert_eq!(kinds("1h 30min"), vec![TokenKind::Duration(90.0), TokenKind::Eof]);
        assert_eq!(
            kinds("2hr + 5"),
            vec![
                TokenKind::Duration(120.0),
                TokenKind::Plus,
                TokenKind::Number(5.0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_unknown_unit() {
        let err = tokenize("sunset + 72xyz").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::InvalidUnit);
        assert_eq!(err.position, Position::new(1, 12));
    }

    #[test]
    fn test_oversized_literals() {
        let digits = format!("1{}", "0".repeat(400));

        let err = tokenize(&format!("sunrise + {digits}")).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::OutOfRange);
        assert_eq!(err.position, Position::new(1, 11));

        let err = tokenize(&format!("{digits}min")).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::OutOfRange);
        assert_eq!(err.position, Position::new(1, 1));

        let hours = format!("1{}h", "0".repeat(307));
        assert_eq!(tokenize(&hours).unwrap_err().kind, SyntaxErrorKind::OutOfRange);
    }

    #[test]
    fn test_references_and_operators() {
        assert_eq!(
            kinds("@alos_72 >= <= != == && || !"),
            vec![
                TokenKind::Reference("alos_72".into()),
                TokenKind::GreaterEqual,
                TokenKind::LessEqual,
                TokenKind::NotEqual,
                TokenKind::EqualEqual,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Bang,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokenize("@ x").unwrap_err().kind, SyntaxErrorKind::UnexpectedCharacter);
        assert_eq!(tokenize("a = b").unwrap_err().position, Position::new(1, 3));
    }

    #[test]
    fn test_day_month_literals() {
        assert_eq!(
            kinds("date >= 21-May"),
            vec![
                TokenKind::Identifier("date".into()),
                TokenKind::GreaterEqual,
                TokenKind::DayMonth { day: 21, month: 5 },
                TokenKind::Eof
            ]
        );
        assert_eq!(tokenize("31-Apr").unwrap_err().kind, SyntaxErrorKind::OutOfRange);
        // Not a month: plain subtraction
        assert_eq!(
            kinds("5-sunrise"),
            vec![
                TokenKind::Number(5.0),
                TokenKind::Minus,
                TokenKind::Identifier("sunrise".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_comments_and_positions() {
        let tokens = tokenize("// dawn\n  sunrise /* visible */ - 72min").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Identifier("sunrise".into()));
        assert_eq!(tokens[0].position, Position::new(2, 3));
        assert_eq!(tokens[1].kind, TokenKind::Minus);
        assert_eq!(tokens[2].position, Position::new(2, 27));

        let err = tokenize("sunrise /* open").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnterminatedComment);
        assert_eq!(err.position, Position::new(1, 9));
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            kinds("season == \"summer\""),
            vec![
                TokenKind::Identifier("season".into()),
                TokenKind::EqualEqual,
                TokenKind::Text("summer".into()),
                TokenKind::Eof
            ]
        );
        assert_eq!(
            tokenize("\"summer").unwrap_err().kind,
            SyntaxErrorKind::UnterminatedString
        );
    }
}
