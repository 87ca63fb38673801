//! Condition DSL parser.
//!
//! Recursive descent over the text form used in strategy config files:
//!
//! ```text
//! condition  := OPERATOR '(' operand [',' operand] ')'
//! operand    := number | range | column lag? | indicator lag?
//! indicator  := NAME '(' [arg (',' arg)*] ')'      arg := number | NAME '=' number
//! lag        := '[' integer ']'
//! range      := '[' operand [',' operand] ']'
//! group      := condition ((';' | ',') condition)*
//! ```
//!
//! Errors carry the byte offset of the offending token. Whether indicator
//! names exist or arities match is checked later by `Condition::validate`.

use crate::domain::condition::{Combinator, Condition, ConditionGroup, Operand, Operator};
use crate::domain::error::ParseError;
use crate::domain::indicator::IndicatorParams;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.input.len()
    }

    fn error(&self, message: impl Into<String>, position: usize) -> ParseError {
        ParseError {
            message: message.into(),
            position,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(format!("expected '{expected}', found '{ch}'"), self.pos)),
            None => Err(self.error(
                format!("expected '{expected}', found end of input"),
                self.pos,
            )),
        }
    }

    fn consume_char(&mut self, ch: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn peek_word(&self) -> &'a str {
        let rest = self.remaining();
        let end = rest
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        &rest[..end]
    }

    fn parse_identifier(&mut self) -> Result<&'a str, ParseError> {
        self.skip_whitespace();
        let word = self.peek_word();
        if word.is_empty() || word.starts_with(|c: char| c.is_ascii_digit()) {
            let found = self
                .peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string());
            return Err(self.error(format!("expected identifier, found '{found}'"), self.pos));
        }
        self.pos += word.len();
        Ok(word)
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if matches!(self.peek(), Some('-') | Some('+')) {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(self.error("expected number", start));
        }

        // optional exponent, e.g. 1e6
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mark = self.pos;
            self.advance();
            if matches!(self.peek(), Some('-') | Some('+')) {
                self.advance();
            }
            let exp_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
            if self.pos == exp_start {
                self.pos = mark;
            }
        }

        let text = &self.input[start..self.pos];
        text.parse::<f64>()
            .map_err(|_| self.error(format!("invalid number: {text}"), start))
    }

    fn parse_integer(&mut self) -> Result<usize, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.pos == start {
            return Err(self.error("expected integer", start));
        }
        let text = &self.input[start..self.pos];
        text.parse::<usize>()
            .map_err(|_| self.error(format!("invalid integer: {text}"), start))
    }

    fn starts_number(&self) -> bool {
        self.peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+' || c == '.')
    }

    fn parse_lag(&mut self) -> Result<usize, ParseError> {
        if !self.consume_char('[') {
            return Ok(0);
        }
        let lag = self.parse_integer()?;
        self.expect_char(']')?;
        Ok(lag)
    }

    fn parse_indicator_args(&mut self, name: &str) -> Result<IndicatorParams, ParseError> {
        let mut params = IndicatorParams::default();
        if self.consume_char(')') {
            return Ok(params);
        }
        loop {
            self.skip_whitespace();
            if self.starts_number() {
                if !params.keyword.is_empty() {
                    return Err(self.error(
                        format!("positional argument after keyword in {name}()"),
                        self.pos,
                    ));
                }
                params.positional.push(self.parse_number()?);
            } else {
                let key_pos = self.pos;
                let key = self.parse_identifier()?;
                self.expect_char('=')?;
                let value = self.parse_number()?;
                if params.keyword.insert(key.to_ascii_lowercase(), value).is_some() {
                    return Err(self.error(format!("duplicate argument '{key}'"), key_pos));
                }
            }
            if self.consume_char(')') {
                return Ok(params);
            }
            self.expect_char(',')?;
        }
    }

    fn parse_range(&mut self) -> Result<Operand, ParseError> {
        self.expect_char('[')?;
        let mut bounds = vec![self.parse_operand()?];
        if self.consume_char(',') {
            bounds.push(self.parse_operand()?);
        }
        self.expect_char(']')?;
        Ok(Operand::Range { bounds })
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        self.skip_whitespace();

        if self.starts_number() {
            return Ok(Operand::constant(self.parse_number()?));
        }
        if self.peek() == Some('[') {
            return self.parse_range();
        }

        let name = self.parse_identifier()?;
        if self.consume_char('(') {
            let params = self.parse_indicator_args(name)?;
            let lag = self.parse_lag()?;
            return Ok(Operand::Indicator {
                name: name.to_ascii_uppercase(),
                params,
                lag,
            });
        }

        let lag = self.parse_lag()?;
        Ok(Operand::Price {
            column: name.to_string(),
            lag,
        })
    }

    fn parse_operator(&mut self) -> Result<Operator, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let len = self.remaining().find('(').ok_or_else(|| {
            self.error("expected '(' after operator name", self.input.len())
        })?;
        let name = &self.remaining()[..len];
        if name.trim().is_empty() {
            return Err(self.error("expected operator name", start));
        }
        let operator = name
            .parse::<Operator>()
            .map_err(|e| self.error(e.to_string(), start))?;
        self.pos += len;
        Ok(operator)
    }

    fn parse_condition(&mut self) -> Result<Condition, ParseError> {
        let operator = self.parse_operator()?;
        self.expect_char('(')?;

        let left_pos = self.pos;
        let left = self.parse_operand()?;
        let mut rest = Vec::new();
        while self.consume_char(',') {
            rest.push(self.parse_operand()?);
        }
        let close_pos = self.pos;
        self.expect_char(')')?;

        let right = match (operator, rest.len()) {
            (op, 0) if op.is_unary() => crate::domain::condition::placeholder(),
            (_, 0) => {
                return Err(self.error(format!("{operator} requires two operands"), close_pos));
            }
            (_, 1) => rest.remove(0),
            // WITHIN_RANGE(x, low, high) shorthand
            (Operator::WithinRange, 2) => Operand::Range { bounds: rest },
            _ => {
                return Err(self.error(format!("too many operands for {operator}"), close_pos));
            }
        };

        if left.is_range() {
            return Err(self.error("range cannot be the left operand", left_pos));
        }

        Ok(Condition::new(left, operator, right))
    }

    fn parse_group(&mut self, combinator: Combinator) -> Result<ConditionGroup, ParseError> {
        let mut conditions = Vec::new();
        while !self.at_end() {
            conditions.push(self.parse_condition()?);
            if self.at_end() {
                break;
            }
            if !self.consume_char(',') {
                self.expect_char(';')?;
            }
        }
        Ok(ConditionGroup::new(combinator, conditions))
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error(
                format!("unexpected input after condition: '{}'", self.remaining()),
                self.pos,
            ))
        }
    }
}

pub fn parse_condition(input: &str) -> Result<Condition, ParseError> {
    let mut parser = Parser::new(input);
    let condition = parser.parse_condition()?;
    parser.finish()?;
    Ok(condition)
}

pub fn parse_operand(input: &str) -> Result<Operand, ParseError> {
    let mut parser = Parser::new(input);
    let operand = parser.parse_operand()?;
    parser.finish()?;
    Ok(operand)
}

/// Parse conditions separated by `;` or `,`. Empty or blank input gives an
/// empty group.
pub fn parse_group(input: &str, combinator: Combinator) -> Result<ConditionGroup, ParseError> {
    Parser::new(input).parse_group(combinator)
}
