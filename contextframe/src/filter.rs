// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! The filter predicate grammar (§6.1): a hand-rolled lexer and
//! recursive-descent parser producing a [`Predicate`] tree, plus an
//! evaluator that resolves column references through a caller-supplied
//! lookup closure rather than any particular row representation.

use contextframe_core::datatype::Value;
use contextframe_core::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastType {
    Utf8,
    Int64,
    Float32,
    Bool,
}

impl CastType {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "UTF8" | "STRING" | "VARCHAR" | "TEXT" => Some(Self::Utf8),
            "INT64" | "INT" | "INTEGER" | "BIGINT" => Some(Self::Int64),
            "FLOAT32" | "FLOAT" | "DOUBLE" | "REAL" => Some(Self::Float32),
            "BOOL" | "BOOLEAN" => Some(Self::Bool),
            _ => None,
        }
    }
}

/// A column reference: a bare name, or `CAST(name AS type)`. Dotted
/// struct/list-access identifiers parse but are rejected at this layer
/// (§6.1: "identifiers containing `.` are unsupported").
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnRef {
    Column(String),
    Cast(String, CastType),
}

impl ColumnRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Column(n) => n,
            Self::Cast(n, _) => n,
        }
    }

    pub fn cast(&self) -> Option<CastType> {
        match self {
            Self::Column(_) => None,
            Self::Cast(_, t) => Some(*t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// The predicate AST (§6.1).
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Compare(ColumnRef, CompareOp, Value),
    In(ColumnRef, Vec<Value>),
    IsNull { column: ColumnRef, negated: bool },
    IsBool { column: ColumnRef, expected: bool, negated: bool },
    Like { column: ColumnRef, pattern: String, negated: bool },
    Between(ColumnRef, Value, Value),
    RegexMatch(ColumnRef, String),
    Contains(ColumnRef, String),
    ArrayHasAny(ColumnRef, Vec<Value>),
    ArrayHasAll(ColumnRef, Vec<Value>),
}

impl Predicate {
    /// Every column name this predicate touches, used by the planner's
    /// index-selection pass (§4.7 decision 1).
    pub fn referenced_columns(&self, out: &mut Vec<String>) {
        match self {
            Self::And(a, b) | Self::Or(a, b) => {
                a.referenced_columns(out);
                b.referenced_columns(out);
            }
            Self::Not(p) => p.referenced_columns(out),
            Self::Compare(c, _, _)
            | Self::In(c, _)
            | Self::Between(c, _, _)
            | Self::RegexMatch(c, _)
            | Self::Contains(c, _)
            | Self::ArrayHasAny(c, _)
            | Self::ArrayHasAll(c, _) => out.push(c.name().to_string()),
            Self::IsNull { column, .. } | Self::IsBool { column, .. } | Self::Like { column, .. } => {
                out.push(column.name().to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(String),
    LParen,
    RParen,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn lex(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else if chars.get(i + 1) == Some(&'>') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '\'' => {
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(Error::invalid_filter("unterminated string literal")),
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            s.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            '`' => {
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(Error::invalid_filter("unterminated quoted identifier")),
                        Some('`') => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Ident(s));
            }
            _ if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                if c == '-' {
                    i += 1;
                }
                while chars.get(i).is_some_and(|ch| ch.is_ascii_digit() || *ch == '.') {
                    i += 1;
                }
                tokens.push(Token::Num(chars[start..i].iter().collect()));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while chars.get(i).is_some_and(|ch| ch.is_alphanumeric() || *ch == '_' || *ch == '.') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(Error::invalid_filter(format!("unexpected character {other:?}")));
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn is_keyword(tok: &Token, kw: &str) -> bool {
    matches!(tok, Token::Ident(s) if s.eq_ignore_ascii_case(kw))
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<()> {
        match self.advance() {
            Some(tok) if is_keyword(&tok, kw) => Ok(()),
            other => Err(Error::invalid_filter(format!("expected {kw:?}, found {other:?}"))),
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if matches!(self.peek(), Some(tok) if is_keyword(tok, kw)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Token) -> Result<()> {
        match self.advance() {
            Some(t) if t == tok => Ok(()),
            other => Err(Error::invalid_filter(format!("expected {tok:?}, found {other:?}"))),
        }
    }

    fn parse_expr(&mut self) -> Result<Predicate> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("OR") {
            let rhs = self.parse_and()?;
            lhs = Predicate::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Predicate> {
        let mut lhs = self.parse_unary()?;
        while self.eat_keyword("AND") {
            let rhs = self.parse_unary()?;
            lhs = Predicate::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Predicate> {
        if self.eat_keyword("NOT") {
            let inner = self.parse_unary()?;
            return Ok(Predicate::Not(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Predicate> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.advance();
            let inner = self.parse_expr()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }

        // function-call-shaped atoms: regexp_match, contains, array_has_any,
        // array_has_all.
        if let Some(Token::Ident(name)) = self.peek().cloned() {
            let lowered = name.to_ascii_lowercase();
            if matches!(
                lowered.as_str(),
                "regexp_match" | "contains" | "array_has_any" | "array_has_all"
            ) && matches!(self.tokens.get(self.pos + 1), Some(Token::LParen))
            {
                self.advance();
                self.advance();
                let column = self.parse_column()?;
                self.expect(Token::Comma)?;
                let predicate = match lowered.as_str() {
                    "regexp_match" => {
                        let pattern = self.parse_string_literal()?;
                        Predicate::RegexMatch(column, pattern)
                    }
                    "contains" => {
                        let needle = self.parse_string_literal()?;
                        Predicate::Contains(column, needle)
                    }
                    "array_has_any" => Predicate::ArrayHasAny(column, self.parse_literal_list()?),
                    "array_has_all" => Predicate::ArrayHasAll(column, self.parse_literal_list()?),
                    _ => unreachable!(),
                };
                self.expect(Token::RParen)?;
                return Ok(predicate);
            }
        }

        let column = self.parse_column()?;

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            if self.eat_keyword("NULL") {
                return Ok(Predicate::IsNull { column, negated });
            }
            if self.eat_keyword("TRUE") {
                return Ok(Predicate::IsBool { column, expected: true, negated });
            }
            if self.eat_keyword("FALSE") {
                return Ok(Predicate::IsBool { column, expected: false, negated });
            }
            return Err(Error::invalid_filter("expected NULL, TRUE or FALSE after IS"));
        }

        let negated_like = self.eat_keyword("NOT");
        if self.eat_keyword("LIKE") {
            let pattern = self.parse_string_literal()?;
            return Ok(Predicate::Like { column, pattern, negated: negated_like });
        }
        if negated_like {
            return Err(Error::invalid_filter("expected LIKE after NOT"));
        }

        if self.eat_keyword("IN") {
            return Ok(Predicate::In(column, self.parse_literal_list()?));
        }

        if self.eat_keyword("BETWEEN") {
            let low = self.parse_literal()?;
            self.expect_keyword("AND")?;
            let high = self.parse_literal()?;
            return Ok(Predicate::Between(column, low, high));
        }

        let op = match self.advance() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Le) => CompareOp::Le,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Ge) => CompareOp::Ge,
            other => return Err(Error::invalid_filter(format!("expected a comparison operator, found {other:?}"))),
        };
        let literal = self.parse_literal()?;
        Ok(Predicate::Compare(column, op, literal))
    }

    fn parse_column(&mut self) -> Result<ColumnRef> {
        if let Some(Token::Ident(name)) = self.peek().cloned() {
            if name.eq_ignore_ascii_case("CAST") && matches!(self.tokens.get(self.pos + 1), Some(Token::LParen)) {
                self.advance();
                self.advance();
                let inner = self.parse_column()?;
                self.expect_keyword("AS")?;
                let Some(Token::Ident(type_name)) = self.advance() else {
                    return Err(Error::invalid_filter("expected a type name in CAST"));
                };
                self.expect(Token::RParen)?;
                let cast_type = CastType::parse(&type_name)
                    .ok_or_else(|| Error::invalid_filter(format!("unknown cast type {type_name:?}")))?;
                return Ok(ColumnRef::Cast(inner.name().to_string(), cast_type));
            }
        }

        match self.advance() {
            Some(Token::Ident(name)) => {
                if name.contains('.') {
                    return Err(Error::unsupported(format!(
                        "dotted column identifiers are unsupported: {name:?}"
                    )));
                }
                Ok(ColumnRef::Column(name))
            }
            other => Err(Error::invalid_filter(format!("expected a column reference, found {other:?}"))),
        }
    }

    fn parse_string_literal(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(s),
            other => Err(Error::invalid_filter(format!("expected a string literal, found {other:?}"))),
        }
    }

    fn parse_literal_list(&mut self) -> Result<Vec<Value>> {
        self.expect(Token::LParen)?;
        let mut values = Vec::new();
        if !matches!(self.peek(), Some(Token::RParen)) {
            loop {
                values.push(self.parse_literal()?);
                if !matches!(self.peek(), Some(Token::Comma)) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(Token::RParen)?;
        Ok(values)
    }

    fn parse_literal(&mut self) -> Result<Value> {
        // Typed literals: date '...', timestamp(p) '...', decimal(p,s) '...'.
        if let Some(Token::Ident(kw)) = self.peek().cloned() {
            let lowered = kw.to_ascii_lowercase();
            match lowered.as_str() {
                "date" => {
                    self.advance();
                    return Ok(Value::Date(self.parse_string_literal()?));
                }
                "timestamp" => {
                    self.advance();
                    if matches!(self.peek(), Some(Token::LParen)) {
                        self.advance();
                        self.advance(); // precision digit, not validated further
                        self.expect(Token::RParen)?;
                    }
                    return Ok(Value::Timestamp(self.parse_string_literal()?));
                }
                "decimal" => {
                    self.advance();
                    if matches!(self.peek(), Some(Token::LParen)) {
                        self.advance();
                        self.advance();
                        self.expect(Token::Comma)?;
                        self.advance();
                        self.expect(Token::RParen)?;
                    }
                    return Ok(Value::Decimal(self.parse_string_literal()?));
                }
                "true" => {
                    self.advance();
                    return Ok(Value::Bool(true));
                }
                "false" => {
                    self.advance();
                    return Ok(Value::Bool(false));
                }
                "null" => {
                    self.advance();
                    return Ok(Value::Null);
                }
                _ => {}
            }
        }

        match self.advance() {
            Some(Token::Str(s)) => Ok(Value::Utf8(s)),
            Some(Token::Num(n)) => {
                if n.contains('.') {
                    n.parse::<f32>()
                        .map(Value::Float32)
                        .map_err(|e| Error::invalid_filter(format!("invalid float literal {n:?}: {e}")))
                } else {
                    n.parse::<i64>()
                        .map(Value::Int64)
                        .map_err(|e| Error::invalid_filter(format!("invalid int literal {n:?}: {e}")))
                }
            }
            other => Err(Error::invalid_filter(format!("expected a literal, found {other:?}"))),
        }
    }
}

/// Parse a §6.1 filter expression string into a [`Predicate`] tree.
pub fn parse(input: &str) -> Result<Predicate> {
    let tokens = lex(input)?;
    if tokens.is_empty() {
        return Err(Error::invalid_filter("empty filter expression"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let predicate = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(Error::invalid_filter(format!(
            "unexpected trailing tokens at position {}",
            parser.pos
        )));
    }
    Ok(predicate)
}

// ---------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------

fn apply_cast(value: Value, cast: Option<CastType>) -> Value {
    let Some(cast) = cast else { return value };
    match (cast, &value) {
        (CastType::Utf8, _) => Value::Utf8(value.to_string()),
        (CastType::Int64, Value::Utf8(s)) => s.parse::<i64>().map(Value::Int64).unwrap_or(Value::Null),
        (CastType::Int64, Value::Float32(f)) => Value::Int64(*f as i64),
        (CastType::Float32, Value::Utf8(s)) => s.parse::<f32>().map(Value::Float32).unwrap_or(Value::Null),
        (CastType::Float32, Value::Int64(i)) => Value::Float32(*i as f32),
        (CastType::Bool, Value::Utf8(s)) => match s.as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => Value::Null,
        },
        _ => value,
    }
}

fn resolve(column: &ColumnRef, get: &dyn Fn(&str) -> Value) -> Value {
    apply_cast(get(column.name()), column.cast())
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int64(x), Value::Int64(y)) => x == y,
        (Value::Float32(x), Value::Float32(y)) => x == y,
        (Value::Int64(x), Value::Float32(y)) | (Value::Float32(y), Value::Int64(x)) => *x as f32 == *y,
        (Value::Utf8(x), Value::Utf8(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::Timestamp(x), Value::Timestamp(y)) => x == y,
        (Value::Decimal(x), Value::Decimal(y)) => x == y,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Int64(x), Value::Int64(y)) => Some(x.cmp(y)),
        (Value::Float32(x), Value::Float32(y)) => Some(x.total_cmp(y)),
        (Value::Int64(x), Value::Float32(y)) => Some((*x as f32).total_cmp(y)),
        (Value::Float32(x), Value::Int64(y)) => Some(x.total_cmp(&(*y as f32))),
        (Value::Utf8(x), Value::Utf8(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        (Value::Timestamp(x), Value::Timestamp(y)) => Some(x.cmp(y)),
        (Value::Decimal(x), Value::Decimal(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            _ if regex_syntax::is_meta_character(ch) => {
                regex.push('\\');
                regex.push(ch);
            }
            _ => regex.push(ch),
        }
    }
    regex.push('$');
    regex
}

mod regex_syntax {
    pub fn is_meta_character(c: char) -> bool {
        matches!(
            c,
            '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
        )
    }
}

fn list_contains(list: &Value, needle: &Value) -> bool {
    match list {
        Value::List(items) => items.iter().any(|v| values_equal(v, needle)),
        other => values_equal(other, needle),
    }
}

/// Evaluate `predicate` against a row, resolved through `get`. `get`
/// should return [`Value::Null`] for a column the row does not carry.
pub fn eval(predicate: &Predicate, get: &dyn Fn(&str) -> Value) -> Result<bool> {
    Ok(match predicate {
        Predicate::And(a, b) => eval(a, get)? && eval(b, get)?,
        Predicate::Or(a, b) => eval(a, get)? || eval(b, get)?,
        Predicate::Not(p) => !eval(p, get)?,
        Predicate::Compare(column, op, literal) => {
            let value = resolve(column, get);
            if matches!(value, Value::Null) {
                false
            } else {
                match op {
                    CompareOp::Eq => values_equal(&value, literal),
                    CompareOp::Ne => !values_equal(&value, literal),
                    CompareOp::Lt => compare(&value, literal) == Some(std::cmp::Ordering::Less),
                    CompareOp::Le => matches!(
                        compare(&value, literal),
                        Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
                    ),
                    CompareOp::Gt => compare(&value, literal) == Some(std::cmp::Ordering::Greater),
                    CompareOp::Ge => matches!(
                        compare(&value, literal),
                        Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
                    ),
                }
            }
        }
        Predicate::In(column, literals) => {
            let value = resolve(column, get);
            literals.iter().any(|l| values_equal(&value, l))
        }
        Predicate::IsNull { column, negated } => {
            let is_null = matches!(resolve(column, get), Value::Null);
            is_null != *negated
        }
        Predicate::IsBool { column, expected, negated } => {
            let matched = matches!(resolve(column, get), Value::Bool(b) if b == *expected);
            matched != *negated
        }
        Predicate::Like { column, pattern, negated } => {
            let value = resolve(column, get);
            let matched = match value {
                Value::Utf8(s) => {
                    let re = regex::Regex::new(&like_to_regex(pattern))
                        .map_err(|e| Error::invalid_filter(format!("invalid LIKE pattern {pattern:?}: {e}")))?;
                    re.is_match(&s)
                }
                _ => false,
            };
            matched != *negated
        }
        Predicate::Between(column, low, high) => {
            let value = resolve(column, get);
            !matches!(value, Value::Null)
                && matches!(
                    compare(&value, low),
                    Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
                )
                && matches!(
                    compare(&value, high),
                    Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
                )
        }
        Predicate::RegexMatch(column, pattern) => {
            let value = resolve(column, get);
            match value {
                Value::Utf8(s) => {
                    let re = regex::Regex::new(pattern)
                        .map_err(|e| Error::invalid_filter(format!("invalid regex {pattern:?}: {e}")))?;
                    re.is_match(&s)
                }
                _ => false,
            }
        }
        Predicate::Contains(column, needle) => {
            let value = resolve(column, get);
            match value {
                Value::Utf8(s) => s.contains(needle.as_str()),
                Value::List(_) => list_contains(&value, &Value::Utf8(needle.clone())),
                _ => false,
            }
        }
        Predicate::ArrayHasAny(column, literals) => {
            let value = resolve(column, get);
            literals.iter().any(|l| list_contains(&value, l))
        }
        Predicate::ArrayHasAll(column, literals) => {
            let value = resolve(column, get);
            literals.iter().all(|l| list_contains(&value, l))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn row(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn get_from<'a>(row: &'a HashMap<String, Value>) -> impl Fn(&str) -> Value + 'a {
        move |name: &str| row.get(name).cloned().unwrap_or(Value::Null)
    }

    #[test]
    fn parses_and_evaluates_simple_equality() {
        let predicate = parse("status = 'draft'").unwrap();
        let r = row(&[("status", Value::Utf8("draft".to_string()))]);
        assert!(eval(&predicate, &get_from(&r)).unwrap());
        let r2 = row(&[("status", Value::Utf8("published".to_string()))]);
        assert!(!eval(&predicate, &get_from(&r2)).unwrap());
    }

    #[test]
    fn parses_and_or_not_with_precedence() {
        let predicate = parse("status = 'draft' AND NOT title = 'x' OR author = 'bob'").unwrap();
        let r = row(&[
            ("status", Value::Utf8("draft".to_string())),
            ("title", Value::Utf8("y".to_string())),
            ("author", Value::Utf8("alice".to_string())),
        ]);
        assert!(eval(&predicate, &get_from(&r)).unwrap());
    }

    #[test]
    fn parses_between_and_in() {
        let between = parse("collection_position BETWEEN 1 AND 10").unwrap();
        let r = row(&[("collection_position", Value::Int64(5))]);
        assert!(eval(&between, &get_from(&r)).unwrap());

        let in_pred = parse("status IN ('draft', 'review')").unwrap();
        let r2 = row(&[("status", Value::Utf8("review".to_string()))]);
        assert!(eval(&in_pred, &get_from(&r2)).unwrap());
    }

    #[test]
    fn parses_is_null_and_is_bool() {
        let is_null = parse("text_content IS NULL").unwrap();
        assert!(eval(&is_null, &get_from(&row(&[]))).unwrap());

        let is_not_null = parse("text_content IS NOT NULL").unwrap();
        let r = row(&[("text_content", Value::Utf8("hi".to_string()))]);
        assert!(eval(&is_not_null, &get_from(&r)).unwrap());
    }

    #[test]
    fn parses_like_with_wildcards() {
        let predicate = parse("title LIKE '%quick%'").unwrap();
        let r = row(&[("title", Value::Utf8("the quick brown fox".to_string()))]);
        assert!(eval(&predicate, &get_from(&r)).unwrap());

        let negated = parse("title NOT LIKE '%quick%'").unwrap();
        assert!(!eval(&negated, &get_from(&r)).unwrap());
    }

    #[test]
    fn parses_function_style_predicates() {
        let contains = parse("contains(title, 'fox')").unwrap();
        let r = row(&[("title", Value::Utf8("the quick fox".to_string()))]);
        assert!(eval(&contains, &get_from(&r)).unwrap());

        let any = parse("array_has_any(tags, ('x', 'y'))").unwrap();
        let r2 = row(&[("tags", Value::List(vec![Value::Utf8("y".to_string())]))]);
        assert!(eval(&any, &get_from(&r2)).unwrap());
    }

    #[test]
    fn cast_coerces_before_comparison() {
        let predicate = parse("CAST(collection_position AS utf8) = '5'").unwrap();
        let r = row(&[("collection_position", Value::Int64(5))]);
        assert!(eval(&predicate, &get_from(&r)).unwrap());
    }

    #[test]
    fn dotted_identifiers_are_rejected() {
        let err = parse("a.b = 1").unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }

    #[test]
    fn typed_literals_parse() {
        let predicate = parse("created_at = date '2024-01-01'").unwrap();
        match predicate {
            Predicate::Compare(_, CompareOp::Eq, Value::Date(d)) => assert_eq!(d, "2024-01-01"),
            _ => panic!("expected a date comparison"),
        }
    }
}
