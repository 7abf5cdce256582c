//! Literal values carried by params.
//!
//! A [`Value`] is the structured payload of a param: a number, a string, a
//! condition list of dictionaries, and so on. There is exactly one textual
//! form for every value, the Python literal produced by [`Value::to_literal`],
//! and [`Value::parse_literal`] reads that form back. Script generation and
//! the XML document both go through this pair, so structured values such as
//! condition lists survive a save/load cycle without special handling.
//!
//! The parser is deliberately a literal grammar (numbers, strings, booleans,
//! `None`, lists, tuples and string-keyed dicts) and not an expression
//! evaluator. It is also what [`crate::routine::Routine::max_time`] uses to
//! read component time intervals.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use thiserror::Error;

/// A literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Python `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// Floating point literal
    Float(f64),
    /// String
    Str(String),
    /// List (tuples parse to lists too)
    List(Vec<Value>),
    /// Dictionary with string keys, in insertion order
    Dict(IndexMap<String, Value>),
}

/// Failure to parse a literal.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid literal at offset {offset}: {message}")]
pub struct LiteralError {
    /// Byte offset of the problem
    pub offset: usize,
    /// Description
    pub message: String,
}

impl Value {
    /// Render as a Python literal.
    pub fn to_literal(&self) -> String {
        let mut out = String::new();
        self.write_literal(&mut out);
        out
    }

    fn write_literal(&self, out: &mut String) {
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Value::Float(f) => out.push_str(&float_literal(*f)),
            Value::Str(s) => out.push_str(&quote_str(s)),
            Value::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_literal(out);
                }
                out.push(']');
            }
            Value::Dict(map) => {
                out.push('{');
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&quote_str(key));
                    out.push_str(": ");
                    item.write_literal(out);
                }
                out.push('}');
            }
        }
    }

    /// Parse a literal previously produced by [`Value::to_literal`] (or written by hand).
    pub fn parse_literal(text: &str) -> Result<Value, LiteralError> {
        let mut parser = Parser { src: text, pos: 0 };
        parser.skip_ws();
        let value = parser.value()?;
        parser.skip_ws();
        if parser.pos != text.len() {
            return Err(parser.error("unexpected trailing characters"));
        }
        Ok(value)
    }

    /// Numeric view of a scalar value.
    ///
    /// Strings are accepted when they parse as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// String view, only for `Value::Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Every numeric leaf of a (possibly nested) list, in order.
    pub fn numbers(&self) -> Result<Vec<f64>, String> {
        let mut out = Vec::new();
        self.collect_numbers(&mut out)?;
        Ok(out)
    }

    fn collect_numbers(&self, out: &mut Vec<f64>) -> Result<(), String> {
        match self {
            Value::Int(i) => out.push(*i as f64),
            Value::Float(f) if f.is_finite() => out.push(*f),
            Value::List(items) => {
                for item in items {
                    item.collect_numbers(out)?;
                }
            }
            other => return Err(format!("{} is not a number", other.to_literal())),
        }
        Ok(())
    }

    /// True for anything that is not a list or dict.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Dict(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(v: IndexMap<String, Value>) -> Self {
        Value::Dict(v)
    }
}

/// Float literal that always reads back as a float.
pub fn float_literal(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    // Debug output always carries a '.' or an exponent.
    format!("{f:?}")
}

/// Quote a string the way Python's `repr` does.
pub fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c == '\x7f' => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            // Line continuations show up in multi-line condition lists.
            if c.is_whitespace() || c == '\\' && self.rest()[1..].starts_with('\n') {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        let rest = self.rest();
        if !rest.starts_with(word) {
            return false;
        }
        let after = rest[word.len()..].chars().next();
        if after.is_some_and(|c| c.is_alphanumeric() || c == '_') {
            return false;
        }
        self.pos += word.len();
        true
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('[') => {
                self.bump();
                self.sequence(']').map(Value::List)
            }
            Some('(') => {
                self.bump();
                self.sequence(')').map(Value::List)
            }
            Some('{') => {
                self.bump();
                self.dict()
            }
            Some(q @ ('\'' | '"')) => {
                self.bump();
                self.string(q).map(Value::Str)
            }
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            Some(_) => {
                if self.eat_word("None") {
                    Ok(Value::None)
                } else if self.eat_word("True") {
                    Ok(Value::Bool(true))
                } else if self.eat_word("False") {
                    Ok(Value::Bool(false))
                } else if self.eat_word("inf") {
                    Ok(Value::Float(f64::INFINITY))
                } else if self.eat_word("nan") {
                    Ok(Value::Float(f64::NAN))
                } else {
                    Err(self.error("expected a literal"))
                }
            }
        }
    }

    fn sequence(&mut self, close: char) -> Result<Vec<Value>, LiteralError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(items);
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => return Ok(items),
                _ => return Err(self.error(format!("expected ',' or '{close}'"))),
            }
        }
    }

    fn dict(&mut self) -> Result<Value, LiteralError> {
        let mut map = IndexMap::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(Value::Dict(map));
            }
            let key = match self.value()? {
                Value::Str(key) => key,
                _ => return Err(self.error("dict keys must be strings")),
            };
            self.skip_ws();
            if self.bump() != Some(':') {
                return Err(self.error("expected ':'"));
            }
            self.skip_ws();
            let item = self.value()?;
            map.insert(key, item);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Dict(map)),
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<String, LiteralError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    let escaped = self.bump().ok_or_else(|| self.error("dangling escape"))?;
                    match escaped {
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        '0' => out.push('\0'),
                        '\\' | '\'' | '"' => out.push(escaped),
                        '\n' => {}
                        'x' => out.push(self.hex_escape(2)?),
                        'u' => out.push(self.hex_escape(4)?),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, LiteralError> {
        let rest = self.rest();
        let hex = rest
            .get(..digits)
            .ok_or_else(|| self.error("truncated escape"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| self.error("bad hex escape"))?;
        self.pos += digits;
        char::from_u32(code).ok_or_else(|| self.error("escape is not a character"))
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
            self.skip_ws();
            if self.eat_word("inf") {
                let negative = self.src[start..].starts_with('-');
                return Ok(Value::Float(if negative {
                    f64::NEG_INFINITY
                } else {
                    f64::INFINITY
                }));
            }
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    self.bump();
                    if matches!(self.peek(), Some('-' | '+')) {
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }
        let text: String = self.src[start..self.pos]
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect();
        if !is_float {
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Value::Int(i));
            }
        }
        text.parse::<f64>().map(Value::Float).map_err(|_| LiteralError {
            offset: start,
            message: format!("'{text}' is not a number"),
        })
    }
}
