//! Search domain parsing.
//!
//! A domain is a list of `(field, operator, value)` conditions, optionally
//! interleaved with the prefix operators `&`, `|` and `!`. Both JSON
//! (`[["state", "=", "draft"]]`) and Python-literal syntax
//! (`[('state', '=', 'draft'), ('active', '=', True)]`) are accepted.

use serde_json::{Number, Value};

use crate::error::BridgeError;

const DOMAIN_OPERATORS: &[&str] = &["&", "|", "!"];

/// Deepest list/tuple nesting the parser descends into.
const MAX_DEPTH: usize = 64;

/// A parsed search domain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Domain(Vec<Value>);

impl Domain {
    /// The empty domain, matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Single equality condition on the record id.
    pub fn by_id(id: i64) -> Self {
        Domain(vec![Value::Array(vec!["id".into(), "=".into(), id.into()])])
    }

    pub fn terms(&self) -> &[Value] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.0.clone())
    }

    /// Parse a serialized filter expression.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::MalformedFilter` if the text is not a list of
    /// conditions and domain operators.
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let mut parser = Parser::new(raw);
        let value = parser.value()?;
        parser.skip_ws();
        if let Some(ch) = parser.peek() {
            return Err(parser.error(format!("unexpected trailing '{ch}'")));
        }
        Self::from_value(value)
    }

    /// Check an already-decoded domain value.
    pub fn from_value(value: Value) -> Result<Self, BridgeError> {
        let Value::Array(terms) = value else {
            return Err(malformed("domain must be a list"));
        };
        for term in &terms {
            match term {
                Value::String(op) if DOMAIN_OPERATORS.contains(&op.as_str()) => {}
                Value::Array(cond) if cond.len() == 3 && cond[0].is_string() => {}
                other => {
                    return Err(malformed(format!(
                        "invalid domain term {other}: expected (field, operator, value) or one of & | !"
                    )))
                }
            }
        }
        Ok(Domain(terms))
    }
}

fn malformed(message: impl Into<String>) -> BridgeError {
    BridgeError::MalformedFilter {
        message: message.into(),
    }
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    src: &'a str,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.char_indices().peekable(),
            src,
            depth: 0,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map(|&(i, _)| i).unwrap_or(self.src.len())
    }

    fn error(&mut self, message: String) -> BridgeError {
        let at = self.offset();
        malformed(format!("{message} at offset {at}"))
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn value(&mut self) -> Result<Value, BridgeError> {
        self.skip_ws();
        match self.peek() {
            Some('[') => self.sequence(']'),
            Some('(') => self.sequence(')'),
            Some(q @ ('\'' | '"')) => self.string(q).map(Value::String),
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_alphabetic() => self.keyword(),
            Some(c) => Err(self.error(format!("unexpected '{c}'"))),
            None => Err(self.error("unexpected end of input".to_string())),
        }
    }

    fn sequence(&mut self, close: char) -> Result<Value, BridgeError> {
        if self.depth == MAX_DEPTH {
            return Err(self.error("filter nested too deeply".to_string()));
        }
        self.depth += 1;
        let items = self.items(close);
        self.depth -= 1;
        items
    }

    fn items(&mut self, close: char) -> Result<Value, BridgeError> {
        self.chars.next();
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.chars.next();
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.chars.next();
                }
                Some(c) if c == close => {}
                _ => return Err(self.error(format!("expected ',' or '{close}'"))),
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<String, BridgeError> {
        self.chars.next();
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some((_, c)) if c == quote => return Ok(out),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, c)) => out.push(c),
                    None => break,
                },
                Some((_, c)) => out.push(c),
                None => break,
            }
        }
        Err(self.error("unterminated string".to_string()))
    }

    fn number(&mut self) -> Result<Value, BridgeError> {
        let start = self.offset();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.chars.next();
        }
        let end = self.offset();
        let text = &self.src[start..end];
        if let Ok(n) = text.parse::<i64>() {
            return Ok(Value::Number(n.into()));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| malformed(format!("invalid number '{text}' at offset {start}")))
    }

    fn keyword(&mut self) -> Result<Value, BridgeError> {
        let start = self.offset();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.chars.next();
        }
        let end = self.offset();
        match &self.src[start..end] {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            other => Err(malformed(format!(
                "unknown name '{other}' at offset {start}"
            ))),
        }
    }
}
