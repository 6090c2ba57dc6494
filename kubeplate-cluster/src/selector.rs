//! Label selector parsing and matching.
//!
//! Accepts the API server's label-selector syntax so that a selector that
//! works against the server in direct mode behaves identically when it is
//! evaluated against the local mirror in cached mode:
//!
//! ```text
//! app=web, tier==front, env!=prod, zone in (a, b), zone notin (c), canary, !legacy, replicas>2
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Why a selector string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} (at byte {position})")]
pub struct SelectorError {
    pub reason: String,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operator {
    Exists,
    DoesNotExist,
    Equals(String),
    NotEquals(String),
    In(BTreeSet<String>),
    NotIn(BTreeSet<String>),
    GreaterThan(i64),
    LessThan(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Requirement {
    key: String,
    op: Operator,
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match &self.op {
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
            Operator::Equals(expected) => value == Some(expected),
            Operator::NotEquals(expected) => value != Some(expected),
            Operator::In(set) => value.is_some_and(|v| set.contains(v)),
            Operator::NotIn(set) => !value.is_some_and(|v| set.contains(v)),
            Operator::GreaterThan(bound) => parse_int(value).is_some_and(|v| v > *bound),
            Operator::LessThan(bound) => parse_int(value).is_some_and(|v| v < *bound),
        }
    }
}

fn parse_int(value: Option<&String>) -> Option<i64> {
    value.and_then(|v| v.parse().ok())
}

/// A parsed label selector. The empty selector matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector {
    raw: String,
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Parse `input`. Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let tokens = lex(input)?;
        let requirements = Parser { tokens, pos: 0 }.parse()?;
        Ok(Self {
            raw: input.trim().to_string(),
            requirements,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// The selector as given, trimmed; what direct mode sends to the server.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Bang,
    Eq,
    DoubleEq,
    NotEq,
    Gt,
    Lt,
    Open,
    Close,
    Comma,
}

fn is_special(c: char) -> bool {
    matches!(c, '=' | '!' | '(' | ')' | ',' | '<' | '>')
}

fn lex(input: &str) -> Result<Vec<(Token, usize)>, SelectorError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if is_special(c) {
            chars.next();
            let next_is_eq = matches!(chars.peek(), Some(&(_, '=')));
            let token = match c {
                '=' if next_is_eq => {
                    chars.next();
                    Token::DoubleEq
                }
                '!' if next_is_eq => {
                    chars.next();
                    Token::NotEq
                }
                '=' => Token::Eq,
                '!' => Token::Bang,
                '(' => Token::Open,
                ')' => Token::Close,
                ',' => Token::Comma,
                '<' => Token::Lt,
                _ => Token::Gt,
            };
            tokens.push((token, pos));
            continue;
        }
        let mut ident = String::new();
        while let Some(&(_, c)) = chars.peek() {
            if c.is_whitespace() || is_special(c) {
                break;
            }
            ident.push(c);
            chars.next();
        }
        tokens.push((Token::Ident(ident), pos));
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, p)| *p)
            .or_else(|| self.tokens.last().map(|(_, p)| p + 1))
            .unwrap_or(0)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn error(&self, reason: impl Into<String>) -> SelectorError {
        SelectorError {
            reason: reason.into(),
            position: self.offset(),
        }
    }

    fn parse(mut self) -> Result<Vec<Requirement>, SelectorError> {
        let mut requirements = Vec::new();
        if self.peek().is_none() {
            return Ok(requirements);
        }
        loop {
            requirements.push(self.requirement()?);
            match self.next() {
                None => return Ok(requirements),
                Some(Token::Comma) if self.peek().is_some() => continue,
                Some(Token::Comma) => return Err(self.error("trailing comma")),
                Some(other) => {
                    self.pos -= 1;
                    return Err(self.error(format!("expected ',' but found {other:?}")));
                }
            }
        }
    }

    fn requirement(&mut self) -> Result<Requirement, SelectorError> {
        if self.peek() == Some(&Token::Bang) {
            self.next();
            let key = self.key()?;
            return Ok(Requirement {
                key,
                op: Operator::DoesNotExist,
            });
        }

        let key = self.key()?;
        let op = match self.peek() {
            None | Some(Token::Comma) => Operator::Exists,
            Some(Token::Eq) | Some(Token::DoubleEq) => {
                self.next();
                Operator::Equals(self.value()?)
            }
            Some(Token::NotEq) => {
                self.next();
                Operator::NotEquals(self.value()?)
            }
            Some(Token::Gt) => {
                self.next();
                Operator::GreaterThan(self.integer()?)
            }
            Some(Token::Lt) => {
                self.next();
                Operator::LessThan(self.integer()?)
            }
            Some(Token::Ident(word)) if word == "in" => {
                self.next();
                Operator::In(self.value_set()?)
            }
            Some(Token::Ident(word)) if word == "notin" => {
                self.next();
                Operator::NotIn(self.value_set()?)
            }
            Some(other) => return Err(self.error(format!("unexpected {other:?} after key '{key}'"))),
        };
        Ok(Requirement { key, op })
    }

    fn key(&mut self) -> Result<String, SelectorError> {
        match self.peek() {
            Some(Token::Ident(_)) => {}
            _ => return Err(self.error("expected label key")),
        }
        let Some(Token::Ident(key)) = self.next() else {
            return Err(self.error("expected label key"));
        };
        validate_key(&key).map_err(|reason| SelectorError {
            reason,
            position: self.tokens[self.pos - 1].1,
        })?;
        Ok(key)
    }

    /// A value may be empty (`key=`) when followed by a comma or the end.
    fn value(&mut self) -> Result<String, SelectorError> {
        match self.peek() {
            None | Some(Token::Comma) => Ok(String::new()),
            Some(Token::Ident(_)) => {
                let Some(Token::Ident(value)) = self.next() else {
                    return Err(self.error("expected label value"));
                };
                validate_value(&value).map_err(|reason| self.error(reason))?;
                Ok(value)
            }
            Some(other) => Err(self.error(format!("expected label value, found {other:?}"))),
        }
    }

    fn integer(&mut self) -> Result<i64, SelectorError> {
        match self.next() {
            Some(Token::Ident(value)) => value
                .parse()
                .map_err(|_| self.error(format!("'{value}' is not an integer"))),
            _ => Err(self.error("expected integer value")),
        }
    }

    fn value_set(&mut self) -> Result<BTreeSet<String>, SelectorError> {
        if self.next() != Some(Token::Open) {
            return Err(self.error("expected '(' to open value set"));
        }
        let mut values = BTreeSet::new();
        loop {
            match self.peek() {
                Some(Token::Close) => {
                    self.next();
                    return Ok(values);
                }
                Some(Token::Comma) => {
                    // empty member, e.g. "(a,,b)" or "(,a)"
                    self.next();
                    values.insert(String::new());
                    continue;
                }
                Some(Token::Ident(_)) => {
                    let value = self.value()?;
                    values.insert(value);
                    match self.next() {
                        Some(Token::Comma) => continue,
                        Some(Token::Close) => return Ok(values),
                        _ => return Err(self.error("expected ',' or ')' in value set")),
                    }
                }
                _ => return Err(self.error("unterminated value set")),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

fn is_name(s: &str) -> bool {
    let bytes = s.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= MAX_NAME_LEN
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn is_dns_subdomain(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_PREFIX_LEN
        && s.split('.').all(|label| {
            let b = label.as_bytes();
            !b.is_empty()
                && b[0].is_ascii_alphanumeric()
                && b[b.len() - 1].is_ascii_alphanumeric()
                && b.iter().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == b'-')
        })
}

fn validate_key(key: &str) -> Result<(), String> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };
    if let Some(prefix) = prefix {
        if !is_dns_subdomain(prefix) {
            return Err(format!("invalid label key prefix '{prefix}'"));
        }
    }
    if !is_name(name) {
        return Err(format!("invalid label key '{key}'"));
    }
    Ok(())
}

fn validate_value(value: &str) -> Result<(), String> {
    if value.is_empty() || is_name(value) {
        Ok(())
    } else {
        Err(format!("invalid label value '{value}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_selector_matches_everything() {
        let s = Selector::parse("  ").unwrap();
        assert!(s.is_empty());
        assert!(s.matches(&labels(&[])));
        assert!(s.matches(&labels(&[("app", "web")])));
    }

    #[test]
    fn equality_forms() {
        let l = labels(&[("app", "web"), ("env", "dev")]);
        assert!(Selector::parse("app=web").unwrap().matches(&l));
        assert!(Selector::parse("app==web").unwrap().matches(&l));
        assert!(Selector::parse("env!=prod").unwrap().matches(&l));
        assert!(!Selector::parse("app=api").unwrap().matches(&l));
        assert!(Selector::parse("missing!=x").unwrap().matches(&l));
    }

    #[test]
    fn set_forms() {
        let l = labels(&[("zone", "b")]);
        assert!(Selector::parse("zone in (a, b)").unwrap().matches(&l));
        assert!(!Selector::parse("zone notin (a,b)").unwrap().matches(&l));
        assert!(Selector::parse("tier notin (front)").unwrap().matches(&l));
        assert!(!Selector::parse("tier in (front)").unwrap().matches(&l));
    }

    #[test]
    fn existence_forms() {
        let l = labels(&[("canary", "")]);
        assert!(Selector::parse("canary").unwrap().matches(&l));
        assert!(Selector::parse("!legacy").unwrap().matches(&l));
        assert!(!Selector::parse("!canary").unwrap().matches(&l));
    }

    #[test]
    fn numeric_comparisons() {
        let l = labels(&[("replicas", "3")]);
        assert!(Selector::parse("replicas>2").unwrap().matches(&l));
        assert!(!Selector::parse("replicas<3").unwrap().matches(&l));
        assert!(Selector::parse("replicas>x").is_err());
    }

    #[test]
    fn conjunction_requires_every_requirement() {
        let l = labels(&[("app", "web"), ("env", "dev")]);
        assert!(Selector::parse("app=web,env=dev").unwrap().matches(&l));
        assert!(!Selector::parse("app=web, env=prod").unwrap().matches(&l));
    }

    #[test]
    fn prefixed_keys_are_accepted() {
        let l = labels(&[("app.kubernetes.io/name", "nginx")]);
        assert!(Selector::parse("app.kubernetes.io/name=nginx").unwrap().matches(&l));
    }

    #[test]
    fn malformed_selectors_are_rejected() {
        for bad in [
            "app=",
            "=web",
            "app=web,",
            "app in a,b",
            "app in (a,b",
            "app web",
            "-bad=x",
            "app=web!",
            "Bad_Prefix/x=y",
        ] {
            if bad == "app=" {
                // an empty value is legal
                assert!(Selector::parse(bad).is_ok());
                continue;
            }
            assert!(Selector::parse(bad).is_err(), "expected '{bad}' to be rejected");
        }
    }

    #[test]
    fn keeps_raw_text_for_server_side_queries() {
        let s: Selector = " app = web ".parse().unwrap();
        assert_eq!(s.as_str(), "app = web");
        assert_eq!(s.to_string(), "app = web");
    }
}
