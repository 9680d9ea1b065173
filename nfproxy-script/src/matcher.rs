//! ## nfproxy-script::matcher
//! **Byte matchers used by script rules**
//!
//! `contains` lists compile into a single Aho-Corasick automaton, `regex`
//! patterns into a byte regex. Both are built once when the script is read
//! and shared read-only by every connection afterwards.

use std::str::FromStr;

use aho_corasick::AhoCorasick;
use bytes::Bytes;
use nfproxy_core::datatype::DataValue;
use regex::bytes::Regex;

pub enum Matcher {
    Contains(AhoCorasick),
    Regex(Regex),
    Always,
}

impl Matcher {
    pub fn contains<P: AsRef<[u8]>>(patterns: &[P]) -> Result<Self, String> {
        if patterns.is_empty() {
            return Err("contains needs at least one pattern".to_string());
        }
        AhoCorasick::new(patterns)
            .map(Matcher::Contains)
            .map_err(|e| format!("pattern compilation failed: {e}"))
    }

    pub fn regex(pattern: &str) -> Result<Self, String> {
        Regex::new(pattern)
            .map(Matcher::Regex)
            .map_err(|e| format!("invalid regex: {e}"))
    }

    #[inline]
    pub fn is_match(&self, data: &[u8]) -> bool {
        match self {
            Matcher::Contains(ac) => ac.is_match(data),
            Matcher::Regex(re) => re.is_match(data),
            Matcher::Always => true,
        }
    }

    pub fn as_regex(&self) -> Option<&Regex> {
        match self {
            Matcher::Regex(re) => Some(re),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Matcher::Contains(ac) => write!(f, "Contains({} patterns)", ac.patterns_len()),
            Matcher::Regex(re) => write!(f, "Regex({})", re.as_str()),
            Matcher::Always => f.write_str("Always"),
        }
    }
}

/// Part of a value a rule looks at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    Method,
    Url,
    Status,
    Body,
    Header(String),
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "method" => Ok(Field::Method),
            "url" => Ok(Field::Url),
            "status" => Ok(Field::Status),
            "body" => Ok(Field::Body),
            _ => match s.strip_prefix("header:") {
                Some(name) if !name.is_empty() => Ok(Field::Header(name.to_string())),
                _ => Err(format!("unknown field '{s}'")),
            },
        }
    }
}

/// Bytes of `value` selected by `field`. `None` when the field is absent
/// from this value, e.g. the status of a request.
pub fn subject(value: &DataValue, field: Option<&Field>) -> Option<Bytes> {
    let Some(field) = field else {
        return Some(value.bytes());
    };
    let msg = value.as_http()?;
    match field {
        Field::Method => msg.method().map(|m| Bytes::copy_from_slice(m.as_bytes())),
        Field::Url => msg.url().map(|u| Bytes::copy_from_slice(u.as_bytes())),
        Field::Status => msg.status().map(|s| Bytes::from(s.to_string())),
        Field::Body => Some(msg.body.clone()),
        Field::Header(name) => msg
            .header(name)
            .map(|v| Bytes::copy_from_slice(v.as_bytes())),
    }
}
