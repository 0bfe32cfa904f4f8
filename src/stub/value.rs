//! Normalized parameter values
//!
//! Request parameters arrive loosely typed: query strings are always text,
//! JSON bodies may carry real numbers, and fixture declarations mix both.
//! Everything is folded into one closed type before comparison so the
//! matcher never branches on the declaration source.

use std::collections::BTreeMap;

use serde_json::Value as Json;

/// A normalized parameter value.
///
/// Digit-only strings become integers, comma-separated strings become lists,
/// and lists are normalized element-wise. A list is an `IntList` only when
/// every element normalizes to an integer; otherwise each element keeps its
/// string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// A single integer
    Int(i64),
    /// A single trimmed string
    Str(String),
    /// A list of integers
    IntList(Vec<i64>),
    /// A list of strings
    StrList(Vec<String>),
}

/// One element of a comma-list or JSON array, before list-shape resolution.
#[derive(Debug, Clone)]
enum Scalar {
    Int(i64),
    Str(String),
}

impl Scalar {
    fn from_str(raw: &str) -> Self {
        let trimmed = raw.trim();
        if is_digits(trimmed) {
            match trimmed.parse::<i64>() {
                Ok(n) => Self::Int(n),
                Err(_) => Self::Str(trimmed.to_string()),
            }
        } else {
            Self::Str(trimmed.to_string())
        }
    }

    fn from_json(value: &Json) -> Self {
        match value {
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Str(n.to_string()),
            },
            Json::String(s) => Self::from_str(s),
            other => Self::Str(other.to_string()),
        }
    }

    fn into_string(self) -> String {
        match self {
            Self::Int(n) => n.to_string(),
            Self::Str(s) => s,
        }
    }
}

/// A digit-only, non-empty string (no sign, no separators).
fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Collapse a scalar sequence into a list value. Mixed sequences fall back
/// to string elements so the result always fits the closed type.
fn list_of(scalars: Vec<Scalar>) -> ParamValue {
    if scalars.iter().all(|s| matches!(s, Scalar::Int(_))) {
        ParamValue::IntList(
            scalars
                .into_iter()
                .map(|s| match s {
                    Scalar::Int(n) => n,
                    Scalar::Str(_) => unreachable!(),
                })
                .collect(),
        )
    } else {
        ParamValue::StrList(scalars.into_iter().map(Scalar::into_string).collect())
    }
}

impl ParamValue {
    /// Normalize a raw string: trim, promote digit-only strings to integers,
    /// split comma-separated strings into lists.
    #[must_use]
    pub fn from_str(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.contains(',') {
            return list_of(trimmed.split(',').map(Scalar::from_str).collect());
        }
        match Scalar::from_str(trimmed) {
            Scalar::Int(n) => Self::Int(n),
            Scalar::Str(s) => Self::Str(s),
        }
    }

    /// Normalize a JSON value with the same rules applied element-wise to
    /// arrays. A JSON string containing commas also becomes a list, so
    /// `"1,2"` and `[1, 2]` compare equal.
    #[must_use]
    pub fn from_json(value: &Json) -> Self {
        match value {
            Json::String(s) => Self::from_str(s),
            Json::Array(items) => list_of(items.iter().map(Scalar::from_json).collect()),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Str(n.to_string()),
            },
            other => Self::Str(other.to_string()),
        }
    }
}

/// Normalize a whole parameter map.
#[must_use]
pub fn normalize_params(params: &serde_json::Map<String, Json>) -> BTreeMap<String, ParamValue> {
    params
        .iter()
        .map(|(k, v)| (k.clone(), ParamValue::from_json(v)))
        .collect()
}
