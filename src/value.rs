//! Dynamically-typed values flowing in and out of compiled parsers.
//!
//! A parser never knows what it is handed, so input is modelled as a closed
//! `Value` enum rather than `serde_json::Value`: schemas can describe things
//! JSON cannot carry (`undefined`, bigints, symbols, symbol-keyed records,
//! dates). Conversions to and from `serde_json::Value` are provided for the
//! common case.
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Number};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Identity-compared symbol. Two symbols with the same description are
/// still distinct unless one is a clone of the other.
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    description: Arc<str>,
}

/// Key of a record: either a string or a symbol.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    String(String),
    Symbol(Symbol),
}

/// Records keep input order; it drives the order of unexpected-key errors.
pub type Record = IndexMap<PropertyKey, Value>;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    String(String),
    Symbol(Symbol),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(Record),
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(0);

impl Symbol {
    pub fn new(description: impl Into<Arc<str>>) -> Self {
        Self {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
            description: description.into(),
        }
    }
    pub fn description(&self) -> &str { &self.description }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool { self.id == other.id }
}

impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) { self.id.hash(state) }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})#{}", self.description, self.id)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description)
    }
}

impl PropertyKey {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyKey::String(s) => Some(s),
            PropertyKey::Symbol(_) => None,
        }
    }
    pub fn to_value(&self) -> Value {
        match self {
            PropertyKey::String(s) => Value::String(s.clone()),
            PropertyKey::Symbol(s) => Value::Symbol(s.clone()),
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => f.write_str(s),
            PropertyKey::Symbol(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self { PropertyKey::String(s.to_string()) }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self { PropertyKey::String(s) }
}

impl From<Symbol> for PropertyKey {
    fn from(s: Symbol) -> Self { PropertyKey::Symbol(s) }
}

impl Value {
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<PropertyKey>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_undefined(&self) -> bool { matches!(self, Value::Undefined) }

    /// Non-null, non-array object (dates are not records).
    pub fn is_record(&self) -> bool { matches!(self, Value::Object(_)) }

    /// `typeof value === "object" && value !== null`.
    pub fn is_object_like(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_) | Value::Date(_))
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(xs) => Some(xs),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Record> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn get(&self, key: &PropertyKey) -> Option<&Value> {
        self.as_object().and_then(|m| m.get(key))
    }

    /// String coercion with `String(value)` semantics. Used to bucket
    /// discriminator values.
    pub fn js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::BigInt(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Symbol(s) => s.to_string(),
            Value::Date(d) => d.to_rfc2822(),
            Value::Array(xs) => xs
                .iter()
                .map(|x| match x {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.js_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
        }
    }

    /// `JSON.stringify` view of the value. `None` when the value itself has
    /// no JSON form (undefined, symbols) or contains a bigint.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        use serde_json::Value as J;
        Some(match self {
            Value::Undefined | Value::Symbol(_) => return None,
            Value::BigInt(_) => return None,
            Value::Null => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Number(n) => json_number(*n),
            Value::String(s) => J::String(s.clone()),
            Value::Date(d) => J::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Array(xs) => {
                let mut out = Vec::with_capacity(xs.len());
                for x in xs {
                    match x {
                        Value::Undefined | Value::Symbol(_) => out.push(J::Null),
                        other => out.push(other.to_json()?),
                    }
                }
                J::Array(out)
            }
            Value::Object(m) => {
                let mut out = Map::new();
                for (k, v) in m {
                    let PropertyKey::String(k) = k else { continue };
                    match v {
                        Value::Undefined | Value::Symbol(_) => continue,
                        other => {
                            out.insert(k.clone(), other.to_json()?);
                        }
                    }
                }
                J::Object(out)
            }
        })
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match v {
            J::Null => Value::Null,
            J::Bool(b) => Value::Bool(b),
            J::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            J::String(s) => Value::String(s),
            J::Array(xs) => Value::Array(xs.into_iter().map(Value::from).collect()),
            J::Object(m) => Value::Object(
                m.into_iter()
                    .map(|(k, v)| (PropertyKey::String(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::String(s.to_string()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Value::String(s) }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self { Value::Number(n) }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self { Value::Number(n as f64) }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self { Value::Symbol(s) }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self { Value::Date(d) }
}

impl From<Vec<Value>> for Value {
    fn from(xs: Vec<Value>) -> Self { Value::Array(xs) }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// `String(n)`: plain decimal notation for exponents in `-7..21`,
/// scientific (`1e+21`, `1.5e-7`) outside it, `-0` prints as `0`.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let sign = if n < 0.0 { "-" } else { "" };
    // shortest round-trip digits and the decimal exponent, `d.ddde<exp>`
    let scientific = format!("{:e}", n.abs());
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return format!("{n}");
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let Ok(exponent) = exponent.parse::<i32>() else {
        return format!("{n}");
    };
    let k = digits.len() as i32;
    let point = exponent + 1;
    let body = if k <= point && point <= 21 {
        format!("{digits}{}", "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        format!("{int}.{frac}")
    } else if -6 < point && point <= 0 {
        format!("0.{}{digits}", "0".repeat((-point) as usize))
    } else {
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{first}e{exp_sign}{}", exponent.abs())
        } else {
            format!("{first}.{rest}e{exp_sign}{}", exponent.abs())
        }
    };
    format!("{sign}{body}")
}

/// Prefer an integral JSON number when the float is integral (keeps `1`
/// from serializing as `1.0`). Non-finite numbers serialize as `null`.
pub(crate) fn json_number(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        return serde_json::Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}
