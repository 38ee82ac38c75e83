//! Common refinements. Each carries the JSON-Schema keyword it stands for,
//! so the projector can emit it and the decoder can rebuild it.
use regex::Regex;
use serde_json::{Map, Value as Json, json};

use crate::ast::{Annotations, AstId};
use crate::ast::builder::AstBuilder;
use crate::error::AstError;
use crate::value::{Value, json_number};

impl AstBuilder {
    pub fn min_length(&mut self, from: AstId, min: usize) -> AstId {
        self.filter(
            from,
            move |v| v.as_str().is_some_and(|s| s.chars().count() >= min),
            constraint("minLength", json!(min), format!("a string at least {min} character(s) long")),
        )
    }

    pub fn max_length(&mut self, from: AstId, max: usize) -> AstId {
        self.filter(
            from,
            move |v| v.as_str().is_some_and(|s| s.chars().count() <= max),
            constraint("maxLength", json!(max), format!("a string at most {max} character(s) long")),
        )
    }

    pub fn pattern(&mut self, from: AstId, pattern: &str) -> Result<AstId, AstError> {
        let regex = Regex::new(pattern).map_err(|e| AstError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(self.filter(
            from,
            move |v| v.as_str().is_some_and(|s| regex.is_match(s)),
            constraint("pattern", json!(pattern), format!("a string matching the pattern {pattern}")),
        ))
    }

    pub fn int(&mut self, from: AstId) -> AstId {
        self.filter(
            from,
            |v| v.as_f64().is_some_and(|n| n.is_finite() && n.fract() == 0.0),
            constraint("type", json!("integer"), "an integer".to_string()),
        )
    }

    pub fn minimum(&mut self, from: AstId, min: f64) -> AstId {
        self.filter(
            from,
            move |v| number(v).is_some_and(|n| n >= min),
            constraint("minimum", json_number(min), format!("a number greater than or equal to {}", fmt(min))),
        )
    }

    pub fn maximum(&mut self, from: AstId, max: f64) -> AstId {
        self.filter(
            from,
            move |v| number(v).is_some_and(|n| n <= max),
            constraint("maximum", json_number(max), format!("a number less than or equal to {}", fmt(max))),
        )
    }

    pub fn exclusive_minimum(&mut self, from: AstId, min: f64) -> AstId {
        self.filter(
            from,
            move |v| number(v).is_some_and(|n| n > min),
            constraint("exclusiveMinimum", json_number(min), format!("a number greater than {}", fmt(min))),
        )
    }

    pub fn exclusive_maximum(&mut self, from: AstId, max: f64) -> AstId {
        self.filter(
            from,
            move |v| number(v).is_some_and(|n| n < max),
            constraint("exclusiveMaximum", json_number(max), format!("a number less than {}", fmt(max))),
        )
    }

    pub fn multiple_of(&mut self, from: AstId, divisor: f64) -> AstId {
        self.filter(
            from,
            move |v| {
                number(v).is_some_and(|n| {
                    let q = n / divisor;
                    q.is_finite() && q.fract() == 0.0
                })
            },
            constraint("multipleOf", json_number(divisor), format!("a number divisible by {}", fmt(divisor))),
        )
    }

    pub fn min_items(&mut self, from: AstId, min: usize) -> AstId {
        self.filter(
            from,
            move |v| v.as_array().is_some_and(|xs| xs.len() >= min),
            constraint("minItems", json!(min), format!("an array of at least {min} items")),
        )
    }

    pub fn max_items(&mut self, from: AstId, max: usize) -> AstId {
        self.filter(
            from,
            move |v| v.as_array().is_some_and(|xs| xs.len() <= max),
            constraint("maxItems", json!(max), format!("an array of at most {max} items")),
        )
    }
}

fn constraint(keyword: &str, value: Json, description: String) -> Annotations {
    let mut fragment = Map::new();
    fragment.insert(keyword.to_string(), value);
    Annotations::new().description(description).json_schema(fragment)
}

fn number(v: &Value) -> Option<f64> { v.as_f64().filter(|n| !n.is_nan()) }

fn fmt(n: f64) -> String { crate::value::format_number(n) }
