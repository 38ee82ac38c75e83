//! JSON-Schema document to [`Ast`], for the subset [`super::project`] emits.
//!
//! `$ref`s resolve against the document's `$defs`. Each referenced
//! definition becomes one lazy node, reserved before its body is decoded, so
//! recursive definitions point back at it instead of unrolling.
use indexmap::IndexMap;
use serde_json::{Map, Value as Json};
use tracing::{debug, trace};

use super::{ANY_ID, DEFINITION_PREFIX, EMPTY_ID, ENUMS_COMMENT, OBJECT_ID, UNKNOWN_ID};
use crate::ast::annotations::Annotations;
use crate::ast::builder::AstBuilder;
use crate::ast::{Ast, AstId, Element, IndexSignature, LiteralValue, PropertySignature};
use crate::error::JsonSchemaError;

struct Decoder<'a> {
    builder: AstBuilder,
    defs: Option<&'a Map<String, Json>>,
    refs: IndexMap<String, AstId>,     // definition name -> its lazy node
}

pub fn decode(document: &Json) -> Result<Ast, JsonSchemaError> {
    let mut decoder = Decoder {
        builder: AstBuilder::new(),
        defs: document.get("$defs").and_then(Json::as_object),
        refs: IndexMap::new(),
    };
    let root = decoder.go(document)?;
    debug!(nodes = decoder.builder.len(), definitions = decoder.refs.len(), "decoded JSON Schema");
    Ok(decoder.builder.finish(root)?)
}

impl Decoder<'_> {
    fn go(&mut self, schema: &Json) -> Result<AstId, JsonSchemaError> {
        let map = match schema {
            Json::Bool(true) => return Ok(self.builder.unknown()),
            Json::Bool(false) => return Ok(self.builder.never()),
            Json::Object(map) => map,
            other => return Err(undecodable(other)),
        };
        if let Some(reference) = map.get("$ref") {
            return self.reference(reference);
        }
        let id = self.shape(map, schema)?;
        let annotations = metadata(map);
        Ok(if annotations.is_empty() { id } else { self.builder.annotate(id, annotations) })
    }

    fn shape(&mut self, map: &Map<String, Json>, schema: &Json) -> Result<AstId, JsonSchemaError> {
        let b = &mut self.builder;
        match map.get("$id").and_then(Json::as_str) {
            Some(ANY_ID) => return Ok(b.any()),
            Some(UNKNOWN_ID) => return Ok(b.unknown()),
            Some(OBJECT_ID) => return Ok(b.object()),
            Some(EMPTY_ID) => return Ok(b.struct_(Vec::new())),
            _ => {}
        }
        if let Some(value) = map.get("const") {
            let literal = literal(value)?;
            return Ok(self.builder.literal(literal));
        }
        if let Some(members) = map.get("anyOf") {
            return self.union(members);
        }
        if let Some(members) = map.get("oneOf") {
            if map.get("$comment").and_then(Json::as_str) == Some(ENUMS_COMMENT) {
                return self.enums(members);
            }
            return self.union(members);
        }
        match map.get("type").and_then(Json::as_str) {
            Some("null") => Ok(self.builder.null()),
            Some("boolean") => Ok(self.builder.boolean()),
            Some("string") => self.string(map),
            Some("number") => {
                let n = self.builder.number();
                Ok(self.numeric(n, map))
            }
            Some("integer") => {
                let n = self.builder.number();
                let int = self.builder.int(n);
                Ok(self.numeric(int, map))
            }
            Some("array") => self.array(map),
            Some("object") => self.object(map),
            _ => Err(undecodable(schema)),
        }
    }

    fn reference(&mut self, reference: &Json) -> Result<AstId, JsonSchemaError> {
        let raw = reference.as_str().ok_or_else(|| undecodable(reference))?;
        let name = raw.strip_prefix(DEFINITION_PREFIX).unwrap_or(raw);
        if let Some(lazy) = self.refs.get(name) {
            return Ok(*lazy);
        }
        let definition = self
            .defs
            .and_then(|defs| defs.get(name))
            .ok_or_else(|| JsonSchemaError::RefNotFound(raw.to_string()))?;
        let lazy = self.builder.reserve_lazy();
        self.refs.insert(name.to_string(), lazy);
        let target = self.go(definition)?;
        self.builder.define_lazy(lazy, target)?;
        trace!(%name, %lazy, "resolved $ref");
        Ok(self.builder.annotate(lazy, Annotations::new().identifier(name)))
    }

    fn union(&mut self, members: &Json) -> Result<AstId, JsonSchemaError> {
        let members = members.as_array().ok_or_else(|| undecodable(members))?;
        let ids = members.iter().map(|m| self.go(m)).collect::<Result<Vec<_>, _>>()?;
        Ok(self.builder.union(ids))
    }

    fn enums(&mut self, members: &Json) -> Result<AstId, JsonSchemaError> {
        let members = members.as_array().ok_or_else(|| undecodable(members))?;
        let enums = members
            .iter()
            .map(|m| {
                let title = m.get("title").and_then(Json::as_str).unwrap_or_default().to_string();
                let value = m.get("const").ok_or_else(|| undecodable(m))?;
                Ok((title, literal(value)?))
            })
            .collect::<Result<Vec<_>, JsonSchemaError>>()?;
        Ok(self.builder.enums(enums))
    }

    fn string(&mut self, map: &Map<String, Json>) -> Result<AstId, JsonSchemaError> {
        let b = &mut self.builder;
        let mut id = b.string();
        if let Some(min) = usize_of(map, "minLength") {
            id = b.min_length(id, min);
        }
        if let Some(max) = usize_of(map, "maxLength") {
            id = b.max_length(id, max);
        }
        if let Some(pattern) = map.get("pattern").and_then(Json::as_str) {
            id = b.pattern(id, pattern)?;
        }
        Ok(id)
    }

    fn numeric(&mut self, mut id: AstId, map: &Map<String, Json>) -> AstId {
        let b = &mut self.builder;
        if let Some(n) = map.get("minimum").and_then(Json::as_f64) {
            id = b.minimum(id, n);
        }
        if let Some(n) = map.get("maximum").and_then(Json::as_f64) {
            id = b.maximum(id, n);
        }
        if let Some(n) = map.get("exclusiveMinimum").and_then(Json::as_f64) {
            id = b.exclusive_minimum(id, n);
        }
        if let Some(n) = map.get("exclusiveMaximum").and_then(Json::as_f64) {
            id = b.exclusive_maximum(id, n);
        }
        if let Some(n) = map.get("multipleOf").and_then(Json::as_f64) {
            id = b.multiple_of(id, n);
        }
        id
    }

    fn array(&mut self, map: &Map<String, Json>) -> Result<AstId, JsonSchemaError> {
        let min_items = usize_of(map, "minItems");
        let max_items = usize_of(map, "maxItems");
        let id = match map.get("items") {
            // positional elements; past `minItems` they are optional
            Some(Json::Array(items)) => {
                let required = min_items.unwrap_or(0);
                let mut elements = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let ty = self.go(item)?;
                    elements.push(if i < required { Element::required(ty) } else { Element::optional(ty) });
                }
                let rest = match map.get("additionalItems") {
                    Some(Json::Bool(false)) => None,
                    None | Some(Json::Bool(true)) => Some(vec![self.builder.unknown()]),
                    Some(schema) => Some(vec![self.go(schema)?]),
                };
                let tuple = self.builder.tuple(elements, rest, true);
                return Ok(match max_items {
                    Some(max) => self.builder.max_items(tuple, max),
                    None => tuple,
                });
            }
            Some(item) => {
                let item = self.go(item)?;
                self.builder.array(item)
            }
            None if max_items == Some(0) => return Ok(self.builder.tuple(Vec::new(), None, true)),
            None => {
                let item = self.builder.unknown();
                self.builder.array(item)
            }
        };
        let b = &mut self.builder;
        let id = match min_items {
            Some(min) => b.min_items(id, min),
            None => id,
        };
        Ok(match max_items {
            Some(max) => b.max_items(id, max),
            None => id,
        })
    }

    fn object(&mut self, map: &Map<String, Json>) -> Result<AstId, JsonSchemaError> {
        let required: Vec<&str> = map
            .get("required")
            .and_then(Json::as_array)
            .map(|r| r.iter().filter_map(Json::as_str).collect())
            .unwrap_or_default();
        let mut properties = Vec::new();
        if let Some(declared) = map.get("properties").and_then(Json::as_object) {
            for (name, schema) in declared {
                let ty = self.go(schema)?;
                let mut signature = PropertySignature::new(name.as_str(), ty).readonly();
                if !required.contains(&name.as_str()) {
                    signature = signature.optional();
                }
                properties.push(signature);
            }
        }
        let additional = map.get("additionalProperties");
        let mut indexes = Vec::new();
        let value = match additional {
            Some(Json::Bool(false)) => None,
            None | Some(Json::Bool(true)) => Some(self.builder.unknown()),
            Some(schema) => Some(self.go(schema)?),
        };
        if let Some(value) = value {
            let mut key = self.builder.string();
            // undeclared keys must also satisfy `propertyNames`
            for pattern in map.get("propertyNames").map(name_patterns).unwrap_or_default() {
                key = self.builder.pattern(key, pattern)?;
            }
            indexes.push(IndexSignature::new(key, value));
        }
        if let Some(patterns) = map.get("patternProperties").and_then(Json::as_object) {
            for (pattern, schema) in patterns {
                let value = self.go(without_additional(schema, additional))?;
                let string = self.builder.string();
                let key = self.builder.pattern(string, pattern)?;
                indexes.push(IndexSignature::new(key, value));
            }
        }
        Ok(self.builder.type_literal(properties, indexes)?)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// The key patterns a `propertyNames` schema requires, skipping an `enum` of
/// declared names inside an `anyOf`.
fn name_patterns(schema: &Json) -> Vec<&str> {
    if let Some(pattern) = schema.get("pattern").and_then(Json::as_str) {
        return vec![pattern];
    }
    let branches = schema.get("allOf").or_else(|| schema.get("anyOf")).and_then(Json::as_array);
    branches
        .into_iter()
        .flatten()
        .filter(|branch| branch.get("enum").is_none())
        .flat_map(name_patterns)
        .collect()
}

/// A pattern property's own schema. The index signature over all string
/// keys already checks `additionalProperties`, so an `allOf` repeating it is
/// unwrapped.
fn without_additional<'a>(schema: &'a Json, additional: Option<&Json>) -> &'a Json {
    match schema.get("allOf").and_then(Json::as_array).map(Vec::as_slice) {
        Some([own, repeated]) if Some(repeated) == additional => own,
        _ => schema,
    }
}

fn usize_of(map: &Map<String, Json>, key: &str) -> Option<usize> {
    map.get(key).and_then(Json::as_u64).and_then(|n| usize::try_from(n).ok())
}

fn literal(value: &Json) -> Result<LiteralValue, JsonSchemaError> {
    match value {
        Json::Null => Ok(LiteralValue::Null),
        Json::Bool(b) => Ok(LiteralValue::Boolean(*b)),
        Json::String(s) => Ok(LiteralValue::String(s.clone())),
        Json::Number(n) => n.as_f64().map(LiteralValue::from).ok_or_else(|| undecodable(value)),
        other => Err(undecodable(other)),
    }
}

fn metadata(map: &Map<String, Json>) -> Annotations {
    let mut annotations = Annotations::new();
    if let Some(description) = map.get("description").and_then(Json::as_str) {
        annotations = annotations.description(description);
    }
    if let Some(title) = map.get("title").and_then(Json::as_str) {
        annotations = annotations.title(title);
    }
    if let Some(examples) = map.get("examples").and_then(Json::as_array) {
        annotations = annotations.examples(examples.clone());
    }
    if let Some(default) = map.get("default") {
        annotations = annotations.default_value(default.clone());
    }
    annotations
}

fn undecodable(schema: &Json) -> JsonSchemaError {
    JsonSchemaError::Undecodable(serde_json::to_string(schema).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstKind, Keyword};
    use crate::error::AstError;
    use crate::parse_result::ParseOptions;
    use crate::parser::validate;
    use crate::value::Value;
    use serde_json::json;

    fn accepts(ast: &Ast, input: Json) -> bool {
        validate(ast).either(&Value::from(input), ParseOptions::default()).is_ok()
    }

    #[test]
    fn integers_with_bounds() {
        let ast = decode(&json!({ "type": "integer", "minimum": 1, "exclusiveMaximum": 10 })).unwrap();
        assert!(accepts(&ast, json!(1)));
        assert!(accepts(&ast, json!(9)));
        assert!(!accepts(&ast, json!(10)));
        assert!(!accepts(&ast, json!(2.5)));
        assert!(!accepts(&ast, json!("2")));
    }

    #[test]
    fn objects_default_to_open() {
        let ast = decode(&json!({
            "type": "object",
            "properties": { "a": { "type": "string" }, "b": { "type": "number" } },
            "required": ["a"],
        }))
        .unwrap();
        assert!(accepts(&ast, json!({ "a": "x" })));
        assert!(accepts(&ast, json!({ "a": "x", "extra": [1] })));
        assert!(!accepts(&ast, json!({ "b": 1 })));

        let closed = decode(&json!({
            "type": "object",
            "properties": { "a": { "type": "string" } },
            "required": ["a"],
            "additionalProperties": false,
        }))
        .unwrap();
        assert!(!accepts(&closed, json!({ "a": "x", "extra": 1 })));
    }

    #[test]
    fn pattern_properties_check_matching_keys() {
        let ast = decode(&json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false,
            "patternProperties": { "^n-": { "type": "number" } },
        }))
        .unwrap();
        assert!(accepts(&ast, json!({ "n-1": 1 })));
        assert!(!accepts(&ast, json!({ "n-1": "one" })));
    }

    #[test]
    fn property_names_restrict_undeclared_keys() {
        let ast = decode(&json!({
            "type": "object",
            "required": ["a"],
            "properties": { "a": { "type": "string" } },
            "additionalProperties": { "type": "number" },
            "patternProperties": { "^x-.*$": { "allOf": [{ "type": "integer" }, { "type": "number" }] } },
            "propertyNames": { "anyOf": [{ "enum": ["a"] }, { "pattern": "^x-.*$" }] },
        }))
        .unwrap();
        assert!(accepts(&ast, json!({ "a": "s", "x-1": 2 })));
        assert!(!accepts(&ast, json!({ "a": "s", "other": 1 })));
        assert!(!accepts(&ast, json!({ "a": "s", "x-1": 2.5 })));
    }

    #[test]
    fn tuples_use_min_items_for_optionality() {
        let ast = decode(&json!({
            "type": "array",
            "items": [{ "type": "string" }, { "type": "number" }],
            "minItems": 1,
            "additionalItems": false,
        }))
        .unwrap();
        assert!(accepts(&ast, json!(["a"])));
        assert!(accepts(&ast, json!(["a", 1])));
        assert!(!accepts(&ast, json!([])));
        assert!(!accepts(&ast, json!(["a", 1, 2])));
    }

    #[test]
    fn recursive_definitions_decode_through_lazy_nodes() {
        let ast = decode(&json!({
            "$schema": super::super::SCHEMA_URI,
            "$ref": "#/$defs/Tree",
            "$defs": {
                "Tree": {
                    "type": "object",
                    "required": ["children"],
                    "properties": { "children": { "type": "array", "items": { "$ref": "#/$defs/Tree" } } },
                    "additionalProperties": false,
                }
            }
        }))
        .unwrap();
        assert!(matches!(ast.kind(), AstKind::Lazy(_)));
        assert_eq!(ast.annotations().identifier.as_deref(), Some("Tree"));
        assert!(accepts(&ast, json!({ "children": [{ "children": [] }] })));
        assert!(!accepts(&ast, json!({ "children": [{ "children": [1] }] })));
    }

    #[test]
    fn special_ids_and_enums() {
        let any = decode(&json!({ "$id": ANY_ID })).unwrap();
        assert!(matches!(any.kind(), AstKind::Keyword(Keyword::Any)));
        let enums = decode(&json!({
            "$comment": ENUMS_COMMENT,
            "oneOf": [{ "title": "A", "const": "a" }, { "title": "B", "const": 2 }],
        }))
        .unwrap();
        assert!(matches!(enums.kind(), AstKind::Enums(e) if e.len() == 2));
        assert!(accepts(&enums, json!(2)));
        assert!(!accepts(&enums, json!("b")));
    }

    #[test]
    fn failures() {
        assert!(matches!(
            decode(&json!({ "$ref": "#/$defs/Missing" })),
            Err(JsonSchemaError::RefNotFound(r)) if r == "#/$defs/Missing"
        ));
        assert!(matches!(decode(&json!({ "type": "date" })), Err(JsonSchemaError::Undecodable(_))));
        assert!(matches!(
            decode(&json!({ "type": "string", "pattern": "(" })),
            Err(JsonSchemaError::Ast(_))
        ));
    }

    #[test]
    fn definitions_that_only_refer_to_themselves_fail() {
        let direct = json!({ "$ref": "#/$defs/A", "$defs": { "A": { "$ref": "#/$defs/A" } } });
        assert!(matches!(decode(&direct), Err(JsonSchemaError::Ast(AstError::LazyCycle { .. }))));

        let mutual = json!({
            "$ref": "#/$defs/A",
            "$defs": {
                "A": { "anyOf": [{ "type": "null" }, { "$ref": "#/$defs/B" }] },
                "B": { "$ref": "#/$defs/A" },
            }
        });
        assert!(matches!(decode(&mutual), Err(JsonSchemaError::Ast(AstError::LazyCycle { .. }))));
    }
}
