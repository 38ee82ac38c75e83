//! JSON-Schema (draft-07) projection of an [`Ast`], and back.
//!
//! Nodes with an `identifier` annotation are emitted once under `$defs` and
//! referenced with `$ref` everywhere else, which is also how recursive
//! schemas terminate: a [`AstKind::Lazy`] node must carry an identifier.
mod decode;

pub use decode::decode;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};
use tracing::{debug, trace};

use crate::ast::annotations::Annotations;
use crate::ast::{Ast, AstKind, Keyword, LiteralValue};
use crate::error::JsonSchemaError;
use crate::value::{PropertyKey, json_number};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Which side of a transforming schema to describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// The decoded (type) side, refinements included.
    #[default]
    To,
    /// The encoded (input) side, without refinements.
    From,
}

pub(crate) const SCHEMA_URI: &str = "http://json-schema.org/draft-07/schema#";
pub(crate) const DEFINITION_PREFIX: &str = "#/$defs/";

pub(crate) const ANY_ID: &str = "/schemas/any";
pub(crate) const UNKNOWN_ID: &str = "/schemas/unknown";
pub(crate) const OBJECT_ID: &str = "/schemas/object";
pub(crate) const EMPTY_ID: &str = "/schemas/{}";
pub(crate) const ENUMS_COMMENT: &str = "/schemas/enums";

type Defs = IndexMap<String, Json>;

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

pub fn project(ast: &Ast, direction: Direction) -> Result<Json, JsonSchemaError> {
    let projected = match direction {
        Direction::To => ast.to_ast(),
        Direction::From => ast.from_ast(),
    };
    debug!(root = %ast.id(), ?direction, "projecting JSON Schema");
    project_ast(&projected)
}

/// Projects `ast` as is; any transform in it is an error.
pub fn project_ast(ast: &Ast) -> Result<Json, JsonSchemaError> {
    let mut defs = Defs::new();
    let body = go_with_metadata(ast, &mut defs)?;
    let mut out = Map::new();
    out.insert("$schema".into(), Json::from(SCHEMA_URI));
    if let Json::Object(body) = body {
        out.extend(body);
    }
    if !defs.is_empty() {
        out.insert("$defs".into(), Json::Object(defs.into_iter().collect()));
    }
    Ok(Json::Object(out))
}

fn go_with_identifier(ast: &Ast, defs: &mut Defs) -> Result<Json, JsonSchemaError> {
    let Some(id) = ast.annotations().identifier.clone() else {
        return go_with_metadata(ast, defs);
    };
    if !defs.contains_key(&id) {
        let schema = go_with_metadata(ast, defs)?;
        if !defs.contains_key(&id) {
            trace!(%id, "emitting $defs entry");
            defs.insert(id.clone(), schema);
        }
    }
    Ok(reference(&id))
}

fn go_with_metadata(ast: &Ast, defs: &mut Defs) -> Result<Json, JsonSchemaError> {
    let mut schema = go(ast, defs)?;
    merge_metadata(&mut schema, ast.annotations());
    Ok(schema)
}

fn go(ast: &Ast, defs: &mut Defs) -> Result<Json, JsonSchemaError> {
    match ast.kind() {
        AstKind::Declaration { .. } => match &ast.annotations().json_schema {
            Some(fragment) => Ok(Json::Object(fragment.clone())),
            None => Err(JsonSchemaError::DeclarationWithoutAnnotation),
        },
        AstKind::Literal(literal) => literal_schema(literal),
        AstKind::UniqueSymbol(_) => Err(JsonSchemaError::Unrepresentable("unique symbol")),
        AstKind::Keyword(keyword) => keyword_schema(*keyword),
        AstKind::Enums(enums) => {
            let one_of = enums
                .iter()
                .map(|(title, value)| Ok(json!({ "title": title, "const": literal_const(value)? })))
                .collect::<Result<Vec<_>, JsonSchemaError>>()?;
            Ok(json!({ "$comment": ENUMS_COMMENT, "oneOf": one_of }))
        }
        AstKind::TemplateLiteral { .. } => Ok(json!({
            "type": "string",
            "description": "a template literal",
            "pattern": ast.template_literal_pattern(),
        })),
        AstKind::Tuple { elements, rest, .. } => {
            let items = elements
                .iter()
                .map(|e| go_with_identifier(&ast.at(e.ty), defs))
                .collect::<Result<Vec<_>, _>>()?;
            let mut out = json!({ "type": "array" });
            let len = items.len();
            if len > 0 {
                out["minItems"] = json!(elements.iter().filter(|e| !e.is_optional).count());
                out["items"] = Json::Array(items);
            }
            match rest {
                Some(rest) => {
                    if rest.len() > 1 {
                        return Err(JsonSchemaError::PostRestElements);
                    }
                    let head = go_with_identifier(&ast.at(rest[0]), defs)?;
                    if len > 0 {
                        out["additionalItems"] = head;
                    } else {
                        out["items"] = head;
                    }
                }
                None if len > 0 => out["additionalItems"] = Json::Bool(false),
                None => out["maxItems"] = json!(0),
            }
            Ok(out)
        }
        AstKind::TypeLiteral { property_signatures, index_signatures } => {
            if property_signatures.is_empty() && index_signatures.is_empty() {
                return Ok(object_schema(EMPTY_ID));
            }
            let mut additional = None;
            let mut key_patterns = Vec::new();
            for signature in index_signatures {
                let parameter = ast.at(signature.parameter);
                match parameter.kind() {
                    AstKind::Keyword(Keyword::String) => {
                        additional = Some(go_with_identifier(&ast.at(signature.ty), defs)?);
                    }
                    AstKind::TemplateLiteral { .. } => {
                        let pattern = parameter.template_literal_pattern().unwrap_or_default();
                        key_patterns.push((pattern, go_with_identifier(&ast.at(signature.ty), defs)?));
                    }
                    AstKind::Refinement { .. } => {
                        let pattern = parameter
                            .annotations()
                            .json_schema
                            .as_ref()
                            .and_then(|f| f.get("pattern"))
                            .and_then(Json::as_str)
                            .map(str::to_string)
                            .ok_or(JsonSchemaError::UnsupportedIndexSignature("Refinement"))?;
                        key_patterns.push((pattern, go_with_identifier(&ast.at(signature.ty), defs)?));
                    }
                    other => return Err(JsonSchemaError::UnsupportedIndexSignature(other.tag())),
                }
            }
            let mut properties = Map::new();
            let mut required = Vec::new();
            for signature in property_signatures {
                let PropertyKey::String(name) = &signature.name else {
                    return Err(JsonSchemaError::SymbolKey(signature.name.to_string()));
                };
                let mut schema = go_with_identifier(&ast.at(signature.ty), defs)?;
                merge_metadata(&mut schema, &signature.annotations);
                properties.insert(name.clone(), schema);
                if !signature.is_optional {
                    required.push(Json::from(name.as_str()));
                }
            }
            // every undeclared string key must match every key pattern
            let names = (!key_patterns.is_empty() && (additional.is_some() || key_patterns.len() > 1))
                .then(|| property_names(&properties, &key_patterns));
            let mut out = json!({
                "type": "object",
                "required": required,
                "properties": properties,
                "additionalProperties": additional.clone().unwrap_or(Json::Bool(false)),
            });
            if !key_patterns.is_empty() {
                let mut patterns = Map::new();
                for (pattern, schema) in key_patterns {
                    // pattern keys skip `additionalProperties`, so its schema is repeated here
                    let schema = match &additional {
                        Some(additional) => json!({ "allOf": [schema, additional] }),
                        None => schema,
                    };
                    patterns.insert(pattern, schema);
                }
                out["patternProperties"] = Json::Object(patterns);
            }
            if let Some(names) = names {
                out["propertyNames"] = names;
            }
            Ok(out)
        }
        AstKind::Union(members) => {
            let any_of = members
                .iter()
                .map(|m| go_with_identifier(&ast.at(*m), defs))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(json!({ "anyOf": any_of }))
        }
        AstKind::Refinement { from, .. } => {
            let mut schema = go_with_identifier(&ast.at(*from), defs)?;
            let Some(fragment) = &ast.annotations().json_schema else {
                return Err(JsonSchemaError::RefinementWithoutAnnotation);
            };
            if let Json::Object(map) = &mut schema {
                map.extend(fragment.clone());
            }
            Ok(schema)
        }
        AstKind::Lazy(target) => {
            let id = ast
                .annotations()
                .identifier
                .clone()
                .ok_or(JsonSchemaError::LazyWithoutIdentifier)?;
            if !defs.contains_key(&id) {
                // placeholder so self references stop here
                defs.insert(id.clone(), json!({ "$id": ANY_ID }));
                let schema = go_with_identifier(&ast.at(*target), defs)?;
                trace!(%id, "emitting $defs entry for lazy schema");
                defs.insert(id.clone(), schema);
            }
            Ok(reference(&id))
        }
        AstKind::Transform { .. } => Err(JsonSchemaError::Transformation),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn reference(id: &str) -> Json { json!({ "$ref": format!("{DEFINITION_PREFIX}{id}") }) }

/// Keys that are declared, or that match every key pattern.
fn property_names(properties: &Map<String, Json>, key_patterns: &[(String, Json)]) -> Json {
    let mut matching: Vec<Json> = key_patterns.iter().map(|(p, _)| json!({ "pattern": p })).collect();
    let matching = if matching.len() == 1 { matching.remove(0) } else { json!({ "allOf": matching }) };
    if properties.is_empty() {
        return matching;
    }
    let declared: Vec<&String> = properties.keys().collect();
    json!({ "anyOf": [{ "enum": declared }, matching] })
}

fn object_schema(id: &str) -> Json {
    json!({ "$id": id, "oneOf": [{ "type": "object" }, { "type": "array" }] })
}

fn keyword_schema(keyword: Keyword) -> Result<Json, JsonSchemaError> {
    match keyword {
        Keyword::Undefined => Err(JsonSchemaError::Unrepresentable("undefined")),
        Keyword::Void => Err(JsonSchemaError::Unrepresentable("void")),
        Keyword::Never => Err(JsonSchemaError::Unrepresentable("never")),
        Keyword::BigInt => Err(JsonSchemaError::Unrepresentable("bigint")),
        Keyword::Symbol => Err(JsonSchemaError::Unrepresentable("symbol")),
        Keyword::Unknown => Ok(json!({ "$id": UNKNOWN_ID })),
        Keyword::Any => Ok(json!({ "$id": ANY_ID })),
        Keyword::Object => Ok(object_schema(OBJECT_ID)),
        Keyword::String => Ok(json!({ "type": "string" })),
        Keyword::Number => Ok(json!({ "type": "number" })),
        Keyword::Boolean => Ok(json!({ "type": "boolean" })),
    }
}

fn literal_const(literal: &LiteralValue) -> Result<Json, JsonSchemaError> {
    match literal {
        LiteralValue::String(s) => Ok(Json::from(s.as_str())),
        LiteralValue::Number(n) => Ok(json_number(n.into_inner())),
        LiteralValue::Boolean(b) => Ok(Json::Bool(*b)),
        LiteralValue::Null => Ok(Json::Null),
        LiteralValue::BigInt(_) => Err(JsonSchemaError::Unrepresentable("bigint")),
    }
}

fn literal_schema(literal: &LiteralValue) -> Result<Json, JsonSchemaError> {
    Ok(json!({ "const": literal_const(literal)? }))
}

/// description, title, examples and default, over whatever is there.
fn merge_metadata(schema: &mut Json, annotations: &Annotations) {
    let Json::Object(map) = schema else { return };
    if let Some(description) = &annotations.description {
        map.insert("description".into(), Json::from(description.as_str()));
    }
    if let Some(title) = &annotations.title {
        map.insert("title".into(), Json::from(title.as_str()));
    }
    if let Some(examples) = &annotations.examples {
        map.insert("examples".into(), Json::Array(examples.clone()));
    }
    if let Some(default) = &annotations.default {
        map.insert("default".into(), default.clone());
    }
}
