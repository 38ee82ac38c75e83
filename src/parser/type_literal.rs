//! Structs: declared properties, then index signatures over the remaining
//! keys. Without index signatures every other key is unexpected.
use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::{self, Ast, AstKind, Keyword};
use crate::parse_result::{ParseError, ParseOptions, ParseResult};
use crate::parser::Parser;
use crate::parser::compiler::Compiler;
use crate::parser::step::{Halt, Slot, StepState};
use crate::value::{PropertyKey, Record, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeySpace {
    Strings,
    Symbols,
}

struct Property {
    name: PropertyKey,
    parser: Parser,
    is_optional: bool,
}

struct Index {
    keys: Option<KeySpace>,
    parameter: Parser,
    value: Parser,
}

struct TypeLiteralParser {
    properties: Vec<Property>,
    declared: HashSet<PropertyKey>,
    indexes: Vec<Index>,
}

pub(crate) fn compile(compiler: &Compiler, ast: &Ast) -> Parser {
    let AstKind::TypeLiteral { property_signatures, index_signatures } = ast.kind() else {
        return Rc::new(|input: &Value, _: ParseOptions| ParseResult::success(input.clone()));
    };
    let parser = TypeLiteralParser {
        properties: property_signatures
            .iter()
            .map(|p| Property {
                name: p.name.clone(),
                parser: compiler.compile(p.ty),
                is_optional: p.is_optional,
            })
            .collect(),
        declared: property_signatures.iter().map(|p| p.name.clone()).collect(),
        indexes: index_signatures
            .iter()
            .map(|s| Index {
                keys: key_space(&ast.at(s.parameter)),
                parameter: compiler.compile(s.parameter),
                value: compiler.compile(s.ty),
            })
            .collect(),
    };
    Rc::new(move |input: &Value, options: ParseOptions| parser.run(input, options))
}

impl TypeLiteralParser {
    fn run(&self, input: &Value, options: ParseOptions) -> ParseResult<Value> {
        let Some(record) = input.as_object() else {
            return ParseResult::failure(ParseError::type_mismatch(&ast::unknown_record(), input));
        };
        let mut state = StepState::new(options);
        let _ = self.walk(record, options, &mut state);
        state.finish(|out| Value::Object(out.into_iter().map(|(slot, v)| (slot.into_key(), v)).collect()))
    }

    fn walk(&self, record: &Record, options: ParseOptions, state: &mut StepState) -> Result<(), Halt> {
        for property in &self.properties {
            match record.get(&property.name) {
                Some(value) => state.push(Slot::Key(property.name.clone()), (property.parser)(value, options))?,
                None if !property.is_optional => {
                    state.fail(ParseError::key(property.name.clone(), ParseError::missing()))?
                }
                None => {}
            }
        }

        if self.indexes.is_empty() {
            for (key, value) in record {
                if self.declared.contains(key) {
                    continue;
                }
                let error = ParseError::key(key.clone(), ParseError::unexpected(value));
                if options.is_unexpected_allowed {
                    state.warn(error);
                } else {
                    state.fail(error)?;
                }
            }
        } else {
            for index in &self.indexes {
                for (key, value) in record {
                    if self.declared.contains(key) || !index.covers(key) {
                        continue;
                    }
                    let value_parser = index.value.clone();
                    let value = value.clone();
                    let result = (index.parameter)(&key.to_value(), options)
                        .and_then(move |_| value_parser(&value, options));
                    state.push(Slot::Key(key.clone()), result)?;
                }
            }
        }

        Ok(())
    }
}

impl Index {
    fn covers(&self, key: &PropertyKey) -> bool {
        matches!(
            (self.keys, key),
            (Some(KeySpace::Strings), PropertyKey::String(_)) | (Some(KeySpace::Symbols), PropertyKey::Symbol(_))
        )
    }
}

/// Which keys an index signature parameter ranges over.
fn key_space(parameter: &Ast) -> Option<KeySpace> {
    match parameter.kind() {
        AstKind::Keyword(Keyword::String) | AstKind::TemplateLiteral { .. } => Some(KeySpace::Strings),
        AstKind::Keyword(Keyword::Symbol) => Some(KeySpace::Symbols),
        AstKind::Refinement { from, .. } => key_space(&parameter.at(*from)),
        _ => None,
    }
}
