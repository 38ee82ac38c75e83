//! Refinements and transforms: parse `from`, then run the node's own step.
use std::rc::Rc;

use crate::ast::{Ast, AstKind, PropertySignatureTransform, Transformation};
use crate::parse_result::{ParseOptions, ParseResult};
use crate::parser::Parser;
use crate::parser::compiler::Compiler;
use crate::value::{PropertyKey, Record, Value};

pub(crate) fn compile_refinement(compiler: &Compiler, ast: &Ast) -> Parser {
    let AstKind::Refinement { from, filter } = ast.kind() else {
        return Rc::new(|input: &Value, _: ParseOptions| ParseResult::success(input.clone()));
    };
    let from = compiler.compile(*from);
    let filter = filter.clone();
    let ast = ast.clone();
    Rc::new(move |input: &Value, options: ParseOptions| {
        let filter = filter.clone();
        let ast = ast.clone();
        from(input, options).and_then(move |value| match filter(&value, &options, &ast) {
            None => ParseResult::success(value),
            Some(error) => ParseResult::failure(error),
        })
    })
}

/// `from`, then decode, then `to` when `to` itself still transforms.
pub(crate) fn compile_transform(compiler: &Compiler, ast: &Ast) -> Parser {
    let AstKind::Transform { from, to, transformation } = ast.kind() else {
        return Rc::new(|input: &Value, _: ParseOptions| ParseResult::success(input.clone()));
    };
    let from_parser = compiler.compile(*from);
    let to_ast = ast.at(*to);
    let to_parser: Option<Parser> = to_ast.has_transformation().then(|| compiler.compile(*to));
    let decode = Decode::new(transformation, &to_ast);
    let ast = ast.clone();
    Rc::new(move |input: &Value, options: ParseOptions| {
        let decode = decode.clone();
        let ast = ast.clone();
        let to_parser = to_parser.clone();
        from_parser(input, options).and_then(move |value| {
            let decoded = decode.run(&value, &options, &ast);
            match to_parser {
                Some(to_parser) => decoded.and_then(move |v| to_parser(&v, options)),
                None => decoded,
            }
        })
    })
}

#[derive(Clone)]
enum Decode {
    Final(crate::ast::TransformFn),
    Properties {
        transforms: Rc<Vec<PropertySignatureTransform>>,
        order: Rc<Vec<PropertyKey>>,   // declared keys of the `to` struct
    },
}

impl Decode {
    fn new(transformation: &Transformation, to: &Ast) -> Self {
        match transformation {
            Transformation::Final { decode, .. } => Decode::Final(decode.clone()),
            Transformation::TypeLiteral(transforms) => {
                let order = match to.resolve_lazy().kind() {
                    AstKind::TypeLiteral { property_signatures, .. } => {
                        property_signatures.iter().map(|p| p.name.clone()).collect()
                    }
                    _ => Vec::new(),
                };
                Decode::Properties { transforms: Rc::new(transforms.clone()), order: Rc::new(order) }
            }
        }
    }

    fn run(&self, value: &Value, options: &ParseOptions, ast: &Ast) -> ParseResult<Value> {
        match self {
            Decode::Final(decode) => decode(value, options, ast),
            Decode::Properties { transforms, order } => {
                let Value::Object(record) = value else {
                    return ParseResult::success(value.clone());
                };
                ParseResult::success(Value::Object(apply_properties(record.clone(), transforms, order)))
            }
        }
    }
}

fn apply_properties(mut record: Record, transforms: &[PropertySignatureTransform], order: &[PropertyKey]) -> Record {
    for t in transforms {
        let current = record.shift_remove(&t.from);
        if let Some(v) = (t.decode)(current) {
            record.insert(t.to.clone(), v);
        }
    }
    let mut ordered = Record::with_capacity(record.len());
    for key in order {
        if let Some(v) = record.shift_remove(key) {
            ordered.insert(key.clone(), v);
        }
    }
    ordered.extend(record);
    ordered
}
