//! Schema AST driven decoding, encoding and validation.
//!
//! A schema is an immutable [`Ast`] (an arena of nodes built with
//! [`AstBuilder`]). From it the crate derives:
//!
//! - a decoder, validator and encoder ([`decode`], [`validate`], [`encode`]),
//!   all the same parser engine run over a projection of the AST;
//! - a membership predicate ([`is`]);
//! - a human readable error tree ([`format_errors`]);
//! - a JSON-Schema document, and back ([`json_schema::project`],
//!   [`json_schema::decode`]).
pub mod ast;
pub mod error;
pub mod json_schema;
pub mod parse_result;
pub mod parser;
pub mod tree_formatter;
pub mod value;

pub use ast::annotations::{AnnotationKey, Annotations};
pub use ast::builder::AstBuilder;
pub use ast::{
    Ast, AstId, AstKind, Element, IndexSignature, Keyword, LiteralValue, PropertySignature,
    PropertySignatureTransform, TemplateLiteralSpan, Transformation,
};
pub use error::{AstError, JsonSchemaError, ParseFailure};
pub use parse_result::{Outcome, ParseError, ParseErrors, ParseOptions, ParseResult};
pub use parser::{CompiledParser, Parser, decode, encode, is, validate};
pub use tree_formatter::format_errors;
pub use value::{PropertyKey, Symbol, Value};
