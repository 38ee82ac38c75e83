//! Hard failures: mistakes in how a schema was built or projected.
//!
//! Bad *input data* is never reported through these types; it comes back as
//! [`ParseErrors`] inside a [`crate::Outcome`]. The one exception is
//! [`ParseFailure`], which the "get or fail" wrappers build from a failed
//! outcome by caller choice.
use thiserror::Error;

use crate::ast::AstId;
use crate::parse_result::ParseErrors;

/// Precondition violations detected while building an AST.
#[derive(Debug, Error, Clone)]
pub enum AstError {
    /// Elements can only be appended to a tuple node.
    #[error("node {id} is a {tag}, expected a Tuple")]
    NotATuple { id: AstId, tag: &'static str },

    #[error("a rest element cannot follow another rest element")]
    RestAfterRest,

    #[error("an optional element cannot follow a rest element")]
    OptionalAfterRest,

    /// Index signature parameters must be String, Symbol, a template
    /// literal, or a refinement of one of those.
    #[error("unsupported index signature parameter {tag} (node {id})")]
    InvalidIndexSignatureParameter { id: AstId, tag: &'static str },

    #[error("template literal spans must be String or Number, got {tag} (node {id})")]
    InvalidTemplateLiteralSpan { id: AstId, tag: &'static str },

    #[error("invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A node refers to an id that does not exist in the builder.
    #[error("node {from} refers to unknown node {to}")]
    UnknownNode { from: AstId, to: AstId },

    /// Only lazy nodes may point forward; everything else must refer to
    /// nodes built before it.
    #[error("node {from} refers forward to node {to} outside of a lazy node")]
    ForwardReference { from: AstId, to: AstId },

    #[error("node {id} is not a reserved lazy node")]
    NotALazy { id: AstId },

    #[error("lazy node {id} was reserved but never defined")]
    UndefinedLazy { id: AstId },

    /// A lazy node reaches itself without passing through a tuple or a
    /// struct, so parsing it would never consume any input.
    #[error("lazy node {id} refers back to itself without an enclosing tuple or struct")]
    LazyCycle { id: AstId },
}

/// Failures of the JSON-Schema projector in either direction.
#[derive(Debug, Error, Clone)]
pub enum JsonSchemaError {
    #[error("cannot build a JSON Schema for declarations without a JSON Schema annotation")]
    DeclarationWithoutAnnotation,

    #[error("cannot build a JSON Schema for refinements without a JSON Schema annotation")]
    RefinementWithoutAnnotation,

    #[error("cannot build a JSON Schema for transformations")]
    Transformation,

    /// `undefined`, `void`, `never`, `bigint`, `symbol` or a unique symbol.
    #[error("cannot convert `{0}` to JSON Schema")]
    Unrepresentable(&'static str),

    #[error("cannot encode {0} key to JSON Schema")]
    SymbolKey(String),

    #[error("unsupported index signature parameter {0}")]
    UnsupportedIndexSignature(&'static str),

    #[error("generating a JSON Schema for post-rest elements is not supported")]
    PostRestElements,

    #[error("generating a JSON Schema for lazy schemas requires an identifier annotation")]
    LazyWithoutIdentifier,

    #[error("cannot find $ref: {0}")]
    RefNotFound(String),

    #[error("cannot decode: {0}")]
    Undecodable(String),

    /// The decoded document described an AST the builder rejected.
    #[error(transparent)]
    Ast(#[from] AstError),
}

/// Raised by [`crate::CompiledParser::get`]. `Display` is the formatted
/// error tree.
#[derive(Debug, Error, Clone)]
#[error("{formatted}")]
pub struct ParseFailure {
    pub errors: ParseErrors,
    pub formatted: String,
}

impl ParseFailure {
    pub fn new(errors: ParseErrors) -> Self {
        let formatted = crate::tree_formatter::format_errors(&errors);
        Self { errors, formatted }
    }
}
