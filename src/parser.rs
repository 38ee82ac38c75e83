//! Compiled parsers and the decode / validate / encode entry points.
//!
//! All three directions run the same engine:
//!
//! - `decode` parses with the schema as built;
//! - `validate` parses with its type side ([`Ast::to_ast`]);
//! - `encode` parses with its reverse ([`Ast::reverse`]).
pub(crate) mod compiler;
pub(crate) mod step;
pub(crate) mod transform;
pub(crate) mod tuple;
pub(crate) mod type_literal;
pub(crate) mod union;

use std::rc::Rc;

use tracing::debug;

use crate::ast::Ast;
use crate::error::ParseFailure;
use crate::parse_result::{Outcome, ParseErrors, ParseOptions, ParseResult};
use crate::value::Value;

use compiler::Compiler;

/// A compiled parse function.
pub type Parser = Rc<dyn Fn(&Value, ParseOptions) -> ParseResult<Value>>;

pub struct CompiledParser {
    ast: Ast,
    parser: Parser,
    compiler: Rc<Compiler>,
}

impl CompiledParser {
    pub fn new(ast: &Ast) -> Self {
        let compiler = Compiler::new(ast.graph().clone());
        let parser = compiler.compile(ast.id());
        debug!(root = %ast.id(), nodes = ast.graph().len(), "compiled parser");
        Self { ast: ast.clone(), parser, compiler }
    }

    pub fn ast(&self) -> &Ast { &self.ast }

    /// The raw parse function. It keeps the compiler's cache alive, so it
    /// may outlive `self`.
    pub fn parser(&self) -> Parser {
        let compiler = self.compiler.clone();
        let parser = self.parser.clone();
        Rc::new(move |input: &Value, options: ParseOptions| {
            let _cache = &compiler;
            parser(input, options)
        })
    }

    pub fn parse(&self, input: &Value, options: ParseOptions) -> ParseResult<Value> { (self.parser)(input, options) }

    pub async fn parse_async(&self, input: &Value, options: ParseOptions) -> Outcome<Value> {
        self.parse(input, options).await
    }

    /// Runs to completion, keeping warnings.
    pub fn outcome(&self, input: &Value, options: ParseOptions) -> Outcome<Value> {
        self.parse(input, options).run_sync()
    }

    pub fn either(&self, input: &Value, options: ParseOptions) -> Result<Value, ParseErrors> {
        self.outcome(input, options).into_result()
    }

    pub fn option(&self, input: &Value, options: ParseOptions) -> Option<Value> {
        self.either(input, options).ok()
    }

    /// Fails with the formatted error tree.
    pub fn get(&self, input: &Value, options: ParseOptions) -> Result<Value, ParseFailure> {
        self.either(input, options).map_err(ParseFailure::new)
    }
}

pub fn decode(ast: &Ast) -> CompiledParser { CompiledParser::new(ast) }

pub fn validate(ast: &Ast) -> CompiledParser { CompiledParser::new(&ast.to_ast()) }

pub fn encode(ast: &Ast) -> CompiledParser { CompiledParser::new(&ast.reverse()) }

/// Membership test on the type side.
pub fn is(ast: &Ast) -> impl Fn(&Value) -> bool {
    let validator = validate(ast);
    move |value: &Value| validator.either(value, ParseOptions::default()).is_ok()
}
