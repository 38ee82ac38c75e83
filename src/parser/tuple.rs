//! Tuples and arrays: declared elements, then the repeated rest type, then
//! the fixed post-rest elements counted from the end.
use std::rc::Rc;

use crate::ast::{self, Ast, AstKind};
use crate::parse_result::{ParseError, ParseOptions, ParseResult};
use crate::parser::Parser;
use crate::parser::compiler::Compiler;
use crate::parser::step::{Halt, Slot, StepState};
use crate::value::Value;

struct TupleParser {
    elements: Vec<(Parser, bool)>,          // (parser, is_optional)
    rest: Option<(Parser, Vec<Parser>)>,    // (repeated, post-rest)
}

pub(crate) fn compile(compiler: &Compiler, ast: &Ast) -> Parser {
    let AstKind::Tuple { elements, rest, .. } = ast.kind() else {
        return Rc::new(|input: &Value, _: ParseOptions| ParseResult::success(input.clone()));
    };
    let parser = TupleParser {
        elements: elements.iter().map(|e| (compiler.compile(e.ty), e.is_optional)).collect(),
        rest: rest.as_ref().and_then(|r| {
            let (head, tail) = r.split_first()?;
            Some((compiler.compile(*head), tail.iter().map(|t| compiler.compile(*t)).collect()))
        }),
    };
    Rc::new(move |input: &Value, options: ParseOptions| parser.run(input, options))
}

impl TupleParser {
    fn run(&self, input: &Value, options: ParseOptions) -> ParseResult<Value> {
        let Some(items) = input.as_array() else {
            return ParseResult::failure(ParseError::type_mismatch(&ast::unknown_array(), input));
        };
        let mut state = StepState::new(options);
        // a halt only stops new children from starting
        let _ = self.walk(items, options, &mut state);
        state.finish(|out| Value::Array(out.into_iter().map(|(_, v)| v).collect()))
    }

    fn walk(&self, items: &[Value], options: ParseOptions, state: &mut StepState) -> Result<(), Halt> {
        for (i, (parser, is_optional)) in self.elements.iter().enumerate() {
            match items.get(i) {
                Some(item) => state.push(Slot::Index(i), parser(item, options))?,
                None if !is_optional => state.fail(ParseError::index(i, ParseError::missing()))?,
                None => {}
            }
        }

        let mut i = self.elements.len();
        match &self.rest {
            Some((head, tail)) => {
                let end = items.len().saturating_sub(tail.len());
                while i < end {
                    state.push(Slot::Index(i), head(&items[i], options))?;
                    i += 1;
                }
                for (j, parser) in tail.iter().enumerate() {
                    let index = i + j;
                    match items.get(index) {
                        Some(item) => state.push(Slot::Index(index), parser(item, options))?,
                        None => state.fail(ParseError::index(index, ParseError::missing()))?,
                    }
                }
            }
            None => {
                for (index, item) in items.iter().enumerate().skip(i) {
                    let error = ParseError::index(index, ParseError::unexpected(item));
                    if options.is_unexpected_allowed {
                        state.warn(error);
                    } else {
                        state.fail(error)?;
                    }
                }
            }
        }

        Ok(())
    }
}
