#![allow(dead_code)]

use std::rc::Rc;
use std::task::Poll;

use shape_codec::{
    Annotations, Ast, AstBuilder, AstId, CompiledParser, Outcome, ParseError, ParseErrors, ParseOptions,
    ParseResult, Parser, Value,
};
use tracing_subscriber::EnvFilter;

/// `RUST_LOG=shape_codec=trace cargo test` shows the compiler's events.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn v(json: serde_json::Value) -> Value { Value::from(json) }

pub fn run(parser: &CompiledParser, input: serde_json::Value, options: ParseOptions) -> Outcome<Value> {
    parser.outcome(&v(input), options)
}

pub fn accepts(ast: &Ast, input: serde_json::Value) -> bool {
    shape_codec::is(ast)(&v(input))
}

/// Returns `Pending` once before completing.
pub async fn yield_now() {
    let mut yielded = false;
    futures::future::poll_fn(move |cx| {
        if yielded {
            Poll::Ready(())
        } else {
            yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    })
    .await
}

/// A declaration that suspends before accepting strings.
pub fn slow_string(b: &mut AstBuilder) -> AstId {
    let parse = |ast: &Ast, _: &[Parser]| -> Parser {
        let ast = ast.clone();
        Rc::new(move |input: &Value, _: ParseOptions| {
            let ast = ast.clone();
            let input = input.clone();
            ParseResult::suspend(async move {
                yield_now().await;
                match input {
                    Value::String(_) => Outcome::Success(input),
                    other => Outcome::Failure(ParseErrors::new(ParseError::type_mismatch(&ast, &other))),
                }
            })
        })
    };
    b.declaration(vec![], parse, parse, Annotations::new().identifier("SlowString"))
}
