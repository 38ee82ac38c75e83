mod common;

use std::future::IntoFuture;

use common::{slow_string, v};
use futures::executor::block_on;
use serde_json::json;
use shape_codec::{AstBuilder, Element, Outcome, ParseError, ParseOptions, Value, decode};

#[test]
fn suspended_children_keep_their_positions() -> anyhow::Result<()> {
    let mut b = AstBuilder::new();
    let slow = slow_string(&mut b);
    let n = b.number();
    let root = b.tuple(vec![Element::required(slow), Element::required(n)], None, true);
    let parser = decode(&b.finish(root)?);

    let result = parser.parse(&v(json!(["a", 1])), ParseOptions::default());
    assert!(result.is_suspended());
    assert_eq!(block_on(result.into_future()).into_result(), Ok(v(json!(["a", 1]))));

    // index 1 fails at once, index 0 only after resuming; the order is still 0, 1
    let outcome = block_on(parser.parse_async(&v(json!([1, "b"])), ParseOptions::all_errors()));
    let indices: Vec<usize> = outcome
        .errors()
        .map(|es| {
            es.iter()
                .filter_map(|e| match e {
                    ParseError::Index { index, .. } => Some(*index),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    assert_eq!(indices, vec![0, 1]);
    Ok(())
}

#[test]
fn fail_fast_reports_the_earliest_position() -> anyhow::Result<()> {
    let mut b = AstBuilder::new();
    let slow = slow_string(&mut b);
    let n = b.number();
    let root = b.tuple(vec![Element::required(slow), Element::required(n)], None, true);
    let parser = decode(&b.finish(root)?);

    // index 1 fails synchronously, but index 0 comes first
    let fast = parser.outcome(&v(json!([1, "b"])), ParseOptions::default());
    let errors = fast.errors().expect("a failure");
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors.first(), ParseError::Index { index: 0, .. }));

    // a suspended success leaves the later failure as the answer
    let fast = parser.outcome(&v(json!(["a", "b"])), ParseOptions::default());
    let errors = fast.errors().expect("a failure");
    assert!(matches!(errors.first(), ParseError::Index { index: 1, .. }));
    Ok(())
}

#[test]
fn synchronous_wrappers_drive_suspended_parsers() -> anyhow::Result<()> {
    let mut b = AstBuilder::new();
    let slow = slow_string(&mut b);
    let root = b.array(slow);
    let parser = decode(&b.finish(root)?);

    assert_eq!(parser.option(&v(json!(["a", "b"])), ParseOptions::default()), Some(v(json!(["a", "b"]))));
    let failure = parser.get(&v(json!(["a", 2])), ParseOptions::default()).unwrap_err();
    assert_eq!(failure.to_string(), "error(s) found\n└─ [1]\n   └─ Expected SlowString, actual 2");
    Ok(())
}

#[test]
fn unions_continue_after_a_suspended_member() -> anyhow::Result<()> {
    let mut b = AstBuilder::new();
    let slow = slow_string(&mut b);
    let n = b.number();
    let root = b.union(vec![slow, n]);
    let parser = decode(&b.finish(root)?);

    let result = parser.parse(&v(json!(3)), ParseOptions::default());
    assert!(result.is_suspended());
    assert_eq!(block_on(result.into_future()), Outcome::Success(v(json!(3))));

    let outcome = parser.outcome(&Value::Bool(false), ParseOptions::default());
    let tags: Vec<&str> = outcome.errors().map(|es| es.iter().map(ParseError::tag).collect()).unwrap_or_default();
    assert_eq!(tags, vec!["UnionMember", "UnionMember"]);
    Ok(())
}

#[test]
fn struct_values_resume_in_declared_order() -> anyhow::Result<()> {
    let mut b = AstBuilder::new();
    let slow = slow_string(&mut b);
    let n = b.number();
    let root = b.struct_(vec![
        shape_codec::PropertySignature::new("first", slow),
        shape_codec::PropertySignature::new("second", n),
    ]);
    let parser = decode(&b.finish(root)?);
    let out = parser.outcome(&v(json!({ "second": 2, "first": "x" })), ParseOptions::default());
    let Some(Value::Object(record)) = out.value() else { panic!("expected an object") };
    let keys: Vec<String> = record.keys().map(|k| k.to_string()).collect();
    assert_eq!(keys, vec!["first", "second"]);
    Ok(())
}
