mod common;

use common::{slow_string, v};
use proptest::prelude::*;
use serde_json::{Value as Json, json};
use shape_codec::{
    Ast, AstBuilder, Element, ParseError, ParseOptions, ParseResult, PropertySignature, Value, decode, encode,
    format_errors,
};

/// `{ ids: Array<NumberFromString>, tag?: string, pair: [boolean, number] }`
fn schema() -> Ast {
    let mut b = AstBuilder::new();
    let s = b.string();
    let n = b.number();
    let flag = b.boolean();
    let parsed = b.transform_or_fail(
        s,
        n,
        |input, _, ast| match input.as_str().and_then(|s| s.parse::<f64>().ok()) {
            Some(n) => ParseResult::success(Value::Number(n)),
            None => ParseResult::failure(ParseError::type_mismatch(ast, input)),
        },
        |input, _, _| ParseResult::success(Value::from(input.js_string())),
    );
    let ids = b.array(parsed);
    let pair = b.tuple(vec![Element::required(flag), Element::required(n)], None, true);
    let root = b.struct_(vec![
        PropertySignature::new("ids", ids),
        PropertySignature::new("tag", s).optional(),
        PropertySignature::new("pair", pair),
    ]);
    b.finish(root).expect("a valid ast")
}

/// `{ ids: Array<SlowString>, tag?: SlowString, pair: [boolean, number] }`
/// where every string check suspends first.
fn suspending_schema() -> Ast {
    let mut b = AstBuilder::new();
    let slow = slow_string(&mut b);
    let n = b.number();
    let flag = b.boolean();
    let ids = b.array(slow);
    let pair = b.tuple(vec![Element::required(flag), Element::required(n)], None, true);
    let root = b.struct_(vec![
        PropertySignature::new("ids", ids),
        PropertySignature::new("tag", slow).optional(),
        PropertySignature::new("pair", pair),
    ]);
    b.finish(root).expect("a valid ast")
}

/// Top-level position of the first error, one level deeper when it is nested.
fn nested_position(errors: &shape_codec::ParseErrors) -> Vec<String> {
    let first = errors.first();
    let mut out = vec![position(first)];
    if let ParseError::Key { errors, .. } | ParseError::Index { errors, .. } = first {
        out.push(position(errors.first()));
    }
    out
}

fn number() -> impl Strategy<Value = f64> {
    prop_oneof![(-1000i32..1000).prop_map(f64::from), (-1000i32..1000).prop_map(|n| f64::from(n) + 0.25)]
}

/// Values of the decoded side.
fn decoded_value() -> impl Strategy<Value = Json> {
    (
        prop::collection::vec(number(), 0..5),
        prop::option::of("[a-z]{0,3}"),
        any::<bool>(),
        number(),
    )
        .prop_map(|(ids, tag, flag, n)| {
            let mut out = json!({ "ids": ids, "pair": [flag, n] });
            if let Some(tag) = tag {
                out["tag"] = json!(tag);
            }
            out
        })
}

/// Anything, mostly almost-right inputs.
fn noisy_input() -> impl Strategy<Value = Json> {
    let leaf = prop_oneof![
        Just(json!(null)),
        any::<bool>().prop_map(Json::from),
        number().prop_map(Json::from),
        "[0-9x]{0,3}".prop_map(Json::from),
    ];
    let value = leaf.prop_recursive(2, 12, 3, |inner| prop::collection::vec(inner, 0..3).prop_map(Json::Array));
    prop::collection::vec(
        (prop::sample::select(vec!["ids", "tag", "pair", "extra"]), value),
        0..5,
    )
    .prop_map(|entries| Json::Object(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()))
}

/// Where an error sits at the top level: the key or index, else its tag.
fn position(error: &ParseError) -> String {
    match error {
        ParseError::Key { key, .. } => key.to_string(),
        ParseError::Index { index, .. } => index.to_string(),
        other => other.tag().to_string(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn encode_then_decode_is_identity(value in decoded_value()) {
        let ast = schema();
        let options = ParseOptions::default();
        let wire = encode(&ast).either(&v(value.clone()), options);
        prop_assert!(wire.is_ok(), "encode failed for {}", value);
        let back = decode(&ast).either(&wire.unwrap_or(Value::Null), options);
        prop_assert_eq!(back, Ok(v(value)));
    }

    #[test]
    fn parsing_is_deterministic(input in noisy_input()) {
        let ast = schema();
        let parser = decode(&ast);
        let options = ParseOptions::all_errors();
        let first = parser.outcome(&v(input.clone()), options);
        let second = parser.outcome(&v(input.clone()), options);
        prop_assert_eq!(first.value(), second.value());
        prop_assert_eq!(
            first.errors().map(format_errors),
            second.errors().map(format_errors)
        );
    }

    #[test]
    fn all_errors_extends_fail_fast(input in noisy_input()) {
        let ast = schema();
        let parser = decode(&ast);
        let fast = parser.outcome(&v(input.clone()), ParseOptions::default());
        let all = parser.outcome(&v(input.clone()), ParseOptions::all_errors());
        prop_assert_eq!(fast.is_failure(), all.is_failure());
        if let (Some(fast), Some(all)) = (fast.errors(), all.errors()) {
            prop_assert_eq!(fast.len(), 1);
            prop_assert!(all.len() >= 1);
            prop_assert_eq!(position(fast.first()), position(all.first()));
        }
    }

    #[test]
    fn all_errors_extends_fail_fast_with_suspension(input in noisy_input()) {
        let ast = suspending_schema();
        let parser = decode(&ast);
        let fast = parser.outcome(&v(input.clone()), ParseOptions::default());
        let all = parser.outcome(&v(input.clone()), ParseOptions::all_errors());
        prop_assert_eq!(fast.is_failure(), all.is_failure());
        if let (Some(fast), Some(all)) = (fast.errors(), all.errors()) {
            prop_assert_eq!(fast.len(), 1);
            prop_assert_eq!(nested_position(fast), nested_position(all));
        }
    }

    #[test]
    fn successes_need_no_warnings(value in decoded_value()) {
        let ast = schema();
        let encoded = encode(&ast).either(&v(value), ParseOptions::default());
        prop_assert!(encoded.is_ok());
        let wire = encoded.unwrap_or(Value::Null);
        let outcome = decode(&ast).outcome(&wire, ParseOptions::allow_unexpected());
        prop_assert!(outcome.warnings().is_none());
        prop_assert!(!outcome.is_failure());
    }
}

#[test]
fn recursive_tree_five_levels_deep() -> anyhow::Result<()> {
    let mut b = AstBuilder::new();
    let n = b.number();
    let root = b.lazy(|b, this| {
        let children = b.array(this);
        b.struct_(vec![PropertySignature::new("value", n), PropertySignature::new("children", children)])
    });
    let parser = decode(&b.finish(root)?);

    let mut tree = json!({ "value": 5, "children": [] });
    for depth in (0..5).rev() {
        tree = json!({ "value": depth, "children": [tree.clone(), { "value": -depth, "children": [] }] });
    }
    assert_eq!(parser.either(&v(tree.clone()), ParseOptions::default()), Ok(v(tree.clone())));

    let mut broken = json!({ "value": "deep", "children": [] });
    for depth in 0..5 {
        broken = json!({ "value": depth, "children": [broken] });
    }
    let errors = parser.either(&v(broken), ParseOptions::default()).unwrap_err();
    let path = format_errors(&errors);
    assert_eq!(
        path,
        "error(s) found\n└─ [\"children\"][0][\"children\"][0][\"children\"][0][\"children\"][0][\"children\"][0][\"value\"]\n   └─ Expected NumberKeyword, actual \"deep\""
    );
    Ok(())
}
