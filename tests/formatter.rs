mod common;

use common::v;
use serde_json::json;
use shape_codec::{Annotations, AstBuilder, Element, ParseOptions, PropertySignature, Value, decode};

fn render(parser: &shape_codec::CompiledParser, input: serde_json::Value, options: ParseOptions) -> String {
    match parser.get(&v(input), options) {
        Ok(value) => panic!("expected a failure, got {value:?}"),
        Err(failure) => failure.to_string(),
    }
}

#[test]
fn single_paths_collapse_onto_one_line() -> anyhow::Result<()> {
    let mut b = AstBuilder::new();
    let s = b.string();
    let inner = b.struct_(vec![PropertySignature::new("b", s)]);
    let outer = b.struct_(vec![PropertySignature::new("a", inner)]);
    let root = b.array(outer);
    let parser = decode(&b.finish(root)?);

    assert_eq!(
        render(&parser, json!([{ "a": { "b": 1 } }]), ParseOptions::default()),
        "error(s) found\n└─ [0][\"a\"][\"b\"]\n   └─ Expected StringKeyword, actual 1"
    );
    Ok(())
}

#[test]
fn siblings_branch() -> anyhow::Result<()> {
    let mut b = AstBuilder::new();
    let s = b.string();
    let n = b.number();
    let root = b.struct_(vec![PropertySignature::new("a", s), PropertySignature::new("b", n)]);
    let parser = decode(&b.finish(root)?);

    assert_eq!(
        render(&parser, json!({ "b": "x", "c": null }), ParseOptions::all_errors()),
        [
            "error(s) found",
            "├─ [\"a\"]",
            "│  └─ is missing",
            "├─ [\"b\"]",
            "│  └─ Expected NumberKeyword, actual \"x\"",
            "└─ [\"c\"]",
            "   └─ is unexpected",
        ]
        .join("\n")
    );
    Ok(())
}

#[test]
fn message_annotations_replace_the_line() -> anyhow::Result<()> {
    let mut b = AstBuilder::new();
    let s = b.string();
    let min = b.min_length(s, 3);
    let named = b.annotate(min, Annotations::new().message(|actual| format!("too short: {}", actual.js_string())));
    let root = b.tuple(vec![Element::required(named)], None, true);
    let parser = decode(&b.finish(root)?);

    assert_eq!(
        render(&parser, json!(["ab"]), ParseOptions::default()),
        "error(s) found\n└─ [0]\n   └─ too short: ab"
    );
    Ok(())
}

#[test]
fn filter_descriptions_name_the_constraint() -> anyhow::Result<()> {
    let mut b = AstBuilder::new();
    let n = b.number();
    let root = b.minimum(n, 1.0);
    let parser = decode(&b.finish(root)?);
    assert_eq!(
        render(&parser, json!(0), ParseOptions::default()),
        "error(s) found\n└─ Expected a number greater than or equal to 1, actual 0"
    );
    Ok(())
}

#[test]
fn structural_fallbacks() -> anyhow::Result<()> {
    let mut b = AstBuilder::new();
    let n = b.number();
    let s = b.string();
    let template = b.template_literal("v", vec![(n, String::new())])?;
    let t = b.transform(s, n, |v| v.clone(), |v| v.clone());
    let lit = b.literal("x");
    let root = b.tuple(
        vec![Element::required(template), Element::required(t), Element::required(lit)],
        None,
        true,
    );
    let parser = decode(&b.finish(root)?);

    assert_eq!(
        render(&parser, json!(["w1", 1, "y"]), ParseOptions::all_errors()),
        [
            "error(s) found",
            "├─ [0]",
            "│  └─ Expected v${number}, actual \"w1\"",
            "├─ [1]",
            "│  └─ Expected StringKeyword, actual 1",
            "└─ [2]",
            "   └─ Expected \"x\", actual \"y\"",
        ]
        .join("\n")
    );
    Ok(())
}

#[test]
fn non_json_actuals() -> anyhow::Result<()> {
    let mut b = AstBuilder::new();
    let root = b.number();
    let parser = decode(&b.finish(root)?);
    let failure = parser.get(&Value::BigInt(7), ParseOptions::default()).unwrap_err();
    assert_eq!(failure.to_string(), "error(s) found\n└─ Expected NumberKeyword, actual 7n");
    let failure = parser.get(&Value::Undefined, ParseOptions::default()).unwrap_err();
    assert_eq!(failure.to_string(), "error(s) found\n└─ Expected NumberKeyword, actual undefined");
    Ok(())
}
