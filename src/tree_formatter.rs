//! Renders a [`ParseErrors`] list as a drawn tree.
//!
//! ```text
//! error(s) found
//! └─ ["a"]
//!    └─ Expected StringKeyword, actual 1
//! ```
use crate::ast::{Ast, AstKind, Keyword};
use crate::parse_result::{ParseError, ParseErrors};
use crate::value::{Value, format_number};

struct Tree {
    value: String,
    forest: Vec<Tree>,
}

impl Tree {
    fn leaf(value: String) -> Self { Tree { value, forest: Vec::new() } }
}

pub fn format_errors(errors: &ParseErrors) -> String {
    let root = Tree {
        value: "error(s) found".to_string(),
        forest: errors.iter().map(go).collect(),
    };
    let mut out = root.value.clone();
    draw(&mut out, "\n", &root.forest);
    out
}

/// How an input value is shown in error messages.
pub fn format_actual(actual: &Value) -> String {
    match actual {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Number(n) => format_number(*n),
        Value::BigInt(n) => format!("{n}n"),
        Value::Symbol(s) => s.to_string(),
        other => other
            .to_json()
            .and_then(|j| serde_json::to_string(&j).ok())
            .unwrap_or_else(|| other.js_string()),
    }
}

/// Description of what a node accepts.
pub fn format_expected(ast: &Ast) -> String {
    if let AstKind::Transform { from, to, .. } = ast.kind() {
        return format!(
            "a parsable value from {} to {}",
            format_expected(&ast.at(*from)),
            format_expected(&ast.at(*to))
        );
    }
    match ast.annotations().expected() {
        Some(expected) => expected.to_string(),
        None => structural(ast),
    }
}

fn structural(ast: &Ast) -> String {
    match ast.kind() {
        AstKind::Keyword(k) => k.tag().to_string(),
        AstKind::Literal(l) => format_actual(&l.to_value()),
        AstKind::UniqueSymbol(s) => s.to_string(),
        AstKind::Union(members) => members
            .iter()
            .map(|m| format_expected(&ast.at(*m)))
            .collect::<Vec<_>>()
            .join(" or "),
        AstKind::TemplateLiteral { head, spans } => {
            let mut out = head.clone();
            for span in spans {
                match ast.at(span.ty).kind() {
                    AstKind::Keyword(Keyword::Number) => out.push_str("${number}"),
                    _ => out.push_str("${string}"),
                }
                out.push_str(&span.literal);
            }
            out
        }
        AstKind::Enums(enums) => enums
            .iter()
            .map(|(_, v)| format_actual(&v.to_value()))
            .collect::<Vec<_>>()
            .join(" | "),
        AstKind::Refinement { .. } => "<anonymous refinement schema>".to_string(),
        AstKind::Tuple { .. } => "<anonymous tuple or array schema>".to_string(),
        AstKind::TypeLiteral { .. } => "<anonymous type literal schema>".to_string(),
        AstKind::Lazy(_) => "<anonymous lazy schema>".to_string(),
        AstKind::Declaration { .. } => "<anonymous declaration schema>".to_string(),
        AstKind::Transform { .. } => "<anonymous transformation schema>".to_string(),
    }
}

fn draw(out: &mut String, indentation: &str, forest: &[Tree]) {
    let len = forest.len();
    for (i, tree) in forest.iter().enumerate() {
        let is_last = i == len - 1;
        out.push_str(indentation);
        out.push_str(if is_last { "└" } else { "├" });
        out.push_str("─ ");
        out.push_str(&tree.value);
        let next = format!("{indentation}{}", if len > 1 && !is_last { "│  " } else { "   " });
        draw(out, &next, &tree.forest);
    }
}

fn go(error: &ParseError) -> Tree {
    match error {
        ParseError::Type { expected, actual, message } => {
            let line = match (message, &expected.annotations().message) {
                (Some(message), _) => message.clone(),
                (None, Some(f)) => f(actual),
                (None, None) => format!("Expected {}, actual {}", format_expected(expected), format_actual(actual)),
            };
            Tree::leaf(line)
        }
        ParseError::Index { index, errors } => collapse(format!("[{index}]"), errors),
        ParseError::Key { key, errors } => collapse(format!("[{}]", format_actual(&key.to_value())), errors),
        ParseError::Unexpected { .. } => Tree::leaf("is unexpected".to_string()),
        ParseError::Missing => Tree::leaf("is missing".to_string()),
        ParseError::UnionMember { errors } => Tree {
            value: "union member".to_string(),
            forest: errors.iter().map(go).collect(),
        },
    }
}

/// `[0]` over a single nested path becomes one line, `[0]["a"]`.
fn collapse(label: String, errors: &ParseErrors) -> Tree {
    let mut forest: Vec<Tree> = errors.iter().map(go).collect();
    if forest.len() == 1 && !forest[0].forest.is_empty() {
        let only = forest.remove(0);
        return Tree { value: format!("{label}{}", only.value), forest: only.forest };
    }
    Tree { value: label, forest }
}
