//! Memoizing compiler from AST nodes to parse functions.
//!
//! One [`Compiler`] per frozen graph. Parsers are cached by [`AstId`], so a
//! node is compiled once however often it is reached. A lazy node compiles
//! to a thin forwarder that looks its target up in the cache on every call;
//! the forwarder only holds a weak handle to the compiler, which keeps the
//! cache free of reference cycles.
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use regex::Regex;
use tracing::{trace, warn};

use crate::ast::{Ast, AstGraph, AstId, AstKind, Keyword};
use crate::parse_result::{ParseError, ParseOptions, ParseResult};
use crate::parser::{Parser, transform, tuple, type_literal, union};
use crate::value::Value;

pub(crate) struct Compiler {
    graph: Arc<AstGraph>,
    cache: RefCell<HashMap<AstId, Parser>>,
    this: Weak<Compiler>,
}

impl Compiler {
    pub(crate) fn new(graph: Arc<AstGraph>) -> Rc<Self> {
        Rc::new_cyclic(|this| Compiler {
            graph,
            cache: RefCell::new(HashMap::new()),
            this: this.clone(),
        })
    }

    pub(crate) fn ast(&self, id: AstId) -> Ast { Ast::new(self.graph.clone(), id) }

    pub(crate) fn compile(&self, id: AstId) -> Parser {
        if let Some(parser) = self.cache.borrow().get(&id) {
            trace!(node = %id, "parser cache hit");
            return parser.clone();
        }
        let parser = self.build(id);
        self.cache.borrow_mut().entry(id).or_insert(parser).clone()
    }

    fn build(&self, id: AstId) -> Parser {
        let ast = self.ast(id);
        trace!(node = %id, kind = ast.kind().tag(), "compiling parser");
        match ast.kind() {
            AstKind::Declaration { type_parameters, decode, .. } => {
                let parameters: Vec<Parser> = type_parameters.iter().map(|p| self.compile(*p)).collect();
                decode(&ast, &parameters)
            }
            AstKind::Literal(literal) => {
                let literal = literal.clone();
                from_predicate(ast.clone(), move |v| literal.matches(v))
            }
            AstKind::UniqueSymbol(symbol) => {
                let symbol = symbol.clone();
                from_predicate(ast.clone(), move |v| matches!(v, Value::Symbol(s) if *s == symbol))
            }
            AstKind::Keyword(Keyword::Unknown | Keyword::Any) => {
                Rc::new(|input: &Value, _: ParseOptions| ParseResult::success(input.clone()))
            }
            AstKind::Keyword(keyword) => {
                let keyword = *keyword;
                from_predicate(ast.clone(), move |v| keyword.accepts(v))
            }
            AstKind::Enums(enums) => {
                let values: Vec<_> = enums.iter().map(|(_, v)| v.clone()).collect();
                from_predicate(ast.clone(), move |v| values.iter().any(|e| e.matches(v)))
            }
            AstKind::TemplateLiteral { .. } => {
                let pattern = ast.template_literal_pattern().unwrap_or_default();
                match Regex::new(&pattern) {
                    Ok(regex) => from_predicate(ast.clone(), move |v| v.as_str().is_some_and(|s| regex.is_match(s))),
                    Err(error) => {
                        warn!(node = %id, %error, "template literal pattern does not compile");
                        from_predicate(ast.clone(), |_| false)
                    }
                }
            }
            AstKind::Tuple { .. } => tuple::compile(self, &ast),
            AstKind::TypeLiteral { property_signatures, index_signatures } => {
                if property_signatures.is_empty() && index_signatures.is_empty() {
                    from_predicate(ast.clone(), |v| !matches!(v, Value::Null | Value::Undefined))
                } else {
                    type_literal::compile(self, &ast)
                }
            }
            AstKind::Union(_) => union::compile(self, &ast),
            AstKind::Lazy(target) => self.lazy(*target),
            AstKind::Refinement { .. } => transform::compile_refinement(self, &ast),
            AstKind::Transform { .. } => transform::compile_transform(self, &ast),
        }
    }

    fn lazy(&self, target: AstId) -> Parser {
        let compiler = self.this.clone();
        let graph = self.graph.clone();
        Rc::new(move |input: &Value, options: ParseOptions| {
            // only a parser that escaped every handle gets here without a cache
            let parser = match compiler.upgrade() {
                Some(compiler) => compiler.compile(target),
                None => Compiler::new(graph.clone()).compile(target),
            };
            trace!(node = %target, "lazy parser resolved");
            parser(input, options)
        })
    }
}

/// A pure membership test; failure is a Type error against `ast`.
pub(crate) fn from_predicate(ast: Ast, predicate: impl Fn(&Value) -> bool + 'static) -> Parser {
    Rc::new(move |input: &Value, _: ParseOptions| {
        if predicate(input) {
            ParseResult::success(input.clone())
        } else {
            ParseResult::failure(ParseError::type_mismatch(&ast, input))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::AstBuilder;
    use crate::parse_result::{Outcome, ParseOptions};

    #[test]
    fn parsers_are_memoized_by_node() {
        let mut b = AstBuilder::new();
        let s = b.string();
        let arr = b.array(s);
        let ast = b.finish(arr).unwrap();
        let compiler = Compiler::new(ast.graph().clone());
        let p1 = compiler.compile(s);
        let p2 = compiler.compile(s);
        assert!(Rc::ptr_eq(&p1, &p2));
        compiler.compile(arr);
        assert_eq!(compiler.cache.borrow().len(), 2);
    }

    #[test]
    fn empty_struct_rejects_nullish_only() {
        let mut b = AstBuilder::new();
        let empty = b.struct_(vec![]);
        let ast = b.finish(empty).unwrap();
        let parser = Compiler::new(ast.graph().clone()).compile(ast.id());
        let o = ParseOptions::default();
        assert!(matches!(parser(&Value::Number(1.0), o).run_sync(), Outcome::Success(_)));
        assert!(parser(&Value::Null, o).run_sync().is_failure());
        assert!(parser(&Value::Undefined, o).run_sync().is_failure());
    }

    #[test]
    fn template_literals_match_their_pattern() {
        let mut b = AstBuilder::new();
        let n = b.number();
        let t = b.template_literal("v", vec![(n, ".x".into())]).unwrap();
        let ast = b.finish(t).unwrap();
        let parser = Compiler::new(ast.graph().clone()).compile(ast.id());
        let o = ParseOptions::default();
        assert!(!parser(&Value::from("v-1.5.x"), o).run_sync().is_failure());
        assert!(parser(&Value::from("v1ax"), o).run_sync().is_failure());
        assert!(parser(&Value::from("va.x"), o).run_sync().is_failure());
    }

    #[test]
    fn detached_parsers_keep_their_cache() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        use crate::ast::Annotations;
        use crate::ast::PropertySignature;
        use crate::parser::decode;

        let builds = Arc::new(AtomicUsize::new(0));
        let mut b = AstBuilder::new();
        let counter = builds.clone();
        let leaf = move |_: &Ast, _: &[Parser]| -> Parser {
            counter.fetch_add(1, Ordering::SeqCst);
            Rc::new(|input: &Value, _: ParseOptions| ParseResult::success(input.clone()))
        };
        let leaf = b.declaration(vec![], leaf.clone(), leaf, Annotations::new());
        let root = b.lazy(|b, this| {
            let children = b.array(this);
            b.struct_(vec![PropertySignature::new("value", leaf), PropertySignature::new("children", children)])
        });
        let ast = b.finish(root).unwrap();
        let parser = decode(&ast).parser();

        let mut tree = serde_json::json!({ "value": 0, "children": [] });
        for depth in 1..4 {
            tree = serde_json::json!({ "value": depth, "children": [tree] });
        }
        assert!(!parser(&Value::from(tree), ParseOptions::default()).run_sync().is_failure());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }
}
