//! Rewrites of a schema into its type side, its encoded side, or its
//! reverse. Only the subgraph reachable from the root is copied, into a
//! fresh arena; recursion is carried over through lazy nodes.
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::ast::builder::AstBuilder;
use crate::ast::{
    Ast, AstGraph, AstId, AstKind, AstNode, Element, IndexSignature, PropertySignature,
    TemplateLiteralSpan, TransformFn, Transformation,
};
use crate::parse_result::ParseResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Mode {
    To,
    From,
    Reverse,
}

pub(crate) fn project(ast: &Ast, mode: Mode) -> Ast {
    let mut rewriter = Rewriter {
        source: ast.graph(),
        out: AstBuilder::new(),
        memo: HashMap::new(),
    };
    let root = rewriter.go(ast.id(), mode);
    debug!(?mode, nodes = rewriter.out.len(), "projected schema");
    Ast::new(rewriter.out.freeze(), root)
}

struct Rewriter<'a> {
    source: &'a Arc<AstGraph>,
    out: AstBuilder,
    memo: HashMap<(AstId, Mode), AstId>,
}

impl Rewriter<'_> {
    fn go(&mut self, id: AstId, mode: Mode) -> AstId {
        if let Some(done) = self.memo.get(&(id, mode)) {
            return *done;
        }
        let node = self.source.node(id).clone();
        let out = match node.kind {
            AstKind::Lazy(target) => {
                let lazy = self.out.push_node(AstNode {
                    kind: AstKind::Lazy(AstId(usize::MAX)),
                    annotations: node.annotations,
                });
                self.memo.insert((id, mode), lazy);
                let target = self.go(target, mode);
                self.out.replace_kind(lazy, AstKind::Lazy(target));
                return lazy;
            }
            AstKind::Transform { from, to, transformation } => match mode {
                Mode::To => self.go(to, mode),
                Mode::From => self.go(from, mode),
                Mode::Reverse => {
                    let from_rev = self.go(to, mode);
                    let to_rev = self.go(from, mode);
                    self.out.push_node(AstNode {
                        kind: AstKind::Transform {
                            from: from_rev,
                            to: to_rev,
                            transformation: transformation.reversed(),
                        },
                        annotations: node.annotations,
                    })
                }
            },
            AstKind::Refinement { from, filter } => match mode {
                Mode::From => self.go(from, mode),
                Mode::To => {
                    let from = self.go(from, mode);
                    self.out.push_node(AstNode { kind: AstKind::Refinement { from, filter }, annotations: node.annotations })
                }
                Mode::Reverse if self.source_has_transformation(from) => {
                    // check the filter on the type side, then encode through `from`
                    let checked_from = self.go(from, Mode::To);
                    let checked = self.out.push_node(AstNode {
                        kind: AstKind::Refinement { from: checked_from, filter },
                        annotations: node.annotations,
                    });
                    let encoded = self.go(from, Mode::Reverse);
                    self.out.push(AstKind::Transform {
                        from: checked,
                        to: encoded,
                        transformation: identity(),
                    })
                }
                Mode::Reverse => {
                    let from = self.go(from, mode);
                    self.out.push_node(AstNode { kind: AstKind::Refinement { from, filter }, annotations: node.annotations })
                }
            },
            AstKind::Declaration { type_parameters, decode, encode } => {
                let type_parameters = type_parameters.iter().map(|p| self.go(*p, mode)).collect();
                let (decode, encode) = match mode {
                    Mode::Reverse => (encode, decode),
                    _ => (decode, encode),
                };
                self.out.push_node(AstNode {
                    kind: AstKind::Declaration { type_parameters, decode, encode },
                    annotations: node.annotations,
                })
            }
            AstKind::TemplateLiteral { head, spans } => {
                let spans = spans
                    .into_iter()
                    .map(|s| TemplateLiteralSpan { ty: self.go(s.ty, mode), literal: s.literal })
                    .collect();
                self.out.push_node(AstNode { kind: AstKind::TemplateLiteral { head, spans }, annotations: node.annotations })
            }
            AstKind::Tuple { elements, rest, is_readonly } => {
                let elements = elements
                    .into_iter()
                    .map(|e| Element { ty: self.go(e.ty, mode), is_optional: e.is_optional })
                    .collect();
                let rest = rest.map(|r| r.into_iter().map(|t| self.go(t, mode)).collect());
                self.out.push_node(AstNode { kind: AstKind::Tuple { elements, rest, is_readonly }, annotations: node.annotations })
            }
            AstKind::TypeLiteral { property_signatures, index_signatures } => {
                let property_signatures = property_signatures
                    .into_iter()
                    .map(|p| PropertySignature { ty: self.go(p.ty, mode), ..p })
                    .collect();
                let index_signatures = index_signatures
                    .into_iter()
                    .map(|s| IndexSignature {
                        parameter: self.go(s.parameter, mode),
                        ty: self.go(s.ty, mode),
                        is_readonly: s.is_readonly,
                    })
                    .collect();
                self.out.push_node(AstNode {
                    kind: AstKind::TypeLiteral { property_signatures, index_signatures },
                    annotations: node.annotations,
                })
            }
            AstKind::Union(members) => {
                let members = members.into_iter().map(|m| self.go(m, mode)).collect();
                self.out.push_node(AstNode { kind: AstKind::Union(members), annotations: node.annotations })
            }
            leaf @ (AstKind::Literal(_)
            | AstKind::UniqueSymbol(_)
            | AstKind::Keyword(_)
            | AstKind::Enums(_)) => self.out.push_node(AstNode { kind: leaf, annotations: node.annotations }),
        };
        self.memo.insert((id, mode), out);
        out
    }

    fn source_has_transformation(&self, id: AstId) -> bool {
        Ast::new(self.source.clone(), id).has_transformation()
    }
}

fn identity() -> Transformation {
    let f: TransformFn = Arc::new(|v, _, _| ParseResult::success(v.clone()));
    Transformation::Final { decode: f.clone(), encode: f }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Keyword;
    use crate::value::Value;

    fn number_from_string(b: &mut AstBuilder) -> AstId {
        let s = b.string();
        let n = b.number();
        b.transform(
            s,
            n,
            |v| Value::Number(v.as_str().and_then(|s| s.parse().ok()).unwrap_or(f64::NAN)),
            |v| Value::String(crate::value::format_number(v.as_f64().unwrap_or(f64::NAN))),
        )
    }

    #[test]
    fn to_and_from_strip_transforms() {
        let mut b = AstBuilder::new();
        let t = number_from_string(&mut b);
        let arr = b.array(t);
        let ast = b.finish(arr).unwrap();

        let to = ast.to_ast();
        let AstKind::Tuple { rest: Some(rest), .. } = to.kind() else { panic!("expected a tuple") };
        assert!(matches!(to.at(rest[0]).kind(), AstKind::Keyword(Keyword::Number)));

        let from = ast.from_ast();
        let AstKind::Tuple { rest: Some(rest), .. } = from.kind() else { panic!("expected a tuple") };
        assert!(matches!(from.at(rest[0]).kind(), AstKind::Keyword(Keyword::String)));
        assert!(!to.has_transformation());
        assert!(ast.has_transformation());
    }

    #[test]
    fn refinements_survive_to_but_not_from() {
        let mut b = AstBuilder::new();
        let s = b.string();
        let r = b.min_length(s, 1);
        let ast = b.finish(r).unwrap();
        assert!(matches!(ast.to_ast().kind(), AstKind::Refinement { .. }));
        assert!(matches!(ast.from_ast().kind(), AstKind::Keyword(Keyword::String)));
    }

    #[test]
    fn reverse_swaps_sides() {
        let mut b = AstBuilder::new();
        let t = number_from_string(&mut b);
        let ast = b.finish(t).unwrap();
        let rev = ast.reverse();
        let AstKind::Transform { from, to, .. } = rev.kind() else { panic!("expected a transform") };
        assert!(matches!(rev.at(*from).kind(), AstKind::Keyword(Keyword::Number)));
        assert!(matches!(rev.at(*to).kind(), AstKind::Keyword(Keyword::String)));
    }

    #[test]
    fn reverse_of_refined_transform_checks_type_side_first() {
        let mut b = AstBuilder::new();
        let t = number_from_string(&mut b);
        let r = b.int(t);
        let ast = b.finish(r).unwrap();
        let rev = ast.reverse();
        let AstKind::Transform { from, to, .. } = rev.kind() else { panic!("expected a transform") };
        let from_node = rev.at(*from);
        let AstKind::Refinement { from: checked, .. } = from_node.kind() else { panic!("expected a refinement") };
        assert!(matches!(rev.at(*checked).kind(), AstKind::Keyword(Keyword::Number)));
        assert!(matches!(rev.at(*to).kind(), AstKind::Transform { .. }));
    }

    #[test]
    fn projections_keep_recursion() {
        let mut b = AstBuilder::new();
        let n = b.number();
        let root = b.lazy(|b, this| {
            let children = b.array(this);
            b.struct_(vec![PropertySignature::new("value", n), PropertySignature::new("children", children)])
        });
        let ast = b.finish(root).unwrap();
        let to = ast.to_ast();
        let AstKind::Lazy(target) = to.kind() else { panic!("expected a lazy") };
        let target_node = to.at(*target);
        let AstKind::TypeLiteral { property_signatures, .. } = target_node.kind() else {
            panic!("expected a struct")
        };
        let children_node = to.at(property_signatures[1].ty);
        let AstKind::Tuple { rest: Some(rest), .. } = children_node.kind() else {
            panic!("expected an array")
        };
        assert_eq!(rest[0], to.id());
    }
}
