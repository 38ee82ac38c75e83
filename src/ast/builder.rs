//! Arena builder. Every constructor appends a node and returns its id;
//! [`AstBuilder::finish`] checks the arena and freezes it.
use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexSet;
use tracing::trace;

use crate::ast::{
    Annotations, Ast, AstGraph, AstId, AstKind, AstNode, DeclarationFn, Element, FilterFn,
    IndexSignature, Keyword, LiteralValue, PropertySignature, PropertySignatureTransform,
    TemplateLiteralSpan, TransformFn, Transformation,
};
use crate::error::AstError;
use crate::parse_result::{ParseError, ParseOptions, ParseResult};
use crate::parser::Parser;
use crate::value::{Symbol, Value};

#[derive(Default)]
pub struct AstBuilder {
    nodes: Vec<AstNode>,
    pending_lazy: IndexSet<AstId>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl AstBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.nodes.len() }
    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn kind(&self, id: AstId) -> Option<&AstKind> { self.nodes.get(id.0).map(|n| &n.kind) }

    pub fn annotations(&self, id: AstId) -> Option<&Annotations> {
        self.nodes.get(id.0).map(|n| &n.annotations)
    }

    pub(crate) fn push(&mut self, kind: AstKind) -> AstId {
        self.push_node(AstNode { kind, annotations: Annotations::default() })
    }

    pub(crate) fn push_node(&mut self, node: AstNode) -> AstId {
        let id = AstId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub(crate) fn replace_kind(&mut self, id: AstId, kind: AstKind) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.kind = kind;
        }
    }

    /// Freezes without validation. Only for graphs built internally.
    pub(crate) fn freeze(self) -> Arc<AstGraph> { Arc::new(AstGraph { nodes: self.nodes }) }

    // ------------------------------- Leaves ---------------------------------- //

    pub fn keyword(&mut self, keyword: Keyword) -> AstId { self.push(AstKind::Keyword(keyword)) }
    pub fn undefined(&mut self) -> AstId { self.keyword(Keyword::Undefined) }
    pub fn void(&mut self) -> AstId { self.keyword(Keyword::Void) }
    pub fn never(&mut self) -> AstId { self.keyword(Keyword::Never) }
    pub fn unknown(&mut self) -> AstId { self.keyword(Keyword::Unknown) }
    pub fn any(&mut self) -> AstId { self.keyword(Keyword::Any) }
    pub fn string(&mut self) -> AstId { self.keyword(Keyword::String) }
    pub fn number(&mut self) -> AstId { self.keyword(Keyword::Number) }
    pub fn boolean(&mut self) -> AstId { self.keyword(Keyword::Boolean) }
    pub fn bigint(&mut self) -> AstId { self.keyword(Keyword::BigInt) }
    pub fn symbol(&mut self) -> AstId { self.keyword(Keyword::Symbol) }
    pub fn object(&mut self) -> AstId { self.keyword(Keyword::Object) }

    pub fn literal(&mut self, literal: impl Into<LiteralValue>) -> AstId {
        self.push(AstKind::Literal(literal.into()))
    }

    pub fn null(&mut self) -> AstId { self.literal(LiteralValue::Null) }

    pub fn unique_symbol(&mut self, symbol: Symbol) -> AstId { self.push(AstKind::UniqueSymbol(symbol)) }

    pub fn enums(&mut self, enums: Vec<(String, LiteralValue)>) -> AstId { self.push(AstKind::Enums(enums)) }

    /// With no spans this is just a string literal.
    pub fn template_literal(
        &mut self,
        head: impl Into<String>,
        spans: Vec<(AstId, String)>,
    ) -> Result<AstId, AstError> {
        let head = head.into();
        if spans.is_empty() {
            return Ok(self.literal(LiteralValue::String(head)));
        }
        for (ty, _) in &spans {
            match self.kind(*ty) {
                Some(AstKind::Keyword(Keyword::String | Keyword::Number)) => {}
                Some(other) => {
                    return Err(AstError::InvalidTemplateLiteralSpan { id: *ty, tag: other.tag() });
                }
                None => return Err(AstError::UnknownNode { from: AstId(self.nodes.len()), to: *ty }),
            }
        }
        let spans = spans
            .into_iter()
            .map(|(ty, literal)| TemplateLiteralSpan { ty, literal })
            .collect();
        Ok(self.push(AstKind::TemplateLiteral { head, spans }))
    }

    pub fn declaration(
        &mut self,
        type_parameters: Vec<AstId>,
        decode: impl Fn(&Ast, &[Parser]) -> Parser + Send + Sync + 'static,
        encode: impl Fn(&Ast, &[Parser]) -> Parser + Send + Sync + 'static,
        annotations: Annotations,
    ) -> AstId {
        let decode: DeclarationFn = Arc::new(decode);
        let encode: DeclarationFn = Arc::new(encode);
        self.push_node(AstNode {
            kind: AstKind::Declaration { type_parameters, decode, encode },
            annotations,
        })
    }

    // ------------------------------- Tuples ---------------------------------- //

    pub fn tuple(&mut self, elements: Vec<Element>, rest: Option<Vec<AstId>>, is_readonly: bool) -> AstId {
        let rest = rest.filter(|r| !r.is_empty());
        self.push(AstKind::Tuple { elements, rest, is_readonly })
    }

    pub fn array(&mut self, item: AstId) -> AstId { self.tuple(Vec::new(), Some(vec![item]), true) }

    /// A new tuple with one more element. After a rest element only
    /// required elements are allowed; they land after the rest.
    pub fn append_element(&mut self, tuple: AstId, element: Element) -> Result<AstId, AstError> {
        let (mut elements, mut rest, is_readonly) = self.tuple_parts(tuple)?;
        match rest.as_mut() {
            Some(_) if element.is_optional => return Err(AstError::OptionalAfterRest),
            Some(rest) => rest.push(element.ty),
            None => elements.push(element),
        }
        Ok(self.push(AstKind::Tuple { elements, rest, is_readonly }))
    }

    pub fn append_rest_element(&mut self, tuple: AstId, ty: AstId) -> Result<AstId, AstError> {
        let (elements, rest, is_readonly) = self.tuple_parts(tuple)?;
        if rest.is_some() {
            return Err(AstError::RestAfterRest);
        }
        Ok(self.push(AstKind::Tuple { elements, rest: Some(vec![ty]), is_readonly }))
    }

    // ------------------------------- Structs --------------------------------- //

    pub fn type_literal(
        &mut self,
        property_signatures: Vec<PropertySignature>,
        index_signatures: Vec<IndexSignature>,
    ) -> Result<AstId, AstError> {
        for signature in &index_signatures {
            self.check_index_parameter(signature.parameter)?;
        }
        Ok(self.push(AstKind::TypeLiteral { property_signatures, index_signatures }))
    }

    pub fn struct_(&mut self, property_signatures: Vec<PropertySignature>) -> AstId {
        self.push(AstKind::TypeLiteral { property_signatures, index_signatures: Vec::new() })
    }

    pub fn record(&mut self, key: AstId, value: AstId) -> Result<AstId, AstError> {
        self.type_literal(Vec::new(), vec![IndexSignature::new(key, value)])
    }

    // ------------------------------- Unions ---------------------------------- //

    /// Flattens un-annotated nested unions and drops structural duplicates.
    /// No members is `never`, one member is that member.
    pub fn union(&mut self, members: Vec<AstId>) -> AstId {
        let mut flat: Vec<AstId> = Vec::with_capacity(members.len());
        for member in members {
            match self.nodes.get(member.0) {
                Some(AstNode { kind: AstKind::Union(inner), annotations }) if annotations.is_empty() => {
                    for m in inner.clone() {
                        self.push_unique(&mut flat, m);
                    }
                }
                _ => self.push_unique(&mut flat, member),
            }
        }
        match flat.len() {
            0 => self.never(),
            1 => flat[0],
            _ => self.push(AstKind::Union(flat)),
        }
    }

    // ------------------------------- Refinements ----------------------------- //

    pub fn refinement(
        &mut self,
        from: AstId,
        filter: impl Fn(&Value, &ParseOptions, &Ast) -> Option<ParseError> + Send + Sync + 'static,
        annotations: Annotations,
    ) -> AstId {
        let filter: FilterFn = Arc::new(filter);
        self.push_node(AstNode { kind: AstKind::Refinement { from, filter }, annotations })
    }

    /// Refinement from a plain predicate; failures are a Type error against
    /// the refinement node.
    pub fn filter(
        &mut self,
        from: AstId,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
        annotations: Annotations,
    ) -> AstId {
        self.refinement(
            from,
            move |value, _, ast| (!predicate(value)).then(|| ParseError::type_mismatch(ast, value)),
            annotations,
        )
    }

    // ------------------------------- Transforms ------------------------------ //

    pub fn transform(
        &mut self,
        from: AstId,
        to: AstId,
        decode: impl Fn(&Value) -> Value + Send + Sync + 'static,
        encode: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> AstId {
        self.transform_or_fail(
            from,
            to,
            move |v, _, _| ParseResult::success(decode(v)),
            move |v, _, _| ParseResult::success(encode(v)),
        )
    }

    pub fn transform_or_fail(
        &mut self,
        from: AstId,
        to: AstId,
        decode: impl Fn(&Value, &ParseOptions, &Ast) -> ParseResult<Value> + Send + Sync + 'static,
        encode: impl Fn(&Value, &ParseOptions, &Ast) -> ParseResult<Value> + Send + Sync + 'static,
    ) -> AstId {
        let decode: TransformFn = Arc::new(decode);
        let encode: TransformFn = Arc::new(encode);
        self.push(AstKind::Transform { from, to, transformation: Transformation::Final { decode, encode } })
    }

    pub fn type_literal_transform(
        &mut self,
        from: AstId,
        to: AstId,
        transforms: Vec<PropertySignatureTransform>,
    ) -> AstId {
        self.push(AstKind::Transform { from, to, transformation: Transformation::TypeLiteral(transforms) })
    }

    // ------------------------------- Recursion ------------------------------- //

    /// Reserves a lazy node whose target is set later by [`Self::define_lazy`].
    pub fn reserve_lazy(&mut self) -> AstId {
        let id = AstId(self.nodes.len());
        self.push(AstKind::Lazy(id));
        self.pending_lazy.insert(id);
        id
    }

    pub fn define_lazy(&mut self, lazy: AstId, target: AstId) -> Result<(), AstError> {
        if !self.pending_lazy.contains(&lazy) {
            return Err(AstError::NotALazy { id: lazy });
        }
        if target.0 >= self.nodes.len() {
            return Err(AstError::UnknownNode { from: lazy, to: target });
        }
        self.replace_kind(lazy, AstKind::Lazy(target));
        self.pending_lazy.shift_remove(&lazy);
        trace!(%lazy, %target, "lazy node defined");
        Ok(())
    }

    /// `f` receives the id of the lazy node itself for self references.
    pub fn lazy(&mut self, f: impl FnOnce(&mut Self, AstId) -> AstId) -> AstId {
        let this = self.reserve_lazy();
        let target = f(self, this);
        // an unknown target leaves the lazy pending, `finish` reports it
        let _ = self.define_lazy(this, target);
        this
    }

    /// Merges annotations into an existing node in place.
    pub fn annotate(&mut self, id: AstId, annotations: Annotations) -> AstId {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.annotations.merge(annotations);
        }
        id
    }

    pub fn finish(self, root: AstId) -> Result<Ast, AstError> {
        if let Some(id) = self.pending_lazy.first() {
            return Err(AstError::UndefinedLazy { id: *id });
        }
        if root.0 >= self.nodes.len() {
            return Err(AstError::UnknownNode { from: root, to: root });
        }
        for (index, node) in self.nodes.iter().enumerate() {
            let from = AstId(index);
            for to in node.kind.children() {
                if to.0 >= self.nodes.len() {
                    return Err(AstError::UnknownNode { from, to });
                }
                if to.0 >= index && !matches!(node.kind, AstKind::Lazy(_)) {
                    return Err(AstError::ForwardReference { from, to });
                }
            }
        }
        for id in self.lazies() {
            if self.loops_in_place(id) {
                return Err(AstError::LazyCycle { id });
            }
        }
        Ok(Ast::new(self.freeze(), root))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

impl AstBuilder {
    fn tuple_parts(&self, tuple: AstId) -> Result<(Vec<Element>, Option<Vec<AstId>>, bool), AstError> {
        match self.kind(tuple) {
            Some(AstKind::Tuple { elements, rest, is_readonly }) => {
                Ok((elements.clone(), rest.clone(), *is_readonly))
            }
            Some(other) => Err(AstError::NotATuple { id: tuple, tag: other.tag() }),
            None => Err(AstError::UnknownNode { from: tuple, to: tuple }),
        }
    }

    fn lazies(&self) -> Vec<AstId> {
        (0..self.nodes.len())
            .map(AstId)
            .filter(|id| matches!(self.kind(*id), Some(AstKind::Lazy(_))))
            .collect()
    }

    /// Whether `lazy` reaches itself through nodes that hand their input on
    /// unchanged: lazies, unions, refinements and transforms.
    fn loops_in_place(&self, lazy: AstId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![lazy];
        while let Some(id) = stack.pop() {
            let next = match self.kind(id) {
                Some(AstKind::Lazy(target)) => vec![*target],
                Some(AstKind::Union(members)) => members.clone(),
                Some(AstKind::Refinement { from, .. }) => vec![*from],
                Some(AstKind::Transform { from, to, .. }) => vec![*from, *to],
                _ => continue,
            };
            for to in next {
                if to == lazy {
                    return true;
                }
                if seen.insert(to) {
                    stack.push(to);
                }
            }
        }
        false
    }

    fn check_index_parameter(&self, parameter: AstId) -> Result<(), AstError> {
        match self.kind(parameter) {
            Some(AstKind::Keyword(Keyword::String | Keyword::Symbol)) => Ok(()),
            Some(AstKind::TemplateLiteral { .. }) => Ok(()),
            Some(AstKind::Refinement { from, .. }) => self.check_index_parameter(*from),
            Some(other) => Err(AstError::InvalidIndexSignatureParameter { id: parameter, tag: other.tag() }),
            None => Err(AstError::UnknownNode { from: parameter, to: parameter }),
        }
    }

    fn push_unique(&self, members: &mut Vec<AstId>, candidate: AstId) {
        if !members.iter().any(|m| self.same_shape(*m, candidate)) {
            members.push(candidate);
        }
    }

    /// Structural identity for union de-duplication: the same id, or two
    /// un-annotated leaves of equal content.
    fn same_shape(&self, a: AstId, b: AstId) -> bool {
        if a == b {
            return true;
        }
        let (Some(na), Some(nb)) = (self.nodes.get(a.0), self.nodes.get(b.0)) else {
            return false;
        };
        if !na.annotations.is_empty() || !nb.annotations.is_empty() {
            return false;
        }
        match (&na.kind, &nb.kind) {
            (AstKind::Keyword(x), AstKind::Keyword(y)) => x == y,
            (AstKind::Literal(x), AstKind::Literal(y)) => x == y,
            (AstKind::UniqueSymbol(x), AstKind::UniqueSymbol(y)) => x == y,
            (AstKind::Enums(x), AstKind::Enums(y)) => x == y,
            (AstKind::Lazy(x), AstKind::Lazy(y)) => x == y,
            (
                AstKind::TemplateLiteral { head: h1, spans: s1 },
                AstKind::TemplateLiteral { head: h2, spans: s2 },
            ) => {
                h1 == h2
                    && s1.len() == s2.len()
                    && s1.iter().zip(s2).all(|(x, y)| x.literal == y.literal && self.same_shape(x.ty, y.ty))
            }
            (AstKind::Refinement { from: f1, filter: p1 }, AstKind::Refinement { from: f2, filter: p2 }) => {
                Arc::ptr_eq(p1, p2) && self.same_shape(*f1, *f2)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_flattens_and_dedups() {
        let mut b = AstBuilder::new();
        let s1 = b.string();
        let s2 = b.string();
        let n = b.number();
        let a = b.literal("a");
        let a2 = b.literal("a");
        let inner = b.union(vec![n, a]);
        let u = b.union(vec![s1, inner, s2, a2]);
        let Some(AstKind::Union(members)) = b.kind(u) else { panic!("expected a union") };
        assert_eq!(members, &vec![s1, n, a]);
    }

    #[test]
    fn union_keeps_annotated_duplicates_and_nested_unions() {
        let mut b = AstBuilder::new();
        let s1 = b.string();
        let s2 = b.string();
        b.annotate(s2, Annotations::new().identifier("Name"));
        let n = b.number();
        let boolean = b.boolean();
        let inner = b.union(vec![n, boolean]);
        b.annotate(inner, Annotations::new().title("NumOrBool"));
        let u = b.union(vec![s1, s2, inner]);
        let Some(AstKind::Union(members)) = b.kind(u) else { panic!("expected a union") };
        assert_eq!(members, &vec![s1, s2, inner]);
    }

    #[test]
    fn degenerate_unions() {
        let mut b = AstBuilder::new();
        let empty = b.union(vec![]);
        assert!(matches!(b.kind(empty), Some(AstKind::Keyword(Keyword::Never))));
        let s = b.string();
        assert_eq!(b.union(vec![s]), s);
    }

    #[test]
    fn rest_element_preconditions() {
        let mut b = AstBuilder::new();
        let s = b.string();
        let n = b.number();
        assert!(matches!(b.append_rest_element(s, n), Err(AstError::NotATuple { .. })));
        let t = b.tuple(vec![Element::required(s)], None, true);
        let t = b.append_rest_element(t, n).unwrap();
        assert!(matches!(b.append_rest_element(t, n), Err(AstError::RestAfterRest)));
        assert!(matches!(b.append_element(t, Element::optional(s)), Err(AstError::OptionalAfterRest)));
        let t = b.append_element(t, Element::required(s)).unwrap();
        let Some(AstKind::Tuple { rest, .. }) = b.kind(t) else { panic!("expected a tuple") };
        assert_eq!(rest, &Some(vec![n, s]));
    }

    #[test]
    fn index_signature_parameters_are_checked() {
        let mut b = AstBuilder::new();
        let n = b.number();
        let s = b.string();
        assert!(matches!(
            b.record(n, s),
            Err(AstError::InvalidIndexSignatureParameter { tag: "NumberKeyword", .. })
        ));
        let refined = b.min_length(s, 1);
        assert!(b.record(refined, n).is_ok());
    }

    #[test]
    fn template_literal_without_spans_is_a_literal() {
        let mut b = AstBuilder::new();
        let t = b.template_literal("abc", vec![]).unwrap();
        assert!(matches!(b.kind(t), Some(AstKind::Literal(LiteralValue::String(s))) if s == "abc"));
        let boolean = b.boolean();
        assert!(matches!(
            b.template_literal("a", vec![(boolean, String::new())]),
            Err(AstError::InvalidTemplateLiteralSpan { .. })
        ));
    }

    #[test]
    fn finish_rejects_undefined_lazies() {
        let mut b = AstBuilder::new();
        let lazy = b.reserve_lazy();
        assert!(matches!(b.finish(lazy), Err(AstError::UndefinedLazy { .. })));
    }

    #[test]
    fn finish_rejects_forward_references() {
        let mut b = AstBuilder::new();
        b.string();
        let arr = b.array(AstId(5));
        assert!(matches!(b.finish(arr), Err(AstError::UnknownNode { .. })));

        let mut b = AstBuilder::new();
        let arr = b.array(AstId(1));
        b.string();
        assert!(matches!(b.finish(arr), Err(AstError::ForwardReference { .. })));
    }

    #[test]
    fn finish_rejects_lazies_that_never_consume_input() {
        let mut b = AstBuilder::new();
        let root = b.lazy(|_, this| this);
        assert!(matches!(b.finish(root), Err(AstError::LazyCycle { id }) if id == root));

        let mut b = AstBuilder::new();
        let a = b.reserve_lazy();
        let c = b.lazy(|_, _| a);
        b.define_lazy(a, c).unwrap();
        assert!(matches!(b.finish(a), Err(AstError::LazyCycle { .. })));

        let mut b = AstBuilder::new();
        let n = b.number();
        let root = b.lazy(|b, this| {
            let refined = b.min_items(this, 1);
            b.union(vec![n, refined])
        });
        assert!(matches!(b.finish(root), Err(AstError::LazyCycle { .. })));
    }

    #[test]
    fn lazies_behind_a_container_are_accepted() {
        let mut b = AstBuilder::new();
        let n = b.number();
        let root = b.lazy(|b, this| {
            let list = b.array(this);
            b.union(vec![n, list])
        });
        assert!(b.finish(root).is_ok());
    }
}
