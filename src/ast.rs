//! The schema AST: an immutable arena of nodes addressed by [`AstId`].
//!
//! Nodes are created through [`builder::AstBuilder`] and frozen into an
//! [`AstGraph`]. Recursion only goes through [`AstKind::Lazy`], which is an
//! index into the same arena, so cycles are plain data and every walker can
//! memoize on the id.
pub mod annotations;
pub mod builder;
pub mod filters;
pub mod projection;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use ordered_float::OrderedFloat;

use crate::parse_result::{ParseError, ParseOptions, ParseResult};
use crate::parser::Parser;
use crate::value::{PropertyKey, Symbol, Value, format_number};

pub use annotations::Annotations;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AstId(pub(crate) usize);

/// Refinement predicate: `None` when the (already decoded) value passes.
pub type FilterFn = Arc<dyn Fn(&Value, &ParseOptions, &Ast) -> Option<ParseError> + Send + Sync>;

/// One direction of a transform. Receives the output of the `from` side.
pub type TransformFn = Arc<dyn Fn(&Value, &ParseOptions, &Ast) -> ParseResult<Value> + Send + Sync>;

/// Builds the parser of a declaration from the declaration node and the
/// compiled parsers of its type parameters.
pub type DeclarationFn = Arc<dyn Fn(&Ast, &[Parser]) -> Parser + Send + Sync>;

/// Per-key transformation of a struct transform. `None` means "absent".
pub type PropertyFn = Arc<dyn Fn(Option<Value>) -> Option<Value> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Undefined,
    Void,
    Never,
    Unknown,
    Any,
    String,
    Number,
    Boolean,
    BigInt,
    Symbol,
    Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    String(String),
    Number(OrderedFloat<f64>),
    Boolean(bool),
    Null,
    BigInt(i128),
}

#[derive(Clone)]
pub struct TemplateLiteralSpan {
    pub ty: AstId,        // String or Number keyword
    pub literal: String,
}

#[derive(Clone, Copy)]
pub struct Element {
    pub ty: AstId,
    pub is_optional: bool,
}

#[derive(Clone)]
pub struct PropertySignature {
    pub name: PropertyKey,
    pub ty: AstId,
    pub is_optional: bool,
    pub is_readonly: bool,
    pub annotations: Annotations,
}

#[derive(Clone, Copy)]
pub struct IndexSignature {
    pub parameter: AstId,
    pub ty: AstId,
    pub is_readonly: bool,
}

#[derive(Clone)]
pub struct PropertySignatureTransform {
    pub from: PropertyKey,
    pub to: PropertyKey,
    pub decode: PropertyFn,
    pub encode: PropertyFn,
}

#[derive(Clone)]
pub enum Transformation {
    Final { decode: TransformFn, encode: TransformFn },
    TypeLiteral(Vec<PropertySignatureTransform>),
}

#[derive(Clone)]
pub enum AstKind {
    Declaration {
        type_parameters: Vec<AstId>,
        decode: DeclarationFn,
        encode: DeclarationFn,
    },
    Literal(LiteralValue),
    UniqueSymbol(Symbol),
    Keyword(Keyword),
    Enums(Vec<(String, LiteralValue)>),
    TemplateLiteral { head: String, spans: Vec<TemplateLiteralSpan> },
    Tuple {
        elements: Vec<Element>,
        rest: Option<Vec<AstId>>,  // head is the repeated type, tail the post-rest elements
        is_readonly: bool,
    },
    TypeLiteral {
        property_signatures: Vec<PropertySignature>,
        index_signatures: Vec<IndexSignature>,
    },
    Union(Vec<AstId>),
    Lazy(AstId),
    Refinement { from: AstId, filter: FilterFn },
    Transform { from: AstId, to: AstId, transformation: Transformation },
}

#[derive(Clone)]
pub struct AstNode {
    pub kind: AstKind,
    pub annotations: Annotations,
}

/// A frozen arena. Never mutated once built.
pub struct AstGraph {
    pub(crate) nodes: Vec<AstNode>,
}

/// Handle to one node of a frozen graph. Cheap to clone.
#[derive(Clone)]
pub struct Ast {
    graph: Arc<AstGraph>,
    id: AstId,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl fmt::Display for AstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

impl AstId {
    pub fn index(self) -> usize { self.0 }
}

impl Keyword {
    pub fn tag(self) -> &'static str {
        match self {
            Keyword::Undefined => "UndefinedKeyword",
            Keyword::Void => "VoidKeyword",
            Keyword::Never => "NeverKeyword",
            Keyword::Unknown => "UnknownKeyword",
            Keyword::Any => "AnyKeyword",
            Keyword::String => "StringKeyword",
            Keyword::Number => "NumberKeyword",
            Keyword::Boolean => "BooleanKeyword",
            Keyword::BigInt => "BigIntKeyword",
            Keyword::Symbol => "SymbolKeyword",
            Keyword::Object => "ObjectKeyword",
        }
    }

    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Keyword::Undefined | Keyword::Void => value.is_undefined(),
            Keyword::Never => false,
            Keyword::Unknown | Keyword::Any => true,
            Keyword::String => matches!(value, Value::String(_)),
            Keyword::Number => matches!(value, Value::Number(_)),
            Keyword::Boolean => matches!(value, Value::Bool(_)),
            Keyword::BigInt => matches!(value, Value::BigInt(_)),
            Keyword::Symbol => matches!(value, Value::Symbol(_)),
            Keyword::Object => value.is_object_like(),
        }
    }
}

impl LiteralValue {
    /// Strict equality with an input value (`===`).
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (LiteralValue::String(a), Value::String(b)) => a == b,
            (LiteralValue::Number(a), Value::Number(b)) => a.into_inner() == *b,
            (LiteralValue::Boolean(a), Value::Bool(b)) => a == b,
            (LiteralValue::Null, Value::Null) => true,
            (LiteralValue::BigInt(a), Value::BigInt(b)) => a == b,
            _ => false,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            LiteralValue::String(s) => Value::String(s.clone()),
            LiteralValue::Number(n) => Value::Number(n.into_inner()),
            LiteralValue::Boolean(b) => Value::Bool(*b),
            LiteralValue::Null => Value::Null,
            LiteralValue::BigInt(n) => Value::BigInt(*n),
        }
    }

    /// `String(literal)`, the bucket key of a discriminated union.
    pub fn js_string(&self) -> String {
        match self {
            LiteralValue::String(s) => s.clone(),
            LiteralValue::Number(n) => format_number(n.into_inner()),
            LiteralValue::Boolean(b) => b.to_string(),
            LiteralValue::Null => "null".to_string(),
            LiteralValue::BigInt(n) => n.to_string(),
        }
    }
}

impl From<&str> for LiteralValue {
    fn from(s: &str) -> Self { LiteralValue::String(s.to_string()) }
}

impl From<String> for LiteralValue {
    fn from(s: String) -> Self { LiteralValue::String(s) }
}

impl From<f64> for LiteralValue {
    fn from(n: f64) -> Self { LiteralValue::Number(OrderedFloat(n)) }
}

impl From<i64> for LiteralValue {
    fn from(n: i64) -> Self { LiteralValue::Number(OrderedFloat(n as f64)) }
}

impl From<bool> for LiteralValue {
    fn from(b: bool) -> Self { LiteralValue::Boolean(b) }
}

impl Element {
    pub fn required(ty: AstId) -> Self { Self { ty, is_optional: false } }
    pub fn optional(ty: AstId) -> Self { Self { ty, is_optional: true } }
}

impl PropertySignature {
    pub fn new(name: impl Into<PropertyKey>, ty: AstId) -> Self {
        Self {
            name: name.into(),
            ty,
            is_optional: false,
            is_readonly: false,
            annotations: Annotations::default(),
        }
    }
    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }
    pub fn readonly(mut self) -> Self {
        self.is_readonly = true;
        self
    }
    pub fn with_annotations(mut self, annotations: Annotations) -> Self {
        self.annotations = annotations;
        self
    }
}

impl IndexSignature {
    pub fn new(parameter: AstId, ty: AstId) -> Self {
        Self { parameter, ty, is_readonly: false }
    }
}

impl PropertySignatureTransform {
    pub fn new(
        from: impl Into<PropertyKey>,
        to: impl Into<PropertyKey>,
        decode: impl Fn(Option<Value>) -> Option<Value> + Send + Sync + 'static,
        encode: impl Fn(Option<Value>) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            decode: Arc::new(decode),
            encode: Arc::new(encode),
        }
    }

    /// Decoding fills in a missing key; encoding passes the value through.
    pub fn default_value(
        key: impl Into<PropertyKey>,
        value: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Self {
        let key = key.into();
        Self::new(key.clone(), key, move |o| Some(o.unwrap_or_else(&value)), |o| o)
    }

    /// Moves a value from one key to another.
    pub fn rename(from: impl Into<PropertyKey>, to: impl Into<PropertyKey>) -> Self {
        Self::new(from, to, |o| o, |o| o)
    }

    pub(crate) fn reversed(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
            decode: self.encode.clone(),
            encode: self.decode.clone(),
        }
    }
}

impl Transformation {
    pub(crate) fn reversed(&self) -> Self {
        match self {
            Transformation::Final { decode, encode } => Transformation::Final {
                decode: encode.clone(),
                encode: decode.clone(),
            },
            Transformation::TypeLiteral(ts) => {
                Transformation::TypeLiteral(ts.iter().map(|t| t.reversed()).collect())
            }
        }
    }
}

impl AstKind {
    pub fn tag(&self) -> &'static str {
        match self {
            AstKind::Declaration { .. } => "Declaration",
            AstKind::Literal(_) => "Literal",
            AstKind::UniqueSymbol(_) => "UniqueSymbol",
            AstKind::Keyword(k) => k.tag(),
            AstKind::Enums(_) => "Enums",
            AstKind::TemplateLiteral { .. } => "TemplateLiteral",
            AstKind::Tuple { .. } => "Tuple",
            AstKind::TypeLiteral { .. } => "TypeLiteral",
            AstKind::Union(_) => "Union",
            AstKind::Lazy(_) => "Lazy",
            AstKind::Refinement { .. } => "Refinement",
            AstKind::Transform { .. } => "Transform",
        }
    }

    /// Ids this node points at, in declaration order.
    pub fn children(&self) -> Vec<AstId> {
        match self {
            AstKind::Declaration { type_parameters, .. } => type_parameters.clone(),
            AstKind::Literal(_)
            | AstKind::UniqueSymbol(_)
            | AstKind::Keyword(_)
            | AstKind::Enums(_) => Vec::new(),
            AstKind::TemplateLiteral { spans, .. } => spans.iter().map(|s| s.ty).collect(),
            AstKind::Tuple { elements, rest, .. } => elements
                .iter()
                .map(|e| e.ty)
                .chain(rest.iter().flatten().copied())
                .collect(),
            AstKind::TypeLiteral { property_signatures, index_signatures } => property_signatures
                .iter()
                .map(|p| p.ty)
                .chain(index_signatures.iter().flat_map(|s| [s.parameter, s.ty]))
                .collect(),
            AstKind::Union(members) => members.clone(),
            AstKind::Lazy(target) => vec![*target],
            AstKind::Refinement { from, .. } => vec![*from],
            AstKind::Transform { from, to, .. } => vec![*from, *to],
        }
    }
}

impl AstGraph {
    pub fn len(&self) -> usize { self.nodes.len() }
    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }
    pub fn node(&self, id: AstId) -> &AstNode { &self.nodes[id.0] }
}

impl Ast {
    pub(crate) fn new(graph: Arc<AstGraph>, id: AstId) -> Self { Self { graph, id } }

    pub fn id(&self) -> AstId { self.id }
    pub fn graph(&self) -> &Arc<AstGraph> { &self.graph }
    pub fn node(&self) -> &AstNode { self.graph.node(self.id) }
    pub fn kind(&self) -> &AstKind { &self.node().kind }
    pub fn annotations(&self) -> &Annotations { &self.node().annotations }

    /// Another node of the same graph.
    pub fn at(&self, id: AstId) -> Ast { Ast { graph: self.graph.clone(), id } }

    /// The node a lazy points at (or the node itself).
    pub fn resolve_lazy(&self) -> Ast {
        let mut seen = HashSet::new();
        let mut current = self.clone();
        while let AstKind::Lazy(target) = current.kind() {
            if !seen.insert(current.id) {
                break;
            }
            current = current.at(*target);
        }
        current
    }

    pub fn has_transformation(&self) -> bool {
        has_transformation(&self.graph, self.id, &mut HashSet::new())
    }

    /// The type side: transforms replaced by their `to`, refinements kept.
    pub fn to_ast(&self) -> Ast { projection::project(self, projection::Mode::To) }

    /// The encoded side: transforms replaced by their `from`, refinements
    /// dropped.
    pub fn from_ast(&self) -> Ast { projection::project(self, projection::Mode::From) }

    /// Swaps both sides of every transform, so decoding the result encodes.
    pub fn reverse(&self) -> Ast { projection::project(self, projection::Mode::Reverse) }

    /// Regex a template literal node matches. `None` for other kinds.
    pub fn template_literal_pattern(&self) -> Option<String> {
        let AstKind::TemplateLiteral { head, spans } = self.kind() else {
            return None;
        };
        let mut pattern = format!("^{}", escape_pattern(head));
        for span in spans {
            match self.graph.node(span.ty).kind {
                AstKind::Keyword(Keyword::Number) => pattern.push_str(r"-?[0-9]+(\.[0-9]+)?"),
                _ => pattern.push_str(".*"),
            }
            pattern.push_str(&escape_pattern(&span.literal));
        }
        pattern.push('$');
        Some(pattern)
    }
}

impl PartialEq for Ast {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.graph, &other.graph) && self.id == other.id
    }
}

impl fmt::Debug for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ast({}{}", self.kind().tag(), self.id)?;
        if let Some(id) = &self.annotations().identifier {
            write!(f, " {id:?}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for AstKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AstKind::Literal(l) => f.debug_tuple("Literal").field(l).finish(),
            AstKind::UniqueSymbol(s) => f.debug_tuple("UniqueSymbol").field(s).finish(),
            AstKind::Keyword(k) => f.debug_tuple("Keyword").field(k).finish(),
            AstKind::Enums(es) => f.debug_tuple("Enums").field(es).finish(),
            AstKind::Union(ms) => f.debug_tuple("Union").field(ms).finish(),
            AstKind::Lazy(t) => f.debug_tuple("Lazy").field(t).finish(),
            other => f
                .debug_struct(other.tag())
                .field("children", &other.children())
                .finish_non_exhaustive(),
        }
    }
}

impl fmt::Debug for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AstNode")
            .field("kind", &self.kind)
            .field("annotations", &self.annotations)
            .finish()
    }
}

// ------------------------------- Well known ---------------------------------- //

struct WellKnown {
    graph: Arc<AstGraph>,
    never: AstId,
    unknown_array: AstId,
    unknown_record: AstId,
}

static WELL_KNOWN: Lazy<WellKnown> = Lazy::new(|| {
    let mut b = builder::AstBuilder::new();
    let never = b.keyword(Keyword::Never);
    let unknown = b.keyword(Keyword::Unknown);
    let string = b.keyword(Keyword::String);
    let symbol = b.keyword(Keyword::Symbol);
    let unknown_array = b.push(AstKind::Tuple {
        elements: Vec::new(),
        rest: Some(vec![unknown]),
        is_readonly: true,
    });
    let unknown_record = b.push(AstKind::TypeLiteral {
        property_signatures: Vec::new(),
        index_signatures: vec![
            IndexSignature { parameter: string, ty: unknown, is_readonly: true },
            IndexSignature { parameter: symbol, ty: unknown, is_readonly: true },
        ],
    });
    WellKnown { graph: b.freeze(), never, unknown_array, unknown_record }
});

/// `never`, the expected node of an exhausted union.
pub fn never() -> Ast { Ast::new(WELL_KNOWN.graph.clone(), WELL_KNOWN.never) }

/// `ReadonlyArray<unknown>`, the expected node when a tuple gets a non-array.
pub fn unknown_array() -> Ast { Ast::new(WELL_KNOWN.graph.clone(), WELL_KNOWN.unknown_array) }

/// `{ [x: string | symbol]: unknown }`, the expected node when a struct gets
/// a non-record.
pub fn unknown_record() -> Ast { Ast::new(WELL_KNOWN.graph.clone(), WELL_KNOWN.unknown_record) }

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn has_transformation(graph: &AstGraph, id: AstId, seen: &mut HashSet<AstId>) -> bool {
    if !seen.insert(id) {
        return false;
    }
    match &graph.node(id).kind {
        AstKind::Transform { .. } => true,
        AstKind::Refinement { from, .. } => has_transformation(graph, *from, seen),
        AstKind::TypeLiteral { property_signatures, index_signatures } => {
            property_signatures.iter().any(|p| has_transformation(graph, p.ty, seen))
                || index_signatures.iter().any(|s| has_transformation(graph, s.ty, seen))
        }
        AstKind::Tuple { elements, rest, .. } => {
            elements.iter().any(|e| has_transformation(graph, e.ty, seen))
                || rest.iter().flatten().any(|r| has_transformation(graph, *r, seen))
        }
        AstKind::Union(members) => members.iter().any(|m| has_transformation(graph, *m, seen)),
        AstKind::Lazy(target) => has_transformation(graph, *target, seen),
        AstKind::Declaration { type_parameters, .. } => {
            type_parameters.iter().any(|p| has_transformation(graph, *p, seen))
        }
        _ => false,
    }
}

/// Follows refinements and transforms down to the encoded side of a node
/// without building a new graph.
pub(crate) fn encoded_side(ast: &Ast) -> Ast {
    let mut current = ast.clone();
    let mut steps = 0;
    loop {
        match current.kind() {
            AstKind::Refinement { from, .. } | AstKind::Transform { from, .. } => {
                current = current.at(*from);
            }
            _ => return current,
        }
        steps += 1;
        if steps > ast.graph.len() {
            return current;
        }
    }
}

/// Escapes the characters that are special in both Rust and ECMAScript
/// regular expressions (the pattern ends up in JSON-Schema documents too).
pub(crate) fn escape_pattern(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '^' | '$' | '.' | '|' | '?' | '*' | '+' | '(' | ')' | '[' | ']' | '{' | '}') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
