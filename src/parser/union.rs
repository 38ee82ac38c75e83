//! Unions, with a literal search tree to narrow the candidates.
//!
//! Members that require a literal-typed property are bucketed by property
//! name and by the string form of the literal. On input, only the members of
//! the bucket matching the input's value are tried; members without any
//! such property are tried afterwards, in declaration order. First success
//! wins.
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::ast::builder::AstBuilder;
use crate::ast::{self, Ast, AstKind, AstNode, LiteralValue, encoded_side};
use crate::parse_result::{Outcome, ParseError, ParseErrors, ParseOptions, ParseResult};
use crate::parser::Parser;
use crate::parser::compiler::Compiler;
use crate::value::{PropertyKey, Value};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

pub(crate) struct SearchTree {
    pub(crate) keys: IndexMap<PropertyKey, KeyBuckets>,
    pub(crate) otherwise: Vec<usize>,    // members without a literal property
}

pub(crate) struct KeyBuckets {
    pub(crate) buckets: IndexMap<String, Vec<usize>>,
    literals: Vec<Ast>,
    expected: Option<Ast>,                // union of `literals`, for error messages
}

enum UnionStep {
    Error(ParseError),
    Try(usize),
}

struct UnionParser {
    members: Vec<Parser>,
    tree: SearchTree,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

pub(crate) fn compile(compiler: &Compiler, ast: &Ast) -> Parser {
    let AstKind::Union(members) = ast.kind() else {
        return Rc::new(|input: &Value, _: ParseOptions| ParseResult::success(input.clone()));
    };
    let member_asts: Vec<Ast> = members.iter().map(|m| ast.at(*m)).collect();
    let tree = SearchTree::new(&member_asts);
    trace!(
        node = %ast.id(),
        keys = tree.keys.len(),
        otherwise = tree.otherwise.len(),
        "union search tree built"
    );
    let parser = Rc::new(UnionParser {
        members: members.iter().map(|m| compiler.compile(*m)).collect(),
        tree,
    });
    Rc::new(move |input: &Value, options: ParseOptions| parser.clone().run(input, options))
}

impl SearchTree {
    pub(crate) fn new(members: &[Ast]) -> Self {
        let mut keys: IndexMap<PropertyKey, KeyBuckets> = IndexMap::new();
        let mut otherwise = Vec::new();
        for (index, member) in members.iter().enumerate() {
            let tags = literal_properties(member);
            if tags.is_empty() {
                otherwise.push(index);
                continue;
            }
            let last = tags.len() - 1;
            for (j, (key, literal)) in tags.into_iter().enumerate() {
                let LiteralNode { value, node } = literal;
                let entry = keys.entry(key).or_insert_with(|| KeyBuckets {
                    buckets: IndexMap::new(),
                    literals: Vec::new(),
                    expected: None,
                });
                let hash = value.js_string();
                match entry.buckets.get_mut(&hash) {
                    // the value is taken: move on to this member's next literal,
                    // or share the bucket when this was the last one
                    Some(_) if j < last => continue,
                    Some(bucket) => {
                        bucket.push(index);
                        entry.literals.push(node);
                    }
                    None => {
                        entry.buckets.insert(hash, vec![index]);
                        entry.literals.push(node);
                        break;
                    }
                }
            }
        }
        for buckets in keys.values_mut() {
            buckets.expected = Some(union_of(&buckets.literals));
        }
        SearchTree { keys, otherwise }
    }

    fn plan(&self, input: &Value) -> Vec<UnionStep> {
        let mut steps = Vec::new();
        if !self.keys.is_empty() {
            match input.as_object() {
                Some(record) => {
                    for (key, buckets) in &self.keys {
                        match record.get(key) {
                            Some(value) => match buckets.buckets.get(&value.js_string()) {
                                Some(bucket) => steps.extend(bucket.iter().map(|i| UnionStep::Try(*i))),
                                None => {
                                    let expected = buckets.expected.clone().unwrap_or_else(ast::never);
                                    steps.push(UnionStep::Error(ParseError::key(
                                        key.clone(),
                                        ParseError::type_mismatch(&expected, value),
                                    )));
                                }
                            },
                            None => steps.push(UnionStep::Error(ParseError::key(key.clone(), ParseError::missing()))),
                        }
                    }
                }
                None => steps.push(UnionStep::Error(ParseError::type_mismatch(&ast::unknown_record(), input))),
            }
        }
        steps.extend(self.otherwise.iter().map(|i| UnionStep::Try(*i)));
        steps
    }
}

impl UnionParser {
    fn run(self: Rc<Self>, input: &Value, options: ParseOptions) -> ParseResult<Value> {
        let mut errors: Vec<ParseError> = Vec::new();
        let mut steps = self.tree.plan(input).into_iter();
        while let Some(step) = steps.next() {
            let member = match step {
                UnionStep::Error(error) => {
                    errors.push(error);
                    continue;
                }
                UnionStep::Try(member) => member,
            };
            match (self.members[member])(input, options) {
                ParseResult::Ready(Outcome::Failure(es)) => errors.push(ParseError::union_member(es)),
                ParseResult::Ready(outcome) => return ParseResult::Ready(outcome),
                ParseResult::Suspended(future) => {
                    // from here on every remaining candidate runs in order
                    let remaining: Vec<UnionStep> = steps.collect();
                    let input = input.clone();
                    return ParseResult::suspend(async move {
                        match future.await {
                            Outcome::Failure(es) => errors.push(ParseError::union_member(es)),
                            outcome => return outcome,
                        }
                        for step in remaining {
                            match step {
                                UnionStep::Error(error) => errors.push(error),
                                UnionStep::Try(member) => match (self.members[member])(&input, options).await {
                                    Outcome::Failure(es) => errors.push(ParseError::union_member(es)),
                                    outcome => return outcome,
                                },
                            }
                        }
                        conclude(errors, &input)
                    });
                }
            }
        }
        ParseResult::Ready(conclude(errors, input))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

struct LiteralNode {
    value: LiteralValue,
    node: Ast,
}

fn conclude(errors: Vec<ParseError>, input: &Value) -> Outcome<Value> {
    match ParseErrors::from_vec(errors) {
        Some(errors) => Outcome::Failure(errors),
        None => Outcome::Failure(ParseErrors::new(ParseError::type_mismatch(&ast::never(), input))),
    }
}

/// Required properties whose encoded side is a literal.
fn literal_properties(member: &Ast) -> Vec<(PropertyKey, LiteralNode)> {
    match member.kind() {
        AstKind::TypeLiteral { property_signatures, .. } => property_signatures
            .iter()
            .filter(|p| !p.is_optional)
            .filter_map(|p| {
                let ty = encoded_side(&member.at(p.ty));
                match ty.kind() {
                    AstKind::Literal(value) => Some((p.name.clone(), LiteralNode { value: value.clone(), node: ty.clone() })),
                    _ => None,
                }
            })
            .collect(),
        AstKind::Refinement { from, .. } | AstKind::Transform { from, .. } => literal_properties(&member.at(*from)),
        _ => Vec::new(),
    }
}

/// Copies the literal nodes into a side graph and unions them.
fn union_of(literals: &[Ast]) -> Ast {
    let mut b = AstBuilder::new();
    let ids = literals
        .iter()
        .map(|l| b.push_node(AstNode { kind: l.kind().clone(), annotations: l.annotations().clone() }))
        .collect();
    let root = b.union(ids);
    Ast::new(b.freeze(), root)
}
