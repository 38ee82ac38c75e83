//! Outcome of running a compiled parser, and the structured error tree.
//!
//! A [`ParseResult`] is either ready or suspended. Suspension is plain
//! `futures` machinery: the parsers never spawn, they only hand back a
//! boxed future for the caller to drive.
use std::fmt;
use std::future::{Future, IntoFuture};

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::ast::Ast;
use crate::value::{PropertyKey, Value};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Loadable from configuration as `{"allErrors": true, "isUnexpectedAllowed": false}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParseOptions {
    pub all_errors: bool,              // collect every error instead of stopping at the first
    pub is_unexpected_allowed: bool,   // excess keys/indices become warnings
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    Type { expected: Ast, actual: Value, message: Option<String> },
    Missing,
    Unexpected { actual: Value },
    Index { index: usize, errors: ParseErrors },
    Key { key: PropertyKey, errors: ParseErrors },
    UnionMember { errors: ParseErrors },
}

/// Non-empty list of errors.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseErrors(Vec<ParseError>);

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<A> {
    Success(A),
    Warning { warnings: ParseErrors, value: A },
    Failure(ParseErrors),
}

pub enum ParseResult<A> {
    Ready(Outcome<A>),
    Suspended(LocalBoxFuture<'static, Outcome<A>>),
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl ParseOptions {
    pub fn all_errors() -> Self { Self { all_errors: true, ..Self::default() } }
    pub fn allow_unexpected() -> Self { Self { is_unexpected_allowed: true, ..Self::default() } }
    pub fn with_all_errors(mut self, on: bool) -> Self {
        self.all_errors = on;
        self
    }
    pub fn with_unexpected_allowed(mut self, on: bool) -> Self {
        self.is_unexpected_allowed = on;
        self
    }
}

impl ParseError {
    pub fn type_mismatch(expected: &Ast, actual: &Value) -> Self {
        ParseError::Type { expected: expected.clone(), actual: actual.clone(), message: None }
    }
    pub fn type_with_message(expected: &Ast, actual: &Value, message: impl Into<String>) -> Self {
        ParseError::Type { expected: expected.clone(), actual: actual.clone(), message: Some(message.into()) }
    }
    pub fn missing() -> Self { ParseError::Missing }
    pub fn unexpected(actual: &Value) -> Self { ParseError::Unexpected { actual: actual.clone() } }
    pub fn index(index: usize, errors: impl Into<ParseErrors>) -> Self {
        ParseError::Index { index, errors: errors.into() }
    }
    pub fn key(key: impl Into<PropertyKey>, errors: impl Into<ParseErrors>) -> Self {
        ParseError::Key { key: key.into(), errors: errors.into() }
    }
    pub fn union_member(errors: impl Into<ParseErrors>) -> Self {
        ParseError::UnionMember { errors: errors.into() }
    }
    pub fn tag(&self) -> &'static str {
        match self {
            ParseError::Type { .. } => "Type",
            ParseError::Missing => "Missing",
            ParseError::Unexpected { .. } => "Unexpected",
            ParseError::Index { .. } => "Index",
            ParseError::Key { .. } => "Key",
            ParseError::UnionMember { .. } => "UnionMember",
        }
    }
}

impl ParseErrors {
    pub fn new(first: ParseError) -> Self { ParseErrors(vec![first]) }

    /// `None` for an empty list.
    pub fn from_vec(errors: Vec<ParseError>) -> Option<Self> {
        (!errors.is_empty()).then_some(ParseErrors(errors))
    }

    pub fn push(&mut self, error: ParseError) { self.0.push(error) }

    pub fn extend(&mut self, other: ParseErrors) { self.0.extend(other.0) }

    pub fn first(&self) -> &ParseError { &self.0[0] }

    pub fn len(&self) -> usize { self.0.len() }

    /// Always false; present for API symmetry.
    pub fn is_empty(&self) -> bool { false }

    pub fn iter(&self) -> std::slice::Iter<'_, ParseError> { self.0.iter() }

    pub fn as_slice(&self) -> &[ParseError] { &self.0 }

    pub fn into_vec(self) -> Vec<ParseError> { self.0 }
}

impl From<ParseError> for ParseErrors {
    fn from(e: ParseError) -> Self { ParseErrors::new(e) }
}

impl<'a> IntoIterator for &'a ParseErrors {
    type Item = &'a ParseError;
    type IntoIter = std::slice::Iter<'a, ParseError>;
    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

impl IntoIterator for ParseErrors {
    type Item = ParseError;
    type IntoIter = std::vec::IntoIter<ParseError>;
    fn into_iter(self) -> Self::IntoIter { self.0.into_iter() }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::tree_formatter::format_errors(self))
    }
}

impl<A> Outcome<A> {
    pub fn is_failure(&self) -> bool { matches!(self, Outcome::Failure(_)) }

    pub fn value(&self) -> Option<&A> {
        match self {
            Outcome::Success(a) | Outcome::Warning { value: a, .. } => Some(a),
            Outcome::Failure(_) => None,
        }
    }

    pub fn warnings(&self) -> Option<&ParseErrors> {
        match self {
            Outcome::Warning { warnings, .. } => Some(warnings),
            _ => None,
        }
    }

    pub fn errors(&self) -> Option<&ParseErrors> {
        match self {
            Outcome::Failure(errors) => Some(errors),
            _ => None,
        }
    }

    /// Warnings are dropped; use [`Outcome::warnings`] first to keep them.
    pub fn into_result(self) -> Result<A, ParseErrors> {
        match self {
            Outcome::Success(a) | Outcome::Warning { value: a, .. } => Ok(a),
            Outcome::Failure(errors) => Err(errors),
        }
    }

    pub fn map<B>(self, f: impl FnOnce(A) -> B) -> Outcome<B> {
        match self {
            Outcome::Success(a) => Outcome::Success(f(a)),
            Outcome::Warning { warnings, value } => Outcome::Warning { warnings, value: f(value) },
            Outcome::Failure(errors) => Outcome::Failure(errors),
        }
    }

    /// Applies `f` to whichever error list is present.
    pub fn map_errors(self, f: impl FnOnce(ParseErrors) -> ParseErrors) -> Outcome<A> {
        match self {
            Outcome::Success(a) => Outcome::Success(a),
            Outcome::Warning { warnings, value } => Outcome::Warning { warnings: f(warnings), value },
            Outcome::Failure(errors) => Outcome::Failure(f(errors)),
        }
    }

    /// Earlier warnings go first. A failure discards them.
    pub fn with_warnings(self, earlier: ParseErrors) -> Outcome<A> {
        match self {
            Outcome::Success(value) => Outcome::Warning { warnings: earlier, value },
            Outcome::Warning { warnings, value } => {
                let mut all = earlier;
                all.extend(warnings);
                Outcome::Warning { warnings: all, value }
            }
            failure @ Outcome::Failure(_) => failure,
        }
    }
}

impl<A: 'static> ParseResult<A> {
    pub fn success(value: A) -> Self { ParseResult::Ready(Outcome::Success(value)) }

    pub fn failure(error: ParseError) -> Self { ParseResult::Ready(Outcome::Failure(ParseErrors::new(error))) }

    pub fn failures(errors: ParseErrors) -> Self { ParseResult::Ready(Outcome::Failure(errors)) }

    pub fn warning(warnings: ParseErrors, value: A) -> Self {
        ParseResult::Ready(Outcome::Warning { warnings, value })
    }

    pub fn suspend(future: impl Future<Output = Outcome<A>> + 'static) -> Self {
        ParseResult::Suspended(future.boxed_local())
    }

    pub fn is_suspended(&self) -> bool { matches!(self, ParseResult::Suspended(_)) }

    pub fn ready(&self) -> Option<&Outcome<A>> {
        match self {
            ParseResult::Ready(o) => Some(o),
            ParseResult::Suspended(_) => None,
        }
    }

    pub fn map<B: 'static>(self, f: impl FnOnce(A) -> B + 'static) -> ParseResult<B> {
        match self {
            ParseResult::Ready(o) => ParseResult::Ready(o.map(f)),
            ParseResult::Suspended(fut) => ParseResult::suspend(async move { fut.await.map(f) }),
        }
    }

    /// Chains a parse step. Warnings of the first step are carried into the
    /// outcome of the second.
    pub fn and_then<B: 'static>(self, f: impl FnOnce(A) -> ParseResult<B> + 'static) -> ParseResult<B> {
        match self {
            ParseResult::Ready(o) => chain(o, f),
            ParseResult::Suspended(fut) => ParseResult::suspend(async move { chain(fut.await, f).await }),
        }
    }

    pub fn map_errors(self, f: impl FnOnce(ParseErrors) -> ParseErrors + 'static) -> Self {
        match self {
            ParseResult::Ready(o) => ParseResult::Ready(o.map_errors(f)),
            ParseResult::Suspended(fut) => ParseResult::suspend(async move { fut.await.map_errors(f) }),
        }
    }

    pub fn with_warnings(self, earlier: ParseErrors) -> Self {
        match self {
            ParseResult::Ready(o) => ParseResult::Ready(o.with_warnings(earlier)),
            ParseResult::Suspended(fut) => ParseResult::suspend(async move { fut.await.with_warnings(earlier) }),
        }
    }

    /// Drives a suspended result on the current thread. Must not be called
    /// from inside another executor's task.
    pub fn run_sync(self) -> Outcome<A> {
        match self {
            ParseResult::Ready(o) => o,
            ParseResult::Suspended(fut) => futures::executor::block_on(fut),
        }
    }
}

impl<A: 'static> IntoFuture for ParseResult<A> {
    type Output = Outcome<A>;
    type IntoFuture = LocalBoxFuture<'static, Outcome<A>>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            ParseResult::Ready(o) => futures::future::ready(o).boxed_local(),
            ParseResult::Suspended(fut) => fut,
        }
    }
}

impl<A: fmt::Debug> fmt::Debug for ParseResult<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseResult::Ready(o) => f.debug_tuple("Ready").field(o).finish(),
            ParseResult::Suspended(_) => f.write_str("Suspended(..)"),
        }
    }
}

impl<A: 'static> From<Outcome<A>> for ParseResult<A> {
    fn from(o: Outcome<A>) -> Self { ParseResult::Ready(o) }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn chain<A: 'static, B: 'static>(o: Outcome<A>, f: impl FnOnce(A) -> ParseResult<B>) -> ParseResult<B> {
    match o {
        Outcome::Success(a) => f(a),
        Outcome::Warning { warnings, value } => f(value).with_warnings(warnings),
        Outcome::Failure(errors) => ParseResult::failures(errors),
    }
}
