//! Step-ordered accumulator shared by the tuple and struct parsers.
//!
//! Every child parse gets a step number when it is started. Results that
//! are ready are folded in at once; suspended ones are queued and drained
//! afterwards, each landing under its original step. Errors, warnings and
//! output are sorted by step at the end, so ordering never depends on which
//! children suspended.
//!
//! In fail-fast mode the first recorded error halts the walk but is only a
//! candidate: suspended children with a lower step are still drained, and
//! the lowest-step failure wins.
use futures::future::LocalBoxFuture;

use crate::parse_result::{Outcome, ParseError, ParseErrors, ParseOptions, ParseResult};
use crate::value::{PropertyKey, Value};

/// Where a child value sits in its parent.
#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Index(usize),
    Key(PropertyKey),
}

/// Returned by [`StepState::push`] and [`StepState::fail`] when fail-fast
/// mode has an error and no further children should be started. The error
/// itself stays in the state; [`StepState::finish`] reports it.
#[derive(Debug)]
pub(crate) struct Halt;

pub(crate) struct StepState {
    all_errors: bool,
    next_step: usize,
    errors: Vec<(usize, ParseError)>,
    warnings: Vec<(usize, ParseError)>,
    output: Vec<(usize, Slot, Value)>,
    residual: Vec<(usize, Slot, LocalBoxFuture<'static, Outcome<Value>>)>,
}

impl Slot {
    pub(crate) fn wrap(&self, errors: ParseErrors) -> ParseError {
        match self {
            Slot::Index(i) => ParseError::index(*i, errors),
            Slot::Key(k) => ParseError::key(k.clone(), errors),
        }
    }

    pub(crate) fn into_key(self) -> PropertyKey {
        match self {
            Slot::Index(i) => PropertyKey::String(i.to_string()),
            Slot::Key(k) => k,
        }
    }
}

impl StepState {
    pub(crate) fn new(options: ParseOptions) -> Self {
        Self {
            all_errors: options.all_errors,
            next_step: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            output: Vec::new(),
            residual: Vec::new(),
        }
    }

    fn step(&mut self) -> usize {
        let step = self.next_step;
        self.next_step += 1;
        step
    }

    /// Records an error. In fail-fast mode this halts the walk.
    pub(crate) fn fail(&mut self, error: ParseError) -> Result<(), Halt> {
        let step = self.step();
        self.record_error(step, error)
    }

    pub(crate) fn warn(&mut self, warning: ParseError) {
        let step = self.step();
        self.warnings.push((step, warning));
    }

    /// Starts a child parse at `slot`.
    pub(crate) fn push(&mut self, slot: Slot, result: ParseResult<Value>) -> Result<(), Halt> {
        let step = self.step();
        match result {
            ParseResult::Ready(outcome) => self.fold(step, slot, outcome),
            ParseResult::Suspended(future) => {
                self.residual.push((step, slot, future));
                Ok(())
            }
        }
    }

    /// Completes once every queued child has finished. `build` assembles the
    /// step-ordered children into the parent value.
    pub(crate) fn finish(
        mut self,
        build: impl FnOnce(Vec<(Slot, Value)>) -> Value + 'static,
    ) -> ParseResult<Value> {
        let mut residual = std::mem::take(&mut self.residual);
        if let Some(candidate) = self.candidate() {
            residual.retain(|(step, _, _)| *step < candidate);
        }
        if residual.is_empty() {
            return ParseResult::Ready(self.complete(build));
        }
        ParseResult::suspend(async move {
            let mut state = self;
            for (step, slot, future) in residual {
                let outcome = future.await;
                if state.fold(step, slot, outcome).is_err() {
                    break;
                }
            }
            state.complete(build)
        })
    }

    /// Step of the fail-fast error waiting on earlier suspended children.
    fn candidate(&self) -> Option<usize> {
        if self.all_errors {
            return None;
        }
        self.errors.iter().map(|(step, _)| *step).min()
    }

    fn fold(&mut self, step: usize, slot: Slot, outcome: Outcome<Value>) -> Result<(), Halt> {
        match outcome {
            Outcome::Success(value) => {
                self.output.push((step, slot, value));
                Ok(())
            }
            Outcome::Warning { warnings, value } => {
                self.warnings.push((step, slot.wrap(warnings)));
                self.output.push((step, slot, value));
                Ok(())
            }
            Outcome::Failure(errors) => {
                let error = slot.wrap(errors);
                self.record_error(step, error)
            }
        }
    }

    fn record_error(&mut self, step: usize, error: ParseError) -> Result<(), Halt> {
        self.errors.push((step, error));
        if self.all_errors { Ok(()) } else { Err(Halt) }
    }

    fn complete(self, build: impl FnOnce(Vec<(Slot, Value)>) -> Value) -> Outcome<Value> {
        let mut errors = self.errors;
        if !self.all_errors {
            errors.sort_by_key(|(step, _)| *step);
            errors.truncate(1);
        }
        if let Some(errors) = sorted(errors) {
            return Outcome::Failure(errors);
        }
        let mut output = self.output;
        output.sort_by_key(|(step, _, _)| *step);
        let value = build(output.into_iter().map(|(_, slot, value)| (slot, value)).collect());
        match sorted(self.warnings) {
            Some(warnings) => Outcome::Warning { warnings, value },
            None => Outcome::Success(value),
        }
    }
}

fn sorted(mut entries: Vec<(usize, ParseError)>) -> Option<ParseErrors> {
    entries.sort_by_key(|(step, _)| *step);
    ParseErrors::from_vec(entries.into_iter().map(|(_, e)| e).collect())
}
