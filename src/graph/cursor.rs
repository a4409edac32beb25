//! Lazy result cursors.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::warn;

use crate::answer::Answer;
use crate::error::{KbError, KbResult};
use crate::modal::ModalIteration;
use crate::storage::DocumentCursor;
use crate::term::{Substitution, Term, Variable};
use crate::time::TimeInterval;
use crate::triple::{Triple, TriplePattern};

use super::codec::decode_triple;
use super::store::StoreInner;

/// Triples matching one pattern, decoded as they are pulled.
pub struct TripleCursor {
    docs: DocumentCursor,
    pattern: TriplePattern,
}

impl TripleCursor {
    pub(crate) fn new(docs: DocumentCursor, pattern: TriplePattern) -> Self {
        Self { docs, pattern }
    }
}

impl Iterator for TripleCursor {
    type Item = Triple;

    fn next(&mut self) -> Option<Triple> {
        for doc in self.docs.by_ref() {
            match decode_triple(&doc) {
                // A variable repeated across positions must bind consistently.
                Ok(triple) if self.pattern.bindings(&triple).is_some() => return Some(triple),
                Ok(_) => {}
                Err(err) => warn!(%err, "skipping undecodable document"),
            }
        }
        None
    }
}

fn is_atom_or_variable(term: &Term) -> bool {
    matches!(term, Term::Atom(_) | Term::Variable(_))
}

#[derive(Debug, Clone)]
struct Partial {
    substitution: Substitution,
    origins: BTreeSet<String>,
    interval: TimeInterval,
    frame: Option<ModalIteration>,
}

impl Partial {
    fn root() -> Self {
        Self {
            substitution: Substitution::new(),
            origins: BTreeSet::new(),
            interval: TimeInterval::always(),
            frame: None,
        }
    }

    /// Extends the partial solution with a matched triple. None if the
    /// bindings conflict or the validity intervals are disjoint.
    fn extend(&self, pattern: &TriplePattern, triple: &Triple) -> Option<Self> {
        let bindings = pattern.bindings(triple)?;
        let substitution = self.substitution.merged(&bindings)?;
        let interval = self.interval.intersection(triple.interval())?;
        let mut origins = self.origins.clone();
        origins.insert(triple.origin().to_string());
        Some(Self {
            substitution,
            origins,
            interval,
            frame: self.frame.clone().or_else(|| Some(triple.frame().clone())),
        })
    }

    fn into_answer(self) -> Answer {
        Answer {
            substitution: self.substitution,
            origins: self.origins,
            frame: self.frame.unwrap_or_default(),
            interval: self.interval,
            reasoner: None,
        }
    }
}

struct Stage {
    docs: DocumentCursor,
    pattern: TriplePattern,
    partial: Partial,
}

/// Solutions of an ordered conjunction of patterns.
///
/// Evaluated as a left-deep index nested-loop join in the given order: the
/// pattern of stage *i* is grounded with the bindings of stages `0..i`
/// before it is compiled and sent to the database. Stages are opened
/// lazily as solutions are pulled.
///
/// A storage error ends the stream early; it can be retrieved with
/// [`AnswerCursor::take_error`].
pub struct AnswerCursor {
    inner: Arc<StoreInner>,
    patterns: Vec<TriplePattern>,
    stack: Vec<Stage>,
    limit: Option<usize>,
    emitted: usize,
    empty_pending: bool,
    error: Option<KbError>,
}

impl AnswerCursor {
    pub(crate) fn start(inner: Arc<StoreInner>, patterns: Vec<TriplePattern>, limit: Option<usize>) -> KbResult<Self> {
        // Validate every stage up front, counting variables bound by
        // earlier stages as bound.
        let mut bound: BTreeSet<Variable> = BTreeSet::new();
        for pattern in &patterns {
            inner.compile(pattern, &bound)?;
            bound.extend(pattern.variables());
        }

        let mut cursor = Self {
            inner,
            empty_pending: patterns.is_empty(),
            patterns,
            stack: Vec::new(),
            limit,
            emitted: 0,
            error: None,
        };
        if !cursor.patterns.is_empty() {
            let first = cursor.open(0, Partial::root())?;
            cursor.stack.push(first);
        }
        Ok(cursor)
    }

    fn open(&self, index: usize, partial: Partial) -> KbResult<Stage> {
        let pattern = self.patterns[index].substitute(&partial.substitution);
        // Subjects and predicates are stored as atoms, so a literal bound
        // into either position by an earlier stage matches nothing.
        let storable = is_atom_or_variable(&pattern.subject) && is_atom_or_variable(&pattern.predicate);
        let docs: DocumentCursor = if storable {
            let selector = self.inner.compile_checked(&pattern)?;
            self.inner.triples.find(&selector, None)?
        } else {
            Box::new(std::iter::empty())
        };
        Ok(Stage { docs, pattern, partial })
    }

    /// The error that ended the stream, if any.
    pub fn take_error(&mut self) -> Option<KbError> {
        self.error.take()
    }

    fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.emitted >= limit)
    }
}

impl Iterator for AnswerCursor {
    type Item = Answer;

    fn next(&mut self) -> Option<Answer> {
        if self.limit_reached() {
            return None;
        }
        if self.empty_pending {
            // The empty conjunction has exactly one solution.
            self.empty_pending = false;
            self.emitted += 1;
            return Some(Partial::root().into_answer());
        }

        loop {
            let depth = self.stack.len();
            let top = self.stack.last_mut()?;
            let Some(doc) = top.docs.next() else {
                self.stack.pop();
                continue;
            };
            let triple = match decode_triple(&doc) {
                Ok(triple) => triple,
                Err(err) => {
                    warn!(%err, "skipping undecodable document");
                    continue;
                }
            };
            let Some(partial) = top.partial.extend(&top.pattern, &triple) else {
                continue;
            };

            if depth == self.patterns.len() {
                self.emitted += 1;
                return Some(partial.into_answer());
            }
            match self.open(depth, partial) {
                Ok(stage) => self.stack.push(stage),
                Err(err) => {
                    self.stack.clear();
                    self.error = Some(err);
                    return None;
                }
            }
        }
    }
}
