use std::collections::BTreeSet;

use crate::error::{KbError, KbResult};
use crate::reasoner::{ReasonerId, ReasonerRegistry};

use super::goal::{Goal, Literal};

/// A run of consecutive literals that a common set of reasoners can answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Position of the segment within the goal.
    pub index: usize,
    /// Literals of the segment, in goal order.
    pub literals: Vec<Literal>,
    /// Every reasoner able to answer all of `literals`. Each one runs.
    pub reasoners: BTreeSet<ReasonerId>,
}

/// Splits `goal` left to right into maximal segments whose literals share
/// at least one reasoner.
///
/// # Errors
///
/// Returns `KbError::UnsupportedPredicate` for a literal no registered
/// reasoner can answer.
pub fn decompose(goal: &Goal, registry: &ReasonerRegistry) -> KbResult<Vec<Segment>> {
    let mut segments: Vec<Segment> = Vec::new();

    for literal in &goal.literals {
        let indicator = literal.indicator();
        let capable: BTreeSet<ReasonerId> = registry.reasoners_for(&indicator)?.into_iter().collect();
        if capable.is_empty() {
            return Err(KbError::UnsupportedPredicate {
                indicator: indicator.to_string(),
            });
        }

        if let Some(current) = segments.last_mut() {
            let common: BTreeSet<ReasonerId> = current.reasoners.intersection(&capable).cloned().collect();
            if !common.is_empty() {
                current.literals.push(literal.clone());
                current.reasoners = common;
                continue;
            }
        }
        segments.push(Segment {
            index: segments.len(),
            literals: vec![literal.clone()],
            reasoners: capable,
        });
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qa::{AnswerSink, CancellationToken};
    use crate::term::{PredicateIndicator, Term};
    use std::sync::Arc;

    struct Knows(&'static [&'static str]);

    impl crate::reasoner::Reasoner for Knows {
        fn can_reason_about(&self, indicator: &PredicateIndicator) -> bool {
            self.0.contains(&indicator.functor.as_str())
        }

        fn run(&self, _: &Goal, _: &CancellationToken, _: &AnswerSink) -> KbResult<()> {
            Ok(())
        }
    }

    fn registry() -> ReasonerRegistry {
        let registry = ReasonerRegistry::new();
        registry.register("a", Arc::new(Knows(&["p", "q"]))).unwrap();
        registry.register("b", Arc::new(Knows(&["q", "r"]))).unwrap();
        registry
    }

    fn lit(functor: &str) -> Literal {
        Literal::call(functor, vec![Term::var("x")])
    }

    #[test]
    fn greedy_maximal_segments() {
        let goal = Goal::new(vec![lit("p"), lit("q"), lit("r"), lit("q")]);
        let segments = decompose(&goal, &registry()).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].literals.len(), 2);
        assert_eq!(segments[0].reasoners, BTreeSet::from([ReasonerId::new("a")]));
        assert_eq!(segments[1].index, 1);
        assert_eq!(segments[1].literals.len(), 2);
        assert_eq!(segments[1].reasoners, BTreeSet::from([ReasonerId::new("b")]));
    }

    #[test]
    fn shared_literal_forms_ensemble() {
        let goal = Goal::new(vec![lit("q")]);
        let segments = decompose(&goal, &registry()).unwrap();
        assert_eq!(segments[0].reasoners.len(), 2);
    }

    #[test]
    fn unknown_predicate_fails_fast() {
        let goal = Goal::new(vec![lit("p"), lit("zzz")]);
        let err = decompose(&goal, &registry()).unwrap_err();
        assert!(matches!(err, KbError::UnsupportedPredicate { ref indicator } if indicator == "zzz/1"));
    }

    #[test]
    fn empty_goal_has_no_segments() {
        assert!(decompose(&Goal::default(), &registry()).unwrap().is_empty());
    }
}
