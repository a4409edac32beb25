use serde::{Deserialize, Serialize};

use crate::triple::TriplePattern;

/// A conjunctive query over the fact store, evaluated left to right.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQuery {
    /// Patterns joined in order.
    pub patterns: Vec<TriplePattern>,
    /// Maximum number of solutions.
    pub limit: Option<usize>,
}

impl GraphQuery {
    /// An unlimited query.
    #[must_use]
    pub fn new(patterns: Vec<TriplePattern>) -> Self {
        Self { patterns, limit: None }
    }

    /// Caps the number of solutions.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl From<Vec<TriplePattern>> for GraphQuery {
    fn from(patterns: Vec<TriplePattern>) -> Self {
        Self::new(patterns)
    }
}

impl From<TriplePattern> for GraphQuery {
    fn from(pattern: TriplePattern) -> Self {
        Self::new(vec![pattern])
    }
}
