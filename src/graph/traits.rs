//! Narrow capability interfaces of the fact store.
//!
//! Callers depend on the smallest interface they need. [`FactStore`]
//! implements all three.
//!
//! [`FactStore`]: super::FactStore

use crate::answer::TokenPublisher;
use crate::error::KbResult;
use crate::triple::{Triple, TriplePattern};

use super::cursor::{AnswerCursor, TripleCursor};
use super::query::GraphQuery;
use super::watch::WatchStream;

/// Mutation of stored triples.
pub trait DataBackend: Send + Sync {
    /// Persists one triple.
    ///
    /// # Errors
    ///
    /// Fails on read-only stores, storage errors, and taxonomic edges that
    /// would close a cycle.
    fn insert_one(&self, triple: &Triple) -> KbResult<()>;

    /// Persists several triples. A batch is rejected as a whole if any of
    /// its taxonomic edges would close a cycle.
    ///
    /// # Errors
    ///
    /// As for [`DataBackend::insert_one`].
    fn insert_all(&self, triples: &[Triple]) -> KbResult<()>;

    /// Deletes one stored copy of `triple`. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Fails on read-only stores and storage errors.
    fn remove_one(&self, triple: &Triple) -> KbResult<usize>;

    /// Deletes one stored copy of each triple.
    ///
    /// # Errors
    ///
    /// As for [`DataBackend::remove_one`].
    fn remove_all(&self, triples: &[Triple]) -> KbResult<usize>;

    /// Deletes every triple of an origin.
    ///
    /// # Errors
    ///
    /// As for [`DataBackend::remove_one`].
    fn remove_all_with_origin(&self, origin: &str) -> KbResult<usize>;

    /// Deletes every triple matching `pattern`.
    ///
    /// # Errors
    ///
    /// As for [`DataBackend::remove_one`], plus pattern errors.
    fn remove_all_matching(&self, pattern: &TriplePattern) -> KbResult<usize>;
}

/// Pattern queries.
pub trait QueryableBackend: Send + Sync {
    /// Lazily streams the triples matching one pattern.
    ///
    /// # Errors
    ///
    /// Returns pattern errors before any scan is issued.
    fn lookup(&self, pattern: &TriplePattern) -> KbResult<TripleCursor>;

    /// Streams the solutions of an ordered conjunction of patterns.
    ///
    /// # Errors
    ///
    /// Returns pattern errors before any scan is issued.
    fn lookup_all(&self, patterns: &[TriplePattern], limit: Option<usize>) -> KbResult<AnswerCursor>;

    /// Streams triples matching `pattern` that are inserted from now on.
    ///
    /// # Errors
    ///
    /// Returns pattern and storage errors.
    fn watch_query(&self, pattern: &TriplePattern) -> KbResult<WatchStream>;

    /// Publishes every solution of `query` followed by one end-of-stream token.
    ///
    /// # Errors
    ///
    /// Returns pattern and storage errors. No end-of-stream is published for
    /// a query rejected before it started.
    fn evaluate_query(&self, query: &GraphQuery, publisher: &dyn TokenPublisher) -> KbResult<()>;
}

/// Per-origin version records.
pub trait PersistentBackend: Send + Sync {
    /// Version recorded for `origin`, if any.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    fn get_version_of_origin(&self, origin: &str) -> KbResult<Option<String>>;

    /// Records `version` for `origin`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Fails on read-only stores and storage errors.
    fn set_version_of_origin(&self, origin: &str, version: &str) -> KbResult<()>;
}
