//! Abstract document-database traits.
//!
//! These traits define the contract the fact store needs from its document
//! database. The wire protocol of a concrete database lives behind them; the
//! crate ships an in-memory implementation for embedded use and tests.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use serde_json::Value;
use thiserror::Error;

use super::selector::{Document, Selector};

/// Identifier assigned to a stored document (`_id`).
pub type DocId = u64;

/// Lazy sequence of documents. Reflects the committed state at the time of the call.
pub type DocumentCursor = Box<dyn Iterator<Item = Document> + Send>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The server went away after the connection was established.
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// Collection could not be resolved.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// A change observed on a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A document was inserted.
    Inserted(Document),
    /// A document was deleted.
    Deleted(Document),
    /// The collection was dropped.
    Dropped,
}

/// Unbounded feed of change events. Dropping the receiver detaches it.
pub type ChangeStream = Receiver<ChangeEvent>;

/// Description of a search index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Indexed field paths, in order.
    pub keys: Vec<String>,
}

/// Client connection to a document database server.
pub trait DocumentClient: Send + Sync {
    /// URI the client connected to.
    fn uri(&self) -> &str;

    /// Verifies the server is reachable.
    fn ping(&self) -> Result<(), StorageError>;

    /// Resolves a database by name, creating it on first use.
    fn database(&self, name: &str) -> Result<Arc<dyn Database>, StorageError>;
}

/// A named database holding collections.
pub trait Database: Send + Sync {
    /// Name of the database.
    fn name(&self) -> &str;

    /// Resolves a collection by name, creating it on first use.
    fn collection(&self, name: &str) -> Result<Arc<dyn Collection>, StorageError>;

    /// Names of existing collections.
    fn collection_names(&self) -> Result<Vec<String>, StorageError>;
}

/// A collection of JSON documents.
///
/// # Consistency
/// - Every single-document write is atomic.
/// - Multi-document writes (`insert_many`, `delete_many`) are not transactional.
/// - Reads observe the committed state at the time of the call.
pub trait Collection: Send + Sync {
    /// Name of the collection.
    fn name(&self) -> &str;

    /// Insert a document, returning its assigned id.
    fn insert_one(&self, doc: Document) -> Result<DocId, StorageError>;

    /// Insert several documents in order.
    fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<DocId>, StorageError>;

    /// Delete the first matching document. Returns the number deleted (0 or 1).
    fn delete_one(&self, selector: &Selector) -> Result<usize, StorageError>;

    /// Delete every matching document.
    fn delete_many(&self, selector: &Selector) -> Result<usize, StorageError>;

    /// Find matching documents in insertion order.
    fn find(&self, selector: &Selector, limit: Option<usize>) -> Result<DocumentCursor, StorageError>;

    /// The first matching document.
    fn find_one(&self, selector: &Selector) -> Result<Option<Document>, StorageError> {
        Ok(self.find(selector, Some(1))?.next())
    }

    /// Number of matching documents.
    fn count(&self, selector: &Selector) -> Result<usize, StorageError>;

    /// Distinct values of `field` over the matching documents.
    fn distinct(&self, field: &str, selector: &Selector) -> Result<Vec<Value>, StorageError>;

    /// Replace the first matching document, or insert `doc` if none matches.
    /// Atomic with respect to other writers of the collection.
    fn upsert_one(&self, selector: &Selector, doc: Document) -> Result<(), StorageError>;

    /// Creates an index over `keys` unless it exists.
    fn create_index(&self, keys: &[&str]) -> Result<(), StorageError>;

    /// Indexes of the collection.
    fn indexes(&self) -> Result<Vec<IndexSpec>, StorageError>;

    /// Delete all documents and indexes.
    fn drop_collection(&self) -> Result<(), StorageError>;

    /// Subscribe to changes committed after this call.
    fn watch(&self) -> Result<ChangeStream, StorageError>;
}
