//! Document-database collaborator for the fact store.
//!
//! The store depends only on the traits in this module. A concrete database
//! is selected by URI scheme through [`connect`]; the crate ships the
//! `memory://` backend.

mod memory;
mod selector;
mod traits;

use std::sync::Arc;

pub use memory::{MemoryClient, MemoryServer};
pub use selector::{lookup_path, values_equal, Condition, Document, Selector};
pub use traits::{
    ChangeEvent, ChangeStream, Collection, Database, DocId, DocumentClient, DocumentCursor, IndexSpec,
    StorageError,
};

/// Opens a client for `uri`.
///
/// # Errors
///
/// Returns `StorageError::ConnectionError` for unsupported schemes and
/// unreachable servers.
pub fn connect(uri: &str) -> Result<Arc<dyn DocumentClient>, StorageError> {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return Err(StorageError::ConnectionError(format!("malformed URI '{uri}'")));
    };
    match scheme {
        "memory" => {
            let host = rest.trim_end_matches('/');
            if host.is_empty() {
                return Err(StorageError::ConnectionError(format!("missing host in '{uri}'")));
            }
            let client: Arc<dyn DocumentClient> = Arc::new(MemoryClient::connect(host)?);
            Ok(client)
        }
        other => Err(StorageError::ConnectionError(format!(
            "unsupported scheme '{other}' in '{uri}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_memory_uri() {
        let host = uuid::Uuid::new_v4();
        let client = connect(&format!("memory://{host}")).unwrap();
        assert_eq!(client.uri(), format!("memory://{host}"));
        client.ping().unwrap();
    }

    #[test]
    fn connect_rejects_unknown_scheme() {
        let err = connect("mongodb://localhost:27017").err().unwrap();
        assert!(matches!(err, StorageError::ConnectionError(_)));
        assert!(connect("localhost").is_err());
        assert!(connect("memory://").is_err());
    }
}
