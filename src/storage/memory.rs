//! In-memory document database.
//!
//! Thread-safe implementation of the storage traits, intended for embedded
//! usage, tests, and as a reference implementation. Servers are addressed as
//! `memory://<host>`; all clients of the same host share its databases.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use crossbeam_channel::{unbounded, Sender};
use serde_json::Value;

use super::selector::{values_equal, Document, Selector};
use super::traits::{
    ChangeEvent, ChangeStream, Collection, Database, DocId, DocumentClient, DocumentCursor, IndexSpec,
    StorageError,
};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Default)]
struct HostState {
    online: Arc<AtomicBool>,
    databases: HashMap<String, Arc<MemoryDatabase>>,
}

static SERVERS: OnceLock<Mutex<HashMap<String, HostState>>> = OnceLock::new();

fn servers() -> &'static Mutex<HashMap<String, HostState>> {
    SERVERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Process-wide registry of in-memory servers.
pub struct MemoryServer;

impl MemoryServer {
    /// Starts (or restarts) the server for `host`. Existing data is kept.
    pub fn start(host: &str) -> Result<(), StorageError> {
        let mut guard = servers().lock().map_err(|_| lock_err("servers.start"))?;
        let state = guard.entry(host.to_string()).or_insert_with(|| HostState {
            online: Arc::new(AtomicBool::new(true)),
            databases: HashMap::new(),
        });
        state.online.store(true, Ordering::Release);
        Ok(())
    }

    /// Takes the server for `host` offline. Connects fail and open handles
    /// report `Disconnected` until the server is started again.
    pub fn shutdown(host: &str) -> Result<(), StorageError> {
        let mut guard = servers().lock().map_err(|_| lock_err("servers.shutdown"))?;
        let state = guard.entry(host.to_string()).or_default();
        state.online.store(false, Ordering::Release);
        Ok(())
    }

    fn database(host: &str, name: &str) -> Result<Arc<MemoryDatabase>, StorageError> {
        let mut guard = servers().lock().map_err(|_| lock_err("servers.database"))?;
        let state = guard
            .get_mut(host)
            .ok_or_else(|| StorageError::ConnectionError(format!("memory://{host} is not running")))?;
        if !state.online.load(Ordering::Acquire) {
            return Err(StorageError::Disconnected(format!("memory://{host}")));
        }
        let online = Arc::clone(&state.online);
        let db = state
            .databases
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryDatabase::new(name, online)));
        Ok(Arc::clone(db))
    }

    fn is_online(host: &str) -> Result<bool, StorageError> {
        let guard = servers().lock().map_err(|_| lock_err("servers.is_online"))?;
        Ok(guard
            .get(host)
            .is_some_and(|s| s.online.load(Ordering::Acquire)))
    }
}

/// Client for an in-memory server.
#[derive(Debug)]
pub struct MemoryClient {
    uri: String,
    host: String,
}

impl MemoryClient {
    /// Connects to `memory://<host>`.
    ///
    /// Hosts that were never seen are started on first connect. A host that
    /// was shut down is unreachable.
    pub fn connect(host: &str) -> Result<Self, StorageError> {
        let known = {
            let guard = servers().lock().map_err(|_| lock_err("client.connect"))?;
            guard.contains_key(host)
        };
        if !known {
            MemoryServer::start(host)?;
        }
        if !MemoryServer::is_online(host)? {
            return Err(StorageError::ConnectionError(format!(
                "memory://{host} is unreachable"
            )));
        }
        Ok(Self {
            uri: format!("memory://{host}"),
            host: host.to_string(),
        })
    }
}

impl DocumentClient for MemoryClient {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn ping(&self) -> Result<(), StorageError> {
        if MemoryServer::is_online(&self.host)? {
            Ok(())
        } else {
            Err(StorageError::ConnectionError(format!("{} is unreachable", self.uri)))
        }
    }

    fn database(&self, name: &str) -> Result<Arc<dyn Database>, StorageError> {
        let db: Arc<dyn Database> = MemoryServer::database(&self.host, name)?;
        Ok(db)
    }
}

/// An in-memory database.
pub struct MemoryDatabase {
    name: String,
    online: Arc<AtomicBool>,
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryDatabase {
    fn new(name: &str, online: Arc<AtomicBool>) -> Self {
        Self {
            name: name.to_string(),
            online,
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Result<Arc<dyn Collection>, StorageError> {
        if name.trim().is_empty() {
            return Err(StorageError::CollectionNotFound("<empty>".to_string()));
        }
        {
            let guard = self.collections.read().map_err(|_| lock_err("db.collection"))?;
            if let Some(c) = guard.get(name) {
                let c: Arc<dyn Collection> = Arc::clone(c) as Arc<dyn Collection>;
                return Ok(c);
            }
        }
        let mut guard = self.collections.write().map_err(|_| lock_err("db.collection"))?;
        let coll = guard
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::new(name, Arc::clone(&self.online))));
        let coll: Arc<dyn Collection> = Arc::clone(coll) as Arc<dyn Collection>;
        Ok(coll)
    }

    fn collection_names(&self) -> Result<Vec<String>, StorageError> {
        let guard = self.collections.read().map_err(|_| lock_err("db.collection_names"))?;
        let mut names: Vec<String> = guard.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

type Snapshot = Arc<BTreeMap<DocId, Arc<Document>>>;

#[derive(Default)]
struct CollectionState {
    docs: Snapshot,
    next_id: DocId,
    indexes: Vec<IndexSpec>,
    watchers: Vec<Sender<ChangeEvent>>,
}

impl CollectionState {
    fn notify(&mut self, event: &ChangeEvent) {
        // Watchers whose receiver was dropped are detached here.
        self.watchers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn matching_ids(&self, selector: &Selector, limit: Option<usize>) -> Vec<DocId> {
        self.docs
            .iter()
            .filter(|(_, doc)| selector.matches(doc))
            .map(|(id, _)| *id)
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    fn remove(&mut self, ids: &[DocId]) -> usize {
        let docs = Arc::make_mut(&mut self.docs);
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = docs.remove(id) {
                removed.push(doc);
            }
        }
        for doc in &removed {
            self.notify(&ChangeEvent::Deleted(Document::clone(doc)));
        }
        removed.len()
    }
}

/// Thread-safe in-memory collection with copy-on-write snapshots.
pub struct MemoryCollection {
    name: String,
    online: Arc<AtomicBool>,
    state: RwLock<CollectionState>,
}

impl MemoryCollection {
    fn new(name: &str, online: Arc<AtomicBool>) -> Self {
        Self {
            name: name.to_string(),
            online,
            state: RwLock::new(CollectionState::default()),
        }
    }

    fn ensure_online(&self) -> Result<(), StorageError> {
        if self.online.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::Disconnected(format!("collection {}", self.name)))
        }
    }

    fn insert_locked(state: &mut CollectionState, mut doc: Document) -> DocId {
        state.next_id += 1;
        let id = state.next_id;
        doc.insert("_id".to_string(), Value::from(id));
        Arc::make_mut(&mut state.docs).insert(id, Arc::new(doc.clone()));
        state.notify(&ChangeEvent::Inserted(doc));
        id
    }
}

impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert_one(&self, doc: Document) -> Result<DocId, StorageError> {
        self.ensure_online()?;
        let mut state = self.state.write().map_err(|_| lock_err("collection.insert_one"))?;
        Ok(Self::insert_locked(&mut state, doc))
    }

    fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<DocId>, StorageError> {
        self.ensure_online()?;
        let mut state = self.state.write().map_err(|_| lock_err("collection.insert_many"))?;
        Ok(docs
            .into_iter()
            .map(|doc| Self::insert_locked(&mut state, doc))
            .collect())
    }

    fn delete_one(&self, selector: &Selector) -> Result<usize, StorageError> {
        self.ensure_online()?;
        let mut state = self.state.write().map_err(|_| lock_err("collection.delete_one"))?;
        let ids = state.matching_ids(selector, Some(1));
        Ok(state.remove(&ids))
    }

    fn delete_many(&self, selector: &Selector) -> Result<usize, StorageError> {
        self.ensure_online()?;
        let mut state = self.state.write().map_err(|_| lock_err("collection.delete_many"))?;
        let ids = state.matching_ids(selector, None);
        Ok(state.remove(&ids))
    }

    fn find(&self, selector: &Selector, limit: Option<usize>) -> Result<DocumentCursor, StorageError> {
        self.ensure_online()?;
        let snapshot = {
            let state = self.state.read().map_err(|_| lock_err("collection.find"))?;
            Arc::clone(&state.docs)
        };
        Ok(Box::new(SnapshotCursor {
            snapshot,
            selector: selector.clone(),
            last: None,
            remaining: limit.unwrap_or(usize::MAX),
        }))
    }

    fn count(&self, selector: &Selector) -> Result<usize, StorageError> {
        self.ensure_online()?;
        let state = self.state.read().map_err(|_| lock_err("collection.count"))?;
        Ok(state.docs.values().filter(|d| selector.matches(d)).count())
    }

    fn distinct(&self, field: &str, selector: &Selector) -> Result<Vec<Value>, StorageError> {
        self.ensure_online()?;
        let state = self.state.read().map_err(|_| lock_err("collection.distinct"))?;
        let mut out: Vec<Value> = Vec::new();
        for doc in state.docs.values().filter(|d| selector.matches(d)) {
            if let Some(v) = super::selector::lookup_path(doc, field) {
                if !out.iter().any(|seen| values_equal(seen, v)) {
                    out.push(v.clone());
                }
            }
        }
        Ok(out)
    }

    fn upsert_one(&self, selector: &Selector, mut doc: Document) -> Result<(), StorageError> {
        self.ensure_online()?;
        let mut state = self.state.write().map_err(|_| lock_err("collection.upsert_one"))?;
        match state.matching_ids(selector, Some(1)).first().copied() {
            Some(id) => {
                doc.insert("_id".to_string(), Value::from(id));
                let docs = Arc::make_mut(&mut state.docs);
                if let Some(old) = docs.insert(id, Arc::new(doc.clone())) {
                    state.notify(&ChangeEvent::Deleted(Document::clone(&old)));
                }
                state.notify(&ChangeEvent::Inserted(doc));
            }
            None => {
                Self::insert_locked(&mut state, doc);
            }
        }
        Ok(())
    }

    fn create_index(&self, keys: &[&str]) -> Result<(), StorageError> {
        self.ensure_online()?;
        if keys.is_empty() {
            return Err(StorageError::BackendError("index needs at least one key".to_string()));
        }
        let spec = IndexSpec {
            keys: keys.iter().map(|k| (*k).to_string()).collect(),
        };
        let mut state = self.state.write().map_err(|_| lock_err("collection.create_index"))?;
        if !state.indexes.contains(&spec) {
            state.indexes.push(spec);
        }
        Ok(())
    }

    fn indexes(&self) -> Result<Vec<IndexSpec>, StorageError> {
        self.ensure_online()?;
        let state = self.state.read().map_err(|_| lock_err("collection.indexes"))?;
        Ok(state.indexes.clone())
    }

    fn drop_collection(&self) -> Result<(), StorageError> {
        self.ensure_online()?;
        let mut state = self.state.write().map_err(|_| lock_err("collection.drop"))?;
        state.docs = Arc::new(BTreeMap::new());
        state.indexes.clear();
        state.notify(&ChangeEvent::Dropped);
        Ok(())
    }

    fn watch(&self) -> Result<ChangeStream, StorageError> {
        self.ensure_online()?;
        let (tx, rx) = unbounded();
        let mut state = self.state.write().map_err(|_| lock_err("collection.watch"))?;
        state.watchers.push(tx);
        Ok(rx)
    }
}

/// Lazily filters a frozen snapshot of a collection.
struct SnapshotCursor {
    snapshot: Snapshot,
    selector: Selector,
    last: Option<DocId>,
    remaining: usize,
}

impl Iterator for SnapshotCursor {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        if self.remaining == 0 {
            return None;
        }
        let lower = self.last.map_or(Bound::Unbounded, Bound::Excluded);
        let mut found = None;
        for (id, doc) in self.snapshot.range((lower, Bound::Unbounded)) {
            self.last = Some(*id);
            if self.selector.matches(doc) {
                found = Some(Document::clone(doc));
                break;
            }
        }
        if found.is_some() {
            self.remaining -= 1;
        } else {
            self.remaining = 0;
        }
        found
    }
}
