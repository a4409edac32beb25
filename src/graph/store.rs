use std::collections::BTreeSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::answer::{AnswerToken, TokenPublisher};
use crate::config::{StoreConfig, TaxonomicKind, TaxonomicVocabulary};
use crate::error::{KbError, KbResult, ValidationError};
use crate::storage::{self, Collection, Document, DocumentClient, Selector};
use crate::term::{Term, Variable};
use crate::triple::{Triple, TriplePattern, SESSION_ORIGINS};

use super::codec::{decode_triple, encode_triple, exact_selector, F_ORIGIN, F_PREDICATE, F_TAXONOMIC, F_VERSION};
use super::compiler::PatternCompiler;
use super::cursor::{AnswerCursor, TripleCursor};
use super::hierarchy::{HierarchyCache, Taxonomy};
use super::query::GraphQuery;
use super::traits::{DataBackend, PersistentBackend, QueryableBackend};
use super::watch::WatchStream;

const SEARCH_INDICES: &[&[&str]] = &[
    &["s"],
    &["p"],
    &["o"],
    &["origin"],
    &["s", "p"],
    &["p", "o"],
    &["s", "p", "o"],
    &["modalKey"],
];

/// State shared by a store, its cursors and its watch streams.
pub(crate) struct StoreInner {
    pub(crate) config: StoreConfig,
    client: Arc<dyn DocumentClient>,
    pub(crate) triples: Arc<dyn Collection>,
    aux: Arc<dyn Collection>,
    taxonomy: RwLock<Taxonomy>,
}

impl StoreInner {
    fn read_taxonomy(&self) -> KbResult<RwLockReadGuard<'_, Taxonomy>> {
        self.taxonomy
            .read()
            .map_err(|_| KbError::internal("poisoned lock: taxonomy"))
    }

    fn write_taxonomy(&self) -> KbResult<RwLockWriteGuard<'_, Taxonomy>> {
        self.taxonomy
            .write()
            .map_err(|_| KbError::internal("poisoned lock: taxonomy"))
    }

    /// Checks `pattern` and compiles it against the current hierarchy.
    pub(crate) fn compile(&self, pattern: &TriplePattern, bound: &BTreeSet<Variable>) -> KbResult<Selector> {
        let taxonomy = self.read_taxonomy()?;
        let compiler = PatternCompiler::new(&self.config.taxonomic, &taxonomy, self.config.allow_unbound_scan);
        compiler.check(pattern, bound)?;
        let selector = compiler.build(pattern);
        debug!(selector = %selector.to_json(), "compiled pattern");
        Ok(selector)
    }

    /// Compiles a pattern that was checked earlier.
    pub(crate) fn compile_checked(&self, pattern: &TriplePattern) -> KbResult<Selector> {
        let taxonomy = self.read_taxonomy()?;
        let compiler = PatternCompiler::new(&self.config.taxonomic, &taxonomy, self.config.allow_unbound_scan);
        Ok(compiler.build(pattern))
    }
}

/// The hierarchy edge a triple contributes, if any.
fn taxonomic_edge<'t>(vocabulary: &TaxonomicVocabulary, triple: &'t Triple) -> Option<(TaxonomicKind, &'t str, &'t str)> {
    match vocabulary.kind_of(triple.predicate_name()) {
        Some(kind @ (TaxonomicKind::Subclass | TaxonomicKind::Subproperty)) => triple
            .object()
            .as_atom()
            .map(|parent| (kind, triple.subject_name(), parent)),
        _ => None,
    }
}

fn cache_mut(taxonomy: &mut Taxonomy, kind: TaxonomicKind) -> &mut HierarchyCache {
    match kind {
        TaxonomicKind::Subproperty => &mut taxonomy.properties,
        TaxonomicKind::Instance | TaxonomicKind::Subclass => &mut taxonomy.classes,
    }
}

/// Fact store over a document database.
///
/// Clones share the connection and the hierarchy cache. Lookups see the
/// state committed when they are issued; there is no isolation beyond
/// single-document atomicity. Taxonomic inserts and removals are
/// serialized with each other so that the stored subsumption triples and
/// the cached closure never diverge.
#[derive(Clone)]
pub struct FactStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for FactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactStore")
            .field("uri", &self.inner.client.uri())
            .field("db_name", &self.inner.config.db_name)
            .field("read_only", &self.inner.config.read_only)
            .finish_non_exhaustive()
    }
}

impl FactStore {
    /// Connects to the database named by `config`.
    ///
    /// Resolves the triple and auxiliary collections, rebuilds the hierarchy
    /// cache from stored taxonomic triples and, unless read-only, creates the
    /// search indices and drops session origins if configured.
    ///
    /// # Errors
    ///
    /// Returns `KbError::Connection` if the database is unreachable. The
    /// store must not be used in that case.
    pub fn connect(config: StoreConfig) -> KbResult<Self> {
        let config = config.validate()?;
        let connection_err = |e: storage::StorageError| KbError::Connection { message: e.to_string() };

        let client = storage::connect(&config.uri).map_err(connection_err)?;
        client.ping().map_err(connection_err)?;
        let db = client.database(&config.db_name).map_err(connection_err)?;
        let triples = db.collection(&config.triples_collection)?;
        let aux = db.collection(&config.aux_collection)?;

        let store = Self {
            inner: Arc::new(StoreInner {
                config,
                client,
                triples,
                aux,
                taxonomy: RwLock::new(Taxonomy::default()),
            }),
        };

        store.rebuild_taxonomy()?;
        if !store.is_read_only() {
            store.create_search_indices()?;
            if store.inner.config.drop_session_origins {
                store.drop_session_origins()?;
            }
        }

        info!(
            uri = %store.db_uri(),
            db = %store.db_name(),
            read_only = store.is_read_only(),
            "fact store connected"
        );
        Ok(store)
    }

    /// Name of the backing database.
    #[must_use]
    pub fn db_name(&self) -> &str {
        &self.inner.config.db_name
    }

    /// URI of the backing database.
    #[must_use]
    pub fn db_uri(&self) -> &str {
        self.inner.client.uri()
    }

    /// True if every mutation is rejected.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.inner.config.read_only
    }

    /// Predicate names treated as taxonomic.
    #[must_use]
    pub fn vocabulary(&self) -> &TaxonomicVocabulary {
        &self.inner.config.taxonomic
    }

    fn ensure_writable(&self, operation: &'static str) -> KbResult<()> {
        if self.inner.config.read_only {
            debug!(operation, "rejected mutation on read-only store");
            return Err(KbError::ReadOnlyViolation { operation });
        }
        Ok(())
    }

    /// Recomputes both hierarchies from stored taxonomic triples.
    fn rebuild_taxonomy(&self) -> KbResult<()> {
        let vocab = self.vocabulary();
        let predicates: Vec<Value> = vocab
            .names(TaxonomicKind::Subclass)
            .iter()
            .chain(vocab.names(TaxonomicKind::Subproperty))
            .map(|n| Value::from(n.as_str()))
            .collect();
        let selector = Selector::and(vec![
            Selector::eq(F_TAXONOMIC, true),
            Selector::one_of(F_PREDICATE, predicates),
        ]);

        let mut rebuilt = Taxonomy::default();
        for doc in self.inner.triples.find(&selector, None)? {
            let Ok(triple) = decode_triple(&doc) else {
                continue;
            };
            if let Some((kind, child, parent)) = taxonomic_edge(vocab, &triple) {
                if let Err(err) = cache_mut(&mut rebuilt, kind).add_edge(child, parent) {
                    warn!(%err, "skipping stored edge");
                }
            }
        }
        debug!(
            classes = rebuilt.classes.edge_count(),
            properties = rebuilt.properties.edge_count(),
            "rebuilt hierarchy cache"
        );
        *self.inner.write_taxonomy()? = rebuilt;
        Ok(())
    }

    /// Deletes the triples of the session origins.
    ///
    /// # Errors
    ///
    /// Fails on read-only stores and storage errors.
    pub fn drop_session_origins(&self) -> KbResult<usize> {
        self.ensure_writable("drop_session_origins")?;
        let origins = SESSION_ORIGINS.iter().map(|o| Value::from(*o)).collect();
        let removed = self.remove_where(&Selector::one_of(F_ORIGIN, origins))?;
        if removed > 0 {
            info!(removed, "dropped session origins");
        }
        Ok(removed)
    }

    /// Creates the search indices of the triple collection.
    ///
    /// # Errors
    ///
    /// Fails on read-only stores and storage errors.
    pub fn create_search_indices(&self) -> KbResult<()> {
        self.ensure_writable("create_search_indices")?;
        for keys in SEARCH_INDICES {
            self.inner.triples.create_index(keys)?;
        }
        info!(count = SEARCH_INDICES.len(), "search indices created");
        Ok(())
    }

    /// Deletes all triples and version records, drops the indices and
    /// clears the hierarchy cache.
    ///
    /// Indices are not recreated; call [`FactStore::create_search_indices`]
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Fails on read-only stores and storage errors.
    pub fn drop_all(&self) -> KbResult<()> {
        self.ensure_writable("drop")?;
        let mut taxonomy = self.inner.write_taxonomy()?;
        self.inner.triples.drop_collection()?;
        self.inner.aux.drop_collection()?;
        taxonomy.clear();
        info!(db = %self.db_name(), "fact store dropped, search indices must be recreated");
        Ok(())
    }

    /// Streams the stored copies of exactly `triple`.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn lookup_triple(&self, triple: &Triple) -> KbResult<TripleCursor> {
        let selector = exact_selector(triple)?;
        let docs = self.inner.triples.find(&selector, None)?;
        Ok(TripleCursor::new(docs, TriplePattern::exact(triple)))
    }

    /// Whether at least one copy of `triple` is stored.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn contains(&self, triple: &Triple) -> KbResult<bool> {
        Ok(self.inner.triples.count(&exact_selector(triple)?)? > 0)
    }

    /// Number of stored triples matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns pattern and storage errors.
    pub fn count(&self, pattern: &TriplePattern) -> KbResult<usize> {
        let selector = self.inner.compile(pattern, &BTreeSet::new())?;
        Ok(self.inner.triples.count(&selector)?)
    }

    /// Classes subsumed by `class`, excluding itself.
    ///
    /// # Errors
    ///
    /// Fails if the cache lock is poisoned.
    pub fn class_descendants(&self, class: &str) -> KbResult<BTreeSet<String>> {
        Ok(self.inner.read_taxonomy()?.classes.descendants_of(class))
    }

    /// Properties subsumed by `property`, excluding itself.
    ///
    /// # Errors
    ///
    /// Fails if the cache lock is poisoned.
    pub fn property_descendants(&self, property: &str) -> KbResult<BTreeSet<String>> {
        Ok(self.inner.read_taxonomy()?.properties.descendants_of(property))
    }

    /// Reflexive class subsumption.
    ///
    /// # Errors
    ///
    /// Fails if the cache lock is poisoned.
    pub fn is_subclass_of(&self, child: &str, parent: &str) -> KbResult<bool> {
        Ok(self.inner.read_taxonomy()?.classes.is_subsumed_by(child, parent))
    }

    /// Reflexive property subsumption.
    ///
    /// # Errors
    ///
    /// Fails if the cache lock is poisoned.
    pub fn is_subproperty_of(&self, child: &str, parent: &str) -> KbResult<bool> {
        Ok(self.inner.read_taxonomy()?.properties.is_subsumed_by(child, parent))
    }

    /// Names of the non-taxonomic predicates in use.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn properties(&self) -> KbResult<Vec<String>> {
        let values = self
            .inner
            .triples
            .distinct(F_PREDICATE, &Selector::eq(F_TAXONOMIC, false))?;
        Ok(values
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    /// Whether some stored triple uses `name` as a non-taxonomic predicate.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn has_property(&self, name: &str) -> KbResult<bool> {
        let selector = Selector::and(vec![Selector::eq(F_PREDICATE, name), Selector::eq(F_TAXONOMIC, false)]);
        Ok(self.inner.triples.count(&selector)? > 0)
    }

    /// Deletes the documents matching `selector`, retracting the hierarchy
    /// edges of the deleted taxonomic triples.
    fn remove_where(&self, selector: &Selector) -> KbResult<usize> {
        let vocab = self.vocabulary();
        let mut taxonomy = self.inner.write_taxonomy()?;

        let taxonomic = Selector::and(vec![selector.clone(), Selector::eq(F_TAXONOMIC, true)]);
        let edges: Vec<Triple> = self
            .inner
            .triples
            .find(&taxonomic, None)?
            .filter_map(|doc| decode_triple(&doc).ok())
            .collect();

        let removed = self.inner.triples.delete_many(selector)?;
        for triple in &edges {
            if let Some((kind, child, parent)) = taxonomic_edge(vocab, triple) {
                cache_mut(&mut taxonomy, kind).remove_edge(child, parent);
            }
        }
        debug!(removed, edges = edges.len(), "removed matching triples");
        Ok(removed)
    }

    fn check_edge_object(&self, triple: &Triple) -> KbResult<()> {
        let subsumption = matches!(
            self.vocabulary().kind_of(triple.predicate_name()),
            Some(TaxonomicKind::Subclass | TaxonomicKind::Subproperty)
        );
        if subsumption && !matches!(triple.object(), Term::Atom(_)) {
            return Err(ValidationError::NonAtomicTerm {
                field: "object",
                term: triple.object().to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn encode(&self, triple: &Triple) -> KbResult<Document> {
        self.check_edge_object(triple)?;
        let taxonomic = self.vocabulary().kind_of(triple.predicate_name()).is_some();
        Ok(encode_triple(triple, taxonomic)?)
    }
}

impl DataBackend for FactStore {
    fn insert_one(&self, triple: &Triple) -> KbResult<()> {
        self.ensure_writable("insert_one")?;
        let doc = self.encode(triple)?;

        let Some((kind, child, parent)) = taxonomic_edge(self.vocabulary(), triple) else {
            self.inner.triples.insert_one(doc)?;
            return Ok(());
        };

        let mut taxonomy = self.inner.write_taxonomy()?;
        let cache = cache_mut(&mut taxonomy, kind);
        if cache.would_create_cycle(child, parent) {
            warn!(child, parent, "rejected taxonomic edge that would close a cycle");
            return Err(KbError::HierarchyCycle {
                child: child.to_string(),
                parent: parent.to_string(),
            });
        }
        self.inner.triples.insert_one(doc)?;
        cache.add_edge(child, parent)?;
        Ok(())
    }

    fn insert_all(&self, triples: &[Triple]) -> KbResult<()> {
        self.ensure_writable("insert_all")?;
        if triples.is_empty() {
            return Ok(());
        }
        let docs = triples
            .iter()
            .map(|t| self.encode(t))
            .collect::<KbResult<Vec<_>>>()?;
        let edges: Vec<_> = triples
            .iter()
            .filter_map(|t| taxonomic_edge(self.vocabulary(), t))
            .collect();

        if edges.is_empty() {
            self.inner.triples.insert_many(docs)?;
            return Ok(());
        }

        // Apply the edges to a copy first so that a cycle anywhere in the
        // batch leaves both the collection and the cache untouched.
        let mut taxonomy = self.inner.write_taxonomy()?;
        let mut staged = taxonomy.clone();
        for (kind, child, parent) in &edges {
            if let Err(err) = cache_mut(&mut staged, *kind).add_edge(child, parent) {
                warn!(child, parent, "rejected batch with a cyclic taxonomic edge");
                return Err(err);
            }
        }
        self.inner.triples.insert_many(docs)?;
        *taxonomy = staged;
        Ok(())
    }

    fn remove_one(&self, triple: &Triple) -> KbResult<usize> {
        self.ensure_writable("remove_one")?;
        let selector = exact_selector(triple)?;

        let Some((kind, child, parent)) = taxonomic_edge(self.vocabulary(), triple) else {
            return Ok(self.inner.triples.delete_one(&selector)?);
        };

        let mut taxonomy = self.inner.write_taxonomy()?;
        let removed = self.inner.triples.delete_one(&selector)?;
        if removed > 0 {
            cache_mut(&mut taxonomy, kind).remove_edge(child, parent);
        }
        Ok(removed)
    }

    fn remove_all(&self, triples: &[Triple]) -> KbResult<usize> {
        self.ensure_writable("remove_all")?;
        let mut removed = 0;
        for triple in triples {
            removed += self.remove_one(triple)?;
        }
        Ok(removed)
    }

    fn remove_all_with_origin(&self, origin: &str) -> KbResult<usize> {
        self.ensure_writable("remove_all_with_origin")?;
        self.remove_where(&Selector::eq(F_ORIGIN, origin))
    }

    fn remove_all_matching(&self, pattern: &TriplePattern) -> KbResult<usize> {
        self.ensure_writable("remove_all_matching")?;
        let selector = self.inner.compile(pattern, &BTreeSet::new())?;
        self.remove_where(&selector)
    }
}

impl QueryableBackend for FactStore {
    fn lookup(&self, pattern: &TriplePattern) -> KbResult<TripleCursor> {
        let selector = self.inner.compile(pattern, &BTreeSet::new())?;
        let docs = self.inner.triples.find(&selector, None)?;
        Ok(TripleCursor::new(docs, pattern.clone()))
    }

    fn lookup_all(&self, patterns: &[TriplePattern], limit: Option<usize>) -> KbResult<AnswerCursor> {
        AnswerCursor::start(Arc::clone(&self.inner), patterns.to_vec(), limit)
    }

    fn watch_query(&self, pattern: &TriplePattern) -> KbResult<WatchStream> {
        WatchStream::subscribe(Arc::clone(&self.inner), pattern.clone())
    }

    fn evaluate_query(&self, query: &GraphQuery, publisher: &dyn TokenPublisher) -> KbResult<()> {
        let mut cursor = self.lookup_all(&query.patterns, query.limit)?;
        let mut published = 0usize;
        for answer in cursor.by_ref() {
            if !publisher.publish(AnswerToken::Answer(answer)) {
                debug!(published, "answer consumer detached");
                return Ok(());
            }
            published += 1;
        }
        publisher.publish(AnswerToken::Eos);
        debug!(published, "query evaluated");
        match cursor.take_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl PersistentBackend for FactStore {
    fn get_version_of_origin(&self, origin: &str) -> KbResult<Option<String>> {
        let doc = self.inner.aux.find_one(&Selector::eq(F_ORIGIN, origin))?;
        Ok(doc.and_then(|d| d.get(F_VERSION).and_then(Value::as_str).map(str::to_string)))
    }

    fn set_version_of_origin(&self, origin: &str, version: &str) -> KbResult<()> {
        self.ensure_writable("set_version_of_origin")?;
        let mut doc = Document::new();
        doc.insert(F_ORIGIN.to_string(), Value::from(origin));
        doc.insert(F_VERSION.to_string(), Value::from(version));
        self.inner.aux.upsert_one(&Selector::eq(F_ORIGIN, origin), doc)?;
        debug!(origin, version, "origin version recorded");
        Ok(())
    }
}
