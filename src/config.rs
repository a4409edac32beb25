//! Configuration for the fact store and the blackboard.
//!
//! All structs deserialize from JSON with every field optional; missing
//! fields take their `Default` values. Call `validate` before use.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KbError, KbResult, ValidationError};

fn invalid(reason: impl Into<String>) -> KbError {
    KbError::Validation(ValidationError::InvalidConfig {
        reason: reason.into(),
    })
}

/// Which taxonomic relation a predicate denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaxonomicKind {
    /// Class membership (`type`).
    Instance,
    /// Class subsumption (`subClassOf`).
    Subclass,
    /// Property subsumption (`subPropertyOf`).
    Subproperty,
}

/// Predicate names treated as taxonomic. Each list holds equivalent names;
/// the first entry is the canonical one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomicVocabulary {
    /// Names of the instance-of predicate.
    pub instance_of: Vec<String>,
    /// Names of the subclass-of predicate.
    pub subclass_of: Vec<String>,
    /// Names of the subproperty-of predicate.
    pub subproperty_of: Vec<String>,
}

impl Default for TaxonomicVocabulary {
    fn default() -> Self {
        Self {
            instance_of: vec!["type".to_string(), "rdf:type".to_string()],
            subclass_of: vec!["subClassOf".to_string(), "rdfs:subClassOf".to_string()],
            subproperty_of: vec!["subPropertyOf".to_string(), "rdfs:subPropertyOf".to_string()],
        }
    }
}

impl TaxonomicVocabulary {
    /// Classifies a predicate name.
    #[must_use]
    pub fn kind_of(&self, predicate: &str) -> Option<TaxonomicKind> {
        if self.instance_of.iter().any(|p| p == predicate) {
            Some(TaxonomicKind::Instance)
        } else if self.subclass_of.iter().any(|p| p == predicate) {
            Some(TaxonomicKind::Subclass)
        } else if self.subproperty_of.iter().any(|p| p == predicate) {
            Some(TaxonomicKind::Subproperty)
        } else {
            None
        }
    }

    /// All names of the given kind.
    #[must_use]
    pub fn names(&self, kind: TaxonomicKind) -> &[String] {
        match kind {
            TaxonomicKind::Instance => &self.instance_of,
            TaxonomicKind::Subclass => &self.subclass_of,
            TaxonomicKind::Subproperty => &self.subproperty_of,
        }
    }

    /// Canonical name of the given kind.
    #[must_use]
    pub fn canonical(&self, kind: TaxonomicKind) -> &str {
        self.names(kind).first().map_or("", String::as_str)
    }

    /// Every taxonomic predicate name.
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.instance_of
            .iter()
            .chain(&self.subclass_of)
            .chain(&self.subproperty_of)
    }

    fn validate(&self) -> KbResult<()> {
        for kind in [TaxonomicKind::Instance, TaxonomicKind::Subclass, TaxonomicKind::Subproperty] {
            if self.names(kind).iter().all(|n| n.trim().is_empty()) {
                return Err(invalid(format!("taxonomic vocabulary has no name for {kind:?}")));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for name in self.all() {
            if !seen.insert(name) {
                return Err(invalid(format!("taxonomic predicate '{name}' is listed twice")));
            }
        }
        Ok(())
    }
}

/// Configuration of the fact store connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database URI, e.g. `memory://localhost`.
    pub uri: String,
    /// Database holding the collections.
    pub db_name: String,
    /// Collection holding triple documents.
    pub triples_collection: String,
    /// Collection holding singleton documents (origin versions).
    pub aux_collection: String,
    /// Reject every mutation.
    pub read_only: bool,
    /// Permit patterns with subject, predicate and object all unbound.
    pub allow_unbound_scan: bool,
    /// Taxonomic predicate names.
    pub taxonomic: TaxonomicVocabulary,
    /// Delete triples of the `user` and `session` origins on connect.
    pub drop_session_origins: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "memory://localhost".to_string(),
            db_name: "knowbase".to_string(),
            triples_collection: "triples".to_string(),
            aux_collection: "one".to_string(),
            read_only: false,
            allow_unbound_scan: false,
            taxonomic: TaxonomicVocabulary::default(),
            drop_session_origins: true,
        }
    }
}

impl StoreConfig {
    /// Store config for `uri` with defaults elsewhere.
    #[must_use]
    pub fn with_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for empty names, identical
    /// collection names, or a broken taxonomic vocabulary.
    pub fn validate(self) -> KbResult<Self> {
        if self.uri.trim().is_empty() {
            return Err(invalid("uri must not be empty"));
        }
        if self.db_name.trim().is_empty() {
            return Err(invalid("db_name must not be empty"));
        }
        if self.triples_collection.trim().is_empty() || self.aux_collection.trim().is_empty() {
            return Err(invalid("collection names must not be empty"));
        }
        if self.triples_collection == self.aux_collection {
            return Err(invalid(format!(
                "triples and auxiliary collection must differ (both '{}')",
                self.triples_collection
            )));
        }
        self.taxonomic.validate()?;
        Ok(self)
    }
}

/// Configuration of one blackboard evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlackboardConfig {
    /// Capacity of the unified answer queue. `None` means unbounded.
    pub queue_capacity: Option<usize>,
    /// How long `stop` waits for processes before abandoning them.
    pub cancellation_grace_ms: u64,
    /// How often blocked producers re-check their cancellation token.
    pub poll_interval_ms: u64,
}

impl Default for BlackboardConfig {
    fn default() -> Self {
        Self {
            queue_capacity: Some(1024),
            cancellation_grace_ms: 1000,
            poll_interval_ms: 10,
        }
    }
}

impl BlackboardConfig {
    /// Grace period granted to a process after a stop request.
    #[must_use]
    pub const fn grace(&self) -> Duration {
        Duration::from_millis(self.cancellation_grace_ms)
    }

    /// Interval at which a waiting blackboard rechecks its processes.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for a zero capacity or a zero
    /// poll interval.
    pub fn validate(self) -> KbResult<Self> {
        if self.queue_capacity == Some(0) {
            return Err(invalid("queue_capacity must be at least 1"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms must be positive"));
        }
        Ok(self)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    /// Fact store settings.
    pub store: StoreConfig,
    /// Query evaluation settings.
    pub blackboard: BlackboardConfig,
}

impl KnowledgeBaseConfig {
    /// Parses a JSON settings document.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` on malformed JSON or invalid values.
    pub fn from_json_str(raw: &str) -> KbResult<Self> {
        let cfg: Self = serde_json::from_str(raw).map_err(|e| invalid(format!("malformed settings: {e}")))?;
        cfg.validate()
    }

    /// Reads a JSON settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails validation.
    pub fn from_file(path: impl AsRef<Path>) -> KbResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Validates both sections.
    ///
    /// # Errors
    ///
    /// Propagates the first section error.
    pub fn validate(self) -> KbResult<Self> {
        Ok(Self {
            store: self.store.validate()?,
            blackboard: self.blackboard.validate()?,
        })
    }
}
