//! Aggregator Namespace
//!
//! Maps aggregator kind names onto constructors. Kinds come from three places:
//! the built-in set, `inventory` submissions linked into the binary, and
//! runtime registration.

use crate::AggregatorKindDef;
use crate::aggregator::{AggregatorRef, BUILTIN_KINDS};
use parking_lot::RwLock;
use qualexpr_core::{SemanticDescriptor, is_valid_name};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from aggregator kind registration and lookup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// A kind with this name already exists
    #[error("duplicate aggregator kind: {0}")]
    DuplicateKind(String),

    /// No kind with this name exists
    #[error("unknown aggregator: {0}")]
    UnknownAggregator(String),

    /// Kind names must be identifiers
    #[error("invalid aggregator name: {0:?}")]
    InvalidName(String),
}

type BuildFn = dyn Fn(SemanticDescriptor) -> AggregatorRef + Send + Sync;

/// Named aggregator constructor
#[derive(Clone)]
pub struct AggregatorKind {
    name: Arc<str>,
    description: Arc<str>,
    build: Arc<BuildFn>,
}

impl AggregatorKind {
    /// Create a kind from a constructor closure
    pub fn new<F>(name: impl Into<Arc<str>>, description: impl Into<Arc<str>>, build: F) -> Self
    where
        F: Fn(SemanticDescriptor) -> AggregatorRef + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            build: Arc::new(build),
        }
    }

    /// Kind name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// One-line description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Build a fresh instance bound to `semantic`
    pub fn instantiate(&self, semantic: SemanticDescriptor) -> AggregatorRef {
        (self.build)(semantic)
    }
}

impl fmt::Debug for AggregatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregatorKind")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl From<&AggregatorKindDef> for AggregatorKind {
    fn from(def: &AggregatorKindDef) -> Self {
        let build = def.build;
        Self::new(def.name, def.description, build)
    }
}

/// Thread-safe set of aggregator kinds
#[derive(Debug, Default)]
pub struct AggregatorRegistry {
    kinds: RwLock<BTreeMap<String, AggregatorKind>>,
}

impl AggregatorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in kinds plus every `inventory` submission
    ///
    /// A submission clashing with an already present name is skipped.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for def in BUILTIN_KINDS.iter().chain(inventory::iter::<AggregatorKindDef>) {
            if let Err(e) = registry.register(AggregatorKind::from(def)) {
                warn!(kind = def.name, error = %e, "Skipping aggregator kind");
            }
        }
        registry
    }

    /// Add a kind
    pub fn register(&self, kind: AggregatorKind) -> Result<(), RegistryError> {
        if !is_valid_name(kind.name()) {
            return Err(RegistryError::InvalidName(kind.name().to_string()));
        }
        let mut kinds = self.kinds.write();
        if kinds.contains_key(kind.name()) {
            return Err(RegistryError::DuplicateKind(kind.name().to_string()));
        }
        debug!(kind = kind.name(), "Registered aggregator kind");
        kinds.insert(kind.name().to_string(), kind);
        Ok(())
    }

    /// Look up a kind by name
    pub fn resolve(&self, name: &str) -> Result<AggregatorKind, RegistryError> {
        self.kinds
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownAggregator(name.to_string()))
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.kinds.read().contains_key(name)
    }

    /// All kind names in lexical order
    pub fn names(&self) -> Vec<String> {
        self.kinds.read().keys().cloned().collect()
    }

    /// All kinds in lexical order
    pub fn kinds(&self) -> Vec<AggregatorKind> {
        self.kinds.read().values().cloned().collect()
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.kinds.read().len()
    }

    /// Whether no kind is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for AggregatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for kind in self.kinds.read().values() {
            writeln!(f, "{:<12} {}", kind.name(), kind.description())?;
        }
        Ok(())
    }
}
