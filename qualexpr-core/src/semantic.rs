//! Semantic Namespaces
//!
//! Hierarchical registry mapping `namespace::...::name` paths onto the event
//! sources producers attach at startup. Stems hold named children; leaves hold
//! one descriptor. Registration only ever grows the tree.

use crate::SemanticId;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::debug;

/// Separator between namespace path segments in expression text
pub const PATH_SEPARATOR: &str = "::";

/// Errors from namespace registration and resolution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SemanticError {
    /// A sibling with the same name is already registered
    #[error("duplicate namespace name: {0}")]
    DuplicateName(String),

    /// A path segment or the leaf name is not registered
    #[error("unknown semantic: {0}")]
    UnknownSemantic(String),

    /// The numeric id is already bound to another source
    #[error("semantic id {id} already bound to {existing}")]
    DuplicateSemanticId {
        /// Colliding id
        id: SemanticId,
        /// Qualified name currently holding the id
        existing: String,
    },

    /// Names must be identifiers so expressions can reference them
    #[error("invalid namespace name: {0:?}")]
    InvalidName(String),
}

/// Whether `name` can appear as a path segment in expression text
pub fn is_valid_name(name: &str) -> bool {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    let re = NAME_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex")
    });
    re.is_match(name)
}

/// Registered identity of one event source
///
/// Cheap to clone; the qualified name is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemanticDescriptor {
    id: SemanticId,
    name: Arc<str>,
}

impl SemanticDescriptor {
    fn new(id: SemanticId, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Numeric id carried by the producer's events
    pub fn id(&self) -> SemanticId {
        self.id
    }

    /// Fully qualified name, e.g. `net::bytes`
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for SemanticDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Namespace subtree as built by a producer, before registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticNamespace {
    /// Named group of child namespaces
    Stem {
        /// Segment name
        name: String,
        /// Children, names unique among siblings
        children: Vec<SemanticNamespace>,
    },
    /// Terminal event source
    Leaf {
        /// Segment name
        name: String,
        /// Id the producer emits events with
        id: SemanticId,
    },
}

impl SemanticNamespace {
    /// An empty stem
    pub fn stem(name: impl Into<String>) -> Self {
        SemanticNamespace::Stem {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// A terminal source
    pub fn leaf(name: impl Into<String>, id: SemanticId) -> Self {
        SemanticNamespace::Leaf {
            name: name.into(),
            id,
        }
    }

    /// Append a child; no-op on a leaf
    pub fn with(mut self, child: SemanticNamespace) -> Self {
        if let SemanticNamespace::Stem { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    /// Append a leaf child
    pub fn with_leaf(self, name: impl Into<String>, id: SemanticId) -> Self {
        self.with(SemanticNamespace::leaf(name, id))
    }

    /// Segment name
    pub fn name(&self) -> &str {
        match self {
            SemanticNamespace::Stem { name, .. } | SemanticNamespace::Leaf { name, .. } => name,
        }
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Node {
    Stem(BTreeMap<String, Node>),
    Leaf(SemanticDescriptor),
}

#[derive(Debug, Default)]
struct Tree {
    root: BTreeMap<String, Node>,
    by_id: FxHashMap<SemanticId, SemanticDescriptor>,
}

impl Tree {
    fn stem_mut(&mut self, path: &[&str]) -> Result<&mut BTreeMap<String, Node>, SemanticError> {
        let mut children = &mut self.root;
        for (depth, segment) in path.iter().enumerate() {
            match children.get_mut(*segment) {
                Some(Node::Stem(next)) => children = next,
                _ => return Err(SemanticError::UnknownSemantic(qualify(&path[..=depth]))),
            }
        }
        Ok(children)
    }

    fn stem(&self, path: &[&str]) -> Result<&BTreeMap<String, Node>, SemanticError> {
        let mut children = &self.root;
        for (depth, segment) in path.iter().enumerate() {
            match children.get(*segment) {
                Some(Node::Stem(next)) => children = next,
                _ => return Err(SemanticError::UnknownSemantic(qualify(&path[..=depth]))),
            }
        }
        Ok(children)
    }
}

fn qualify(segments: &[&str]) -> String {
    segments.join(PATH_SEPARATOR)
}

/// Thread-safe semantic namespace tree
///
/// Registration takes the write lock; resolution takes the read lock and can
/// run concurrently with other resolutions.
#[derive(Debug, Default)]
pub struct SemanticRegistry {
    tree: RwLock<Tree>,
}

impl SemanticRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `namespace` under the existing stem at `path` (empty = root)
    ///
    /// The subtree is validated in full before anything is inserted, so a
    /// failed registration leaves the registry untouched.
    pub fn register(
        &self,
        path: &[&str],
        namespace: SemanticNamespace,
    ) -> Result<(), SemanticError> {
        let mut tree = self.tree.write();

        if tree.stem(path)?.contains_key(namespace.name()) {
            let mut full = path.to_vec();
            full.push(namespace.name());
            return Err(SemanticError::DuplicateName(qualify(&full)));
        }

        let mut pending = FxHashMap::default();
        validate(&namespace, path, &tree.by_id, &mut pending)?;

        let target = tree.stem_mut(path)?;

        let name = namespace.name().to_string();
        let mut descriptors = Vec::new();
        let node = build(namespace, path, &mut descriptors);
        debug!(
            path = %qualify(path),
            namespace = %name,
            sources = descriptors.len(),
            "Registered namespace"
        );
        target.insert(name, node);
        for descriptor in descriptors {
            tree.by_id.insert(descriptor.id(), descriptor);
        }
        Ok(())
    }

    /// Resolve the leaf `name` under the stem at `path`
    pub fn resolve(&self, path: &[&str], name: &str) -> Result<SemanticDescriptor, SemanticError> {
        let tree = self.tree.read();
        let stem = tree.stem(path)?;
        match stem.get(name) {
            Some(Node::Leaf(descriptor)) => Ok(descriptor.clone()),
            _ => {
                let mut full = path.to_vec();
                full.push(name);
                Err(SemanticError::UnknownSemantic(qualify(&full)))
            }
        }
    }

    /// Resolve a `::`-separated qualified name
    pub fn resolve_qualified(&self, qualified: &str) -> Result<SemanticDescriptor, SemanticError> {
        let segments: Vec<&str> = qualified.split(PATH_SEPARATOR).collect();
        match segments.split_last() {
            Some((name, path)) => self.resolve(path, name),
            None => Err(SemanticError::UnknownSemantic(qualified.to_string())),
        }
    }

    /// Look up the descriptor bound to `id`
    pub fn describe(&self, id: SemanticId) -> Option<SemanticDescriptor> {
        self.tree.read().by_id.get(&id).cloned()
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.tree.read().by_id.len()
    }

    /// Whether no source is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered sources, ordered by id
    pub fn descriptors(&self) -> Vec<SemanticDescriptor> {
        let mut all: Vec<_> = self.tree.read().by_id.values().cloned().collect();
        all.sort_by_key(|d| d.id());
        all
    }
}

fn validate(
    namespace: &SemanticNamespace,
    prefix: &[&str],
    bound: &FxHashMap<SemanticId, SemanticDescriptor>,
    pending: &mut FxHashMap<SemanticId, String>,
) -> Result<(), SemanticError> {
    let name = namespace.name();
    let mut path = prefix.to_vec();
    path.push(name);

    if !is_valid_name(name) {
        return Err(SemanticError::InvalidName(qualify(&path)));
    }

    match namespace {
        SemanticNamespace::Leaf { id, .. } => {
            if let Some(existing) = bound.get(id) {
                return Err(SemanticError::DuplicateSemanticId {
                    id: *id,
                    existing: existing.name().to_string(),
                });
            }
            if let Some(existing) = pending.insert(*id, qualify(&path)) {
                return Err(SemanticError::DuplicateSemanticId { id: *id, existing });
            }
        }
        SemanticNamespace::Stem { children, .. } => {
            let mut seen = Vec::with_capacity(children.len());
            for child in children {
                if seen.contains(&child.name()) {
                    let mut full = path.clone();
                    full.push(child.name());
                    return Err(SemanticError::DuplicateName(qualify(&full)));
                }
                seen.push(child.name());
                validate(child, &path, bound, pending)?;
            }
        }
    }
    Ok(())
}

fn build(namespace: SemanticNamespace, prefix: &[&str], out: &mut Vec<SemanticDescriptor>) -> Node {
    match namespace {
        SemanticNamespace::Leaf { name, id } => {
            let mut path = prefix.to_vec();
            path.push(&name);
            let descriptor = SemanticDescriptor::new(id, qualify(&path));
            out.push(descriptor.clone());
            Node::Leaf(descriptor)
        }
        SemanticNamespace::Stem { name, children } => {
            let mut path = prefix.to_vec();
            path.push(&name);
            let mut nodes = BTreeMap::new();
            for child in children {
                let child_name = child.name().to_string();
                let node = build(child, &path, out);
                nodes.insert(child_name, node);
            }
            Node::Stem(nodes)
        }
    }
}

fn display_nodes(
    nodes: &BTreeMap<String, Node>,
    depth: usize,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    for (name, node) in nodes {
        let indent = "  ".repeat(depth);
        match node {
            Node::Stem(children) => {
                writeln!(f, "{indent}{name}")?;
                display_nodes(children, depth + 1, f)?;
            }
            Node::Leaf(descriptor) => writeln!(f, "{indent}{name} {}", descriptor.id())?,
        }
    }
    Ok(())
}

impl fmt::Display for SemanticRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display_nodes(&self.tree.read().root, 0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net() -> SemanticNamespace {
        SemanticNamespace::stem("net")
            .with_leaf("bytes", SemanticId(1))
            .with_leaf("time", SemanticId(2))
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = SemanticRegistry::new();
        registry.register(&[], net()).unwrap();

        let bytes = registry.resolve(&["net"], "bytes").unwrap();
        assert_eq!(bytes.id(), SemanticId(1));
        assert_eq!(bytes.name(), "net::bytes");

        let time = registry.resolve_qualified("net::time").unwrap();
        assert_eq!(time.id(), SemanticId(2));
        assert_eq!(registry.describe(SemanticId(2)), Some(time));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_nested_stems() {
        let registry = SemanticRegistry::new();
        let papi = SemanticNamespace::stem("papi")
            .with(SemanticNamespace::stem("cache").with_leaf("l1_miss", SemanticId(10)));
        registry.register(&[], papi).unwrap();
        registry
            .register(&["papi"], SemanticNamespace::stem("tlb").with_leaf("miss", SemanticId(11)))
            .unwrap();

        assert_eq!(
            registry.resolve(&["papi", "cache"], "l1_miss").unwrap().id(),
            SemanticId(10)
        );
        assert_eq!(
            registry.resolve_qualified("papi::tlb::miss").unwrap().name(),
            "papi::tlb::miss"
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = SemanticRegistry::new();
        registry.register(&[], net()).unwrap();

        let again = SemanticNamespace::stem("net").with_leaf("other", SemanticId(3));
        assert_eq!(
            registry.register(&[], again),
            Err(SemanticError::DuplicateName("net".to_string()))
        );
        // Nothing from the rejected subtree leaked in
        assert!(registry.describe(SemanticId(3)).is_none());
    }

    #[test]
    fn test_same_path_registered_twice() {
        let registry = SemanticRegistry::new();
        registry.register(&[], net()).unwrap();

        // Same ids too: the name clash is reported, not the id clash
        assert_eq!(
            registry.register(&[], net()),
            Err(SemanticError::DuplicateName("net".to_string()))
        );

        let tcp = || SemanticNamespace::stem("tcp").with_leaf("retransmits", SemanticId(5));
        registry.register(&["net"], tcp()).unwrap();
        assert_eq!(
            registry.register(&["net"], tcp()),
            Err(SemanticError::DuplicateName("net::tcp".to_string()))
        );
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_duplicate_sibling_in_subtree() {
        let registry = SemanticRegistry::new();
        let bad = SemanticNamespace::stem("io")
            .with_leaf("read", SemanticId(1))
            .with_leaf("read", SemanticId(2));
        assert_eq!(
            registry.register(&[], bad),
            Err(SemanticError::DuplicateName("io::read".to_string()))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = SemanticRegistry::new();
        registry.register(&[], net()).unwrap();

        let clash = SemanticNamespace::stem("io").with_leaf("read", SemanticId(1));
        assert!(matches!(
            registry.register(&[], clash),
            Err(SemanticError::DuplicateSemanticId { id: SemanticId(1), .. })
        ));
    }

    #[test]
    fn test_unknown_paths() {
        let registry = SemanticRegistry::new();
        registry.register(&[], net()).unwrap();

        assert_eq!(
            registry.resolve(&["disk"], "bytes"),
            Err(SemanticError::UnknownSemantic("disk".to_string()))
        );
        assert_eq!(
            registry.resolve(&["net"], "packets"),
            Err(SemanticError::UnknownSemantic("net::packets".to_string()))
        );
        // A leaf is not a stem
        assert!(registry.resolve(&["net", "bytes"], "x").is_err());
        // Registering under a missing stem fails too
        assert!(matches!(
            registry.register(&["disk"], SemanticNamespace::leaf("x", SemanticId(9))),
            Err(SemanticError::UnknownSemantic(_))
        ));
    }

    #[test]
    fn test_invalid_name() {
        let registry = SemanticRegistry::new();
        let bad = SemanticNamespace::stem("net").with_leaf("bytes sent", SemanticId(1));
        assert!(matches!(
            registry.register(&[], bad),
            Err(SemanticError::InvalidName(_))
        ));
        assert!(is_valid_name("_l1_miss"));
        assert!(!is_valid_name("1st"));
    }

    #[test]
    fn test_display_tree() {
        let registry = SemanticRegistry::new();
        registry.register(&[], net()).unwrap();
        let dump = registry.to_string();
        assert!(dump.contains("net\n"));
        assert!(dump.contains("  bytes #1"));
    }
}
