//! Replay Traces
//!
//! A trace scripts one measurement session in TOML:
//!
//! ```toml
//! [semantics]
//! "net::bytes" = 1
//! "net::packets" = 2
//!
//! [[counter]]
//! context = 1
//! id = 7
//! expr = "net::bytes/sum * 8"
//!
//! [[event]]
//! state = "counter"
//! semantic = "net::bytes"
//! value = 100
//!
//! [[read]]
//! label = "warm"
//! after = 1
//! ```
//!
//! `[[event]]` entries are replayed in order. `advance_ns` moves the replay
//! clock before the event is delivered. A `[[read]]` point snapshots every
//! counter once `after` events have been delivered.

use anyhow::{Context, bail};
use qualexpr::{
    ContextId, EventId, EventState, ExpressionId, RawEvent, SemanticId, SemanticNamespace,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

const SEPARATOR: &str = "::";

/// Parsed replay script
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Trace {
    /// Qualified source name to semantic id
    #[serde(default)]
    pub semantics: BTreeMap<String, u32>,
    /// Counters registered before the first event
    #[serde(default, rename = "counter")]
    pub counters: Vec<TraceCounter>,
    /// Events in delivery order
    #[serde(default, rename = "event")]
    pub events: Vec<TraceEvent>,
    /// Intermediate snapshots
    #[serde(default, rename = "read")]
    pub reads: Vec<ReadPoint>,
}

/// One `[[counter]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraceCounter {
    /// Target context; ignored for global counters
    #[serde(default)]
    pub context: Option<ContextId>,
    /// Expression id within the context
    pub id: ExpressionId,
    /// Expression text
    pub expr: String,
    /// Compile into every context declared so far
    #[serde(default)]
    pub global: bool,
}

/// One `[[event]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraceEvent {
    /// `counter`, `start`, `wait`, `stop` or `undefined`
    pub state: EventState,
    /// Qualified source name from `[semantics]`
    pub semantic: String,
    /// Interval instance id
    #[serde(default)]
    pub eid: u32,
    /// Payload
    #[serde(default)]
    pub value: i64,
    /// Clock advance applied before delivery
    #[serde(default)]
    pub advance_ns: u64,
}

/// One `[[read]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadPoint {
    /// Snapshot label
    pub label: String,
    /// Number of events delivered before the snapshot
    pub after: usize,
}

impl Trace {
    /// Load a trace file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading trace {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing trace {}", path.display()))
    }

    /// Parse trace text
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Id bound to a qualified source name
    pub fn semantic_id(&self, qualified: &str) -> Option<SemanticId> {
        self.semantics.get(qualified).copied().map(SemanticId)
    }

    /// Raw event for entry `event`
    pub fn raw_event(&self, event: &TraceEvent) -> anyhow::Result<RawEvent> {
        let Some(semantic) = self.semantic_id(&event.semantic) else {
            bail!("event references undeclared semantic `{}`", event.semantic);
        };
        Ok(RawEvent {
            state: event.state,
            semantic,
            eid: EventId(event.eid),
            value: event.value,
        })
    }

    /// Declared sources grouped into one namespace per root segment
    pub fn namespaces(&self) -> anyhow::Result<Vec<SemanticNamespace>> {
        let mut roots: BTreeMap<String, Draft> = BTreeMap::new();
        for (qualified, &id) in &self.semantics {
            let Some((root, rest)) = qualified.split_once(SEPARATOR) else {
                bail!("semantic `{qualified}` must be qualified by a namespace");
            };
            let rest: Vec<&str> = rest.split(SEPARATOR).collect();
            roots
                .entry(root.to_string())
                .or_insert_with(|| Draft::Stem(BTreeMap::new()))
                .insert(&rest, SemanticId(id))
                .with_context(|| format!("declaring semantic `{qualified}`"))?;
        }
        Ok(roots
            .into_iter()
            .map(|(name, draft)| draft.build(name))
            .collect())
    }
}

#[derive(Debug)]
enum Draft {
    Stem(BTreeMap<String, Draft>),
    Leaf(SemanticId),
}

impl Draft {
    fn insert(&mut self, path: &[&str], id: SemanticId) -> anyhow::Result<()> {
        let Draft::Stem(children) = self else {
            bail!("a source cannot also be a namespace");
        };
        match path {
            [] => bail!("empty path"),
            [leaf] => {
                if children.contains_key(*leaf) {
                    bail!("`{leaf}` is already declared");
                }
                children.insert(leaf.to_string(), Draft::Leaf(id));
                Ok(())
            }
            [stem, rest @ ..] => children
                .entry(stem.to_string())
                .or_insert_with(|| Draft::Stem(BTreeMap::new()))
                .insert(rest, id),
        }
    }

    fn build(self, name: String) -> SemanticNamespace {
        match self {
            Draft::Leaf(id) => SemanticNamespace::leaf(name, id),
            Draft::Stem(children) => children
                .into_iter()
                .fold(SemanticNamespace::stem(name), |ns, (child, draft)| {
                    ns.with(draft.build(child))
                }),
        }
    }
}
