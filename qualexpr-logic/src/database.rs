//! Aggregator Database
//!
//! Live aggregator instances of one evaluation context, interned per
//! `(semantic, kind)` pair and indexed by semantic id for event dispatch.

use crate::aggregator::AggregatorRef;
use crate::registry::AggregatorKind;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use qualexpr_core::{ResolvedEvent, SemanticDescriptor, SemanticId};
use std::sync::Arc;

/// Instance interned under the kind name it was requested with
#[derive(Debug)]
struct Slot {
    kind: Arc<str>,
    aggregator: AggregatorRef,
}

/// Interned aggregator instances of one context
#[derive(Debug, Default)]
pub struct AggregatorDb {
    by_semantic: RwLock<FxHashMap<SemanticId, Vec<Slot>>>,
}

impl AggregatorDb {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Instance of `kind` bound to `semantic`, created on first request
    pub fn intern(&self, semantic: &SemanticDescriptor, kind: &AggregatorKind) -> AggregatorRef {
        if let Some(found) = self.get(semantic.id(), kind.name()) {
            return found;
        }

        let mut index = self.by_semantic.write();
        let slot = index.entry(semantic.id()).or_default();
        // Re-check: another compiler may have interned it meanwhile
        if let Some(found) = slot.iter().find(|s| &*s.kind == kind.name()) {
            return Arc::clone(&found.aggregator);
        }
        let created = kind.instantiate(semantic.clone());
        slot.push(Slot {
            kind: Arc::from(kind.name()),
            aggregator: Arc::clone(&created),
        });
        created
    }

    /// Existing instance for the pair, if any
    pub fn get(&self, semantic: SemanticId, kind: &str) -> Option<AggregatorRef> {
        self.by_semantic
            .read()
            .get(&semantic)?
            .iter()
            .find(|s| &*s.kind == kind)
            .map(|s| Arc::clone(&s.aggregator))
    }

    /// Route `event` to every instance bound to its semantic
    ///
    /// Returns the number of instances updated. Never allocates.
    #[inline]
    pub fn dispatch(&self, event: &ResolvedEvent) -> usize {
        let index = self.by_semantic.read();
        match index.get(&event.semantic) {
            Some(slots) => {
                for slot in slots {
                    slot.aggregator.update(event);
                }
                slots.len()
            }
            None => 0,
        }
    }

    /// Reset every instance to its neutral value
    pub fn reset_all(&self) {
        for slots in self.by_semantic.read().values() {
            for slot in slots {
                slot.aggregator.reset();
            }
        }
    }

    /// Drop every instance
    pub fn clear(&self) {
        self.by_semantic.write().clear();
    }

    /// Release spare capacity of the dispatch index
    pub fn consolidate(&self) {
        let mut index = self.by_semantic.write();
        index.retain(|_, slots| !slots.is_empty());
        for slots in index.values_mut() {
            slots.shrink_to_fit();
        }
        index.shrink_to_fit();
    }

    /// Number of live instances
    pub fn len(&self) -> usize {
        self.by_semantic.read().values().map(Vec::len).sum()
    }

    /// Whether no instance exists
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every instance, ordered by semantic id then kind name
    pub fn aggregators(&self) -> Vec<AggregatorRef> {
        let index = self.by_semantic.read();
        let mut all: Vec<(SemanticId, &str, &AggregatorRef)> = index
            .iter()
            .flat_map(|(id, slots)| slots.iter().map(move |s| (*id, &*s.kind, &s.aggregator)))
            .collect();
        all.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        all.into_iter().map(|(_, _, a)| Arc::clone(a)).collect()
    }
}
