//! Event Producers
//!
//! A producer owns a set of event sources. It contributes their namespace when
//! attached to a desk and then emits raw events through the sink it receives.

use crate::delivery::EventSink;
use qualexpr_core::SemanticNamespace;

/// Source of raw events attached to a desk
pub trait Producer: Send {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Namespace subtree registered at the semantic root on attach
    fn namespace(&self) -> SemanticNamespace;

    /// Start emitting through `sink`
    fn attach(&mut self, sink: EventSink);

    /// Stop emitting; the sink must be dropped
    fn detach(&mut self);
}
