//! Outcome learning
//!
//! Learns per-unit effectiveness and per-pair relationships from real
//! outcomes, discovers emergent unit combinations, and persists all of it
//! as a single snapshot.

pub mod graph;
pub mod ledger;
pub mod snapshot;
pub mod state;

pub use graph::{CoActivationReport, EmergentCombination, RelationshipEdge, RelationshipGraph};
pub use ledger::{AdaptationEvent, EffectivenessLedger, LedgerStats, UnitRecord};
pub use snapshot::{LearningSnapshot, LoadOutcome};
pub use state::{EnhancedOutcome, LearningState, LearningView};
