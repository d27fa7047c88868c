//! Unit search and composition

pub mod composer;
pub mod index;

pub use composer::{ComposedAgent, SynergyComposer, SynergyHints};
pub use index::{tokenize, IndexStats, ScoredUnit, TraitIndex};
