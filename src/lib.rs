//! Synergy Engine - adaptive capability composition library
//!
//! Provides:
//! - An inverted index over a catalog of capability units
//! - Synergy-aware composition of unit sets for a task
//! - Outcome learning: per-unit effectiveness, pairwise relationships and
//!   emergent combinations
//! - Breakthrough scoring of exceptional outcomes
//! - Concurrent fan-out synthesis that tolerates partial failure
//!
//! # Example
//!
//! ```ignore
//! use synergy_engine::{AdaptiveEngine, CatalogLoader, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let catalog = CatalogLoader::load(std::path::Path::new("catalog.json"))?;
//!     let engine = AdaptiveEngine::from_catalog(EngineConfig::default(), &catalog)?;
//!     let agent = engine.compose_agent("design a responsive layout", 3).await?;
//!     println!("{}", agent.unit_names().join(", "));
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod error;
pub mod config;
pub mod catalog;
pub mod composition;
pub mod learning;
pub mod breakthrough;
pub mod synthesis;
pub mod engine;
pub mod cli;

pub use types::{CapabilityUnit, OutcomeMetrics, RawOutcomeMetrics};

pub use error::{EngineError, EngineResult};

pub use config::EngineConfig;

pub use catalog::{Catalog, CatalogIssue, CatalogLoader};

pub use composition::{ComposedAgent, ScoredUnit, SynergyComposer, TraitIndex};

pub use learning::{
    EffectivenessLedger,
    EmergentCombination,
    LearningSnapshot,
    LoadOutcome,
    RelationshipEdge,
    RelationshipGraph,
};

pub use breakthrough::{BreakthroughAnalysis, BreakthroughLevel, BreakthroughScorer};

pub use synthesis::{Insight, Perspective, SynthesisReport};

pub use engine::{AdaptiveEngine, EngineStats, ProcessedOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
