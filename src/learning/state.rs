//! Learning state
//!
//! The ledger and the relationship graph under one owner, so a single lock
//! covers every learning mutation.

use std::collections::HashMap;

use super::graph::{CoActivationReport, RelationshipGraph};
use super::ledger::EffectivenessLedger;
use super::snapshot::{EdgeRecord, LearningSnapshot, SNAPSHOT_VERSION};
use crate::config::LearningConfig;
use crate::types::{canonical_names, combination_key, OutcomeMetrics, PairKey};

/// Read-only view of learned state used by scoring
pub trait LearningView {
    fn effectiveness(&self, name: &str) -> f64;
    fn co_activation_count(&self, a: &str, b: &str) -> u64;
    fn has_emergent(&self, key: &str) -> bool;
}

/// Result of recording one joint outcome
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancedOutcome {
    /// Effectiveness of each distinct unit after the update
    pub effectiveness: Vec<(String, f64)>,
    pub relationships: CoActivationReport,
}

#[derive(Debug, Clone, Default)]
pub struct LearningState {
    config: LearningConfig,
    pub ledger: EffectivenessLedger,
    pub graph: RelationshipGraph,
}

impl LearningState {
    pub fn new(config: LearningConfig) -> Self {
        Self {
            ledger: EffectivenessLedger::new(config.clone()),
            graph: RelationshipGraph::new(config.clone()),
            config,
        }
    }

    /// Single-unit outcome
    pub fn record_outcome(
        &mut self,
        name: &str,
        success: bool,
        metrics: &OutcomeMetrics,
        context: &str,
    ) -> f64 {
        self.ledger.record_outcome(name, success, metrics, context)
    }

    /// Joint outcome: every distinct unit is scored, then every pair and the
    /// combination as a whole
    pub fn record_enhanced_outcome(
        &mut self,
        names: &[String],
        success: bool,
        metrics: &OutcomeMetrics,
        context: &str,
    ) -> EnhancedOutcome {
        let names = canonical_names(names);
        let before: HashMap<&str, f64> = names
            .iter()
            .map(|n| (n.as_str(), self.ledger.get_effectiveness(n)))
            .collect();

        let effectiveness = names
            .iter()
            .map(|n| {
                let after = self.ledger.record_outcome(n, success, metrics, context);
                (n.clone(), after)
            })
            .collect();

        let default = self.config.default_effectiveness;
        let relationships = self.graph.record_co_activation(&names, success, metrics, context, |n| {
            before.get(n).copied().unwrap_or(default)
        });

        EnhancedOutcome {
            effectiveness,
            relationships,
        }
    }

    /// Serializable copy of the full state
    pub fn snapshot(&self) -> LearningSnapshot {
        let mut relationships: Vec<EdgeRecord> = self
            .graph
            .edges()
            .iter()
            .map(|(key, edge)| EdgeRecord {
                a: key.first.clone(),
                b: key.second.clone(),
                edge: edge.clone(),
            })
            .collect();
        relationships.sort_by(|x, y| (&x.a, &x.b).cmp(&(&y.a, &y.b)));

        LearningSnapshot {
            version: SNAPSHOT_VERSION,
            units: self.ledger.records().clone(),
            confidence: self.ledger.confidences().clone(),
            relationships,
            emergent: self.graph.get_emergent_patterns().clone(),
        }
    }

    /// Rebuild state from a snapshot
    pub fn from_snapshot(config: LearningConfig, snapshot: LearningSnapshot) -> Self {
        let edges = snapshot
            .relationships
            .into_iter()
            .filter(|r| r.a != r.b)
            .map(|r| (PairKey::new(&r.a, &r.b), r.edge))
            .collect();

        Self {
            ledger: EffectivenessLedger::from_parts(config.clone(), snapshot.units, snapshot.confidence),
            graph: RelationshipGraph::from_parts(config.clone(), edges, snapshot.emergent),
            config,
        }
    }
}

impl LearningView for LearningState {
    fn effectiveness(&self, name: &str) -> f64 {
        self.ledger.get_effectiveness(name)
    }

    fn co_activation_count(&self, a: &str, b: &str) -> u64 {
        self.graph.co_activation_count(a, b)
    }

    fn has_emergent(&self, key: &str) -> bool {
        self.graph.has_emergent(key)
    }
}

/// Whether the set's canonical key is a known emergent combination
pub fn is_known_combination<V: LearningView + ?Sized>(view: &V, names: &[String]) -> bool {
    view.has_emergent(&combination_key(names))
}
