//! Relationship graph
//!
//! Tracks how units behave together: per-pair co-activation statistics and
//! the emergent combinations discovered from exceptional joint outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::composition::SynergyHints;
use crate::config::LearningConfig;
use crate::types::{canonical_names, OutcomeMetrics, PairKey};

/// Co-activation statistics of one unordered unit pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub co_activation_count: u64,
    /// Nudged toward 1 on joint success and toward 0 on joint failure
    pub strength: f64,
    /// Smoothed ratio of joint quality to the product of individual scores
    pub synergy_multiplier: f64,
    pub interference_penalty: f64,
}

impl Default for RelationshipEdge {
    fn default() -> Self {
        Self {
            co_activation_count: 0,
            strength: 0.5,
            synergy_multiplier: 1.0,
            interference_penalty: 0.0,
        }
    }
}

/// A unit set that produced an outsized combined effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergentCombination {
    /// Sorted, de-duplicated member names
    pub units: Vec<String>,
    /// Running efficiency multiplier observed for the set
    pub effectiveness: f64,
    pub activation_frequency: u64,
    pub discovery_context: String,
    pub discovered_at: DateTime<Utc>,
}

/// What a joint activation changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoActivationReport {
    pub pairs_updated: usize,
    /// Key of a newly discovered combination
    pub discovered: Option<String>,
    /// Key of an existing combination that was reinforced
    pub reinforced: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    config: LearningConfig,
    edges: HashMap<PairKey, RelationshipEdge>,
    emergent: BTreeMap<String, EmergentCombination>,
}

impl RelationshipGraph {
    pub fn new(config: LearningConfig) -> Self {
        Self {
            config,
            edges: HashMap::new(),
            emergent: BTreeMap::new(),
        }
    }

    pub fn from_parts(
        config: LearningConfig,
        edges: HashMap<PairKey, RelationshipEdge>,
        emergent: BTreeMap<String, EmergentCombination>,
    ) -> Self {
        Self {
            config,
            edges,
            emergent,
        }
    }

    /// Update every pair in `names` and run emergent discovery.
    ///
    /// `effectiveness` must report each unit's score from before this outcome
    /// was applied to the ledger.
    pub fn record_co_activation<F>(
        &mut self,
        names: &[String],
        success: bool,
        metrics: &OutcomeMetrics,
        context: &str,
        effectiveness: F,
    ) -> CoActivationReport
    where
        F: Fn(&str) -> f64,
    {
        let names = canonical_names(names);
        let mut report = CoActivationReport::default();
        if names.len() < 2 {
            return report;
        }

        let mut combined = metrics.observed_quality();
        if !success {
            combined *= 0.5;
        }

        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                let expected = (effectiveness(a) * effectiveness(b)).max(0.01);
                let ratio = combined / expected;
                self.update_edge(PairKey::new(a, b), success, ratio);
                report.pairs_updated += 1;
            }
        }

        if success {
            self.detect_emergent(&names, metrics.efficiency_gain(), context, &mut report);
        }

        report
    }

    fn update_edge(&mut self, key: PairKey, success: bool, ratio: f64) {
        let nudge = self.config.relationship_nudge;
        let smoothing = self.config.synergy_smoothing;
        let cap = self.config.max_synergy_multiplier;
        let step = self.config.interference_step;

        let edge = self.edges.entry(key).or_default();
        let before = edge.synergy_multiplier;

        edge.co_activation_count += 1;
        let target = if success { 1.0 } else { 0.0 };
        edge.strength = (edge.strength + nudge * (target - edge.strength)).clamp(0.0, 1.0);
        edge.synergy_multiplier =
            ((1.0 - smoothing) * edge.synergy_multiplier + smoothing * ratio).clamp(0.0, cap);
        if !success {
            edge.interference_penalty = (edge.interference_penalty + step).min(1.0);
        }

        if edge.synergy_multiplier > 1.0 && before <= 1.0 {
            info!(
                "Synergy detected (multiplier {:.2}x after {} co-activations)",
                edge.synergy_multiplier, edge.co_activation_count
            );
        }
    }

    fn detect_emergent(
        &mut self,
        names: &[String],
        efficiency_gain: f64,
        context: &str,
        report: &mut CoActivationReport,
    ) {
        let key = names.join("+");

        if let Some(existing) = self.emergent.get_mut(&key) {
            if efficiency_gain <= self.config.reinforcement_min_gain {
                debug!(
                    "Gain {:.2}x too low to reinforce '{}'",
                    efficiency_gain, key
                );
                return;
            }
            let blend = self.config.emergent_blend;
            existing.activation_frequency += 1;
            existing.effectiveness = (1.0 - blend) * existing.effectiveness + blend * efficiency_gain;
            debug!(
                "Reinforced emergent combination '{}' (frequency {})",
                key, existing.activation_frequency
            );
            report.reinforced = Some(key);
        } else if efficiency_gain > self.config.discovery_threshold {
            info!(
                "Emergent combination discovered: '{}' ({:.2}x)",
                key, efficiency_gain
            );
            self.emergent.insert(
                key.clone(),
                EmergentCombination {
                    units: names.to_vec(),
                    effectiveness: efficiency_gain,
                    activation_frequency: 1,
                    discovery_context: if context.is_empty() {
                        "unknown".to_string()
                    } else {
                        context.to_string()
                    },
                    discovered_at: Utc::now(),
                },
            );
            report.discovered = Some(key);
        }
    }

    /// Order-independent edge lookup
    pub fn get_relationship_strength(&self, a: &str, b: &str) -> Option<&RelationshipEdge> {
        if a == b {
            return None;
        }
        self.edges.get(&PairKey::new(a, b))
    }

    pub fn co_activation_count(&self, a: &str, b: &str) -> u64 {
        self.get_relationship_strength(a, b)
            .map(|e| e.co_activation_count)
            .unwrap_or(0)
    }

    pub fn edges(&self) -> &HashMap<PairKey, RelationshipEdge> {
        &self.edges
    }

    pub fn get_emergent_patterns(&self) -> &BTreeMap<String, EmergentCombination> {
        &self.emergent
    }

    pub fn has_emergent(&self, key: &str) -> bool {
        self.emergent.contains_key(key)
    }

    /// Learned multipliers for the composer
    pub fn synergy_hints(&self) -> SynergyHints {
        self.edges
            .iter()
            .map(|(key, edge)| (key.clone(), edge.synergy_multiplier))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn graph() -> RelationshipGraph {
        RelationshipGraph::new(LearningConfig::default())
    }

    #[test]
    fn test_pairs_created_lazily() {
        let mut graph = graph();
        assert!(graph.get_relationship_strength("a", "b").is_none());

        let metrics = OutcomeMetrics::new(1.0, 1.0, 1.0);
        let report = graph.record_co_activation(&names(&["a", "b", "c"]), true, &metrics, "", |_| 0.8);
        assert_eq!(report.pairs_updated, 3);
        assert_eq!(graph.edges().len(), 3);
        assert_eq!(graph.co_activation_count("c", "a"), 1);
    }

    #[test]
    fn test_strength_symmetric_and_nudged() {
        let mut graph = graph();
        let metrics = OutcomeMetrics::new(1.0, 1.0, 1.0);
        graph.record_co_activation(&names(&["b", "a"]), true, &metrics, "", |_| 0.8);

        let ab = graph.get_relationship_strength("a", "b").unwrap();
        let ba = graph.get_relationship_strength("b", "a").unwrap();
        assert_eq!(ab, ba);
        assert!((ab.strength - 0.575).abs() < 1e-12);

        graph.record_co_activation(&names(&["a", "b"]), false, &metrics, "", |_| 0.8);
        let edge = graph.get_relationship_strength("a", "b").unwrap();
        assert!(edge.strength < 0.575);
        assert!((edge.interference_penalty - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_synergy_multiplier() {
        let mut graph = graph();
        // quality 1.0 against 0.5 * 0.5 expected: ratio 4
        let metrics = OutcomeMetrics::new(1.0, 1.0, 3.0);
        graph.record_co_activation(&names(&["a", "b"]), true, &metrics, "", |_| 0.5);
        let edge = graph.get_relationship_strength("a", "b").unwrap();
        assert!((edge.synergy_multiplier - (0.7 + 0.3 * 4.0)).abs() < 1e-12);

        for _ in 0..50 {
            graph.record_co_activation(&names(&["a", "b"]), true, &metrics, "", |_| 0.0);
        }
        let edge = graph.get_relationship_strength("a", "b").unwrap();
        assert!(edge.synergy_multiplier <= 5.0);
    }

    #[test]
    fn test_emergent_discovery_and_reinforcement() {
        let mut graph = graph();
        let metrics = OutcomeMetrics::new(1.0, 1.0, 3.2);
        let set = names(&["Z", "X", "Y"]);

        let report = graph.record_co_activation(&set, true, &metrics, "first run", |_| 0.8);
        assert_eq!(report.discovered.as_deref(), Some("X+Y+Z"));
        let combo = &graph.get_emergent_patterns()["X+Y+Z"];
        assert_eq!(combo.activation_frequency, 1);
        assert_eq!(combo.effectiveness, 3.2);
        assert_eq!(combo.units, names(&["X", "Y", "Z"]));

        let report = graph.record_co_activation(&names(&["Y", "Z", "X"]), true, &metrics, "", |_| 0.8);
        assert_eq!(report.reinforced.as_deref(), Some("X+Y+Z"));
        assert_eq!(graph.get_emergent_patterns().len(), 1);
        assert_eq!(graph.get_emergent_patterns()["X+Y+Z"].activation_frequency, 2);
    }

    #[test]
    fn test_low_gain_does_not_reinforce() {
        let mut graph = graph();
        let set = names(&["a", "b"]);
        graph.record_co_activation(&set, true, &OutcomeMetrics::new(1.0, 1.0, 3.0), "", |_| 0.8);

        let report = graph.record_co_activation(&set, true, &OutcomeMetrics::new(1.0, 1.0, 1.0), "", |_| 0.8);
        assert!(report.reinforced.is_none());
        let combo = &graph.get_emergent_patterns()["a+b"];
        assert_eq!(combo.activation_frequency, 1);
        assert_eq!(combo.effectiveness, 3.0);

        // 0.7 * 3.0 + 0.3 * 2.0
        let report = graph.record_co_activation(&set, true, &OutcomeMetrics::new(1.0, 1.0, 2.0), "", |_| 0.8);
        assert_eq!(report.reinforced.as_deref(), Some("a+b"));
        assert!((graph.get_emergent_patterns()["a+b"].effectiveness - 2.7).abs() < 1e-12);
    }

    #[test]
    fn test_no_discovery_below_threshold_or_on_failure() {
        let mut graph = graph();
        let low = OutcomeMetrics::new(1.0, 1.0, 2.5);
        graph.record_co_activation(&names(&["a", "b"]), true, &low, "", |_| 0.8);
        let high = OutcomeMetrics::new(1.0, 1.0, 4.0);
        graph.record_co_activation(&names(&["a", "c"]), false, &high, "", |_| 0.8);
        assert!(graph.get_emergent_patterns().is_empty());
    }

    #[test]
    fn test_duplicates_collapsed() {
        let mut graph = graph();
        let metrics = OutcomeMetrics::new(1.0, 1.0, 3.0);
        let report = graph.record_co_activation(&names(&["a", "a"]), true, &metrics, "", |_| 0.8);
        assert_eq!(report, CoActivationReport::default());
        assert!(graph.get_relationship_strength("a", "a").is_none());
        assert!(graph.get_emergent_patterns().is_empty());
    }
}
