//! Effectiveness ledger
//!
//! Per-unit effectiveness in [0, 1], nudged toward the observed quality of
//! each outcome, with a bounded adaptation history and a calibrated confidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info};

use crate::config::LearningConfig;
use crate::types::OutcomeMetrics;

/// One change to a unit's effectiveness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationEvent {
    pub timestamp: DateTime<Utc>,
    pub context: String,
    pub metrics: OutcomeMetrics,
    pub effectiveness_before: f64,
    pub effectiveness_after: f64,
}

/// Learned state of a single unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub effectiveness: f64,
    #[serde(default)]
    pub history: VecDeque<AdaptationEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_units: usize,
    pub average_effectiveness: f64,
    pub total_adaptations: usize,
    pub last_update: Option<DateTime<Utc>>,
}

/// Per-unit effectiveness scores
#[derive(Debug, Clone, Default)]
pub struct EffectivenessLedger {
    config: LearningConfig,
    units: BTreeMap<String, UnitRecord>,
    confidence: BTreeMap<String, f64>,
}

impl EffectivenessLedger {
    pub fn new(config: LearningConfig) -> Self {
        Self {
            config,
            units: BTreeMap::new(),
            confidence: BTreeMap::new(),
        }
    }

    /// Restore a ledger from persisted records; scores are re-clamped
    pub fn from_parts(
        config: LearningConfig,
        mut units: BTreeMap<String, UnitRecord>,
        confidence: BTreeMap<String, f64>,
    ) -> Self {
        for record in units.values_mut() {
            record.effectiveness = clamp_score(record.effectiveness);
        }
        let confidence = confidence
            .into_iter()
            .map(|(name, c)| (name, clamp_confidence(c)))
            .collect();
        Self {
            config,
            units,
            confidence,
        }
    }

    pub fn records(&self) -> &BTreeMap<String, UnitRecord> {
        &self.units
    }

    pub fn confidences(&self) -> &BTreeMap<String, f64> {
        &self.confidence
    }

    /// Current score, or the configured default for an unseen unit
    pub fn get_effectiveness(&self, name: &str) -> f64 {
        self.units
            .get(name)
            .map(|r| r.effectiveness)
            .unwrap_or(self.config.default_effectiveness)
    }

    pub fn get_all_scores(&self) -> BTreeMap<String, f64> {
        self.units
            .iter()
            .map(|(name, r)| (name.clone(), r.effectiveness))
            .collect()
    }

    pub fn history(&self, name: &str) -> Option<&VecDeque<AdaptationEvent>> {
        self.units.get(name).map(|r| &r.history)
    }

    /// Nudge a unit's score toward the outcome's observed quality.
    ///
    /// A success aims at the midpoint between the observed quality and 1; a
    /// failure aims at half the observed quality and can never raise the score.
    /// Returns the new effectiveness.
    pub fn record_outcome(
        &mut self,
        name: &str,
        success: bool,
        metrics: &OutcomeMetrics,
        context: &str,
    ) -> f64 {
        let observed = metrics.observed_quality();
        let target = if success {
            0.5 * observed + 0.5
        } else {
            0.5 * observed
        };

        let before = self.get_effectiveness(name);
        let mut after = before + self.config.learning_rate * (target - before);
        if !success {
            after = after.min(before);
        }
        let after = clamp_score(after);

        self.apply(name, before, after, *metrics, context);

        let direction = if after >= before { "up" } else { "down" };
        debug!(
            "Unit '{}' effectiveness {} {:.3} -> {:.3} (delta {:+.3})",
            name,
            direction,
            before,
            after,
            after - before
        );
        after
    }

    /// Boost every named unit by `significance * breakthrough_boost`
    pub fn record_breakthrough(&mut self, names: &[String], significance: f64, context: &str) {
        let significance = if significance.is_finite() {
            significance.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let boost = significance * self.config.breakthrough_boost;
        let context = if context.is_empty() {
            format!("breakthrough_{:.2}", significance)
        } else {
            context.to_string()
        };
        let metrics = OutcomeMetrics::new(1.0, 1.0, 1.0 + significance);

        info!(
            "Recording breakthrough (significance {:.2}) for {} units",
            significance,
            names.len()
        );
        for name in names {
            let before = self.get_effectiveness(name);
            let after = clamp_score(before + boost);
            self.apply(name, before, after, metrics, &context);
        }
    }

    fn apply(&mut self, name: &str, before: f64, after: f64, metrics: OutcomeMetrics, context: &str) {
        let limit = self.config.history_limit.max(1);
        let record = self.units.entry(name.to_string()).or_insert_with(|| UnitRecord {
            effectiveness: before,
            history: VecDeque::new(),
        });
        record.effectiveness = after;
        record.history.push_back(AdaptationEvent {
            timestamp: Utc::now(),
            context: if context.is_empty() {
                "unknown".to_string()
            } else {
                context.to_string()
            },
            metrics,
            effectiveness_before: before,
            effectiveness_after: after,
        });
        while record.history.len() > limit {
            record.history.pop_front();
        }
    }

    pub fn get_confidence(&self, name: &str) -> f64 {
        self.confidence
            .get(name)
            .copied()
            .unwrap_or(self.config.default_confidence)
    }

    /// Lower confidence in proportion to how far the actual effectiveness
    /// deviated from the expected one. Returns the new confidence.
    pub fn calibrate_confidence(&mut self, name: &str, expected: f64, actual: f64) -> f64 {
        let current = self.get_confidence(name);
        let deviation = if expected.abs() > f64::EPSILON && expected.is_finite() && actual.is_finite() {
            ((expected - actual).abs() / expected.abs()).min(5.0)
        } else {
            0.0
        };
        let calibrated = clamp_confidence(current * (1.0 - deviation * 0.2));
        self.confidence.insert(name.to_string(), calibrated);
        debug!(
            "Confidence for '{}' {:.2} -> {:.2} (deviation {:.1}%)",
            name,
            current,
            calibrated,
            deviation * 100.0
        );
        calibrated
    }

    pub fn stats(&self) -> LedgerStats {
        if self.units.is_empty() {
            return LedgerStats::default();
        }
        let total_adaptations = self.units.values().map(|r| r.history.len()).sum();
        let average_effectiveness = self.units.values().map(|r| r.effectiveness).sum::<f64>()
            / self.units.len() as f64;
        let last_update = self
            .units
            .values()
            .filter_map(|r| r.history.back().map(|e| e.timestamp))
            .max();
        LedgerStats {
            total_units: self.units.len(),
            average_effectiveness,
            total_adaptations,
            last_update,
        }
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.1, 1.0)
    } else {
        0.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawOutcomeMetrics;

    fn ledger() -> EffectivenessLedger {
        EffectivenessLedger::new(LearningConfig::default())
    }

    #[test]
    fn test_default_for_unseen() {
        let ledger = ledger();
        assert_eq!(ledger.get_effectiveness("ghost"), 0.8);
        assert!(ledger.get_all_scores().is_empty());
        assert_eq!(ledger.stats(), LedgerStats::default());
    }

    #[test]
    fn test_success_moves_toward_target() {
        let mut ledger = ledger();
        let metrics = OutcomeMetrics::new(1.0, 1.0, 3.0);
        let after = ledger.record_outcome("a", true, &metrics, "ctx");
        // target 1.0: 0.8 + 0.15 * 0.2
        assert!((after - 0.83).abs() < 1e-12);
        assert_eq!(ledger.history("a").unwrap().len(), 1);
    }

    #[test]
    fn test_failure_never_raises() {
        let mut ledger = ledger();
        let metrics = OutcomeMetrics::new(1.0, 1.0, 3.0);
        let after = ledger.record_outcome("a", false, &metrics, "ctx");
        assert!(after < 0.8);

        let mut low = EffectivenessLedger::from_parts(
            LearningConfig::default(),
            BTreeMap::from([(
                "b".to_string(),
                UnitRecord {
                    effectiveness: 0.1,
                    history: VecDeque::new(),
                },
            )]),
            BTreeMap::new(),
        );
        let after = low.record_outcome("b", false, &metrics, "ctx");
        assert!(after <= 0.1);
    }

    #[test]
    fn test_scores_stay_bounded() {
        let mut ledger = ledger();
        let inputs = [
            (true, Some(50.0), Some(-3.0), Some(f64::INFINITY)),
            (false, None, None, None),
            (true, Some(f64::NAN), Some(1e9), Some(1e9)),
        ];
        for _ in 0..200 {
            for (success, c, a, g) in inputs {
                let metrics = OutcomeMetrics::from_raw(&RawOutcomeMetrics {
                    task_completion: c,
                    accuracy: a,
                    efficiency_gain: g,
                });
                let score = ledger.record_outcome("a", success, &metrics, "");
                assert!((0.0..=1.0).contains(&score));
            }
        }
    }

    #[test]
    fn test_history_bounded() {
        let mut config = LearningConfig::default();
        config.history_limit = 3;
        let mut ledger = EffectivenessLedger::new(config);
        let metrics = OutcomeMetrics::new(0.5, 0.5, 1.0);
        for i in 0..10 {
            ledger.record_outcome("a", true, &metrics, &format!("run {}", i));
        }
        let history = ledger.history("a").unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.back().unwrap().context, "run 9");
        assert_eq!(ledger.stats().total_adaptations, 3);
    }

    #[test]
    fn test_breakthrough_boost() {
        let mut ledger = ledger();
        ledger.record_breakthrough(&["a".to_string(), "b".to_string()], 1.0, "");
        assert!((ledger.get_effectiveness("a") - 0.95).abs() < 1e-12);
        assert!((ledger.get_effectiveness("b") - 0.95).abs() < 1e-12);

        ledger.record_breakthrough(&["a".to_string()], 1.0, "again");
        assert_eq!(ledger.get_effectiveness("a"), 1.0);
        assert_eq!(ledger.history("a").unwrap().back().unwrap().context, "again");
    }

    #[test]
    fn test_calibrate_confidence() {
        let mut ledger = ledger();
        assert_eq!(ledger.get_confidence("a"), 0.5);

        // 50% deviation lowers confidence by 10%
        let calibrated = ledger.calibrate_confidence("a", 0.8, 0.4);
        assert!((calibrated - 0.45).abs() < 1e-12);

        for _ in 0..100 {
            ledger.calibrate_confidence("a", 0.8, 0.0);
        }
        assert_eq!(ledger.get_confidence("a"), 0.1);
    }

    #[test]
    fn test_stats() {
        let mut ledger = ledger();
        let metrics = OutcomeMetrics::new(1.0, 1.0, 3.0);
        ledger.record_outcome("a", true, &metrics, "");
        ledger.record_outcome("b", true, &metrics, "");
        let stats = ledger.stats();
        assert_eq!(stats.total_units, 2);
        assert_eq!(stats.total_adaptations, 2);
        assert!((stats.average_effectiveness - 0.83).abs() < 1e-12);
        assert!(stats.last_update.is_some());
    }
}
