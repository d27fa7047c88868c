//! Breakthrough scorer
//!
//! Scores a single outcome on four independent axes (significance, novelty,
//! impact, reproducibility) and blends them into a composite score. Scoring
//! only reads learned state; reinforcing a breakthrough is up to the caller.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::BreakthroughConfig;
use crate::learning::state::is_known_combination;
use crate::learning::LearningView;
use crate::types::{canonical_names, OutcomeMetrics};

/// Context phrases at which context novelty saturates
const NOVELTY_SATURATION: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakthroughAnalysis {
    pub significance: f64,
    pub novelty: f64,
    pub impact: f64,
    pub reproducibility: f64,
    pub composite_score: f64,
    /// Units involved, in the order given
    pub patterns_triggered: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BreakthroughLevel {
    Minor,
    Moderate,
    Significant,
    Major,
    Revolutionary,
}

impl BreakthroughLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Self::Revolutionary
        } else if score >= 0.8 {
            Self::Major
        } else if score >= 0.7 {
            Self::Significant
        } else if score >= 0.6 {
            Self::Moderate
        } else {
            Self::Minor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minor => "Minor",
            Self::Moderate => "Moderate",
            Self::Significant => "Significant",
            Self::Major => "Major",
            Self::Revolutionary => "Revolutionary",
        }
    }
}

impl fmt::Display for BreakthroughLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct BreakthroughScorer {
    config: BreakthroughConfig,
}

impl BreakthroughScorer {
    pub fn new(config: BreakthroughConfig) -> Self {
        Self { config }
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    pub fn analyze<V: LearningView + ?Sized>(
        &self,
        view: &V,
        metrics: &OutcomeMetrics,
        context: &str,
        units: &[String],
    ) -> BreakthroughAnalysis {
        let context = context.to_lowercase();

        let significance = self.significance(metrics);
        let novelty = self.novelty(view, &context, units);
        let impact = self.impact(metrics, &context);
        let reproducibility = self.reproducibility(view, metrics, units);

        let composite_score =
            0.3 * significance + 0.2 * novelty + 0.35 * impact + 0.15 * reproducibility;

        BreakthroughAnalysis {
            significance,
            novelty,
            impact,
            reproducibility,
            composite_score,
            patterns_triggered: units.to_vec(),
        }
    }

    fn significance(&self, metrics: &OutcomeMetrics) -> f64 {
        let base = 0.3 * metrics.task_completion()
            + 0.4 * metrics.accuracy()
            + 0.3 * metrics.normalized_gain();
        let bonus = if metrics.efficiency_gain() > 2.0 { 0.1 } else { 0.0 };
        (base + bonus).min(1.0)
    }

    fn novelty<V: LearningView + ?Sized>(&self, view: &V, context: &str, units: &[String]) -> f64 {
        let phrases = count_phrases(&self.config.novelty_indicators, context);
        let context_novelty = (phrases as f64 / NOVELTY_SATURATION).min(1.0);

        let distinct = canonical_names(units).len();
        let combination_novelty = (distinct.saturating_sub(1) as f64 / 3.0).min(1.0);

        let unseen_bonus = if is_known_combination(view, units) {
            0.0
        } else {
            0.3
        };

        (0.4 * context_novelty + 0.3 * combination_novelty + 0.3 * unseen_bonus).min(1.0)
    }

    fn impact(&self, metrics: &OutcomeMetrics, context: &str) -> f64 {
        let base = (metrics.task_completion() + metrics.accuracy()) / 2.0;
        let efficiency_impact = ((metrics.efficiency_gain() - 1.0) / 2.0).min(1.0);
        let phrases = count_phrases(&self.config.impact_indicators, context);
        let context_multiplier = 1.0 + 0.15 * phrases as f64;

        (base * (1.0 + efficiency_impact) * context_multiplier).clamp(0.0, 1.0)
    }

    fn reproducibility<V: LearningView + ?Sized>(
        &self,
        view: &V,
        metrics: &OutcomeMetrics,
        units: &[String],
    ) -> f64 {
        let names = canonical_names(units);

        let complexity = (1.0 - 0.15 * names.len().saturating_sub(1) as f64).max(0.3);

        let mean_effectiveness = if names.is_empty() {
            0.0
        } else {
            names.iter().map(|n| view.effectiveness(n)).sum::<f64>() / names.len() as f64
        };

        let accuracy_bonus = if metrics.accuracy() > 0.9 { 0.2 } else { 0.0 };

        let proven_pair = names.iter().enumerate().any(|(i, a)| {
            names[i + 1..]
                .iter()
                .any(|b| view.co_activation_count(a, b) > 3)
        });
        let pair_bonus = if proven_pair { 0.15 } else { 0.0 };

        (0.3 * complexity + 0.4 * mean_effectiveness + 0.15 * accuracy_bonus + 0.15 * pair_bonus)
            .min(1.0)
    }

    /// Composite score at or above the configured threshold
    pub fn is_breakthrough(&self, analysis: &BreakthroughAnalysis) -> bool {
        is_breakthrough(analysis, self.config.threshold)
    }

    pub fn classify(&self, analysis: &BreakthroughAnalysis) -> BreakthroughLevel {
        BreakthroughLevel::from_score(analysis.composite_score)
    }

    /// Human-readable summary of an analysis
    pub fn generate_report(&self, analysis: &BreakthroughAnalysis) -> String {
        let level = self.classify(analysis);
        let stars = "*".repeat((analysis.composite_score * 5.0).ceil().max(0.0) as usize);
        let pct = |v: f64| format!("{:.1}%", v * 100.0);

        let mut report = format!("{} breakthrough {}\n", level, stars);
        report.push_str(&format!("  Composite score:  {}\n", pct(analysis.composite_score)));
        report.push_str(&format!("  Significance:     {}\n", pct(analysis.significance)));
        report.push_str(&format!("  Novelty:          {}\n", pct(analysis.novelty)));
        report.push_str(&format!("  Impact:           {}\n", pct(analysis.impact)));
        report.push_str(&format!("  Reproducibility:  {}\n", pct(analysis.reproducibility)));
        report.push_str(&format!(
            "  Units involved:   {}\n",
            if analysis.patterns_triggered.is_empty() {
                "(none)".to_string()
            } else {
                analysis.patterns_triggered.join(", ")
            }
        ));

        if analysis.novelty > 0.7 {
            report.push_str("  High novelty: possibly a new capability\n");
        }
        if analysis.impact > 0.8 {
            report.push_str("  High impact: significant value created\n");
        }
        if analysis.reproducibility > 0.8 {
            report.push_str("  High reproducibility: reliable combination\n");
        }
        report
    }
}

pub fn is_breakthrough(analysis: &BreakthroughAnalysis, threshold: f64) -> bool {
    analysis.composite_score >= threshold
}

fn count_phrases(phrases: &[String], context: &str) -> usize {
    phrases
        .iter()
        .filter(|p| !p.is_empty() && context.contains(p.to_lowercase().as_str()))
        .count()
}
