//! Shared types used across modules
//!
//! Capability units, validated outcome metrics, and the canonical keys used to
//! identify unit pairs and unit combinations.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Upper bound accepted for an efficiency gain; anything larger is treated as noise
pub const MAX_EFFICIENCY_GAIN: f64 = 100.0;

/// Efficiency gain at which the normalized gain saturates
pub const GAIN_SATURATION: f64 = 3.0;

/// A named, reusable capability loaded from the catalog.
///
/// Immutable once loaded; the engine never mutates units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityUnit {
    /// Unit name (unique within its owner)
    pub name: String,
    /// Owning catalog id
    pub owner: String,
    /// Lower-cased trigger keywords, de-duplicated in input order
    pub triggers: Vec<String>,
    /// Lower-cased knowledge domains, de-duplicated in input order
    pub domains: Vec<String>,
    /// Expertise rating (0-100)
    pub expertise: f64,
}

impl CapabilityUnit {
    pub fn new(
        name: impl Into<String>,
        owner: impl Into<String>,
        triggers: impl IntoIterator<Item = impl AsRef<str>>,
        domains: impl IntoIterator<Item = impl AsRef<str>>,
        expertise: f64,
    ) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            triggers: normalize_terms(triggers),
            domains: normalize_terms(domains),
            expertise: expertise.clamp(0.0, 100.0),
        }
    }

    /// Owner-qualified key, unique across the catalog
    pub fn key(&self) -> String {
        format!("{}:{}", self.owner, self.name)
    }

    /// Expertise scaled to [0, 1]
    pub fn expertise_fraction(&self) -> f64 {
        self.expertise / 100.0
    }
}

fn normalize_terms(terms: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for term in terms {
        let term = term.as_ref().trim().to_lowercase();
        if !term.is_empty() && !out.contains(&term) {
            out.push(term);
        }
    }
    out
}

/// Outcome metrics as they arrive at the ingestion boundary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOutcomeMetrics {
    #[serde(default)]
    pub task_completion: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub efficiency_gain: Option<f64>,
}

/// A metric field that had to be repaired during validation
#[derive(Debug, Clone, PartialEq)]
pub struct MetricIssue {
    pub field: &'static str,
    pub received: Option<f64>,
    pub applied: f64,
}

/// Validated outcome metrics.
///
/// Completion and accuracy are in [0, 1]; efficiency gain is a speed-up factor
/// in [0, `MAX_EFFICIENCY_GAIN`] where 1.0 means "no change".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawOutcomeMetrics")]
pub struct OutcomeMetrics {
    task_completion: f64,
    accuracy: f64,
    efficiency_gain: f64,
}

impl OutcomeMetrics {
    /// Build metrics, clamping out-of-range values with a warning
    pub fn new(task_completion: f64, accuracy: f64, efficiency_gain: f64) -> Self {
        Self::from_raw(&RawOutcomeMetrics {
            task_completion: Some(task_completion),
            accuracy: Some(accuracy),
            efficiency_gain: Some(efficiency_gain),
        })
    }

    /// Validate raw metrics, logging every repaired field
    pub fn from_raw(raw: &RawOutcomeMetrics) -> Self {
        let (metrics, issues) = Self::validate(raw);
        for issue in &issues {
            warn!(
                "Invalid metric '{}' ({:?}), using {}",
                issue.field, issue.received, issue.applied
            );
        }
        metrics
    }

    /// Validate raw metrics and report what was repaired
    pub fn validate(raw: &RawOutcomeMetrics) -> (Self, Vec<MetricIssue>) {
        let mut issues = Vec::new();

        let task_completion = unit_interval("task_completion", raw.task_completion, 0.0, &mut issues);
        let accuracy = unit_interval("accuracy", raw.accuracy, 0.0, &mut issues);

        let efficiency_gain = match raw.efficiency_gain {
            Some(v) if v.is_finite() && (0.0..=MAX_EFFICIENCY_GAIN).contains(&v) => v,
            Some(v) if v.is_finite() => {
                let applied = v.clamp(0.0, MAX_EFFICIENCY_GAIN);
                issues.push(MetricIssue { field: "efficiency_gain", received: Some(v), applied });
                applied
            }
            other => {
                issues.push(MetricIssue { field: "efficiency_gain", received: other, applied: 1.0 });
                1.0
            }
        };

        (
            Self {
                task_completion,
                accuracy,
                efficiency_gain,
            },
            issues,
        )
    }

    pub fn task_completion(&self) -> f64 {
        self.task_completion
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    pub fn efficiency_gain(&self) -> f64 {
        self.efficiency_gain
    }

    /// Efficiency gain scaled to [0, 1], saturating at `GAIN_SATURATION`
    pub fn normalized_gain(&self) -> f64 {
        self.efficiency_gain.min(GAIN_SATURATION) / GAIN_SATURATION
    }

    /// Blend of completion, accuracy and normalized gain, in [0, 1]
    pub fn observed_quality(&self) -> f64 {
        (0.4 * self.task_completion + 0.4 * self.accuracy + 0.2 * self.normalized_gain())
            .clamp(0.0, 1.0)
    }
}

impl From<OutcomeMetrics> for RawOutcomeMetrics {
    fn from(metrics: OutcomeMetrics) -> Self {
        Self {
            task_completion: Some(metrics.task_completion),
            accuracy: Some(metrics.accuracy),
            efficiency_gain: Some(metrics.efficiency_gain),
        }
    }
}

impl From<RawOutcomeMetrics> for OutcomeMetrics {
    fn from(raw: RawOutcomeMetrics) -> Self {
        Self::from_raw(&raw)
    }
}

fn unit_interval(
    field: &'static str,
    value: Option<f64>,
    fallback: f64,
    issues: &mut Vec<MetricIssue>,
) -> f64 {
    match value {
        Some(v) if v.is_finite() && (0.0..=1.0).contains(&v) => v,
        Some(v) if v.is_finite() => {
            let applied = v.clamp(0.0, 1.0);
            issues.push(MetricIssue { field, received: Some(v), applied });
            applied
        }
        other => {
            issues.push(MetricIssue { field, received: other, applied: fallback });
            fallback
        }
    }
}

/// Unordered pair of unit names, stored in sorted order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub first: String,
    pub second: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self { first: a.to_string(), second: b.to_string() }
        } else {
            Self { first: b.to_string(), second: a.to_string() }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.first == name || self.second == name
    }
}

/// Sorted, de-duplicated unit names
pub fn canonical_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut sorted: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
    sorted.sort();
    sorted.dedup();
    sorted
}

/// Canonical key of a unit combination: sorted, de-duplicated, '+'-joined
pub fn combination_key<S: AsRef<str>>(names: &[S]) -> String {
    canonical_names(names).join("+")
}
