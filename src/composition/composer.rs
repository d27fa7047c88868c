//! Synergy composer
//!
//! Picks a bounded, synergy-maximizing subset of ranked candidates and wraps it
//! in a [`ComposedAgent`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};
use uuid::Uuid;

use super::index::{ScoredUnit, TraitIndex};
use crate::config::CompositionConfig;
use crate::error::{EngineError, EngineResult};
use crate::types::{CapabilityUnit, PairKey};

/// Learned synergy multipliers by unit pair
pub type SynergyHints = HashMap<PairKey, f64>;

/// A set of units selected for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedAgent {
    pub id: Uuid,
    pub task: String,
    pub units: Vec<CapabilityUnit>,
    pub knowledge_domains: BTreeSet<String>,
    /// Owners in order of first use
    pub owners_used: Vec<String>,
    pub synergy_score: f64,
    pub optimization_score: f64,
    pub created_at: DateTime<Utc>,
}

impl ComposedAgent {
    /// Fallback agent with no units
    pub fn empty(task: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.to_string(),
            units: Vec::new(),
            knowledge_domains: BTreeSet::new(),
            owners_used: Vec::new(),
            synergy_score: 0.0,
            optimization_score: 0.0,
            created_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn unit_names(&self) -> Vec<String> {
        self.units.iter().map(|u| u.name.clone()).collect()
    }

    /// Mean expertise of the selected units (0-100)
    pub fn average_expertise(&self) -> f64 {
        if self.units.is_empty() {
            return 0.0;
        }
        self.units.iter().map(|u| u.expertise).sum::<f64>() / self.units.len() as f64
    }

    pub fn confidence(&self) -> f64 {
        if self.units.is_empty() {
            return 0.3;
        }
        (self.average_expertise() / 100.0 * 0.7 + self.synergy_score * 0.3).min(0.95)
    }
}

/// Selects synergistic unit sets
#[derive(Debug, Clone, Default)]
pub struct SynergyComposer {
    config: CompositionConfig,
}

impl SynergyComposer {
    pub fn new(config: CompositionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompositionConfig {
        &self.config
    }

    /// Synergy of two units in [0, 1]
    pub fn calculate_pair_synergy(
        &self,
        a: &CapabilityUnit,
        b: &CapabilityUnit,
        hints: Option<&SynergyHints>,
    ) -> f64 {
        let mut synergy = 0.0;

        if a.owner == b.owner {
            synergy += self.config.same_owner_bonus;
        }

        synergy += self.config.domain_overlap_weight * jaccard(&a.domains, &b.domains);

        if let Some(multiplier) = hints.and_then(|h| h.get(&PairKey::new(&a.name, &b.name))) {
            synergy += self.config.learned_synergy_weight * (multiplier - 1.0).clamp(0.0, 1.0);
        }

        synergy.clamp(0.0, 1.0)
    }

    /// Mean pairwise synergy; 0 for fewer than two units
    pub fn calculate_overall_synergy(
        &self,
        units: &[CapabilityUnit],
        hints: Option<&SynergyHints>,
    ) -> f64 {
        let mut total = 0.0;
        let mut pairs = 0usize;
        for (i, a) in units.iter().enumerate() {
            for b in &units[i + 1..] {
                total += self.calculate_pair_synergy(a, b, hints);
                pairs += 1;
            }
        }
        if pairs == 0 {
            0.0
        } else {
            total / pairs as f64
        }
    }

    /// Greedy selection of at most `max_count` candidates.
    ///
    /// Starts from the best-scoring candidate, then repeatedly adds the one with the
    /// highest normalized score plus mean synergy with the current selection. Ties go
    /// to the earlier candidate, so identical input yields identical output.
    pub fn select_optimal_mix(
        &self,
        candidates: &[ScoredUnit],
        max_count: usize,
        hints: Option<&SynergyHints>,
    ) -> Vec<CapabilityUnit> {
        if candidates.is_empty() || max_count == 0 {
            return Vec::new();
        }
        if max_count >= candidates.len() {
            return candidates.iter().map(|c| c.unit.clone()).collect();
        }

        let max_score = candidates
            .iter()
            .map(|c| c.score)
            .fold(f64::NEG_INFINITY, f64::max);
        let normalized = |score: f64| if max_score > 0.0 { score / max_score } else { 0.0 };

        let mut remaining: Vec<usize> = (0..candidates.len()).collect();
        let mut selected: Vec<CapabilityUnit> = Vec::with_capacity(max_count);

        let mut first = 0;
        for (pos, &idx) in remaining.iter().enumerate() {
            if candidates[idx].score > candidates[remaining[first]].score {
                first = pos;
            }
        }
        selected.push(candidates[remaining.remove(first)].unit.clone());

        while selected.len() < max_count && !remaining.is_empty() {
            let mut best: Option<(usize, f64)> = None;
            for (pos, &idx) in remaining.iter().enumerate() {
                let candidate = &candidates[idx];
                let synergy = selected
                    .iter()
                    .map(|s| self.calculate_pair_synergy(&candidate.unit, s, hints))
                    .sum::<f64>()
                    / selected.len() as f64;
                let gain = normalized(candidate.score) + synergy;
                if best.map_or(true, |(_, g)| gain > g) {
                    best = Some((pos, gain));
                }
            }

            match best {
                Some((pos, gain)) if gain > 0.0 => {
                    selected.push(candidates[remaining.remove(pos)].unit.clone());
                }
                _ => break,
            }
        }

        debug!(
            "Selected {} of {} candidates",
            selected.len(),
            candidates.len()
        );
        selected
    }

    /// Search, select and wrap the result.
    ///
    /// Fails only when the index was never built; a request matching nothing
    /// yields [`ComposedAgent::empty`].
    pub fn compose_agent(
        &self,
        index: &TraitIndex,
        task: &str,
        max_traits: usize,
        hints: Option<&SynergyHints>,
    ) -> EngineResult<ComposedAgent> {
        if !index.is_built() {
            return Err(EngineError::IndexNotBuilt);
        }

        let max_traits = if max_traits == 0 {
            self.config.default_max_traits
        } else {
            max_traits
        };
        let candidates = index.search(task, max_traits * self.config.candidate_multiplier);
        if candidates.is_empty() {
            info!("No units matched task, returning empty agent");
            return Ok(ComposedAgent::empty(task));
        }

        let units = self.select_optimal_mix(&candidates, max_traits, hints);
        Ok(self.build_agent(task, units, hints))
    }

    /// Wrap an explicit unit set
    pub fn build_agent(
        &self,
        task: &str,
        units: Vec<CapabilityUnit>,
        hints: Option<&SynergyHints>,
    ) -> ComposedAgent {
        if units.is_empty() {
            return ComposedAgent::empty(task);
        }

        let synergy_score = self.calculate_overall_synergy(&units, hints);

        let mut knowledge_domains = BTreeSet::new();
        let mut owners_used: Vec<String> = Vec::new();
        for unit in &units {
            knowledge_domains.extend(unit.domains.iter().cloned());
            if !owners_used.contains(&unit.owner) {
                owners_used.push(unit.owner.clone());
            }
        }

        let mut agent = ComposedAgent {
            id: Uuid::new_v4(),
            task: task.to_string(),
            units,
            knowledge_domains,
            owners_used,
            synergy_score,
            optimization_score: 0.0,
            created_at: Utc::now(),
        };
        agent.optimization_score = (self.config.expertise_blend * agent.average_expertise() / 100.0
            + self.config.synergy_blend * synergy_score)
            .clamp(0.0, 1.0);

        info!(
            "Composed agent {} with {} units from {} owners (synergy {:.2})",
            agent.id,
            agent.units.len(),
            agent.owners_used.len(),
            agent.synergy_score
        );
        agent
    }
}

fn jaccard(a: &[String], b: &[String]) -> f64 {
    let a: BTreeSet<&String> = a.iter().collect();
    let b: BTreeSet<&String> = b.iter().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}
