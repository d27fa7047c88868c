//! Adaptive engine
//!
//! The explicitly constructed owner of the index, the learned state and the
//! scorer. Every query and mutation of the engine goes through here; nothing
//! is process-global, so tests create as many isolated engines as they need.
//!
//! All learning mutations take one write lock. Saving copies the state under
//! a read lock and writes outside it, so composition never waits on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::breakthrough::{BreakthroughAnalysis, BreakthroughLevel, BreakthroughScorer};
use crate::catalog::{Catalog, CatalogIssue};
use crate::composition::{ComposedAgent, ScoredUnit, SynergyComposer, TraitIndex};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::learning::snapshot::{read_snapshot, write_snapshot, write_snapshot_with_retry};
use crate::learning::{
    EmergentCombination, EnhancedOutcome, LearningState, LearningView, LoadOutcome,
    RelationshipEdge,
};
use crate::synthesis::{self, Perspective, SynthesisReport};
use crate::types::{canonical_names, CapabilityUnit, OutcomeMetrics};

/// Weight of context match in `get_optimal_combination`
const CONTEXT_MATCH_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Indexed units plus units with learned state
    pub total_units: usize,
    pub average_effectiveness: f64,
    pub total_adaptations: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub relationships: usize,
    pub emergent_combinations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionRecord {
    pub agent_id: Uuid,
    pub task: String,
    pub unit_count: usize,
    pub owner_count: usize,
    pub synergy_score: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositionAnalytics {
    pub total_compositions: usize,
    pub average_units: f64,
    pub average_owners: f64,
    pub average_synergy: f64,
}

/// Everything `process_outcome` did
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedOutcome {
    pub analysis: BreakthroughAnalysis,
    pub level: BreakthroughLevel,
    pub is_breakthrough: bool,
    pub learning: EnhancedOutcome,
}

pub struct AdaptiveEngine {
    config: EngineConfig,
    index: RwLock<TraitIndex>,
    composer: SynergyComposer,
    scorer: BreakthroughScorer,
    state: RwLock<LearningState>,
    history: Mutex<VecDeque<CompositionRecord>>,
    dirty: AtomicBool,
}

impl AdaptiveEngine {
    /// Validate `config` and take ownership of `index`.
    ///
    /// The index is switched to the engine's search settings, so a single
    /// trigger match keeps outranking expertise however the index was built.
    pub fn new(mut config: EngineConfig, mut index: TraitIndex) -> EngineResult<Self> {
        config.validate()?;
        index.reconfigure(config.search.clone());

        Ok(Self {
            composer: SynergyComposer::new(config.composition.clone()),
            scorer: BreakthroughScorer::new(config.breakthrough.clone()),
            state: RwLock::new(LearningState::new(config.learning.clone())),
            index: RwLock::new(index),
            history: Mutex::new(VecDeque::new()),
            dirty: AtomicBool::new(false),
            config,
        })
    }

    /// Engine with an index built from `catalog`
    pub fn from_catalog(mut config: EngineConfig, catalog: &Catalog) -> EngineResult<Self> {
        config.validate()?;
        let index = TraitIndex::from_catalog(config.search.clone(), catalog);
        Self::new(config, index)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scorer(&self) -> &BreakthroughScorer {
        &self.scorer
    }

    /// Hot reload of the catalog
    pub async fn reload_catalog(&self, catalog: &Catalog) -> Vec<CatalogIssue> {
        self.index.write().await.rebuild(catalog)
    }

    pub async fn search(&self, text: &str, max_results: usize) -> Vec<ScoredUnit> {
        self.index.read().await.search(text, max_results)
    }

    /// Indexed units of one catalog owner
    pub async fn units_by_owner(&self, owner: &str) -> Vec<CapabilityUnit> {
        self.index
            .read()
            .await
            .units_by_owner(owner)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn compose_agent(&self, task: &str, max_traits: usize) -> EngineResult<ComposedAgent> {
        let hints = self.state.read().await.graph.synergy_hints();
        let agent = {
            let index = self.index.read().await;
            self.composer.compose_agent(&index, task, max_traits, Some(&hints))?
        };

        let limit = self.config.composition.history_limit.max(1);
        let mut history = self.history.lock().await;
        history.push_back(CompositionRecord {
            agent_id: agent.id,
            task: agent.task.clone(),
            unit_count: agent.units.len(),
            owner_count: agent.owners_used.len(),
            synergy_score: agent.synergy_score,
            created_at: agent.created_at,
        });
        while history.len() > limit {
            history.pop_front();
        }

        Ok(agent)
    }

    pub async fn composition_analytics(&self) -> CompositionAnalytics {
        let history = self.history.lock().await;
        if history.is_empty() {
            return CompositionAnalytics::default();
        }
        let n = history.len() as f64;
        CompositionAnalytics {
            total_compositions: history.len(),
            average_units: history.iter().map(|r| r.unit_count as f64).sum::<f64>() / n,
            average_owners: history.iter().map(|r| r.owner_count as f64).sum::<f64>() / n,
            average_synergy: history.iter().map(|r| r.synergy_score).sum::<f64>() / n,
        }
    }

    pub async fn record_outcome(
        &self,
        name: &str,
        success: bool,
        metrics: &OutcomeMetrics,
        context: &str,
    ) -> f64 {
        let score = self
            .state
            .write()
            .await
            .record_outcome(name, success, metrics, context);
        self.mark_dirty();
        score
    }

    pub async fn record_enhanced_outcome(
        &self,
        names: &[String],
        success: bool,
        metrics: &OutcomeMetrics,
        context: &str,
    ) -> EnhancedOutcome {
        let outcome = self
            .state
            .write()
            .await
            .record_enhanced_outcome(names, success, metrics, context);
        self.mark_dirty();
        outcome
    }

    pub async fn record_breakthrough(&self, names: &[String], significance: f64, context: &str) {
        self.state
            .write()
            .await
            .ledger
            .record_breakthrough(names, significance, context);
        self.mark_dirty();
    }

    /// Score an outcome without changing any learned state
    pub async fn analyze(
        &self,
        metrics: &OutcomeMetrics,
        context: &str,
        units: &[String],
    ) -> BreakthroughAnalysis {
        let state = self.state.read().await;
        self.scorer.analyze(&*state, metrics, context, units)
    }

    /// Analyze, then learn from the outcome, then reinforce it if it was a
    /// successful breakthrough
    pub async fn process_outcome(
        &self,
        units: &[String],
        success: bool,
        metrics: &OutcomeMetrics,
        context: &str,
    ) -> ProcessedOutcome {
        let mut state = self.state.write().await;

        let analysis = self.scorer.analyze(&*state, metrics, context, units);
        let level = self.scorer.classify(&analysis);
        let is_breakthrough = self.scorer.is_breakthrough(&analysis);

        let learning = state.record_enhanced_outcome(units, success, metrics, context);

        if success && is_breakthrough {
            info!(
                "{} breakthrough ({:.1}%) for {}",
                level,
                analysis.composite_score * 100.0,
                units.join(", ")
            );
            let names = canonical_names(units);
            state
                .ledger
                .record_breakthrough(&names, analysis.significance, context);
        }
        drop(state);
        self.mark_dirty();

        ProcessedOutcome {
            analysis,
            level,
            is_breakthrough,
            learning,
        }
    }

    pub async fn get_effectiveness(&self, name: &str) -> f64 {
        self.state.read().await.ledger.get_effectiveness(name)
    }

    pub async fn get_all_scores(&self) -> BTreeMap<String, f64> {
        self.state.read().await.ledger.get_all_scores()
    }

    pub async fn get_relationship_strength(&self, a: &str, b: &str) -> Option<RelationshipEdge> {
        self.state
            .read()
            .await
            .graph
            .get_relationship_strength(a, b)
            .cloned()
    }

    pub async fn get_emergent_patterns(&self) -> BTreeMap<String, EmergentCombination> {
        self.state.read().await.graph.get_emergent_patterns().clone()
    }

    pub async fn calibrate_confidence(&self, name: &str, expected: f64, actual: f64) -> f64 {
        let confidence = self
            .state
            .write()
            .await
            .ledger
            .calibrate_confidence(name, expected, actual);
        self.mark_dirty();
        confidence
    }

    /// Best unit names for a set of context keywords.
    ///
    /// Each indexed unit is scored as effectiveness, boosted by how well it
    /// matches the keywords, times its confidence. The top `max` are then
    /// improved by the single swap that most raises the combination score.
    pub async fn get_optimal_combination(&self, context_keywords: &[String], max: usize) -> Vec<String> {
        if max == 0 {
            return Vec::new();
        }

        let index = self.index.read().await;
        let state = self.state.read().await;

        let keywords: Vec<String> = context_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        let mut scored: Vec<(String, f64)> = index
            .unit_names()
            .into_iter()
            .map(|name| {
                let context_match = context_match(&index, &name, &keywords);
                let score = state.ledger.get_effectiveness(&name)
                    * (1.0 + context_match * CONTEXT_MATCH_WEIGHT)
                    * state.ledger.get_confidence(&name);
                (name, score)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(CmpOrdering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let all: Vec<String> = scored.iter().map(|(name, _)| name.clone()).collect();
        let top: Vec<String> = all.iter().take(max).cloned().collect();
        if top.len() < 2 {
            return top;
        }

        let mut best = top.clone();
        let mut best_score = combination_score(&state, &top);
        for alternative in &all {
            if top.contains(alternative) {
                continue;
            }
            for i in 0..top.len() {
                let mut candidate = top.clone();
                candidate[i] = alternative.clone();
                let score = combination_score(&state, &candidate);
                if score > best_score {
                    best_score = score;
                    best = candidate;
                }
            }
        }

        if best != top {
            debug!("Swapped into better combination: {}", best.join("+"));
        }
        best
    }

    /// Fan out one perspective per unit plus any extra perspectives
    pub async fn synthesize(
        &self,
        agent: ComposedAgent,
        extra: Vec<Arc<dyn Perspective>>,
        timeout: Option<Duration>,
    ) -> SynthesisReport {
        let mut perspectives = {
            let state = self.state.read().await;
            synthesis::unit_perspectives(&agent, &*state)
        };
        perspectives.extend(extra);
        synthesis::synthesize(Arc::new(agent), perspectives, timeout).await
    }

    pub async fn get_stats(&self) -> EngineStats {
        let index = self.index.read().await;
        let state = self.state.read().await;
        let ledger_stats = state.ledger.stats();

        let mut names: BTreeSet<String> = index.unit_names().into_iter().collect();
        names.extend(state.ledger.records().keys().cloned());

        let average_effectiveness = if names.is_empty() {
            0.0
        } else {
            names.iter().map(|n| state.ledger.get_effectiveness(n)).sum::<f64>() / names.len() as f64
        };

        EngineStats {
            total_units: names.len(),
            average_effectiveness,
            total_adaptations: ledger_stats.total_adaptations,
            last_update: ledger_stats.last_update,
            relationships: state.graph.edges().len(),
            emergent_combinations: state.graph.get_emergent_patterns().len(),
        }
    }

    /// Replace learned state with the snapshot at `path`.
    ///
    /// A missing or unreadable snapshot leaves the engine with empty state.
    pub async fn load(&self, path: &Path) -> LoadOutcome {
        let learning = self.config.learning.clone();
        let (state, outcome) = match read_snapshot(path).await {
            Ok(Some(snapshot)) => {
                info!(
                    "Loaded learning snapshot from {} ({} units)",
                    path.display(),
                    snapshot.units.len()
                );
                (LearningState::from_snapshot(learning, snapshot), LoadOutcome::Loaded)
            }
            Ok(None) => {
                debug!("No snapshot at {}, starting empty", path.display());
                (LearningState::new(learning), LoadOutcome::Missing)
            }
            Err(EngineError::CorruptSnapshot { reason, .. }) => {
                warn!("Corrupt snapshot at {}: {}; starting empty", path.display(), reason);
                (LearningState::new(learning), LoadOutcome::Corrupt(reason))
            }
            Err(e) => {
                warn!("Failed to read snapshot at {}: {}; starting empty", path.display(), e);
                (LearningState::new(learning), LoadOutcome::Corrupt(e.to_string()))
            }
        };

        *self.state.write().await = state;
        self.dirty.store(false, Ordering::SeqCst);
        outcome
    }

    pub async fn save(&self, path: &Path) -> EngineResult<()> {
        self.dirty.store(false, Ordering::SeqCst);
        let snapshot = self.state.read().await.snapshot();
        let result = write_snapshot(path, &snapshot).await;
        if result.is_err() {
            self.mark_dirty();
        }
        result
    }

    pub async fn save_with_retry(&self, path: &Path) -> EngineResult<()> {
        self.dirty.store(false, Ordering::SeqCst);
        let snapshot = self.state.read().await.snapshot();
        let result =
            write_snapshot_with_retry(path, &snapshot, self.config.persistence.save_retries).await;
        if result.is_err() {
            self.mark_dirty();
        }
        result
    }

    /// Periodically save when there are unsaved changes.
    ///
    /// Returns `None` when autosave is disabled in config.
    pub fn spawn_autosave(self: &Arc<Self>, path: PathBuf) -> Option<JoinHandle<()>> {
        let secs = self.config.persistence.autosave_secs;
        if secs == 0 {
            return None;
        }

        let engine = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(secs));
            interval.tick().await;
            loop {
                interval.tick().await;
                if !engine.is_dirty() {
                    continue;
                }
                if let Err(e) = engine.save_with_retry(&path).await {
                    warn!("Autosave to {} failed: {}", path.display(), e);
                }
            }
        }))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }
}

fn context_match(index: &TraitIndex, name: &str, keywords: &[String]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let unit = index.get_best_source(name);
    let lower_name = name.to_lowercase();

    let mut matches = 0.0;
    for keyword in keywords {
        if let Some(unit) = unit {
            let hit = unit
                .triggers
                .iter()
                .chain(unit.domains.iter())
                .any(|t| t.contains(keyword.as_str()));
            if hit {
                matches += 1.0;
            }
        }
        if lower_name.contains(keyword.as_str()) {
            matches += 0.5;
        }
    }
    (matches / keywords.len() as f64).min(1.0)
}

/// Sum of effectiveness, adjusted by every known pair's multiplier and interference
fn combination_score(state: &LearningState, names: &[String]) -> f64 {
    let mut score: f64 = names.iter().map(|n| state.effectiveness(n)).sum();
    for (i, a) in names.iter().enumerate() {
        for b in &names[i + 1..] {
            if let Some(edge) = state.graph.get_relationship_strength(a, b) {
                score *= edge.synergy_multiplier;
                score -= edge.interference_penalty;
            }
        }
    }
    score
}
