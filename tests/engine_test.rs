//! End-to-end tests for the adaptive engine

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

use synergy_engine::composition::{ScoredUnit, SynergyComposer};
use synergy_engine::config::CompositionConfig;
use synergy_engine::learning::snapshot::read_snapshot;
use synergy_engine::{
    AdaptiveEngine, BreakthroughLevel, CapabilityUnit, Catalog, CatalogLoader, ComposedAgent, EngineConfig,
    Insight, LoadOutcome, OutcomeMetrics, Perspective, RawOutcomeMetrics,
};

fn catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.insert("ui", "layout", json!({"triggers": ["layout", "grid"], "domains": ["css"], "expertise": 10}));
    catalog.insert("ui", "typography", json!({"triggers": ["font", "type"], "domains": ["css", "design"], "expertise": 99}));
    catalog.insert("ui", "color", json!({"triggers": ["color", "palette"], "domains": ["design"], "expertise": 75}));
    catalog.insert("backend", "schema", json!({"triggers": ["schema", "table"], "domains": ["sql"], "expertise": 85}));
    catalog.insert("backend", "cache", json!({"triggers": ["cache", "latency"], "domains": ["performance"], "expertise": 65}));
    catalog
}

fn engine() -> AdaptiveEngine {
    AdaptiveEngine::from_catalog(EngineConfig::default(), &catalog()).unwrap()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn scored(name: &str, owner: &str, domains: &[&str], expertise: f64, score: f64) -> ScoredUnit {
    ScoredUnit {
        unit: CapabilityUnit::new(name, owner, &[name], domains, expertise),
        score,
        matched_triggers: vec![name.to_string()],
    }
}

#[tokio::test]
async fn test_trigger_match_outranks_expertise() {
    let engine = engine();
    let results = engine.search("make the grid work", 10).await;

    assert_eq!(results[0].unit.name, "layout");
    assert_eq!(results[0].unit.expertise, 10.0);
    let layout_rank = results.iter().position(|r| r.unit.name == "layout");
    let typography_rank = results.iter().position(|r| r.unit.name == "typography");
    match typography_rank {
        Some(rank) => assert!(layout_rank < Some(rank)),
        None => assert!(layout_rank.is_some()),
    }
}

#[tokio::test]
async fn test_loaded_catalog_survives_bad_owner_and_short_triggers() {
    let catalog = CatalogLoader::from_json(
        r#"{
            "good": {"debugging": {"triggers": ["bug"], "expertise": 80}},
            "lang": {"c-lang": {"triggers": ["c"], "expertise": 90}},
            "bad": 5
        }"#,
    )
    .unwrap();
    let engine = AdaptiveEngine::from_catalog(EngineConfig::default(), &catalog).unwrap();

    let results = engine.search("fix the bug", 5).await;
    assert_eq!(results[0].unit.key(), "good:debugging");

    let results = engine.search("write it in c", 5).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].unit.key(), "lang:c-lang");
}

#[tokio::test]
async fn test_search_without_matches_is_empty() {
    let engine = engine();
    assert!(engine.search("quantum entanglement", 5).await.is_empty());
}

#[test]
fn test_select_optimal_mix_bounds() {
    let composer = SynergyComposer::new(CompositionConfig::default());
    let candidates = vec![
        scored("a", "o1", &["x"], 90.0, 2.9),
        scored("b", "o1", &["x", "y"], 60.0, 1.6),
        scored("c", "o2", &["z"], 80.0, 1.8),
        scored("d", "o2", &["y"], 40.0, 1.4),
    ];

    for n in 0..=6 {
        let selected = composer.select_optimal_mix(&candidates, n, None);
        assert!(selected.len() <= n);
        for unit in &selected {
            assert!(candidates.iter().any(|c| c.unit == *unit));
        }
        if n >= candidates.len() {
            assert_eq!(selected.len(), candidates.len());
        }
    }
}

#[tokio::test]
async fn test_effectiveness_stays_in_range() {
    let engine = engine();
    let raw_inputs = [
        RawOutcomeMetrics { task_completion: Some(5.0), accuracy: Some(-3.0), efficiency_gain: Some(1e9) },
        RawOutcomeMetrics { task_completion: Some(f64::NAN), accuracy: None, efficiency_gain: Some(f64::INFINITY) },
        RawOutcomeMetrics { task_completion: Some(-1.0), accuracy: Some(2.0), efficiency_gain: Some(-4.0) },
        RawOutcomeMetrics::default(),
    ];

    for round in 0..20 {
        let raw = &raw_inputs[round % raw_inputs.len()];
        let metrics = OutcomeMetrics::from_raw(raw);
        let score = engine
            .record_outcome("layout", round % 3 != 0, &metrics, "stress")
            .await;
        assert!((0.0..=1.0).contains(&score));
        let stored = engine.get_effectiveness("layout").await;
        assert!((0.0..=1.0).contains(&stored));
    }
}

#[tokio::test]
async fn test_relationship_strength_is_symmetric() {
    let engine = engine();
    let metrics = OutcomeMetrics::new(0.9, 0.9, 1.8);
    engine
        .record_enhanced_outcome(&names(&["layout", "color", "schema"]), true, &metrics, "dashboard")
        .await;
    engine
        .record_enhanced_outcome(&names(&["schema", "layout"]), false, &metrics, "migration")
        .await;

    for (a, b) in [("layout", "color"), ("layout", "schema"), ("color", "schema"), ("cache", "layout")] {
        assert_eq!(
            engine.get_relationship_strength(a, b).await,
            engine.get_relationship_strength(b, a).await
        );
    }
    assert!(engine.get_relationship_strength("cache", "layout").await.is_none());
    assert!(engine.get_relationship_strength("layout", "color").await.is_some());
}

#[tokio::test]
async fn test_emergent_combination_discovered_once() {
    let engine = engine();
    let metrics = OutcomeMetrics::new(1.0, 0.9, 3.2);

    engine
        .record_enhanced_outcome(&names(&["x", "y", "z"]), true, &metrics, "first")
        .await;
    let patterns = engine.get_emergent_patterns().await;
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns["x+y+z"].activation_frequency, 1);
    assert_eq!(patterns["x+y+z"].effectiveness, 3.2);

    engine
        .record_enhanced_outcome(&names(&["z", "x", "y"]), true, &metrics, "second")
        .await;
    let patterns = engine.get_emergent_patterns().await;
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns["x+y+z"].activation_frequency, 2);
}

#[tokio::test]
async fn test_exceptional_outcome_is_major_breakthrough() {
    let engine = engine();
    let analysis = engine
        .analyze(
            &OutcomeMetrics::new(1.0, 0.95, 10.0),
            "WAIT. WAIT. This is unprecedented.",
            &names(&["layout"]),
        )
        .await;

    assert!(analysis.composite_score > 0.8);
    assert!(matches!(
        engine.scorer().classify(&analysis),
        BreakthroughLevel::Major | BreakthroughLevel::Revolutionary
    ));
    assert!(engine.scorer().is_breakthrough(&analysis));
}

#[tokio::test]
async fn test_ordinary_outcome_is_not_breakthrough() {
    let engine = engine();
    let analysis = engine
        .analyze(
            &OutcomeMetrics::new(0.8, 0.85, 1.2),
            "refactored the settings page",
            &names(&["layout", "color"]),
        )
        .await;

    assert!(analysis.composite_score < 0.7);
    assert!(!engine.scorer().is_breakthrough(&analysis));
}

#[tokio::test]
async fn test_analyze_leaves_state_untouched() {
    let engine = engine();
    engine
        .analyze(&OutcomeMetrics::new(1.0, 1.0, 9.0), "", &names(&["layout", "color"]))
        .await;

    assert!(engine.get_all_scores().await.is_empty());
    assert!(engine.get_emergent_patterns().await.is_empty());
    assert!(!engine.is_dirty());
}

#[tokio::test]
async fn test_save_load_round_trip() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("first.json");
    let second = dir.path().join("second.json");

    let engine = engine();
    engine
        .record_enhanced_outcome(&names(&["layout", "color"]), true, &OutcomeMetrics::new(0.9, 0.8, 1.4), "landing page")
        .await;
    engine
        .record_enhanced_outcome(&names(&["schema", "cache", "layout"]), true, &OutcomeMetrics::new(1.0, 0.97, 3.1), "report")
        .await;
    engine
        .record_outcome("cache", false, &OutcomeMetrics::new(0.3, 0.4, 0.8), "timeout")
        .await;
    engine.calibrate_confidence("cache", 0.9, 0.2).await;
    engine.save(&first).await.unwrap();

    let restored = AdaptiveEngine::from_catalog(EngineConfig::default(), &catalog()).unwrap();
    assert_eq!(restored.load(&first).await, LoadOutcome::Loaded);
    assert_eq!(restored.get_all_scores().await, engine.get_all_scores().await);
    assert_eq!(restored.get_emergent_patterns().await, engine.get_emergent_patterns().await);
    assert_eq!(
        restored.get_relationship_strength("cache", "schema").await,
        engine.get_relationship_strength("schema", "cache").await
    );
    assert_eq!(restored.get_stats().await, engine.get_stats().await);

    restored.save(&second).await.unwrap();
    let saved = read_snapshot(&first).await.unwrap().unwrap();
    let copy = read_snapshot(&second).await.unwrap().unwrap();
    assert_eq!(saved, copy);
}

#[tokio::test]
async fn test_missing_or_corrupt_snapshot_starts_empty() {
    let dir = tempdir().unwrap();
    let engine = engine();
    engine
        .record_outcome("layout", true, &OutcomeMetrics::new(1.0, 1.0, 2.0), "seed")
        .await;

    assert_eq!(engine.load(&dir.path().join("absent.json")).await, LoadOutcome::Missing);
    assert!(engine.get_all_scores().await.is_empty());

    let corrupt = dir.path().join("corrupt.json");
    std::fs::write(&corrupt, "{ not json").unwrap();
    assert!(matches!(engine.load(&corrupt).await, LoadOutcome::Corrupt(_)));
    assert!(engine.get_all_scores().await.is_empty());
    assert_eq!(engine.get_effectiveness("layout").await, 0.8);
}

struct Fixed {
    label: &'static str,
    fail: bool,
}

#[async_trait]
impl Perspective for Fixed {
    fn label(&self) -> String {
        self.label.to_string()
    }

    async fn evaluate(&self, agent: &ComposedAgent) -> anyhow::Result<Insight> {
        if self.fail {
            anyhow::bail!("{} is unavailable", self.label);
        }
        Ok(Insight {
            perspective: self.label.to_string(),
            summary: format!("{} reviewed {} units", self.label, agent.units.len()),
            confidence: 0.9,
        })
    }
}

#[tokio::test]
async fn test_fan_out_survives_one_failure() {
    let engine = engine();
    let agent = engine.compose_agent("nothing relevant", 3).await.unwrap();
    assert!(agent.is_empty());

    let perspectives: Vec<Arc<dyn Perspective>> = vec![
        Arc::new(Fixed { label: "design", fail: false }),
        Arc::new(Fixed { label: "data", fail: true }),
        Arc::new(Fixed { label: "perf", fail: false }),
    ];
    let report = engine.synthesize(agent, perspectives, None).await;

    let labels: Vec<&str> = report.insights.iter().map(|i| i.perspective.as_str()).collect();
    assert_eq!(labels, vec!["design", "perf"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].label, "data");
    assert!(report.failed[0].reason.contains("unavailable"));
    assert!((report.confidence - 0.6).abs() < 1e-9);
}

#[tokio::test]
async fn test_compose_then_learn_then_prefer() {
    let engine = engine();
    let agent = engine
        .compose_agent("grid layout with a color palette and font choices", 3)
        .await
        .unwrap();
    let mut selected = agent.unit_names();
    selected.sort();
    assert_eq!(selected, names(&["color", "layout", "typography"]));
    assert!(agent.confidence() <= 0.95);

    let processed = engine
        .process_outcome(
            &selected,
            true,
            &OutcomeMetrics::new(1.0, 0.95, 10.0),
            "WAIT. WAIT. unprecedented result",
        )
        .await;
    assert!(processed.is_breakthrough);
    assert!(engine.get_effectiveness("layout").await > 0.8);

    let stats = engine.get_stats().await;
    assert_eq!(stats.total_units, 5);
    assert!(stats.total_adaptations >= 3);
    assert!(stats.last_update.is_some());
}
