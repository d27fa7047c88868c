//! Configuration management
//!
//! Every tunable constant of the engine lives here: search weights, composition
//! blends, learning rates, breakthrough indicators and persistence settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Trigger search settings
    #[serde(default)]
    pub search: SearchConfig,
    /// Unit selection and synergy settings
    #[serde(default)]
    pub composition: CompositionConfig,
    /// Outcome learning settings
    #[serde(default)]
    pub learning: LearningConfig,
    /// Breakthrough scoring settings
    #[serde(default)]
    pub breakthrough: BreakthroughConfig,
    /// Snapshot and catalog locations
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Score added per matched trigger
    #[serde(default = "default_trigger_weight")]
    pub trigger_weight: f64,
    /// Weight of expertise (0-100 scaled to 0-1); must stay below `trigger_weight`
    #[serde(default = "default_expertise_weight")]
    pub expertise_weight: f64,
    /// Tokens shorter than this are ignored, except in triggers made only of such tokens
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
}

fn default_trigger_weight() -> f64 {
    1.0
}

fn default_expertise_weight() -> f64 {
    0.5
}

fn default_min_token_len() -> usize {
    2
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            trigger_weight: default_trigger_weight(),
            expertise_weight: default_expertise_weight(),
            min_token_len: default_min_token_len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionConfig {
    /// Pair synergy bonus when both units share an owner
    #[serde(default = "default_same_owner_bonus")]
    pub same_owner_bonus: f64,
    /// Weight of domain overlap (Jaccard) in pair synergy
    #[serde(default = "default_domain_overlap_weight")]
    pub domain_overlap_weight: f64,
    /// Weight of learned synergy multipliers in pair synergy
    #[serde(default = "default_learned_synergy_weight")]
    pub learned_synergy_weight: f64,
    /// Share of average expertise in the optimization score
    #[serde(default = "default_expertise_blend")]
    pub expertise_blend: f64,
    /// Share of synergy in the optimization score
    #[serde(default = "default_synergy_blend")]
    pub synergy_blend: f64,
    /// Units per composed agent when the caller gives no limit
    #[serde(default = "default_max_traits")]
    pub default_max_traits: usize,
    /// Search results fetched per requested unit
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    /// Compositions kept for analytics
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_same_owner_bonus() -> f64 {
    0.3
}

fn default_domain_overlap_weight() -> f64 {
    0.5
}

fn default_learned_synergy_weight() -> f64 {
    0.2
}

fn default_expertise_blend() -> f64 {
    0.7
}

fn default_synergy_blend() -> f64 {
    0.3
}

fn default_max_traits() -> usize {
    5
}

fn default_candidate_multiplier() -> usize {
    3
}

fn default_history_limit() -> usize {
    100
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            same_owner_bonus: default_same_owner_bonus(),
            domain_overlap_weight: default_domain_overlap_weight(),
            learned_synergy_weight: default_learned_synergy_weight(),
            expertise_blend: default_expertise_blend(),
            synergy_blend: default_synergy_blend(),
            default_max_traits: default_max_traits(),
            candidate_multiplier: default_candidate_multiplier(),
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Fraction of the gap to the target closed per outcome
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Effectiveness of a unit before its first outcome
    #[serde(default = "default_effectiveness")]
    pub default_effectiveness: f64,
    /// Efficiency gain a joint outcome must exceed to found an emergent combination
    #[serde(default = "default_discovery_threshold")]
    pub discovery_threshold: f64,
    /// Weight of a new observation when reinforcing an emergent combination
    #[serde(default = "default_emergent_blend")]
    pub emergent_blend: f64,
    /// Efficiency gain a joint outcome must exceed to reinforce an existing combination
    #[serde(default = "default_reinforcement_min_gain")]
    pub reinforcement_min_gain: f64,
    /// Weight of a new observation in the running synergy multiplier
    #[serde(default = "default_synergy_smoothing")]
    pub synergy_smoothing: f64,
    /// Upper bound for a pair's synergy multiplier
    #[serde(default = "default_max_synergy_multiplier")]
    pub max_synergy_multiplier: f64,
    /// Nudge applied to pair strength per co-activation
    #[serde(default = "default_relationship_nudge")]
    pub relationship_nudge: f64,
    /// Interference added to a pair per failed co-activation
    #[serde(default = "default_interference_step")]
    pub interference_step: f64,
    /// Adaptation events kept per unit
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Effectiveness boost per unit of breakthrough significance
    #[serde(default = "default_breakthrough_boost")]
    pub breakthrough_boost: f64,
    /// Confidence of a unit before any calibration
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,
}

fn default_learning_rate() -> f64 {
    0.15
}

fn default_effectiveness() -> f64 {
    0.8
}

fn default_discovery_threshold() -> f64 {
    2.5
}

fn default_emergent_blend() -> f64 {
    0.3
}

fn default_reinforcement_min_gain() -> f64 {
    1.5
}

fn default_synergy_smoothing() -> f64 {
    0.3
}

fn default_max_synergy_multiplier() -> f64 {
    5.0
}

fn default_relationship_nudge() -> f64 {
    0.15
}

fn default_interference_step() -> f64 {
    0.05
}

fn default_breakthrough_boost() -> f64 {
    0.15
}

fn default_confidence() -> f64 {
    0.5
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            default_effectiveness: default_effectiveness(),
            discovery_threshold: default_discovery_threshold(),
            emergent_blend: default_emergent_blend(),
            reinforcement_min_gain: default_reinforcement_min_gain(),
            synergy_smoothing: default_synergy_smoothing(),
            max_synergy_multiplier: default_max_synergy_multiplier(),
            relationship_nudge: default_relationship_nudge(),
            interference_step: default_interference_step(),
            history_limit: default_history_limit(),
            breakthrough_boost: default_breakthrough_boost(),
            default_confidence: default_confidence(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakthroughConfig {
    /// Composite score at or above which an outcome is a breakthrough
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Phrases signalling novelty in outcome context (case-insensitive)
    #[serde(default = "default_novelty_indicators")]
    pub novelty_indicators: Vec<String>,
    /// Phrases signalling impact in outcome context (case-insensitive)
    #[serde(default = "default_impact_indicators")]
    pub impact_indicators: Vec<String>,
}

fn default_threshold() -> f64 {
    0.7
}

fn default_novelty_indicators() -> Vec<String> {
    [
        "first time",
        "unprecedented",
        "breakthrough",
        "innovative",
        "revolutionary",
        "game-changing",
        "paradigm shift",
        "never before",
        "discovered",
        "emergent",
        "wait. wait.",
        "mind = blown",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_impact_indicators() -> Vec<String> {
    [
        "multiplier",
        "exponential",
        "massive",
        "significant",
        "dramatic",
        "transformative",
        "game-changer",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for BreakthroughConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            novelty_indicators: default_novelty_indicators(),
            impact_indicators: default_impact_indicators(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Learning snapshot file; defaults to `<data_dir>/learning.json`
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    /// Capability catalog file (JSON or YAML)
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
    /// Autosave interval in seconds (0 disables autosave)
    #[serde(default = "default_autosave_secs")]
    pub autosave_secs: u64,
    /// Attempts per snapshot save
    #[serde(default = "default_save_retries")]
    pub save_retries: u32,
}

fn default_autosave_secs() -> u64 {
    60
}

fn default_save_retries() -> u32 {
    3
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            catalog_path: None,
            autosave_secs: default_autosave_secs(),
            save_retries: default_save_retries(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the platform config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        Self::load_from(&path).with_context(|| format!("Failed to load config from {}", path.display()))
    }

    /// Load configuration from an explicit path; a missing file yields defaults
    pub fn load_from(path: &Path) -> EngineResult<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> EngineResult<Self> {
        let mut config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the platform config directory
    pub fn save(&self) -> Result<()> {
        let path = config_path()?;
        self.save_to(&path)
            .with_context(|| format!("Failed to save config to {}", path.display()))
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Repair out-of-range values; reject only configs that cannot work at all
    pub fn validate(&mut self) -> EngineResult<()> {
        let search = &mut self.search;
        if !search.trigger_weight.is_finite() || search.trigger_weight <= 0.0 {
            return Err(EngineError::Configuration(format!(
                "search.trigger_weight must be positive, got {}",
                search.trigger_weight
            )));
        }
        if !search.expertise_weight.is_finite() || search.expertise_weight < 0.0 {
            warn!("search.expertise_weight {} invalid, using 0", search.expertise_weight);
            search.expertise_weight = 0.0;
        }
        if search.expertise_weight >= search.trigger_weight {
            // A single trigger match has to outweigh any expertise.
            let repaired = search.trigger_weight * 0.5;
            warn!(
                "search.expertise_weight {} must be below trigger_weight {}, using {}",
                search.expertise_weight, search.trigger_weight, repaired
            );
            search.expertise_weight = repaired;
        }
        if search.min_token_len == 0 {
            search.min_token_len = 1;
        }

        let composition = &mut self.composition;
        clamp_field("composition.same_owner_bonus", &mut composition.same_owner_bonus, 0.0, 1.0);
        clamp_field("composition.domain_overlap_weight", &mut composition.domain_overlap_weight, 0.0, 1.0);
        clamp_field("composition.learned_synergy_weight", &mut composition.learned_synergy_weight, 0.0, 1.0);
        clamp_field("composition.expertise_blend", &mut composition.expertise_blend, 0.0, 1.0);
        clamp_field("composition.synergy_blend", &mut composition.synergy_blend, 0.0, 1.0);
        if composition.default_max_traits == 0 {
            warn!("composition.default_max_traits must be at least 1, using 1");
            composition.default_max_traits = 1;
        }
        composition.candidate_multiplier = composition.candidate_multiplier.max(1);

        let learning = &mut self.learning;
        clamp_field("learning.learning_rate", &mut learning.learning_rate, 0.0, 1.0);
        clamp_field("learning.default_effectiveness", &mut learning.default_effectiveness, 0.0, 1.0);
        clamp_field("learning.emergent_blend", &mut learning.emergent_blend, 0.0, 1.0);
        clamp_field("learning.synergy_smoothing", &mut learning.synergy_smoothing, 0.0, 1.0);
        clamp_field("learning.relationship_nudge", &mut learning.relationship_nudge, 0.0, 1.0);
        clamp_field("learning.interference_step", &mut learning.interference_step, 0.0, 1.0);
        clamp_field("learning.breakthrough_boost", &mut learning.breakthrough_boost, 0.0, 1.0);
        clamp_field("learning.default_confidence", &mut learning.default_confidence, 0.1, 1.0);
        if !learning.discovery_threshold.is_finite() || learning.discovery_threshold < 0.0 {
            return Err(EngineError::Configuration(format!(
                "learning.discovery_threshold must be a non-negative number, got {}",
                learning.discovery_threshold
            )));
        }
        if !learning.reinforcement_min_gain.is_finite() || learning.reinforcement_min_gain < 0.0 {
            warn!(
                "learning.reinforcement_min_gain {} invalid, using {}",
                learning.reinforcement_min_gain,
                default_reinforcement_min_gain()
            );
            learning.reinforcement_min_gain = default_reinforcement_min_gain();
        }
        if !learning.max_synergy_multiplier.is_finite() || learning.max_synergy_multiplier < 1.0 {
            warn!(
                "learning.max_synergy_multiplier {} invalid, using {}",
                learning.max_synergy_multiplier,
                default_max_synergy_multiplier()
            );
            learning.max_synergy_multiplier = default_max_synergy_multiplier();
        }
        learning.history_limit = learning.history_limit.max(1);

        clamp_field("breakthrough.threshold", &mut self.breakthrough.threshold, 0.0, 1.0);
        self.breakthrough.novelty_indicators = lowercase_all(&self.breakthrough.novelty_indicators);
        self.breakthrough.impact_indicators = lowercase_all(&self.breakthrough.impact_indicators);

        self.persistence.save_retries = self.persistence.save_retries.max(1);

        Ok(())
    }

    /// Snapshot path from config, or the default under the data directory
    pub fn snapshot_path(&self) -> Result<PathBuf> {
        match &self.persistence.snapshot_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("learning.json")),
        }
    }
}

fn clamp_field(name: &str, value: &mut f64, min: f64, max: f64) {
    if !value.is_finite() {
        warn!("{} is not a number, using {}", name, min);
        *value = min;
    } else if *value < min || *value > max {
        let repaired = value.clamp(min, max);
        warn!("{} {} out of range, using {}", name, value, repaired);
        *value = repaired;
    }
}

fn lowercase_all(phrases: &[String]) -> Vec<String> {
    phrases
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "synergy-engine", "synergy-engine")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "synergy-engine", "synergy-engine")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    toml::to_string_pretty(&EngineConfig::default()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.search.trigger_weight, 1.0);
        assert_eq!(config.learning.default_effectiveness, 0.8);
        assert_eq!(config.learning.discovery_threshold, 2.5);
        assert_eq!(config.composition.expertise_blend, 0.7);
        assert_eq!(config.breakthrough.threshold, 0.7);
        assert!(config
            .breakthrough
            .novelty_indicators
            .contains(&"wait. wait.".to_string()));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [learning]
            learning_rate = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(config.learning.learning_rate, 0.2);
        assert_eq!(config.learning.default_effectiveness, 0.8);
        assert_eq!(config.search, SearchConfig::default());
    }

    #[test]
    fn test_validate_keeps_trigger_dominance() {
        let mut config = EngineConfig::default();
        config.search.expertise_weight = 3.0;
        config.validate().unwrap();
        assert!(config.search.expertise_weight < config.search.trigger_weight);
    }

    #[test]
    fn test_validate_rejects_zero_trigger_weight() {
        let mut config = EngineConfig::default();
        config.search.trigger_weight = 0.0;
        assert!(matches!(config.validate(), Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_validate_clamps_rates() {
        let mut config = EngineConfig::default();
        config.learning.learning_rate = 4.0;
        config.learning.default_effectiveness = f64::NAN;
        config.validate().unwrap();
        assert_eq!(config.learning.learning_rate, 1.0);
        assert_eq!(config.learning.default_effectiveness, 0.0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = EngineConfig::default();
        config.persistence.autosave_secs = 5;
        config.save_to(&path).unwrap();

        let loaded = EngineConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let loaded = EngineConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, EngineConfig::default());
    }
}
