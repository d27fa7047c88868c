//! Trait index
//!
//! Lookup structures over the capability catalog: by unit name, by trigger and
//! by domain, plus ranked search over free-text task descriptions.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogIssue};
use crate::config::SearchConfig;
use crate::types::CapabilityUnit;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-z0-9][a-z0-9_\-]*").expect("token regex is valid")
});

/// Split text into lower-case tokens of at least `min_len` characters
pub fn tokenize(text: &str, min_len: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .filter(|t| t.chars().count() >= min_len)
        .collect()
}

/// A search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredUnit {
    pub unit: CapabilityUnit,
    pub score: f64,
    /// Triggers found in the request, in the unit's trigger order
    pub matched_triggers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_owners: usize,
    pub total_units: usize,
    pub total_triggers: usize,
    pub total_domains: usize,
}

/// Trigger tokens pointing back at a unit
#[derive(Debug, Clone)]
struct TriggerEntry {
    unit: usize,
    trigger: String,
    tokens: Vec<String>,
}

/// Index over capability units
#[derive(Debug, Clone, Default)]
pub struct TraitIndex {
    config: SearchConfig,
    built: bool,
    units: Vec<CapabilityUnit>,
    by_name: HashMap<String, Vec<usize>>,
    by_trigger: HashMap<String, Vec<usize>>,
    by_domain: HashMap<String, Vec<usize>>,
    /// First trigger token -> triggers starting with it
    by_first_token: HashMap<String, Vec<TriggerEntry>>,
    /// Same, for triggers made only of tokens below `min_token_len` ("c", "r")
    by_short_token: HashMap<String, Vec<TriggerEntry>>,
}

impl TraitIndex {
    /// Create an empty, un-built index
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Build an index from a catalog in one step
    pub fn from_catalog(config: SearchConfig, catalog: &Catalog) -> Self {
        let mut index = Self::new(config);
        index.build(catalog);
        index
    }

    /// Switch search settings, re-tokenizing triggers if already built
    pub fn reconfigure(&mut self, config: SearchConfig) {
        if config == self.config {
            return;
        }
        self.config = config;
        if self.built {
            let units = std::mem::take(&mut self.units);
            self.build_from_units(units);
        }
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Replace all lookup structures with the contents of `catalog`.
    ///
    /// Malformed entries are skipped and returned; they never abort the build.
    pub fn build(&mut self, catalog: &Catalog) -> Vec<CatalogIssue> {
        let (units, issues) = catalog.units();
        self.build_from_units(units);
        if !issues.is_empty() {
            info!("Skipped {} malformed catalog entries", issues.len());
        }
        issues
    }

    /// Hot reload: identical to `build`
    pub fn rebuild(&mut self, catalog: &Catalog) -> Vec<CatalogIssue> {
        debug!("Rebuilding trait index");
        self.build(catalog)
    }

    /// Replace all lookup structures with already validated units
    pub fn build_from_units(&mut self, units: Vec<CapabilityUnit>) {
        self.by_name.clear();
        self.by_trigger.clear();
        self.by_domain.clear();
        self.by_first_token.clear();
        self.by_short_token.clear();
        self.units = units;

        let min_len = self.config.min_token_len;
        for (idx, unit) in self.units.iter().enumerate() {
            self.by_name.entry(unit.name.clone()).or_default().push(idx);

            for trigger in &unit.triggers {
                self.by_trigger.entry(trigger.clone()).or_default().push(idx);

                let (map, tokens) = match tokenize(trigger, min_len) {
                    tokens if !tokens.is_empty() => (&mut self.by_first_token, tokens),
                    _ => (&mut self.by_short_token, tokenize(trigger, 1)),
                };
                match tokens.first() {
                    Some(first) => map.entry(first.clone()).or_default().push(TriggerEntry {
                        unit: idx,
                        trigger: trigger.clone(),
                        tokens,
                    }),
                    None => warn!(
                        "Trigger '{}' of '{}' has no searchable characters",
                        trigger,
                        unit.key()
                    ),
                }
            }

            for domain in &unit.domains {
                self.by_domain.entry(domain.clone()).or_default().push(idx);
            }
        }

        self.built = true;
        let stats = self.stats();
        info!(
            "Indexed {} units from {} owners ({} triggers, {} domains)",
            stats.total_units, stats.total_owners, stats.total_triggers, stats.total_domains
        );
    }

    /// Among same-named units from different owners, the one with the highest expertise
    pub fn get_best_source(&self, name: &str) -> Option<&CapabilityUnit> {
        self.by_name.get(name)?.iter().map(|&i| &self.units[i]).min_by(|a, b| {
            b.expertise
                .partial_cmp(&a.expertise)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.owner.cmp(&b.owner))
        })
    }

    /// Units declaring exactly this trigger, highest expertise first
    pub fn find_by_trigger(&self, trigger: &str) -> Vec<&CapabilityUnit> {
        self.lookup(&self.by_trigger, trigger)
    }

    /// Units declaring exactly this domain, highest expertise first
    pub fn find_by_domain(&self, domain: &str) -> Vec<&CapabilityUnit> {
        self.lookup(&self.by_domain, domain)
    }

    fn lookup(&self, map: &HashMap<String, Vec<usize>>, key: &str) -> Vec<&CapabilityUnit> {
        let key = key.trim().to_lowercase();
        let mut found: Vec<&CapabilityUnit> = map
            .get(&key)
            .map(|ids| ids.iter().map(|&i| &self.units[i]).collect())
            .unwrap_or_default();
        found.sort_by(|a, b| compare_units(a, b));
        found
    }

    /// Rank units against a free-text request.
    ///
    /// Only units with at least one matched trigger are returned. Because
    /// `expertise_weight < trigger_weight`, one extra trigger match always
    /// outranks any expertise difference.
    pub fn search(&self, text: &str, max_results: usize) -> Vec<ScoredUnit> {
        if max_results == 0 || self.units.is_empty() {
            return Vec::new();
        }

        let tokens = tokenize(text, self.config.min_token_len);
        let mut matches: HashMap<usize, Vec<&str>> = HashMap::new();
        collect_phrase_matches(&tokens, &self.by_first_token, &mut matches);
        if !self.by_short_token.is_empty() {
            collect_phrase_matches(&tokenize(text, 1), &self.by_short_token, &mut matches);
        }

        let mut results: Vec<ScoredUnit> = matches
            .into_iter()
            .map(|(idx, hits)| {
                let unit = &self.units[idx];
                let matched_triggers: Vec<String> = unit
                    .triggers
                    .iter()
                    .filter(|t| hits.contains(&t.as_str()))
                    .cloned()
                    .collect();
                let score = matched_triggers.len() as f64 * self.config.trigger_weight
                    + unit.expertise_fraction() * self.config.expertise_weight;
                ScoredUnit {
                    unit: unit.clone(),
                    score,
                    matched_triggers,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| compare_units(&a.unit, &b.unit))
        });
        results.truncate(max_results);

        debug!("Search matched {} units for {} tokens", results.len(), tokens.len());
        results
    }

    pub fn units(&self) -> &[CapabilityUnit] {
        &self.units
    }

    /// Distinct unit names, sorted
    pub fn unit_names(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self.by_name.keys().collect();
        names.into_iter().cloned().collect()
    }

    pub fn units_by_owner(&self, owner: &str) -> Vec<&CapabilityUnit> {
        self.units.iter().filter(|u| u.owner == owner).collect()
    }

    pub fn stats(&self) -> IndexStats {
        let owners: BTreeSet<&str> = self.units.iter().map(|u| u.owner.as_str()).collect();
        IndexStats {
            total_owners: owners.len(),
            total_units: self.units.len(),
            total_triggers: self.by_trigger.len(),
            total_domains: self.by_domain.len(),
        }
    }
}

/// Record every trigger phrase of `entries` found in `tokens`
fn collect_phrase_matches<'a>(
    tokens: &[String],
    entries: &'a HashMap<String, Vec<TriggerEntry>>,
    matches: &mut HashMap<usize, Vec<&'a str>>,
) {
    for (pos, token) in tokens.iter().enumerate() {
        let Some(candidates) = entries.get(token) else {
            continue;
        };
        for entry in candidates {
            let end = pos + entry.tokens.len();
            if end <= tokens.len() && tokens[pos..end] == entry.tokens[..] {
                let hits = matches.entry(entry.unit).or_default();
                if !hits.contains(&entry.trigger.as_str()) {
                    hits.push(entry.trigger.as_str());
                }
            }
        }
    }
}

/// Expertise desc, then name asc, then owner asc
fn compare_units(a: &CapabilityUnit, b: &CapabilityUnit) -> Ordering {
    b.expertise
        .partial_cmp(&a.expertise)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.owner.cmp(&b.owner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_index() -> TraitIndex {
        let mut catalog = Catalog::new();
        catalog.insert(
            "hunter",
            "debugging",
            json!({"triggers": ["bug", "stack trace"], "domains": ["rust", "systems"], "expertise": 10}),
        );
        catalog.insert(
            "hunter",
            "profiling",
            json!({"triggers": ["slow", "latency"], "domains": ["systems"], "expertise": 99}),
        );
        catalog.insert(
            "studio",
            "debugging",
            json!({"triggers": ["bug"], "domains": ["css"], "expertise": 60}),
        );
        catalog.insert("studio", "broken", json!({"triggers": "bug", "expertise": 50}));
        TraitIndex::from_catalog(SearchConfig::default(), &catalog)
    }

    #[test]
    fn test_unbuilt_index() {
        let index = TraitIndex::new(SearchConfig::default());
        assert!(!index.is_built());
        assert!(index.search("bug", 5).is_empty());
    }

    #[test]
    fn test_build_skips_malformed() {
        let index = sample_index();
        assert!(index.is_built());
        assert_eq!(index.units().len(), 3);
        assert_eq!(index.stats().total_owners, 2);
    }

    #[test]
    fn test_trigger_match_dominates_expertise() {
        let index = sample_index();
        let results = index.search("there is a bug somewhere", 10);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.unit.name == "debugging"));
        // Same match count: higher expertise first
        assert_eq!(results[0].unit.owner, "studio");
    }

    #[test]
    fn test_phrase_trigger() {
        let index = sample_index();
        let results = index.search("Bug with a Stack Trace attached", 10);
        assert_eq!(results[0].unit.owner, "hunter");
        assert_eq!(results[0].matched_triggers, vec!["bug", "stack trace"]);

        // Tokens out of order do not match the phrase
        let results = index.search("trace the stack", 10);
        assert!(results.is_empty());
    }

    #[test]
    fn test_no_matches_is_empty() {
        let index = sample_index();
        assert!(index.search("completely unrelated request", 10).is_empty());
        assert!(index.search("bug", 0).is_empty());
    }

    #[test]
    fn test_best_source() {
        let index = sample_index();
        assert_eq!(index.get_best_source("debugging").unwrap().owner, "studio");
        assert!(index.get_best_source("missing").is_none());
    }

    #[test]
    fn test_find_by_trigger_and_domain() {
        let index = sample_index();
        let found = index.find_by_trigger("BUG");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].expertise, 60.0);

        let found = index.find_by_domain("systems");
        assert_eq!(found[0].name, "profiling");
        assert!(index.find_by_domain("cobol").is_empty());
    }

    #[test]
    fn test_short_triggers_searchable() {
        let mut catalog = Catalog::new();
        catalog.insert("lang", "c-lang", json!({"triggers": ["c"], "expertise": 90}));
        catalog.insert("lang", "csharp", json!({"triggers": ["c#", "dotnet"], "expertise": 40}));
        catalog.insert("lang", "symbols", json!({"triggers": ["++"], "expertise": 10}));
        let index = TraitIndex::from_catalog(SearchConfig::default(), &catalog);

        let results = index.search("write it in c", 5);
        let names: Vec<&str> = results.iter().map(|r| r.unit.name.as_str()).collect();
        // "c#" tokenizes to "c" as well
        assert_eq!(names, vec!["c-lang", "csharp"]);
        assert_eq!(results[0].matched_triggers, vec!["c"]);

        // Short tokens do not join longer phrases
        assert!(index.search("a b", 5).is_empty());
        assert_eq!(index.search("dotnet", 5)[0].unit.name, "csharp");
    }

    #[test]
    fn test_reconfigure_rescores() {
        let mut index = sample_index();
        index.reconfigure(SearchConfig {
            trigger_weight: 2.0,
            expertise_weight: 1.0,
            min_token_len: 4,
        });
        // "bug" is now a short trigger but still matches
        let results = index.search("bug", 5);
        assert_eq!(results.len(), 2);
        assert!((results[0].score - 2.6).abs() < 1e-12);
    }

    #[test]
    fn test_units_by_owner() {
        let index = sample_index();
        let names: Vec<&str> = index.units_by_owner("hunter").iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["debugging", "profiling"]);
        assert!(index.units_by_owner("nobody").is_empty());
    }

    #[test]
    fn test_rebuild_replaces_contents() {
        let mut index = sample_index();
        let mut catalog = Catalog::new();
        catalog.insert("solo", "writer", json!({"triggers": ["essay"], "expertise": 30}));
        index.rebuild(&catalog);

        assert_eq!(index.unit_names(), vec!["writer"]);
        assert!(index.search("bug", 5).is_empty());
        assert_eq!(index.search("write an essay", 5).len(), 1);
    }
}
