//! Capability catalog
//!
//! The catalog is supplied from outside the engine as a nested mapping
//! `owner -> unit name -> { triggers, domains, expertise }`. Entries are kept
//! as raw JSON values until `units()` validates them, so a single malformed
//! entry never prevents the rest of the catalog from loading.

pub mod loader;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::types::CapabilityUnit;

pub use loader::CatalogLoader;

/// Raw catalog: owner id -> (unit name -> entry)
///
/// Owner values stay untyped too, so an owner that is not a mapping is
/// reported by `units()` instead of failing the whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    owners: BTreeMap<String, Value>,
}

/// A catalog entry that was skipped during validation
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogIssue {
    pub owner: String,
    pub unit: String,
    pub reason: String,
}

impl std::fmt::Display for CatalogIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.unit.is_empty() {
            write!(f, "{}: {}", self.owner, self.reason)
        } else {
            write!(f, "{}:{}: {}", self.owner, self.unit, self.reason)
        }
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a raw entry
    pub fn insert(&mut self, owner: impl Into<String>, unit: impl Into<String>, entry: Value) {
        let slot = self
            .owners
            .entry(owner.into())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(units) = slot {
            units.insert(unit.into(), entry);
        }
    }

    /// Set an owner's raw value, valid or not
    pub fn insert_owner(&mut self, owner: impl Into<String>, units: Value) {
        self.owners.insert(owner.into(), units);
    }

    pub fn owners(&self) -> impl Iterator<Item = &str> {
        self.owners.keys().map(|k| k.as_str())
    }

    /// Number of raw entries, valid or not
    pub fn len(&self) -> usize {
        self.owners
            .values()
            .map(|units| units.as_object().map_or(1, |u| u.len()))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate every entry, returning the usable units and the skipped ones
    pub fn units(&self) -> (Vec<CapabilityUnit>, Vec<CatalogIssue>) {
        let mut units = Vec::new();
        let mut issues = Vec::new();

        for (owner, entries) in &self.owners {
            let Some(entries) = entries.as_object() else {
                warn!("Skipping catalog owner '{}': not a mapping of units", owner);
                issues.push(CatalogIssue {
                    owner: owner.clone(),
                    unit: String::new(),
                    reason: "owner is not a mapping of units".to_string(),
                });
                continue;
            };
            for (name, entry) in entries {
                match parse_entry(owner, name, entry) {
                    Ok(unit) => units.push(unit),
                    Err(reason) => {
                        warn!("Skipping catalog entry '{}:{}': {}", owner, name, reason);
                        issues.push(CatalogIssue {
                            owner: owner.clone(),
                            unit: name.clone(),
                            reason,
                        });
                    }
                }
            }
        }

        (units, issues)
    }
}

fn parse_entry(owner: &str, name: &str, entry: &Value) -> Result<CapabilityUnit, String> {
    if name.trim().is_empty() {
        return Err("unit name is empty".to_string());
    }
    let fields = entry
        .as_object()
        .ok_or_else(|| "entry is not an object".to_string())?;

    let triggers = match fields.get("triggers") {
        Some(value) => string_list(value, "triggers")?,
        None => return Err("missing 'triggers'".to_string()),
    };

    let domains = match fields.get("domains") {
        Some(Value::Null) | None => Vec::new(),
        Some(value) => string_list(value, "domains")?,
    };

    let expertise = fields
        .get("expertise")
        .ok_or_else(|| "missing 'expertise'".to_string())?
        .as_f64()
        .ok_or_else(|| "'expertise' is not a number".to_string())?;
    if !expertise.is_finite() || !(0.0..=100.0).contains(&expertise) {
        return Err(format!("'expertise' {} outside 0-100", expertise));
    }

    Ok(CapabilityUnit::new(name, owner, triggers, domains, expertise))
}

fn string_list(value: &Value, field: &str) -> Result<Vec<String>, String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("'{}' is not a list", field))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| format!("'{}' contains a non-string value", field))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_entries() {
        let mut catalog = Catalog::new();
        catalog.insert(
            "hunter",
            "debugging",
            json!({"triggers": ["bug", "Crash"], "domains": ["rust"], "expertise": 90}),
        );
        catalog.insert("hunter", "tracing", json!({"triggers": [], "expertise": 40.5}));

        let (units, issues) = catalog.units();
        assert!(issues.is_empty());
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "debugging");
        assert_eq!(units[0].triggers, vec!["bug", "crash"]);
        assert!(units[1].domains.is_empty());
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let mut catalog = Catalog::new();
        catalog.insert("a", "no_triggers", json!({"expertise": 50}));
        catalog.insert("a", "bad_expertise", json!({"triggers": ["x"], "expertise": 150}));
        catalog.insert("a", "string_expertise", json!({"triggers": ["x"], "expertise": "high"}));
        catalog.insert("a", "bad_domains", json!({"triggers": ["x"], "domains": "web", "expertise": 5}));
        catalog.insert("a", "not_object", json!(["x"]));
        catalog.insert("a", "ok", json!({"triggers": ["x"], "expertise": 5}));

        let (units, issues) = catalog.units();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "ok");
        assert_eq!(issues.len(), 5);
        assert!(issues.iter().any(|i| i.unit == "no_triggers" && i.reason.contains("triggers")));
    }

    #[test]
    fn test_malformed_owner_skipped() {
        let mut catalog = Catalog::new();
        catalog.insert("studio", "design", json!({"triggers": ["layout"], "domains": ["css"], "expertise": 70}));
        catalog.insert_owner("broken", json!(5));
        assert_eq!(catalog.len(), 2);

        let (units, issues) = catalog.units();
        assert_eq!(units, vec![CapabilityUnit::new("design", "studio", ["layout"], ["css"], 70.0)]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].owner, "broken");
        assert_eq!(issues[0].to_string(), "broken: owner is not a mapping of units");

        // Inserting a unit replaces the bad owner value
        catalog.insert("broken", "fixed", json!({"triggers": ["x"], "expertise": 1}));
        assert_eq!(catalog.units().0.len(), 2);
    }
}
