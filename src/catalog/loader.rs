//! Catalog loading
//!
//! Reads a catalog from a JSON or YAML document. The file extension decides the
//! format; anything that is not `.yaml`/`.yml` is parsed as JSON.

use serde_json::Value;
use std::path::Path;
use tracing::info;

use super::Catalog;
use crate::error::{EngineError, EngineResult};

/// Loads catalogs from strings or files
pub struct CatalogLoader;

impl CatalogLoader {
    pub fn from_json(contents: &str) -> EngineResult<Catalog> {
        serde_json::from_str(contents).map_err(|e| EngineError::Catalog(e.to_string()))
    }

    /// Parse a YAML catalog.
    ///
    /// YAML allows non-string keys; scalar keys are used as their text and
    /// anything else is rendered back to YAML, so no entry is lost before
    /// validation.
    pub fn from_yaml(contents: &str) -> EngineResult<Catalog> {
        let document: serde_yaml::Value = serde_yaml::from_str(contents)?;
        let serde_yaml::Value::Mapping(owners) = document else {
            return Err(EngineError::Catalog(
                "catalog document is not a mapping of owners".to_string(),
            ));
        };

        let mut catalog = Catalog::new();
        for (owner, units) in owners {
            catalog.insert_owner(yaml_key(&owner), yaml_to_json(units));
        }
        Ok(catalog)
    }

    /// Load a catalog file
    pub fn load(path: &Path) -> EngineResult<Catalog> {
        let contents = std::fs::read_to_string(path)?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "yaml" | "yml"))
            .unwrap_or(false);

        let catalog = if is_yaml {
            Self::from_yaml(&contents)?
        } else {
            Self::from_json(&contents)?
        };

        info!(
            "Loaded catalog from {} ({} entries)",
            path.display(),
            catalog.len()
        );
        Ok(catalog)
    }
}

fn yaml_key(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| format!("{:?}", other)),
    }
}

fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (yaml_key(&k), yaml_to_json(v)))
                .collect(),
        ),
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}
