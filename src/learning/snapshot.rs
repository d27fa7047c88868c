//! Snapshot persistence
//!
//! One JSON document holds effectiveness scores, confidences, relationship
//! edges and emergent combinations. Writes go to a temporary file that is
//! renamed over the target, so an interrupted save never corrupts it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::graph::{EmergentCombination, RelationshipEdge};
use super::ledger::UnitRecord;
use crate::error::{EngineError, EngineResult};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Delay before the first retry; doubles per attempt
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Persisted edge with its endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub a: String,
    pub b: String,
    pub edge: RelationshipEdge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub units: BTreeMap<String, UnitRecord>,
    #[serde(default)]
    pub confidence: BTreeMap<String, f64>,
    #[serde(default)]
    pub relationships: Vec<EdgeRecord>,
    #[serde(default)]
    pub emergent: BTreeMap<String, EmergentCombination>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

/// Result of loading a snapshot; the engine stays usable in every case
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded,
    Missing,
    Corrupt(String),
}

/// Read a snapshot; `Ok(None)` when the file does not exist
pub async fn read_snapshot(path: &Path) -> EngineResult<Option<LearningSnapshot>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let snapshot: LearningSnapshot =
        serde_json::from_str(&contents).map_err(|e| EngineError::CorruptSnapshot {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if snapshot.version > SNAPSHOT_VERSION {
        return Err(EngineError::CorruptSnapshot {
            path: path.to_path_buf(),
            reason: format!("unsupported snapshot version {}", snapshot.version),
        });
    }

    debug!(
        "Read snapshot with {} units, {} edges, {} emergent combinations",
        snapshot.units.len(),
        snapshot.relationships.len(),
        snapshot.emergent.len()
    );
    Ok(Some(snapshot))
}

/// Write a snapshot atomically
pub async fn write_snapshot(path: &Path, snapshot: &LearningSnapshot) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let contents = serde_json::to_string_pretty(snapshot)?;
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;

    info!("Saved learning snapshot to {}", path.display());
    Ok(())
}

/// Write a snapshot, retrying with exponential back-off
pub async fn write_snapshot_with_retry(
    path: &Path,
    snapshot: &LearningSnapshot,
    attempts: u32,
) -> EngineResult<()> {
    let attempts = attempts.max(1);
    let mut delay = RETRY_BACKOFF;
    let mut attempt = 1;

    loop {
        match write_snapshot(path, snapshot).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < attempts => {
                warn!(
                    "Snapshot save attempt {}/{} failed: {}",
                    attempt, attempts, e
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
