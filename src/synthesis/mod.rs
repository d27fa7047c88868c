//! Fan-out synthesis
//!
//! Runs independent sub-analyses concurrently and merges whatever succeeds.
//! Each branch reports a tagged result; a failing, panicking or timed-out
//! branch never aborts its siblings. Dropping the pending join aborts every
//! branch still running.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::composition::ComposedAgent;
use crate::learning::LearningView;
use crate::types::CapabilityUnit;

pub type BranchFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

/// Why a branch produced no value
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BranchFailure {
    #[error("{0}")]
    Failed(String),
    #[error("panicked: {0}")]
    Panicked(String),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug)]
pub struct BranchOutcome<T> {
    pub label: String,
    pub result: std::result::Result<T, BranchFailure>,
}

/// Aborts every task it still holds when dropped
struct AbortOnDrop<T> {
    handles: Vec<JoinHandle<T>>,
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

/// Run labelled branches concurrently; one outcome per branch, in input order
pub async fn join_all_tagged<T: Send + 'static>(
    branches: Vec<(String, BranchFuture<T>)>,
    timeout: Option<Duration>,
) -> Vec<BranchOutcome<T>> {
    let mut labels = Vec::with_capacity(branches.len());
    let mut guard = AbortOnDrop {
        handles: Vec::with_capacity(branches.len()),
    };

    for (label, branch) in branches {
        labels.push(label);
        guard.handles.push(tokio::spawn(async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, branch).await {
                    Ok(result) => result.map_err(|e| BranchFailure::Failed(format!("{:#}", e))),
                    Err(_) => Err(BranchFailure::TimedOut(limit)),
                },
                None => branch
                    .await
                    .map_err(|e| BranchFailure::Failed(format!("{:#}", e))),
            }
        }));
    }

    let joined = join_all(guard.handles.iter_mut()).await;

    labels
        .into_iter()
        .zip(joined)
        .map(|(label, joined)| {
            let result = match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(BranchFailure::Panicked(panic_message(e.into_panic()))),
                Err(_) => Err(BranchFailure::Cancelled),
            };
            if let Err(failure) = &result {
                warn!("Branch '{}' failed: {}", label, failure);
            }
            BranchOutcome { label, result }
        })
        .collect()
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// One perspective's contribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub perspective: String,
    pub summary: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedBranch {
    pub label: String,
    pub reason: String,
}

/// Merged result of a fan-out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisReport {
    pub agent_id: Uuid,
    pub insights: Vec<Insight>,
    pub failed: Vec<FailedBranch>,
    pub notes: Vec<String>,
    /// Mean insight confidence scaled by the fraction of branches that succeeded
    pub confidence: f64,
}

/// An independent sub-analysis of a composed agent
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Perspective: Send + Sync {
    fn label(&self) -> String;

    async fn evaluate(&self, agent: &ComposedAgent) -> Result<Insight>;
}

/// Built-in perspective of a single selected unit
pub struct UnitPerspective {
    unit: CapabilityUnit,
    effectiveness: f64,
}

impl UnitPerspective {
    pub fn new(unit: CapabilityUnit, effectiveness: f64) -> Self {
        Self {
            unit,
            effectiveness: effectiveness.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl Perspective for UnitPerspective {
    fn label(&self) -> String {
        self.unit.key()
    }

    async fn evaluate(&self, agent: &ComposedAgent) -> Result<Insight> {
        let mut summary = format!(
            "Apply {} from {} ({:.0}% expertise)",
            self.unit.name, self.unit.owner, self.unit.expertise
        );
        let shared: Vec<&str> = self
            .unit
            .domains
            .iter()
            .filter(|d| agent.knowledge_domains.contains(*d))
            .map(|d| d.as_str())
            .collect();
        if !shared.is_empty() && agent.units.len() > 1 {
            summary.push_str(&format!(" across {}", shared.join(", ")));
        }

        Ok(Insight {
            perspective: self.label(),
            summary,
            confidence: self.unit.expertise_fraction() * self.effectiveness,
        })
    }
}

/// One `UnitPerspective` per unit of the agent
pub fn unit_perspectives<V: LearningView + ?Sized>(
    agent: &ComposedAgent,
    view: &V,
) -> Vec<Arc<dyn Perspective>> {
    agent
        .units
        .iter()
        .map(|unit| {
            Arc::new(UnitPerspective::new(unit.clone(), view.effectiveness(&unit.name)))
                as Arc<dyn Perspective>
        })
        .collect()
}

/// Evaluate all perspectives concurrently and merge the survivors
pub async fn synthesize(
    agent: Arc<ComposedAgent>,
    perspectives: Vec<Arc<dyn Perspective>>,
    timeout: Option<Duration>,
) -> SynthesisReport {
    let total = perspectives.len();
    let branches: Vec<(String, BranchFuture<Insight>)> = perspectives
        .into_iter()
        .map(|perspective| {
            let agent = agent.clone();
            let label = perspective.label();
            let branch: BranchFuture<Insight> =
                Box::pin(async move { perspective.evaluate(&agent).await });
            (label, branch)
        })
        .collect();

    let mut insights = Vec::new();
    let mut failed = Vec::new();
    for outcome in join_all_tagged(branches, timeout).await {
        match outcome.result {
            Ok(insight) => insights.push(insight),
            Err(failure) => failed.push(FailedBranch {
                label: outcome.label,
                reason: failure.to_string(),
            }),
        }
    }

    let confidence = if insights.is_empty() || total == 0 {
        0.0
    } else {
        let mean = insights.iter().map(|i| i.confidence).sum::<f64>() / insights.len() as f64;
        (mean * insights.len() as f64 / total as f64).clamp(0.0, 1.0)
    };

    let mut notes = Vec::new();
    if agent.synergy_score >= 0.7 {
        notes.push("High synergy: selected units work exceptionally well together".to_string());
    }
    if !failed.is_empty() {
        notes.push(format!("{} of {} perspectives failed", failed.len(), total));
    }

    debug!(
        "Synthesized {} insights for agent {} ({} failed)",
        insights.len(),
        agent.id,
        failed.len()
    );

    SynthesisReport {
        agent_id: agent.id,
        insights,
        failed,
        notes,
        confidence,
    }
}
