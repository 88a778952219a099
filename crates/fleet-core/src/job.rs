use crate::error::FleetError;
use crate::executor::Executor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Ordinal job identity, assigned in submission order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of one completion check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The completion marker is present.
    Complete,
    /// The marker is absent; the job is still running.
    Pending,
    /// The check itself failed, so nothing is known about the job.
    TransportError(String),
}

/// What happened when results were fetched after completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectOutcome {
    Collected,
    Failed(String),
}

/// Where a job is in its lifecycle. Exactly one tag per job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    /// Running on the executor in this pool slot.
    Active { slot: usize },
    Completed(CollectOutcome),
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Active { .. } => write!(f, "active"),
            JobState::Completed(CollectOutcome::Collected) => write!(f, "completed"),
            JobState::Completed(CollectOutcome::Failed(_)) => write!(f, "completed (collect failed)"),
        }
    }
}

/// One unit of remote work.
///
/// The orchestrator owns the binding between a job and its executor and
/// passes the executor into every call after activation.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    fn id(&self) -> JobId;

    /// Local directory results are collected into.
    fn output_path(&self) -> &Path;

    /// Stage artifacts and start the command detached. Must not wait for
    /// the command to finish.
    async fn activate(&mut self, executor: &dyn Executor) -> Result<(), FleetError>;

    /// Lightweight completion check.
    async fn poll(&mut self, executor: &dyn Executor) -> PollOutcome;

    /// Fetch result artifacts. Called once, after the first `Complete`.
    async fn collect(&mut self, executor: &dyn Executor) -> Result<(), FleetError>;

    /// Best-effort progress string.
    async fn status_message(&self, _executor: &dyn Executor) -> Result<String, FleetError> {
        Err(FleetError::StatusQuery("no status available".into()))
    }
}
