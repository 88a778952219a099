use crate::config::Topology;
use crate::error::FleetError;
use crate::executor::{Executor, Provisioner};
use crate::job::{CollectOutcome, Job, JobId, JobState, PollOutcome};
use crate::status_page::{self, JobSnapshot};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Shown on the status page when a job's progress cannot be queried.
pub const UNKNOWN_STATUS: &str = "unknown status";

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Pool size asked for; never more than the number of jobs is built.
    pub requested_executors: usize,
    /// Fixed sleep between poll cycles.
    pub poll_interval: Duration,
    pub topology: Topology,
    pub status_page: Option<PathBuf>,
}

/// Lifecycle of the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Provisioning,
    Running,
    Draining,
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Provisioning => write!(f, "provisioning"),
            Phase::Running => write!(f, "running"),
            Phase::Draining => write!(f, "draining"),
            Phase::Terminated => write!(f, "terminated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueCounts {
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.pending + self.active + self.completed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total_jobs: usize,
    pub collected: usize,
    pub collect_failures: usize,
    pub executors_launched: usize,
    /// Executors deleted before teardown: surplus or failed to clean.
    pub executors_deleted: usize,
    pub cycles: u64,
}

struct JobEntry {
    job: Box<dyn Job>,
    state: JobState,
    /// Address of the executor the job ran on, kept after completion.
    address: Option<String>,
    /// Consecutive completion checks that failed in transport.
    transport_errors: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Unlaunched,
    Idle,
    /// Serving the job at this arena index.
    Busy(usize),
    /// Failed to clean. Never reused, only kept as a tunnel hop.
    Faulted,
    Deleted,
}

struct Slot {
    executor: Box<dyn Executor>,
    state: SlotState,
    /// Other executors tunnel through this one.
    bootstrap: bool,
}

/// Drives a fixed pool of executors through a FIFO queue of jobs.
///
/// Jobs live in one arena in submission order, each carrying a single
/// `JobState` tag. Jobs leave `Pending` strictly in arena order, so the
/// pending set is always the suffix starting at `next_pending`.
pub struct Orchestrator {
    settings: OrchestratorSettings,
    provisioner: Box<dyn Provisioner>,
    jobs: Vec<JobEntry>,
    next_pending: usize,
    slots: Vec<Slot>,
    phase: Phase,
    cycles: u64,
    launched: usize,
    deleted_early: usize,
}

impl Orchestrator {
    pub fn new(
        provisioner: Box<dyn Provisioner>,
        jobs: Vec<Box<dyn Job>>,
        settings: OrchestratorSettings,
    ) -> Self {
        let total = jobs.len();
        let mut pool = settings.requested_executors;
        if total < pool {
            warn!(
                "Requested {} executors for {} jobs, reducing the pool to {}",
                pool, total, total
            );
            pool = total;
        }

        let slots = (0..pool)
            .map(|index| Slot {
                executor: provisioner.executor(index),
                state: SlotState::Unlaunched,
                bootstrap: false,
            })
            .collect();

        let jobs = jobs
            .into_iter()
            .map(|job| JobEntry {
                job,
                state: JobState::Pending,
                address: None,
                transport_errors: 0,
            })
            .collect();

        Self {
            settings,
            provisioner,
            jobs,
            next_pending: 0,
            slots,
            phase: Phase::Provisioning,
            cycles: 0,
            launched: 0,
            deleted_early: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Executors currently in the pool, launched or not, excluding any
    /// dropped after a failed launch.
    pub fn executor_count(&self) -> usize {
        self.slots.len()
    }

    /// Executors still able to take work.
    pub fn live_executors(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s.state, SlotState::Idle | SlotState::Busy(_)))
            .count()
    }

    pub fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for entry in &self.jobs {
            match entry.state {
                JobState::Pending => counts.pending += 1,
                JobState::Active { .. } => counts.active += 1,
                JobState::Completed(_) => counts.completed += 1,
            }
        }
        counts
    }

    pub fn is_complete(&self) -> bool {
        self.counts().completed == self.jobs.len()
    }

    /// Active jobs and the pool slot each one runs on.
    pub fn active_bindings(&self) -> Vec<(JobId, usize)> {
        self.jobs
            .iter()
            .filter_map(|e| match e.state {
                JobState::Active { slot } => Some((e.job.id(), slot)),
                _ => None,
            })
            .collect()
    }

    pub fn job_state(&self, id: JobId) -> Option<&JobState> {
        self.jobs
            .iter()
            .find(|e| e.job.id() == id)
            .map(|e| &e.state)
    }

    /// Consecutive transport failures seen while checking a job.
    pub fn transport_errors(&self, id: JobId) -> Option<u32> {
        self.jobs
            .iter()
            .find(|e| e.job.id() == id)
            .map(|e| e.transport_errors)
    }

    /// One row per job using only local state.
    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        self.jobs
            .iter()
            .map(|e| snapshot_row(e, e.state.to_string()))
            .collect()
    }

    /// Provision the pool: create the group, then launch executors one by
    /// one. An executor that fails to launch is dropped from the pool.
    pub async fn provision(&mut self) -> Result<usize, FleetError> {
        self.set_phase(Phase::Provisioning);
        self.provisioner.prepare().await?;

        let topology = self.settings.topology;
        let mut bootstrap: Option<String> = None;
        for slot in self.slots.iter_mut() {
            let hop = match topology {
                Topology::Direct => None,
                Topology::Bootstrap => bootstrap.clone(),
            };
            let name = slot.executor.name().to_string();
            match slot.executor.launch(hop.as_deref()).await {
                Ok(()) => {
                    slot.state = SlotState::Idle;
                    self.launched += 1;
                    info!(
                        "Executor {} up at {}",
                        name,
                        slot.executor.address().display_address().unwrap_or("-")
                    );
                    if topology == Topology::Bootstrap && bootstrap.is_none() {
                        bootstrap = slot.executor.address().public.clone();
                        slot.bootstrap = bootstrap.is_some();
                        match &bootstrap {
                            Some(addr) => info!("Using {} ({}) as bootstrap host", name, addr),
                            None => warn!("Executor {} has no public address to tunnel through", name),
                        }
                    }
                }
                Err(e) => {
                    warn!("Executor {} failed to launch, continuing without it: {}", name, e);
                }
            }
        }

        self.slots.retain(|s| s.state != SlotState::Unlaunched);
        if self.slots.is_empty() && !self.jobs.is_empty() {
            return Err(FleetError::NoExecutors(
                "every executor failed to launch".into(),
            ));
        }

        info!("{} of the requested executors launched", self.launched);
        Ok(self.launched)
    }

    /// Put one pending job on each idle executor.
    pub async fn start(&mut self) -> Result<(), FleetError> {
        self.set_phase(Phase::Running);
        for slot in 0..self.slots.len() {
            if self.next_pending >= self.jobs.len() {
                break;
            }
            if self.slots[slot].state == SlotState::Idle {
                self.activate_next(slot).await?;
            }
        }
        self.check_invariants();
        Ok(())
    }

    /// Check every active job once, harvest the finished ones and hand
    /// their executors to the oldest pending jobs.
    pub async fn poll_cycle(&mut self) -> Result<QueueCounts, FleetError> {
        self.cycles += 1;
        debug!("Poll cycle {}", self.cycles);

        let mut freed = Vec::new();
        for index in 0..self.jobs.len() {
            let slot = match self.jobs[index].state {
                JobState::Active { slot } => slot,
                _ => continue,
            };
            let executor = self.slots[slot].executor.as_ref();
            let entry = &mut self.jobs[index];
            let id = entry.job.id();

            match entry.job.poll(executor).await {
                PollOutcome::Pending => entry.transport_errors = 0,
                PollOutcome::TransportError(reason) => {
                    entry.transport_errors += 1;
                    warn!(
                        "Job {} on {}: completion check failed ({} in a row), retrying next cycle: {}",
                        id,
                        executor.name(),
                        entry.transport_errors,
                        reason
                    );
                }
                PollOutcome::Complete => {
                    info!("Job {} finished on {}", id, executor.name());
                    let outcome = match entry.job.collect(executor).await {
                        Ok(()) => CollectOutcome::Collected,
                        Err(e) => {
                            error!("Job {}: collecting results failed: {}", id, e);
                            CollectOutcome::Failed(e.to_string())
                        }
                    };
                    entry.state = JobState::Completed(outcome);
                    entry.transport_errors = 0;
                    freed.push(slot);
                }
            }
        }

        for slot in freed {
            self.slots[slot].state = SlotState::Idle;
            self.recycle(slot).await?;
        }
        self.release_bootstrap().await;

        self.check_invariants();
        let counts = self.counts();
        info!(
            "Cycle {}: {} pending, {} active, {} completed",
            self.cycles, counts.pending, counts.active, counts.completed
        );

        self.publish_status().await;

        if counts.completed == self.jobs.len() {
            self.set_phase(Phase::Draining);
        } else if counts.active == 0 {
            return Err(FleetError::NoExecutors(format!(
                "{} jobs pending but every executor has been retired",
                counts.pending
            )));
        }

        Ok(counts)
    }

    /// Provision, run every job to completion, then tear everything down.
    /// On error nothing is torn down; call `teardown` explicitly.
    pub async fn run(&mut self) -> Result<RunSummary, FleetError> {
        if self.jobs.is_empty() {
            warn!("No jobs submitted, nothing to run");
            self.set_phase(Phase::Terminated);
            return Ok(self.summary());
        }

        self.provision().await?;
        self.start().await?;
        self.publish_status().await;

        while !self.is_complete() {
            tokio::time::sleep(self.settings.poll_interval).await;
            self.poll_cycle().await?;
        }

        self.teardown().await?;
        Ok(self.summary())
    }

    /// Delete all remaining infrastructure, whatever state it is in.
    pub async fn teardown(&mut self) -> Result<(), FleetError> {
        info!("Tearing down all remaining infrastructure");
        self.provisioner.teardown().await?;
        self.set_phase(Phase::Terminated);
        Ok(())
    }

    pub fn summary(&self) -> RunSummary {
        let mut collected = 0;
        let mut collect_failures = 0;
        for entry in &self.jobs {
            match entry.state {
                JobState::Completed(CollectOutcome::Collected) => collected += 1,
                JobState::Completed(CollectOutcome::Failed(_)) => collect_failures += 1,
                _ => {}
            }
        }
        RunSummary {
            total_jobs: self.jobs.len(),
            collected,
            collect_failures,
            executors_launched: self.launched,
            executors_deleted: self.deleted_early,
            cycles: self.cycles,
        }
    }

    async fn activate_next(&mut self, slot: usize) -> Result<(), FleetError> {
        let index = self.next_pending;
        let executor = self.slots[slot].executor.as_ref();
        let entry = &mut self.jobs[index];

        entry.job.activate(executor).await?;
        entry.state = JobState::Active { slot };
        entry.address = executor.address().display_address().map(str::to_string);
        debug!("Job {} bound to {}", entry.job.id(), executor.name());

        self.slots[slot].state = SlotState::Busy(index);
        self.next_pending += 1;
        Ok(())
    }

    /// Clean a freed executor, then reuse it for the next pending job or
    /// delete it when nothing is left to run. A bootstrap host stays up
    /// while anything still tunnels through it.
    async fn recycle(&mut self, slot: usize) -> Result<(), FleetError> {
        if let Err(e) = self.slots[slot].executor.clean().await {
            if self.still_tunnelled(slot) {
                warn!(
                    "Cleaning {} failed, keeping it only as a bootstrap host: {}",
                    self.slots[slot].executor.name(),
                    e
                );
                self.slots[slot].state = SlotState::Faulted;
            } else {
                warn!(
                    "Cleaning {} failed, retiring it: {}",
                    self.slots[slot].executor.name(),
                    e
                );
                self.retire(slot).await;
            }
            return Ok(());
        }

        if self.next_pending < self.jobs.len() {
            self.activate_next(slot).await
        } else if self.still_tunnelled(slot) {
            debug!(
                "Keeping bootstrap host {} for executors tunnelled through it",
                self.slots[slot].executor.name()
            );
            Ok(())
        } else {
            debug!(
                "No pending jobs left for {}, deleting it",
                self.slots[slot].executor.name()
            );
            self.retire(slot).await;
            Ok(())
        }
    }

    /// True when `slot` is the bootstrap host and another executor that
    /// can still take work reaches the network through it.
    fn still_tunnelled(&self, slot: usize) -> bool {
        self.slots[slot].bootstrap
            && self.slots.iter().enumerate().any(|(i, s)| {
                i != slot && matches!(s.state, SlotState::Idle | SlotState::Busy(_))
            })
    }

    /// Delete a held bootstrap host once nothing tunnels through it.
    async fn release_bootstrap(&mut self) {
        let Some(slot) = self.slots.iter().position(|s| {
            s.bootstrap && matches!(s.state, SlotState::Idle | SlotState::Faulted)
        }) else {
            return;
        };
        if self.slots[slot].state == SlotState::Idle && self.next_pending < self.jobs.len() {
            return;
        }
        if !self.still_tunnelled(slot) {
            debug!(
                "Nothing tunnels through {} any more, deleting it",
                self.slots[slot].executor.name()
            );
            self.retire(slot).await;
        }
    }

    async fn retire(&mut self, slot: usize) {
        let s = &mut self.slots[slot];
        if let Err(e) = s.executor.delete().await {
            warn!(
                "Deleting {} failed, teardown will remove it: {}",
                s.executor.name(),
                e
            );
        }
        s.state = SlotState::Deleted;
        self.deleted_early += 1;
    }

    fn check_invariants(&self) {
        let counts = self.counts();
        assert_eq!(
            counts.total(),
            self.jobs.len(),
            "job queues out of balance: {:?}",
            counts
        );
        assert!(
            counts.active <= self.slots.len(),
            "{} active jobs on {} executors",
            counts.active,
            self.slots.len()
        );
        for (index, entry) in self.jobs.iter().enumerate() {
            if let JobState::Active { slot } = entry.state {
                assert_eq!(
                    self.slots[slot].state,
                    SlotState::Busy(index),
                    "job {} bound to an executor serving something else",
                    entry.job.id()
                );
            }
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            info!("Run phase: {} -> {}", self.phase, phase);
            self.phase = phase;
        }
    }

    /// Regenerate the status page. Failures never reach the caller.
    async fn publish_status(&self) {
        let Some(path) = self.settings.status_page.as_ref() else {
            return;
        };
        let rows = self.status_rows().await;
        if let Err(e) = status_page::write_page(path, &rows) {
            warn!("Could not write status page {}: {}", path.display(), e);
        }
    }

    async fn status_rows(&self) -> Vec<JobSnapshot> {
        let mut rows = Vec::with_capacity(self.jobs.len());
        for entry in &self.jobs {
            let status = match &entry.state {
                JobState::Pending => "pending".to_string(),
                JobState::Active { slot } => {
                    let executor = self.slots[*slot].executor.as_ref();
                    let message = match entry.job.status_message(executor).await {
                        Ok(message) => message,
                        Err(e) => {
                            debug!("Job {}: {}", entry.job.id(), e);
                            UNKNOWN_STATUS.to_string()
                        }
                    };
                    if entry.transport_errors > 0 {
                        format!("{} ({} failed checks)", message, entry.transport_errors)
                    } else {
                        message
                    }
                }
                JobState::Completed(CollectOutcome::Collected) => "completed".to_string(),
                JobState::Completed(CollectOutcome::Failed(reason)) => {
                    format!("collect failed: {}", reason)
                }
            };
            rows.push(snapshot_row(entry, status));
        }
        rows
    }
}

fn snapshot_row(entry: &JobEntry, status: String) -> JobSnapshot {
    JobSnapshot {
        id: entry.job.id().0,
        status,
        address: entry.address.clone(),
        output_path: entry.job.output_path().to_path_buf(),
    }
}
