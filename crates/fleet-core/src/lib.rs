pub mod config;
pub mod error;
pub mod executor;
pub mod job;
pub mod orchestrator;
pub mod simulation;
pub mod status_page;

pub use config::Config;
pub use error::FleetError;
pub use executor::{Executor, Provisioner, VmAddress};
pub use job::{CollectOutcome, Job, JobId, PollOutcome};
pub use orchestrator::{Orchestrator, OrchestratorSettings, Phase, QueueCounts, RunSummary};
pub use simulation::SimulationJob;
