use fleet_azure::AzureCli;
use fleet_core::config::Config;
use fleet_core::job::Job;
use fleet_core::simulation::jobs_from_config;
use fleet_core::{FleetError, Orchestrator};

/// Build an orchestrator for every job in the config, backed by Azure.
pub fn create_orchestrator(config: &Config) -> Result<Orchestrator, FleetError> {
    let jobs: Vec<Box<dyn Job>> = jobs_from_config(config)?
        .into_iter()
        .map(|job| Box::new(job) as Box<dyn Job>)
        .collect();

    Ok(Orchestrator::new(
        Box::new(AzureCli::new(config)),
        jobs,
        config.orchestrator_settings(),
    ))
}
