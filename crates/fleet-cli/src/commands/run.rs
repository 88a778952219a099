use crate::dispatch;
use fleet_core::config::Config;
use tracing::{error, info, warn};

pub async fn run(config: &Config, teardown_on_failure: bool) -> anyhow::Result<()> {
    info!(
        "Starting run in resource group {} ({} executors requested)",
        config.resource_group(),
        config.executors
    );
    let mut orchestrator = dispatch::create_orchestrator(config)?;

    match orchestrator.run().await {
        Ok(summary) => {
            println!("Run complete:");
            println!("  Jobs:               {}", summary.total_jobs);
            println!("  Results collected:  {}", summary.collected);
            println!("  Collect failures:   {}", summary.collect_failures);
            println!("  Executors launched: {}", summary.executors_launched);
            println!("  Deleted early:      {}", summary.executors_deleted);
            println!("  Poll cycles:        {}", summary.cycles);
            if summary.collect_failures > 0 {
                warn!(
                    "{} jobs finished without all of their results",
                    summary.collect_failures
                );
            }
            Ok(())
        }
        Err(e) => {
            error!("Run failed: {}", e);
            if !teardown_on_failure {
                warn!(
                    "Leaving resource group {} in place; run `compas-fleet teardown` when done",
                    config.resource_group()
                );
            } else if let Err(teardown) = orchestrator.teardown().await {
                error!("Teardown after failure also failed: {}", teardown);
            }
            Err(e.into())
        }
    }
}
