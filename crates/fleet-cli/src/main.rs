use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod dispatch;

#[derive(Parser)]
#[command(name = "compas-fleet")]
#[command(about = "Run COMPAS batch jobs across a pool of Azure VMs", long_about = None)]
struct Cli {
    /// Log every remote command and file transfer
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the pool, run every job, collect results and tear down
    Run {
        /// Config file (defaults to the per-user config path)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Delete the resource group if the run fails (kept by default)
        #[arg(long)]
        teardown_on_failure: bool,
    },

    /// Delete the resource group and everything in it
    Teardown {
        /// Config file (defaults to the per-user config path)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Resource group to delete, overriding the config
        #[arg(short, long)]
        resource_group: Option<String>,
    },

    /// Show or initialise the config file
    Config {
        /// Print the default config path and exit
        #[arg(long)]
        path: bool,

        /// Write a sample config to the default path
        #[arg(long)]
        init: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    use Commands::*;

    match cli.command {
        Run {
            config,
            teardown_on_failure,
        } => {
            let config = commands::load_config(config.as_deref())?;
            commands::run::run(&config, teardown_on_failure).await?;
        }
        Teardown {
            config,
            resource_group,
        } => {
            commands::teardown::run(config.as_deref(), resource_group).await?;
        }
        Config { path, init } => {
            commands::config::run(path, init).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_run_keeps_group_unless_asked() {
        let cli = Cli::try_parse_from(["compas-fleet", "run"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Run {
                teardown_on_failure: false,
                ..
            }
        ));

        let cli =
            Cli::try_parse_from(["compas-fleet", "run", "--teardown-on-failure"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Run {
                teardown_on_failure: true,
                ..
            }
        ));
    }

    #[test]
    fn test_keep_on_failure_not_accepted() {
        assert!(Cli::try_parse_from(["compas-fleet", "run", "--keep-on-failure"]).is_err());
    }
}
