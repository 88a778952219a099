use crate::azure_vm::AzureVm;
use fleet_core::config::{Config, VmOptions};
use fleet_core::error::FleetError;
use fleet_core::executor::{Executor, Provisioner};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Run an `az` command and return stdout.
pub(crate) async fn run_az(args: &[String]) -> Result<String, FleetError> {
    debug!("Running: az {}", args.join(" "));

    let output = Command::new("az")
        .args(args)
        .output()
        .await
        .map_err(|e| FleetError::Provisioning(format!("Failed to run az: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FleetError::Provisioning(format!(
            "az {} failed: {}",
            args.iter().take(2).cloned().collect::<Vec<_>>().join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Resource-group level control plane backed by the Azure CLI.
pub struct AzureCli {
    resource_group: String,
    location: String,
    vm: VmOptions,
}

impl AzureCli {
    pub fn new(config: &Config) -> Self {
        Self {
            resource_group: config.resource_group().to_string(),
            location: config.location.clone(),
            vm: config.vm.clone(),
        }
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    /// Name of the VM in pool slot `index`.
    pub fn vm_name(&self, index: usize) -> String {
        format!("{}vm{}", self.resource_group, index)
    }
}

#[async_trait::async_trait]
impl Provisioner for AzureCli {
    async fn prepare(&self) -> Result<(), FleetError> {
        info!(
            "Creating resource group {} in {}",
            self.resource_group, self.location
        );
        run_az(&[
            "group".to_string(),
            "create".to_string(),
            "--name".to_string(),
            self.resource_group.clone(),
            "--location".to_string(),
            self.location.clone(),
            "--output".to_string(),
            "none".to_string(),
        ])
        .await?;
        Ok(())
    }

    fn executor(&self, index: usize) -> Box<dyn Executor> {
        Box::new(AzureVm::new(
            self.vm_name(index),
            self.resource_group.clone(),
            self.location.clone(),
            self.vm.clone(),
        ))
    }

    async fn teardown(&self) -> Result<(), FleetError> {
        warn!("Deleting resource group {}", self.resource_group);
        run_az(&[
            "group".to_string(),
            "delete".to_string(),
            "--yes".to_string(),
            "--name".to_string(),
            self.resource_group.clone(),
        ])
        .await?;
        Ok(())
    }
}
