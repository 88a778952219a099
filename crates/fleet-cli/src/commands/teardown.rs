use super::load_config;
use fleet_azure::AzureCli;
use fleet_core::executor::Provisioner;
use std::path::Path;

pub async fn run(config_path: Option<&Path>, resource_group: Option<String>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    match resource_group {
        Some(group) => config.resource_group = Some(group),
        None if config.group_generated => {
            anyhow::bail!("No resource_group in the config; pass --resource-group")
        }
        None => {}
    }

    let cli = AzureCli::new(&config);
    cli.teardown().await?;
    println!("Resource group {} deleted.", cli.resource_group());

    Ok(())
}
