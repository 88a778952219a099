use fleet_core::Config;
use std::path::Path;

const SAMPLE_CONFIG: &str = r#"# compas-fleet configuration

# Azure resource group for the run; generated when omitted.
resource_group: compasgrid01
location: centralus

# Pool size. Reduced to the number of jobs when larger.
executors: 3

# Seconds between completion checks.
poll_interval_secs: 300

# direct: every VM gets a public IP.
# bootstrap: only the first VM is public, the rest are reached through it.
topology: direct

# HTML snapshot of every job, rewritten on each poll cycle.
status_page: ./status.html

vm:
  image: UbuntuLTS
  admin_username: ops
  size: Basic_A0
  storage_sku: Standard_LRS
  public_key_path: ~/.ssh/id_rsa.pub
  private_key_path: ~/.ssh/id_rsa

jobs:
  executable: ./COMPAS
  # One COMPAS command line per line.
  commands_file: ./commands.txt
  output_root: .
  result_files:
    - initialParameters.txt
    - mergingParameters.txt
    - formationHistory.txt
"#;

pub async fn run(path: bool, init: bool) -> anyhow::Result<()> {
    if path {
        println!("{}", Config::default_path().display());
        return Ok(());
    }

    if init {
        let config_path = Config::default_path();
        if config_path.exists() {
            println!("Config already exists at: {}", config_path.display());
            println!("Remove it first if you want to reinitialize.");
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&config_path, SAMPLE_CONFIG)?;
        println!("Sample config written to: {}", config_path.display());
        return Ok(());
    }

    let config_path = Config::default_path();
    if config_path.exists() {
        let config = Config::load_from(&config_path)?;
        print!("{}", describe(&config_path, &config));
    } else {
        println!("No config at {}", config_path.display());
        println!("Run `compas-fleet config --init` to create one.");
    }

    Ok(())
}

/// Settings that decide the shape of a run, one per line.
fn describe(path: &Path, config: &Config) -> String {
    let group = if config.group_generated {
        format!("{} (generated)", config.resource_group())
    } else {
        config.resource_group().to_string()
    };
    let rows = [
        ("Config", path.display().to_string()),
        ("Resource group", group),
        ("Location", config.location.clone()),
        ("Executors", config.executors.to_string()),
        ("Topology", config.topology.to_string()),
        ("Poll interval", format!("{}s", config.poll_interval_secs)),
        ("VM size", config.vm.size.clone()),
        ("Commands", config.jobs.commands_file.display().to_string()),
    ];
    rows.iter()
        .map(|(label, value)| format!("{:<16}{}\n", format!("{}:", label), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_parses() {
        let config = Config::from_yaml(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.resource_group(), "compasgrid01");
        assert_eq!(config.executors, 3);
        assert_eq!(config.jobs.result_files.len(), 3);
    }

    #[test]
    fn test_describe_aligns_values() {
        let config = Config::from_yaml(SAMPLE_CONFIG).unwrap();
        let text = describe(Path::new("/home/ops/fleet.yaml"), &config);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Config:         /home/ops/fleet.yaml");
        assert_eq!(lines[1], "Resource group: compasgrid01");
        assert_eq!(lines[3], "Executors:      3");
        assert!(lines.iter().all(|l| l.len() > 16 && &l[15..16] == " "));
    }
}
