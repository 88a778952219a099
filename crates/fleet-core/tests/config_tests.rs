use fleet_core::config::{Config, Topology};
use fleet_core::error::FleetError;
use fleet_core::simulation::jobs_from_config;
use std::time::Duration;

const MINIMAL: &str = r#"
executors: 3
jobs:
  executable: /opt/compas/COMPAS
  commands_file: commands.txt
"#;

#[test]
fn test_defaults_applied() {
    let config = Config::from_yaml(MINIMAL).unwrap();

    assert_eq!(config.location, "centralus");
    assert_eq!(config.poll_interval_secs, 300);
    assert_eq!(config.topology, Topology::Direct);
    assert_eq!(config.vm.image, "UbuntuLTS");
    assert_eq!(config.vm.admin_username, "ops");
    assert_eq!(config.vm.size, "Basic_A0");
    assert_eq!(config.vm.ssh_port(), 22);
    assert_eq!(config.vm.ssh_timeout(), Duration::from_secs(60));
    assert_eq!(config.jobs.result_files.len(), 3);
    assert!(config.status_page.is_none());
}

#[test]
fn test_resource_group_generated_when_missing() {
    let config = Config::from_yaml(MINIMAL).unwrap();
    let name = config.resource_group();
    assert!(name.starts_with("fleet"));
    assert_eq!(name.len(), "fleet".len() + 8);
}

#[test]
fn test_explicit_settings() {
    let yaml = r#"
resource_group: qwerty1234567
executors: 3
poll_interval_secs: 30
topology: bootstrap
status_page: /var/www/fleet.html
vm:
  size: Standard_B1s
  ssh_port: 2222
  ssh_timeout_secs: 15
jobs:
  executable: /opt/compas/COMPAS
  commands_file: commands.txt
  result_files: [compasOutput.h5]
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.resource_group(), "qwerty1234567");
    assert_eq!(config.vm.size, "Standard_B1s");
    assert_eq!(config.vm.ssh_port(), 2222);
    assert_eq!(config.vm.ssh_timeout(), Duration::from_secs(15));

    let settings = config.orchestrator_settings();
    assert_eq!(settings.requested_executors, 3);
    assert_eq!(settings.poll_interval, Duration::from_secs(30));
    assert_eq!(settings.topology, Topology::Bootstrap);
    assert!(settings.status_page.is_some());
}

#[test]
fn test_rejects_zero_executors() {
    let yaml = MINIMAL.replace("executors: 3", "executors: 0");
    assert!(matches!(Config::from_yaml(&yaml), Err(FleetError::Config(_))));
}

#[test]
fn test_rejects_empty_result_files() {
    let yaml = format!("{}  result_files: []\n", MINIMAL);
    assert!(matches!(Config::from_yaml(&yaml), Err(FleetError::Config(_))));
}

#[test]
fn test_rejects_malformed_yaml() {
    assert!(matches!(
        Config::from_yaml("executors: [oops"),
        Err(FleetError::Yaml(_))
    ));
}

#[test]
fn test_jobs_built_with_output_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let commands = dir.path().join("commands.txt");
    std::fs::write(&commands, "./COMPAS -n 25\n# skipped\n./COMPAS -n 50\n").unwrap();

    let yaml = format!(
        "executors: 2\njobs:\n  executable: /opt/compas/COMPAS\n  commands_file: {}\n  output_root: {}\n",
        commands.display(),
        dir.path().join("runs").display()
    );
    let config = Config::from_yaml(&yaml).unwrap();
    let jobs = jobs_from_config(&config).unwrap();

    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[1].command(), "./COMPAS -n 50");
    assert!(dir.path().join("runs/output0").is_dir());
    assert!(dir.path().join("runs/output1").is_dir());
}

#[test]
fn test_generated_group_is_flagged() {
    assert!(Config::from_yaml(MINIMAL).unwrap().group_generated);
    let explicit = format!("resource_group: grid7\n{}", MINIMAL);
    assert!(!Config::from_yaml(&explicit).unwrap().group_generated);
}
