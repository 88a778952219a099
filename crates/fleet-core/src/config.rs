use crate::error::FleetError;
use crate::orchestrator::OrchestratorSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for a fleet run.
/// Loaded from ~/.config/compas-fleet/fleet.yaml unless a path is given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Azure resource group holding every VM of the run. Generated when absent.
    #[serde(default)]
    pub resource_group: Option<String>,
    #[serde(default = "default_location")]
    pub location: String,
    /// Requested pool size. Reduced to the job count when larger.
    pub executors: usize,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub topology: Topology,
    #[serde(default)]
    pub status_page: Option<PathBuf>,
    #[serde(default)]
    pub vm: VmOptions,
    pub jobs: JobsConfig,
    /// Set when `resource_group` was generated rather than configured.
    #[serde(skip)]
    pub group_generated: bool,
}

/// How workers are reached once provisioned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// Every VM gets a public address and is reached directly.
    #[default]
    Direct,
    /// Only the first VM is public; the rest are tunnelled through it.
    Bootstrap,
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topology::Direct => write!(f, "direct"),
            Topology::Bootstrap => write!(f, "bootstrap"),
        }
    }
}

/// Options handed to `az vm create` plus the SSH credentials used afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmOptions {
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_admin_username")]
    pub admin_username: String,
    #[serde(default = "default_size")]
    pub size: String,
    #[serde(default = "default_storage_sku")]
    pub storage_sku: String,
    #[serde(default = "default_public_key_path")]
    pub public_key_path: String,
    #[serde(default = "default_private_key_path")]
    pub private_key_path: String,
    #[serde(default)]
    pub ssh_port: Option<u16>,
    /// Limit on connecting and on any single blocking SSH call.
    #[serde(default = "default_ssh_timeout_secs")]
    pub ssh_timeout_secs: u64,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            image: default_image(),
            admin_username: default_admin_username(),
            size: default_size(),
            storage_sku: default_storage_sku(),
            public_key_path: default_public_key_path(),
            private_key_path: default_private_key_path(),
            ssh_port: None,
            ssh_timeout_secs: default_ssh_timeout_secs(),
        }
    }
}

impl VmOptions {
    /// Get the SSH port, falling back to 22.
    pub fn ssh_port(&self) -> u16 {
        self.ssh_port.unwrap_or(22)
    }

    pub fn ssh_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh_timeout_secs)
    }

    pub fn public_key(&self) -> PathBuf {
        expand_home(&self.public_key_path)
    }

    pub fn private_key(&self) -> PathBuf {
        expand_home(&self.private_key_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Statically linked simulation binary staged onto every VM.
    pub executable: PathBuf,
    /// One shell command per line; blank lines and `#` comments are skipped.
    pub commands_file: PathBuf,
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    #[serde(default = "default_result_files")]
    pub result_files: Vec<String>,
}

fn default_location() -> String {
    "centralus".to_string()
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_ssh_timeout_secs() -> u64 {
    60
}

fn default_image() -> String {
    "UbuntuLTS".to_string()
}

fn default_admin_username() -> String {
    "ops".to_string()
}

fn default_size() -> String {
    "Basic_A0".to_string()
}

fn default_storage_sku() -> String {
    "Standard_LRS".to_string()
}

fn default_public_key_path() -> String {
    "~/.ssh/id_rsa.pub".to_string()
}

fn default_private_key_path() -> String {
    "~/.ssh/id_rsa".to_string()
}

fn default_output_root() -> PathBuf {
    PathBuf::from(".")
}

pub fn default_result_files() -> Vec<String> {
    vec![
        "initialParameters.txt".to_string(),
        "mergingParameters.txt".to_string(),
        "formationHistory.txt".to_string(),
    ]
}

impl Config {
    /// Load config from the default path (~/.config/compas-fleet/fleet.yaml).
    pub fn load_default() -> Result<Self, FleetError> {
        Self::load_from(&Self::default_path())
    }

    /// Load and validate config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, FleetError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, FleetError> {
        let mut config: Config = serde_yaml::from_str(contents)?;
        if config.resource_group.is_none() {
            config.resource_group = Some(generate_group_name());
            config.group_generated = true;
        }
        config.validate()?;
        Ok(config)
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("compas-fleet")
            .join("fleet.yaml")
    }

    pub fn validate(&self) -> Result<(), FleetError> {
        if self.executors == 0 {
            return Err(FleetError::Config("'executors' must be at least 1".into()));
        }
        match self.resource_group.as_deref() {
            Some(name) if name.trim().is_empty() => {
                return Err(FleetError::Config("'resource_group' must not be empty".into()));
            }
            _ => {}
        }
        if self.jobs.result_files.is_empty() {
            return Err(FleetError::Config("'jobs.result_files' must name at least one file".into()));
        }
        Ok(())
    }

    /// Resource group name; `from_yaml` always fills it in.
    pub fn resource_group(&self) -> &str {
        self.resource_group.as_deref().unwrap_or_default()
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            requested_executors: self.executors,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            topology: self.topology,
            status_page: self.status_page.clone(),
        }
    }
}

/// Fresh resource group name; Azure accepts lowercase alphanumerics.
fn generate_group_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("fleet{}", &id[..8])
}

/// Expand a leading `~/` against the current user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(rest),
        None => PathBuf::from(path),
    }
}
