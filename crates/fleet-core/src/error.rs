use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    #[error("File transfer failed: {0}")]
    Transfer(String),

    #[error("Status query failed: {0}")]
    StatusQuery(String),

    #[error("SSH connection failed: {0}")]
    SshConnection(String),

    #[error("SSH command failed: {0}")]
    SshCommand(String),

    #[error("Remote command exited with status {status}: {stderr}")]
    Command { status: i32, stderr: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No executors available: {0}")]
    NoExecutors(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
