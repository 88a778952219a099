use crate::error::FleetError;
use std::path::{Path, PathBuf};

/// Network addresses reported by the control plane once a VM is up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmAddress {
    pub private: Option<String>,
    pub public: Option<String>,
}

impl VmAddress {
    /// The address an operator would use to reach the machine.
    pub fn display_address(&self) -> Option<&str> {
        self.public.as_deref().or(self.private.as_deref())
    }
}

/// A remote machine that runs one job at a time and serves file transfers.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Name of this executor (also the VM name).
    fn name(&self) -> &str;

    /// Addresses, filled in by `launch`.
    fn address(&self) -> &VmAddress;

    /// Provision the machine. With a bootstrap address the machine is only
    /// reachable by tunnelling through that host.
    async fn launch(&mut self, bootstrap: Option<&str>) -> Result<(), FleetError>;

    /// Copy a local file into `remote_dir` (relative to the remote home).
    async fn upload_file(&self, local_path: &Path, remote_dir: &str) -> Result<(), FleetError>;

    /// Copy a remote file into `local_dir`, returning the local path written.
    async fn download_file(&self, remote_path: &str, local_dir: &Path)
        -> Result<PathBuf, FleetError>;

    /// Run a command. With `wait == false` the command is detached and this
    /// returns as soon as it has been started.
    async fn send_command(&self, command: &str, wait: bool) -> Result<String, FleetError>;

    /// Wipe the remote working directory so the machine can be reused.
    async fn clean(&self) -> Result<(), FleetError>;

    /// Irreversibly deprovision the machine.
    async fn delete(&mut self) -> Result<(), FleetError>;
}

/// Cloud control plane: owns the resource group and hands out executors.
#[async_trait::async_trait]
pub trait Provisioner: Send + Sync {
    /// Create the group every executor lives in.
    async fn prepare(&self) -> Result<(), FleetError>;

    /// Construct the unprovisioned executor for pool slot `index`.
    fn executor(&self, index: usize) -> Box<dyn Executor>;

    /// Delete the whole group, including executors that already deleted
    /// themselves.
    async fn teardown(&self) -> Result<(), FleetError>;
}

/// Shell-escape a string for safe use in remote commands.
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
