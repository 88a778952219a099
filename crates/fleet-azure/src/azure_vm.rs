use crate::azure_cli::run_az;
use crate::ssh;
use crate::tunnel::Tunnel;
use fleet_core::config::VmOptions;
use fleet_core::error::FleetError;
use fleet_core::executor::{shell_escape, Executor, VmAddress};
use serde::Deserialize;
use ssh2::Session;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// Wipes the admin user's home directory. A no-op when there is nothing
/// left to remove.
pub const CLEAN_COMMAND: &str = "rm -rf ~/*";

/// How to reach the VM once it exists.
#[derive(Debug, Clone)]
enum Route {
    Direct { host: String },
    Via { bootstrap: String, target: String },
}

/// The subset of `az vm create --output json` we care about.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VmDetails {
    #[serde(default)]
    private_ip_address: Option<String>,
    #[serde(default)]
    public_ip_address: Option<String>,
}

/// An Azure VM driven through `az` for its lifecycle and SSH for work.
pub struct AzureVm {
    name: String,
    resource_group: String,
    location: String,
    options: VmOptions,
    address: VmAddress,
    route: Option<Route>,
    tunnel: Mutex<Option<Tunnel>>,
    deleted: bool,
}

impl AzureVm {
    pub fn new(name: String, resource_group: String, location: String, options: VmOptions) -> Self {
        Self {
            name,
            resource_group,
            location,
            options,
            address: VmAddress::default(),
            route: None,
            tunnel: Mutex::new(None),
            deleted: false,
        }
    }

    /// Arguments for `az vm create`. Tunnelled VMs get no public address.
    pub fn create_args(&self, bootstrap: Option<&str>) -> Vec<String> {
        let mut args: Vec<String> = [
            "vm",
            "create",
            "--resource-group",
            self.resource_group.as_str(),
            "--name",
            self.name.as_str(),
            "--location",
            self.location.as_str(),
            "--image",
            self.options.image.as_str(),
            "--admin-username",
            self.options.admin_username.as_str(),
            "--size",
            self.options.size.as_str(),
            "--storage-sku",
            self.options.storage_sku.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.push("--ssh-key-values".to_string());
        args.push(self.options.public_key().display().to_string());
        if bootstrap.is_some() {
            args.push("--public-ip-address".to_string());
            args.push(String::new());
        }
        args.push("--output".to_string());
        args.push("json".to_string());
        args
    }

    fn delete_args(&self) -> Vec<String> {
        [
            "vm",
            "delete",
            "--yes",
            "--resource-group",
            self.resource_group.as_str(),
            "--name",
            self.name.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Open a session, through the bootstrap tunnel when there is one.
    fn session(&self) -> Result<Session, FleetError> {
        let route = self.route.as_ref().ok_or_else(|| {
            FleetError::SshConnection(format!("{} has not been launched", self.name))
        })?;
        let user = &self.options.admin_username;
        let key = self.options.private_key();
        let port = self.options.ssh_port();
        let timeout = self.options.ssh_timeout();

        match route {
            Route::Direct { host } => ssh::connect(host, port, user, &key, timeout),
            Route::Via { bootstrap, target } => {
                let mut tunnel = self
                    .tunnel
                    .lock()
                    .map_err(|_| FleetError::SshConnection("tunnel lock poisoned".into()))?;
                if tunnel.is_none() {
                    let jump = ssh::connect(bootstrap, port, user, &key, timeout)?;
                    *tunnel = Some(Tunnel::open(jump, target, port)?);
                }
                let local = tunnel
                    .as_ref()
                    .map(Tunnel::local_addr)
                    .ok_or_else(|| FleetError::SshConnection("tunnel unavailable".into()))?;

                let sess =
                    ssh::connect(&local.ip().to_string(), local.port(), user, &key, timeout);
                if sess.is_err() {
                    // Reopen on the next attempt in case the bootstrap link died.
                    *tunnel = None;
                }
                sess
            }
        }
    }
}

/// Pull the two addresses out of `az vm create` output.
pub fn parse_vm_details(stdout: &str) -> Result<VmAddress, FleetError> {
    let details: VmDetails = serde_json::from_str(stdout)
        .map_err(|e| FleetError::Provisioning(format!("unreadable az output: {}", e)))?;
    let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
    let address = VmAddress {
        private: non_empty(details.private_ip_address),
        public: non_empty(details.public_ip_address),
    };
    if address.private.is_none() && address.public.is_none() {
        return Err(FleetError::Provisioning(
            "az output has no IP address".into(),
        ));
    }
    Ok(address)
}

/// Wrap a command so it keeps running after the SSH channel closes.
pub fn detached(command: &str) -> String {
    format!(
        "nohup sh -c {} > /dev/null 2>&1 < /dev/null &",
        shell_escape(command)
    )
}

#[async_trait::async_trait]
impl Executor for AzureVm {
    fn name(&self) -> &str {
        &self.name
    }

    fn address(&self) -> &VmAddress {
        &self.address
    }

    async fn launch(&mut self, bootstrap: Option<&str>) -> Result<(), FleetError> {
        info!("Launching VM {}", self.name);
        let stdout = run_az(&self.create_args(bootstrap)).await?;
        let address = parse_vm_details(&stdout)?;

        let route = match bootstrap {
            Some(hop) => Route::Via {
                bootstrap: hop.to_string(),
                target: address.private.clone().ok_or_else(|| {
                    FleetError::Provisioning(format!("{} has no private address", self.name))
                })?,
            },
            None => Route::Direct {
                host: address.public.clone().ok_or_else(|| {
                    FleetError::Provisioning(format!("{} has no public address", self.name))
                })?,
            },
        };

        info!(
            "VM {} launched (private {}, public {})",
            self.name,
            address.private.as_deref().unwrap_or("-"),
            address.public.as_deref().unwrap_or("-")
        );
        self.address = address;
        self.route = Some(route);
        Ok(())
    }

    async fn upload_file(&self, local_path: &Path, remote_dir: &str) -> Result<(), FleetError> {
        let name = local_path.file_name().ok_or_else(|| {
            FleetError::Transfer(format!("{} is not a file", local_path.display()))
        })?;
        let remote = Path::new(remote_dir).join(name);
        let sess = self
            .session()
            .map_err(|e| FleetError::Transfer(e.to_string()))?;
        ssh::upload(&sess, local_path, &remote)
    }

    async fn download_file(
        &self,
        remote_path: &str,
        local_dir: &Path,
    ) -> Result<PathBuf, FleetError> {
        let name = Path::new(remote_path).file_name().ok_or_else(|| {
            FleetError::Transfer(format!("{} is not a file", remote_path))
        })?;
        let local = local_dir.join(name);
        let sess = self
            .session()
            .map_err(|e| FleetError::Transfer(e.to_string()))?;
        ssh::download(&sess, Path::new(remote_path), &local)?;
        Ok(local)
    }

    async fn send_command(&self, command: &str, wait: bool) -> Result<String, FleetError> {
        let sess = self.session()?;
        if wait {
            ssh::exec(&sess, command)
        } else {
            ssh::exec(&sess, &detached(command))
        }
    }

    async fn clean(&self) -> Result<(), FleetError> {
        info!("Cleaning VM {}", self.name);
        let sess = self.session()?;
        ssh::exec(&sess, CLEAN_COMMAND)?;
        Ok(())
    }

    async fn delete(&mut self) -> Result<(), FleetError> {
        if self.deleted {
            return Ok(());
        }
        if let Ok(mut tunnel) = self.tunnel.lock() {
            tunnel.take();
        }

        warn!("Deleting VM {}", self.name);
        run_az(&self.delete_args()).await?;
        self.deleted = true;
        Ok(())
    }
}
