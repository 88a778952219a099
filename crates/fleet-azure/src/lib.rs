pub mod azure_cli;
pub mod azure_vm;
pub mod ssh;
pub mod tunnel;

pub use azure_cli::AzureCli;
pub use azure_vm::AzureVm;
