//! Operator configuration.

use std::time::Duration;

use clap::Parser;

/// HCP Terraform operator
#[derive(Parser, Debug, Clone)]
#[command(name = "tfc-operator", version, about)]
pub struct Args {
    /// Namespace to watch (repeatable, all namespaces when omitted)
    #[arg(long = "namespace", env = "TFC_OPERATOR_NAMESPACES", value_delimiter = ',')]
    pub namespaces: Vec<String>,

    /// Concurrent Workspace reconciliations
    #[arg(long, env = "TFC_WORKSPACE_WORKERS", default_value = "1")]
    pub workspace_workers: u16,

    /// Concurrent Project reconciliations
    #[arg(long, env = "TFC_PROJECT_WORKERS", default_value = "1")]
    pub project_workers: u16,

    /// Concurrent Module reconciliations
    #[arg(long, env = "TFC_MODULE_WORKERS", default_value = "1")]
    pub module_workers: u16,

    /// Concurrent AgentPool reconciliations
    #[arg(long, env = "TFC_AGENT_POOL_WORKERS", default_value = "1")]
    pub agent_pool_workers: u16,

    /// Periodic full resync in seconds
    #[arg(long, env = "TFC_SYNC_PERIOD", default_value = "300")]
    pub sync_period: u64,

    /// Retry delay after a failed pass in seconds
    #[arg(long, env = "TFC_REQUEUE_INTERVAL", default_value = "15")]
    pub requeue_interval: u64,

    /// Run and configuration version polling interval in seconds
    #[arg(long, env = "TFC_POLL_INTERVAL", default_value = "10")]
    pub poll_interval: u64,

    /// HCP Terraform or Terraform Enterprise address
    #[arg(long, env = "TFE_ADDRESS", default_value = "https://app.terraform.io")]
    pub tfe_address: String,

    /// Accept invalid TLS certificates from the remote service
    #[arg(long, env = "TFE_SKIP_TLS_VERIFY")]
    pub skip_tls_verify: bool,
}

/// Settings the engine reads at runtime.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub namespaces: Vec<String>,
    pub workspace_workers: u16,
    pub project_workers: u16,
    pub module_workers: u16,
    pub agent_pool_workers: u16,
    pub sync_period: Duration,
    pub requeue_interval: Duration,
    pub poll_interval: Duration,
    /// Delay before the pass that follows a finalizer attach.
    pub attach_requeue: Duration,
    pub tfe_address: String,
    pub skip_tls_verify: bool,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespaces: Vec::new(),
            workspace_workers: 1,
            project_workers: 1,
            module_workers: 1,
            agent_pool_workers: 1,
            sync_period: Duration::from_secs(300),
            requeue_interval: Duration::from_secs(15),
            poll_interval: Duration::from_secs(10),
            attach_requeue: Duration::from_secs(1),
            tfe_address: "https://app.terraform.io".to_string(),
            skip_tls_verify: false,
        }
    }
}

impl From<Args> for OperatorConfig {
    fn from(args: Args) -> Self {
        Self {
            namespaces: args.namespaces,
            workspace_workers: args.workspace_workers.max(1),
            project_workers: args.project_workers.max(1),
            module_workers: args.module_workers.max(1),
            agent_pool_workers: args.agent_pool_workers.max(1),
            sync_period: Duration::from_secs(args.sync_period),
            requeue_interval: Duration::from_secs(args.requeue_interval),
            poll_interval: Duration::from_secs(args.poll_interval),
            tfe_address: args.tfe_address,
            skip_tls_verify: args.skip_tls_verify,
            ..Default::default()
        }
    }
}
