//! Remote object models and request options.
//!
//! These are the decoded shapes the engine works with. The JSON:API envelope
//! lives in `http::jsonapi` and never leaks past the HTTP implementation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Workspaces
// =============================================================================

/// VCS connection of a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VcsRepo {
    pub identifier: String,
    pub oauth_token_id: String,
    pub branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub auto_apply: bool,
    pub allow_destroy_plan: bool,
    pub execution_mode: String,
    pub terraform_version: Option<String>,
    pub working_directory: Option<String>,
    pub global_remote_state: bool,
    pub speculative_enabled: bool,
    pub vcs_repo: Option<VcsRepo>,
    pub updated_at: Option<DateTime<Utc>>,
    pub project_id: Option<String>,
    pub agent_pool_id: Option<String>,
    pub ssh_key_id: Option<String>,
    pub current_run_id: Option<String>,
}

/// Attributes sent on workspace create and update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkspaceOptions {
    pub name: String,
    pub description: Option<String>,
    pub auto_apply: bool,
    pub allow_destroy_plan: bool,
    pub execution_mode: String,
    pub terraform_version: Option<String>,
    pub working_directory: Option<String>,
    pub global_remote_state: bool,
    pub speculative_enabled: bool,
    pub vcs_repo: Option<VcsRepo>,
    pub project_id: Option<String>,
    pub agent_pool_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

// =============================================================================
// Variables
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableCategory {
    Terraform,
    Env,
}

impl VariableCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableCategory::Terraform => "terraform",
            VariableCategory::Env => "env",
        }
    }
}

impl std::fmt::Display for VariableCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub id: String,
    pub key: String,
    /// `None` for sensitive variables: the remote never returns their value.
    pub value: Option<String>,
    pub description: Option<String>,
    pub category: VariableCategory,
    pub hcl: bool,
    pub sensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableOptions {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub category: VariableCategory,
    pub hcl: bool,
    pub sensitive: bool,
}

// =============================================================================
// Teams and access
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: String,
    pub name: String,
}

/// Custom workspace permissions, only honoured when access is `custom`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkspacePermissions {
    pub runs: Option<String>,
    pub variables: Option<String>,
    pub state_versions: Option<String>,
    pub sentinel_mocks: Option<String>,
    pub workspace_locking: Option<bool>,
    pub run_tasks: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamAccess {
    pub id: String,
    pub team_id: String,
    pub access: String,
    pub permissions: WorkspacePermissions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamAccessOptions {
    pub team_id: String,
    pub access: String,
    pub permissions: WorkspacePermissions,
}

/// Custom project permissions, only honoured when access is `custom`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProjectPermissions {
    pub settings: Option<String>,
    pub teams: Option<String>,
    pub create_workspace: Option<bool>,
    pub delete_workspace: Option<bool>,
    pub move_workspace: Option<bool>,
    pub locking: Option<bool>,
    pub runs: Option<String>,
    pub variables: Option<String>,
    pub state_versions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectTeamAccess {
    pub id: String,
    pub team_id: String,
    pub access: String,
    pub permissions: ProjectPermissions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectTeamAccessOptions {
    pub team_id: String,
    pub access: String,
    pub permissions: ProjectPermissions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationMembership {
    pub id: String,
    pub email: String,
    pub user_id: Option<String>,
}

// =============================================================================
// Notifications and run triggers
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfiguration {
    pub id: String,
    pub name: String,
    pub destination_type: String,
    pub enabled: bool,
    pub url: Option<String>,
    pub triggers: Vec<String>,
    pub email_addresses: Vec<String>,
    pub email_user_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOptions {
    pub name: String,
    pub destination_type: String,
    pub enabled: bool,
    pub url: Option<String>,
    /// Write-only HMAC token.
    pub token: Option<String>,
    pub triggers: Vec<String>,
    pub email_addresses: Vec<String>,
    pub email_user_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTrigger {
    pub id: String,
    pub sourceable_id: String,
    pub sourceable_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKey {
    pub id: String,
    pub name: String,
}

// =============================================================================
// Projects and agent pools
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectOptions {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPool {
    pub id: String,
    pub name: String,
    pub organization_scoped: bool,
    pub workspace_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPoolOptions {
    pub name: String,
    pub organization_scoped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentToken {
    pub id: String,
    pub description: String,
    pub created_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    /// Only present in the response that issued the token.
    pub token: Option<String>,
}

// =============================================================================
// Runs, configuration versions, state
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub id: String,
    pub status: String,
    pub is_destroy: bool,
    pub configuration_version_id: Option<String>,
}

impl Run {
    /// Run statuses after which the remote service does nothing further.
    pub fn is_final(&self) -> bool {
        run_status_is_final(&self.status)
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.status.as_str(), "applied" | "planned_and_finished")
    }
}

pub fn run_status_is_final(status: &str) -> bool {
    matches!(
        status,
        "applied"
            | "planned_and_finished"
            | "errored"
            | "canceled"
            | "force_canceled"
            | "discarded"
            | "policy_soft_failed"
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunOptions {
    pub workspace_id: String,
    pub configuration_version_id: Option<String>,
    pub is_destroy: bool,
    pub auto_apply: Option<bool>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationVersion {
    pub id: String,
    pub status: String,
    pub upload_url: Option<String>,
}

impl ConfigurationVersion {
    pub fn is_uploaded(&self) -> bool {
        self.status == "uploaded"
    }

    pub fn is_errored(&self) -> bool {
        self.status == "errored"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigurationVersionOptions {
    pub auto_queue_runs: bool,
    pub speculative: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateOutput {
    pub id: String,
    pub name: String,
    pub value: serde_json::Value,
    pub sensitive: bool,
}
