//! Remote service trait definitions.
//!
//! The engine only ever talks to [`TfcApi`]; the HTTP implementation and the
//! in-memory test double both implement every domain trait below.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;
use crate::paging::{ListOptions, Page};

#[async_trait]
pub trait WorkspaceApi: Send + Sync {
    async fn list_workspaces(&self, org: &str, opts: &ListOptions) -> Result<Page<Workspace>>;

    async fn create_workspace(&self, org: &str, opts: &WorkspaceOptions) -> Result<Workspace>;

    async fn read_workspace(&self, id: &str) -> Result<Workspace>;

    async fn update_workspace(&self, id: &str, opts: &WorkspaceOptions) -> Result<Workspace>;

    /// Unconditional delete.
    async fn delete_workspace(&self, id: &str) -> Result<()>;

    /// Delete that fails with [`crate::ClientError::Conflict`] while the
    /// workspace still manages resources.
    async fn safe_delete_workspace(&self, id: &str) -> Result<()>;

    async fn assign_ssh_key(&self, workspace_id: &str, ssh_key_id: &str) -> Result<()>;

    async fn unassign_ssh_key(&self, workspace_id: &str) -> Result<()>;
}

#[async_trait]
pub trait TagApi: Send + Sync {
    async fn list_workspace_tags(&self, workspace_id: &str, opts: &ListOptions)
    -> Result<Page<Tag>>;

    async fn add_workspace_tags(&self, workspace_id: &str, names: &[String]) -> Result<()>;

    async fn remove_workspace_tags(&self, workspace_id: &str, tags: &[Tag]) -> Result<()>;
}

#[async_trait]
pub trait RemoteStateApi: Send + Sync {
    async fn list_remote_state_consumers(
        &self,
        workspace_id: &str,
        opts: &ListOptions,
    ) -> Result<Page<Workspace>>;

    async fn add_remote_state_consumers(
        &self,
        workspace_id: &str,
        consumer_ids: &[String],
    ) -> Result<()>;

    async fn remove_remote_state_consumers(
        &self,
        workspace_id: &str,
        consumer_ids: &[String],
    ) -> Result<()>;
}

#[async_trait]
pub trait VariableApi: Send + Sync {
    async fn list_variables(&self, workspace_id: &str, opts: &ListOptions)
    -> Result<Page<Variable>>;

    async fn create_variable(&self, workspace_id: &str, opts: &VariableOptions)
    -> Result<Variable>;

    async fn update_variable(
        &self,
        workspace_id: &str,
        variable_id: &str,
        opts: &VariableOptions,
    ) -> Result<Variable>;

    async fn delete_variable(&self, workspace_id: &str, variable_id: &str) -> Result<()>;
}

#[async_trait]
pub trait TeamApi: Send + Sync {
    async fn list_teams(&self, org: &str, opts: &ListOptions) -> Result<Page<Team>>;

    async fn list_team_access(
        &self,
        workspace_id: &str,
        opts: &ListOptions,
    ) -> Result<Page<TeamAccess>>;

    async fn add_team_access(
        &self,
        workspace_id: &str,
        opts: &TeamAccessOptions,
    ) -> Result<TeamAccess>;

    async fn update_team_access(&self, id: &str, opts: &TeamAccessOptions) -> Result<TeamAccess>;

    async fn remove_team_access(&self, id: &str) -> Result<()>;

    async fn list_project_team_access(
        &self,
        project_id: &str,
        opts: &ListOptions,
    ) -> Result<Page<ProjectTeamAccess>>;

    async fn add_project_team_access(
        &self,
        project_id: &str,
        opts: &ProjectTeamAccessOptions,
    ) -> Result<ProjectTeamAccess>;

    async fn update_project_team_access(
        &self,
        id: &str,
        opts: &ProjectTeamAccessOptions,
    ) -> Result<ProjectTeamAccess>;

    async fn remove_project_team_access(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait OrganizationApi: Send + Sync {
    /// Memberships, `search` matches user name or e-mail.
    async fn list_organization_memberships(
        &self,
        org: &str,
        opts: &ListOptions,
    ) -> Result<Page<OrganizationMembership>>;

    async fn list_ssh_keys(&self, org: &str, opts: &ListOptions) -> Result<Page<SshKey>>;
}

#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn list_notifications(
        &self,
        workspace_id: &str,
        opts: &ListOptions,
    ) -> Result<Page<NotificationConfiguration>>;

    async fn create_notification(
        &self,
        workspace_id: &str,
        opts: &NotificationOptions,
    ) -> Result<NotificationConfiguration>;

    async fn update_notification(
        &self,
        id: &str,
        opts: &NotificationOptions,
    ) -> Result<NotificationConfiguration>;

    async fn delete_notification(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait RunTriggerApi: Send + Sync {
    /// Inbound triggers of a workspace (the workspaces that trigger it).
    async fn list_run_triggers(
        &self,
        workspace_id: &str,
        opts: &ListOptions,
    ) -> Result<Page<RunTrigger>>;

    async fn create_run_trigger(&self, workspace_id: &str, sourceable_id: &str)
    -> Result<RunTrigger>;

    async fn delete_run_trigger(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait ProjectApi: Send + Sync {
    async fn list_projects(&self, org: &str, opts: &ListOptions) -> Result<Page<Project>>;

    async fn create_project(&self, org: &str, opts: &ProjectOptions) -> Result<Project>;

    async fn read_project(&self, id: &str) -> Result<Project>;

    async fn update_project(&self, id: &str, opts: &ProjectOptions) -> Result<Project>;

    /// Refused with [`crate::ClientError::Conflict`] while workspaces remain.
    async fn delete_project(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait AgentPoolApi: Send + Sync {
    async fn list_agent_pools(&self, org: &str, opts: &ListOptions) -> Result<Page<AgentPool>>;

    async fn create_agent_pool(&self, org: &str, opts: &AgentPoolOptions) -> Result<AgentPool>;

    async fn read_agent_pool(&self, id: &str) -> Result<AgentPool>;

    async fn update_agent_pool(&self, id: &str, opts: &AgentPoolOptions) -> Result<AgentPool>;

    async fn delete_agent_pool(&self, id: &str) -> Result<()>;

    async fn list_agent_tokens(&self, pool_id: &str, opts: &ListOptions)
    -> Result<Page<AgentToken>>;

    /// Issue a token; the secret value is only present in this response.
    async fn create_agent_token(&self, pool_id: &str, description: &str) -> Result<AgentToken>;

    async fn delete_agent_token(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait RunApi: Send + Sync {
    async fn create_run(&self, opts: &RunOptions) -> Result<Run>;

    async fn read_run(&self, id: &str) -> Result<Run>;

    async fn create_configuration_version(
        &self,
        workspace_id: &str,
        opts: &ConfigurationVersionOptions,
    ) -> Result<ConfigurationVersion>;

    async fn read_configuration_version(&self, id: &str) -> Result<ConfigurationVersion>;

    /// Upload a gzipped tarball to the URL handed out on creation.
    async fn upload_configuration(&self, upload_url: &str, archive: Vec<u8>) -> Result<()>;

    async fn list_current_state_outputs(
        &self,
        workspace_id: &str,
        opts: &ListOptions,
    ) -> Result<Page<StateOutput>>;
}

/// Composite remote service trait.
///
/// This is the handle the engine receives for one reconciliation pass.
pub trait TfcApi:
    WorkspaceApi
    + TagApi
    + RemoteStateApi
    + VariableApi
    + TeamApi
    + OrganizationApi
    + NotificationApi
    + RunTriggerApi
    + ProjectApi
    + AgentPoolApi
    + RunApi
    + Send
    + Sync
{
}

impl<T> TfcApi for T where
    T: WorkspaceApi
        + TagApi
        + RemoteStateApi
        + VariableApi
        + TeamApi
        + OrganizationApi
        + NotificationApi
        + RunTriggerApi
        + ProjectApi
        + AgentPoolApi
        + RunApi
        + Send
        + Sync
{
}

/// Builds a client bound to one credential.
///
/// Called at the top of every reconciliation pass; nothing is pooled
/// across resource identities.
pub trait ClientFactory: Send + Sync {
    fn connect(&self, token: &str) -> Result<Arc<dyn TfcApi>>;
}
