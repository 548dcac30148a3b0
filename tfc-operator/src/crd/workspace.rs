//! Workspace custom resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{
    ConfigMapKeySelector, DeletionPolicy, ManagedResource, NamedRef, SecretKeySelector, Token,
    first_duplicate, validate_common,
};

/// Desired state of an HCP Terraform workspace and everything attached to it.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "app.terraform.io",
    version = "v1alpha2",
    kind = "Workspace",
    namespaced,
    status = "WorkspaceStatus",
    shortname = "ws",
    printcolumn = r#"{"name":"Workspace ID","type":"string","jsonPath":".status.workspaceID"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSpec {
    pub organization: String,
    pub token: Token,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub apply_method: ApplyMethod,

    #[serde(default = "default_true")]
    pub allow_destroy_plan: bool,

    #[serde(default)]
    pub execution_mode: ExecutionMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,

    /// Required when `executionMode` is `agent`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_pool: Option<NamedRef>,

    /// Unset means the organization's default project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<NamedRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_control: Option<VersionControl>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub terraform_variables: Vec<WorkspaceVariable>,

    #[serde(default)]
    pub environment_variables: Vec<WorkspaceVariable>,

    #[serde(default)]
    pub team_access: Vec<TeamAccessSpec>,

    #[serde(default)]
    pub notifications: Vec<NotificationSpec>,

    /// Workspaces whose successful applies queue a run here.
    #[serde(default)]
    pub run_triggers: Vec<NamedRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<NamedRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_state_sharing: Option<RemoteStateSharing>,

    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApplyMethod {
    Auto,
    #[default]
    Manual,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Remote,
    Local,
    Agent,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Remote => "remote",
            ExecutionMode::Local => "local",
            ExecutionMode::Agent => "agent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VersionControl {
    #[serde(rename = "oAuthTokenID")]
    pub oauth_token_id: String,
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default = "default_true")]
    pub speculative_plans: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceVariable {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub hcl: bool,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<ValueFrom>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValueFrom {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_key_ref: Option<ConfigMapKeySelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<SecretKeySelector>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamAccessSpec {
    pub team: NamedRef,
    /// `read`, `plan`, `write`, `admin` or `custom`.
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomPermissions>,
}

/// Permissions applied when `access` is `custom`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomPermissions {
    #[serde(default = "default_runs")]
    pub runs: String,
    #[serde(default)]
    pub run_tasks: bool,
    #[serde(default = "default_none")]
    pub sentinel: String,
    #[serde(default = "default_none")]
    pub state_versions: String,
    #[serde(default = "default_none")]
    pub variables: String,
    #[serde(default)]
    pub workspace_locking: bool,
}

impl Default for CustomPermissions {
    fn default() -> Self {
        Self {
            runs: default_runs(),
            run_tasks: false,
            sentinel: default_none(),
            state_versions: default_none(),
            variables: default_none(),
            workspace_locking: false,
        }
    }
}

pub(crate) fn default_runs() -> String {
    "read".to_string()
}

pub(crate) fn default_none() -> String {
    "none".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationType {
    Email,
    Generic,
    MicrosoftTeams,
    Slack,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Email => "email",
            NotificationType::Generic => "generic",
            NotificationType::MicrosoftTeams => "microsoft-teams",
            NotificationType::Slack => "slack",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// HMAC token for `generic` destinations. Write-only on the remote side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Remote trigger names, e.g. `run:errored`.
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub email_addresses: Vec<String>,
    /// Organization members, by e-mail.
    #[serde(default)]
    pub email_users: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStateSharing {
    #[serde(default)]
    pub all_workspaces: bool,
    #[serde(default)]
    pub workspaces: Vec<NamedRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(rename = "workspaceID", default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,

    /// Remote `updated-at`, unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_at: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform_version: Option<String>,

    /// Latest run of the workspace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunStatus>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableStatus>,

    #[serde(rename = "destroyRunID", default, skip_serializing_if = "Option::is_none")]
    pub destroy_run_id: Option<String>,

    #[serde(rename = "defaultProjectID", default, skip_serializing_if = "Option::is_none")]
    pub default_project_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VariableStatus {
    pub name: String,
    pub id: String,
    pub category: String,
}

impl ManagedResource for Workspace {
    type Status = WorkspaceStatus;

    fn organization(&self) -> &str {
        &self.spec.organization
    }

    fn token(&self) -> &Token {
        &self.spec.token
    }

    fn deletion_policy(&self) -> DeletionPolicy {
        self.spec.deletion_policy
    }

    fn status(&self) -> Option<&WorkspaceStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut WorkspaceStatus {
        self.status.get_or_insert_with(WorkspaceStatus::default)
    }

    fn remote_id(&self) -> Option<&str> {
        self.status.as_ref()?.workspace_id.as_deref()
    }

    fn observed_generation(&self) -> Option<i64> {
        self.status.as_ref()?.observed_generation
    }

    fn set_observed_generation(&mut self, generation: Option<i64>) {
        self.status_mut().observed_generation = generation;
    }

    fn recorded_update_at(&self) -> Option<i64> {
        self.status.as_ref()?.update_at
    }

    fn validate(&self) -> Result<(), String> {
        validate_common(self)?;
        let spec = &self.spec;
        if spec.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }

        if spec.execution_mode == ExecutionMode::Agent {
            match &spec.agent_pool {
                Some(pool) => pool.validate("agentPool")?,
                None => return Err("agentPool is required when executionMode is agent".to_string()),
            }
        } else if let Some(pool) = &spec.agent_pool {
            pool.validate("agentPool")?;
        }
        if let Some(project) = &spec.project {
            project.validate("project")?;
        }
        if let Some(key) = &spec.ssh_key {
            key.validate("sshKey")?;
        }

        for (field, vars) in [
            ("terraformVariables", &spec.terraform_variables),
            ("environmentVariables", &spec.environment_variables),
        ] {
            if let Some(dup) = first_duplicate(vars.iter().map(|v| v.name.as_str())) {
                return Err(format!("{}: duplicate variable {}", field, dup));
            }
            for v in vars {
                validate_variable(field, v)?;
            }
        }

        for access in &spec.team_access {
            access.team.validate("teamAccess.team")?;
        }

        if let Some(dup) = first_duplicate(spec.notifications.iter().map(|n| n.name.as_str())) {
            return Err(format!("notifications: duplicate name {}", dup));
        }
        for n in &spec.notifications {
            if n.kind != NotificationType::Email && n.url.as_deref().is_none_or(str::is_empty) {
                return Err(format!("notifications.{}: url is required for {}", n.name, n.kind.as_str()));
            }
        }

        for trigger in &spec.run_triggers {
            trigger.validate("runTriggers")?;
        }
        if let Some(sharing) = &spec.remote_state_sharing {
            for ws in &sharing.workspaces {
                ws.validate("remoteStateSharing.workspaces")?;
            }
        }
        Ok(())
    }
}

fn validate_variable(field: &str, v: &WorkspaceVariable) -> Result<(), String> {
    if v.name.is_empty() {
        return Err(format!("{}: variable name must not be empty", field));
    }
    match (&v.value, &v.value_from) {
        (Some(_), Some(_)) => Err(format!(
            "{}.{}: only one of value or valueFrom may be set",
            field, v.name
        )),
        (_, Some(from)) => match (&from.config_map_key_ref, &from.secret_key_ref) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err(format!(
                "{}.{}: valueFrom needs exactly one of configMapKeyRef or secretKeyRef",
                field, v.name
            )),
        },
        _ => Ok(()),
    }
}
