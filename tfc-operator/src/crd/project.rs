//! Project custom resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::workspace::{default_none, default_runs};
use super::{DeletionPolicy, ManagedResource, NamedRef, Token, validate_common};

#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "app.terraform.io",
    version = "v1alpha2",
    kind = "Project",
    namespaced,
    status = "ProjectStatus",
    printcolumn = r#"{"name":"Project ID","type":"string","jsonPath":".status.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
    pub organization: String,
    pub token: Token,
    pub name: String,

    #[serde(default)]
    pub team_access: Vec<ProjectTeamAccessSpec>,

    /// `retain` or `soft`.
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTeamAccessSpec {
    pub team: NamedRef,
    /// `read`, `write`, `maintain`, `admin` or `custom`.
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<ProjectCustomPermissions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCustomPermissions {
    #[serde(default = "default_settings")]
    pub project_access: String,
    #[serde(default = "default_none")]
    pub team_management: String,
    #[serde(default)]
    pub create_workspace: bool,
    #[serde(default)]
    pub delete_workspace: bool,
    #[serde(default)]
    pub move_workspace: bool,
    #[serde(default)]
    pub lock_workspace: bool,
    #[serde(default = "default_runs")]
    pub runs: String,
    #[serde(default = "default_none")]
    pub variables: String,
    #[serde(default = "default_none")]
    pub state_versions: String,
}

impl Default for ProjectCustomPermissions {
    fn default() -> Self {
        Self {
            project_access: default_settings(),
            team_management: default_none(),
            create_workspace: false,
            delete_workspace: false,
            move_workspace: false,
            lock_workspace: false,
            runs: default_runs(),
            variables: default_none(),
            state_versions: default_none(),
        }
    }
}

fn default_settings() -> String {
    "read".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ManagedResource for Project {
    type Status = ProjectStatus;

    fn organization(&self) -> &str {
        &self.spec.organization
    }

    fn token(&self) -> &Token {
        &self.spec.token
    }

    fn deletion_policy(&self) -> DeletionPolicy {
        self.spec.deletion_policy
    }

    fn status(&self) -> Option<&ProjectStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut ProjectStatus {
        self.status.get_or_insert_with(ProjectStatus::default)
    }

    fn remote_id(&self) -> Option<&str> {
        self.status.as_ref()?.id.as_deref()
    }

    fn observed_generation(&self) -> Option<i64> {
        self.status.as_ref()?.observed_generation
    }

    fn set_observed_generation(&mut self, generation: Option<i64>) {
        self.status_mut().observed_generation = generation;
    }

    fn validate(&self) -> Result<(), String> {
        validate_common(self)?;
        if self.spec.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        for access in &self.spec.team_access {
            access.team.validate("teamAccess.team")?;
        }
        Ok(())
    }
}
