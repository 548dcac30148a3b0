//! AgentPool custom resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{DeletionPolicy, ManagedResource, Token, first_duplicate, validate_common};

#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "app.terraform.io",
    version = "v1alpha2",
    kind = "AgentPool",
    namespaced,
    status = "AgentPoolStatus",
    printcolumn = r#"{"name":"Agent Pool ID","type":"string","jsonPath":".status.agentPoolID"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolSpec {
    pub organization: String,
    pub token: Token,
    pub name: String,

    #[serde(default = "default_true")]
    pub organization_scoped: bool,

    /// Tokens to issue; their secret values land in `<name>-agent-pool`.
    #[serde(default)]
    pub agent_tokens: Vec<AgentTokenSpec>,

    /// `retain` or `destroy`.
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentTokenSpec {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(rename = "agentPoolID", default, skip_serializing_if = "Option::is_none")]
    pub agent_pool_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_tokens: Vec<AgentTokenStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentTokenStatus {
    pub name: String,
    pub id: String,
    /// Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<i64>,
}

impl AgentPool {
    /// Secret holding the issued token values.
    pub fn token_secret_name(&self) -> String {
        format!("{}-agent-pool", self.metadata.name.as_deref().unwrap_or_default())
    }
}

impl ManagedResource for AgentPool {
    type Status = AgentPoolStatus;

    fn organization(&self) -> &str {
        &self.spec.organization
    }

    fn token(&self) -> &Token {
        &self.spec.token
    }

    fn deletion_policy(&self) -> DeletionPolicy {
        self.spec.deletion_policy
    }

    fn status(&self) -> Option<&AgentPoolStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut AgentPoolStatus {
        self.status.get_or_insert_with(AgentPoolStatus::default)
    }

    fn remote_id(&self) -> Option<&str> {
        self.status.as_ref()?.agent_pool_id.as_deref()
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
        if self.spec.agent_tokens.iter().any(|t| t.name.is_empty()) {
            return Err("agentTokens: token name must not be empty".to_string());
        }
        if let Some(dup) = first_duplicate(self.spec.agent_tokens.iter().map(|t| t.name.as_str())) {
            return Err(format!("agentTokens: duplicate name {}", dup));
        }
        Ok(())
    }
}
