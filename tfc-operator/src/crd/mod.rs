//! Custom resource definitions.
//!
//! All kinds live in group `app.terraform.io`, version `v1alpha2`, and share
//! the credential reference, the organization and the deletion policy.
//! [`ManagedResource`] is the view the generic orchestrator has of them.

pub mod agent_pool;
pub mod module;
pub mod project;
pub mod workspace;

use std::fmt;

use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use agent_pool::{AgentPool, AgentPoolSpec, AgentPoolStatus};
pub use module::{Module, ModuleSpec, ModuleStatus};
pub use project::{Project, ProjectSpec, ProjectStatus};
pub use workspace::{Workspace, WorkspaceSpec, WorkspaceStatus};

/// Finalizer attached to every managed object.
pub const FINALIZER: &str = "app.terraform.io/finalizer";

/// What cleanup means when a managed object is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeletionPolicy {
    /// Leave the remote object alone.
    #[default]
    Retain,
    /// Delete only once the remote object manages nothing.
    Soft,
    /// Delete unconditionally.
    Force,
    /// Destroy what the remote object manages, then delete it.
    Destroy,
}

impl fmt::Display for DeletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeletionPolicy::Retain => "retain",
            DeletionPolicy::Soft => "soft",
            DeletionPolicy::Force => "force",
            DeletionPolicy::Destroy => "destroy",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapKeySelector {
    pub name: String,
    pub key: String,
}

/// API token used for every remote call made on behalf of the object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub secret_key_ref: SecretKeySelector,
}

/// Reference to a remote object by ID or by exact name. Exactly one is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamedRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl NamedRef {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: None,
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    pub fn validate(&self, field: &str) -> Result<(), String> {
        match (self.id.as_deref(), self.name.as_deref()) {
            (Some(id), None) if !id.is_empty() => Ok(()),
            (None, Some(name)) if !name.is_empty() => Ok(()),
            (Some(_), Some(_)) => Err(format!("{}: only one of id or name may be set", field)),
            _ => Err(format!("{}: one of id or name must be set", field)),
        }
    }
}

impl fmt::Display for NamedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.id, &self.name) {
            (Some(id), _) => write!(f, "id:{}", id),
            (None, Some(name)) => write!(f, "name:{}", name),
            (None, None) => f.write_str("<unset>"),
        }
    }
}

/// The orchestrator's view of a managed object.
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    type Status: Clone + Default + fmt::Debug + Serialize + Send + Sync;

    fn organization(&self) -> &str;

    fn token(&self) -> &Token;

    fn deletion_policy(&self) -> DeletionPolicy;

    fn status(&self) -> Option<&Self::Status>;

    fn status_mut(&mut self) -> &mut Self::Status;

    /// ID of the remote counterpart, once one has been recorded.
    fn remote_id(&self) -> Option<&str>;

    fn observed_generation(&self) -> Option<i64>;

    fn set_observed_generation(&mut self, generation: Option<i64>);

    /// Remote last-modified marker recorded by the last pass, if the kind
    /// tracks one.
    fn recorded_update_at(&self) -> Option<i64> {
        None
    }

    /// Structural checks run before any remote call.
    fn validate(&self) -> Result<(), String>;
}

/// Checks shared by every kind.
pub(crate) fn validate_common<K: ManagedResource>(obj: &K) -> Result<(), String> {
    if obj.organization().trim().is_empty() {
        return Err("organization must not be empty".to_string());
    }
    let token = &obj.token().secret_key_ref;
    if token.name.is_empty() || token.key.is_empty() {
        return Err("token.secretKeyRef needs both name and key".to_string());
    }
    if obj.namespace().is_none() {
        return Err(format!("{} has no namespace", obj.name_any()));
    }
    Ok(())
}

/// First name occurring more than once, if any.
pub(crate) fn first_duplicate<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    let mut seen = std::collections::BTreeSet::new();
    names.into_iter().find(|n| !seen.insert(*n))
}
