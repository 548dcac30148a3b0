//! Module custom resource.
//!
//! A Module packages a one-module root configuration, runs it in an existing
//! workspace and copies the selected outputs back into the cluster.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::workspace::RunStatus;
use super::{DeletionPolicy, ManagedResource, NamedRef, Token, first_duplicate, validate_common};

#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "app.terraform.io",
    version = "v1alpha2",
    kind = "Module",
    namespaced,
    status = "ModuleStatus",
    printcolumn = r#"{"name":"Run","type":"string","jsonPath":".status.run.status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSpec {
    pub organization: String,
    pub token: Token,
    pub module: ModuleSource,
    pub workspace: NamedRef,

    /// Module block label in the generated configuration.
    #[serde(default = "default_module_name")]
    pub name: String,

    /// Workspace variables passed through as module inputs.
    #[serde(default)]
    pub variables: Vec<ModuleVariable>,

    #[serde(default)]
    pub outputs: Vec<ModuleOutput>,

    /// `retain` or `destroy`.
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

fn default_module_name() -> String {
    "this".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSource {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleVariable {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleOutput {
    pub name: String,
    #[serde(default)]
    pub sensitive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(rename = "workspaceID", default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,

    /// Generation the pipeline fields below belong to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration_version: Option<ConfigurationVersionStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputStatus>,

    #[serde(rename = "destroyRunID", default, skip_serializing_if = "Option::is_none")]
    pub destroy_run_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationVersionStatus {
    pub id: String,
    pub status: String,
    /// Set once the archive upload was acknowledged.
    #[serde(default)]
    pub uploaded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutputStatus {
    /// Run whose state the synchronized outputs came from.
    #[serde(rename = "runID")]
    pub run_id: String,
}

impl Module {
    /// ConfigMap and Secret receiving the outputs.
    pub fn outputs_object_name(&self) -> String {
        format!(
            "{}-module-outputs",
            self.metadata.name.as_deref().unwrap_or_default()
        )
    }
}

/// HCL identifier: a letter or underscore followed by letters, digits,
/// underscores or dashes.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Whether `s` can be written as a quoted HCL string without escaping:
/// no quotes, backslashes, control characters or template sequences.
fn is_plain_literal(s: &str) -> bool {
    !s.chars().any(|c| c == '"' || c == '\\' || c.is_control())
        && !s.contains("${")
        && !s.contains("%{")
}

impl ManagedResource for Module {
    type Status = ModuleStatus;

    fn organization(&self) -> &str {
        &self.spec.organization
    }

    fn token(&self) -> &Token {
        &self.spec.token
    }

    fn deletion_policy(&self) -> DeletionPolicy {
        self.spec.deletion_policy
    }

    fn status(&self) -> Option<&ModuleStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut ModuleStatus {
        self.status.get_or_insert_with(ModuleStatus::default)
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

    fn validate(&self) -> Result<(), String> {
        validate_common(self)?;
        let spec = &self.spec;
        if spec.module.source.trim().is_empty() {
            return Err("module.source must not be empty".to_string());
        }
        if !is_plain_literal(&spec.module.source) {
            return Err(format!("module.source: {:?} is not a plain string", spec.module.source));
        }
        if let Some(version) = spec.module.version.as_deref() {
            if !is_plain_literal(version) {
                return Err(format!("module.version: {:?} is not a plain string", version));
            }
        }
        spec.workspace.validate("workspace")?;
        if !is_identifier(&spec.name) {
            return Err(format!("name: {:?} is not a valid identifier", spec.name));
        }
        for v in &spec.variables {
            if !is_identifier(&v.name) {
                return Err(format!("variables: {:?} is not a valid identifier", v.name));
            }
        }
        for o in &spec.outputs {
            if !is_identifier(&o.name) {
                return Err(format!("outputs: {:?} is not a valid identifier", o.name));
            }
        }
        if let Some(dup) = first_duplicate(spec.variables.iter().map(|v| v.name.as_str())) {
            return Err(format!("variables: duplicate name {}", dup));
        }
        if let Some(dup) = first_duplicate(spec.outputs.iter().map(|o| o.name.as_str())) {
            return Err(format!("outputs: duplicate name {}", dup));
        }
        Ok(())
    }
}
