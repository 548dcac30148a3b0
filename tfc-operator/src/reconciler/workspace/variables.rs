//! Terraform and environment variables, keyed by (category, name).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tfc_client::{TfcApi, Variable, VariableCategory, VariableOptions, collect_all};

use crate::context::Session;
use crate::crd::Workspace;
use crate::crd::workspace::{VariableStatus, WorkspaceVariable};
use crate::diff::{Changes, Comparison};
use crate::error::Result;
use crate::reconciler::{Collection, converge};

type Key = (VariableCategory, String);

struct Variables {
    api: Arc<dyn TfcApi>,
    workspace_id: String,
}

/// Sensitive values are write-only remotely, so they never compare equal.
/// Flipping `sensitive` cannot be done in place.
fn compare(desired: &VariableOptions, observed: &Variable) -> Comparison {
    if desired.sensitive != observed.sensitive {
        return Comparison::Replace;
    }
    if desired.sensitive {
        return Comparison::Update;
    }
    let same = observed.value.as_deref() == Some(desired.value.as_str())
        && observed.hcl == desired.hcl
        && observed.description.as_deref().unwrap_or_default()
            == desired.description.as_deref().unwrap_or_default();
    if same {
        Comparison::Equal
    } else {
        Comparison::Update
    }
}

#[async_trait]
impl Collection for Variables {
    type Key = Key;
    type Desired = VariableOptions;
    type Observed = Variable;

    fn name(&self) -> &'static str {
        "variables"
    }

    async fn observed(&self) -> Result<BTreeMap<Key, Variable>> {
        let vars = collect_all(None, |opts| async move {
            self.api.list_variables(&self.workspace_id, &opts).await
        })
        .await?;
        Ok(vars
            .into_iter()
            .map(|v| ((v.category, v.key.clone()), v))
            .collect())
    }

    fn compare(&self, desired: &VariableOptions, observed: &Variable) -> Comparison {
        compare(desired, observed)
    }

    async fn create(&self, _key: &Key, desired: &VariableOptions) -> Result<()> {
        self.api.create_variable(&self.workspace_id, desired).await?;
        Ok(())
    }

    async fn update(&self, _key: &Key, desired: &VariableOptions, observed: &Variable) -> Result<()> {
        self.api
            .update_variable(&self.workspace_id, &observed.id, desired)
            .await?;
        Ok(())
    }

    async fn delete(&self, _key: &Key, observed: &Variable) -> Result<()> {
        self.api
            .delete_variable(&self.workspace_id, &observed.id)
            .await?;
        Ok(())
    }
}

async fn resolve_value(s: &Session<Workspace>, v: &WorkspaceVariable) -> Result<String> {
    if let Some(from) = &v.value_from {
        if let Some(sel) = &from.config_map_key_ref {
            return s.config_map_value(sel).await;
        }
        if let Some(sel) = &from.secret_key_ref {
            return s.secret_value(sel).await;
        }
    }
    Ok(v.value.clone().unwrap_or_default())
}

async fn desired(s: &Session<Workspace>) -> Result<BTreeMap<Key, VariableOptions>> {
    let spec = &s.object.spec;
    let mut out = BTreeMap::new();
    let groups = [
        (VariableCategory::Terraform, &spec.terraform_variables),
        (VariableCategory::Env, &spec.environment_variables),
    ];
    for (category, vars) in groups {
        for v in vars {
            let opts = VariableOptions {
                key: v.name.clone(),
                value: resolve_value(s, v).await?,
                description: v.description.clone().filter(|d| !d.is_empty()),
                category,
                hcl: v.hcl,
                sensitive: v.sensitive,
            };
            out.insert((category, v.name.clone()), opts);
        }
    }
    Ok(out)
}

pub(super) async fn reconcile(s: &Session<Workspace>, workspace_id: &str) -> Result<Changes> {
    let desired = desired(s).await?;
    let vars = Variables {
        api: s.api.clone(),
        workspace_id: workspace_id.to_string(),
    };
    let changes = converge(&vars, desired).await?;
    s.events.collection_changed("variables", &changes).await;
    Ok(changes)
}

/// Variables as listed after convergence, for status.
pub(super) async fn status(s: &Session<Workspace>, workspace_id: &str) -> Result<Vec<VariableStatus>> {
    let vars = collect_all(None, |opts| async move {
        s.api.list_variables(workspace_id, &opts).await
    })
    .await?;
    let mut out: Vec<VariableStatus> = vars
        .into_iter()
        .map(|v| VariableStatus {
            name: v.key,
            id: v.id,
            category: v.category.as_str().to_string(),
        })
        .collect();
    out.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
    Ok(out)
}
