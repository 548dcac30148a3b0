//! Inbound run triggers, keyed by resolved source workspace ID.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tfc_client::{RunTrigger, TfcApi, collect_all};

use crate::context::Session;
use crate::crd::Workspace;
use crate::diff::Changes;
use crate::error::Result;
use crate::reconciler::{Collection, converge};
use crate::resolve;

struct RunTriggers {
    api: Arc<dyn TfcApi>,
    workspace_id: String,
}

#[async_trait]
impl Collection for RunTriggers {
    type Key = String;
    type Desired = ();
    type Observed = RunTrigger;

    fn name(&self) -> &'static str {
        "run triggers"
    }

    async fn observed(&self) -> Result<BTreeMap<String, RunTrigger>> {
        let items = collect_all(None, |opts| async move {
            self.api.list_run_triggers(&self.workspace_id, &opts).await
        })
        .await?;
        Ok(items
            .into_iter()
            .map(|t| (t.sourceable_id.clone(), t))
            .collect())
    }

    async fn create(&self, source_id: &String, _desired: &()) -> Result<()> {
        self.api
            .create_run_trigger(&self.workspace_id, source_id)
            .await?;
        Ok(())
    }

    async fn delete(&self, _source_id: &String, observed: &RunTrigger) -> Result<()> {
        self.api.delete_run_trigger(&observed.id).await?;
        Ok(())
    }
}

pub(super) async fn reconcile(s: &Session<Workspace>, workspace_id: &str) -> Result<Changes> {
    let mut desired = BTreeMap::new();
    for source in &s.object.spec.run_triggers {
        let id = resolve::workspace(s.api.as_ref(), s.organization(), source).await?;
        desired.insert(id, ());
    }
    let triggers = RunTriggers {
        api: s.api.clone(),
        workspace_id: workspace_id.to_string(),
    };
    let changes = converge(&triggers, desired).await?;
    s.events.collection_changed("run triggers", &changes).await;
    Ok(changes)
}
