//! Remote state consumers, keyed by resolved workspace ID.
//!
//! Not managed when the workspace shares its state with every workspace;
//! that flag travels on the workspace itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tfc_client::{TfcApi, collect_all};

use crate::context::Session;
use crate::crd::Workspace;
use crate::diff::Changes;
use crate::error::Result;
use crate::reconciler::{Collection, converge};
use crate::resolve;

struct Consumers {
    api: Arc<dyn TfcApi>,
    workspace_id: String,
}

#[async_trait]
impl Collection for Consumers {
    type Key = String;
    type Desired = ();
    type Observed = ();

    fn name(&self) -> &'static str {
        "remote state consumers"
    }

    async fn observed(&self) -> Result<BTreeMap<String, ()>> {
        let items = collect_all(None, |opts| async move {
            self.api
                .list_remote_state_consumers(&self.workspace_id, &opts)
                .await
        })
        .await?;
        Ok(items.into_iter().map(|w| (w.id, ())).collect())
    }

    async fn create(&self, consumer_id: &String, _desired: &()) -> Result<()> {
        self.api
            .add_remote_state_consumers(&self.workspace_id, std::slice::from_ref(consumer_id))
            .await?;
        Ok(())
    }

    async fn delete(&self, consumer_id: &String, _observed: &()) -> Result<()> {
        self.api
            .remove_remote_state_consumers(&self.workspace_id, std::slice::from_ref(consumer_id))
            .await?;
        Ok(())
    }
}

pub(super) async fn reconcile(s: &Session<Workspace>, workspace_id: &str) -> Result<Changes> {
    let sharing = s.object.spec.remote_state_sharing.as_ref();
    if sharing.is_some_and(|r| r.all_workspaces) {
        return Ok(Changes::default());
    }

    let mut desired = BTreeMap::new();
    for r in sharing.map(|r| r.workspaces.as_slice()).unwrap_or_default() {
        let id = resolve::workspace(s.api.as_ref(), s.organization(), r).await?;
        desired.insert(id, ());
    }
    let consumers = Consumers {
        api: s.api.clone(),
        workspace_id: workspace_id.to_string(),
    };
    let changes = converge(&consumers, desired).await?;
    s.events
        .collection_changed("remote state consumers", &changes)
        .await;
    Ok(changes)
}
