//! Workspace tags: keyed by name, no payload.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tfc_client::{Tag, TfcApi, collect_all};

use crate::context::Session;
use crate::crd::Workspace;
use crate::diff::Changes;
use crate::error::Result;
use crate::reconciler::{Collection, converge};

struct Tags {
    api: Arc<dyn TfcApi>,
    workspace_id: String,
}

#[async_trait]
impl Collection for Tags {
    type Key = String;
    type Desired = ();
    type Observed = Tag;

    fn name(&self) -> &'static str {
        "tags"
    }

    async fn observed(&self) -> Result<BTreeMap<String, Tag>> {
        let tags = collect_all(None, |opts| async move {
            self.api.list_workspace_tags(&self.workspace_id, &opts).await
        })
        .await?;
        Ok(tags.into_iter().map(|t| (t.name.clone(), t)).collect())
    }

    async fn create(&self, key: &String, _desired: &()) -> Result<()> {
        self.api
            .add_workspace_tags(&self.workspace_id, std::slice::from_ref(key))
            .await?;
        Ok(())
    }

    async fn delete(&self, _key: &String, observed: &Tag) -> Result<()> {
        self.api
            .remove_workspace_tags(&self.workspace_id, std::slice::from_ref(observed))
            .await?;
        Ok(())
    }
}

pub(super) async fn reconcile(s: &Session<Workspace>, workspace_id: &str) -> Result<Changes> {
    let desired = s.object.spec.tags.iter().map(|t| (t.clone(), ())).collect();
    let tags = Tags {
        api: s.api.clone(),
        workspace_id: workspace_id.to_string(),
    };
    let changes = converge(&tags, desired).await?;
    s.events.collection_changed("tags", &changes).await;
    Ok(changes)
}
