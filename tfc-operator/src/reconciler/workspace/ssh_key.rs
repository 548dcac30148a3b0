//! SSH key assignment: a collection of at most one key.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tfc_client::TfcApi;

use crate::context::Session;
use crate::crd::Workspace;
use crate::diff::Changes;
use crate::error::Result;
use crate::reconciler::{Collection, converge};
use crate::resolve;

struct SshKey {
    api: Arc<dyn TfcApi>,
    workspace_id: String,
    assigned: Option<String>,
}

#[async_trait]
impl Collection for SshKey {
    type Key = String;
    type Desired = ();
    type Observed = ();

    fn name(&self) -> &'static str {
        "ssh key"
    }

    async fn observed(&self) -> Result<BTreeMap<String, ()>> {
        Ok(self.assigned.iter().map(|id| (id.clone(), ())).collect())
    }

    async fn create(&self, key_id: &String, _desired: &()) -> Result<()> {
        self.api.assign_ssh_key(&self.workspace_id, key_id).await?;
        Ok(())
    }

    async fn delete(&self, _key_id: &String, _observed: &()) -> Result<()> {
        self.api.unassign_ssh_key(&self.workspace_id).await?;
        Ok(())
    }
}

/// The assigned key comes from the workspace read earlier in the pass.
pub(super) async fn reconcile(s: &Session<Workspace>, ws: &tfc_client::Workspace) -> Result<Changes> {
    let mut desired = BTreeMap::new();
    if let Some(r) = &s.object.spec.ssh_key {
        desired.insert(resolve::ssh_key(s.api.as_ref(), s.organization(), r).await?, ());
    }
    let key = SshKey {
        api: s.api.clone(),
        workspace_id: ws.id.clone(),
        assigned: ws.ssh_key_id.clone(),
    };
    let changes = converge(&key, desired).await?;
    s.events.collection_changed("ssh key", &changes).await;
    Ok(changes)
}
