//! Workspace team access, keyed by resolved team ID.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tfc_client::{TeamAccess, TeamAccessOptions, TfcApi, WorkspacePermissions, collect_all};

use crate::context::Session;
use crate::crd::Workspace;
use crate::crd::workspace::TeamAccessSpec;
use crate::diff::{Changes, Comparison};
use crate::error::{Error, Result};
use crate::reconciler::{Collection, converge};
use crate::resolve;

struct WorkspaceTeamAccess {
    api: Arc<dyn TfcApi>,
    workspace_id: String,
}

#[async_trait]
impl Collection for WorkspaceTeamAccess {
    type Key = String;
    type Desired = TeamAccessOptions;
    type Observed = TeamAccess;

    fn name(&self) -> &'static str {
        "team access"
    }

    async fn observed(&self) -> Result<BTreeMap<String, TeamAccess>> {
        let grants = collect_all(None, |opts| async move {
            self.api.list_team_access(&self.workspace_id, &opts).await
        })
        .await?;
        Ok(grants.into_iter().map(|g| (g.team_id.clone(), g)).collect())
    }

    fn compare(&self, desired: &TeamAccessOptions, observed: &TeamAccess) -> Comparison {
        if desired.access == observed.access && desired.permissions == observed.permissions {
            Comparison::Equal
        } else {
            Comparison::Update
        }
    }

    async fn create(&self, _team_id: &String, desired: &TeamAccessOptions) -> Result<()> {
        self.api.add_team_access(&self.workspace_id, desired).await?;
        Ok(())
    }

    async fn update(&self, _team_id: &String, desired: &TeamAccessOptions, observed: &TeamAccess) -> Result<()> {
        self.api.update_team_access(&observed.id, desired).await?;
        Ok(())
    }

    async fn delete(&self, _team_id: &String, observed: &TeamAccess) -> Result<()> {
        self.api.remove_team_access(&observed.id).await?;
        Ok(())
    }
}

/// Permissions only travel with `custom` access.
fn permissions(spec: &TeamAccessSpec) -> WorkspacePermissions {
    if spec.access != "custom" {
        return WorkspacePermissions::default();
    }
    let custom = spec.custom.clone().unwrap_or_default();
    WorkspacePermissions {
        runs: Some(custom.runs),
        variables: Some(custom.variables),
        state_versions: Some(custom.state_versions),
        sentinel_mocks: Some(custom.sentinel),
        workspace_locking: Some(custom.workspace_locking),
        run_tasks: Some(custom.run_tasks),
    }
}

pub(super) async fn reconcile(s: &Session<Workspace>, workspace_id: &str) -> Result<Changes> {
    let mut desired = BTreeMap::new();
    for grant in &s.object.spec.team_access {
        let team_id = resolve::team(s.api.as_ref(), s.organization(), &grant.team).await?;
        if desired.contains_key(&team_id) {
            return Err(Error::Validation(format!(
                "teamAccess: more than one entry for team {}",
                team_id
            )));
        }
        desired.insert(
            team_id.clone(),
            TeamAccessOptions {
                team_id,
                access: grant.access.clone(),
                permissions: permissions(grant),
            },
        );
    }
    let grants = WorkspaceTeamAccess {
        api: s.api.clone(),
        workspace_id: workspace_id.to_string(),
    };
    let changes = converge(&grants, desired).await?;
    s.events.collection_changed("team access", &changes).await;
    Ok(changes)
}
