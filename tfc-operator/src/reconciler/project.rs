//! Project reconciler.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tfc_client::{
    ProjectOptions, ProjectPermissions, ProjectTeamAccess, ProjectTeamAccessOptions, TfcApi,
    collect_all,
};
use tracing::{info, warn};

use super::{Cleanup, Collection, Outcome, Reconciler, converge, safe_delete_outcome};
use crate::context::Session;
use crate::crd::project::ProjectTeamAccessSpec;
use crate::crd::{DeletionPolicy, ManagedResource, Project};
use crate::diff::{Changes, Comparison};
use crate::drift;
use crate::error::{Error, Result};
use crate::resolve;

const KIND: &str = "project";

pub struct ProjectReconciler;

impl ProjectReconciler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProjectReconciler {
    fn default() -> Self {
        Self::new()
    }
}

struct ProjectTeams {
    api: Arc<dyn TfcApi>,
    project_id: String,
}

#[async_trait]
impl Collection for ProjectTeams {
    type Key = String;
    type Desired = ProjectTeamAccessOptions;
    type Observed = ProjectTeamAccess;

    fn name(&self) -> &'static str {
        "project team access"
    }

    async fn observed(&self) -> Result<BTreeMap<String, ProjectTeamAccess>> {
        let grants = collect_all(None, |opts| async move {
            self.api
                .list_project_team_access(&self.project_id, &opts)
                .await
        })
        .await?;
        Ok(grants.into_iter().map(|g| (g.team_id.clone(), g)).collect())
    }

    fn compare(&self, desired: &ProjectTeamAccessOptions, observed: &ProjectTeamAccess) -> Comparison {
        if desired.access == observed.access && desired.permissions == observed.permissions {
            Comparison::Equal
        } else {
            Comparison::Update
        }
    }

    async fn create(&self, _team_id: &String, desired: &ProjectTeamAccessOptions) -> Result<()> {
        self.api
            .add_project_team_access(&self.project_id, desired)
            .await?;
        Ok(())
    }

    async fn update(
        &self,
        _team_id: &String,
        desired: &ProjectTeamAccessOptions,
        observed: &ProjectTeamAccess,
    ) -> Result<()> {
        self.api
            .update_project_team_access(&observed.id, desired)
            .await?;
        Ok(())
    }

    async fn delete(&self, _team_id: &String, observed: &ProjectTeamAccess) -> Result<()> {
        self.api.remove_project_team_access(&observed.id).await?;
        Ok(())
    }
}

fn permissions(spec: &ProjectTeamAccessSpec) -> ProjectPermissions {
    if spec.access != "custom" {
        return ProjectPermissions::default();
    }
    let custom = spec.custom.clone().unwrap_or_default();
    ProjectPermissions {
        settings: Some(custom.project_access),
        teams: Some(custom.team_management),
        create_workspace: Some(custom.create_workspace),
        delete_workspace: Some(custom.delete_workspace),
        move_workspace: Some(custom.move_workspace),
        locking: Some(custom.lock_workspace),
        runs: Some(custom.runs),
        variables: Some(custom.variables),
        state_versions: Some(custom.state_versions),
    }
}

async fn team_access(s: &Session<Project>, project_id: &str) -> Result<Changes> {
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
            ProjectTeamAccessOptions {
                team_id,
                access: grant.access.clone(),
                permissions: permissions(grant),
            },
        );
    }
    let grants = ProjectTeams {
        api: s.api.clone(),
        project_id: project_id.to_string(),
    };
    let changes = converge(&grants, desired).await?;
    s.events
        .collection_changed("project team access", &changes)
        .await;
    Ok(changes)
}

#[async_trait]
impl Reconciler for ProjectReconciler {
    type Resource = Project;

    async fn reconcile(&self, s: &mut Session<Project>) -> Result<Outcome> {
        let opts = ProjectOptions {
            name: s.object.spec.name.clone(),
        };

        let mut existing = None;
        if let Some(id) = s.object.remote_id().map(str::to_string) {
            match s.api.read_project(&id).await {
                Ok(p) => existing = Some(p),
                Err(e) if e.is_not_found() => {
                    warn!(project_id = %id, "Project removed remotely, recreating");
                    s.events.recreated(KIND, &id).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let project = match existing {
            Some(p) => {
                let drift = drift::detect_by_attributes(&s.object, p.name != opts.name);
                if drift.needs_update() {
                    info!(project_id = %p.id, drift = %drift, "Updating project");
                    s.events.drift_detected(KIND, &p.id, &drift.to_string()).await;
                    let p = s.api.update_project(&p.id, &opts).await?;
                    s.events.updated(KIND, &p.id).await;
                    p
                } else {
                    p
                }
            }
            None => {
                let p = s.api.create_project(s.organization(), &opts).await?;
                info!(project_id = %p.id, name = %p.name, "Created project");
                let status = s.object.status_mut();
                status.id = Some(p.id.clone());
                status.name = Some(p.name.clone());
                s.checkpoint().await?;
                s.events.created(KIND, &p.id).await;
                p
            }
        };

        team_access(s, &project.id).await?;

        let status = s.object.status_mut();
        status.id = Some(project.id);
        status.name = Some(project.name);
        Ok(Outcome::Converged)
    }

    async fn finalize(&self, s: &mut Session<Project>, policy: DeletionPolicy) -> Result<Cleanup> {
        let Some(id) = s.object.remote_id().map(str::to_string) else {
            return Ok(Cleanup::Done);
        };
        match policy {
            DeletionPolicy::Retain => Ok(Cleanup::Done),
            DeletionPolicy::Soft => {
                let outcome = safe_delete_outcome(s.api.delete_project(&id).await)?;
                if outcome == Cleanup::Done {
                    info!(project_id = %id, "Deleted project");
                    s.events.deleted(KIND, &id).await;
                }
                Ok(outcome)
            }
            DeletionPolicy::Force | DeletionPolicy::Destroy => Err(Error::Unimplemented {
                kind: "Project".to_string(),
                policy,
            }),
        }
    }
}
