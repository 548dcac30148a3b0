//! Workspace reconciler.
//!
//! Creates or reads the remote workspace, applies spec drift, converges every
//! sub-resource collection and mirrors the current run and variables into
//! status.

mod notifications;
mod remote_state;
mod run_triggers;
mod ssh_key;
mod tags;
mod team_access;
mod variables;

use async_trait::async_trait;
use tfc_client::{RunOptions, VcsRepo, WorkspaceOptions};
use tracing::{info, warn};

use super::{Cleanup, Outcome, Reconciler, force_delete_outcome, safe_delete_outcome};
use crate::context::Session;
use crate::crd::workspace::{ApplyMethod, ExecutionMode, RunStatus};
use crate::crd::{DeletionPolicy, ManagedResource, Workspace, WorkspaceStatus};
use crate::diff::Changes;
use crate::drift;
use crate::error::{Error, Result};
use crate::resolve;

const KIND: &str = "workspace";

/// Message attached to runs the operator queues.
pub(crate) const DESTROY_MESSAGE: &str = "Destroy run triggered by tfc-operator";

pub struct WorkspaceReconciler;

impl WorkspaceReconciler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WorkspaceReconciler {
    fn default() -> Self {
        Self::new()
    }
}

/// Remote attributes derived from `.spec`, with references resolved.
async fn options(s: &Session<Workspace>) -> Result<WorkspaceOptions> {
    let spec = &s.object.spec;
    let api = s.api.as_ref();
    let org = s.organization();

    let project_id = match &spec.project {
        Some(r) => Some(resolve::project(api, org, r).await?),
        // Keep the workspace where the remote put it on first create.
        None => s.object.status().and_then(|st| st.default_project_id.clone()),
    };
    let agent_pool_id = match (&spec.execution_mode, &spec.agent_pool) {
        (ExecutionMode::Agent, Some(r)) => Some(resolve::agent_pool(api, org, r).await?),
        _ => None,
    };

    Ok(WorkspaceOptions {
        name: spec.name.clone(),
        description: spec.description.clone().filter(|d| !d.is_empty()),
        auto_apply: spec.apply_method == ApplyMethod::Auto,
        allow_destroy_plan: spec.allow_destroy_plan,
        execution_mode: spec.execution_mode.as_str().to_string(),
        terraform_version: spec.terraform_version.clone(),
        working_directory: spec.working_directory.clone().filter(|d| !d.is_empty()),
        global_remote_state: spec
            .remote_state_sharing
            .as_ref()
            .is_some_and(|r| r.all_workspaces),
        speculative_enabled: spec
            .version_control
            .as_ref()
            .is_none_or(|v| v.speculative_plans),
        vcs_repo: spec.version_control.as_ref().map(|v| VcsRepo {
            identifier: v.repository.clone(),
            oauth_token_id: v.oauth_token_id.clone(),
            branch: v.branch.clone().filter(|b| !b.is_empty()),
        }),
        project_id,
        agent_pool_id,
    })
}

fn unix(ts: Option<chrono::DateTime<chrono::Utc>>) -> Option<i64> {
    ts.map(|t| t.timestamp())
}

/// Read the recorded workspace, creating it when none is recorded or the
/// recorded one was removed out of band. Returns whether it was created.
async fn ensure_workspace(s: &mut Session<Workspace>) -> Result<(tfc_client::Workspace, bool)> {
    if let Some(id) = s.object.remote_id().map(str::to_string) {
        match s.api.read_workspace(&id).await {
            Ok(ws) => return Ok((ws, false)),
            Err(e) if e.is_not_found() => {
                warn!(workspace_id = %id, "Workspace removed remotely, recreating");
                s.events.recreated(KIND, &id).await;
                let status = s.object.status_mut();
                *status = WorkspaceStatus {
                    observed_generation: status.observed_generation,
                    default_project_id: status.default_project_id.take(),
                    ..Default::default()
                };
            }
            Err(e) => return Err(e.into()),
        }
    }

    let opts = options(s).await?;
    let ws = s.api.create_workspace(s.organization(), &opts).await?;
    info!(workspace_id = %ws.id, name = %ws.name, "Created workspace");

    let project_pinned = s.object.spec.project.is_some();
    let status = s.object.status_mut();
    status.workspace_id = Some(ws.id.clone());
    status.update_at = unix(ws.updated_at);
    if !project_pinned && status.default_project_id.is_none() {
        status.default_project_id = ws.project_id.clone();
    }
    s.checkpoint().await?;
    s.events.created(KIND, &ws.id).await;
    Ok((ws, true))
}

/// Mirror the workspace's current run into status.
async fn current_run(s: &Session<Workspace>, ws: &tfc_client::Workspace) -> Result<Option<RunStatus>> {
    let Some(run_id) = &ws.current_run_id else {
        return Ok(None);
    };
    match s.api.read_run(run_id).await {
        Ok(run) => Ok(Some(RunStatus {
            id: run.id,
            status: run.status,
            configuration_version: run.configuration_version_id,
        })),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Reconciler for WorkspaceReconciler {
    type Resource = Workspace;

    async fn reconcile(&self, s: &mut Session<Workspace>) -> Result<Outcome> {
        let (mut ws, created) = ensure_workspace(s).await?;
        let mut dirty = false;

        if !created {
            let drift = drift::detect(&s.object, unix(ws.updated_at));
            if drift.needs_update() {
                info!(workspace_id = %ws.id, drift = %drift, "Updating workspace");
                s.events.drift_detected(KIND, &ws.id, &drift.to_string()).await;
                let opts = options(s).await?;
                ws = s.api.update_workspace(&ws.id, &opts).await?;
                s.events.updated(KIND, &ws.id).await;
                dirty = true;
            }
        }

        let id = ws.id.clone();
        let mut changes = Changes::default();
        changes += tags::reconcile(s, &id).await?;
        changes += variables::reconcile(s, &id).await?;
        changes += team_access::reconcile(s, &id).await?;
        changes += notifications::reconcile(s, &id).await?;
        changes += run_triggers::reconcile(s, &id).await?;
        changes += ssh_key::reconcile(s, &ws).await?;
        changes += remote_state::reconcile(s, &id).await?;

        if dirty || !changes.is_empty() {
            ws = s.api.read_workspace(&id).await?;
        }

        let run = current_run(s, &ws).await?;
        let variables = variables::status(s, &id).await?;
        let status = s.object.status_mut();
        status.update_at = unix(ws.updated_at);
        status.terraform_version = ws.terraform_version.clone();
        status.run = run;
        status.variables = variables;

        Ok(Outcome::Converged)
    }

    async fn finalize(&self, s: &mut Session<Workspace>, policy: DeletionPolicy) -> Result<Cleanup> {
        let Some(id) = s.object.remote_id().map(str::to_string) else {
            return Ok(Cleanup::Done);
        };

        let outcome = match policy {
            DeletionPolicy::Retain => Cleanup::Done,
            DeletionPolicy::Soft => safe_delete_outcome(s.api.safe_delete_workspace(&id).await)?,
            DeletionPolicy::Force => force_delete_outcome(s.api.delete_workspace(&id).await)?,
            DeletionPolicy::Destroy => destroy(s, &id).await?,
        };
        if outcome == Cleanup::Done && policy != DeletionPolicy::Retain {
            info!(workspace_id = %id, policy = %policy, "Deleted workspace");
            s.events.deleted(KIND, &id).await;
        }
        Ok(outcome)
    }
}

/// Queue a destroy run, wait for it across passes, then delete.
async fn destroy(s: &mut Session<Workspace>, id: &str) -> Result<Cleanup> {
    let recorded = s.object.status().and_then(|st| st.destroy_run_id.clone());
    let Some(run_id) = recorded else {
        let opts = RunOptions {
            workspace_id: id.to_string(),
            is_destroy: true,
            auto_apply: Some(true),
            message: DESTROY_MESSAGE.to_string(),
            ..Default::default()
        };
        let run = match s.api.create_run(&opts).await {
            Ok(run) => run,
            Err(e) if e.is_not_found() => return Ok(Cleanup::Done),
            Err(e) => return Err(e.into()),
        };
        info!(workspace_id = %id, run_id = %run.id, "Queued destroy run");
        s.object.status_mut().destroy_run_id = Some(run.id.clone());
        s.checkpoint().await?;
        s.events.run_queued(&run.id, true).await;
        return Ok(Cleanup::Pending);
    };

    let run = match s.api.read_run(&run_id).await {
        Ok(run) => run,
        Err(e) if e.is_not_found() => {
            warn!(run_id = %run_id, "Destroy run vanished, queueing a new one");
            s.object.status_mut().destroy_run_id = None;
            s.checkpoint().await?;
            return Ok(Cleanup::Pending);
        }
        Err(e) => return Err(e.into()),
    };

    if !run.is_final() {
        return Ok(Cleanup::Pending);
    }
    s.events.run_finished(&run.id, &run.status).await;
    if !run.succeeded() {
        return Err(Error::RunFailed {
            id: run.id,
            status: run.status,
        });
    }
    force_delete_outcome(s.api.delete_workspace(id).await)
}
