//! Module reconciler.
//!
//! Runs a module in an existing workspace through a resumable pipeline:
//!
//! 1. package `main.tf`, create a configuration version, upload it and wait
//!    until the remote has processed it
//! 2. queue a run on that configuration version and wait for it to finish
//! 3. copy the selected state outputs into a ConfigMap and a Secret
//!
//! Each phase is recorded in status as soon as it starts, so a pass that is
//! interrupted resumes where it stopped instead of uploading or running again.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::Resource;
use serde_json::Value;
use tfc_client::{ConfigurationVersionOptions, Run, RunOptions, collect_all};
use tracing::{debug, info};

use super::workspace::DESTROY_MESSAGE;
use super::{Cleanup, Outcome, Reconciler};
use crate::context::Session;
use crate::crd::module::{ConfigurationVersionStatus, OutputStatus};
use crate::crd::workspace::RunStatus;
use crate::crd::{DeletionPolicy, ManagedResource, Module};
use crate::error::{Error, Result};
use crate::packaging;
use crate::resolve;

const RUN_MESSAGE: &str = "Triggered by tfc-operator";

pub struct ModuleReconciler;

impl ModuleReconciler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ModuleReconciler {
    fn default() -> Self {
        Self::new()
    }
}

fn run_status(run: &Run) -> RunStatus {
    RunStatus {
        id: run.id.clone(),
        status: run.status.clone(),
        configuration_version: run.configuration_version_id.clone(),
    }
}

/// Output value as stored in the cluster: strings raw, everything else JSON.
fn output_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Create a configuration version and upload the packaged module.
async fn upload(s: &mut Session<Module>, workspace_id: &str) -> Result<()> {
    let main_tf = packaging::render_main_tf(&s.object.spec);
    let archive = packaging::archive(&main_tf)?;

    let opts = ConfigurationVersionOptions {
        auto_queue_runs: false,
        speculative: false,
    };
    let cv = s
        .api
        .create_configuration_version(workspace_id, &opts)
        .await?;
    info!(configuration_version = %cv.id, workspace_id, "Created configuration version");
    s.object.status_mut().configuration_version = Some(ConfigurationVersionStatus {
        id: cv.id.clone(),
        status: cv.status.clone(),
        uploaded: false,
    });
    s.checkpoint().await?;

    let Some(url) = cv.upload_url else {
        return Err(Error::UnexpectedResponse(format!(
            "configuration version {} has no upload URL",
            cv.id
        )));
    };
    s.api.upload_configuration(&url, archive).await?;

    if let Some(recorded) = s.object.status_mut().configuration_version.as_mut() {
        recorded.uploaded = true;
    }
    s.checkpoint().await?;
    s.events.configuration_uploaded(&cv.id).await;
    Ok(())
}

/// Copy the selected outputs of the workspace's current state.
async fn sync_outputs(s: &Session<Module>, workspace_id: &str, run_id: &str) -> Result<()> {
    let outputs = collect_all(None, |opts| async move {
        s.api.list_current_state_outputs(workspace_id, &opts).await
    })
    .await?;

    let wanted: BTreeMap<&str, bool> = s
        .object
        .spec
        .outputs
        .iter()
        .map(|o| (o.name.as_str(), o.sensitive))
        .collect();
    let mut plain = BTreeMap::new();
    let mut sensitive = BTreeMap::new();
    for o in outputs {
        let Some(declared_sensitive) = wanted.get(o.name.as_str()) else {
            continue;
        };
        let value = output_value(&o.value);
        if *declared_sensitive || o.sensitive {
            sensitive.insert(o.name, value);
        } else {
            plain.insert(o.name, value);
        }
    }

    let name = s.object.outputs_object_name();
    let count = plain.len() + sensitive.len();
    s.apply_config_map(&name, plain).await?;
    s.apply_secret(&name, sensitive).await?;
    info!(run_id, outputs = count, object = %name, "Synchronized module outputs");
    s.events.outputs_synced(run_id, count).await;
    Ok(())
}

#[async_trait]
impl Reconciler for ModuleReconciler {
    type Resource = Module;

    async fn reconcile(&self, s: &mut Session<Module>) -> Result<Outcome> {
        let workspace_id =
            resolve::workspace(s.api.as_ref(), s.organization(), &s.object.spec.workspace).await?;
        let generation = s.object.meta().generation;

        let status = s.object.status_mut();
        let workspace_changed = status.workspace_id.as_deref() != Some(workspace_id.as_str());
        if workspace_changed || status.pipeline_generation != generation {
            debug!(?generation, "starting pipeline");
            status.workspace_id = Some(workspace_id.clone());
            status.pipeline_generation = generation;
            status.configuration_version = None;
            status.run = None;
            status.output = None;
            s.checkpoint().await?;
        }

        // Phase 1: configuration version.
        let cv = s.object.status().and_then(|st| st.configuration_version.clone());
        let cv_id = match cv {
            Some(cv) if cv.uploaded && cv.status == "uploaded" => cv.id,
            Some(cv) if cv.uploaded => {
                let remote = s.api.read_configuration_version(&cv.id).await?;
                if remote.is_errored() {
                    return Err(Error::RunFailed {
                        id: remote.id,
                        status: remote.status,
                    });
                }
                let done = remote.is_uploaded();
                if let Some(recorded) = s.object.status_mut().configuration_version.as_mut() {
                    recorded.status = remote.status;
                }
                if !done {
                    return Ok(Outcome::Pending);
                }
                remote.id
            }
            // Never created, or created without a confirmed upload.
            _ => {
                upload(s, &workspace_id).await?;
                return Ok(Outcome::Pending);
            }
        };

        // Phase 2: run.
        let recorded = s.object.status().and_then(|st| st.run.clone());
        let run = match recorded {
            None => {
                let opts = RunOptions {
                    workspace_id: workspace_id.clone(),
                    configuration_version_id: Some(cv_id),
                    is_destroy: false,
                    auto_apply: Some(true),
                    message: RUN_MESSAGE.to_string(),
                };
                let run = s.api.create_run(&opts).await?;
                info!(run_id = %run.id, workspace_id = %workspace_id, "Queued run");
                s.object.status_mut().run = Some(run_status(&run));
                s.checkpoint().await?;
                s.events.run_queued(&run.id, false).await;
                return Ok(Outcome::Pending);
            }
            Some(r) if tfc_client::run_status_is_final(&r.status) => r,
            Some(r) => {
                let run = s.api.read_run(&r.id).await?;
                s.object.status_mut().run = Some(run_status(&run));
                if !run.is_final() {
                    return Ok(Outcome::Pending);
                }
                info!(run_id = %run.id, status = %run.status, "Run finished");
                s.checkpoint().await?;
                s.events.run_finished(&run.id, &run.status).await;
                run_status(&run)
            }
        };
        if !matches!(run.status.as_str(), "applied" | "planned_and_finished") {
            return Err(Error::RunFailed {
                id: run.id,
                status: run.status,
            });
        }

        // Phase 3: outputs.
        let synced = s
            .object
            .status()
            .and_then(|st| st.output.as_ref())
            .is_some_and(|o| o.run_id == run.id);
        if !synced {
            sync_outputs(s, &workspace_id, &run.id).await?;
            s.object.status_mut().output = Some(OutputStatus {
                run_id: run.id.clone(),
            });
        }

        Ok(Outcome::Converged)
    }

    async fn finalize(&self, s: &mut Session<Module>, policy: DeletionPolicy) -> Result<Cleanup> {
        match policy {
            DeletionPolicy::Retain => Ok(Cleanup::Done),
            DeletionPolicy::Destroy => destroy(s).await,
            DeletionPolicy::Soft | DeletionPolicy::Force => Err(Error::Unimplemented {
                kind: "Module".to_string(),
                policy,
            }),
        }
    }
}

/// Destroy run on the target workspace. Nothing to destroy when no run was
/// ever queued.
async fn destroy(s: &mut Session<Module>) -> Result<Cleanup> {
    let Some(status) = s.object.status().cloned() else {
        return Ok(Cleanup::Done);
    };
    let Some(workspace_id) = status.workspace_id else {
        return Ok(Cleanup::Done);
    };

    let Some(run_id) = status.destroy_run_id else {
        if status.run.is_none() {
            debug!("no run was ever queued, nothing to destroy");
            return Ok(Cleanup::Done);
        }
        let opts = RunOptions {
            workspace_id: workspace_id.clone(),
            configuration_version_id: status.configuration_version.map(|cv| cv.id),
            is_destroy: true,
            auto_apply: Some(true),
            message: DESTROY_MESSAGE.to_string(),
        };
        let run = match s.api.create_run(&opts).await {
            Ok(run) => run,
            Err(e) if e.is_not_found() => return Ok(Cleanup::Done),
            Err(e) => return Err(e.into()),
        };
        info!(run_id = %run.id, workspace_id = %workspace_id, "Queued destroy run");
        s.object.status_mut().destroy_run_id = Some(run.id.clone());
        s.checkpoint().await?;
        s.events.run_queued(&run.id, true).await;
        return Ok(Cleanup::Pending);
    };

    let run = match s.api.read_run(&run_id).await {
        Ok(run) => run,
        Err(e) if e.is_not_found() => return Ok(Cleanup::Done),
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
    info!(run_id = %run.id, "Destroy run finished");
    Ok(Cleanup::Done)
}
