//! Module pipeline: upload, run, outputs.

mod common;

use std::io::Read;
use std::time::Duration;

use common::{Harness, module};
use flate2::read::GzDecoder;
use kube::runtime::controller::Action;
use serde_json::json;
use tfc_operator::Error;
use tfc_operator::crd::{ManagedResource, Module};
use tfc_operator::reconciler::ModuleReconciler;
use tfc_operator::store::ObjectKey;

const OUTPUTS: &str = "vpc-module-outputs";

fn harness() -> Harness<ModuleReconciler> {
    Harness::new(ModuleReconciler::new())
}

fn vpc(policy: &str) -> Module {
    module(
        "vpc",
        json!({
            "module": {"source": "app.terraform.io/acme/vpc/aws", "version": "1.2.0"},
            "workspace": {"name": "network"},
            "variables": [{"name": "cidr"}],
            "outputs": [
                {"name": "vpc_id"},
                {"name": "subnets"},
                {"name": "db_password"},
                {"name": "admin_token", "sensitive": true},
            ],
            "deletionPolicy": policy,
        }),
    )
}

fn poll() -> Action {
    Action::requeue(Duration::from_secs(10))
}

fn main_tf(archive: &[u8]) -> String {
    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    let mut entry = tar.entries().unwrap().next().unwrap().unwrap();
    let mut content = String::new();
    entry.read_to_string(&mut content).unwrap();
    content
}

/// Drive a module through upload and run until the run is queued.
async fn queued(h: &Harness<ModuleReconciler>, key: &ObjectKey) -> String {
    assert_eq!(h.pass(key).await.unwrap(), Action::requeue(Duration::from_secs(1)));
    assert_eq!(h.pass(key).await.unwrap(), poll());
    assert_eq!(h.pass(key).await.unwrap(), poll());
    h.object(key).status.unwrap().run.expect("run queued").id
}

#[tokio::test]
async fn test_pipeline_publishes_outputs() {
    let h = harness();
    let ws = h.remote.seed_workspace("network");
    h.remote.seed_outputs(
        &ws,
        &[
            ("vpc_id", json!("vpc-123"), false),
            ("subnets", json!(["10.0.1.0/24", "10.0.2.0/24"]), false),
            ("db_password", json!("pa55"), true),
            ("admin_token", json!("t0k3n"), false),
            ("unrelated", json!(1), false),
        ],
    );
    let key = h.store.insert(vpc("retain"));

    // Attach, then upload.
    h.pass(&key).await.unwrap();
    assert_eq!(h.pass(&key).await.unwrap(), poll());
    let status = h.object(&key).status.unwrap();
    assert_eq!(status.workspace_id.as_deref(), Some(ws.as_str()));
    assert_eq!(status.pipeline_generation, Some(1));
    let cv = status.configuration_version.expect("configuration version recorded");
    assert!(cv.uploaded);
    let tf = main_tf(&h.remote.uploaded_archive(&cv.id).unwrap());
    assert!(tf.contains("source = \"app.terraform.io/acme/vpc/aws\""));
    assert!(tf.contains("cidr = var.cidr"));
    assert!(h.events.has("ConfigurationUploaded"));

    // Processed upload: run is queued on it.
    assert_eq!(h.pass(&key).await.unwrap(), poll());
    let run_id = h.object(&key).status.unwrap().run.unwrap().id;
    let run = h.remote.run(&run_id).unwrap();
    assert_eq!(run.configuration_version_id.as_deref(), Some(cv.id.as_str()));
    assert!(!run.is_destroy);

    // Run still going.
    h.remote.set_run_status(&run_id, "planning");
    assert_eq!(h.pass(&key).await.unwrap(), poll());
    assert!(h.secrets.config_map(OUTPUTS).is_none());
    assert_eq!(h.object(&key).status.unwrap().observed_generation, None);

    h.remote.set_run_status(&run_id, "applied");
    let action = h.pass(&key).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(300)));
    let status = h.object(&key).status.unwrap();
    assert_eq!(status.observed_generation, Some(1));
    assert_eq!(status.run.unwrap().status, "applied");
    assert_eq!(status.output.unwrap().run_id, run_id);

    let plain = h.secrets.config_map(OUTPUTS).unwrap();
    assert_eq!(plain.keys().collect::<Vec<_>>(), vec!["subnets", "vpc_id"]);
    assert_eq!(plain["vpc_id"], "vpc-123");
    assert_eq!(plain["subnets"], r#"["10.0.1.0/24","10.0.2.0/24"]"#);

    let sensitive = h.secrets.secret(OUTPUTS).unwrap();
    assert_eq!(
        sensitive.keys().collect::<Vec<_>>(),
        vec!["admin_token", "db_password"]
    );
    assert_eq!(sensitive["db_password"], "pa55");
    assert!(h.events.has("OutputsSynced"));

    let mutations = h.remote.mutations();
    h.pass(&key).await.unwrap();
    assert_eq!(h.remote.mutations(), mutations);
}

#[tokio::test]
async fn test_missing_upload_url_is_retried_with_new_version() {
    let h = harness();
    h.remote.seed_workspace("network");
    let key = h.store.insert(vpc("retain"));
    h.pass(&key).await.unwrap();

    h.remote.withhold_upload_url(true);
    let err = h.pass(&key).await.unwrap_err();

    assert!(matches!(err, Error::UnexpectedResponse(ref msg) if msg.contains("upload URL")));
    assert!(err.is_retryable());
    assert!(h.events.has("UnexpectedResponse"));
    let cv = h.object(&key).status.unwrap().configuration_version.unwrap();
    assert!(!cv.uploaded);

    h.remote.withhold_upload_url(false);
    assert_eq!(h.pass(&key).await.unwrap(), poll());
    let cv = h.object(&key).status.unwrap().configuration_version.unwrap();
    assert!(cv.uploaded);
    assert!(h.remote.uploaded_archive(&cv.id).is_some());
    assert_eq!(h.remote.configuration_version_count(), 2);
}

#[tokio::test]
async fn test_failed_run_needs_spec_change() {
    let h = harness();
    h.remote.seed_workspace("network");
    let key = h.store.insert(vpc("retain"));
    let run_id = queued(&h, &key).await;

    h.remote.set_run_status(&run_id, "errored");
    let err = h.pass(&key).await.unwrap_err();

    assert!(matches!(err, Error::RunFailed { ref status, .. } if status == "errored"));
    assert!(!err.is_retryable());
    assert!(h.secrets.config_map(OUTPUTS).is_none());
    assert!(h.events.has("RunFailed"));
}

#[tokio::test]
async fn test_spec_change_restarts_pipeline() {
    let h = harness();
    h.remote.seed_workspace("network");
    let key = h.store.insert(vpc("retain"));
    let run_id = queued(&h, &key).await;
    h.remote.set_run_status(&run_id, "applied");
    h.settle(&key).await;
    assert_eq!(h.remote.configuration_version_count(), 1);

    h.store.edit_spec(&key, |m| m.spec.module.version = Some("1.3.0".into()));
    assert_eq!(h.pass(&key).await.unwrap(), poll());

    let status = h.object(&key).status.unwrap();
    assert_eq!(status.pipeline_generation, Some(2));
    assert!(status.run.is_none());
    assert!(status.output.is_none());
    assert_eq!(h.remote.configuration_version_count(), 2);
}

#[tokio::test]
async fn test_destroy_queues_destroy_run() {
    let h = harness();
    let ws = h.remote.seed_workspace("network");
    let key = h.store.insert(vpc("destroy"));
    let run_id = queued(&h, &key).await;
    h.remote.set_run_status(&run_id, "applied");
    let obj = h.settle(&key).await;
    let cv = obj.status.unwrap().configuration_version.unwrap().id;

    h.store.mark_deleted(&key);
    assert_eq!(h.pass(&key).await.unwrap(), poll());

    let destroy_id = h.object(&key).status.unwrap().destroy_run_id.unwrap();
    let destroy = h.remote.run(&destroy_id).unwrap();
    assert!(destroy.is_destroy);
    assert_eq!(destroy.configuration_version_id.as_deref(), Some(cv.as_str()));

    h.remote.set_run_status(&destroy_id, "applied");
    h.pass(&key).await.unwrap();

    assert!(h.store.get_now(&key).is_none());
    assert!(h.remote.workspace(&ws).is_some());
}

#[tokio::test]
async fn test_destroy_without_run_is_done() {
    let h = harness();
    h.remote.seed_workspace("network");
    let key = h.store.insert(vpc("destroy"));
    h.pass(&key).await.unwrap();
    h.pass(&key).await.unwrap();

    h.store.mark_deleted(&key);
    h.pass(&key).await.unwrap();

    assert!(h.store.get_now(&key).is_none());
    assert!(h.remote.runs().is_empty());
}

#[tokio::test]
async fn test_unknown_workspace_fails_pass() {
    let h = harness();
    let key = h.store.insert(vpc("retain"));
    h.pass(&key).await.unwrap();

    let err = h.pass(&key).await.unwrap_err();

    assert!(matches!(err, Error::NotFound { kind: "workspace", .. }));
    assert_eq!(h.remote.mutations(), 0);
}
