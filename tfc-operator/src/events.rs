//! User-visible events on managed objects.
//!
//! [`EventSink`] is the transport (Kubernetes Events in production, an
//! in-memory recorder in tests). [`ResourceEvents`] binds a sink to one
//! object and has one method per transition the engine reports.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event as KubeEvent, EventType, Recorder, Reporter};
use tracing::warn;

use crate::crd::DeletionPolicy;
use crate::diff::Changes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub severity: Severity,
    pub reason: &'static str,
    pub action: &'static str,
    pub note: String,
}

/// Where events go. Publishing never fails the pass.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, regarding: &ObjectReference, event: Event);
}

/// Kubernetes Events via the kube-runtime recorder.
pub struct KubeEventSink {
    recorder: Recorder,
}

impl KubeEventSink {
    pub fn new(client: Client, controller: &str, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(&self, regarding: &ObjectReference, event: Event) {
        let ev = KubeEvent {
            type_: match event.severity {
                Severity::Normal => EventType::Normal,
                Severity::Warning => EventType::Warning,
            },
            reason: event.reason.to_string(),
            note: Some(event.note),
            action: event.action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&ev, regarding).await {
            warn!(error = %e, reason = event.reason, "failed to publish event");
        }
    }
}

/// Event helper bound to one managed object.
#[derive(Clone)]
pub struct ResourceEvents {
    sink: Arc<dyn EventSink>,
    regarding: ObjectReference,
}

impl ResourceEvents {
    pub fn new(sink: Arc<dyn EventSink>, regarding: ObjectReference) -> Self {
        Self { sink, regarding }
    }

    async fn emit(&self, severity: Severity, reason: &'static str, action: &'static str, note: String) {
        self.sink
            .publish(
                &self.regarding,
                Event {
                    severity,
                    reason,
                    action,
                    note,
                },
            )
            .await;
    }

    // Lifecycle
    pub async fn finalizer_added(&self) {
        self.emit(Severity::Normal, "FinalizerAdded", "Reconcile", "Finalizer attached".to_string())
            .await;
    }

    pub async fn finalizer_removed(&self) {
        self.emit(Severity::Normal, "FinalizerRemoved", "Delete", "Finalizer removed".to_string())
            .await;
    }

    pub async fn validation_failed(&self, message: &str) {
        self.emit(
            Severity::Warning,
            "InvalidSpec",
            "Reconcile",
            format!("Spec rejected: {}", message),
        )
        .await;
    }

    pub async fn reconcile_failed(&self, reason: &'static str, message: &str) {
        self.emit(Severity::Warning, reason, "Reconcile", message.to_string())
            .await;
    }

    // Remote object
    pub async fn created(&self, kind: &str, remote_id: &str) {
        self.emit(
            Severity::Normal,
            "Created",
            "Create",
            format!("Created {} {}", kind, remote_id),
        )
        .await;
    }

    pub async fn recreated(&self, kind: &str, old_id: &str) {
        self.emit(
            Severity::Warning,
            "RemoteMissing",
            "Create",
            format!("{} {} no longer exists remotely, creating a new one", kind, old_id),
        )
        .await;
    }

    pub async fn drift_detected(&self, kind: &str, remote_id: &str, reason: &str) {
        self.emit(
            Severity::Normal,
            "DriftDetected",
            "Update",
            format!("{} {} drifted: {}", kind, remote_id, reason),
        )
        .await;
    }

    pub async fn updated(&self, kind: &str, remote_id: &str) {
        self.emit(
            Severity::Normal,
            "Updated",
            "Update",
            format!("Updated {} {}", kind, remote_id),
        )
        .await;
    }

    pub async fn deleted(&self, kind: &str, remote_id: &str) {
        self.emit(
            Severity::Normal,
            "Deleted",
            "Delete",
            format!("Deleted {} {}", kind, remote_id),
        )
        .await;
    }

    pub async fn retained(&self, kind: &str, remote_id: &str) {
        self.emit(
            Severity::Normal,
            "Retained",
            "Delete",
            format!("Leaving {} {} in place", kind, remote_id),
        )
        .await;
    }

    pub async fn deletion_refused(&self, kind: &str, remote_id: &str, message: &str) {
        self.emit(
            Severity::Warning,
            "DeletionRefused",
            "Delete",
            format!("{} {} cannot be deleted yet: {}", kind, remote_id, message),
        )
        .await;
    }

    pub async fn policy_unimplemented(&self, kind: &str, policy: DeletionPolicy) {
        self.emit(
            Severity::Warning,
            "Unimplemented",
            "Delete",
            format!("Deletion policy {} is not supported for {}", policy, kind),
        )
        .await;
    }

    // Sub-resources
    pub async fn collection_changed(&self, collection: &str, changes: &Changes) {
        if changes.is_empty() {
            return;
        }
        self.emit(
            Severity::Normal,
            "Reconciled",
            "Update",
            format!(
                "{}: {} created, {} updated, {} replaced, {} deleted",
                collection, changes.created, changes.updated, changes.replaced, changes.deleted
            ),
        )
        .await;
    }

    // Runs and pipeline
    pub async fn run_queued(&self, run_id: &str, destroy: bool) {
        let what = if destroy { "Destroy run" } else { "Run" };
        self.emit(
            Severity::Normal,
            "RunQueued",
            "Run",
            format!("{} {} queued", what, run_id),
        )
        .await;
    }

    pub async fn run_finished(&self, run_id: &str, status: &str) {
        let severity = if matches!(status, "applied" | "planned_and_finished") {
            Severity::Normal
        } else {
            Severity::Warning
        };
        self.emit(
            severity,
            "RunFinished",
            "Run",
            format!("Run {} finished: {}", run_id, status),
        )
        .await;
    }

    pub async fn configuration_uploaded(&self, cv_id: &str) {
        self.emit(
            Severity::Normal,
            "ConfigurationUploaded",
            "Upload",
            format!("Configuration version {} uploaded", cv_id),
        )
        .await;
    }

    pub async fn outputs_synced(&self, run_id: &str, count: usize) {
        self.emit(
            Severity::Normal,
            "OutputsSynced",
            "Update",
            format!("{} outputs synchronized from run {}", count, run_id),
        )
        .await;
    }

    pub async fn tokens_stored(&self, secret: &str, count: usize) {
        self.emit(
            Severity::Normal,
            "TokensStored",
            "Update",
            format!("{} agent tokens stored in secret {}", count, secret),
        )
        .await;
    }
}
