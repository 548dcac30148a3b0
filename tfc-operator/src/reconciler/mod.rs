//! Reconcilers for the managed resource kinds.
//!
//! Each reconciler converges one kind's remote counterpart. The shared
//! [`Orchestrator`] owns everything around it: fetching the object,
//! validation, the finalizer lifecycle, client acquisition and the final
//! status write.

pub mod agent_pool;
pub mod collection;
pub mod module;
pub mod project;
pub mod workspace;

use std::sync::Arc;

use async_trait::async_trait;
use kube::Resource;
use kube::runtime::controller::Action;
use tfc_client::ClientFactory;
use tracing::{debug, info, instrument, warn};

pub use collection::{Collection, converge};

use crate::config::OperatorConfig;
use crate::context::Session;
use crate::crd::{DeletionPolicy, ManagedResource};
use crate::error::{Error, Result};
use crate::events::{EventSink, ResourceEvents};
use crate::lifecycle::{self, FinalizerChange, Observation};
use crate::store::{self, ObjectKey, ObjectStore, SecretStore};

pub use agent_pool::AgentPoolReconciler;
pub use module::ModuleReconciler;
pub use project::ProjectReconciler;
pub use workspace::WorkspaceReconciler;

/// Result of a convergence pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Remote state matches the desired state.
    Converged,
    /// Waiting on the remote service (a run, an upload).
    Pending,
}

/// Result of a cleanup pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cleanup {
    /// Nothing left remotely, the finalizer may go.
    Done,
    /// Cleanup in progress (a destroy run).
    Pending,
    /// The remote refused while live dependents remain.
    Refused(String),
}

/// Trait for resource reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    type Resource: ManagedResource;

    /// Converge the remote counterpart onto the desired state.
    async fn reconcile(&self, session: &mut Session<Self::Resource>) -> Result<Outcome>;

    /// Clean up the remote counterpart under `policy`.
    async fn finalize(
        &self,
        session: &mut Session<Self::Resource>,
        policy: DeletionPolicy,
    ) -> Result<Cleanup>;
}

fn kind<K: ManagedResource>() -> String {
    K::kind(&()).into_owned()
}

/// Drives one reconciler through the per-object lifecycle.
pub struct Orchestrator<R: Reconciler> {
    reconciler: R,
    store: Arc<dyn ObjectStore<R::Resource>>,
    secrets: Arc<dyn SecretStore>,
    events: Arc<dyn EventSink>,
    clients: Arc<dyn ClientFactory>,
    config: Arc<OperatorConfig>,
}

impl<R: Reconciler> Orchestrator<R> {
    pub fn new(
        reconciler: R,
        store: Arc<dyn ObjectStore<R::Resource>>,
        secrets: Arc<dyn SecretStore>,
        events: Arc<dyn EventSink>,
        clients: Arc<dyn ClientFactory>,
        config: Arc<OperatorConfig>,
    ) -> Self {
        Self {
            reconciler,
            store,
            secrets,
            events,
            clients,
            config,
        }
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// One reconciliation pass for the object at `key`.
    #[instrument(
        skip_all,
        fields(kind = %kind::<R::Resource>(), namespace = %key.namespace, name = %key.name)
    )]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        let Some(obj) = self.store.get(key).await? else {
            debug!("object is gone");
            return Ok(Action::await_change());
        };
        let events = ResourceEvents::new(self.events.clone(), obj.object_ref(&()));
        let deleting = obj.meta().deletion_timestamp.is_some();

        if !deleting {
            if let Err(msg) = obj.validate() {
                warn!(error = %msg, "spec rejected");
                events.validation_failed(&msg).await;
                return Err(Error::Validation(msg));
            }
        }

        let policy = obj.deletion_policy();
        let decision = lifecycle::decide(Observation::of(&obj), policy);
        debug!(action = ?decision.action, finalizer = ?decision.finalizer, "lifecycle decision");

        match (decision.action, decision.finalizer) {
            (_, FinalizerChange::Attach) => {
                store::add_finalizer(self.store.as_ref(), &obj).await?;
                info!("Attached finalizer");
                events.finalizer_added().await;
                Ok(Action::requeue(self.config.attach_requeue))
            }
            (lifecycle::Action::Skip, FinalizerChange::Remove) => {
                if let (DeletionPolicy::Retain, Some(id)) = (policy, obj.remote_id()) {
                    info!(remote_id = id, "Retaining remote object");
                    events.retained(&kind::<R::Resource>(), id).await;
                }
                store::remove_finalizer(self.store.as_ref(), &obj).await?;
                events.finalizer_removed().await;
                Ok(Action::await_change())
            }
            (lifecycle::Action::Skip, _) => Ok(Action::await_change()),
            (lifecycle::Action::Cleanup(policy), _) => self.cleanup(obj, events, policy).await,
            (lifecycle::Action::Converge, _) => self.converge(obj, events).await,
        }
    }

    async fn session(
        &self,
        obj: R::Resource,
        events: ResourceEvents,
    ) -> Result<Session<R::Resource>> {
        let namespace = obj.meta().namespace.clone().unwrap_or_default();
        let token = store::secret_value(
            self.secrets.as_ref(),
            &namespace,
            &obj.token().secret_key_ref,
        )
        .await?;
        let api = self.clients.connect(&token)?;
        Ok(Session::new(
            obj,
            api,
            events,
            self.config.clone(),
            self.store.clone(),
            self.secrets.clone(),
        ))
    }

    async fn converge(&self, obj: R::Resource, events: ResourceEvents) -> Result<Action> {
        let mut session = match self.session(obj, events.clone()).await {
            Ok(s) => s,
            Err(e) => return Err(report(&events, e).await),
        };

        match self.reconciler.reconcile(&mut session).await {
            Ok(Outcome::Converged) => {
                session.project_status(true).await?;
                debug!("converged");
                Ok(Action::requeue(self.config.sync_period))
            }
            Ok(Outcome::Pending) => {
                session.project_status(false).await?;
                debug!("waiting on remote");
                Ok(Action::requeue(self.config.poll_interval))
            }
            Err(e) => Err(report(&events, e).await),
        }
    }

    async fn cleanup(
        &self,
        obj: R::Resource,
        events: ResourceEvents,
        policy: DeletionPolicy,
    ) -> Result<Action> {
        let key = ObjectKey::of(&obj);
        let remote_id = obj.remote_id().unwrap_or_default().to_string();
        let mut session = match self.session(obj, events.clone()).await {
            Ok(s) => s,
            Err(e) => return Err(report(&events, e).await),
        };

        match self.reconciler.finalize(&mut session, policy).await {
            Ok(Cleanup::Done) => {
                // Re-read: cleanup may have checkpointed status since.
                if let Some(current) = self.store.get(&key).await? {
                    store::remove_finalizer(self.store.as_ref(), &current).await?;
                }
                info!(remote_id = %remote_id, policy = %policy, "Cleanup finished");
                events.finalizer_removed().await;
                Ok(Action::await_change())
            }
            Ok(Cleanup::Pending) => Ok(Action::requeue(self.config.poll_interval)),
            Ok(Cleanup::Refused(msg)) => {
                info!(remote_id = %remote_id, reason = %msg, "Deletion refused, retrying later");
                events
                    .deletion_refused(&kind::<R::Resource>(), &remote_id, &msg)
                    .await;
                Ok(Action::requeue(self.config.requeue_interval))
            }
            Err(e @ Error::Unimplemented { .. }) => {
                warn!(policy = %policy, "Deletion policy not supported");
                events
                    .policy_unimplemented(&kind::<R::Resource>(), policy)
                    .await;
                Err(e)
            }
            Err(e) => Err(report(&events, e).await),
        }
    }
}

async fn report(events: &ResourceEvents, err: Error) -> Error {
    warn!(error = %err, "reconciliation failed");
    events.reconcile_failed(err.reason(), &err.to_string()).await;
    err
}

/// Map a safe-delete result onto the cleanup outcome: a conflict is a
/// refusal, not-found means already clean.
pub(crate) fn safe_delete_outcome(result: tfc_client::Result<()>) -> Result<Cleanup> {
    match result {
        Ok(()) => Ok(Cleanup::Done),
        Err(e) if e.is_not_found() => Ok(Cleanup::Done),
        Err(e) if e.is_conflict() => Ok(Cleanup::Refused(e.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Unconditional delete, not-found counts as success.
pub(crate) fn force_delete_outcome(result: tfc_client::Result<()>) -> Result<Cleanup> {
    match result {
        Ok(()) => Ok(Cleanup::Done),
        Err(e) if e.is_not_found() => Ok(Cleanup::Done),
        Err(e) => Err(e.into()),
    }
}
