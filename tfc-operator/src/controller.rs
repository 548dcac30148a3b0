//! Controller wiring.
//!
//! One kube-runtime controller per kind (and per watched namespace). Watch
//! events are filtered so only generation changes and deletion-marker
//! transitions start a pass; periodic resync comes from the requeue a
//! converged pass returns.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::StreamExt;
use futures::future::{BoxFuture, FutureExt, join_all};
use kube::api::Api;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::{WatchStreamExt, reflector, watcher};
use kube::{Client, Resource};
use tfc_client::{ClientFactory, HttpClientFactory};
use tracing::{debug, error, info, warn};

use crate::config::OperatorConfig;
use crate::error::Error;
use crate::events::{EventSink, KubeEventSink};
use crate::reconciler::{
    AgentPoolReconciler, ModuleReconciler, Orchestrator, ProjectReconciler, Reconciler,
    WorkspaceReconciler,
};
use crate::store::{KubeSecretStore, KubeStore, ObjectKey, SecretStore};

/// Reporting controller name on events.
pub const CONTROLLER_NAME: &str = "tfc-operator";

/// Watch predicate: changes only when the generation or the presence of a
/// deletion marker changes.
pub fn lifecycle_hash<K: Resource>(obj: &K) -> Option<u64> {
    let meta = obj.meta();
    let mut hasher = DefaultHasher::new();
    meta.generation.hash(&mut hasher);
    meta.deletion_timestamp.is_some().hash(&mut hasher);
    Some(hasher.finish())
}

async fn reconcile<R: Reconciler>(
    obj: Arc<R::Resource>,
    ctx: Arc<Orchestrator<R>>,
) -> Result<Action, Error> {
    ctx.reconcile(&ObjectKey::of(obj.as_ref())).await
}

/// Validation, unsupported policies and failed runs need a spec change;
/// everything else is retried after the fixed interval.
fn error_policy<R: Reconciler>(
    obj: Arc<R::Resource>,
    err: &Error,
    ctx: Arc<Orchestrator<R>>,
) -> Action {
    error!(
        error = %err,
        object = %ObjectKey::of(obj.as_ref()),
        retryable = err.is_retryable(),
        "reconciliation failed"
    );
    if err.is_retryable() {
        Action::requeue(ctx.config().requeue_interval)
    } else {
        Action::await_change()
    }
}

/// Run one controller until shutdown.
async fn run_controller<R: Reconciler>(
    api: Api<R::Resource>,
    orchestrator: Orchestrator<R>,
    workers: u16,
) {
    let kind = R::Resource::kind(&()).into_owned();
    let (reader, writer) = reflector::store();
    let stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .predicate_filter(lifecycle_hash::<R::Resource>);

    info!(kind = %kind, workers, "Starting controller");
    Controller::for_stream(stream, reader)
        .with_config(controller::Config::default().concurrency(workers))
        .shutdown_on_signal()
        .run(reconcile::<R>, error_policy::<R>, Arc::new(orchestrator))
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!(object = %obj.name, "reconciled"),
                Err(e) => warn!(error = %e, "controller error"),
            }
        })
        .await;
    info!(kind = %kind, "Controller stopped");
}

fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Shared collaborators handed to every orchestrator.
struct Collaborators {
    client: Client,
    secrets: Arc<dyn SecretStore>,
    events: Arc<dyn EventSink>,
    clients: Arc<dyn ClientFactory>,
    config: Arc<OperatorConfig>,
}

impl Collaborators {
    fn controller<R: Reconciler>(
        &self,
        reconciler: R,
        namespace: Option<&str>,
        workers: u16,
    ) -> BoxFuture<'static, ()> {
        let orchestrator = Orchestrator::new(
            reconciler,
            Arc::new(KubeStore::<R::Resource>::new(self.client.clone())),
            self.secrets.clone(),
            self.events.clone(),
            self.clients.clone(),
            self.config.clone(),
        );
        run_controller(api(&self.client, namespace), orchestrator, workers).boxed()
    }
}

/// Register the controllers for every kind and run them until shutdown.
pub async fn setup(client: Client, config: OperatorConfig, instance: Option<String>) {
    let config = Arc::new(config);
    let shared = Collaborators {
        secrets: Arc::new(KubeSecretStore::new(client.clone())),
        events: Arc::new(KubeEventSink::new(client.clone(), CONTROLLER_NAME, instance)),
        clients: Arc::new(HttpClientFactory::new(
            config.tfe_address.clone(),
            config.skip_tls_verify,
        )),
        config: config.clone(),
        client,
    };

    let namespaces: Vec<Option<&str>> = if config.namespaces.is_empty() {
        vec![None]
    } else {
        config.namespaces.iter().map(|ns| Some(ns.as_str())).collect()
    };

    let mut controllers = Vec::new();
    for ns in namespaces {
        info!(namespace = ns.unwrap_or("<all>"), "Watching namespace");
        controllers.push(shared.controller(WorkspaceReconciler::new(), ns, config.workspace_workers));
        controllers.push(shared.controller(ProjectReconciler::new(), ns, config.project_workers));
        controllers.push(shared.controller(ModuleReconciler::new(), ns, config.module_workers));
        controllers.push(shared.controller(AgentPoolReconciler::new(), ns, config.agent_pool_workers));
    }
    join_all(controllers).await;
}
