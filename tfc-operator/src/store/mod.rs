//! Object store and secret store collaborators.
//!
//! The engine reads and writes managed objects through [`ObjectStore`] and
//! resolves credentials / publishes outputs through [`SecretStore`]. The
//! Kubernetes implementations live in [`kubernetes`]; tests use in-memory fakes.

pub mod kubernetes;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use thiserror::Error;

use crate::crd::{ConfigMapKeySelector, FINALIZER, ManagedResource, SecretKeySelector};

pub use kubernetes::{KubeSecretStore, KubeStore};

/// Errors from the object or secret store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("kubernetes: {0}")]
    Kube(#[from] kube::Error),

    /// Optimistic concurrency failure, the object changed underneath us.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Namespace and name of a managed object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn of<K: ResourceExt>(obj: &K) -> Self {
        Self::new(obj.namespace().unwrap_or_default(), obj.name_any())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Access to managed objects of one kind.
#[async_trait]
pub trait ObjectStore<K: ManagedResource>: Send + Sync {
    /// Current object, `None` once it is gone from the store.
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>>;

    /// Persist metadata changes (finalizers). Returns the stored object.
    async fn update(&self, obj: &K) -> Result<K>;

    /// Persist the status sub-resource.
    async fn update_status(&self, obj: &K) -> Result<()>;
}

pub fn has_finalizer<K: ResourceExt>(obj: &K) -> bool {
    obj.finalizers().iter().any(|f| f == FINALIZER)
}

/// Attach the engine finalizer. A no-op if already present.
pub async fn add_finalizer<K: ManagedResource>(store: &dyn ObjectStore<K>, obj: &K) -> Result<K> {
    if has_finalizer(obj) {
        return Ok(obj.clone());
    }
    let mut updated = obj.clone();
    updated.finalizers_mut().push(FINALIZER.to_string());
    store.update(&updated).await
}

/// Drop the engine finalizer, letting the store erase a deleting object.
pub async fn remove_finalizer<K: ManagedResource>(
    store: &dyn ObjectStore<K>,
    obj: &K,
) -> Result<K> {
    if !has_finalizer(obj) {
        return Ok(obj.clone());
    }
    let mut updated = obj.clone();
    updated.finalizers_mut().retain(|f| f != FINALIZER);
    store.update(&updated).await
}

/// Secrets and config maps in the managed objects' namespaces.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn secret_data(&self, namespace: &str, name: &str)
    -> Result<Option<BTreeMap<String, String>>>;

    async fn config_map_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>>;

    /// Create or replace a secret. Keys absent from `data` are dropped.
    async fn apply_secret(
        &self,
        namespace: &str,
        name: &str,
        owner: Option<OwnerReference>,
        data: BTreeMap<String, String>,
    ) -> Result<()>;

    /// Create or replace a config map. Keys absent from `data` are dropped.
    async fn apply_config_map(
        &self,
        namespace: &str,
        name: &str,
        owner: Option<OwnerReference>,
        data: BTreeMap<String, String>,
    ) -> Result<()>;
}

/// Read one key of a secret.
pub async fn secret_value(
    store: &dyn SecretStore,
    namespace: &str,
    selector: &SecretKeySelector,
) -> crate::error::Result<String> {
    let data = store
        .secret_data(namespace, &selector.name)
        .await?
        .ok_or_else(|| {
            crate::Error::Credential(format!("secret {}/{} not found", namespace, selector.name))
        })?;
    data.get(&selector.key).cloned().ok_or_else(|| {
        crate::Error::Credential(format!(
            "secret {}/{} has no key {}",
            namespace, selector.name, selector.key
        ))
    })
}

/// Read one key of a config map.
pub async fn config_map_value(
    store: &dyn SecretStore,
    namespace: &str,
    selector: &ConfigMapKeySelector,
) -> crate::error::Result<String> {
    let data = store
        .config_map_data(namespace, &selector.name)
        .await?
        .ok_or_else(|| {
            crate::Error::Credential(format!(
                "config map {}/{} not found",
                namespace, selector.name
            ))
        })?;
    data.get(&selector.key).cloned().ok_or_else(|| {
        crate::Error::Credential(format!(
            "config map {}/{} has no key {}",
            namespace, selector.name, selector.key
        ))
    })
}
