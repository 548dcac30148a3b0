//! Per-pass reconciliation context.
//!
//! A [`Session`] is built at the top of every pass from the object and a
//! client connected with the object's own credential, and dropped at the end.
//! Nothing in it outlives the pass.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use tfc_client::TfcApi;

use crate::config::OperatorConfig;
use crate::crd::{ConfigMapKeySelector, ManagedResource, SecretKeySelector};
use crate::error::Result;
use crate::events::ResourceEvents;
use crate::status;
use crate::store::{self, ObjectKey, ObjectStore, SecretStore};

pub struct Session<K: ManagedResource> {
    /// The object as read at the start of the pass, status mutated in place.
    pub object: K,
    pub key: ObjectKey,
    pub api: Arc<dyn TfcApi>,
    pub events: ResourceEvents,
    pub config: Arc<OperatorConfig>,
    store: Arc<dyn ObjectStore<K>>,
    secrets: Arc<dyn SecretStore>,
}

impl<K: ManagedResource> Session<K> {
    pub fn new(
        object: K,
        api: Arc<dyn TfcApi>,
        events: ResourceEvents,
        config: Arc<OperatorConfig>,
        store: Arc<dyn ObjectStore<K>>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            key: ObjectKey::of(&object),
            object,
            api,
            events,
            config,
            store,
            secrets,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.key.namespace
    }

    pub fn organization(&self) -> &str {
        self.object.organization()
    }

    /// Owner reference for objects the pass writes into the cluster.
    pub fn owner_reference(&self) -> Option<OwnerReference> {
        self.object.controller_owner_ref(&())
    }

    /// Persist progress made so far. Used right after a remote object or run
    /// is created so a retry never creates it twice.
    pub async fn checkpoint(&self) -> Result<()> {
        status::checkpoint(self.store.as_ref(), &self.object).await
    }

    pub(crate) async fn project_status(&mut self, converged: bool) -> Result<()> {
        status::project(self.store.as_ref(), &mut self.object, converged).await
    }

    pub async fn secret_value(&self, selector: &SecretKeySelector) -> Result<String> {
        store::secret_value(self.secrets.as_ref(), &self.key.namespace, selector).await
    }

    pub async fn config_map_value(&self, selector: &ConfigMapKeySelector) -> Result<String> {
        store::config_map_value(self.secrets.as_ref(), &self.key.namespace, selector).await
    }

    pub async fn secret_data(&self, name: &str) -> Result<Option<BTreeMap<String, String>>> {
        Ok(self.secrets.secret_data(&self.key.namespace, name).await?)
    }

    pub async fn apply_secret(&self, name: &str, data: BTreeMap<String, String>) -> Result<()> {
        self.secrets
            .apply_secret(&self.key.namespace, name, self.owner_reference(), data)
            .await?;
        Ok(())
    }

    pub async fn apply_config_map(&self, name: &str, data: BTreeMap<String, String>) -> Result<()> {
        self.secrets
            .apply_config_map(&self.key.namespace, name, self.owner_reference(), data)
            .await?;
        Ok(())
    }
}
