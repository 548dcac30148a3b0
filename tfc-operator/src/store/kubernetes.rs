//! Kubernetes API server backed stores.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::debug;

use super::{ObjectKey, ObjectStore, Result, SecretStore, StoreError};
use crate::crd::ManagedResource;

/// Field manager for every write the operator makes.
pub const FIELD_MANAGER: &str = "tfc-operator";

fn map_error(err: kube::Error, what: &str) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict(format!("{}: {}", what, ae.message)),
        other => StoreError::Kube(other),
    }
}

/// Managed objects of kind `K`, read and written through the API server.
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K: ManagedResource> KubeStore<K> {
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl<K: ManagedResource> ObjectStore<K> for KubeStore<K> {
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>> {
        Ok(self.api(&key.namespace).get_opt(&key.name).await?)
    }

    async fn update(&self, obj: &K) -> Result<K> {
        let key = ObjectKey::of(obj);
        // resourceVersion makes the merge patch fail on a stale object.
        let patch = json!({
            "metadata": {
                "finalizers": obj.finalizers(),
                "resourceVersion": obj.resource_version(),
            }
        });
        debug!(object = %key, "patching metadata");
        self.api(&key.namespace)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_error(e, &key.to_string()))
    }

    async fn update_status(&self, obj: &K) -> Result<()> {
        let key = ObjectKey::of(obj);
        // Applied rather than merged so fields cleared in status are dropped.
        let patch = json!({
            "apiVersion": K::api_version(&()),
            "kind": K::kind(&()),
            "status": obj.status(),
        });
        debug!(object = %key, "applying status");
        self.api(&key.namespace)
            .patch_status(
                &key.name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&patch),
            )
            .await
            .map_err(|e| map_error(e, &key.to_string()))?;
        Ok(())
    }
}

/// Secrets and config maps through the API server.
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn metadata(namespace: &str, name: &str, owner: Option<OwnerReference>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        owner_references: owner.map(|o| vec![o]),
        ..Default::default()
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = api.get_opt(name).await? else {
            return Ok(None);
        };
        let mut out = BTreeMap::new();
        for (key, ByteString(bytes)) in secret.data.unwrap_or_default() {
            let value = String::from_utf8(bytes).map_err(|_| {
                StoreError::InvalidData(format!("secret {}/{} key {} is not UTF-8", namespace, name, key))
            })?;
            out.insert(key, value);
        }
        Ok(Some(out))
    }

    async fn config_map_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api
            .get_opt(name)
            .await?
            .map(|cm| cm.data.unwrap_or_default()))
    }

    async fn apply_secret(
        &self,
        namespace: &str,
        name: &str,
        owner: Option<OwnerReference>,
        data: BTreeMap<String, String>,
    ) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = Secret {
            metadata: metadata(namespace, name, owner),
            type_: Some("Opaque".to_string()),
            data: Some(
                data.into_iter()
                    .map(|(k, v)| (k, ByteString(v.into_bytes())))
                    .collect(),
            ),
            ..Default::default()
        };
        debug!(namespace, name, "applying secret");
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&secret),
        )
        .await
        .map_err(|e| map_error(e, name))?;
        Ok(())
    }

    async fn apply_config_map(
        &self,
        namespace: &str,
        name: &str,
        owner: Option<OwnerReference>,
        data: BTreeMap<String, String>,
    ) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let cm = ConfigMap {
            metadata: metadata(namespace, name, owner),
            data: Some(data),
            ..Default::default()
        };
        debug!(namespace, name, "applying config map");
        api.patch(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&cm))
            .await
            .map_err(|e| map_error(e, name))?;
        Ok(())
    }
}
