//! AgentPool reconciler.
//!
//! Token values are only returned when a token is issued. They are kept in
//! the `<pool>-agent-pool` Secret; a remote token whose value is missing from
//! the Secret is revoked and issued again.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tfc_client::{AgentPoolOptions, AgentToken, TfcApi, collect_all};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{Cleanup, Collection, Outcome, Reconciler, converge, safe_delete_outcome};
use crate::context::Session;
use crate::crd::agent_pool::AgentTokenStatus;
use crate::crd::{AgentPool, DeletionPolicy, ManagedResource};
use crate::diff::Comparison;
use crate::drift;
use crate::error::{Error, Result};

const KIND: &str = "agent pool";

pub struct AgentPoolReconciler;

impl AgentPoolReconciler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AgentPoolReconciler {
    fn default() -> Self {
        Self::new()
    }
}

struct Tokens {
    api: Arc<dyn TfcApi>,
    pool_id: String,
    /// Token names with a value in the Secret.
    stored: BTreeSet<String>,
    /// Values issued during this pass.
    issued: Mutex<BTreeMap<String, String>>,
}

#[async_trait]
impl Collection for Tokens {
    type Key = String;
    type Desired = ();
    type Observed = AgentToken;

    fn name(&self) -> &'static str {
        "agent tokens"
    }

    async fn observed(&self) -> Result<BTreeMap<String, AgentToken>> {
        let tokens = collect_all(None, |opts| async move {
            self.api.list_agent_tokens(&self.pool_id, &opts).await
        })
        .await?;
        Ok(tokens
            .into_iter()
            .map(|t| (t.description.clone(), t))
            .collect())
    }

    fn compare(&self, _desired: &(), observed: &AgentToken) -> Comparison {
        if self.stored.contains(&observed.description) {
            Comparison::Equal
        } else {
            Comparison::Replace
        }
    }

    async fn create(&self, name: &String, _desired: &()) -> Result<()> {
        let token = self.api.create_agent_token(&self.pool_id, name).await?;
        match token.token {
            Some(value) => {
                self.issued.lock().await.insert(name.clone(), value);
            }
            None => warn!(token = %name, "Issued agent token carries no value"),
        }
        Ok(())
    }

    async fn delete(&self, _name: &String, observed: &AgentToken) -> Result<()> {
        match self.api.delete_agent_token(&observed.id).await {
            Err(e) if !e.is_not_found() => Err(e.into()),
            _ => Ok(()),
        }
    }
}

async fn ensure_pool(s: &mut Session<AgentPool>) -> Result<tfc_client::AgentPool> {
    let opts = AgentPoolOptions {
        name: s.object.spec.name.clone(),
        organization_scoped: s.object.spec.organization_scoped,
    };

    if let Some(id) = s.object.remote_id().map(str::to_string) {
        match s.api.read_agent_pool(&id).await {
            Ok(pool) => {
                let differs = pool.name != opts.name
                    || pool.organization_scoped != opts.organization_scoped;
                let drift = drift::detect_by_attributes(&s.object, differs);
                if !drift.needs_update() {
                    return Ok(pool);
                }
                info!(agent_pool_id = %id, drift = %drift, "Updating agent pool");
                s.events.drift_detected(KIND, &id, &drift.to_string()).await;
                let pool = s.api.update_agent_pool(&id, &opts).await?;
                s.events.updated(KIND, &id).await;
                return Ok(pool);
            }
            Err(e) if e.is_not_found() => {
                warn!(agent_pool_id = %id, "Agent pool removed remotely, recreating");
                s.events.recreated(KIND, &id).await;
                s.object.status_mut().agent_tokens.clear();
            }
            Err(e) => return Err(e.into()),
        }
    }

    let pool = s.api.create_agent_pool(s.organization(), &opts).await?;
    info!(agent_pool_id = %pool.id, name = %pool.name, "Created agent pool");
    s.object.status_mut().agent_pool_id = Some(pool.id.clone());
    s.checkpoint().await?;
    s.events.created(KIND, &pool.id).await;
    Ok(pool)
}

fn unix(ts: Option<chrono::DateTime<chrono::Utc>>) -> Option<i64> {
    ts.map(|t| t.timestamp())
}

#[async_trait]
impl Reconciler for AgentPoolReconciler {
    type Resource = AgentPool;

    async fn reconcile(&self, s: &mut Session<AgentPool>) -> Result<Outcome> {
        let pool = ensure_pool(s).await?;
        let secret_name = s.object.token_secret_name();
        let existing = s.secret_data(&secret_name).await?.unwrap_or_default();

        let desired: BTreeMap<String, ()> = s
            .object
            .spec
            .agent_tokens
            .iter()
            .map(|t| (t.name.clone(), ()))
            .collect();
        let tokens = Tokens {
            api: s.api.clone(),
            pool_id: pool.id.clone(),
            stored: existing.keys().cloned().collect(),
            issued: Mutex::new(BTreeMap::new()),
        };
        let changes = converge(&tokens, desired.clone()).await?;
        s.events.collection_changed("agent tokens", &changes).await;

        let issued = tokens.issued.into_inner();
        let mut data: BTreeMap<String, String> = existing
            .iter()
            .filter(|(name, _)| desired.contains_key(*name))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let issued_count = issued.len();
        data.extend(issued);
        if data != existing {
            s.apply_secret(&secret_name, data).await?;
            info!(secret = %secret_name, issued = issued_count, "Stored agent tokens");
            s.events.tokens_stored(&secret_name, issued_count).await;
        }

        let listed = collect_all(None, |opts| {
            let api = s.api.clone();
            let pool_id = pool.id.clone();
            async move { api.list_agent_tokens(&pool_id, &opts).await }
        })
        .await?;
        let mut statuses: Vec<AgentTokenStatus> = listed
            .into_iter()
            .map(|t| AgentTokenStatus {
                name: t.description,
                id: t.id,
                created_at: unix(t.created_at),
                last_used_at: unix(t.last_used_at),
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));

        let status = s.object.status_mut();
        status.agent_pool_id = Some(pool.id);
        status.agent_tokens = statuses;
        Ok(Outcome::Converged)
    }

    async fn finalize(&self, s: &mut Session<AgentPool>, policy: DeletionPolicy) -> Result<Cleanup> {
        let Some(id) = s.object.remote_id().map(str::to_string) else {
            return Ok(Cleanup::Done);
        };
        match policy {
            DeletionPolicy::Retain => Ok(Cleanup::Done),
            DeletionPolicy::Destroy => {
                // The remote refuses while workspaces still use the pool.
                let outcome = safe_delete_outcome(s.api.delete_agent_pool(&id).await)?;
                if outcome == Cleanup::Done {
                    info!(agent_pool_id = %id, "Deleted agent pool");
                    s.events.deleted(KIND, &id).await;
                }
                Ok(outcome)
            }
            DeletionPolicy::Soft | DeletionPolicy::Force => Err(Error::Unimplemented {
                kind: "AgentPool".to_string(),
                policy,
            }),
        }
    }
}
