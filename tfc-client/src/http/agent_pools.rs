//! Agent pools and their authentication tokens.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use super::HttpClient;
use super::jsonapi::Resource;
use crate::api::AgentPoolApi;
use crate::error::Result;
use crate::models::{AgentPool, AgentPoolOptions, AgentToken};
use crate::paging::{ListOptions, Page};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct AgentPoolAttributes {
    name: String,
    organization_scoped: bool,
}

impl Default for AgentPoolAttributes {
    fn default() -> Self {
        Self {
            name: String::new(),
            organization_scoped: true,
        }
    }
}

impl From<Resource<AgentPoolAttributes>> for AgentPool {
    fn from(r: Resource<AgentPoolAttributes>) -> Self {
        AgentPool {
            workspace_ids: r.related_ids("workspaces"),
            id: r.id,
            name: r.attributes.name,
            organization_scoped: r.attributes.organization_scoped,
        }
    }
}

fn agent_pool_body(opts: &AgentPoolOptions) -> Value {
    json!({
        "data": {
            "type": "agent-pools",
            "attributes": {
                "name": opts.name,
                "organization-scoped": opts.organization_scoped,
            },
        }
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct AgentTokenAttributes {
    description: String,
    created_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
    token: Option<String>,
}

impl From<Resource<AgentTokenAttributes>> for AgentToken {
    fn from(r: Resource<AgentTokenAttributes>) -> Self {
        let a = r.attributes;
        AgentToken {
            id: r.id,
            description: a.description,
            created_at: a.created_at,
            last_used_at: a.last_used_at,
            token: a.token,
        }
    }
}

#[async_trait]
impl AgentPoolApi for HttpClient {
    async fn list_agent_pools(&self, org: &str, opts: &ListOptions) -> Result<Page<AgentPool>> {
        let page = self
            .list::<AgentPoolAttributes>(
                &format!("/organizations/{}/agent-pools", org),
                opts,
                "q",
                &[],
            )
            .await?;
        Ok(Page {
            items: page.items.into_iter().map(AgentPool::from).collect(),
            next_page: page.next_page,
        })
    }

    async fn create_agent_pool(&self, org: &str, opts: &AgentPoolOptions) -> Result<AgentPool> {
        let r = self
            .post::<AgentPoolAttributes>(
                &format!("/organizations/{}/agent-pools", org),
                &agent_pool_body(opts),
            )
            .await?;
        Ok(r.into())
    }

    async fn read_agent_pool(&self, id: &str) -> Result<AgentPool> {
        let r = self
            .get::<AgentPoolAttributes>(&format!("/agent-pools/{}", id))
            .await?;
        Ok(r.into())
    }

    async fn update_agent_pool(&self, id: &str, opts: &AgentPoolOptions) -> Result<AgentPool> {
        let r = self
            .patch::<AgentPoolAttributes>(&format!("/agent-pools/{}", id), &agent_pool_body(opts))
            .await?;
        Ok(r.into())
    }

    async fn delete_agent_pool(&self, id: &str) -> Result<()> {
        self.delete(&format!("/agent-pools/{}", id), None).await
    }

    async fn list_agent_tokens(
        &self,
        pool_id: &str,
        opts: &ListOptions,
    ) -> Result<Page<AgentToken>> {
        let page = self
            .list::<AgentTokenAttributes>(
                &format!("/agent-pools/{}/authentication-tokens", pool_id),
                opts,
                "q",
                &[],
            )
            .await?;
        Ok(Page {
            items: page.items.into_iter().map(AgentToken::from).collect(),
            next_page: page.next_page,
        })
    }

    async fn create_agent_token(&self, pool_id: &str, description: &str) -> Result<AgentToken> {
        let body = json!({
            "data": {
                "type": "authentication-tokens",
                "attributes": {"description": description},
            }
        });
        let r = self
            .post::<AgentTokenAttributes>(
                &format!("/agent-pools/{}/authentication-tokens", pool_id),
                &body,
            )
            .await?;
        Ok(r.into())
    }

    async fn delete_agent_token(&self, id: &str) -> Result<()> {
        self.delete(&format!("/authentication-tokens/{}", id), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_pool_workspaces() {
        let raw = r#"{
            "id": "apool-1",
            "type": "agent-pools",
            "attributes": {"name": "builders"},
            "relationships": {"workspaces": {"data": [
                {"id": "ws-1", "type": "workspaces"},
                {"id": "ws-2", "type": "workspaces"}
            ]}}
        }"#;
        let r: Resource<AgentPoolAttributes> = serde_json::from_str(raw).unwrap();
        let pool = AgentPool::from(r);

        assert!(pool.organization_scoped);
        assert_eq!(pool.workspace_ids.len(), 2);
    }

    #[test]
    fn test_issued_token_carries_secret() {
        let raw = r#"{
            "id": "at-1",
            "type": "authentication-tokens",
            "attributes": {"description": "ci", "created-at": "2024-05-01T10:00:00Z", "token": "secret"}
        }"#;
        let r: Resource<AgentTokenAttributes> = serde_json::from_str(raw).unwrap();
        let token = AgentToken::from(r);

        assert_eq!(token.token.as_deref(), Some("secret"));
        assert_eq!(token.last_used_at, None);
    }
}
