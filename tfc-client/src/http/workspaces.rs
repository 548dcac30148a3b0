//! Workspaces, workspace tags and remote state consumers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::HttpClient;
use super::jsonapi::{Identifier, Resource, to_many, to_one};
use crate::api::{RemoteStateApi, TagApi, WorkspaceApi};
use crate::error::Result;
use crate::models::{Tag, VcsRepo, Workspace, WorkspaceOptions};
use crate::paging::{ListOptions, Page};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct WorkspaceAttributes {
    name: String,
    description: Option<String>,
    auto_apply: bool,
    allow_destroy_plan: bool,
    execution_mode: Option<String>,
    terraform_version: Option<String>,
    working_directory: Option<String>,
    global_remote_state: bool,
    speculative_enabled: bool,
    vcs_repo: Option<VcsRepoAttributes>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct VcsRepoAttributes {
    identifier: String,
    branch: Option<String>,
    oauth_token_id: String,
}

impl From<Resource<WorkspaceAttributes>> for Workspace {
    fn from(r: Resource<WorkspaceAttributes>) -> Self {
        let project_id = r.related_id("project");
        let agent_pool_id = r.related_id("agent-pool");
        let ssh_key_id = r.related_id("ssh-key");
        let current_run_id = r.related_id("current-run");
        let a = r.attributes;
        Workspace {
            id: r.id,
            name: a.name,
            description: a.description.filter(|d| !d.is_empty()),
            auto_apply: a.auto_apply,
            allow_destroy_plan: a.allow_destroy_plan,
            execution_mode: a.execution_mode.unwrap_or_else(|| "remote".to_string()),
            terraform_version: a.terraform_version,
            working_directory: a.working_directory.filter(|d| !d.is_empty()),
            global_remote_state: a.global_remote_state,
            speculative_enabled: a.speculative_enabled,
            vcs_repo: a.vcs_repo.map(|v| VcsRepo {
                identifier: v.identifier,
                oauth_token_id: v.oauth_token_id,
                branch: v.branch.filter(|b| !b.is_empty()),
            }),
            updated_at: a.updated_at,
            project_id,
            agent_pool_id,
            ssh_key_id,
            current_run_id,
        }
    }
}

fn workspace_body(opts: &WorkspaceOptions) -> Value {
    let mut attributes = json!({
        "name": opts.name,
        "description": opts.description.clone().unwrap_or_default(),
        "auto-apply": opts.auto_apply,
        "allow-destroy-plan": opts.allow_destroy_plan,
        "execution-mode": opts.execution_mode,
        "working-directory": opts.working_directory.clone().unwrap_or_default(),
        "global-remote-state": opts.global_remote_state,
        "speculative-enabled": opts.speculative_enabled,
        "agent-pool-id": opts.agent_pool_id,
    });
    if let Some(version) = &opts.terraform_version {
        attributes["terraform-version"] = json!(version);
    }
    attributes["vcs-repo"] = match &opts.vcs_repo {
        Some(vcs) => json!({
            "identifier": vcs.identifier,
            "oauth-token-id": vcs.oauth_token_id,
            "branch": vcs.branch.clone().unwrap_or_default(),
        }),
        None => Value::Null,
    };

    let mut relationships = Map::new();
    if let Some(project_id) = &opts.project_id {
        relationships.insert("project".to_string(), to_one("projects", project_id));
    }

    json!({
        "data": {
            "type": "workspaces",
            "attributes": attributes,
            "relationships": relationships,
        }
    })
}

#[async_trait]
impl WorkspaceApi for HttpClient {
    async fn list_workspaces(&self, org: &str, opts: &ListOptions) -> Result<Page<Workspace>> {
        let page = self
            .list::<WorkspaceAttributes>(
                &format!("/organizations/{}/workspaces", org),
                opts,
                "search[name]",
                &[],
            )
            .await?;
        Ok(Page {
            items: page.items.into_iter().map(Workspace::from).collect(),
            next_page: page.next_page,
        })
    }

    async fn create_workspace(&self, org: &str, opts: &WorkspaceOptions) -> Result<Workspace> {
        let r = self
            .post::<WorkspaceAttributes>(
                &format!("/organizations/{}/workspaces", org),
                &workspace_body(opts),
            )
            .await?;
        Ok(r.into())
    }

    async fn read_workspace(&self, id: &str) -> Result<Workspace> {
        let r = self
            .get::<WorkspaceAttributes>(&format!("/workspaces/{}", id))
            .await?;
        Ok(r.into())
    }

    async fn update_workspace(&self, id: &str, opts: &WorkspaceOptions) -> Result<Workspace> {
        let r = self
            .patch::<WorkspaceAttributes>(&format!("/workspaces/{}", id), &workspace_body(opts))
            .await?;
        Ok(r.into())
    }

    async fn delete_workspace(&self, id: &str) -> Result<()> {
        self.delete(&format!("/workspaces/{}", id), None).await
    }

    async fn safe_delete_workspace(&self, id: &str) -> Result<()> {
        self.post_action(&format!("/workspaces/{}/actions/safe-delete", id), None)
            .await
    }

    async fn assign_ssh_key(&self, workspace_id: &str, ssh_key_id: &str) -> Result<()> {
        let body = json!({
            "data": {"type": "workspaces", "attributes": {"id": ssh_key_id}}
        });
        self.patch_action(
            &format!("/workspaces/{}/relationships/ssh-key", workspace_id),
            &body,
        )
        .await
    }

    async fn unassign_ssh_key(&self, workspace_id: &str) -> Result<()> {
        let body = json!({
            "data": {"type": "workspaces", "attributes": {"id": Value::Null}}
        });
        self.patch_action(
            &format!("/workspaces/{}/relationships/ssh-key", workspace_id),
            &body,
        )
        .await
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TagAttributes {
    name: String,
}

#[async_trait]
impl TagApi for HttpClient {
    async fn list_workspace_tags(
        &self,
        workspace_id: &str,
        opts: &ListOptions,
    ) -> Result<Page<Tag>> {
        let page = self
            .list::<TagAttributes>(
                &format!("/workspaces/{}/relationships/tags", workspace_id),
                opts,
                "q",
                &[],
            )
            .await?;
        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|r| Tag {
                    id: r.id,
                    name: r.attributes.name,
                })
                .collect(),
            next_page: page.next_page,
        })
    }

    async fn add_workspace_tags(&self, workspace_id: &str, names: &[String]) -> Result<()> {
        let data: Vec<Value> = names
            .iter()
            .map(|n| json!({"type": "tags", "attributes": {"name": n}}))
            .collect();
        self.post_action(
            &format!("/workspaces/{}/relationships/tags", workspace_id),
            Some(&json!({ "data": data })),
        )
        .await
    }

    async fn remove_workspace_tags(&self, workspace_id: &str, tags: &[Tag]) -> Result<()> {
        let data: Vec<Identifier> = tags
            .iter()
            .map(|t| Identifier {
                kind: "tags".to_string(),
                id: t.id.clone(),
            })
            .collect();
        self.delete(
            &format!("/workspaces/{}/relationships/tags", workspace_id),
            Some(&json!({ "data": data })),
        )
        .await
    }
}

#[async_trait]
impl RemoteStateApi for HttpClient {
    async fn list_remote_state_consumers(
        &self,
        workspace_id: &str,
        opts: &ListOptions,
    ) -> Result<Page<Workspace>> {
        let page = self
            .list::<WorkspaceAttributes>(
                &format!(
                    "/workspaces/{}/relationships/remote-state-consumers",
                    workspace_id
                ),
                opts,
                "q",
                &[],
            )
            .await?;
        Ok(Page {
            items: page.items.into_iter().map(Workspace::from).collect(),
            next_page: page.next_page,
        })
    }

    async fn add_remote_state_consumers(
        &self,
        workspace_id: &str,
        consumer_ids: &[String],
    ) -> Result<()> {
        self.post_action(
            &format!(
                "/workspaces/{}/relationships/remote-state-consumers",
                workspace_id
            ),
            Some(&to_many("workspaces", consumer_ids)),
        )
        .await
    }

    async fn remove_remote_state_consumers(
        &self,
        workspace_id: &str,
        consumer_ids: &[String],
    ) -> Result<()> {
        self.delete(
            &format!(
                "/workspaces/{}/relationships/remote-state-consumers",
                workspace_id
            ),
            Some(&to_many("workspaces", consumer_ids)),
        )
        .await
    }
}
