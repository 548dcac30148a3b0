//! Teams, workspace/project team access, organization lookups.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::HttpClient;
use super::jsonapi::{Resource, to_one};
use crate::api::{OrganizationApi, TeamApi};
use crate::error::Result;
use crate::models::{
    OrganizationMembership, ProjectPermissions, ProjectTeamAccess, ProjectTeamAccessOptions,
    SshKey, Team, TeamAccess, TeamAccessOptions, WorkspacePermissions,
};
use crate::paging::{ListOptions, Page};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NameAttributes {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct TeamAccessAttributes {
    access: String,
    runs: Option<String>,
    variables: Option<String>,
    state_versions: Option<String>,
    sentinel_mocks: Option<String>,
    workspace_locking: Option<bool>,
    run_tasks: Option<bool>,
}

impl From<Resource<TeamAccessAttributes>> for TeamAccess {
    fn from(r: Resource<TeamAccessAttributes>) -> Self {
        let team_id = r.related_id("team").unwrap_or_default();
        let a = r.attributes;
        TeamAccess {
            id: r.id,
            team_id,
            permissions: if a.access == "custom" {
                WorkspacePermissions {
                    runs: a.runs,
                    variables: a.variables,
                    state_versions: a.state_versions,
                    sentinel_mocks: a.sentinel_mocks,
                    workspace_locking: a.workspace_locking,
                    run_tasks: a.run_tasks,
                }
            } else {
                WorkspacePermissions::default()
            },
            access: a.access,
        }
    }
}

fn team_access_body(workspace_id: Option<&str>, opts: &TeamAccessOptions) -> Value {
    let mut attributes = json!({ "access": opts.access });
    if opts.access == "custom" {
        let p = &opts.permissions;
        attributes["runs"] = json!(p.runs);
        attributes["variables"] = json!(p.variables);
        attributes["state-versions"] = json!(p.state_versions);
        attributes["sentinel-mocks"] = json!(p.sentinel_mocks);
        attributes["workspace-locking"] = json!(p.workspace_locking);
        attributes["run-tasks"] = json!(p.run_tasks);
    }
    let mut data = json!({ "type": "team-workspaces", "attributes": attributes });
    if let Some(workspace_id) = workspace_id {
        data["relationships"] = json!({
            "workspace": to_one("workspaces", workspace_id),
            "team": to_one("teams", &opts.team_id),
        });
    }
    json!({ "data": data })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct ProjectTeamAccessAttributes {
    access: String,
    project_access: ProjectAccessAttributes,
    workspace_access: WorkspaceAccessAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProjectAccessAttributes {
    settings: Option<String>,
    teams: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct WorkspaceAccessAttributes {
    create: Option<bool>,
    delete: Option<bool>,
    #[serde(rename = "move")]
    move_: Option<bool>,
    locking: Option<bool>,
    runs: Option<String>,
    variables: Option<String>,
    state_versions: Option<String>,
}

impl From<Resource<ProjectTeamAccessAttributes>> for ProjectTeamAccess {
    fn from(r: Resource<ProjectTeamAccessAttributes>) -> Self {
        let team_id = r.related_id("team").unwrap_or_default();
        let a = r.attributes;
        let permissions = if a.access == "custom" {
            ProjectPermissions {
                settings: a.project_access.settings,
                teams: a.project_access.teams,
                create_workspace: a.workspace_access.create,
                delete_workspace: a.workspace_access.delete,
                move_workspace: a.workspace_access.move_,
                locking: a.workspace_access.locking,
                runs: a.workspace_access.runs,
                variables: a.workspace_access.variables,
                state_versions: a.workspace_access.state_versions,
            }
        } else {
            ProjectPermissions::default()
        };
        ProjectTeamAccess {
            id: r.id,
            team_id,
            access: a.access,
            permissions,
        }
    }
}

fn project_team_access_body(project_id: Option<&str>, opts: &ProjectTeamAccessOptions) -> Value {
    let mut attributes = json!({ "access": opts.access });
    if opts.access == "custom" {
        let p = &opts.permissions;
        attributes["project-access"] = json!({
            "settings": p.settings,
            "teams": p.teams,
        });
        attributes["workspace-access"] = json!({
            "create": p.create_workspace,
            "delete": p.delete_workspace,
            "move": p.move_workspace,
            "locking": p.locking,
            "runs": p.runs,
            "variables": p.variables,
            "state-versions": p.state_versions,
        });
    }
    let mut data = json!({ "type": "team-projects", "attributes": attributes });
    if let Some(project_id) = project_id {
        data["relationships"] = json!({
            "project": to_one("projects", project_id),
            "team": to_one("teams", &opts.team_id),
        });
    }
    json!({ "data": data })
}

#[async_trait]
impl TeamApi for HttpClient {
    async fn list_teams(&self, org: &str, opts: &ListOptions) -> Result<Page<Team>> {
        let page = self
            .list::<NameAttributes>(&format!("/organizations/{}/teams", org), opts, "q", &[])
            .await?;
        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|r| Team {
                    id: r.id,
                    name: r.attributes.name,
                })
                .collect(),
            next_page: page.next_page,
        })
    }

    async fn list_team_access(
        &self,
        workspace_id: &str,
        opts: &ListOptions,
    ) -> Result<Page<TeamAccess>> {
        let page = self
            .list::<TeamAccessAttributes>(
                "/team-workspaces",
                opts,
                "q",
                &[("filter[workspace][id]", workspace_id)],
            )
            .await?;
        Ok(Page {
            items: page.items.into_iter().map(TeamAccess::from).collect(),
            next_page: page.next_page,
        })
    }

    async fn add_team_access(
        &self,
        workspace_id: &str,
        opts: &TeamAccessOptions,
    ) -> Result<TeamAccess> {
        let r = self
            .post::<TeamAccessAttributes>(
                "/team-workspaces",
                &team_access_body(Some(workspace_id), opts),
            )
            .await?;
        Ok(r.into())
    }

    async fn update_team_access(&self, id: &str, opts: &TeamAccessOptions) -> Result<TeamAccess> {
        let r = self
            .patch::<TeamAccessAttributes>(
                &format!("/team-workspaces/{}", id),
                &team_access_body(None, opts),
            )
            .await?;
        Ok(r.into())
    }

    async fn remove_team_access(&self, id: &str) -> Result<()> {
        self.delete(&format!("/team-workspaces/{}", id), None).await
    }

    async fn list_project_team_access(
        &self,
        project_id: &str,
        opts: &ListOptions,
    ) -> Result<Page<ProjectTeamAccess>> {
        let page = self
            .list::<ProjectTeamAccessAttributes>(
                "/team-projects",
                opts,
                "q",
                &[("filter[project][id]", project_id)],
            )
            .await?;
        Ok(Page {
            items: page.items.into_iter().map(ProjectTeamAccess::from).collect(),
            next_page: page.next_page,
        })
    }

    async fn add_project_team_access(
        &self,
        project_id: &str,
        opts: &ProjectTeamAccessOptions,
    ) -> Result<ProjectTeamAccess> {
        let r = self
            .post::<ProjectTeamAccessAttributes>(
                "/team-projects",
                &project_team_access_body(Some(project_id), opts),
            )
            .await?;
        Ok(r.into())
    }

    async fn update_project_team_access(
        &self,
        id: &str,
        opts: &ProjectTeamAccessOptions,
    ) -> Result<ProjectTeamAccess> {
        let r = self
            .patch::<ProjectTeamAccessAttributes>(
                &format!("/team-projects/{}", id),
                &project_team_access_body(None, opts),
            )
            .await?;
        Ok(r.into())
    }

    async fn remove_project_team_access(&self, id: &str) -> Result<()> {
        self.delete(&format!("/team-projects/{}", id), None).await
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MembershipAttributes {
    email: String,
}

#[async_trait]
impl OrganizationApi for HttpClient {
    async fn list_organization_memberships(
        &self,
        org: &str,
        opts: &ListOptions,
    ) -> Result<Page<OrganizationMembership>> {
        let page = self
            .list::<MembershipAttributes>(
                &format!("/organizations/{}/organization-memberships", org),
                opts,
                "q",
                &[],
            )
            .await?;
        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|r| OrganizationMembership {
                    user_id: r.related_id("user"),
                    id: r.id,
                    email: r.attributes.email,
                })
                .collect(),
            next_page: page.next_page,
        })
    }

    async fn list_ssh_keys(&self, org: &str, opts: &ListOptions) -> Result<Page<SshKey>> {
        let page = self
            .list::<NameAttributes>(&format!("/organizations/{}/ssh-keys", org), opts, "q", &[])
            .await?;
        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|r| SshKey {
                    id: r.id,
                    name: r.attributes.name,
                })
                .collect(),
            next_page: page.next_page,
        })
    }
}
