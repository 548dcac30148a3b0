//! Projects.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::HttpClient;
use super::jsonapi::Resource;
use crate::api::ProjectApi;
use crate::error::Result;
use crate::models::{Project, ProjectOptions};
use crate::paging::{ListOptions, Page};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProjectAttributes {
    name: String,
}

impl From<Resource<ProjectAttributes>> for Project {
    fn from(r: Resource<ProjectAttributes>) -> Self {
        Project {
            id: r.id,
            name: r.attributes.name,
        }
    }
}

fn project_body(opts: &ProjectOptions) -> Value {
    json!({
        "data": {
            "type": "projects",
            "attributes": {"name": opts.name},
        }
    })
}

#[async_trait]
impl ProjectApi for HttpClient {
    async fn list_projects(&self, org: &str, opts: &ListOptions) -> Result<Page<Project>> {
        let page = self
            .list::<ProjectAttributes>(&format!("/organizations/{}/projects", org), opts, "q", &[])
            .await?;
        Ok(Page {
            items: page.items.into_iter().map(Project::from).collect(),
            next_page: page.next_page,
        })
    }

    async fn create_project(&self, org: &str, opts: &ProjectOptions) -> Result<Project> {
        let r = self
            .post::<ProjectAttributes>(
                &format!("/organizations/{}/projects", org),
                &project_body(opts),
            )
            .await?;
        Ok(r.into())
    }

    async fn read_project(&self, id: &str) -> Result<Project> {
        let r = self
            .get::<ProjectAttributes>(&format!("/projects/{}", id))
            .await?;
        Ok(r.into())
    }

    async fn update_project(&self, id: &str, opts: &ProjectOptions) -> Result<Project> {
        let r = self
            .patch::<ProjectAttributes>(&format!("/projects/{}", id), &project_body(opts))
            .await?;
        Ok(r.into())
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        self.delete(&format!("/projects/{}", id), None).await
    }
}
