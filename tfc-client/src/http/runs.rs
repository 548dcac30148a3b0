//! Runs, configuration versions and current state outputs.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::HttpClient;
use super::jsonapi::{Resource, to_one};
use crate::api::RunApi;
use crate::error::Result;
use crate::models::{
    ConfigurationVersion, ConfigurationVersionOptions, Run, RunOptions, StateOutput,
};
use crate::paging::{ListOptions, Page};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct RunAttributes {
    status: String,
    is_destroy: bool,
}

impl From<Resource<RunAttributes>> for Run {
    fn from(r: Resource<RunAttributes>) -> Self {
        Run {
            configuration_version_id: r.related_id("configuration-version"),
            id: r.id,
            status: r.attributes.status,
            is_destroy: r.attributes.is_destroy,
        }
    }
}

fn run_body(opts: &RunOptions) -> Value {
    let mut attributes = json!({
        "is-destroy": opts.is_destroy,
        "message": opts.message,
    });
    if let Some(auto_apply) = opts.auto_apply {
        attributes["auto-apply"] = json!(auto_apply);
    }

    let mut relationships = Map::new();
    relationships.insert(
        "workspace".to_string(),
        to_one("workspaces", &opts.workspace_id),
    );
    if let Some(cv) = &opts.configuration_version_id {
        relationships.insert(
            "configuration-version".to_string(),
            to_one("configuration-versions", cv),
        );
    }

    json!({
        "data": {
            "type": "runs",
            "attributes": attributes,
            "relationships": relationships,
        }
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct ConfigurationVersionAttributes {
    status: String,
    upload_url: Option<String>,
}

impl From<Resource<ConfigurationVersionAttributes>> for ConfigurationVersion {
    fn from(r: Resource<ConfigurationVersionAttributes>) -> Self {
        ConfigurationVersion {
            id: r.id,
            status: r.attributes.status,
            upload_url: r.attributes.upload_url,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StateOutputAttributes {
    name: String,
    sensitive: bool,
    value: Value,
}

impl From<Resource<StateOutputAttributes>> for StateOutput {
    fn from(r: Resource<StateOutputAttributes>) -> Self {
        StateOutput {
            id: r.id,
            name: r.attributes.name,
            value: r.attributes.value,
            sensitive: r.attributes.sensitive,
        }
    }
}

#[async_trait]
impl RunApi for HttpClient {
    async fn create_run(&self, opts: &RunOptions) -> Result<Run> {
        let r = self.post::<RunAttributes>("/runs", &run_body(opts)).await?;
        Ok(r.into())
    }

    async fn read_run(&self, id: &str) -> Result<Run> {
        let r = self.get::<RunAttributes>(&format!("/runs/{}", id)).await?;
        Ok(r.into())
    }

    async fn create_configuration_version(
        &self,
        workspace_id: &str,
        opts: &ConfigurationVersionOptions,
    ) -> Result<ConfigurationVersion> {
        let body = json!({
            "data": {
                "type": "configuration-versions",
                "attributes": {
                    "auto-queue-runs": opts.auto_queue_runs,
                    "speculative": opts.speculative,
                },
            }
        });
        let r = self
            .post::<ConfigurationVersionAttributes>(
                &format!("/workspaces/{}/configuration-versions", workspace_id),
                &body,
            )
            .await?;
        Ok(r.into())
    }

    async fn read_configuration_version(&self, id: &str) -> Result<ConfigurationVersion> {
        let r = self
            .get::<ConfigurationVersionAttributes>(&format!("/configuration-versions/{}", id))
            .await?;
        Ok(r.into())
    }

    async fn upload_configuration(&self, upload_url: &str, archive: Vec<u8>) -> Result<()> {
        self.put_archive(upload_url, archive).await
    }

    async fn list_current_state_outputs(
        &self,
        workspace_id: &str,
        opts: &ListOptions,
    ) -> Result<Page<StateOutput>> {
        let page = self
            .list::<StateOutputAttributes>(
                &format!("/workspaces/{}/current-state-version-outputs", workspace_id),
                opts,
                "q",
                &[],
            )
            .await?;

        let mut items = Vec::with_capacity(page.items.len());
        for r in page.items {
            let mut output = StateOutput::from(r);
            // Sensitive values are redacted in the listing.
            if output.sensitive && output.value.is_null() {
                debug!(output = %output.name, "reading sensitive state output");
                let full = self
                    .get::<StateOutputAttributes>(&format!("/state-version-outputs/{}", output.id))
                    .await?;
                output.value = full.attributes.value;
            }
            items.push(output);
        }
        Ok(Page {
            items,
            next_page: page.next_page,
        })
    }
}
