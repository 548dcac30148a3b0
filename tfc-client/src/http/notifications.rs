//! Notification configurations and inbound run triggers.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::HttpClient;
use super::jsonapi::{Resource, to_many, to_one};
use crate::api::{NotificationApi, RunTriggerApi};
use crate::error::Result;
use crate::models::{NotificationConfiguration, NotificationOptions, RunTrigger};
use crate::paging::{ListOptions, Page};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct NotificationAttributes {
    name: String,
    destination_type: String,
    enabled: bool,
    url: Option<String>,
    triggers: Vec<String>,
    email_addresses: Vec<String>,
}

impl From<Resource<NotificationAttributes>> for NotificationConfiguration {
    fn from(r: Resource<NotificationAttributes>) -> Self {
        let email_user_ids = r.related_ids("users");
        let a = r.attributes;
        NotificationConfiguration {
            id: r.id,
            name: a.name,
            destination_type: a.destination_type,
            enabled: a.enabled,
            url: a.url.filter(|u| !u.is_empty()),
            triggers: a.triggers,
            email_addresses: a.email_addresses,
            email_user_ids,
        }
    }
}

fn notification_body(opts: &NotificationOptions, with_type: bool) -> Value {
    let mut attributes = json!({
        "name": opts.name,
        "enabled": opts.enabled,
        "triggers": opts.triggers,
    });
    if with_type {
        attributes["destination-type"] = json!(opts.destination_type);
    }
    if let Some(url) = &opts.url {
        attributes["url"] = json!(url);
    }
    if let Some(token) = &opts.token {
        attributes["token"] = json!(token);
    }
    if !opts.email_addresses.is_empty() {
        attributes["email-addresses"] = json!(opts.email_addresses);
    }

    let mut data = json!({
        "type": "notification-configurations",
        "attributes": attributes,
    });
    if !opts.email_user_ids.is_empty() {
        data["relationships"] = json!({ "users": to_many("users", &opts.email_user_ids) });
    }
    json!({ "data": data })
}

#[async_trait]
impl NotificationApi for HttpClient {
    async fn list_notifications(
        &self,
        workspace_id: &str,
        opts: &ListOptions,
    ) -> Result<Page<NotificationConfiguration>> {
        let page = self
            .list::<NotificationAttributes>(
                &format!("/workspaces/{}/notification-configurations", workspace_id),
                opts,
                "q",
                &[],
            )
            .await?;
        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(NotificationConfiguration::from)
                .collect(),
            next_page: page.next_page,
        })
    }

    async fn create_notification(
        &self,
        workspace_id: &str,
        opts: &NotificationOptions,
    ) -> Result<NotificationConfiguration> {
        let r = self
            .post::<NotificationAttributes>(
                &format!("/workspaces/{}/notification-configurations", workspace_id),
                &notification_body(opts, true),
            )
            .await?;
        Ok(r.into())
    }

    async fn update_notification(
        &self,
        id: &str,
        opts: &NotificationOptions,
    ) -> Result<NotificationConfiguration> {
        // The destination type is immutable remotely.
        let r = self
            .patch::<NotificationAttributes>(
                &format!("/notification-configurations/{}", id),
                &notification_body(opts, false),
            )
            .await?;
        Ok(r.into())
    }

    async fn delete_notification(&self, id: &str) -> Result<()> {
        self.delete(&format!("/notification-configurations/{}", id), None)
            .await
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct RunTriggerAttributes {
    sourceable_name: Option<String>,
}

impl From<Resource<RunTriggerAttributes>> for RunTrigger {
    fn from(r: Resource<RunTriggerAttributes>) -> Self {
        RunTrigger {
            sourceable_id: r.related_id("sourceable").unwrap_or_default(),
            id: r.id,
            sourceable_name: r.attributes.sourceable_name,
        }
    }
}

#[async_trait]
impl RunTriggerApi for HttpClient {
    async fn list_run_triggers(
        &self,
        workspace_id: &str,
        opts: &ListOptions,
    ) -> Result<Page<RunTrigger>> {
        let page = self
            .list::<RunTriggerAttributes>(
                &format!("/workspaces/{}/run-triggers", workspace_id),
                opts,
                "q",
                &[("filter[run-trigger][type]", "inbound")],
            )
            .await?;
        Ok(Page {
            items: page.items.into_iter().map(RunTrigger::from).collect(),
            next_page: page.next_page,
        })
    }

    async fn create_run_trigger(
        &self,
        workspace_id: &str,
        sourceable_id: &str,
    ) -> Result<RunTrigger> {
        let body = json!({
            "data": {
                "relationships": {
                    "sourceable": to_one("workspaces", sourceable_id),
                }
            }
        });
        let r = self
            .post::<RunTriggerAttributes>(
                &format!("/workspaces/{}/run-triggers", workspace_id),
                &body,
            )
            .await?;
        Ok(r.into())
    }

    async fn delete_run_trigger(&self, id: &str) -> Result<()> {
        self.delete(&format!("/run-triggers/{}", id), None).await
    }
}
