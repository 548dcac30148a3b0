//! Notification configurations, keyed by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tfc_client::{NotificationConfiguration, NotificationOptions, TfcApi, collect_all};

use crate::context::Session;
use crate::crd::Workspace;
use crate::diff::{Changes, Comparison};
use crate::error::Result;
use crate::reconciler::{Collection, converge};
use crate::resolve;

struct Notifications {
    api: Arc<dyn TfcApi>,
    workspace_id: String,
}

fn sorted(v: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = v.iter().map(String::as_str).collect();
    out.sort_unstable();
    out
}

/// The destination type is fixed at creation. A configured token is
/// write-only, so such entries are always re-applied.
fn compare(desired: &NotificationOptions, observed: &NotificationConfiguration) -> Comparison {
    if desired.destination_type != observed.destination_type {
        return Comparison::Replace;
    }
    if desired.token.is_some() {
        return Comparison::Update;
    }
    let same = desired.enabled == observed.enabled
        && desired.url.as_deref().unwrap_or_default() == observed.url.as_deref().unwrap_or_default()
        && sorted(&desired.triggers) == sorted(&observed.triggers)
        && sorted(&desired.email_addresses) == sorted(&observed.email_addresses)
        && sorted(&desired.email_user_ids) == sorted(&observed.email_user_ids);
    if same {
        Comparison::Equal
    } else {
        Comparison::Update
    }
}

#[async_trait]
impl Collection for Notifications {
    type Key = String;
    type Desired = NotificationOptions;
    type Observed = NotificationConfiguration;

    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn observed(&self) -> Result<BTreeMap<String, NotificationConfiguration>> {
        let items = collect_all(None, |opts| async move {
            self.api.list_notifications(&self.workspace_id, &opts).await
        })
        .await?;
        Ok(items.into_iter().map(|n| (n.name.clone(), n)).collect())
    }

    fn compare(&self, desired: &NotificationOptions, observed: &NotificationConfiguration) -> Comparison {
        compare(desired, observed)
    }

    async fn create(&self, _name: &String, desired: &NotificationOptions) -> Result<()> {
        self.api
            .create_notification(&self.workspace_id, desired)
            .await?;
        Ok(())
    }

    async fn update(
        &self,
        _name: &String,
        desired: &NotificationOptions,
        observed: &NotificationConfiguration,
    ) -> Result<()> {
        self.api.update_notification(&observed.id, desired).await?;
        Ok(())
    }

    async fn delete(&self, _name: &String, observed: &NotificationConfiguration) -> Result<()> {
        self.api.delete_notification(&observed.id).await?;
        Ok(())
    }
}

pub(super) async fn reconcile(s: &Session<Workspace>, workspace_id: &str) -> Result<Changes> {
    let mut desired = BTreeMap::new();
    for n in &s.object.spec.notifications {
        let mut email_user_ids = Vec::with_capacity(n.email_users.len());
        for email in &n.email_users {
            email_user_ids.push(resolve::user_by_email(s.api.as_ref(), s.organization(), email).await?);
        }
        desired.insert(
            n.name.clone(),
            NotificationOptions {
                name: n.name.clone(),
                destination_type: n.kind.as_str().to_string(),
                enabled: n.enabled,
                url: n.url.clone(),
                token: n.token.clone().filter(|t| !t.is_empty()),
                triggers: n.triggers.clone(),
                email_addresses: n.email_addresses.clone(),
                email_user_ids,
            },
        );
    }
    let notifications = Notifications {
        api: s.api.clone(),
        workspace_id: workspace_id.to_string(),
    };
    let changes = converge(&notifications, desired).await?;
    s.events.collection_changed("notifications", &changes).await;
    Ok(changes)
}
