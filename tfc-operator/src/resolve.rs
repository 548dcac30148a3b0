//! Identity resolution: `{id | name}` references to remote IDs.
//!
//! An ID is returned verbatim without a remote call. A name is searched page
//! by page and the first exact match wins.

use std::future::Future;

use tfc_client::paging::MAX_PAGES;
use tfc_client::{ClientError, ListOptions, Page, TfcApi};
use tracing::debug;

use crate::crd::NamedRef;
use crate::error::{Error, Result};

/// Options for the page after `page`, `None` once the listing is exhausted.
/// Reaching `limit` with a page still pending is an error, not a miss.
fn advance<T>(opts: &ListOptions, page: &Page<T>, walked: u32, limit: u32) -> Result<Option<ListOptions>> {
    match page.next_page {
        Some(next) if next > opts.page_number => {
            if walked >= limit {
                return Err(ClientError::Incomplete { pages: walked }.into());
            }
            Ok(Some(opts.clone().page(next)))
        }
        _ => Ok(None),
    }
}

/// Resolve `reference` against a paged listing.
pub async fn resolve<T, F, Fut>(
    kind: &'static str,
    reference: &NamedRef,
    name_of: impl Fn(&T) -> &str,
    id_of: impl Fn(&T) -> &str,
    mut fetch: F,
) -> Result<String>
where
    F: FnMut(ListOptions) -> Fut,
    Fut: Future<Output = tfc_client::Result<Page<T>>>,
{
    if let Some(id) = &reference.id {
        return Ok(id.clone());
    }
    let Some(name) = reference.name.as_deref() else {
        return Err(Error::Validation(format!("{} reference has neither id nor name", kind)));
    };

    let mut opts = ListOptions::with_search(name);
    for walked in 1.. {
        let page = fetch(opts.clone()).await?;
        if let Some(found) = page.items.iter().find(|item| name_of(item) == name) {
            let id = id_of(found).to_string();
            debug!(kind, name, id = %id, "resolved reference");
            return Ok(id);
        }
        match advance(&opts, &page, walked, MAX_PAGES)? {
            Some(next) => opts = next,
            None => break,
        }
    }

    Err(Error::NotFound {
        kind,
        name: name.to_string(),
    })
}

pub async fn workspace(api: &dyn TfcApi, org: &str, reference: &NamedRef) -> Result<String> {
    resolve(
        "workspace",
        reference,
        |w: &tfc_client::Workspace| w.name.as_str(),
        |w| w.id.as_str(),
        |opts| async move { api.list_workspaces(org, &opts).await },
    )
    .await
}

pub async fn project(api: &dyn TfcApi, org: &str, reference: &NamedRef) -> Result<String> {
    resolve(
        "project",
        reference,
        |p: &tfc_client::Project| p.name.as_str(),
        |p| p.id.as_str(),
        |opts| async move { api.list_projects(org, &opts).await },
    )
    .await
}

pub async fn agent_pool(api: &dyn TfcApi, org: &str, reference: &NamedRef) -> Result<String> {
    resolve(
        "agent pool",
        reference,
        |p: &tfc_client::AgentPool| p.name.as_str(),
        |p| p.id.as_str(),
        |opts| async move { api.list_agent_pools(org, &opts).await },
    )
    .await
}

pub async fn team(api: &dyn TfcApi, org: &str, reference: &NamedRef) -> Result<String> {
    resolve(
        "team",
        reference,
        |t: &tfc_client::Team| t.name.as_str(),
        |t| t.id.as_str(),
        |opts| async move { api.list_teams(org, &opts).await },
    )
    .await
}

pub async fn ssh_key(api: &dyn TfcApi, org: &str, reference: &NamedRef) -> Result<String> {
    resolve(
        "ssh key",
        reference,
        |k: &tfc_client::SshKey| k.name.as_str(),
        |k| k.id.as_str(),
        |opts| async move { api.list_ssh_keys(org, &opts).await },
    )
    .await
}

/// User ID of the organization member with this e-mail address.
pub async fn user_by_email(api: &dyn TfcApi, org: &str, email: &str) -> Result<String> {
    let mut opts = ListOptions::with_search(email);
    for walked in 1.. {
        let page = api.list_organization_memberships(org, &opts).await?;
        let found = page
            .items
            .iter()
            .find(|m| m.email.eq_ignore_ascii_case(email))
            .and_then(|m| m.user_id.clone());
        if let Some(user_id) = found {
            return Ok(user_id);
        }
        match advance(&opts, &page, walked, MAX_PAGES)? {
            Some(next) => opts = next,
            None => break,
        }
    }
    Err(Error::NotFound {
        kind: "organization member",
        name: email.to_string(),
    })
}
