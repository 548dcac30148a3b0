//! Sub-resource collections.
//!
//! Every sub-resource (tags, variables, team access, ...) implements
//! [`Collection`] and is converged by the same [`converge`] driver on top of
//! [`crate::diff::diff`].

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::diff::{Changes, Comparison, diff};
use crate::error::Result;

#[async_trait]
pub trait Collection: Send + Sync {
    type Key: Ord + Clone + fmt::Debug + Send + Sync;
    type Desired: Send + Sync;
    type Observed: Send + Sync;

    /// Name used on logs and events.
    fn name(&self) -> &'static str;

    /// The remote collection, drained of every page.
    async fn observed(&self) -> Result<BTreeMap<Self::Key, Self::Observed>>;

    /// Payload comparison for keys present on both sides.
    fn compare(&self, _desired: &Self::Desired, _observed: &Self::Observed) -> Comparison {
        Comparison::Equal
    }

    async fn create(&self, key: &Self::Key, desired: &Self::Desired) -> Result<()>;

    async fn update(
        &self,
        key: &Self::Key,
        desired: &Self::Desired,
        observed: &Self::Observed,
    ) -> Result<()> {
        self.replace(key, desired, observed).await
    }

    async fn delete(&self, key: &Self::Key, observed: &Self::Observed) -> Result<()>;

    async fn replace(
        &self,
        key: &Self::Key,
        desired: &Self::Desired,
        observed: &Self::Observed,
    ) -> Result<()> {
        self.delete(key, observed).await?;
        self.create(key, desired).await
    }
}

/// Converge the remote collection onto `desired`.
///
/// Applied in the order deletes, replacements, updates, creates so a key
/// freed in this pass can be reused by a create in the same pass.
pub async fn converge<C: Collection>(
    collection: &C,
    desired: BTreeMap<C::Key, C::Desired>,
) -> Result<Changes> {
    let observed = collection.observed().await?;
    let plan = diff(desired, observed, |d, o| collection.compare(d, o));
    let mut changes = Changes::default();

    if plan.is_empty() {
        debug!(collection = collection.name(), "in sync");
        return Ok(changes);
    }

    for (key, have) in &plan.to_delete {
        debug!(collection = collection.name(), key = ?key, "deleting");
        collection.delete(key, have).await?;
        changes.deleted += 1;
    }
    for (key, (want, have)) in &plan.to_replace {
        debug!(collection = collection.name(), key = ?key, "replacing");
        collection.replace(key, want, have).await?;
        changes.replaced += 1;
    }
    for (key, (want, have)) in &plan.to_update {
        debug!(collection = collection.name(), key = ?key, "updating");
        collection.update(key, want, have).await?;
        changes.updated += 1;
    }
    for (key, want) in &plan.to_create {
        debug!(collection = collection.name(), key = ?key, "creating");
        collection.create(key, want).await?;
        changes.created += 1;
    }

    info!(
        collection = collection.name(),
        created = changes.created,
        updated = changes.updated,
        replaced = changes.replaced,
        deleted = changes.deleted,
        "collection converged"
    );
    Ok(changes)
}
