//! Status projection.
//!
//! Two writes exist: a checkpoint, which persists progress (a freshly created
//! remote ID, a queued run) without claiming convergence, and the final
//! projection of a pass, which also advances `observedGeneration` when the
//! pass converged.

use kube::ResourceExt;
use tracing::debug;

use crate::crd::ManagedResource;
use crate::error::Result;
use crate::store::ObjectStore;

/// Persist the current status without touching `observedGeneration`.
pub async fn checkpoint<K: ManagedResource>(store: &dyn ObjectStore<K>, obj: &K) -> Result<()> {
    debug!(name = %obj.name_any(), "checkpointing status");
    store.update_status(obj).await?;
    Ok(())
}

/// Final status write of a pass.
pub async fn project<K: ManagedResource>(
    store: &dyn ObjectStore<K>,
    obj: &mut K,
    converged: bool,
) -> Result<()> {
    if converged {
        let generation = obj.meta().generation;
        obj.set_observed_generation(generation);
    }
    store.update_status(obj).await?;
    Ok(())
}
