//! Drift detection.

use std::fmt;

use crate::crd::ManagedResource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    None,
    /// `.spec` changed since the last converged pass.
    Generation {
        generation: Option<i64>,
        observed: Option<i64>,
    },
    /// The remote object was modified out of band.
    Remote {
        recorded: Option<i64>,
        remote: i64,
    },
    /// Remote attributes no longer match, with no generation change.
    Edited,
}

impl Drift {
    pub fn needs_update(&self) -> bool {
        !matches!(self, Drift::None)
    }
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Drift::None => f.write_str("in sync"),
            Drift::Generation {
                generation,
                observed,
            } => write!(
                f,
                "generation {} != observed {}",
                generation.unwrap_or_default(),
                observed.map_or_else(|| "none".to_string(), |o| o.to_string())
            ),
            Drift::Remote { recorded, remote } => write!(
                f,
                "remote modified at {} (recorded {})",
                remote,
                recorded.map_or_else(|| "none".to_string(), |r| r.to_string())
            ),
            Drift::Edited => f.write_str("remote attributes edited out of band"),
        }
    }
}

/// Compare the object against its last converged state.
///
/// `remote_update_at` is the remote object's last-modified marker, `None`
/// when the kind has no such marker.
pub fn detect<K: ManagedResource>(obj: &K, remote_update_at: Option<i64>) -> Drift {
    let generation = obj.meta().generation;
    let observed = obj.observed_generation();
    if generation != observed {
        return Drift::Generation {
            generation,
            observed,
        };
    }
    match remote_update_at {
        Some(remote) if obj.recorded_update_at() != Some(remote) => Drift::Remote {
            recorded: obj.recorded_update_at(),
            remote,
        },
        _ => Drift::None,
    }
}

/// Drift for kinds without a last-modified marker, where the remote
/// attributes are compared directly. `differs` is that comparison.
pub fn detect_by_attributes<K: ManagedResource>(obj: &K, differs: bool) -> Drift {
    if !differs {
        return Drift::None;
    }
    match detect(obj, None) {
        Drift::None => Drift::Edited,
        drift => drift,
    }
}

pub fn needs_update<K: ManagedResource>(obj: &K, remote_update_at: Option<i64>) -> bool {
    detect(obj, remote_update_at).needs_update()
}
