//! Engine error types.

use thiserror::Error;

use crate::crd::DeletionPolicy;
use crate::store::StoreError;
use tfc_client::ClientError;

/// Errors surfaced by a reconciliation pass.
#[derive(Debug, Error)]
pub enum Error {
    /// The object is structurally invalid; fixing it needs an edit.
    #[error("invalid spec: {0}")]
    Validation(String),

    /// A by-name reference matched nothing on the remote side.
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("remote service: {0}")]
    Remote(#[from] ClientError),

    #[error("object store: {0}")]
    Store(#[from] StoreError),

    /// The referenced credential or value source could not be read.
    #[error("credential: {0}")]
    Credential(String),

    /// The deletion policy has no cleanup path for this kind.
    #[error("deletion policy {policy} is not implemented for {kind}")]
    Unimplemented { kind: String, policy: DeletionPolicy },

    /// A run or configuration version ended in a non-successful state.
    #[error("{id} finished with status {status}")]
    RunFailed { id: String, status: String },

    /// The remote answered successfully but without something the pass needs.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("packaging configuration: {0}")]
    Packaging(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying without a spec change can make progress.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Validation(_) | Error::Unimplemented { .. } | Error::RunFailed { .. }
        )
    }

    /// Short machine-readable reason used on events.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Validation(_) => "InvalidSpec",
            Error::NotFound { .. } => "ReferenceNotFound",
            Error::Remote(_) => "RemoteError",
            Error::Store(_) => "StoreError",
            Error::Credential(_) => "CredentialError",
            Error::Unimplemented { .. } => "Unimplemented",
            Error::RunFailed { .. } => "RunFailed",
            Error::UnexpectedResponse(_) => "UnexpectedResponse",
            Error::Packaging(_) => "PackagingFailed",
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
