//! tfc-client: typed client for the HCP Terraform / Terraform Enterprise API.
//!
//! The crate is split into:
//! - [`api`]: the async traits the operator consumes, one per domain, and
//!   the composite [`TfcApi`]
//! - [`models`]: decoded remote objects and request options
//! - [`paging`]: list options, pages and the drain helper
//! - [`http`]: the `reqwest` implementation speaking JSON:API
//!
//! # Example
//! ```ignore
//! use tfc_client::{ClientFactory, HttpClientFactory};
//!
//! let factory = HttpClientFactory::new("https://app.terraform.io", false);
//! let api = factory.connect(&token)?;
//! let ws = api.read_workspace("ws-123").await?;
//! ```

pub mod api;
pub mod error;
pub mod http;
pub mod models;
pub mod paging;

pub use api::{
    AgentPoolApi, ClientFactory, NotificationApi, OrganizationApi, ProjectApi, RemoteStateApi,
    RunApi, RunTriggerApi, TagApi, TeamApi, TfcApi, VariableApi, WorkspaceApi,
};
pub use error::{ClientError, Result};
pub use http::{HttpClient, HttpClientFactory};
pub use models::*;
pub use paging::{ListOptions, Page, collect_all};
