//! tfc-operator: declarative reconciliation of HCP Terraform resources.
//!
//! Workspace, Project, Module and AgentPool custom resources are converged
//! onto their remote counterparts by one [`reconciler::Orchestrator`] per
//! kind. The engine is split into:
//! - [`diff`], [`resolve`], [`lifecycle`], [`drift`] and [`status`]: the pure
//!   and near-pure building blocks every orchestrator composes
//! - [`reconciler`]: the orchestrator and the per-kind reconcilers
//! - [`store`] and [`events`]: the cluster-side collaborators
//! - [`controller`]: kube-runtime wiring

pub mod config;
pub mod context;
pub mod controller;
pub mod crd;
pub mod diff;
pub mod drift;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod packaging;
pub mod reconciler;
pub mod resolve;
pub mod status;
pub mod store;

pub use config::{Args, OperatorConfig};
pub use error::{Error, Result};
