//! Admission webhooks gating pod startup on declared dependencies
//!
//! Pods labeled `sidecar.dependency_manager=true` get an init container that
//! waits for every service listed by the `Dependency` resource selecting the
//! pod's `app` label. `Dependency` resources themselves are validated before
//! they are persisted.

pub mod admission;
pub mod cluster;
pub mod config;
pub mod context;
pub mod crd;
pub mod error;
pub mod matcher;
pub mod mutation;
pub mod owner;
pub mod patch;
pub mod pod;
pub mod server;
pub mod template;
pub mod validation;

pub use admission::{MutatingAdmissionHandler, ValidatingAdmissionHandler};
pub use cluster::ClusterApi;
pub use config::Config;
pub use context::Context;
pub use crd::{Dependency, DependencySpec};
pub use error::{Error, Result};
pub use mutation::DependencyInjector;
pub use server::WebhookServer;
pub use validation::DependencyValidator;
