use std::path::PathBuf;

use thiserror::Error;

use crate::template::TemplateError;
use crate::validation::ValidationError;

/// Status code carried by every admission rejection this crate produces
pub const REJECTION_CODE: u16 = 499;

/// Errors that can occur while handling an admission event
#[derive(Error, Debug)]
pub enum Error {
    /// Namespace of the pod could not be resolved through its owner
    #[error("cannot find namespace for the pod: {0}")]
    NotFound(String),

    /// Init-container template could not be loaded or rendered
    #[error("init container template error: {0}")]
    Template(#[from] TemplateError),

    /// Dependency resource has an invalid shape
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// `Dependency` selecting the pod could not be decoded
    #[error("invalid Dependency {name}: {reason}")]
    InvalidDependency { name: String, reason: String },

    /// Mutation patch could not be composed
    #[error("patch error: {0}")]
    Patch(String),

    /// Error from the Kubernetes client
    #[error("Kube Error: {0}")]
    KubeError(#[from] kube::Error),

    /// Kubernetes client configuration could not be inferred
    #[error("Kube Config Error: {0}")]
    KubeConfig(#[from] kube::config::InferConfigError),

    /// TLS certificate or key could not be read
    #[error("failed to read {}: {source}", path.display())]
    Tls {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Webhook server failed to start
    #[error("Server Error: {0}")]
    Server(#[from] warp::Error),
}

impl Error {
    /// Status code reported to the API server when this error denies a request
    pub fn code(&self) -> u16 {
        match self {
            Self::NotFound(_) | Self::Validation(_) => REJECTION_CODE,
            _ => 500,
        }
    }

    /// Whether the mutation path swallows this error and admits the pod unmodified
    pub fn is_fail_open(&self) -> bool {
        matches!(
            self,
            Self::Template(_) | Self::InvalidDependency { .. } | Self::Patch(_)
        )
    }
}

/// Result type for dependency-injector operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
