use std::sync::Arc;

use kube::Client;

use crate::config::Config;

/// Shared handler context
#[derive(Clone)]
pub struct Context<C = Client> {
    /// Cluster API collaborator
    pub cluster: C,
    /// Immutable process configuration
    pub config: Arc<Config>,
}

impl<C> From<(C, Arc<Config>)> for Context<C> {
    fn from((cluster, config): (C, Arc<Config>)) -> Self {
        Self { cluster, config }
    }
}

impl<C> From<(C, Config)> for Context<C> {
    fn from((cluster, config): (C, Config)) -> Self {
        Self {
            cluster,
            config: Arc::new(config),
        }
    }
}
