use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use warp::{Filter, Rejection, Reply};

use crate::{Error, Result};
use crate::admission::{
    MutatingAdmissionHandler, ValidatingAdmissionHandler, create_mutating_route,
    create_validating_route,
};
use crate::config::Config;

/// Largest AdmissionReview body accepted, matching the API server's request limit
const MAX_REVIEW_BYTES: u64 = 3 * 1024 * 1024;

/// HTTP(S) server dispatching admission reviews to registered handlers
///
/// Serves `POST /mutate`, `POST /validate` and `GET /healthz`.
pub struct WebhookServer {
    config: Arc<Config>,
    mutators: Vec<Box<dyn MutatingAdmissionHandler>>,
    validators: Vec<Box<dyn ValidatingAdmissionHandler>>,
}

impl WebhookServer {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            mutators: Default::default(),
            validators: Default::default(),
        }
    }

    /// Registers a mutating handler, handlers run in registration order
    #[must_use]
    pub fn mutator(mut self, handler: impl MutatingAdmissionHandler + 'static) -> Self {
        self.mutators.push(Box::new(handler));
        self
    }

    /// Registers a validating handler, the first denial wins
    #[must_use]
    pub fn validator(mut self, handler: impl ValidatingAdmissionHandler + 'static) -> Self {
        self.validators.push(Box::new(handler));
        self
    }

    pub fn routes(self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let mutate = warp::path("mutate")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::content_length_limit(MAX_REVIEW_BYTES))
            .and(warp::body::json())
            .and_then(create_mutating_route(self.mutators));

        let validate = warp::path("validate")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::content_length_limit(MAX_REVIEW_BYTES))
            .and(warp::body::json())
            .and_then(create_validating_route(self.validators));

        let health = warp::path("healthz")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| "ok");

        mutate
            .or(validate)
            .or(health)
            .with(warp::trace::request())
    }

    /// Serves until `shutdown` resolves
    ///
    /// Uses TLS when a certificate and key are configured.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr = self.config.listen_addr();
        let tls = self
            .config
            .tls()
            .map(|(cert, key)| (cert.clone(), key.clone()));
        let routes = self.routes();

        match tls {
            Some((cert_path, key_path)) => {
                let cert = read_pem(cert_path).await?;
                let key = read_pem(key_path).await?;
                let (addr, server) = warp::serve(routes)
                    .tls()
                    .cert(cert)
                    .key(key)
                    .try_bind_with_graceful_shutdown(addr, shutdown)?;
                info!(%addr, "webhook server listening (https)");
                server.await;
            }
            None => {
                let (addr, server) =
                    warp::serve(routes).try_bind_with_graceful_shutdown(addr, shutdown)?;
                info!(%addr, "webhook server listening (http)");
                server.await;
            }
        }

        info!("webhook server stopped");
        Ok(())
    }
}

async fn read_pem(path: PathBuf) -> Result<Vec<u8>> {
    tokio::fs::read(&path)
        .await
        .map_err(|source| Error::Tls { path, source })
}
