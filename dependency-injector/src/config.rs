use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Process-wide settings, built once at startup and shared read-only
#[derive(Parser, Debug, Clone)]
#[command(name = "dependency-injector", version, about)]
pub struct Config {
    /// Address the webhook server binds to
    #[arg(long, env = "WEBHOOK_BIND_ADDRESS", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind_address: IpAddr,

    /// Port the webhook server listens on
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = 8080)]
    pub port: u16,

    /// PEM certificate served by the webhook, plain HTTP when unset
    #[arg(long, env = "WEBHOOK_TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key matching `--tls-cert`
    #[arg(long, env = "WEBHOOK_TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Seconds allowed to establish a connection to the API server
    #[arg(long, env = "CONNECT_TIMEOUT", default_value_t = 10)]
    pub connect_timeout: u64,

    /// Seconds allowed for a single API server request
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 10)]
    pub request_timeout: u64,

    /// Seconds to wait before retrying an unreachable API server at startup
    #[arg(long, env = "ERRORS_BACKOFF", default_value_t = 30)]
    pub errors_backoff: u64,

    /// Init-container template, the built-in template is used when unset
    #[arg(long, env = "INIT_TEMPLATE")]
    pub init_template: Option<PathBuf>,

    /// HTTP status the init container waits for on each dependency
    #[arg(long, env = "HTTP_CODE", default_value = "200")]
    pub http_code: String,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn errors_backoff(&self) -> Duration {
        Duration::from_secs(self.errors_backoff)
    }

    /// Certificate and key paths, present only when both are configured
    pub fn tls(&self) -> Option<(&PathBuf, &PathBuf)> {
        self.tls_cert.as_ref().zip(self.tls_key.as_ref())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_from(["dependency-injector"])
    }
}
