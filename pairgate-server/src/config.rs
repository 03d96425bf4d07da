//! Command-line and environment configuration for the HTTP server.
//!
//! Relay settings (directory, gateway, fallback) are loaded separately by
//! [`pairgate_core::RelayConfig::from_env`].
//!
//! | Flag | Env Variable | Default |
//! |------|--------------|---------|
//! | `--bind` | `PAIRGATE_BIND` | `0.0.0.0` |
//! | `--port` | `PORT` | 3000 |
//! | `--api-key` | `PAIRGATE_API_KEY` | (required) |
//! | `--service-name` | `PAIRGATE_SERVICE_NAME` | `pairgate` |
//! | `--shutdown-timeout` | `PAIRGATE_SHUTDOWN_TIMEOUT_SECS` | 10 |

use clap::Parser;
use std::time::Duration;

#[derive(Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Bind address
    #[arg(short, long, env = "PAIRGATE_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Bearer key callers must present on /pairing/approve
    #[arg(long, env = "PAIRGATE_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Name reported by /health
    #[arg(long, env = "PAIRGATE_SERVICE_NAME", default_value = "pairgate")]
    pub service_name: String,

    /// Seconds to wait for in-flight requests after a shutdown signal
    #[arg(long, env = "PAIRGATE_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout: u64,
}

impl ServerConfig {
    #[must_use]
    pub fn bind_string(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("api_key", &"[REDACTED]")
            .field("service_name", &self.service_name)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}
