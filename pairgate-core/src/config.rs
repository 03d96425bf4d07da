//! Relay configuration.
//!
//! Built once at startup and shared read-only by every orchestration run.
//! Nothing here is mutated after construction.
//!
//! # Environment Variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PAIRGATE_DIRECTORY_URL` | `https://backboard.railway.app/graphql/v2` |
//! | `PAIRGATE_DIRECTORY_TOKEN` | (required) |
//! | `PAIRGATE_DIRECTORY_TIMEOUT_SECS` | 10 |
//! | `PAIRGATE_WORKER_HOST_TEMPLATE` | `{name}.railway.internal` |
//! | `PAIRGATE_GATEWAY_PORT` | 18789 |
//! | `PAIRGATE_GATEWAY_TOKEN` | (unset) |
//! | `PAIRGATE_GATEWAY_TIMEOUT_SECS` | 15 |
//! | `PAIRGATE_GATEWAY_ATTEMPTS` | 2 |
//! | `PAIRGATE_GATEWAY_BACKOFF_SECS` | 3 |
//! | `PAIRGATE_FALLBACK_PORT` | 8080 |
//! | `PAIRGATE_FALLBACK_PATH` | `/pairing/approve` |
//! | `PAIRGATE_FALLBACK_TIMEOUT_SECS` | 10 |
//! | `PAIRGATE_CONTROL_TOOL` | `openclaw` |
//!
//! Timeouts and the backoff are capped at [`MAX_TIMEOUT`], attempts at
//! [`MAX_GATEWAY_ATTEMPTS`].

use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Placeholder substituted with the resolved worker name.
pub const HOST_PLACEHOLDER: &str = "{name}";

/// Ceiling for every timeout and for the gateway backoff.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(300);

/// Ceiling for gateway attempts per run.
pub const MAX_GATEWAY_ATTEMPTS: u32 = 10;

/// Configuration loading and validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variable not set.
    #[error("environment variable '{var}' not set")]
    MissingEnvVar { var: String },

    /// A value is present but violates an invariant.
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// An outbound client could not be constructed from the configuration.
    #[error("failed to build {client} client: {reason}")]
    Client { client: &'static str, reason: String },
}

/// Directory service settings.
#[derive(Clone)]
pub struct DirectoryConfig {
    /// GraphQL endpoint of the directory
    pub url: String,
    /// Bearer token (NEVER log this value)
    token: String,
    /// Whole-request timeout
    pub timeout: Duration,
}

impl DirectoryConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Gateway handshake settings.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Port of the worker's control endpoint
    pub port: u16,
    /// Session watchdog
    pub timeout: Duration,
    /// Token sent when the caller supplies none (NEVER log this value)
    default_token: Option<String>,
}

impl GatewayConfig {
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            timeout: Duration::from_secs(15),
            default_token: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_default_token(mut self, token: Option<String>) -> Self {
        self.default_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Returns the caller token if present, else the configured default.
    pub(crate) fn effective_token<'a>(&'a self, caller: Option<&'a str>) -> Option<&'a str> {
        caller
            .filter(|t| !t.is_empty())
            .or(self.default_token.as_deref())
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field(
                "default_token",
                &self.default_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Secondary HTTP endpoint settings.
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    pub port: u16,
    pub path: String,
    /// Whole-call timeout
    pub timeout: Duration,
}

impl FallbackConfig {
    #[must_use]
    pub fn new(port: u16, path: impl Into<String>) -> Self {
        Self {
            port,
            path: path.into(),
            timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Retry and remediation settings for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of gateway attempts before falling back
    pub gateway_attempts: u32,
    /// Fixed delay between gateway attempts
    pub backoff: Duration,
    /// CLI name used in the manual remediation command
    pub control_tool: String,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            gateway_attempts: 2,
            backoff: Duration::from_secs(3),
            control_tool: "openclaw".to_string(),
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub directory: DirectoryConfig,
    /// Host pattern; `{name}` is replaced by the resolved worker name
    pub worker_host_template: String,
    pub gateway: GatewayConfig,
    pub fallback: FallbackConfig,
    pub retry: RetryPolicy,
}

impl RelayConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `PAIRGATE_DIRECTORY_TOKEN` is
    /// unset, or `ConfigError::Invalid` if validation fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("PAIRGATE_DIRECTORY_TOKEN")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar {
                var: "PAIRGATE_DIRECTORY_TOKEN".to_string(),
            })?;

        let directory = DirectoryConfig::new(
            lookup("PAIRGATE_DIRECTORY_URL")
                .unwrap_or_else(|| "https://backboard.railway.app/graphql/v2".to_string()),
            token,
        )
        .with_timeout(secs(&lookup, "PAIRGATE_DIRECTORY_TIMEOUT_SECS", 10));

        let gateway = GatewayConfig::new(parse_or_warn(&lookup, "PAIRGATE_GATEWAY_PORT", 18789))
            .with_timeout(secs(&lookup, "PAIRGATE_GATEWAY_TIMEOUT_SECS", 15))
            .with_default_token(lookup("PAIRGATE_GATEWAY_TOKEN"));

        let fallback = FallbackConfig::new(
            parse_or_warn(&lookup, "PAIRGATE_FALLBACK_PORT", 8080),
            lookup("PAIRGATE_FALLBACK_PATH").unwrap_or_else(|| "/pairing/approve".to_string()),
        )
        .with_timeout(secs(&lookup, "PAIRGATE_FALLBACK_TIMEOUT_SECS", 10));

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            gateway_attempts: parse_or_warn(
                &lookup,
                "PAIRGATE_GATEWAY_ATTEMPTS",
                defaults.gateway_attempts,
            ),
            backoff: secs(&lookup, "PAIRGATE_GATEWAY_BACKOFF_SECS", 3),
            control_tool: lookup("PAIRGATE_CONTROL_TOOL").unwrap_or(defaults.control_tool),
        };

        let config = Self {
            directory,
            worker_host_template: lookup("PAIRGATE_WORKER_HOST_TEMPLATE")
                .unwrap_or_else(|| format!("{HOST_PLACEHOLDER}.railway.internal")),
            gateway,
            fallback,
            retry,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate invariants.
    ///
    /// # Invariants
    /// 1. Between 1 and `MAX_GATEWAY_ATTEMPTS` gateway attempts
    /// 2. Every timeout is non-zero and at most `MAX_TIMEOUT`; so is the backoff
    /// 3. Host template and control tool are non-empty
    /// 4. Fallback path is absolute
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.gateway_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "gateway_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.gateway_attempts > MAX_GATEWAY_ATTEMPTS {
            return Err(ConfigError::Invalid {
                field: "gateway_attempts",
                reason: format!("must be at most {MAX_GATEWAY_ATTEMPTS}"),
            });
        }

        for (field, timeout) in [
            ("directory.timeout", self.directory.timeout),
            ("gateway.timeout", self.gateway.timeout),
            ("fallback.timeout", self.fallback.timeout),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
            if timeout > MAX_TIMEOUT {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be at most {}s", MAX_TIMEOUT.as_secs()),
                });
            }
        }

        if self.retry.backoff > MAX_TIMEOUT {
            return Err(ConfigError::Invalid {
                field: "retry.backoff",
                reason: format!("must be at most {}s", MAX_TIMEOUT.as_secs()),
            });
        }

        if self.worker_host_template.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "worker_host_template",
                reason: "must not be empty".to_string(),
            });
        }

        if self.retry.control_tool.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "control_tool",
                reason: "must not be empty".to_string(),
            });
        }

        if !self.fallback.path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "fallback.path",
                reason: format!("'{}' must start with '/'", self.fallback.path),
            });
        }

        if let Err(e) = reqwest::Url::parse(&self.directory.url) {
            return Err(ConfigError::Invalid {
                field: "directory.url",
                reason: format!("'{}': {e}", self.directory.url),
            });
        }

        Ok(())
    }
}

fn secs<F>(lookup: &F, name: &str, default: u64) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    Duration::from_secs(parse_or_warn(lookup, name, default))
}

/// Parse a variable, warning and falling back to `default` on bad input.
fn parse_or_warn<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display,
{
    match lookup(name) {
        Some(val) => match val.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    env_var = name,
                    value = %val,
                    default = %default,
                    "Invalid value for environment variable, using default"
                );
                default
            }
        },
        None => default,
    }
}
