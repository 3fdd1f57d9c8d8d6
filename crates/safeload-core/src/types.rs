//! Wire types, verification outcomes and configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Response from the policy endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDocument {
    /// Hostnames whose downloads pass without a signature.
    pub permitted_domains: Vec<String>,

    /// File extensions (without dot) that pass without a signature.
    pub permitted_formats: Vec<String>,

    /// PEM of the CA root that signer certificates must chain to.
    pub ca_root_certificate: String,
}

/// Request body for the revocation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationRequest {
    /// Signer certificate PEM.
    pub certificate: String,
}

/// Verdict returned by the revocation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationVerdict {
    pub valid: bool,

    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Result of one verification step. `reasons` is empty iff `valid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub valid: bool,
    pub reasons: Vec<String>,
}

impl VerificationOutcome {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reasons: Vec::new(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reasons: vec![reason.into()],
        }
    }

    /// Build from a list of failures; valid iff the list is empty.
    pub fn from_reasons(reasons: Vec<String>) -> Self {
        Self {
            valid: reasons.is_empty(),
            reasons,
        }
    }
}

/// What to do when policy is still not ready after the readiness timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadinessFallback {
    /// Fail closed: cancel the download.
    #[default]
    Cancel,

    /// Fail open: resume the download unverified.
    Resume,
}

/// What to do when the revocation oracle cannot be consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevocationFallback {
    /// Fail closed: reject the download.
    #[default]
    Reject,

    /// Accept the locally verified download.
    Accept,
}

/// Trust service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the trust service.
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Bearer token.
    #[serde(default)]
    pub token: Option<String>,

    /// Path of the policy endpoint, relative to `url`.
    #[serde(default = "default_policy_path")]
    pub policy_path: String,

    /// Path of the revocation endpoint, relative to `url`.
    #[serde(default = "default_revocation_path")]
    pub revocation_path: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_server_url() -> String {
    "http://127.0.0.1:80".to_string()
}

fn default_policy_path() -> String {
    "download_settings.php".to_string()
}

fn default_revocation_path() -> String {
    "validate_signature.php".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            token: None,
            policy_path: default_policy_path(),
            revocation_path: default_revocation_path(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl ServiceConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `SAFELOAD_SERVER_URL` | Trust service base URL |
    /// | `SAFELOAD_TOKEN` | Bearer token |
    /// | `SAFELOAD_TIMEOUT` | Request timeout in seconds |
    /// | `SAFELOAD_MAX_RETRIES` | Retries for transient failures |
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("SAFELOAD_SERVER_URL").unwrap_or_else(|_| default_server_url()),
            token: std::env::var("SAFELOAD_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            timeout_secs: env_parse("SAFELOAD_TIMEOUT").unwrap_or_else(default_timeout),
            max_retries: env_parse("SAFELOAD_MAX_RETRIES").unwrap_or_else(default_max_retries),
            ..Self::default()
        }
    }

    /// Set the base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the retry budget for transient failures.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Download gate configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Interval between readiness polls.
    pub ready_poll_interval: Duration,

    /// Upper bound on the readiness wait.
    pub ready_timeout: Duration,

    /// Fixed delay between policy load attempts.
    pub policy_retry_delay: Duration,

    /// Action on readiness timeout.
    pub readiness_fallback: ReadinessFallback,

    /// Action when the revocation oracle is unavailable.
    pub revocation_fallback: RevocationFallback,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            ready_poll_interval: Duration::from_millis(500),
            ready_timeout: Duration::from_secs(10),
            policy_retry_delay: Duration::from_millis(1000),
            readiness_fallback: ReadinessFallback::Cancel,
            revocation_fallback: RevocationFallback::Reject,
        }
    }
}

impl GateConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `SAFELOAD_READY_POLL_MS` | Readiness poll interval |
    /// | `SAFELOAD_READY_TIMEOUT_MS` | Readiness timeout |
    /// | `SAFELOAD_POLICY_RETRY_MS` | Policy reload delay |
    /// | `SAFELOAD_FAIL_OPEN` | Resume downloads on readiness timeout |
    /// | `SAFELOAD_ACCEPT_UNCHECKED_REVOCATION` | Accept when the oracle is down |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ready_poll_interval: env_parse("SAFELOAD_READY_POLL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.ready_poll_interval),
            ready_timeout: env_parse("SAFELOAD_READY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.ready_timeout),
            policy_retry_delay: env_parse("SAFELOAD_POLICY_RETRY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.policy_retry_delay),
            readiness_fallback: if env_flag("SAFELOAD_FAIL_OPEN") {
                ReadinessFallback::Resume
            } else {
                ReadinessFallback::Cancel
            },
            revocation_fallback: if env_flag("SAFELOAD_ACCEPT_UNCHECKED_REVOCATION") {
                RevocationFallback::Accept
            } else {
                RevocationFallback::Reject
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
