//! Signed-download verification engine.
//!
//! Downloads pass a trust gate: a download goes through untouched when its
//! source domain or file format is permitted by policy, or when it is a
//! signed container (`*.safe`) whose certificate chains to the policy's CA
//! root, whose RSA signature verifies over the payload, and whose signer has
//! not been revoked. Verified containers are replaced by their bare payload.
//!
//! - [`container`]: the signed-file layout (PEM certificate, 256-byte signature, payload)
//! - [`chain`]: leaf certificate against a single trusted root
//! - [`signature`]: PKCS#1 v1.5 / SHA-256 verification, done by hand
//! - [`revocation`]: the remote trust authority
//! - [`trust`]: policy snapshot, publish-once context, background loader
//! - [`gate`]: the state machine steering the host download manager
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use safeload_core::{
//!     DownloadGate, DownloadHost, GateConfig, TrustConfigLoader, TrustContext,
//!     TrustServiceClient,
//! };
//!
//! # async fn example(host: Arc<dyn DownloadHost>) -> anyhow::Result<()> {
//! let client = Arc::new(TrustServiceClient::from_env()?);
//! let config = GateConfig::from_env();
//! let trust = TrustContext::new();
//!
//! TrustConfigLoader::new(Arc::clone(&client), trust.clone(), config.policy_retry_delay).spawn();
//!
//! let (events_tx, events_rx) = tokio::sync::mpsc::channel(64);
//! let gate = DownloadGate::new(host, trust, client, config);
//! tokio::spawn(gate.run(events_rx));
//! # drop(events_tx);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `SAFELOAD_SERVER_URL` | Trust service base URL (default: `http://127.0.0.1:80`) |
//! | `SAFELOAD_TOKEN` | Bearer token for the trust service |
//! | `SAFELOAD_TIMEOUT` | Request timeout in seconds (default: 30) |
//! | `SAFELOAD_MAX_RETRIES` | Max retries for transient failures (default: 3) |
//! | `SAFELOAD_READY_POLL_MS` | Policy readiness poll interval (default: 500) |
//! | `SAFELOAD_READY_TIMEOUT_MS` | Policy readiness timeout (default: 10000) |
//! | `SAFELOAD_POLICY_RETRY_MS` | Delay between policy load attempts (default: 1000) |
//! | `SAFELOAD_FAIL_OPEN` | Resume downloads when policy never arrives |
//! | `SAFELOAD_ACCEPT_UNCHECKED_REVOCATION` | Accept when the revocation service is down |

pub mod auth;
pub mod certificate;
pub mod chain;
pub mod client;
pub mod container;
pub mod der;
mod digest;
pub mod error;
pub mod gate;
pub mod host;
pub mod revocation;
pub mod signature;
pub mod trust;
pub mod types;
pub mod verify;

#[cfg(test)]
mod test_support;

// Re-export main types
pub use auth::TokenProvider;
pub use certificate::{Certificate, RsaPublicKey, ValidityPeriod};
pub use client::{TrustServiceClient, SAFELOAD_USER_AGENT};
pub use container::{
    ContainerError, ContainerLayout, SignedContainer, CONTAINER_SUFFIX, SIGNATURE_SIZE,
};
pub use digest::{
    digest_hex, sha256, sha256_chunked, sha256_hex, sha256_reader, DIGEST_CHUNK_SIZE,
};
pub use error::{GateError, GateResult};
pub use gate::{
    decide, effective_name, extension_of, Decision, DownloadGate, DownloadRecord, GateOutcome,
    Phase,
};
pub use host::{DownloadEvent, DownloadHost, DownloadId, DownloadItem, DownloadState};
pub use revocation::{AcceptAll, RevocationOracle, RevocationStatus};
pub use signature::SignatureFailure;
pub use trust::{PolicySource, TrustConfig, TrustConfigLoader, TrustContext, TrustSnapshot};
pub use types::{
    GateConfig, PolicyDocument, ReadinessFallback, RevocationFallback, RevocationVerdict,
    ServiceConfig, VerificationOutcome,
};
pub use verify::{verify_offline, verify_signed_download, Rejection, Stage, VerifiedPayload};
