//! Remote revocation check for signer certificates.
//!
//! The oracle is the trust authority that knows which signer certificates
//! have been revoked. It answers with a [`RevocationVerdict`]; transport
//! failures and malformed answers are [`GateError::RevocationUnavailable`],
//! never an implicit "revoked".

use async_trait::async_trait;
use tracing::warn;

use crate::error::{GateError, GateResult};
use crate::types::{RevocationFallback, RevocationVerdict, VerificationOutcome};

/// Reason used when the authority rejects a certificate without saying why.
pub const DEFAULT_REVOKED_REASON: &str = "certificate revoked";

/// The external trust authority.
#[async_trait]
pub trait RevocationOracle: Send + Sync {
    /// Ask whether `certificate_pem` is still in good standing.
    async fn check_certificate(&self, certificate_pem: &str) -> GateResult<RevocationVerdict>;
}

/// Oracle that accepts every certificate. For offline use only.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl RevocationOracle for AcceptAll {
    async fn check_certificate(&self, _certificate_pem: &str) -> GateResult<RevocationVerdict> {
        Ok(RevocationVerdict {
            valid: true,
            reasons: Vec::new(),
        })
    }
}

/// What the oracle said, before any fallback is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationStatus {
    Good,
    Revoked(Vec<String>),
    Unavailable(String),
}

impl RevocationStatus {
    /// Fold into an outcome. Only `Unavailable` consults `fallback`.
    pub fn into_outcome(self, fallback: RevocationFallback) -> VerificationOutcome {
        match self {
            Self::Good => VerificationOutcome::valid(),
            Self::Revoked(reasons) => VerificationOutcome::from_reasons(reasons),
            Self::Unavailable(message) => match fallback {
                RevocationFallback::Reject => VerificationOutcome::invalid(message),
                RevocationFallback::Accept => {
                    warn!(error = %message, "revocation check skipped, accepting locally verified download");
                    VerificationOutcome::valid()
                }
            },
        }
    }
}

/// Ask the oracle about `certificate_pem`.
pub async fn revocation_status<O: RevocationOracle + ?Sized>(
    oracle: &O,
    certificate_pem: &str,
) -> RevocationStatus {
    match oracle.check_certificate(certificate_pem).await {
        Ok(verdict) if verdict.valid => RevocationStatus::Good,
        Ok(verdict) => RevocationStatus::Revoked(revoked_reasons(verdict.reasons)),
        Err(e) => RevocationStatus::Unavailable(unavailable_message(e)),
    }
}

/// Ask the oracle and fold the answer into an outcome.
///
/// An explicit `valid = false` is always a rejection. An unavailable oracle
/// is resolved by `fallback`.
pub async fn check_revocation<O: RevocationOracle + ?Sized>(
    oracle: &O,
    certificate_pem: &str,
    fallback: RevocationFallback,
) -> VerificationOutcome {
    revocation_status(oracle, certificate_pem)
        .await
        .into_outcome(fallback)
}

fn unavailable_message(error: GateError) -> String {
    // Anything other than an explicit verdict means the oracle could not answer.
    match error {
        GateError::RevocationUnavailable { .. } => error.to_string(),
        other => GateError::RevocationUnavailable {
            message: other.to_string(),
        }
        .to_string(),
    }
}

fn revoked_reasons(reasons: Vec<String>) -> Vec<String> {
    if reasons.is_empty() {
        vec![DEFAULT_REVOKED_REASON.to_string()]
    } else {
        reasons
    }
}
