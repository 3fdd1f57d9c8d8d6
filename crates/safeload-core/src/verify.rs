//! Signed-download verification pipeline.
//!
//! Fixed order, first failure wins:
//!
//! 1. container parse
//! 2. certificate chain against the policy's CA root
//! 3. PKCS#1 v1.5 signature over the payload
//! 4. revocation oracle (async variant only)
//!
//! Reasons from steps after the failing one are never produced.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::certificate::Certificate;
use crate::container::{self, SignedContainer};
use crate::revocation::{revocation_status, RevocationOracle, RevocationStatus};
use crate::types::{RevocationFallback, VerificationOutcome};
use crate::{chain, signature};

/// Pipeline step that rejected a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Container,
    Chain,
    Signature,
    Revocation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Container => "container",
            Self::Chain => "certificate chain",
            Self::Signature => "signature",
            Self::Revocation => "revocation",
        };
        f.write_str(name)
    }
}

/// A failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub stage: Stage,
    pub reasons: Vec<String>,

    /// The oracle could not be reached; the file itself may be fine.
    pub transient: bool,
}

impl Rejection {
    fn new(stage: Stage, reasons: Vec<String>) -> Self {
        Self {
            stage,
            reasons,
            transient: false,
        }
    }

    fn from_outcome(stage: Stage, outcome: VerificationOutcome) -> Self {
        Self::new(stage, outcome.reasons)
    }

    /// Exit code for CLI, aligned with [`GateError::exit_code`](crate::GateError::exit_code).
    pub fn exit_code(&self) -> i32 {
        match (self.stage, self.transient) {
            (_, true) => 5,
            (Stage::Revocation, false) => 3,
            _ => 4,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} check failed: {}", self.stage, self.reasons.join("; "))
    }
}

impl std::error::Error for Rejection {}

/// A download that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayload {
    /// Clean output name: the declared filename reduced to its last path component.
    pub file_name: String,
    pub payload: Vec<u8>,
    /// Signer certificate subject.
    pub subject: String,
    /// Signer certificate PEM, as carried in the container.
    pub certificate_pem: String,
}

/// Steps 1 to 3 at `now`.
pub fn verify_offline(
    buffer: &[u8],
    filename: &str,
    root: &Certificate,
    now: DateTime<Utc>,
) -> Result<VerifiedPayload, Rejection> {
    let container = container::parse(buffer, filename)
        .map_err(|e| Rejection::new(Stage::Container, vec![e.to_string()]))?;

    let file_name = output_file_name(&container.declared_filename).ok_or_else(|| {
        Rejection::new(Stage::Container, vec!["declared filename is empty".to_string()])
    })?;

    let leaf = Certificate::from_pem(&container.certificate_pem)
        .map_err(|e| Rejection::new(Stage::Chain, vec![e.to_string()]))?;

    let chain_outcome = chain::validate_at(&leaf, root, now);
    if !chain_outcome.valid {
        return Err(Rejection::from_outcome(Stage::Chain, chain_outcome));
    }

    let public_key = leaf.public_key().ok_or_else(|| {
        Rejection::new(
            Stage::Signature,
            vec!["signer certificate has no RSA public key".to_string()],
        )
    })?;

    let signature_outcome = signature::verify(&container.payload, &container.signature, public_key);
    if !signature_outcome.valid {
        return Err(Rejection::from_outcome(Stage::Signature, signature_outcome));
    }

    debug!(
        file = %file_name,
        subject = %leaf.subject(),
        payload_bytes = container.payload.len(),
        "container verified offline"
    );

    let SignedContainer {
        certificate_pem,
        payload,
        ..
    } = container;

    Ok(VerifiedPayload {
        file_name,
        payload,
        subject: leaf.subject().to_string(),
        certificate_pem,
    })
}

/// The full pipeline, including the revocation oracle.
pub async fn verify_signed_download<O: RevocationOracle + ?Sized>(
    buffer: &[u8],
    filename: &str,
    root: &Certificate,
    oracle: &O,
    fallback: RevocationFallback,
) -> Result<VerifiedPayload, Rejection> {
    let verified = verify_offline(buffer, filename, root, Utc::now())?;

    let status = revocation_status(oracle, &verified.certificate_pem).await;
    let transient = matches!(status, RevocationStatus::Unavailable(_));
    let outcome = status.into_outcome(fallback);
    if !outcome.valid {
        return Err(Rejection {
            transient,
            ..Rejection::from_outcome(Stage::Revocation, outcome)
        });
    }

    info!(file = %verified.file_name, subject = %verified.subject, "signed download verified");
    Ok(verified)
}

/// Last path component of a declared name, with either separator.
pub fn output_file_name(declared: &str) -> Option<String> {
    let name = declared.rsplit(['/', '\\']).next().unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::build;
    use crate::error::{GateError, GateResult};
    use crate::revocation::AcceptAll;
    use crate::test_support::{root_certificate, sign, EXPIRED_LEAF_PEM, LEAF_PEM};
    use crate::types::RevocationVerdict;
    use async_trait::async_trait;

    const PAYLOAD: &[u8] = b"%PDF-1.7 quarterly report\n";

    fn signed(payload: &[u8]) -> Vec<u8> {
        build(LEAF_PEM, &sign(payload), payload)
    }

    struct Revoked;

    #[async_trait]
    impl crate::revocation::RevocationOracle for Revoked {
        async fn check_certificate(&self, _pem: &str) -> GateResult<RevocationVerdict> {
            Ok(RevocationVerdict {
                valid: false,
                reasons: vec!["key compromise".to_string()],
            })
        }
    }

    struct Down;

    #[async_trait]
    impl crate::revocation::RevocationOracle for Down {
        async fn check_certificate(&self, _pem: &str) -> GateResult<RevocationVerdict> {
            Err(GateError::Network {
                message: "connection refused".to_string(),
            })
        }
    }

    #[test]
    fn test_offline_success() {
        let verified =
            verify_offline(&signed(PAYLOAD), "report.pdf.safe", &root_certificate(), Utc::now())
                .unwrap();
        assert_eq!(verified.file_name, "report.pdf");
        assert_eq!(verified.payload, PAYLOAD);
        assert!(verified.subject.contains("Jane Signer"));
        assert_eq!(verified.certificate_pem.trim(), LEAF_PEM.trim());
    }

    #[test]
    fn test_container_failure_short_circuits() {
        let rejection =
            verify_offline(b"no pem here", "x.safe", &root_certificate(), Utc::now()).unwrap_err();
        assert_eq!(rejection.stage, Stage::Container);
        assert_eq!(rejection.reasons, vec!["no certificate".to_string()]);
        assert_eq!(rejection.exit_code(), 4);
    }

    #[test]
    fn test_expired_signer_stops_before_signature() {
        // Signed with the wrong key as well; only the chain reason may appear.
        let buffer = build(EXPIRED_LEAF_PEM, &sign(PAYLOAD), PAYLOAD);
        let rejection =
            verify_offline(&buffer, "report.pdf.safe", &root_certificate(), Utc::now()).unwrap_err();
        assert_eq!(rejection.stage, Stage::Chain);
        assert!(rejection
            .reasons
            .iter()
            .all(|r| r.starts_with("signer certificate expired")));
    }

    #[test]
    fn test_tampered_payload_is_digest_mismatch() {
        let mut buffer = signed(PAYLOAD);
        let last = buffer.len() - 1;
        buffer[last] ^= 0x01;
        let rejection =
            verify_offline(&buffer, "report.pdf.safe", &root_certificate(), Utc::now()).unwrap_err();
        assert_eq!(rejection.stage, Stage::Signature);
        assert_eq!(rejection.reasons, vec!["digest mismatch".to_string()]);
    }

    #[test]
    fn test_declared_name_is_reduced_to_basename() {
        let verified = verify_offline(
            &signed(PAYLOAD),
            "../../etc/report.pdf.safe",
            &root_certificate(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(verified.file_name, "report.pdf");
    }

    #[test]
    fn test_empty_declared_name_rejected() {
        let rejection =
            verify_offline(&signed(PAYLOAD), "dir/.safe", &root_certificate(), Utc::now())
                .unwrap_err();
        assert_eq!(rejection.stage, Stage::Container);
        assert_eq!(rejection.reasons, vec!["declared filename is empty".to_string()]);
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name("a.pdf").as_deref(), Some("a.pdf"));
        assert_eq!(output_file_name("C:\\Users\\x\\a.pdf").as_deref(), Some("a.pdf"));
        assert_eq!(output_file_name("dir/"), None);
        assert_eq!(output_file_name(".."), None);
        assert_eq!(output_file_name(""), None);
    }

    #[tokio::test]
    async fn test_full_pipeline_accepts() {
        let verified = verify_signed_download(
            &signed(PAYLOAD),
            "report.pdf.safe",
            &root_certificate(),
            &AcceptAll,
            RevocationFallback::Reject,
        )
        .await
        .unwrap();
        assert_eq!(verified.payload, PAYLOAD);
    }

    #[tokio::test]
    async fn test_revoked_signer() {
        let rejection = verify_signed_download(
            &signed(PAYLOAD),
            "report.pdf.safe",
            &root_certificate(),
            &Revoked,
            RevocationFallback::Accept,
        )
        .await
        .unwrap_err();
        assert_eq!(rejection.stage, Stage::Revocation);
        assert_eq!(rejection.reasons, vec!["key compromise".to_string()]);
        assert_eq!(rejection.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_oracle_down_fails_closed() {
        let rejection = verify_signed_download(
            &signed(PAYLOAD),
            "report.pdf.safe",
            &root_certificate(),
            &Down,
            RevocationFallback::Reject,
        )
        .await
        .unwrap_err();
        assert_eq!(rejection.stage, Stage::Revocation);
        assert!(rejection.transient);
        assert_eq!(rejection.exit_code(), 5);
    }

    #[tokio::test]
    async fn test_oracle_down_accept_fallback() {
        let verified = verify_signed_download(
            &signed(PAYLOAD),
            "report.pdf.safe",
            &root_certificate(),
            &Down,
            RevocationFallback::Accept,
        )
        .await;
        assert!(verified.is_ok());
    }

    #[tokio::test]
    async fn test_oracle_not_consulted_after_local_failure() {
        let rejection = verify_signed_download(
            b"garbage",
            "x.safe",
            &root_certificate(),
            &Revoked,
            RevocationFallback::Reject,
        )
        .await
        .unwrap_err();
        assert_eq!(rejection.stage, Stage::Container);
    }
}
