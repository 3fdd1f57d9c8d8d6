//! Certificate chain validation against a single trusted root.
//!
//! The trust store holds exactly one certificate: the CA root from the
//! published policy. Intermediate chains, OCSP and CRLs are not handled
//! here; revocation goes through [`crate::revocation`].

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::certificate::{Certificate, ValidityPeriod};
use crate::types::VerificationOutcome;

/// Validate `leaf` against `root` at the current time.
pub fn validate(leaf: &Certificate, root: &Certificate) -> VerificationOutcome {
    validate_at(leaf, root, Utc::now())
}

/// Validate `leaf` against `root` at `now`.
///
/// Every failing check of this step is reported; nothing panics.
pub fn validate_at(leaf: &Certificate, root: &Certificate, now: DateTime<Utc>) -> VerificationOutcome {
    let mut reasons = Vec::new();

    if let Some(reason) = validity_failure("root", root.validity(), now) {
        reasons.push(reason);
    }

    if root.is_ca() == Some(false) {
        reasons.push("trusted root is not a CA certificate".to_string());
    }

    match (leaf.parsed(), root.parsed()) {
        (Ok(leaf_x509), Ok(root_x509)) => {
            if leaf_x509.issuer().as_raw() != root_x509.subject().as_raw() {
                reasons.push(format!(
                    "issuer mismatch: certificate issued by '{}', trusted root is '{}'",
                    leaf.issuer(),
                    root.subject()
                ));
            } else if let Err(e) = leaf_x509.verify_signature(Some(root_x509.public_key())) {
                reasons.push(format!(
                    "certificate signature does not verify under the trusted root: {}",
                    e
                ));
            }
        }
        (Err(e), _) | (_, Err(e)) => reasons.push(e.to_string()),
    }

    if let Some(reason) = validity_failure("signer", leaf.validity(), now) {
        reasons.push(reason);
    }

    debug!(
        subject = %leaf.subject(),
        root = %root.subject(),
        failures = reasons.len(),
        "validated certificate chain"
    );

    VerificationOutcome::from_reasons(reasons)
}

fn validity_failure(role: &str, validity: ValidityPeriod, now: DateTime<Utc>) -> Option<String> {
    if now < validity.not_before {
        Some(format!(
            "{} certificate not yet valid (valid from {})",
            role, validity.not_before
        ))
    } else if now > validity.not_after {
        Some(format!(
            "{} certificate expired (valid until {})",
            role, validity.not_after
        ))
    } else {
        None
    }
}
