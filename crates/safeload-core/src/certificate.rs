//! Owned X.509 certificate view.
//!
//! The engine only needs a handful of fields: subject, issuer, validity
//! period and the RSA public key. The DER is kept so the chain validator
//! can re-parse it for signature checks.

use chrono::{DateTime, Utc};
use x509_parser::prelude::*;

use crate::digest::sha256_hex;
use crate::error::{GateError, GateResult};

/// RSA public key components, big-endian, without leading zero bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
}

impl RsaPublicKey {
    pub fn new(modulus: &[u8], exponent: &[u8]) -> Self {
        Self {
            modulus: strip_leading_zeros(modulus).to_vec(),
            exponent: strip_leading_zeros(exponent).to_vec(),
        }
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        match self.modulus.first() {
            Some(&top) => self.modulus.len() * 8 - top.leading_zeros() as usize,
            None => 0,
        }
    }
}

/// Certificate validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityPeriod {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl ValidityPeriod {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}

/// A parsed certificate.
#[derive(Debug, Clone)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    issuer: String,
    validity: ValidityPeriod,
    public_key: Option<RsaPublicKey>,
    is_ca: Option<bool>,
}

impl Certificate {
    /// Parse the first `CERTIFICATE` block of a PEM document.
    pub fn from_pem(pem: &str) -> GateResult<Self> {
        let (_, block) = parse_x509_pem(pem.as_bytes())
            .map_err(|e| certificate_error(format!("invalid PEM: {}", e)))?;

        if block.label != "CERTIFICATE" {
            return Err(certificate_error(format!(
                "unexpected PEM label: {}",
                block.label
            )));
        }

        Self::from_der(block.contents)
    }

    /// Parse a DER-encoded certificate.
    pub fn from_der(der: Vec<u8>) -> GateResult<Self> {
        let (subject, issuer, validity, public_key, is_ca) = {
            let cert = parse_der(&der)?;

            let validity = ValidityPeriod {
                not_before: to_utc(cert.validity().not_before.timestamp())?,
                not_after: to_utc(cert.validity().not_after.timestamp())?,
            };

            let public_key = match cert.public_key().parsed() {
                Ok(x509_parser::public_key::PublicKey::RSA(rsa)) => {
                    Some(RsaPublicKey::new(rsa.modulus, rsa.exponent))
                }
                _ => None,
            };

            let is_ca = match cert.basic_constraints() {
                Ok(Some(ext)) => Some(ext.value.ca),
                Ok(None) => None,
                Err(e) => {
                    return Err(certificate_error(format!(
                        "invalid basic constraints: {}",
                        e
                    )))
                }
            };

            (
                cert.subject().to_string(),
                cert.issuer().to_string(),
                validity,
                public_key,
                is_ca,
            )
        };

        Ok(Self {
            der,
            subject,
            issuer,
            validity,
            public_key,
            is_ca,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn validity(&self) -> ValidityPeriod {
        self.validity
    }

    /// RSA public key, if the certificate carries one.
    pub fn public_key(&self) -> Option<&RsaPublicKey> {
        self.public_key.as_ref()
    }

    /// basicConstraints `cA` flag; `None` when the extension is absent.
    pub fn is_ca(&self) -> Option<bool> {
        self.is_ca
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// SHA-256 fingerprint of the DER encoding.
    pub fn fingerprint(&self) -> String {
        sha256_hex(&self.der)
    }

    pub(crate) fn parsed(&self) -> GateResult<X509Certificate<'_>> {
        parse_der(&self.der)
    }
}

fn parse_der(der: &[u8]) -> GateResult<X509Certificate<'_>> {
    let (rest, cert) = X509Certificate::from_der(der)
        .map_err(|e| certificate_error(format!("malformed certificate: {}", e)))?;
    if !rest.is_empty() {
        return Err(certificate_error("trailing bytes after certificate"));
    }
    Ok(cert)
}

fn to_utc(timestamp: i64) -> GateResult<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| certificate_error(format!("validity timestamp out of range: {}", timestamp)))
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

fn certificate_error(reason: impl Into<String>) -> GateError {
    GateError::Certificate {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEAF: &str = include_str!("../tests/fixtures/leaf_cert.pem");
    const ROOT: &str = include_str!("../tests/fixtures/root_ca.pem");

    #[test]
    fn test_parse_leaf_fields() {
        let cert = Certificate::from_pem(LEAF).unwrap();
        assert!(cert.subject().contains("CN=Jane Signer"));
        assert!(cert.issuer().contains("CN=Safeload Test Root CA"));
        assert_eq!(cert.is_ca(), Some(false));

        let key = cert.public_key().expect("leaf carries an RSA key");
        assert_eq!(key.bits(), 2048);
        assert_eq!(key.modulus.len(), 256);
        assert_eq!(key.exponent, vec![0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_parse_root_is_ca() {
        let cert = Certificate::from_pem(ROOT).unwrap();
        assert_eq!(cert.is_ca(), Some(true));
        assert_eq!(cert.subject(), cert.issuer());
    }

    #[test]
    fn test_validity_window() {
        let cert = Certificate::from_pem(LEAF).unwrap();
        let validity = cert.validity();
        assert!(validity.not_before < validity.not_after);
        assert!(validity.contains(validity.not_before));
        assert!(!validity.contains(validity.not_after + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_garbage_pem_is_certificate_error() {
        let err = Certificate::from_pem("not a certificate").unwrap_err();
        assert!(matches!(err, GateError::Certificate { .. }));
    }

    #[test]
    fn test_truncated_der_is_certificate_error() {
        let cert = Certificate::from_pem(LEAF).unwrap();
        let truncated = cert.der()[..cert.der().len() / 2].to_vec();
        assert!(matches!(
            Certificate::from_der(truncated),
            Err(GateError::Certificate { .. })
        ));
    }

    #[test]
    fn test_strip_leading_zeros() {
        let key = RsaPublicKey::new(&[0, 0, 0x80, 1], &[0, 3]);
        assert_eq!(key.modulus, vec![0x80, 1]);
        assert_eq!(key.exponent, vec![3]);
        assert_eq!(key.bits(), 16);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = Certificate::from_pem(LEAF).unwrap();
        let b = Certificate::from_pem(LEAF).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(
            a.fingerprint(),
            Certificate::from_pem(ROOT).unwrap().fingerprint()
        );
    }
}
