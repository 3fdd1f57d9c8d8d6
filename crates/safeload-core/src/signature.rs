//! RSA PKCS#1 v1.5 signature verification over SHA-256, by hand.
//!
//! No RSA verify routine is called. The check is spelled out step by step
//! so every failure mode is individually reportable:
//!
//! 1. SHA-256 of the payload, in bounded chunks.
//! 2. `m = s^e mod n`, left-padded with zeros to the modulus length `k`.
//! 3. Padding: `0x00 0x01 0xFF.. 0x00`.
//! 4. `DigestInfo` DER: SHA-256 OID, NULL parameters, 32-byte digest equal to step 1.

use num_bigint::BigUint;
use tracing::debug;

use crate::certificate::RsaPublicKey;
use crate::der::{self, Tlv, OID_SHA256, TAG_NULL, TAG_OCTET_STRING, TAG_OID, TAG_SEQUENCE};
use crate::digest::{sha256, SHA256_LEN};
use crate::types::VerificationOutcome;

/// Why a signature did not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureFailure {
    #[error("malformed public key")]
    MalformedPublicKey,

    #[error("signature length does not match modulus length")]
    SignatureLengthMismatch,

    #[error("signature representative out of range")]
    SignatureOutOfRange,

    #[error("invalid leading byte (expected 0x00)")]
    InvalidLeadingByte,

    #[error("invalid block type byte (expected 0x01)")]
    InvalidBlockType,

    #[error("empty padding string")]
    EmptyPaddingString,

    #[error("invalid separator (expected 0x00 after padding)")]
    InvalidSeparator,

    #[error("malformed DigestInfo sequence")]
    MalformedDigestInfo,

    #[error("malformed algorithm identifier")]
    MalformedAlgorithmIdentifier,

    #[error("wrong hash algorithm OID")]
    WrongHashAlgorithm,

    #[error("wrong digest length")]
    WrongDigestLength,

    #[error("digest mismatch")]
    DigestMismatch,
}

/// Verify `signature` over `payload` with `public_key`.
pub fn verify(payload: &[u8], signature: &[u8], public_key: &RsaPublicKey) -> VerificationOutcome {
    match verify_detailed(payload, signature, public_key) {
        Ok(()) => VerificationOutcome::valid(),
        Err(failure) => {
            debug!(reason = %failure, "signature rejected");
            VerificationOutcome::invalid(failure.to_string())
        }
    }
}

/// Verify and return the typed failure.
pub fn verify_detailed(
    payload: &[u8],
    signature: &[u8],
    public_key: &RsaPublicKey,
) -> Result<(), SignatureFailure> {
    let digest = sha256(payload);
    let encoded = rsa_public_operation(signature, public_key)?;
    check_encoded_message(&encoded, &digest)
}

/// Raw RSA: `signature^e mod n`, left-padded to the modulus byte length.
pub fn rsa_public_operation(
    signature: &[u8],
    public_key: &RsaPublicKey,
) -> Result<Vec<u8>, SignatureFailure> {
    let n = BigUint::from_bytes_be(&public_key.modulus);
    let e = BigUint::from_bytes_be(&public_key.exponent);
    if n.bits() == 0 || e.bits() == 0 {
        return Err(SignatureFailure::MalformedPublicKey);
    }

    let k = n.bits().div_ceil(8) as usize;
    if signature.len() != k {
        return Err(SignatureFailure::SignatureLengthMismatch);
    }

    let s = BigUint::from_bytes_be(signature);
    if s >= n {
        return Err(SignatureFailure::SignatureOutOfRange);
    }

    let m = s.modpow(&e, &n).to_bytes_be();

    // m < n, so it never exceeds k bytes; leading zero bytes are dropped by
    // to_bytes_be and restored here.
    let mut encoded = vec![0_u8; k - m.len()];
    encoded.extend_from_slice(&m);
    Ok(encoded)
}

/// Validate the PKCS#1 v1.5 block structure and the embedded digest.
pub fn check_encoded_message(
    encoded: &[u8],
    expected_digest: &[u8; SHA256_LEN],
) -> Result<(), SignatureFailure> {
    let digest_info = strip_padding(encoded)?;
    let digest = parse_digest_info(digest_info)?;

    if !constant_time_eq(digest, expected_digest) {
        return Err(SignatureFailure::DigestMismatch);
    }
    Ok(())
}

/// Check `0x00 0x01 0xFF.. 0x00` and return the bytes after the separator.
fn strip_padding(encoded: &[u8]) -> Result<&[u8], SignatureFailure> {
    if encoded.first() != Some(&0x00) {
        return Err(SignatureFailure::InvalidLeadingByte);
    }
    if encoded.get(1) != Some(&0x01) {
        return Err(SignatureFailure::InvalidBlockType);
    }

    let run = encoded[2..].iter().take_while(|&&b| b == 0xff).count();
    if run == 0 {
        return Err(SignatureFailure::EmptyPaddingString);
    }

    let separator = 2 + run;
    if encoded.get(separator) != Some(&0x00) {
        return Err(SignatureFailure::InvalidSeparator);
    }

    Ok(&encoded[separator + 1..])
}

/// Parse `DigestInfo` and return the digest bytes.
fn parse_digest_info(bytes: &[u8]) -> Result<&[u8], SignatureFailure> {
    let outer = der::read_single(bytes).map_err(|_| SignatureFailure::MalformedDigestInfo)?;
    if outer.tag != TAG_SEQUENCE {
        return Err(SignatureFailure::MalformedDigestInfo);
    }

    let children =
        der::read_children(outer.value).map_err(|_| SignatureFailure::MalformedDigestInfo)?;
    let [algorithm, digest] = children[..] else {
        return Err(SignatureFailure::MalformedDigestInfo);
    };
    if algorithm.tag != TAG_SEQUENCE || digest.tag != TAG_OCTET_STRING {
        return Err(SignatureFailure::MalformedDigestInfo);
    }

    check_algorithm_identifier(algorithm)?;

    if digest.value.len() != SHA256_LEN {
        return Err(SignatureFailure::WrongDigestLength);
    }
    Ok(digest.value)
}

fn check_algorithm_identifier(algorithm: Tlv<'_>) -> Result<(), SignatureFailure> {
    let parts = der::read_children(algorithm.value)
        .map_err(|_| SignatureFailure::MalformedAlgorithmIdentifier)?;
    let [oid, parameters] = parts[..] else {
        return Err(SignatureFailure::MalformedAlgorithmIdentifier);
    };
    if oid.tag != TAG_OID || parameters.tag != TAG_NULL || !parameters.value.is_empty() {
        return Err(SignatureFailure::MalformedAlgorithmIdentifier);
    }
    if oid.value != OID_SHA256 {
        return Err(SignatureFailure::WrongHashAlgorithm);
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0_u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
