//! Shared fixtures for unit tests: the test PKI and an independent signer.

use std::sync::OnceLock;

use num_bigint::BigUint;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::RsaPrivateKey;

use crate::certificate::{Certificate, RsaPublicKey};
use crate::container::SIGNATURE_SIZE;

pub(crate) const ROOT_PEM: &str = include_str!("../tests/fixtures/root_ca.pem");
pub(crate) const LEAF_PEM: &str = include_str!("../tests/fixtures/leaf_cert.pem");
pub(crate) const EXPIRED_LEAF_PEM: &str = include_str!("../tests/fixtures/expired_leaf_cert.pem");
const LEAF_KEY_PEM: &str = include_str!("../tests/fixtures/leaf_key.pem");

fn leaf_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::from_pkcs8_pem(LEAF_KEY_PEM).expect("fixture key parses"))
}

pub(crate) fn root_certificate() -> Certificate {
    Certificate::from_pem(ROOT_PEM).expect("fixture root parses")
}

pub(crate) fn leaf_public_key() -> RsaPublicKey {
    Certificate::from_pem(LEAF_PEM)
        .expect("fixture leaf parses")
        .public_key()
        .expect("fixture leaf is RSA")
        .clone()
}

/// PKCS#1 v1.5 / SHA-256 signature from the `rsa` crate.
pub(crate) fn sign(payload: &[u8]) -> [u8; SIGNATURE_SIZE] {
    let signing_key = SigningKey::<Sha256>::new(leaf_key().clone());
    let signature = signing_key.sign(payload).to_vec();
    let mut out = [0_u8; SIGNATURE_SIZE];
    out.copy_from_slice(&signature);
    out
}

/// Raw private-key operation over an arbitrary encoded block: `em^d mod n`.
///
/// Lets tests feed the verifier any decrypted block they like.
pub(crate) fn raw_sign(encoded: &[u8]) -> [u8; SIGNATURE_SIZE] {
    let key = leaf_key();
    let n = BigUint::from_bytes_be(&key.n().to_bytes_be());
    let d = BigUint::from_bytes_be(&key.d().to_bytes_be());
    let m = BigUint::from_bytes_be(encoded);
    assert!(m < n, "encoded block must be below the modulus");

    let bytes = m.modpow(&d, &n).to_bytes_be();
    let mut out = [0_u8; SIGNATURE_SIZE];
    out[SIGNATURE_SIZE - bytes.len()..].copy_from_slice(&bytes);
    out
}
