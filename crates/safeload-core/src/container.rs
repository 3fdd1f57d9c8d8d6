//! Signed container codec.
//!
//! Byte layout:
//!
//! ```text
//! [ PEM certificate block, ASCII, END marker + line break(s) ]
//! [ SIGNATURE_SIZE raw bytes: RSA PKCS#1 v1.5 signature       ]
//! [ payload, verbatim                                         ]
//! ```
//!
//! The certificate region must be ASCII, so byte offsets and character
//! offsets coincide and the signature can be located by byte position.

use tracing::debug;

/// Signature length in bytes (RSA-2048 modulus).
pub const SIGNATURE_SIZE: usize = 256;

/// Filename suffix carried by signed containers.
pub const CONTAINER_SUFFIX: &str = ".safe";

pub const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
pub const PEM_END: &str = "-----END CERTIFICATE-----";

/// Container parse failures. Each is terminal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    #[error("no certificate")]
    NoCertificate,

    #[error("invalid certificate format")]
    InvalidCertificateFormat,

    #[error("file too small for signature")]
    FileTooSmall,
}

/// A parsed signed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedContainer {
    /// Certificate PEM text, including the line break(s) after the footer.
    pub certificate_pem: String,

    /// Raw signature bytes.
    pub signature: [u8; SIGNATURE_SIZE],

    /// Payload bytes, verbatim.
    pub payload: Vec<u8>,

    /// Filename with the container suffix stripped.
    pub declared_filename: String,
}

/// Byte offsets of the three container regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerLayout {
    /// End of the certificate region (exclusive), line breaks included.
    pub certificate_end: usize,

    /// End of the signature region (exclusive).
    pub signature_end: usize,

    /// Total buffer length.
    pub total_len: usize,
}

impl ContainerLayout {
    pub fn payload_len(&self) -> usize {
        self.total_len - self.signature_end
    }
}

/// Locate the certificate, signature and payload regions in `buffer`.
pub fn layout(buffer: &[u8]) -> Result<ContainerLayout, ContainerError> {
    let begin = find(buffer, PEM_BEGIN.as_bytes(), 0).ok_or(ContainerError::NoCertificate)?;
    let end_marker =
        find(buffer, PEM_END.as_bytes(), begin).ok_or(ContainerError::NoCertificate)?;

    let mut certificate_end = end_marker + PEM_END.len();

    // The certificate span always starts at byte 0.
    if !buffer.starts_with(PEM_BEGIN.as_bytes()) {
        return Err(ContainerError::InvalidCertificateFormat);
    }
    if !buffer[..certificate_end].is_ascii() {
        return Err(ContainerError::InvalidCertificateFormat);
    }

    while certificate_end < buffer.len() && matches!(buffer[certificate_end], b'\r' | b'\n') {
        certificate_end += 1;
    }

    let remaining = buffer.len() - certificate_end;
    if remaining < SIGNATURE_SIZE {
        return Err(ContainerError::FileTooSmall);
    }

    Ok(ContainerLayout {
        certificate_end,
        signature_end: certificate_end + SIGNATURE_SIZE,
        total_len: buffer.len(),
    })
}

/// Parse a signed container.
pub fn parse(buffer: &[u8], filename: &str) -> Result<SignedContainer, ContainerError> {
    let layout = layout(buffer)?;

    // `layout` guarantees the certificate region is ASCII.
    let certificate_pem = String::from_utf8_lossy(&buffer[..layout.certificate_end]).into_owned();

    let mut signature = [0_u8; SIGNATURE_SIZE];
    signature.copy_from_slice(&buffer[layout.certificate_end..layout.signature_end]);

    let payload = buffer[layout.signature_end..].to_vec();

    debug!(
        certificate_len = layout.certificate_end,
        payload_len = payload.len(),
        "parsed signed container"
    );

    Ok(SignedContainer {
        certificate_pem,
        signature,
        payload,
        declared_filename: declared_filename(filename).to_string(),
    })
}

/// Build a signed container: newline-terminated PEM, signature, payload.
pub fn build(certificate_pem: &str, signature: &[u8; SIGNATURE_SIZE], payload: &[u8]) -> Vec<u8> {
    let pem = certificate_pem.trim();

    let mut out = Vec::with_capacity(pem.len() + 1 + SIGNATURE_SIZE + payload.len());
    out.extend_from_slice(pem.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(signature);
    out.extend_from_slice(payload);
    out
}

/// Strip the container suffix, if present.
pub fn declared_filename(filename: &str) -> &str {
    filename.strip_suffix(CONTAINER_SUFFIX).unwrap_or(filename)
}

/// Append the container suffix unless already present.
pub fn signed_filename(filename: &str) -> String {
    if is_container_name(filename) {
        filename.to_string()
    } else {
        format!("{filename}{CONTAINER_SUFFIX}")
    }
}

/// Whether a filename carries the container suffix.
pub fn is_container_name(filename: &str) -> bool {
    filename.ends_with(CONTAINER_SUFFIX)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}
