//! Minimal DER reader for PKCS#1 `DigestInfo`.
//!
//! ```text
//! DigestInfo ::= SEQUENCE {
//!     digestAlgorithm  SEQUENCE { algorithm OBJECT IDENTIFIER, parameters NULL },
//!     digest           OCTET STRING
//! }
//! ```
//!
//! Only definite-length, minimally encoded, single-byte tags are accepted.
//! Anything else is a parse failure.

pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_SEQUENCE: u8 = 0x30;

/// DER encoding of OID 2.16.840.1.101.3.4.2.1 (id-sha256), contents only.
pub const OID_SHA256: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];

/// One tag-length-value element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tag: u8,
    pub value: &'a [u8],
}

/// Low-level DER errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerError {
    Truncated,
    UnsupportedTag,
    IndefiniteLength,
    NonMinimalLength,
    LengthOverflow,
    TrailingBytes,
}

/// Read one element from the front of `input`, returning it and the rest.
pub fn read_tlv(input: &[u8]) -> Result<(Tlv<'_>, &[u8]), DerError> {
    let (&tag, rest) = input.split_first().ok_or(DerError::Truncated)?;

    // High-tag-number form never appears in DigestInfo.
    if tag & 0x1f == 0x1f {
        return Err(DerError::UnsupportedTag);
    }

    let (&first, rest) = rest.split_first().ok_or(DerError::Truncated)?;

    let (len, rest) = if first < 0x80 {
        (first as usize, rest)
    } else if first == 0x80 {
        return Err(DerError::IndefiniteLength);
    } else {
        let count = (first & 0x7f) as usize;
        if count > std::mem::size_of::<usize>() {
            return Err(DerError::LengthOverflow);
        }
        if rest.len() < count {
            return Err(DerError::Truncated);
        }
        let (len_bytes, rest) = rest.split_at(count);
        if len_bytes[0] == 0 {
            return Err(DerError::NonMinimalLength);
        }
        let len = len_bytes
            .iter()
            .fold(0_usize, |acc, &b| (acc << 8) | b as usize);
        if len < 0x80 {
            return Err(DerError::NonMinimalLength);
        }
        (len, rest)
    };

    if rest.len() < len {
        return Err(DerError::Truncated);
    }
    let (value, rest) = rest.split_at(len);
    Ok((Tlv { tag, value }, rest))
}

/// Read exactly one element; trailing bytes are an error.
pub fn read_single(input: &[u8]) -> Result<Tlv<'_>, DerError> {
    let (tlv, rest) = read_tlv(input)?;
    if !rest.is_empty() {
        return Err(DerError::TrailingBytes);
    }
    Ok(tlv)
}

/// Split the contents of a constructed element into its children.
pub fn read_children(mut contents: &[u8]) -> Result<Vec<Tlv<'_>>, DerError> {
    let mut children = Vec::new();
    while !contents.is_empty() {
        let (tlv, rest) = read_tlv(contents)?;
        children.push(tlv);
        contents = rest;
    }
    Ok(children)
}

/// Encode a `DigestInfo` for SHA-256 (the fixed 19-byte prefix plus digest).
pub fn encode_sha256_digest_info(digest: &[u8; 32]) -> Vec<u8> {
    let mut out = vec![
        TAG_SEQUENCE,
        0x31,
        TAG_SEQUENCE,
        0x0d,
        TAG_OID,
        OID_SHA256.len() as u8,
    ];
    out.extend_from_slice(OID_SHA256);
    out.extend_from_slice(&[TAG_NULL, 0x00, TAG_OCTET_STRING, 0x20]);
    out.extend_from_slice(digest);
    out
}
