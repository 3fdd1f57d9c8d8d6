//! Chunked SHA-256.
//!
//! Payloads are hashed in bounded chunks so arbitrarily large downloads
//! never feed the hasher in one call. The digest is independent of the
//! chunk size.

use std::io::Read;

use sha2::{Digest, Sha256};

use crate::error::GateResult;

/// SHA-256 output length in bytes.
pub const SHA256_LEN: usize = 32;

/// Chunk size used when hashing payloads (1 MiB).
pub const DIGEST_CHUNK_SIZE: usize = 1024 * 1024;

/// SHA-256 over `bytes`, fed to the hasher `DIGEST_CHUNK_SIZE` bytes at a time.
pub fn sha256(bytes: &[u8]) -> [u8; SHA256_LEN] {
    sha256_chunked(bytes, DIGEST_CHUNK_SIZE)
}

/// SHA-256 over `bytes` with an explicit chunk size (zero is treated as one).
pub fn sha256_chunked(bytes: &[u8], chunk_size: usize) -> [u8; SHA256_LEN] {
    let mut hasher = Sha256::new();
    for chunk in bytes.chunks(chunk_size.max(1)) {
        hasher.update(chunk);
    }
    finish(hasher)
}

/// SHA-256 over everything a reader yields.
pub fn sha256_reader<R: Read>(mut reader: R) -> GateResult<[u8; SHA256_LEN]> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0_u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(finish(hasher))
}

/// Lower-case hex digest with the `sha256:` prefix, for logs and reports.
pub fn sha256_hex(bytes: &[u8]) -> String {
    digest_hex(&sha256(bytes))
}

/// `sha256:<hex>` form of a finished digest.
pub fn digest_hex(digest: &[u8; SHA256_LEN]) -> String {
    format!("sha256:{}", hex::encode(digest))
}

fn finish(hasher: Sha256) -> [u8; SHA256_LEN] {
    let out = hasher.finalize();
    let mut digest = [0_u8; SHA256_LEN];
    digest.copy_from_slice(&out);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct ChunkedReader<'a> {
        data: &'a [u8],
        pos: usize,
        max_chunk: usize,
    }

    impl<'a> Read for ChunkedReader<'a> {
        fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.data.len() {
                return Ok(0);
            }
            let n = out
                .len()
                .min(self.max_chunk)
                .min(self.data.len().saturating_sub(self.pos));
            out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn single_pass(bytes: &[u8]) -> [u8; SHA256_LEN] {
        let mut digest = [0_u8; SHA256_LEN];
        digest.copy_from_slice(&Sha256::digest(bytes));
        digest
    }

    #[test]
    fn test_empty_payload_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_chunked_matches_single_pass_across_sizes() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect();

        for len in [0, 1, 63, 64, 65, 4096, 10_000] {
            let data = &payload[..len];
            let expected = single_pass(data);
            for chunk in [1, 3, 64, 1000, DIGEST_CHUNK_SIZE] {
                assert_eq!(
                    sha256_chunked(data, chunk),
                    expected,
                    "len={len} chunk={chunk}"
                );
            }
        }
    }

    #[test]
    fn test_payload_larger_than_one_chunk() {
        let payload = vec![0x5a_u8; DIGEST_CHUNK_SIZE + 17];
        assert_eq!(sha256(&payload), single_pass(&payload));
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        assert_eq!(sha256_chunked(b"abc", 0), single_pass(b"abc"));
    }

    #[test]
    fn test_reader_chunked_stream_parity() {
        let payload = b"abcdefghijklmnopqrstuvwxyz0123456789";
        let chunked = ChunkedReader {
            data: payload,
            pos: 0,
            max_chunk: 3,
        };
        let from_chunked = sha256_reader(chunked).expect("chunked reader hashing");
        let from_cursor = sha256_reader(Cursor::new(payload)).expect("cursor hashing");
        assert_eq!(from_chunked, sha256(payload));
        assert_eq!(from_cursor, sha256(payload));
    }

    #[test]
    fn test_reader_error_is_io() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk gone"))
            }
        }

        let err = sha256_reader(Broken).unwrap_err();
        assert!(matches!(err, crate::error::GateError::Io(_)), "{err}");
    }

    #[test]
    fn test_hex_shape() {
        let digest = sha256_hex(b"payload");
        assert!(digest.starts_with("sha256:"));
        assert_eq!(digest.len(), 7 + 64);
    }
}
