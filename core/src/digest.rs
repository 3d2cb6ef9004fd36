//! Content digests for provenance records.
//!
//! `TaggedData.content_digest` is a digest, not necessarily the content
//! itself, so the provenance store never has to retain
//! potentially sensitive payloads.

use sha2::{Digest, Sha256};

#[must_use]
pub fn digest_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Minimal hex encoder so the crate does not need the separate `hex` crate
/// for one function.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        const CHARS: &[u8; 16] = b"0123456789abcdef";
        let bytes = bytes.as_ref();
        let mut out = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            out.push(CHARS[(b >> 4) as usize] as char);
            out.push(CHARS[(b & 0x0f) as usize] as char);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_same_digest() {
        assert_eq!(digest_hex("hello"), digest_hex("hello"));
    }

    #[test]
    fn different_content_different_digest() {
        assert_ne!(digest_hex("hello"), digest_hex("world"));
    }

    #[test]
    fn digest_is_64_hex_chars() {
        let d = digest_hex("x");
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
