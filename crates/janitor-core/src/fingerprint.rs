//! Cheap file fingerprint used as the extraction-cache key.
//!
//! The fingerprint covers the file size and the first 8 KiB of content only.
//! Two files with the same size and the same leading 8 KiB but a different
//! tail collide; this is accepted and not detected.

use sha2::{Digest, Sha256};

/// Number of leading bytes that participate in the fingerprint.
pub const FINGERPRINT_PREFIX_BYTES: usize = 8 * 1024;

/// Computes the fingerprint of a file from its full contents.
pub fn fingerprint(bytes: &[u8]) -> String {
    fingerprint_parts(bytes.len() as u64, bytes)
}

/// Computes the fingerprint from a known size and (at least) the file prefix.
///
/// Only the first [`FINGERPRINT_PREFIX_BYTES`] of `head` are hashed, so callers
/// streaming large files need not read past the prefix.
pub fn fingerprint_parts(size: u64, head: &[u8]) -> String {
    let prefix = &head[..head.len().min(FINGERPRINT_PREFIX_BYTES)];
    let digest = Sha256::digest(prefix);
    format!("{:016x}-{}", size, hex::encode(&digest[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_share_fingerprint() {
        let a = b"%PDF-1.7 scanned".to_vec();
        assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
    }

    #[test]
    fn size_participates_in_fingerprint() {
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abcd"));
    }

    #[test]
    fn tail_beyond_prefix_is_ignored() {
        let mut a = vec![7u8; FINGERPRINT_PREFIX_BYTES + 100];
        let mut b = a.clone();
        a[FINGERPRINT_PREFIX_BYTES + 50] = 1;
        b[FINGERPRINT_PREFIX_BYTES + 50] = 2;
        // Same size, same prefix, different tail: a known collision.
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn prefix_difference_changes_fingerprint() {
        let a = vec![0u8; 100];
        let mut b = a.clone();
        b[10] = 1;
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn parts_match_full_computation() {
        let data = vec![42u8; FINGERPRINT_PREFIX_BYTES * 3];
        assert_eq!(
            fingerprint(&data),
            fingerprint_parts(data.len() as u64, &data[..FINGERPRINT_PREFIX_BYTES])
        );
    }
}
