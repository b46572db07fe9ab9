//! Content digests for compile-cache keying.

/// Compute the BLAKE3 digest of module source bytes, hex-encoded.
///
/// Used as the validation half of compile-cache keys: the cache is keyed by
/// resolved identity and an entry is only served while the digest of the
/// freshly loaded source still matches.
#[must_use]
pub fn source_digest(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Check whether `data` still hashes to a previously recorded digest.
#[must_use]
pub fn digest_matches(data: &[u8], expected: &str) -> bool {
    source_digest(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_digest_stable() {
        let a = source_digest(b"export const x = 1;");
        let b = source_digest(b"export const x = 1;");
        assert_eq!(a, b);
    }

    #[test]
    fn test_source_digest_differs() {
        let a = source_digest(b"export const x = 1;");
        let b = source_digest(b"export const x = 2;");
        assert_ne!(a, b);
    }

    #[test]
    fn test_digest_matches() {
        let digest = source_digest(b"module.exports = 1;");
        assert!(digest_matches(b"module.exports = 1;", &digest));
        assert!(!digest_matches(b"module.exports = 2;", &digest));
    }
}
