use sha2::{Digest, Sha256};

/// A deterministic content hash.
///
/// The same input yields the same digest on every run and every instance.
pub trait Hasher: Send + Sync + 'static {
    fn digest(&self, input: &[u8]) -> [u8; 32];
}

/// SHA-256 content hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn digest(&self, input: &[u8]) -> [u8; 32] {
        Sha256::digest(input).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        let digest = Sha256Hasher.digest(b"hello");
        assert_eq!(
            digest[..4],
            [0x2c, 0xf2, 0x4d, 0xba],
            "sha256(\"hello\") starts with 2cf24dba"
        );
    }

    #[test]
    fn digest_is_deterministic() {
        let a = Sha256Hasher.digest(b"https://example.com/a");
        let b = Sha256Hasher.digest(b"https://example.com/a");
        assert_eq!(a, b);
    }
}
