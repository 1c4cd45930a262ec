//! Discovery key derivation
//!
//! Peers meeting under the same rendezvous string publish and query the
//! provider directory under a SHA-256 digest of that string. The digest is
//! safe to expose as a public lookup handle, but human-chosen rendezvous
//! strings are guessable; use a high-entropy string to keep a group private.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a discovery key in bytes
pub const KEY_LENGTH: usize = 32;

/// Fixed-size lookup key derived from a rendezvous string
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscoveryKey([u8; KEY_LENGTH]);

impl DiscoveryKey {
    /// Derive the key for a rendezvous string
    pub fn derive(rendezvous: &str) -> Self {
        let digest = Sha256::digest(rendezvous.as_bytes());
        Self(digest.into())
    }

    /// Wrap raw key bytes (e.g. received from the directory)
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    /// Lowercase hex encoding of the key
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for DiscoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DiscoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable
        write!(f, "DiscoveryKey({}..)", &self.to_hex()[..12])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_derive_is_deterministic() {
        let a = DiscoveryKey::derive("meet-me-at-the-fountain");
        let b = DiscoveryKey::derive("meet-me-at-the-fountain");
        assert_eq!(a, b);
    }

    #[test]
    fn test_known_digest() {
        // sha256("abc")
        assert_eq!(
            DiscoveryKey::derive("abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_distinct_strings_give_distinct_keys() {
        let samples = [
            "a",
            "b",
            "A",
            "a ",
            " a",
            "rendezvous",
            "rendezvouS",
            "6f1c0f7e-0b3a-4f38-9d8e-3c2d1a5b7e90",
            "6f1c0f7e-0b3a-4f38-9d8e-3c2d1a5b7e91",
            "the quick brown fox",
            "the quick brown fox.",
            "\u{00e9}",
            "e\u{0301}",
        ];

        let keys: HashSet<DiscoveryKey> = samples.iter().map(|s| DiscoveryKey::derive(s)).collect();
        assert_eq!(keys.len(), samples.len());
    }

    #[test]
    fn test_generated_sample_has_no_collisions() {
        let keys: HashSet<DiscoveryKey> = (0..1000)
            .map(|i| DiscoveryKey::derive(&format!("room-{}", i)))
            .collect();
        assert_eq!(keys.len(), 1000);
    }

    #[test]
    fn test_key_does_not_contain_rendezvous_text() {
        let key = DiscoveryKey::derive("secret-room");
        assert!(!key.to_hex().contains("secret"));
        assert_eq!(key.as_bytes().len(), KEY_LENGTH);
    }

    #[test]
    fn test_from_bytes_roundtrip() {
        let key = DiscoveryKey::derive("room");
        assert_eq!(DiscoveryKey::from_bytes(*key.as_bytes()), key);
    }
}
