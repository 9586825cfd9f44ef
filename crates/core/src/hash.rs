//! URL digests used to address cached images.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest of an origin URL string.
///
/// Identity is URL-based: two URLs serving identical bytes get distinct hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UrlHash([u8; 32]);

impl UrlHash {
    /// Create a new UrlHash from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hash an origin URL.
    pub fn of_url(url: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != 64 {
            return Err(crate::Error::InvalidHash(format!(
                "expected 64 hex chars, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex_str =
                std::str::from_utf8(chunk).map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
            bytes[i] = u8::from_str_radix(hex_str, 16)
                .map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
        }
        Ok(Self(bytes))
    }

    /// Encode as lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for UrlHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UrlHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for UrlHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_hash_is_stable_hex() {
        let hash = UrlHash::of_url("https://example.com/a.png");
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(UrlHash::from_hex(&hex).unwrap(), hash);
        assert_eq!(UrlHash::of_url("https://example.com/a.png"), hash);
    }

    #[test]
    fn test_url_hash_known_vector() {
        // sha256("abc")
        assert_eq!(
            UrlHash::of_url("abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_distinct_urls_distinct_hashes() {
        assert_ne!(
            UrlHash::of_url("https://a.example/img.png"),
            UrlHash::of_url("https://b.example/img.png")
        );
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(UrlHash::from_hex("abc").is_err());
        assert!(UrlHash::from_hex(&"zz".repeat(32)).is_err());
    }
}
