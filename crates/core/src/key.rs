//! Derivative keys and their storage key layout.

use crate::hash::UrlHash;
use crate::variant::Variant;
use std::fmt;

/// Extension used for every stored object.
///
/// Fixed so the key is known before any bytes have been fetched.
pub const OBJECT_EXTENSION: &str = "jpg";

/// Identifies one cached object: (url hash, variant).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DerivativeKey {
    pub hash: UrlHash,
    pub variant: Variant,
}

impl DerivativeKey {
    pub fn new(hash: UrlHash, variant: Variant) -> Self {
        Self { hash, variant }
    }

    /// Key for an origin URL and variant.
    pub fn for_url(url: &str, variant: Variant) -> Self {
        Self::new(UrlHash::of_url(url), variant)
    }

    /// The untouched original of the same source image.
    pub fn original(&self) -> Self {
        Self::new(self.hash, Variant::Original)
    }

    /// Storage key: `<variant>/<hash>.jpg`.
    pub fn storage_key(&self) -> String {
        format!("{}/{}.{}", self.variant, self.hash.to_hex(), OBJECT_EXTENSION)
    }

    /// Parse a storage key produced by [`DerivativeKey::storage_key`].
    pub fn from_storage_key(key: &str) -> crate::Result<Self> {
        let invalid = || crate::Error::InvalidKey(key.to_string());
        let (variant, file) = key.split_once('/').ok_or_else(invalid)?;
        let hex = file
            .strip_suffix(OBJECT_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))
            .ok_or_else(invalid)?;
        let variant = variant.parse().map_err(|_| invalid())?;
        let hash = UrlHash::from_hex(hex).map_err(|_| invalid())?;
        Ok(Self::new(hash, variant))
    }
}

impl fmt::Display for DerivativeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_layout() {
        let key = DerivativeKey::for_url("abc", Variant::Thumbnail);
        assert_eq!(
            key.storage_key(),
            "thumbnail/ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad.jpg"
        );
    }

    #[test]
    fn test_original_shares_hash() {
        let key = DerivativeKey::for_url("https://example.com/x.png", Variant::Medium);
        let original = key.original();
        assert_eq!(original.hash, key.hash);
        assert_eq!(original.variant, Variant::Original);
        assert!(original.storage_key().starts_with("original/"));
    }

    #[test]
    fn test_from_storage_key() {
        let key = DerivativeKey::for_url("https://example.com/x.png", Variant::Full);
        assert_eq!(DerivativeKey::from_storage_key(&key.storage_key()).unwrap(), key);

        assert!(DerivativeKey::from_storage_key("full").is_err());
        assert!(DerivativeKey::from_storage_key("huge/abc.jpg").is_err());
        assert!(DerivativeKey::from_storage_key(&format!("full/{}.png", "ab".repeat(32))).is_err());
    }
}
