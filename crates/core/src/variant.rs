//! Named size variants and their target widths.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A named output size derivation of a source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Thumbnail,
    Medium,
    Full,
    Original,
}

impl Variant {
    /// All variants, in ascending size order.
    pub const ALL: [Variant; 4] = [
        Variant::Thumbnail,
        Variant::Medium,
        Variant::Full,
        Variant::Original,
    ];

    /// The lowercase name used in URLs and storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Thumbnail => "thumbnail",
            Variant::Medium => "medium",
            Variant::Full => "full",
            Variant::Original => "original",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Variant::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| crate::Error::InvalidVariant(s.to_string()))
    }
}

/// Static mapping from variant to target width in pixels.
///
/// Width 0 means "no resize, pass through".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariantSpec {
    widths: BTreeMap<Variant, u32>,
}

impl VariantSpec {
    pub fn new(widths: BTreeMap<Variant, u32>) -> Self {
        Self { widths }
    }

    /// Target width for a configured variant, `None` if not configured.
    pub fn width(&self, variant: Variant) -> Option<u32> {
        self.widths.get(&variant).copied()
    }

    /// Resolve a variant name against the configured set.
    pub fn parse(&self, name: &str) -> crate::Result<Variant> {
        let variant: Variant = name.parse()?;
        if self.widths.contains_key(&variant) {
            Ok(variant)
        } else {
            Err(crate::Error::InvalidVariant(name.to_string()))
        }
    }

    /// Configured variants in ascending size order.
    pub fn variants(&self) -> impl Iterator<Item = Variant> + '_ {
        self.widths.keys().copied()
    }

    /// Whether the variant is served without decoding.
    pub fn is_passthrough(&self, variant: Variant) -> bool {
        variant == Variant::Original || self.width(variant) == Some(0)
    }
}
