//! Core domain types for the darkroom image derivative cache.
//!
//! This crate defines the data model shared by the other crates:
//! - Size variants and their configured widths
//! - URL digests and derivative storage keys
//! - Application configuration

pub mod config;
pub mod error;
pub mod hash;
pub mod key;
pub mod variant;

pub use error::{Error, Result};
pub use hash::UrlHash;
pub use key::DerivativeKey;
pub use variant::{Variant, VariantSpec};
