//! HTTP request handlers.

pub mod health;
pub mod images;
pub mod stats;

pub use health::*;
pub use images::*;
pub use stats::*;
