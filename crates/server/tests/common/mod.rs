//! Common test utilities and fixtures.

pub mod cache;
pub mod fixtures;
pub mod metadata;
pub mod mocks;
pub mod server;
pub mod storage;

#[allow(unused_imports)]
pub use cache::*;
#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use metadata::*;
#[allow(unused_imports)]
pub use mocks::*;
#[allow(unused_imports)]
pub use server::*;
#[allow(unused_imports)]
pub use storage::*;
