//! Common test utilities for slack-export-enrich integration tests

#[allow(dead_code)]
pub mod archives;
#[allow(dead_code)]
pub mod clock;

#[allow(unused_imports)]
pub use archives::*;
#[allow(unused_imports)]
pub use clock::*;
