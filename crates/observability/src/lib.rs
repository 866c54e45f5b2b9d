//! Process-wide logging setup shared by binaries and integration tests.

pub mod tracing;

pub use tracing::{init, init_with_directive};
