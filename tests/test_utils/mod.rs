//! Test Utilities and Mocks
//!
//! A scripted transport that plays the remote side of a shell channel, and
//! fixtures shared by the test binaries.

#![allow(dead_code)]

pub mod fixtures;
pub mod mock_transport;

// Re-exports for convenience
pub use fixtures::{collector, quiet_shell, test_generator, Collected};
pub use mock_transport::{Call, MockTransport, Reply};
