//! Pseudoterminal (PTY) Transport
//!
//! Local shell channels backed by portable-pty, for running a session on
//! this machine.

pub mod process;
pub mod transport;

// Re-exports for convenience
pub use process::{default_shell, FALLBACK_SHELL};
pub use transport::LocalPtyTransport;
