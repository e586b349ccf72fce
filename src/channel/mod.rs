//! Channel Management
//!
//! The transport boundary and the handshake state machine for the single
//! channel a shell session runs on.

pub mod state;
pub mod transport;

// Re-exports for convenience
pub use state::{transition, Action, ChannelState, Trigger};
pub use transport::{ChannelEvent, ChannelId, PtyRequest, TerminalMode, Transport};
