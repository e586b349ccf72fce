//! shellmux - run many commands over one interactive shell channel
//!
//! A [`Shell`] takes a single channel on a [`Transport`], requests a
//! pseudo-terminal with echo disabled, starts a shell and redefines its
//! prompt so that every prompt is a line `<marker> <last exit status>`. Queued
//! commands then run one at a time on that channel; each command's output is
//! everything up to the next marker line, and the number after the marker is
//! its exit status.
//!
//! ## Module Organization
//!
//! - [`channel`] - Transport boundary and the channel handshake state machine
//! - [`shell`] - The session: channel ownership, command queue, event loop
//! - [`process`] - Queued commands, their handles and the marker scanner
//! - [`marker`] - Generation of the unique prompt marker
//! - [`config`] - Session configuration and config file loading
//! - [`pty`] - A transport running shells in local pseudoterminals
//! - [`mod@error`] - Error types and Result aliases
//!
//! ## Quick Start
//!
//! ```no_run
//! use shellmux::{LocalPtyTransport, Shell};
//!
//! # async fn run() -> shellmux::Result<()> {
//! let mut shell = Shell::new(LocalPtyTransport::new());
//!
//! shell.execute_default("uname -a").await?;
//! let status = shell
//!     .execute_and_wait("ls /nonexistent", |_, out| print!("{}", out))
//!     .await?;
//! assert_ne!(status, 0);
//!
//! shell.wait_all().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! A session is a single logical flow: output handlers run synchronously
//! inside whichever driving call the caller is awaiting. The local PTY
//! transport reads and writes the terminal on background threads and hands
//! events over through a `tokio::mpsc` channel.

#![allow(unexpected_cfgs)]

#[macro_use]
extern crate tracing;

pub mod channel;
pub mod config;
pub mod error;
pub mod marker;
pub mod process;
pub mod pty;
pub mod shell;

// Re-exports for core functionality
pub use channel::{ChannelEvent, ChannelId, ChannelState, PtyRequest, TerminalMode, Transport};
pub use config::{ClosePolicy, ShellConfig, ShellProgram};
pub use error::{Error, Result, SetupStage};
pub use marker::MarkerGenerator;
pub use process::{
    ProcessBuilder, ProcessHandle, ProcessKind, ProcessState, ProcessStatus, CHANNEL_CLOSED_STATUS,
};
pub use pty::LocalPtyTransport;
pub use shell::{Shell, ShellExt};

// Convenience re-exports for common types
pub use config::loader::ConfigLoader;

// Version information
/// The current version of shellmux from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The crate name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Load the session configuration.
///
/// An explicit path must exist and parse. Without one the default search
/// paths are tried, falling back to the built-in defaults when nothing is
/// found or the file found is unusable.
pub fn load_config(path: Option<&std::path::Path>) -> Result<ShellConfig> {
    match path {
        Some(path) => {
            let mut loader = ConfigLoader::new();
            let config = loader.load_from_path(path)?;
            ConfigLoader::validate_config(&config)?;
            info!("Configuration loaded from {}", path.display());
            Ok(config)
        }
        None => match ConfigLoader::load() {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("Failed to load configuration: {}. Using defaults", e);
                Ok(ShellConfig::default())
            }
        },
    }
}

/// Human readable explanation for errors that stop the command line tool
pub fn describe_error(error: &Error) -> String {
    match error {
        Error::ConfigLoadFailed { path, reason } => format!(
            "Configuration Error: Failed to load config from '{}': {}\n\nTry:\n• Check the path\n• Ensure file permissions are correct",
            path.display(),
            reason
        ),
        Error::ConfigParseFailed { format, reason } => format!(
            "Configuration Error: Failed to parse {} config: {}\n\nTry:\n• Check configuration file syntax",
            format, reason
        ),
        Error::ConfigValidationFailed { field, reason } => format!(
            "Configuration Error: Validation failed for '{}': {}",
            field, reason
        ),
        Error::SetupFailed { stage, .. } => format!(
            "Session Error: {}\n\nThe {} step was refused; nothing was run.",
            error, stage
        ),
        Error::CommandSpawnFailed { command, reason } => format!(
            "Shell Error: could not start {}: {}\n\nTry:\n• Pass a different shell with --shell",
            command, reason
        ),
        _ => format!("Error: {}", error),
    }
}
