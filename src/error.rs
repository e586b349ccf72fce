//! Error types and Result aliases for shellmux

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for shellmux operations
pub type Result<T> = std::result::Result<T, Error>;

/// Handshake stage at which a shell session failed to come up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    /// The transport refused to open the channel
    ChannelOpen,
    /// The pseudo-terminal request was rejected
    PtyRequest,
    /// The shell or exec request was rejected
    ShellRequest,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupStage::ChannelOpen => "channel open",
            SetupStage::PtyRequest => "pty request",
            SetupStage::ShellRequest => "shell request",
        };
        f.write_str(name)
    }
}

/// Main error type for shellmux
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // === Session errors ===
    /// The channel handshake failed; the session is back to `Closed`
    #[error("Could not set up shell channel ({stage}): {detail}{}", .code.map(|c| format!(" (#{})", c)).unwrap_or_default())]
    SetupFailed {
        stage: SetupStage,
        code: Option<u32>,
        detail: String,
    },

    /// An operation needed a channel but none is open
    #[error("No channel is open")]
    ChannelNotOpen,

    /// The channel closed before the awaited condition held
    #[error("Shell channel closed")]
    ChannelClosed,

    /// The transport stopped delivering events
    #[error("Transport closed while waiting for shell events")]
    TransportClosed,

    /// The transport reported a failure
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    /// A process other than the queue head tried to finish
    #[error("Process '{id}' is not at the head of the queue")]
    NotQueueHead { id: String },

    /// A bounded wait ran out of time
    #[error("Timed out after {duration:?}")]
    Timeout { duration: Duration },

    // === Local PTY errors ===
    /// Failed to create PTY
    #[error("Failed to create PTY for command '{command}': {reason}")]
    PtyCreationFailed { command: String, reason: String },

    /// Failed to spawn command in PTY
    #[error("Failed to spawn command '{command}': {reason}")]
    CommandSpawnFailed { command: String, reason: String },

    /// Failed to write to the PTY
    #[error("Failed to write to PTY: {reason}")]
    PtyWriteFailed { reason: String },

    // === Configuration errors ===
    /// Failed to load configuration file
    #[error("Failed to load config from '{}': {reason}", .path.display())]
    ConfigLoadFailed { path: PathBuf, reason: String },

    /// Failed to save configuration file
    #[error("Failed to save config to '{}': {reason}", .path.display())]
    ConfigSaveFailed { path: PathBuf, reason: String },

    /// Configuration file not found
    #[error("Configuration file not found")]
    ConfigNotFound,

    /// Configuration validation failed
    #[error("Configuration validation failed for '{field}': {reason}")]
    ConfigValidationFailed { field: String, reason: String },

    /// Failed to serialize configuration
    #[error("Failed to serialize config as {format}: {reason}")]
    ConfigSerializationFailed { format: String, reason: String },

    /// Failed to parse configuration
    #[error("Failed to parse {format} config: {reason}")]
    ConfigParseFailed { format: String, reason: String },

    // === I/O and library errors ===
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Regex compilation errors
    #[error("Regex compilation error: {0}")]
    Regex(#[from] regex::Error),

    /// Generic errors (for cases not yet categorized)
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Whether this error ended the session handshake
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, Error::SetupFailed { .. })
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Other(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Other(err.to_string())
    }
}
