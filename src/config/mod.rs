//! Configuration management for shellmux
//!
//! Session settings (which program runs on the channel, the pseudo-terminal
//! that is requested, the prompt variable carrying the marker and what happens
//! when the channel closes under queued work), with loading and saving
//! handled by [`loader::ConfigLoader`].

pub mod loader;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::channel::{PtyRequest, TerminalMode};

pub use loader::{ConfigFormat, ConfigLoader, LoadOptions};

/// Main configuration structure for a shell session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Program run on the channel
    #[serde(skip_serializing_if = "ShellProgram::is_default")]
    pub shell: ShellProgram,

    /// Pseudo-terminal settings
    pub pty: PtyConfig,

    /// Prompt settings
    pub prompt: PromptConfig,

    /// Queue and channel behaviour
    pub session: SessionConfig,
}

impl ShellConfig {
    /// Configuration running `program` through an exec request
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            shell: ShellProgram::Program(program.into()),
            ..Self::default()
        }
    }
}

/// What the channel runs once the pseudo-terminal is granted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum ShellProgram {
    /// The remote user's interactive shell
    #[default]
    Default,
    /// A specific program started through an exec request
    Program(String),
}

impl ShellProgram {
    /// Whether this is the interactive default shell
    pub fn is_default(&self) -> bool {
        matches!(self, ShellProgram::Default)
    }

    /// The program, if one was given
    pub fn program(&self) -> Option<&str> {
        match self {
            ShellProgram::Default => None,
            ShellProgram::Program(program) => Some(program),
        }
    }
}

impl From<Option<String>> for ShellProgram {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(program) if !program.trim().is_empty() => ShellProgram::Program(program),
            _ => ShellProgram::Default,
        }
    }
}

impl From<ShellProgram> for Option<String> {
    fn from(value: ShellProgram) -> Self {
        match value {
            ShellProgram::Default => None,
            ShellProgram::Program(program) => Some(program),
        }
    }
}

impl fmt::Display for ShellProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellProgram::Default => f.write_str("default shell"),
            ShellProgram::Program(program) => f.write_str(program),
        }
    }
}

/// PTY-specific configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PtyConfig {
    /// TERM value announced with the request
    pub term: String,

    /// Terminal width
    pub cols: u32,

    /// Terminal height
    pub rows: u32,

    /// Keep local echo on; the marker protocol expects it off
    pub echo: bool,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            term: "xterm".to_string(),
            cols: 80,
            rows: 24,
            echo: false,
        }
    }
}

impl PtyConfig {
    /// Build the channel request for these settings
    pub fn to_request(&self) -> PtyRequest {
        PtyRequest {
            term: self.term.clone(),
            cols: self.cols,
            rows: self.rows,
            modes: vec![(TerminalMode::Echo, u32::from(self.echo))],
        }
    }
}

/// Prompt configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Shell variable redefined to print the marker
    pub variable: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            variable: "PS1".to_string(),
        }
    }
}

impl PromptConfig {
    /// The line that makes every prompt read `<marker> <last status>`.
    ///
    /// The prompt ends in a newline. With marker lookback on, a status at the
    /// very end of a chunk is only accepted once the byte after it arrives,
    /// so a prompt without a terminator would never complete a command.
    pub fn install_command(&self, marker: &str) -> String {
        format!("export {}='{} $?\\n'\n", self.variable, marker)
    }
}

/// What to do with queued work when the channel closes unexpectedly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosePolicy {
    /// Start the next queued command, reopening the channel
    #[default]
    Reopen,
    /// Abort every queued command
    FailPending,
}

/// Session behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Policy applied after an unexpected close
    pub on_close: ClosePolicy,

    /// Hold back trailing bytes that may start a marker split across chunks
    pub marker_lookback: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            on_close: ClosePolicy::Reopen,
            marker_lookback: true,
        }
    }
}
