//! Transport Boundary
//!
//! The session never talks to a connection directly. Everything it needs
//! from the outside world (opening a channel, issuing channel requests,
//! writing bytes and receiving channel events) goes through [`Transport`].

use async_trait::async_trait;
use std::fmt;

use crate::error::Result;

/// Identifier of a channel multiplexed over a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Events a transport delivers for a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel open request was accepted
    OpenConfirmed,
    /// The channel open request was refused
    OpenFailed { code: u32, description: String },
    /// The oldest outstanding channel request succeeded
    RequestSuccess,
    /// The oldest outstanding channel request failed
    RequestFailure,
    /// Bytes on the primary data stream
    Data(Vec<u8>),
    /// Bytes on an extended data stream (type 1 is stderr)
    ExtendedData { data_type: u32, data: Vec<u8> },
    /// The remote side will send no more data
    Eof,
    /// The channel is gone
    Close,
}

/// Terminal modes carried by a pseudo-terminal request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalMode {
    /// Local echo of input characters
    Echo,
}

impl TerminalMode {
    /// Opcode used for the mode in the SSH encoding of terminal modes
    pub fn opcode(self) -> u8 {
        match self {
            TerminalMode::Echo => 53,
        }
    }
}

/// Parameters of a pseudo-terminal request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    /// Value for the remote TERM variable
    pub term: String,
    /// Terminal width in characters
    pub cols: u32,
    /// Terminal height in rows
    pub rows: u32,
    /// Explicit terminal mode settings
    pub modes: Vec<(TerminalMode, u32)>,
}

impl PtyRequest {
    /// Value requested for a mode, if any
    pub fn mode(&self, mode: TerminalMode) -> Option<u32> {
        self.modes
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, value)| *value)
    }

    /// Whether the request turns local echo off
    pub fn disables_echo(&self) -> bool {
        self.mode(TerminalMode::Echo) == Some(0)
    }
}

impl Default for PtyRequest {
    fn default() -> Self {
        Self {
            term: "xterm".to_string(),
            cols: 80,
            rows: 24,
            modes: vec![(TerminalMode::Echo, 0)],
        }
    }
}

/// A connection able to carry interactive shell channels.
///
/// Requests are pipelined: the methods only send, and their outcomes
/// arrive later through [`Transport::next_event`]. Replies to channel
/// requests (`RequestSuccess` / `RequestFailure`) come back in the order
/// the requests were issued.
#[async_trait]
pub trait Transport: Send {
    /// Identifier of the remote host, used to seed the completion marker
    fn host(&self) -> &str;

    /// Request a new session channel
    async fn open_channel(&mut self) -> Result<ChannelId>;

    /// Request a pseudo-terminal on the channel
    async fn request_pty(&mut self, channel: ChannelId, request: &PtyRequest) -> Result<()>;

    /// Request the remote user's default interactive shell
    async fn request_shell(&mut self, channel: ChannelId) -> Result<()>;

    /// Request execution of a program on the channel
    async fn request_exec(&mut self, channel: ChannelId, command: &str) -> Result<()>;

    /// Write bytes to the channel's input stream
    async fn send_data(&mut self, channel: ChannelId, data: &[u8]) -> Result<()>;

    /// Ask for the channel to be closed
    async fn close_channel(&mut self, channel: ChannelId) -> Result<()>;

    /// Wait for the next channel event. `None` means the transport is gone.
    async fn next_event(&mut self) -> Result<Option<(ChannelId, ChannelEvent)>>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for &mut T {
    fn host(&self) -> &str {
        (**self).host()
    }

    async fn open_channel(&mut self) -> Result<ChannelId> {
        (**self).open_channel().await
    }

    async fn request_pty(&mut self, channel: ChannelId, request: &PtyRequest) -> Result<()> {
        (**self).request_pty(channel, request).await
    }

    async fn request_shell(&mut self, channel: ChannelId) -> Result<()> {
        (**self).request_shell(channel).await
    }

    async fn request_exec(&mut self, channel: ChannelId, command: &str) -> Result<()> {
        (**self).request_exec(channel, command).await
    }

    async fn send_data(&mut self, channel: ChannelId, data: &[u8]) -> Result<()> {
        (**self).send_data(channel, data).await
    }

    async fn close_channel(&mut self, channel: ChannelId) -> Result<()> {
        (**self).close_channel(channel).await
    }

    async fn next_event(&mut self) -> Result<Option<(ChannelId, ChannelEvent)>> {
        (**self).next_event().await
    }
}
