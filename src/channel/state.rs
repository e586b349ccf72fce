//! Channel Lifecycle State Machine
//!
//! The handshake that turns a fresh channel into a marker-prompted shell
//! is a pure function of the current state and the trigger that arrived.
//! The session applies the returned [`Action`] to the transport.

use std::fmt;

use crate::error::SetupStage;

/// Lifecycle state of the shell channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// No channel
    #[default]
    Closed,
    /// Channel open requested, waiting for confirmation
    Opening,
    /// Pseudo-terminal requested
    PtyRequested,
    /// Shell or exec requested
    ShellRequested,
    /// Prompt redefinition sent, waiting for the first marker
    Initializing,
    /// Marker prompt active, commands can run
    Open,
}

impl ChannelState {
    /// Whether the handshake is in progress
    pub fn is_opening(self) -> bool {
        !matches!(self, ChannelState::Open | ChannelState::Closed)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Closed => "closed",
            ChannelState::Opening => "opening",
            ChannelState::PtyRequested => "pty_requested",
            ChannelState::ShellRequested => "shell_requested",
            ChannelState::Initializing => "initializing",
            ChannelState::Open => "open",
        };
        f.write_str(name)
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The caller asked for the shell to be opened
    OpenRequested,
    /// The transport confirmed the channel
    OpenConfirmed,
    /// The transport refused the channel
    OpenFailed { code: u32, description: String },
    /// The pending channel request succeeded
    RequestSucceeded,
    /// The pending channel request failed
    RequestFailed,
    /// Incoming data contained the marker
    MarkerSeen,
    /// The channel closed
    ChannelClosed,
}

/// Side effects the session performs after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do
    None,
    /// Ask the transport for a channel
    OpenChannel,
    /// Request a pseudo-terminal with echo disabled
    RequestPty,
    /// Request the interactive shell or execute the configured program
    StartShell,
    /// Redefine the prompt so it prints the marker and the last status
    InstallPrompt,
    /// The shell is ready; flush deferred work
    Ready,
    /// Forget the channel and finish the active process
    DropChannel,
    /// The handshake failed at the given stage
    Fail {
        stage: SetupStage,
        code: Option<u32>,
        detail: String,
    },
}

/// Compute the next state and the action for a trigger
pub fn transition(state: ChannelState, trigger: &Trigger) -> (ChannelState, Action) {
    use ChannelState as S;

    match (state, trigger) {
        (S::Closed, Trigger::OpenRequested) => (S::Opening, Action::OpenChannel),
        (_, Trigger::OpenRequested) => (state, Action::None),

        (S::Closed, Trigger::ChannelClosed) => (S::Closed, Action::None),
        (_, Trigger::ChannelClosed) => (S::Closed, Action::DropChannel),

        (S::Opening, Trigger::OpenConfirmed) => (S::PtyRequested, Action::RequestPty),
        (S::Opening, Trigger::OpenFailed { code, description }) => (
            S::Closed,
            Action::Fail {
                stage: SetupStage::ChannelOpen,
                code: Some(*code),
                detail: description.clone(),
            },
        ),

        (S::PtyRequested, Trigger::RequestSucceeded) => (S::ShellRequested, Action::StartShell),
        (S::PtyRequested, Trigger::RequestFailed) => (
            S::Closed,
            Action::Fail {
                stage: SetupStage::PtyRequest,
                code: None,
                detail: "could not request pty".to_string(),
            },
        ),

        (S::ShellRequested, Trigger::RequestSucceeded) => (S::Initializing, Action::InstallPrompt),
        (S::ShellRequested, Trigger::RequestFailed) => (
            S::Closed,
            Action::Fail {
                stage: SetupStage::ShellRequest,
                code: None,
                detail: "could not request shell".to_string(),
            },
        ),

        (S::Initializing, Trigger::MarkerSeen) => (S::Open, Action::Ready),

        _ => (state, Action::None),
    }
}
