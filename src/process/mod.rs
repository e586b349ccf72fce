//! Queued Shell Processes
//!
//! A [`Process`] is one command waiting for, or using, the shared shell
//! channel. It owns its output callbacks and its completion scanner; the
//! caller keeps a [`ProcessHandle`] that stays valid after the process has
//! left the queue.

pub mod queue;
pub mod scanner;

use chrono::{DateTime, Local};
use std::fmt;
use std::io::Write;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use uuid::Uuid;

use crate::channel::{ChannelId, Transport};
use crate::error::Result;
use crate::shell::Shell;

pub use queue::ProcessQueue;
pub use scanner::{MarkerScanner, Scan};

/// Exit status reported when the real one could not be observed
pub const CHANNEL_CLOSED_STATUS: i32 = -1;

/// Callback receiving output text for a process
pub type OutputCallback = Box<dyn FnMut(ChannelId, &str) + Send>;

/// Flavour of a queued process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessKind {
    /// Plain command; output goes to stdout unless a callback is given
    #[default]
    Command,
    /// Command driving a nested shell; output is discarded unless a callback is given
    Subshell,
}

/// Lifecycle state of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessState {
    /// Waiting in the queue
    #[default]
    Pending,
    /// Head of the queue, attached to the channel
    Running,
    /// Completed, with a parsed or sentinel exit status
    Finished,
    /// Dropped from the queue without running
    Aborted,
}

impl ProcessState {
    /// Whether the process reached a terminal state
    pub fn is_done(self) -> bool {
        matches!(self, ProcessState::Finished | ProcessState::Aborted)
    }
}

/// Snapshot of a process as seen through its handle
#[derive(Debug, Clone, Default)]
pub struct ProcessStatus {
    /// Lifecycle state
    pub state: ProcessState,
    /// Exit status once the process is done
    pub exit_status: Option<i32>,
    /// When the process became the head of the queue
    pub started_at: Option<DateTime<Local>>,
    /// Time between start and completion
    pub execution_time: Option<Duration>,
}

/// Builder for a process before it is queued
pub struct ProcessBuilder {
    command: String,
    kind: ProcessKind,
    on_output: Option<OutputCallback>,
    on_stderr: Option<OutputCallback>,
}

impl ProcessBuilder {
    /// A plain command
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            kind: ProcessKind::Command,
            on_output: None,
            on_stderr: None,
        }
    }

    /// A command driving a nested shell
    pub fn subshell(command: impl Into<String>) -> Self {
        Self::new(command).kind(ProcessKind::Subshell)
    }

    /// Set the process kind
    pub fn kind(mut self, kind: ProcessKind) -> Self {
        self.kind = kind;
        self
    }

    /// Callback for output on the primary stream
    pub fn on_output<F>(mut self, callback: F) -> Self
    where
        F: FnMut(ChannelId, &str) + Send + 'static,
    {
        self.on_output = Some(Box::new(callback));
        self
    }

    /// Callback for output on the extended (stderr) stream
    pub fn on_stderr<F>(mut self, callback: F) -> Self
    where
        F: FnMut(ChannelId, &str) + Send + 'static,
    {
        self.on_stderr = Some(Box::new(callback));
        self
    }

    /// Build the process
    pub fn build(self) -> Process {
        let on_output = self.on_output.unwrap_or_else(|| default_callback(self.kind));
        let (status, _) = watch::channel(ProcessStatus::default());

        Process {
            id: Uuid::new_v4(),
            command: self.command,
            kind: self.kind,
            on_output,
            on_stderr: self.on_stderr,
            scanner: None,
            sent: false,
            started: None,
            status,
        }
    }
}

fn default_callback(kind: ProcessKind) -> OutputCallback {
    match kind {
        ProcessKind::Command => Box::new(|_channel, text| {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = stdout.write_all(text.as_bytes()).and_then(|_| stdout.flush()) {
                debug!("Failed to write process output to stdout: {}", e);
            }
        }),
        ProcessKind::Subshell => Box::new(|_channel, _text| {}),
    }
}

/// One command queued on a shell session
pub struct Process {
    id: Uuid,
    command: String,
    kind: ProcessKind,
    on_output: OutputCallback,
    on_stderr: Option<OutputCallback>,
    scanner: Option<MarkerScanner>,
    sent: bool,
    started: Option<Instant>,
    status: watch::Sender<ProcessStatus>,
}

impl Process {
    /// Unique id of the process
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The command line
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Process kind
    pub fn kind(&self) -> ProcessKind {
        self.kind
    }

    /// Current lifecycle state
    pub fn state(&self) -> ProcessState {
        self.status.borrow().state
    }

    /// Exit status, once done
    pub fn exit_status(&self) -> Option<i32> {
        self.status.borrow().exit_status
    }

    /// Whether the command line has been written to the channel
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// A handle observing this process
    pub fn handle(&self) -> ProcessHandle {
        ProcessHandle {
            id: self.id,
            command: self.command.clone(),
            kind: self.kind,
            status: self.status.subscribe(),
        }
    }

    /// The bytes to write to the channel to run the command
    pub fn command_line(&self) -> String {
        format!("{}\n", self.command)
    }

    /// Move from pending to running and arm the completion scanner
    pub fn start(&mut self, marker: &str, lookback: bool) -> Result<()> {
        if self.state() != ProcessState::Pending {
            return Ok(());
        }

        self.scanner = Some(MarkerScanner::new(marker, lookback)?);
        self.started = Some(Instant::now());
        self.status.send_modify(|status| {
            status.state = ProcessState::Running;
            status.started_at = Some(Local::now());
        });
        debug!("Process {} started: {}", self.id, self.command);
        Ok(())
    }

    /// Record that the command line was written
    pub fn mark_sent(&mut self) {
        self.sent = true;
    }

    /// Handle bytes from the primary stream. Returns the exit status when the
    /// completion line was found.
    pub fn on_data(&mut self, channel: ChannelId, data: &[u8]) -> Option<i32> {
        if self.state() != ProcessState::Running {
            return None;
        }
        let scan = self.scanner.as_mut()?.feed(data);

        match scan {
            Scan::Output(text) => {
                if !text.is_empty() {
                    (self.on_output)(channel, &text);
                }
                None
            }
            Scan::Complete { output, status } => {
                if !output.is_empty() {
                    (self.on_output)(channel, &output);
                }
                let status = status.unwrap_or_else(|| {
                    warn!(
                        "Unparseable exit status for '{}', using {}",
                        self.command, CHANNEL_CLOSED_STATUS
                    );
                    CHANNEL_CLOSED_STATUS
                });
                self.finish(status);
                Some(status)
            }
        }
    }

    /// Handle bytes from an extended stream
    pub fn on_extended_data(&mut self, channel: ChannelId, data_type: u32, data: &[u8]) {
        let text = String::from_utf8_lossy(data);
        match self.on_stderr.as_mut() {
            Some(callback) => callback(channel, &text),
            None => warn!("[stderr:{}] {} {:?}", data_type, self.command, text),
        }
    }

    /// The channel closed under this process. Returns true if this finished it.
    pub fn on_close(&mut self, channel: ChannelId) -> bool {
        if self.state() != ProcessState::Running {
            return false;
        }

        if let Some(scanner) = self.scanner.as_mut() {
            let rest = scanner.flush();
            if !rest.is_empty() {
                (self.on_output)(channel, &rest);
            }
        }
        debug!("Channel closed while '{}' was running", self.command);
        self.finish(CHANNEL_CLOSED_STATUS)
    }

    /// Complete the process. Only the first call has an effect.
    pub fn finish(&mut self, exit_status: i32) -> bool {
        if self.state().is_done() {
            return false;
        }

        let execution_time = self.started.map(|started| started.elapsed());
        self.status.send_modify(|status| {
            status.state = ProcessState::Finished;
            status.exit_status = Some(exit_status);
            status.execution_time = execution_time;
        });
        true
    }

    /// Drop the process without running it
    pub fn abort(&mut self) -> bool {
        if self.state().is_done() {
            return false;
        }

        self.status.send_modify(|status| {
            status.state = ProcessState::Aborted;
            status.exit_status = Some(CHANNEL_CLOSED_STATUS);
        });
        true
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("sent", &self.sent)
            .finish()
    }
}

/// Caller-side view of a queued process
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    id: Uuid,
    command: String,
    kind: ProcessKind,
    status: watch::Receiver<ProcessStatus>,
}

impl ProcessHandle {
    /// Unique id of the process
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The command line
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Process kind
    pub fn kind(&self) -> ProcessKind {
        self.kind
    }

    /// Current lifecycle state
    pub fn state(&self) -> ProcessState {
        self.status.borrow().state
    }

    /// True until an exit status is known
    pub fn is_running(&self) -> bool {
        self.exit_status().is_none()
    }

    /// Exit status, once known
    pub fn exit_status(&self) -> Option<i32> {
        self.status.borrow().exit_status
    }

    /// Time the process spent at the head of the queue
    pub fn execution_time(&self) -> Option<Duration> {
        self.status.borrow().execution_time
    }

    /// Full status snapshot
    pub fn status(&self) -> ProcessStatus {
        self.status.borrow().clone()
    }

    /// Drive `shell` until this process has an exit status
    pub async fn wait<T: Transport>(&self, shell: &mut Shell<T>) -> Result<i32> {
        shell.drive_until(|_| !self.is_running()).await?;
        Ok(self.exit_status().unwrap_or(CHANNEL_CLOSED_STATUS))
    }
}
