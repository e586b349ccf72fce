//! Shell Session
//!
//! [`Shell`] owns one channel on a [`Transport`], brings it up as an
//! interactive shell whose prompt prints a unique marker followed by the last
//! exit status, and runs queued commands on it one at a time.
//!
//! Nothing happens in the background. Transport events are only consumed
//! while the caller awaits one of the driving operations
//! ([`Shell::drive_until`], [`Shell::open_and_wait`], [`Shell::wait_all`],
//! [`ProcessHandle::wait`]).

use once_cell::sync::OnceCell;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::channel::{transition, Action, ChannelEvent, ChannelId, ChannelState, Transport, Trigger};
use crate::config::{ClosePolicy, ShellConfig, ShellProgram};
use crate::error::{Error, Result, SetupStage};
use crate::marker::MarkerGenerator;
use crate::process::{
    MarkerScanner, Process, ProcessBuilder, ProcessHandle, ProcessQueue, Scan,
    CHANNEL_CLOSED_STATUS,
};

/// A command queue running on a single interactive shell channel
pub struct Shell<T: Transport> {
    transport: T,
    config: ShellConfig,
    state: ChannelState,
    channel: Option<ChannelId>,
    marker: OnceCell<String>,
    marker_generator: MarkerGenerator,
    queue: ProcessQueue,
    attached: Option<Uuid>,
    /// Watches for the first marker prompt; everything before it is banner
    init_scanner: Option<MarkerScanner>,
}

impl<T: Transport> Shell<T> {
    /// Create a session with the default configuration
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ShellConfig::default())
    }

    /// Create a session with an explicit configuration
    pub fn with_config(transport: T, config: ShellConfig) -> Self {
        Self {
            transport,
            config,
            state: ChannelState::Closed,
            channel: None,
            marker: OnceCell::new(),
            marker_generator: MarkerGenerator::default(),
            queue: ProcessQueue::new(),
            attached: None,
            init_scanner: None,
        }
    }

    /// Replace the marker generator; only effective before the marker is first used
    pub fn with_marker_generator(mut self, generator: MarkerGenerator) -> Self {
        self.marker_generator = generator;
        self
    }

    // === Accessors ===

    /// Current channel state
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Whether commands can run right now
    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open
    }

    /// Whether there is no channel
    pub fn is_closed(&self) -> bool {
        self.state == ChannelState::Closed
    }

    /// Whether the channel handshake is in progress
    pub fn is_opening(&self) -> bool {
        self.state.is_opening()
    }

    /// The current channel, if any
    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    /// Program run on the channel
    pub fn program(&self) -> &ShellProgram {
        &self.config.shell
    }

    /// Session configuration
    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// The completion marker, generated on first access
    pub fn marker(&self) -> &str {
        self.marker
            .get_or_init(|| self.marker_generator.generate(self.transport.host()))
    }

    /// The underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give the transport back
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Handles for every queued process, head first
    pub fn processes(&self) -> Vec<ProcessHandle> {
        self.queue.handles()
    }

    /// The process currently attached to the channel
    pub fn attached_process(&self) -> Option<ProcessHandle> {
        let id = self.attached?;
        self.queue.iter().find(|p| p.id() == id).map(Process::handle)
    }

    // === Channel lifecycle ===

    /// Start the channel handshake. Does nothing unless the session is closed.
    pub async fn open(&mut self) -> Result<()> {
        self.apply(Trigger::OpenRequested).await
    }

    /// Open and drive the handshake until the shell is ready
    pub async fn open_and_wait(&mut self) -> Result<()> {
        self.open().await?;
        self.drive_until(|shell| !shell.is_opening()).await?;

        if self.is_open() {
            Ok(())
        } else {
            Err(Error::ChannelClosed)
        }
    }

    /// Ask the transport to close the channel. The close event finishes the
    /// attached process.
    pub async fn close(&mut self) -> Result<()> {
        match self.channel {
            Some(channel) => {
                debug!("Closing channel {}", channel);
                self.transport.close_channel(channel).await
            }
            None => Ok(()),
        }
    }

    // === Command queue ===

    /// Queue a process. If nothing was queued it starts before this returns.
    pub async fn enqueue(&mut self, builder: ProcessBuilder) -> Result<ProcessHandle> {
        let process = builder.build();
        let handle = process.handle();
        debug!("Queueing process {}: {}", process.id(), process.command());

        if self.queue.push(process) {
            self.start_head().await?;
        }
        Ok(handle)
    }

    /// Queue a command whose output goes to `callback`
    pub async fn execute<F>(&mut self, command: impl Into<String>, callback: F) -> Result<ProcessHandle>
    where
        F: FnMut(ChannelId, &str) + Send + 'static,
    {
        self.enqueue(ProcessBuilder::new(command).on_output(callback))
            .await
    }

    /// Queue a command whose output is printed to stdout
    pub async fn execute_default(&mut self, command: impl Into<String>) -> Result<ProcessHandle> {
        self.enqueue(ProcessBuilder::new(command)).await
    }

    /// Queue a command and drive the session until it finishes
    pub async fn execute_and_wait<F>(&mut self, command: impl Into<String>, callback: F) -> Result<i32>
    where
        F: FnMut(ChannelId, &str) + Send + 'static,
    {
        let handle = self.execute(command, callback).await?;
        handle.wait(self).await
    }

    /// Queue a command starting a nested shell; its output is discarded
    pub async fn subshell(&mut self, command: impl Into<String>) -> Result<ProcessHandle> {
        self.enqueue(ProcessBuilder::subshell(command)).await
    }

    /// Drive the session until the queue is empty
    pub async fn wait_all(&mut self) -> Result<()> {
        self.drive_until(|shell| shell.queue.is_empty()).await
    }

    /// Like [`Shell::wait_all`], giving up after `duration`. Queued processes
    /// are left untouched on timeout.
    pub async fn wait_all_timeout(&mut self, duration: Duration) -> Result<()> {
        tokio::time::timeout(duration, self.wait_all())
            .await
            .map_err(|_| Error::Timeout { duration })?
    }

    // === Event loop ===

    /// Dispatch transport events until `done` holds
    pub async fn drive_until<F>(&mut self, mut done: F) -> Result<()>
    where
        F: FnMut(&Self) -> bool,
    {
        while !done(&*self) {
            self.step().await?;
        }
        Ok(())
    }

    /// Wait for and dispatch a single transport event
    pub async fn step(&mut self) -> Result<()> {
        match self.transport.next_event().await? {
            Some((channel, event)) => self.dispatch(channel, event).await,
            None => {
                self.on_transport_closed();
                Err(Error::TransportClosed)
            }
        }
    }

    async fn dispatch(&mut self, channel: ChannelId, event: ChannelEvent) -> Result<()> {
        if self.channel != Some(channel) {
            debug!("Ignoring {:?} for stale channel {}", event, channel);
            return Ok(());
        }

        match event {
            ChannelEvent::OpenConfirmed => self.apply(Trigger::OpenConfirmed).await,
            ChannelEvent::OpenFailed { code, description } => {
                self.apply(Trigger::OpenFailed { code, description }).await
            }
            ChannelEvent::RequestSuccess => self.apply(Trigger::RequestSucceeded).await,
            ChannelEvent::RequestFailure => self.apply(Trigger::RequestFailed).await,
            ChannelEvent::Data(data) => self.on_data(channel, &data).await,
            ChannelEvent::ExtendedData { data_type, data } => {
                self.on_extended_data(channel, data_type, &data);
                Ok(())
            }
            ChannelEvent::Eof => {
                debug!("EOF on channel {}", channel);
                Ok(())
            }
            ChannelEvent::Close => {
                self.apply(Trigger::ChannelClosed).await?;
                self.on_channel_closed(channel).await
            }
        }
    }

    async fn apply(&mut self, trigger: Trigger) -> Result<()> {
        let (next, action) = transition(self.state, &trigger);
        if next != self.state {
            debug!("Shell channel {} -> {} on {:?}", self.state, next, trigger);
        }
        self.state = next;
        self.perform(action).await
    }

    async fn perform(&mut self, action: Action) -> Result<()> {
        match action {
            Action::None => Ok(()),
            Action::OpenChannel => match self.transport.open_channel().await {
                Ok(channel) => {
                    debug!("Requested channel {}", channel);
                    self.channel = Some(channel);
                    Ok(())
                }
                Err(e) => {
                    self.state = ChannelState::Closed;
                    Err(Error::SetupFailed {
                        stage: SetupStage::ChannelOpen,
                        code: None,
                        detail: e.to_string(),
                    })
                }
            },
            Action::RequestPty => {
                let channel = self.require_channel()?;
                let request = self.config.pty.to_request();
                self.transport.request_pty(channel, &request).await
            }
            Action::StartShell => {
                let channel = self.require_channel()?;
                match self.config.shell.program().map(str::to_owned) {
                    Some(program) => {
                        debug!("Executing '{}' on channel {}", program, channel);
                        self.transport.request_exec(channel, &program).await
                    }
                    None => self.transport.request_shell(channel).await,
                }
            }
            Action::InstallPrompt => {
                let channel = self.require_channel()?;
                let command = self.config.prompt.install_command(self.marker());
                self.init_scanner = Some(MarkerScanner::new(self.marker(), true)?);
                self.transport.send_data(channel, command.as_bytes()).await
            }
            Action::Ready => {
                info!("Shell ready on channel {}", self.require_channel()?);
                self.flush_head().await
            }
            Action::DropChannel => {
                self.channel = None;
                self.init_scanner = None;
                Ok(())
            }
            Action::Fail {
                stage,
                code,
                detail,
            } => {
                if let Some(channel) = self.channel.take() {
                    if let Err(e) = self.transport.close_channel(channel).await {
                        debug!("Failed to close channel {} after setup failure: {}", channel, e);
                    }
                }
                self.init_scanner = None;
                Err(Error::SetupFailed {
                    stage,
                    code,
                    detail,
                })
            }
        }
    }

    fn require_channel(&self) -> Result<ChannelId> {
        self.channel.ok_or(Error::ChannelNotOpen)
    }

    async fn on_data(&mut self, channel: ChannelId, data: &[u8]) -> Result<()> {
        match self.state {
            ChannelState::Initializing => {
                let Some(scanner) = self.init_scanner.as_mut() else {
                    return Ok(());
                };

                // The prompt line must be complete, or its tail would be
                // taken for the first command's output
                match scanner.feed(data) {
                    Scan::Complete { .. } => {
                        self.init_scanner = None;
                        self.apply(Trigger::MarkerSeen).await
                    }
                    Scan::Output(banner) => {
                        if !banner.is_empty() {
                            trace!("Discarding {} bytes of shell banner", banner.len());
                        }
                        Ok(())
                    }
                }
            }
            ChannelState::Open => {
                let Some(id) = self.attached else {
                    trace!("Discarding {} bytes with no attached process", data.len());
                    return Ok(());
                };

                let finished = match self.queue.head_mut() {
                    Some(head) if head.id() == id => head.on_data(channel, data),
                    _ => None,
                };
                if finished.is_some() {
                    self.process_finished(id).await?;
                }
                Ok(())
            }
            _ => {
                trace!("Discarding {} bytes while {}", data.len(), self.state);
                Ok(())
            }
        }
    }

    fn on_extended_data(&mut self, channel: ChannelId, data_type: u32, data: &[u8]) {
        let attached = self.attached;
        match self.queue.head_mut() {
            Some(head) if Some(head.id()) == attached => {
                head.on_extended_data(channel, data_type, data)
            }
            _ => warn!("[stderr] {:?}", String::from_utf8_lossy(data)),
        }
    }

    async fn on_channel_closed(&mut self, channel: ChannelId) -> Result<()> {
        let Some(id) = self.attached.take() else {
            return Ok(());
        };

        if let Some(head) = self.queue.head_mut() {
            head.on_close(channel);
        }
        let finished = self.queue.remove_head(id)?;
        debug!(
            "Process {} ended by channel close with status {:?}",
            finished.id(),
            finished.exit_status()
        );

        match self.config.session.on_close {
            ClosePolicy::Reopen => self.start_head().await,
            ClosePolicy::FailPending => {
                let aborted = self.abort_pending();
                if aborted > 0 {
                    warn!("Channel closed; aborted {} queued process(es)", aborted);
                }
                Ok(())
            }
        }
    }

    fn on_transport_closed(&mut self) {
        warn!("Transport closed with {} process(es) queued", self.queue.len());
        self.state = ChannelState::Closed;
        let channel = self.channel.take();
        self.init_scanner = None;

        if self.attached.take().is_some() {
            if let Some(head) = self.queue.head_mut() {
                match channel {
                    Some(channel) => {
                        head.on_close(channel);
                    }
                    None => {
                        head.finish(CHANNEL_CLOSED_STATUS);
                    }
                }
            }
        }
        self.abort_pending();
    }

    fn abort_pending(&mut self) -> usize {
        self.queue
            .drain()
            .map(|mut process| process.abort())
            .filter(|aborted| *aborted)
            .count()
    }

    async fn process_finished(&mut self, id: Uuid) -> Result<()> {
        let finished = self.queue.remove_head(id)?;
        self.attached = None;
        debug!(
            "Process {} finished with status {:?}: {}",
            finished.id(),
            finished.exit_status(),
            finished.command()
        );
        self.start_head().await
    }

    /// Start the head of the queue: arm it, attach it and make sure the
    /// channel is coming up. The command line is written once the shell is ready.
    async fn start_head(&mut self) -> Result<()> {
        let lookback = self.config.session.marker_lookback;
        let marker = self.marker().to_owned();
        let Some(head) = self.queue.head_mut() else {
            return Ok(());
        };

        head.start(&marker, lookback)?;
        self.attached = Some(head.id());
        self.open().await?;
        self.flush_head().await
    }

    async fn flush_head(&mut self) -> Result<()> {
        if self.state != ChannelState::Open {
            return Ok(());
        }
        let channel = self.require_channel()?;

        let line = match self.queue.head_mut() {
            Some(head) if Some(head.id()) == self.attached && !head.is_sent() => {
                head.mark_sent();
                head.command_line()
            }
            _ => return Ok(()),
        };

        debug!("Sending command on channel {}: {}", channel, line.trim_end());
        self.transport.send_data(channel, line.as_bytes()).await
    }
}

impl<T: Transport> fmt::Debug for Shell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shell")
            .field("state", &self.state)
            .field("channel", &self.channel)
            .field("program", &self.config.shell)
            .field("queued", &self.queue.len())
            .field("attached", &self.attached)
            .finish()
    }
}

/// Open shell sessions directly on a transport
pub trait ShellExt: Transport + Sized {
    /// A session with the default configuration
    fn shell(self) -> Shell<Self> {
        Shell::new(self)
    }

    /// A session with the given configuration
    fn shell_with(self, config: ShellConfig) -> Shell<Self> {
        Shell::with_config(self, config)
    }
}

impl<T: Transport> ShellExt for T {}
