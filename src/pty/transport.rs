//! Local PTY Transport
//!
//! A [`Transport`] whose channels are programs running in local
//! pseudoterminals. Channel requests are answered immediately through the
//! same event queue that carries output, so replies keep request order.

use async_trait::async_trait;
use portable_pty::PtyPair;
use std::collections::HashMap;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::process::{build_command, default_shell, open_pty, spawn_bridged, SpawnedPty};
use crate::channel::{ChannelEvent, ChannelId, PtyRequest, Transport};
use crate::error::{Error, Result};

#[derive(Default)]
struct LocalChannel {
    term: String,
    pair: Option<PtyPair>,
    running: Option<SpawnedPty>,
}

/// Runs shell channels in local pseudoterminals
pub struct LocalPtyTransport {
    host: String,
    shell: String,
    next_id: u32,
    channels: HashMap<ChannelId, LocalChannel>,
    events_tx: UnboundedSender<(ChannelId, ChannelEvent)>,
    events_rx: UnboundedReceiver<(ChannelId, ChannelEvent)>,
}

impl LocalPtyTransport {
    /// Transport running the user's shell
    pub fn new() -> Self {
        Self::with_shell(default_shell())
    }

    /// Transport running `shell` for interactive channels and `shell -c` for exec
    pub fn with_shell(shell: impl Into<String>) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        let host = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());

        Self {
            host,
            shell: shell.into(),
            next_id: 0,
            channels: HashMap::new(),
            events_tx,
            events_rx,
        }
    }

    /// Shell program used for channels
    pub fn shell_path(&self) -> &str {
        &self.shell
    }

    /// Number of channels not yet closed
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn emit(&self, channel: ChannelId, event: ChannelEvent) {
        // The receiver lives in `self`, so this cannot fail while we exist
        let _ = self.events_tx.send((channel, event));
    }

    fn reply(&self, channel: ChannelId, result: Result<()>, what: &str) {
        match result {
            Ok(()) => self.emit(channel, ChannelEvent::RequestSuccess),
            Err(e) => {
                warn!("{} request failed on channel {}: {}", what, channel, e);
                self.emit(channel, ChannelEvent::RequestFailure);
            }
        }
    }

    fn start(&mut self, channel: ChannelId, program: Option<&str>) -> Result<()> {
        let shell = self.shell.clone();
        let events = self.events_tx.clone();
        let local = self.channels.get_mut(&channel).ok_or(Error::ChannelNotOpen)?;
        if local.running.is_some() {
            return Err(Error::Other(format!("channel {} already runs a program", channel)));
        }
        let pair = local.pair.take().ok_or_else(|| Error::PtyCreationFailed {
            command: shell.clone(),
            reason: "no pseudoterminal was requested".to_string(),
        })?;

        let command = build_command(&shell, program, &local.term);
        local.running = Some(spawn_bridged(pair, command, channel, events)?);
        debug!("Started {} on channel {}", program.unwrap_or(shell.as_str()), channel);
        Ok(())
    }
}

impl Default for LocalPtyTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LocalPtyTransport {
    fn drop(&mut self) {
        for (channel, local) in self.channels.iter_mut() {
            if let Some(running) = local.running.as_mut() {
                if let Err(e) = running.child.kill() {
                    debug!("Failed to kill program on channel {}: {}", channel, e);
                }
            }
        }
    }
}

#[async_trait]
impl Transport for LocalPtyTransport {
    fn host(&self) -> &str {
        &self.host
    }

    async fn open_channel(&mut self) -> Result<ChannelId> {
        let channel = ChannelId(self.next_id);
        self.next_id += 1;
        self.channels.insert(channel, LocalChannel::default());
        self.emit(channel, ChannelEvent::OpenConfirmed);
        Ok(channel)
    }

    async fn request_pty(&mut self, channel: ChannelId, request: &PtyRequest) -> Result<()> {
        let result = match self.channels.get_mut(&channel) {
            Some(local) => open_pty(request).map(|pair| {
                local.term = request.term.clone();
                local.pair = Some(pair);
            }),
            None => Err(Error::ChannelNotOpen),
        };
        self.reply(channel, result, "pty");
        Ok(())
    }

    async fn request_shell(&mut self, channel: ChannelId) -> Result<()> {
        let result = self.start(channel, None);
        self.reply(channel, result, "shell");
        Ok(())
    }

    async fn request_exec(&mut self, channel: ChannelId, command: &str) -> Result<()> {
        let result = self.start(channel, Some(command));
        self.reply(channel, result, "exec");
        Ok(())
    }

    async fn send_data(&mut self, channel: ChannelId, data: &[u8]) -> Result<()> {
        let running = self
            .channels
            .get(&channel)
            .and_then(|local| local.running.as_ref())
            .ok_or(Error::ChannelNotOpen)?;

        running
            .input
            .send(data.to_vec())
            .map_err(|e| Error::PtyWriteFailed {
                reason: e.to_string(),
            })
    }

    async fn close_channel(&mut self, channel: ChannelId) -> Result<()> {
        let Some(mut local) = self.channels.remove(&channel) else {
            return Ok(());
        };

        match local.running.as_mut() {
            // The reader thread reports Close once the program is gone
            Some(running) => {
                if let Err(e) = running.child.kill() {
                    debug!("Program on channel {} already gone: {}", channel, e);
                }
                Ok(())
            }
            None => {
                self.emit(channel, ChannelEvent::Close);
                Ok(())
            }
        }
    }

    async fn next_event(&mut self) -> Result<Option<(ChannelId, ChannelEvent)>> {
        let event = self.events_rx.recv().await;
        if let Some((channel, ChannelEvent::Close)) = &event {
            self.channels.remove(channel);
        }
        Ok(event)
    }
}
