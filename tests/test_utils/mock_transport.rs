//! Mock Transport Implementation for Testing
//!
//! [`MockTransport`] answers channel requests the way a well behaved remote
//! shell would. Once the prompt has been redefined it replies to every
//! command line with the scripted output followed by a marker prompt.

use async_trait::async_trait;
use shellmux::error::{Error, Result};
use shellmux::{ChannelEvent, ChannelId, PtyRequest, Transport};
use std::collections::{HashMap, VecDeque};

/// A call made by the session on the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    OpenChannel,
    RequestPty(ChannelId, PtyRequest),
    RequestShell(ChannelId),
    RequestExec(ChannelId, String),
    SendData(ChannelId, String),
    CloseChannel(ChannelId),
}

/// Scripted answer to one command line. `{marker}` in a chunk is replaced
/// by the session's marker.
#[derive(Debug, Clone)]
pub struct Reply {
    pub chunks: Vec<String>,
}

impl Reply {
    /// Output followed by the marker prompt with `status`
    pub fn output(text: &str, status: i32) -> Self {
        let mut chunks = Vec::new();
        if !text.is_empty() {
            chunks.push(text.to_string());
        }
        chunks.push(format!("{{marker}} {}\n", status));
        Self { chunks }
    }

    /// Output with no prompt afterwards; the command keeps running
    pub fn hang(text: &str) -> Self {
        Self {
            chunks: vec![text.to_string()],
        }
    }

    /// Exact chunks, delivered one event each
    pub fn raw(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Scripted remote shell
pub struct MockTransport {
    host: String,
    next_id: u32,
    events: VecDeque<(ChannelId, ChannelEvent)>,
    replies: HashMap<String, VecDeque<Reply>>,
    marker: Option<String>,
    /// Every call in order
    pub calls: Vec<Call>,
    /// Refuse channel opens with this code and description
    pub fail_open: Option<(u32, String)>,
    /// Return an error from `open_channel` itself
    pub error_on_open: bool,
    /// Refuse pseudo-terminal requests
    pub fail_pty: bool,
    /// Refuse shell and exec requests
    pub fail_shell: bool,
    /// Answer the prompt redefinition with a marker prompt
    pub answer_prompt: bool,
    /// Text printed before the first marker prompt
    pub banner: Option<String>,
    /// Wait forever instead of reporting the transport gone when idle
    pub stall_when_idle: bool,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self {
            host: "mock-host".to_string(),
            next_id: 0,
            events: VecDeque::new(),
            replies: HashMap::new(),
            marker: None,
            calls: Vec::new(),
            fail_open: None,
            error_on_open: false,
            fail_pty: false,
            fail_shell: false,
            answer_prompt: true,
            banner: None,
            stall_when_idle: false,
        }
    }

    /// Script the answer to the next run of `command`
    pub fn script(&mut self, command: &str, reply: Reply) -> &mut Self {
        self.replies
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Queue an event as if the remote side sent it
    pub fn push_event(&mut self, channel: ChannelId, event: ChannelEvent) {
        self.events.push_back((channel, event));
    }

    /// Queue data for a channel
    pub fn push_data(&mut self, channel: ChannelId, data: &str) {
        self.push_event(channel, ChannelEvent::Data(data.as_bytes().to_vec()));
    }

    /// Marker seen in the prompt redefinition, if any
    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    /// Command lines sent, without the prompt redefinition
    pub fn sent_commands(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::SendData(_, text) if !text.starts_with("export ") => {
                    Some(text.trim_end_matches('\n').to_string())
                }
                _ => None,
            })
            .collect()
    }

    /// Number of calls matching `predicate`
    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    /// Number of events not yet delivered
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    fn reply_to_request(&mut self, channel: ChannelId, fail: bool) {
        let event = if fail {
            ChannelEvent::RequestFailure
        } else {
            ChannelEvent::RequestSuccess
        };
        self.push_event(channel, event);
    }

    fn answer_command(&mut self, channel: ChannelId, line: &str) {
        let Some(marker) = self.marker.clone() else {
            return;
        };
        let command = line.trim_end_matches('\n');
        let reply = self
            .replies
            .get_mut(command)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Reply::output("", 0));

        for chunk in reply.chunks {
            let chunk = chunk.replace("{marker}", &marker);
            self.push_data(channel, &chunk);
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_marker(text: &str) -> Option<String> {
    let start = text.find("='")? + 2;
    let end = text[start..].find(" $?")? + start;
    Some(text[start..end].to_string())
}

#[async_trait]
impl Transport for MockTransport {
    fn host(&self) -> &str {
        &self.host
    }

    async fn open_channel(&mut self) -> Result<ChannelId> {
        self.calls.push(Call::OpenChannel);
        if self.error_on_open {
            return Err(Error::Transport {
                reason: "connection lost".to_string(),
            });
        }

        let channel = ChannelId(self.next_id);
        self.next_id += 1;
        let event = match &self.fail_open {
            Some((code, description)) => ChannelEvent::OpenFailed {
                code: *code,
                description: description.clone(),
            },
            None => ChannelEvent::OpenConfirmed,
        };
        self.push_event(channel, event);
        Ok(channel)
    }

    async fn request_pty(&mut self, channel: ChannelId, request: &PtyRequest) -> Result<()> {
        self.calls.push(Call::RequestPty(channel, request.clone()));
        self.reply_to_request(channel, self.fail_pty);
        Ok(())
    }

    async fn request_shell(&mut self, channel: ChannelId) -> Result<()> {
        self.calls.push(Call::RequestShell(channel));
        self.reply_to_request(channel, self.fail_shell);
        Ok(())
    }

    async fn request_exec(&mut self, channel: ChannelId, command: &str) -> Result<()> {
        self.calls.push(Call::RequestExec(channel, command.to_string()));
        self.reply_to_request(channel, self.fail_shell);
        Ok(())
    }

    async fn send_data(&mut self, channel: ChannelId, data: &[u8]) -> Result<()> {
        let text = String::from_utf8_lossy(data).into_owned();
        self.calls.push(Call::SendData(channel, text.clone()));

        if text.starts_with("export ") {
            self.marker = extract_marker(&text);
            if let Some(banner) = self.banner.clone() {
                self.push_data(channel, &banner);
            }
            if self.answer_prompt {
                if let Some(marker) = self.marker.clone() {
                    self.push_data(channel, &format!("{} 0\n", marker));
                }
            }
        } else {
            self.answer_command(channel, &text);
        }
        Ok(())
    }

    async fn close_channel(&mut self, channel: ChannelId) -> Result<()> {
        self.calls.push(Call::CloseChannel(channel));
        self.push_event(channel, ChannelEvent::Close);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<(ChannelId, ChannelEvent)>> {
        match self.events.pop_front() {
            Some(event) => Ok(Some(event)),
            None if self.stall_when_idle => std::future::pending().await,
            None => Ok(None),
        }
    }
}
