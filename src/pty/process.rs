//! PTY Process Spawning
//!
//! Opens pseudoterminals and starts programs in them with portable-pty,
//! bridging the blocking master I/O to the async side with background threads.

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtyPair, PtySize};
use std::io::{Read, Write};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::mpsc::UnboundedSender;

use crate::channel::{ChannelEvent, ChannelId, PtyRequest};
use crate::error::{Error, Result};

/// Shell used when `$SHELL` is unset
pub const FALLBACK_SHELL: &str = "/bin/sh";

/// The user's login shell
pub fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|shell| !shell.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_SHELL.to_string())
}

/// Open a pseudoterminal sized per `request`
pub fn open_pty(request: &PtyRequest) -> Result<PtyPair> {
    let size = PtySize {
        rows: clamp_dimension(request.rows),
        cols: clamp_dimension(request.cols),
        pixel_width: 0,
        pixel_height: 0,
    };

    let pair = native_pty_system()
        .openpty(size)
        .map_err(|e| Error::PtyCreationFailed {
            command: request.term.clone(),
            reason: e.to_string(),
        })?;

    if request.disables_echo() {
        disable_echo(&*pair.master)?;
    }
    Ok(pair)
}

fn clamp_dimension(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX).max(1)
}

/// Turn off local echo on the terminal behind `master`
#[cfg(unix)]
pub fn disable_echo(master: &dyn MasterPty) -> Result<()> {
    use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg};
    use std::os::fd::BorrowedFd;

    let Some(fd) = master.as_raw_fd() else {
        debug!("PTY master has no file descriptor; leaving echo unchanged");
        return Ok(());
    };

    // SAFETY: the descriptor belongs to `master`, which outlives this call
    let fd = unsafe { BorrowedFd::borrow_raw(fd) };
    let mut termios = tcgetattr(fd).map_err(|e| Error::PtyCreationFailed {
        command: "tcgetattr".to_string(),
        reason: e.to_string(),
    })?;
    termios.local_flags.remove(LocalFlags::ECHO);
    tcsetattr(fd, SetArg::TCSANOW, &termios).map_err(|e| Error::PtyCreationFailed {
        command: "tcsetattr".to_string(),
        reason: e.to_string(),
    })
}

/// Turn off local echo on the terminal behind `master`
#[cfg(not(unix))]
pub fn disable_echo(_master: &dyn MasterPty) -> Result<()> {
    debug!("Echo control is not supported on this platform");
    Ok(())
}

/// Build the command for a channel: the interactive shell, or `shell -c program`
pub fn build_command(shell: &str, program: Option<&str>, term: &str) -> CommandBuilder {
    let mut command = CommandBuilder::new(shell);
    match program {
        Some(program) => {
            command.arg("-c");
            command.arg(program);
        }
        // Readline wraps every prompt in bracketed-paste toggles
        None if is_bash(shell) => {
            command.arg("--noediting");
        }
        None => {}
    }
    command.env("TERM", term);
    if let Ok(cwd) = std::env::current_dir() {
        command.cwd(cwd);
    }
    command
}

fn is_bash(shell: &str) -> bool {
    std::path::Path::new(shell)
        .file_name()
        .is_some_and(|name| name == "bash")
}

/// A program running in a pseudoterminal, with its I/O bridged
pub struct SpawnedPty {
    /// Kept so the terminal stays alive while the child runs
    pub master: Box<dyn MasterPty + Send>,
    /// The running program
    pub child: Box<dyn Child + Send + Sync>,
    /// Input queue drained by the writer thread
    pub input: Sender<Vec<u8>>,
}

/// Spawn `command` on the slave side of `pair` and start the I/O threads.
/// Output is delivered to `events` tagged with `channel`; EOF becomes
/// `Eof` followed by `Close`.
pub fn spawn_bridged(
    pair: PtyPair,
    command: CommandBuilder,
    channel: ChannelId,
    events: UnboundedSender<(ChannelId, ChannelEvent)>,
) -> Result<SpawnedPty> {
    let description = format!("{:?}", command.get_argv());
    let child = pair
        .slave
        .spawn_command(command)
        .map_err(|e| Error::CommandSpawnFailed {
            command: description.clone(),
            reason: e.to_string(),
        })?;
    // The slave must be closed here or the reader never sees EOF
    drop(pair.slave);

    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| Error::PtyCreationFailed {
            command: description.clone(),
            reason: e.to_string(),
        })?;
    let writer = pair
        .master
        .take_writer()
        .map_err(|e| Error::PtyCreationFailed {
            command: description,
            reason: e.to_string(),
        })?;

    spawn_reader(reader, channel, events);
    let input = spawn_writer(writer, channel);

    Ok(SpawnedPty {
        master: pair.master,
        child,
        input,
    })
}

fn spawn_reader(
    mut reader: Box<dyn Read + Send>,
    channel_id: ChannelId,
    events: UnboundedSender<(ChannelId, ChannelEvent)>,
) {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];

        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    debug!("PTY read EOF on channel {}", channel_id);
                    break;
                }
                Ok(n) => {
                    if events.send((channel_id, ChannelEvent::Data(buf[..n].to_vec()))).is_err() {
                        debug!("PTY read: receiver dropped, stopping reader thread");
                        return;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Linux reports EIO once the slave side is gone
                    debug!("PTY read ended on channel {}: {}", channel_id, e);
                    break;
                }
            }
        }

        let _ = events.send((channel_id, ChannelEvent::Eof));
        let _ = events.send((channel_id, ChannelEvent::Close));
        debug!("PTY reader thread exiting");
    });
}

fn spawn_writer(mut writer: Box<dyn Write + Send>, channel_id: ChannelId) -> Sender<Vec<u8>> {
    let (tx, rx) = mpsc::channel::<Vec<u8>>();

    thread::spawn(move || {
        while let Ok(data) = rx.recv() {
            let result = writer.write_all(&data).and_then(|_| writer.flush());
            if let Err(e) = result {
                warn!("PTY write error on channel {}: {}", channel_id, e);
                break;
            }
        }
        debug!("PTY writer thread exiting");
    });

    tx
}
