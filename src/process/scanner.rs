//! Completion Marker Scanning
//!
//! Splits the byte stream of a running command into genuine output and the
//! `<marker> <status>` prompt line that ends it.

use regex::bytes::Regex;

use crate::error::Result;

/// Outcome of feeding one chunk to the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    /// Output only; may be empty when everything was held back
    Output(String),
    /// The completion line was found
    Complete {
        /// Output that preceded the marker
        output: String,
        /// Parsed exit status, `None` when the status text was malformed
        status: Option<i32>,
    },
}

/// Per-command scanner for the completion marker
#[derive(Debug, Clone)]
pub struct MarkerScanner {
    marker: Vec<u8>,
    pattern: Regex,
    lookback: bool,
    pending: Vec<u8>,
}

impl MarkerScanner {
    /// Create a scanner for `marker`.
    ///
    /// With `lookback` enabled, bytes that may be the start of a marker split
    /// across deliveries, and trailing incomplete UTF-8 sequences, are kept
    /// until the next chunk instead of being reported as output.
    pub fn new(marker: &str, lookback: bool) -> Result<Self> {
        let pattern = Regex::new(&format!(r"{}(?: (-?\d+))?", regex::escape(marker)))?;
        Ok(Self {
            marker: marker.as_bytes().to_vec(),
            pattern,
            lookback,
            pending: Vec::new(),
        })
    }

    /// Feed the next delivered chunk
    pub fn feed(&mut self, chunk: &[u8]) -> Scan {
        self.pending.extend_from_slice(chunk);

        let found = self.pattern.captures(&self.pending).map(|caps| {
            let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or_default();
            let status = caps
                .get(1)
                .and_then(|m| std::str::from_utf8(m.as_bytes()).ok())
                .and_then(|text| text.parse::<i32>().ok());
            (whole, status)
        });

        match found {
            // The status digits may still be on their way
            Some(((start, end), _)) if self.lookback && status_may_follow(&self.pending[end..]) => {
                Scan::Output(self.take_output(start))
            }
            Some(((start, _), status)) => {
                let output = self.take_output(start);
                self.pending.clear();
                Scan::Complete { output, status }
            }
            None => {
                let keep = if self.lookback { self.held_back_len() } else { 0 };
                let split = self.pending.len() - keep;
                Scan::Output(self.take_output(split))
            }
        }
    }

    /// Release whatever is still held back
    pub fn flush(&mut self) -> String {
        let len = self.pending.len();
        self.take_output(len)
    }

    /// Number of bytes currently held back
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn take_output(&mut self, upto: usize) -> String {
        let bytes: Vec<u8> = self.pending.drain(..upto).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn held_back_len(&self) -> usize {
        partial_marker_len(&self.pending, &self.marker).max(incomplete_utf8_len(&self.pending))
    }
}

/// Whether the bytes after a marker match could still grow into a status.
/// A status ending the buffer is held too: `7` may be the start of `72`.
/// The installed prompt ends in a newline, which settles it.
fn status_may_follow(tail: &[u8]) -> bool {
    matches!(tail, b"" | b" " | b" -")
}

/// Length of the longest proper prefix of `marker` that ends `buf`
fn partial_marker_len(buf: &[u8], marker: &[u8]) -> usize {
    let max = marker.len().saturating_sub(1).min(buf.len());
    (1..=max)
        .rev()
        .find(|&len| buf.ends_with(&marker[..len]))
        .unwrap_or(0)
}

/// Length of a truncated multi-byte UTF-8 sequence at the end of `buf`
fn incomplete_utf8_len(buf: &[u8]) -> usize {
    for back in 1..=buf.len().min(3) {
        let byte = buf[buf.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            b if b >= 0xF0 => 4,
            b if b >= 0xE0 => 3,
            b if b >= 0xC0 => 2,
            _ => 1,
        };
        return if needed > back { back } else { 0 };
    }
    0
}
