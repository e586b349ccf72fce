//! FIFO queue of processes sharing one channel

use std::collections::VecDeque;
use uuid::Uuid;

use super::{Process, ProcessHandle};
use crate::error::{Error, Result};

/// Processes in submission order; only the head may run
#[derive(Debug, Default)]
pub struct ProcessQueue {
    entries: VecDeque<Process>,
}

impl ProcessQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a process. Returns true if the queue was empty before.
    pub fn push(&mut self, process: Process) -> bool {
        let was_empty = self.entries.is_empty();
        self.entries.push_back(process);
        was_empty
    }

    /// The process allowed to run
    pub fn head(&self) -> Option<&Process> {
        self.entries.front()
    }

    /// Mutable access to the head
    pub fn head_mut(&mut self) -> Option<&mut Process> {
        self.entries.front_mut()
    }

    /// Remove the head, which must be the process with `id`
    pub fn remove_head(&mut self, id: Uuid) -> Result<Process> {
        match self.entries.front() {
            Some(head) if head.id() == id => self
                .entries
                .pop_front()
                .ok_or_else(|| Error::NotQueueHead { id: id.to_string() }),
            _ => Err(Error::NotQueueHead { id: id.to_string() }),
        }
    }

    /// Number of queued processes, including the head
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in queue order
    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.entries.iter()
    }

    /// Handles for every queued process, in order
    pub fn handles(&self) -> Vec<ProcessHandle> {
        self.entries.iter().map(Process::handle).collect()
    }

    /// Remove every queued process
    pub fn drain(&mut self) -> impl Iterator<Item = Process> + '_ {
        self.entries.drain(..)
    }
}
