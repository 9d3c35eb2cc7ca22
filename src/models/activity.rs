use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub const DEFAULT_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub id: Uuid,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded, newest-first activity log.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl ActivityLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, text: impl Into<String>) -> LogEntry {
        let entry = LogEntry {
            id: Uuid::new_v4(),
            text: text.into(),
            timestamp: Utc::now(),
        };

        self.entries.push_front(entry.clone());
        self.entries.truncate(self.capacity);
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Shared activity log that also fans new entries out to live viewers.
pub struct ActivityFeed {
    log: Mutex<ActivityLog>,
    events_tx: broadcast::Sender<LogEntry>,
}

impl ActivityFeed {
    pub fn new(capacity: usize, event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            log: Mutex::new(ActivityLog::with_capacity(capacity)),
            events_tx,
        }
    }

    pub fn record(&self, text: impl Into<String>) -> LogEntry {
        let entry = self
            .log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text);

        let _ = self.events_tx.send(entry.clone());
        entry
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries()
    }

    pub fn len(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.events_tx.subscribe()
    }
}
