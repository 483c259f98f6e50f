//! Session journal
//!
//! Appends one JSON line per finished session and keeps a bounded history
//! of recent events in memory.

use crate::session::{SessionEvent, SessionStatus};
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Events kept in memory
const MAX_RECENT_EVENTS: usize = 100;

/// Append-only JSON-lines log of session events
#[derive(Debug)]
pub struct SessionJournal {
    path: PathBuf,
    recent: VecDeque<SessionEvent>,
    max_recent: usize,
}

impl SessionJournal {
    /// Journal writing to `path`; parent directories are created on first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recent: VecDeque::with_capacity(MAX_RECENT_EVENTS),
            max_recent: MAX_RECENT_EVENTS,
        }
    }

    /// File the journal appends to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `event` to the file and to the in-memory history
    pub fn append(&mut self, event: &SessionEvent) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| {
                    format!("Failed to create journal directory {}", parent.display())
                })?;
        }
        let line = serde_json::to_string(event).context("Failed to serialize session event")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open journal {}", self.path.display()))?;
        writeln!(file, "{}", line).context("Failed to append to journal")?;

        if self.recent.len() >= self.max_recent {
            self.recent.pop_front();
        }
        self.recent.push_back(event.clone());
        tracing::debug!(path = %self.path.display(), status = ?event.status, "Session journaled");
        Ok(())
    }

    /// Events appended through this journal, oldest first
    pub fn recent(&self) -> &VecDeque<SessionEvent> {
        &self.recent
    }

    /// Number of recent events that did not finish `Ok`
    pub fn failure_count(&self) -> usize {
        self.recent
            .iter()
            .filter(|e| e.status != SessionStatus::Ok)
            .count()
    }

    /// Read every event from a journal file
    ///
    /// Malformed lines are skipped with a warning. A missing file is empty.
    pub fn load(path: &Path) -> Result<Vec<SessionEvent>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(path)
            .with_context(|| format!("Failed to open journal {}", path.display()))?;

        let mut events = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.context("Failed to read journal")?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(line = number + 1, error = %e, "Skipping malformed journal line")
                }
            }
        }
        Ok(events)
    }
}
