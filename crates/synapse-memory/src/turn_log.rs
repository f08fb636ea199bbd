//! Append-only turn log.
//!
//! Every turn is written as one JSON line to a durable file and admitted to a
//! bounded in-memory working set. On open the file is replayed in order to
//! rebuild the working set; the file itself is never trimmed.

use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::DateTime;
use serde::Deserialize;
use tracing::{debug, info, warn};

use synapse_core::{SessionKey, SynapseError, Turn};

use crate::error::MemoryError;

/// Outcome of a durable append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Written and synced to the durable log.
    Persisted,
    /// Held in memory only: either the log has no backing file or the write
    /// failed. The turn is still visible to readers.
    MemoryOnly,
}

/// Counts from replaying the durable log at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    pub skipped: usize,
}

/// Line shape tolerated on load: missing fields deserialize as `None`.
#[derive(Debug, Deserialize)]
struct StoredTurn {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    user_text: Option<String>,
    #[serde(default)]
    bot_text: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

impl StoredTurn {
    fn into_turn(self) -> Option<Turn> {
        let user_id = self.user_id.filter(|s| !s.is_empty())?;
        let session_id = self.session_id.filter(|s| !s.is_empty())?;
        Some(Turn {
            user_id,
            session_id,
            user_text: self.user_text.unwrap_or_default(),
            bot_text: self.bot_text.unwrap_or_default(),
            timestamp: self.timestamp.unwrap_or_default(),
        })
    }
}

/// Durable JSONL log plus the bounded working set of recent turns.
pub struct TurnLog {
    path: Option<PathBuf>,
    file: Option<File>,
    ceiling: usize,
    buckets: HashMap<SessionKey, VecDeque<Turn>>,
    /// Bucket creation order; eviction walks it round-robin.
    order: Vec<SessionKey>,
    cursor: usize,
    total: usize,
    degraded_writes: u64,
}

impl TurnLog {
    /// A log with no backing file.
    pub fn in_memory(ceiling: usize) -> Self {
        Self {
            path: None,
            file: None,
            ceiling,
            buckets: HashMap::new(),
            order: Vec::new(),
            cursor: 0,
            total: 0,
            degraded_writes: 0,
        }
    }

    /// Open (or create) the log at `path` and replay it.
    ///
    /// `on_replay` sees every valid record in file order, including records
    /// that the ceiling later evicts from the working set. Malformed lines and
    /// lines without a user or session id are skipped.
    pub fn open<F>(
        path: &Path,
        ceiling: usize,
        mut on_replay: F,
    ) -> Result<(Self, ReplayReport), MemoryError>
    where
        F: FnMut(&Turn),
    {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(SynapseError::from)?;
            }
        }

        let mut log = Self::in_memory(ceiling);
        let mut report = ReplayReport::default();

        if path.exists() {
            let file = File::open(path).map_err(SynapseError::from)?;
            let reader = BufReader::new(file);
            for (index, line) in reader.split(b'\n').enumerate() {
                let bytes = match line {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(path = %path.display(), line = index + 1, error = %e, "Stopping replay on read error");
                        break;
                    }
                };
                if bytes.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match serde_json::from_slice::<StoredTurn>(&bytes)
                    .ok()
                    .and_then(StoredTurn::into_turn)
                {
                    Some(turn) => {
                        on_replay(&turn);
                        log.admit(turn);
                        report.replayed += 1;
                    }
                    None => {
                        warn!(path = %path.display(), line = index + 1, "Skipping malformed turn record");
                        report.skipped += 1;
                    }
                }
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)
            .map_err(SynapseError::from)?;
        terminate_partial_record(&mut file).map_err(SynapseError::from)?;

        log.path = Some(path.to_path_buf());
        log.file = Some(file);

        info!(
            path = %path.display(),
            replayed = report.replayed,
            skipped = report.skipped,
            in_memory = log.total,
            "Turn log opened"
        );
        Ok((log, report))
    }

    /// Persist `turn`, then admit it to the working set.
    ///
    /// A failed durable write is logged and counted, and the turn is still
    /// admitted: conversational continuity is favoured over durability.
    pub fn append(&mut self, turn: Turn) -> Persistence {
        self.check_order(&turn);
        let persistence = self.persist(&turn);
        self.admit(turn);
        persistence
    }

    /// The most recent `limit` turns of a session, oldest first.
    pub fn history(&self, session: &SessionKey, limit: usize) -> Vec<Turn> {
        match self.buckets.get(session) {
            Some(bucket) => {
                let skip = bucket.len().saturating_sub(limit);
                bucket.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Turns of a session, newest first, at most `limit`.
    pub(crate) fn recent(&self, session: &SessionKey, limit: usize) -> impl Iterator<Item = &Turn> {
        self.buckets
            .get(session)
            .into_iter()
            .flat_map(|bucket| bucket.iter().rev())
            .take(limit)
    }

    pub fn last_turn(&self, session: &SessionKey) -> Option<&Turn> {
        self.buckets.get(session)?.back()
    }

    pub fn last_user_text(&self, session: &SessionKey) -> Option<String> {
        self.last_turn(session)
            .map(|t| t.user_text.clone())
            .filter(|s| !s.is_empty())
    }

    pub fn last_bot_text(&self, session: &SessionKey) -> Option<String> {
        self.last_turn(session)
            .map(|t| t.bot_text.clone())
            .filter(|s| !s.is_empty())
    }

    /// Session ids of `user_id` present in the working set, first seen first.
    pub fn sessions(&self, user_id: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|k| k.user_id == user_id)
            .map(|k| k.session_id.clone())
            .collect()
    }

    /// Turns currently held in memory.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn session_count(&self) -> usize {
        self.order.len()
    }

    pub fn degraded_writes(&self) -> u64 {
        self.degraded_writes
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // -- Private helpers --

    fn persist(&mut self, turn: &Turn) -> Persistence {
        let Some(file) = self.file.as_mut() else {
            return Persistence::MemoryOnly;
        };

        let result = serde_json::to_string(turn)
            .map_err(std::io::Error::other)
            .and_then(|mut line| {
                line.push('\n');
                file.write_all(line.as_bytes())?;
                file.sync_data()
            });

        match result {
            Ok(()) => Persistence::Persisted,
            Err(e) => {
                self.degraded_writes += 1;
                warn!(
                    path = ?self.path,
                    user_id = %turn.user_id,
                    session_id = %turn.session_id,
                    error = %e,
                    "Durable write failed; turn kept in memory only"
                );
                Persistence::MemoryOnly
            }
        }
    }

    fn admit(&mut self, turn: Turn) {
        let key = turn.key();
        if !self.buckets.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.buckets.entry(key).or_default().push_back(turn);
        self.total += 1;
        self.trim();
    }

    /// Evict oldest turns, one bucket at a time in round-robin order, until
    /// the working set is at or under the ceiling.
    fn trim(&mut self) {
        while self.total > self.ceiling && !self.order.is_empty() {
            if self.cursor >= self.order.len() {
                self.cursor = 0;
            }
            let key = &self.order[self.cursor];
            let emptied = match self.buckets.get_mut(key) {
                Some(bucket) => {
                    if bucket.pop_front().is_some() {
                        self.total -= 1;
                    }
                    bucket.is_empty()
                }
                None => true,
            };
            if emptied {
                let key = self.order.remove(self.cursor);
                self.buckets.remove(&key);
                debug!(user_id = %key.user_id, session_id = %key.session_id, "Session evicted from working set");
            } else {
                self.cursor += 1;
            }
        }
    }

    fn check_order(&self, turn: &Turn) {
        let Some(last) = self.last_turn(&turn.key()) else {
            return;
        };
        if let (Ok(prev), Ok(next)) = (
            DateTime::parse_from_rfc3339(&last.timestamp),
            DateTime::parse_from_rfc3339(&turn.timestamp),
        ) {
            if next < prev {
                warn!(
                    user_id = %turn.user_id,
                    session_id = %turn.session_id,
                    previous = %last.timestamp,
                    timestamp = %turn.timestamp,
                    "Turn timestamp goes backwards within session"
                );
            }
        }
    }
}

/// Make sure the next appended record starts on its own line when the file
/// ends in a torn write.
fn terminate_partial_record(file: &mut File) -> std::io::Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        file.write_all(b"\n")?;
        file.sync_data()?;
    }
    Ok(())
}

#[cfg(test)]
impl TurnLog {
    /// Log whose durable writes go to an arbitrary (possibly unwritable) file.
    pub(crate) fn with_file(file: File, ceiling: usize) -> Self {
        let mut log = Self::in_memory(ceiling);
        log.file = Some(file);
        log
    }
}
