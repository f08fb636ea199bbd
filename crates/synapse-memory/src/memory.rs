//! Session memory façade: the single entry point that sequences fact
//! extraction, contextual answering, and turn logging.
//!
//! The turn log and fact store live behind one state lock, and the durable
//! append happens while it is held, so memory and disk never disagree on
//! ordering. A second, per-session gate serializes whole conversations:
//! calls for one `(user, session)` run one at a time, while different
//! sessions only contend on the short state lock.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info};

use synapse_core::config::MemoryConfig;
use synapse_core::{Fact, SessionKey, SynapseConfig, Turn};

use crate::error::MemoryError;
use crate::extractor::FactExtractor;
use crate::facts::FactStore;
use crate::format::{acknowledge, transcript};
use crate::query::{Answer, AnswerSource, ContextQueryEngine};
use crate::turn_log::{Persistence, ReplayReport, TurnLog};

// =============================================================================
// Result types
// =============================================================================

/// Result of `process_turn`: the candidate answer, if any, and the facts
/// extracted from this message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub answer: Option<String>,
    pub source: AnswerSource,
    pub facts: Vec<Fact>,
}

/// Which layer produced the reply recorded by `converse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    DirectRecall,
    FactAnswer,
    Acknowledgment,
    Fallback,
}

/// A completed exchange recorded by `converse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub reply: String,
    pub source: ReplySource,
    pub facts: Vec<Fact>,
    pub persistence: Persistence,
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub turns_in_memory: usize,
    pub sessions: usize,
    pub facts: usize,
    /// Appends that reached memory but not the durable log.
    pub degraded_writes: u64,
}

// =============================================================================
// SessionMemory
// =============================================================================

struct MemoryState {
    turns: TurnLog,
    facts: FactStore,
}

/// Per-session conversational memory, safe to share across threads.
pub struct SessionMemory {
    extractor: FactExtractor,
    engine: ContextQueryEngine,
    config: MemoryConfig,
    state: Mutex<MemoryState>,
    gates: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl SessionMemory {
    /// Open the durable log at `path`, replaying it into the working set and
    /// re-running fact extraction over every recorded user message.
    pub fn open(config: MemoryConfig, path: &Path) -> Result<Self, MemoryError> {
        let extractor = FactExtractor::new();
        let mut facts = FactStore::new();
        let (turns, report) = TurnLog::open(path, config.max_in_memory, |turn| {
            let key = turn.key();
            for fact in extractor.extract(&turn.user_text) {
                facts.set(&key, &fact.key, &fact.value);
            }
        })?;
        log_replay(&report, &facts);
        Ok(Self::assemble(config, extractor, turns, facts))
    }

    /// Open the log named by the configuration (`data_dir` + `log_file`).
    pub fn from_config(config: &SynapseConfig) -> Result<Self, MemoryError> {
        Self::open(config.memory.clone(), &config.log_path())
    }

    /// Memory with no durable backing; every append reports `MemoryOnly`.
    pub fn in_memory(config: MemoryConfig) -> Self {
        let turns = TurnLog::in_memory(config.max_in_memory);
        Self::assemble(config, FactExtractor::new(), turns, FactStore::new())
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Extract facts from `user_text`, apply them, then try to answer it.
    ///
    /// Facts are stored before the answer attempt, but the keyword scan does
    /// not answer a statement with the facts it just set. The turn itself is
    /// not recorded; the caller appends it once the final reply is known.
    pub fn process_turn(
        &self,
        user_id: &str,
        session_id: &str,
        user_text: &str,
        timestamp: &str,
    ) -> Result<TurnOutcome, MemoryError> {
        let key = self.validate(user_id, session_id, user_text)?;
        self.with_session(&key, || self.process_locked(&key, user_text, timestamp))
    }

    /// Record a finished exchange: durable write first, then the working set.
    ///
    /// Facts in `user_text` are applied too, so the store always matches what
    /// a replay of the log would rebuild.
    pub fn append(
        &self,
        user_id: &str,
        session_id: &str,
        user_text: &str,
        bot_text: &str,
        timestamp: &str,
    ) -> Result<Persistence, MemoryError> {
        let key = validate_ids(user_id, session_id)?;
        let turn = Turn {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            user_text: user_text.to_string(),
            bot_text: bot_text.to_string(),
            timestamp: timestamp.to_string(),
        };
        self.with_session(&key, || self.append_locked(turn, true))
    }

    /// Process a message, pick the reply, and record the exchange as one
    /// serialized step for the session.
    ///
    /// A contextual answer wins, then an acknowledgment of newly shared
    /// facts; otherwise `respond` supplies the reply.
    pub fn converse<F>(
        &self,
        user_id: &str,
        session_id: &str,
        user_text: &str,
        timestamp: &str,
        respond: F,
    ) -> Result<Exchange, MemoryError>
    where
        F: FnOnce(&TurnOutcome) -> String,
    {
        let key = self.validate(user_id, session_id, user_text)?;
        self.with_session(&key, || {
            let outcome = self.process_locked(&key, user_text, timestamp)?;

            let (reply, source) = match (&outcome.answer, outcome.source) {
                (Some(answer), AnswerSource::DirectRecall) => {
                    (answer.clone(), ReplySource::DirectRecall)
                }
                (Some(answer), _) => (answer.clone(), ReplySource::FactAnswer),
                (None, _) => match acknowledge(&outcome.facts) {
                    Some(ack) => (ack, ReplySource::Acknowledgment),
                    None => (respond(&outcome), ReplySource::Fallback),
                },
            };

            let turn = Turn {
                user_id: user_id.to_string(),
                session_id: session_id.to_string(),
                user_text: user_text.to_string(),
                bot_text: reply.clone(),
                timestamp: timestamp.to_string(),
            };
            let persistence = self.append_locked(turn, false)?;

            Ok(Exchange {
                reply,
                source,
                facts: outcome.facts,
                persistence,
            })
        })
    }

    /// Answer `query` from memory without extracting facts or recording it.
    pub fn answer(&self, user_id: &str, session_id: &str, query: &str) -> Option<Answer> {
        let key = SessionKey::new(user_id, session_id);
        let state = self.state.lock().ok()?;
        self.engine.answer(&state.turns, &state.facts, &key, query)
    }

    /// The most recent `limit` turns, oldest first.
    pub fn history(&self, user_id: &str, session_id: &str, limit: usize) -> Vec<Turn> {
        let key = SessionKey::new(user_id, session_id);
        self.read(|s| s.turns.history(&key, limit)).unwrap_or_default()
    }

    pub fn last_user_text(&self, user_id: &str, session_id: &str) -> Option<String> {
        let key = SessionKey::new(user_id, session_id);
        self.read(|s| s.turns.last_user_text(&key)).flatten()
    }

    pub fn last_bot_text(&self, user_id: &str, session_id: &str) -> Option<String> {
        let key = SessionKey::new(user_id, session_id);
        self.read(|s| s.turns.last_bot_text(&key)).flatten()
    }

    /// `User:` / `Bot:` transcript of the last `limit` turns.
    pub fn context_text(&self, user_id: &str, session_id: &str, limit: usize) -> String {
        transcript(&self.history(user_id, session_id, limit))
    }

    pub fn get_fact(&self, user_id: &str, session_id: &str, key: &str) -> Option<String> {
        let session = SessionKey::new(user_id, session_id);
        self.read(|s| s.facts.get(&session, key)).flatten()
    }

    /// Copy of every fact for the session, in first-insertion order.
    pub fn all_facts(&self, user_id: &str, session_id: &str) -> Vec<Fact> {
        let key = SessionKey::new(user_id, session_id);
        self.read(|s| s.facts.all(&key)).unwrap_or_default()
    }

    /// Session ids of `user_id` in the working set, first seen first.
    pub fn sessions(&self, user_id: &str) -> Vec<String> {
        self.read(|s| s.turns.sessions(user_id)).unwrap_or_default()
    }

    pub fn stats(&self) -> MemoryStats {
        self.read(|s| MemoryStats {
            turns_in_memory: s.turns.len(),
            sessions: s.turns.session_count(),
            facts: s.facts.len(),
            degraded_writes: s.turns.degraded_writes(),
        })
        .unwrap_or_default()
    }

    // -- Private helpers --

    fn assemble(
        config: MemoryConfig,
        extractor: FactExtractor,
        turns: TurnLog,
        facts: FactStore,
    ) -> Self {
        Self {
            extractor,
            engine: ContextQueryEngine::from_config(&config),
            config,
            state: Mutex::new(MemoryState { turns, facts }),
            gates: Mutex::new(HashMap::new()),
        }
    }

    fn validate(
        &self,
        user_id: &str,
        session_id: &str,
        user_text: &str,
    ) -> Result<SessionKey, MemoryError> {
        let key = validate_ids(user_id, session_id)?;
        if user_text.trim().is_empty() {
            return Err(MemoryError::EmptyMessage);
        }
        if user_text.chars().count() > self.config.max_message_length {
            return Err(MemoryError::MessageTooLong(self.config.max_message_length));
        }
        Ok(key)
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, MemoryError> {
        self.state
            .lock()
            .map_err(|e| MemoryError::LockPoisoned(format!("memory state: {}", e)))
    }

    /// Run a read under the state lock; `None` if the lock is poisoned.
    fn read<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> Option<T> {
        self.state.lock().ok().map(|state| f(&state))
    }

    fn process_locked(
        &self,
        key: &SessionKey,
        user_text: &str,
        timestamp: &str,
    ) -> Result<TurnOutcome, MemoryError> {
        let extracted = self.extractor.extract(user_text);

        let mut state = self.state()?;
        for fact in &extracted {
            state.facts.set(key, &fact.key, &fact.value);
        }
        let answer = self
            .engine
            .answer_turn(&state.turns, &state.facts, key, user_text, &extracted);
        drop(state);

        let (answer, source) = match answer {
            Some(a) => (Some(a.text), a.source),
            None => (None, AnswerSource::NoAnswer),
        };
        debug!(
            user_id = %key.user_id,
            session_id = %key.session_id,
            timestamp,
            facts = extracted.len(),
            source = ?source,
            "Turn processed"
        );
        Ok(TurnOutcome {
            answer,
            source,
            facts: extracted,
        })
    }

    fn append_locked(&self, turn: Turn, extract: bool) -> Result<Persistence, MemoryError> {
        let extracted = if extract {
            self.extractor.extract(&turn.user_text)
        } else {
            Vec::new()
        };
        let key = turn.key();

        let mut state = self.state()?;
        for fact in &extracted {
            state.facts.set(&key, &fact.key, &fact.value);
        }
        Ok(state.turns.append(turn))
    }

    /// Run `f` while holding the gate for `key`.
    ///
    /// Gates are created on demand and dropped once no other caller holds or
    /// waits on them.
    fn with_session<T>(
        &self,
        key: &SessionKey,
        f: impl FnOnce() -> Result<T, MemoryError>,
    ) -> Result<T, MemoryError> {
        let gate = {
            let mut gates = self
                .gates
                .lock()
                .map_err(|e| MemoryError::LockPoisoned(format!("session gates: {}", e)))?;
            Arc::clone(gates.entry(key.clone()).or_default())
        };

        let result = {
            // The gate guards no data, so a poisoned gate is still usable.
            let _guard = gate.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        if let Ok(mut gates) = self.gates.lock() {
            let idle = gates
                .get(key)
                .is_some_and(|g| Arc::ptr_eq(g, &gate) && Arc::strong_count(g) == 2);
            if idle {
                gates.remove(key);
            }
        }
        result
    }
}

fn validate_ids(user_id: &str, session_id: &str) -> Result<SessionKey, MemoryError> {
    if user_id.is_empty() {
        return Err(MemoryError::EmptyIdentifier("user_id"));
    }
    if session_id.is_empty() {
        return Err(MemoryError::EmptyIdentifier("session_id"));
    }
    Ok(SessionKey::new(user_id, session_id))
}

fn log_replay(report: &ReplayReport, facts: &FactStore) {
    info!(
        replayed = report.replayed,
        skipped = report.skipped,
        facts = facts.len(),
        "Session memory restored"
    );
}

#[cfg(test)]
impl SessionMemory {
    fn with_turn_log(config: MemoryConfig, turns: TurnLog) -> Self {
        Self::assemble(config, FactExtractor::new(), turns, FactStore::new())
    }

    fn gate_count(&self) -> usize {
        self.gates.lock().map(|g| g.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::thread;

    fn memory() -> SessionMemory {
        SessionMemory::in_memory(MemoryConfig::default())
    }

    fn ts(n: u32) -> String {
        format!("2026-03-01T10:{:02}:00+00:00", n % 60)
    }

    // ---- Validation ----

    #[test]
    fn test_process_turn_rejects_empty_message() {
        let mem = memory();
        assert!(matches!(
            mem.process_turn("u", "s", "   ", &ts(0)),
            Err(MemoryError::EmptyMessage)
        ));
    }

    #[test]
    fn test_process_turn_rejects_long_message() {
        let config = MemoryConfig {
            max_message_length: 10,
            ..MemoryConfig::default()
        };
        let mem = SessionMemory::in_memory(config);
        assert!(matches!(
            mem.process_turn("u", "s", "this is far too long", &ts(0)),
            Err(MemoryError::MessageTooLong(10))
        ));
    }

    #[test]
    fn test_empty_identifiers_rejected() {
        let mem = memory();
        assert!(matches!(
            mem.process_turn("", "s", "hi", &ts(0)),
            Err(MemoryError::EmptyIdentifier("user_id"))
        ));
        assert!(matches!(
            mem.append("u", "", "hi", "hello", &ts(0)),
            Err(MemoryError::EmptyIdentifier("session_id"))
        ));
    }

    // ---- process_turn ----

    #[test]
    fn test_facts_applied_before_answer() {
        let mem = memory();
        let outcome = mem
            .process_turn("u", "s", "My favorite food is pizza.", &ts(0))
            .unwrap();
        assert_eq!(outcome.facts, vec![Fact::new("favorite_food", "pizza")]);
        assert_eq!(mem.get_fact("u", "s", "favorite_food").as_deref(), Some("pizza"));
        // process_turn never records the turn itself
        assert!(mem.history("u", "s", 10).is_empty());
    }

    #[test]
    fn test_no_answer_signal() {
        let mem = memory();
        let outcome = mem
            .process_turn("u", "s", "what is quantum physics", &ts(0))
            .unwrap();
        assert_eq!(outcome.answer, None);
        assert_eq!(outcome.source, AnswerSource::NoAnswer);
    }

    #[test]
    fn test_pizza_scenario() {
        let mem = memory();
        mem.process_turn("u", "s", "My favorite food is pizza.", &ts(0))
            .unwrap();
        mem.append("u", "s", "My favorite food is pizza.", "Yum!", &ts(0))
            .unwrap();

        let outcome = mem
            .process_turn("u", "s", "What's my favorite food?", &ts(1))
            .unwrap();
        assert_eq!(outcome.source, AnswerSource::FactAnswer);
        let answer = outcome.answer.unwrap();
        assert!(answer.contains("pizza"));
        mem.append("u", "s", "What's my favorite food?", &answer, &ts(1))
            .unwrap();

        let outcome = mem.process_turn("u", "s", "What did I say?", &ts(2)).unwrap();
        assert_eq!(outcome.source, AnswerSource::DirectRecall);
        assert_eq!(
            outcome.answer.as_deref(),
            Some("You said: What's my favorite food?")
        );
    }

    // ---- converse ----

    #[test]
    fn test_converse_acknowledges_new_facts() {
        let mem = memory();
        let exchange = mem
            .converse("u", "s", "I have a dog named Max", &ts(0), |_| ":)".to_string())
            .unwrap();
        assert_eq!(exchange.source, ReplySource::Acknowledgment);
        assert!(exchange.reply.contains("Max the dog"));
        assert_eq!(exchange.persistence, Persistence::MemoryOnly);
        assert_eq!(mem.last_bot_text("u", "s"), Some(exchange.reply));
    }

    #[test]
    fn test_converse_acknowledges_plain_statements() {
        let mem = memory();
        let exchange = mem
            .converse("u", "s", "My favorite food is pizza.", &ts(0), |_| ":)".to_string())
            .unwrap();
        assert_eq!(exchange.source, ReplySource::Acknowledgment);
        assert_eq!(exchange.reply, "Yum! pizza sounds delicious! I'll remember that.");

        let exchange = mem
            .converse("u", "s", "I live in Karachi", &ts(1), |_| ":)".to_string())
            .unwrap();
        assert_eq!(exchange.source, ReplySource::Acknowledgment);
        assert!(exchange.reply.contains("Karachi"));

        let exchange = mem
            .converse("u", "s", "I work as a nurse", &ts(2), |_| ":)".to_string())
            .unwrap();
        assert_eq!(exchange.source, ReplySource::Acknowledgment);
    }

    #[test]
    fn test_statement_is_not_answered_with_its_own_fact() {
        let mem = memory();
        let outcome = mem
            .process_turn("u", "s", "My birthday is June 5", &ts(0))
            .unwrap();
        assert_eq!(outcome.facts, vec![Fact::new("birthday", "June 5")]);
        assert_eq!(outcome.answer, None);
        assert_eq!(outcome.source, AnswerSource::NoAnswer);
    }

    #[test]
    fn test_converse_falls_back_to_caller() {
        let mem = memory();
        let exchange = mem
            .converse("u", "s", "hello there", &ts(0), |outcome| {
                assert_eq!(outcome.source, AnswerSource::NoAnswer);
                "Hi!".to_string()
            })
            .unwrap();
        assert_eq!(exchange.source, ReplySource::Fallback);
        assert_eq!(mem.context_text("u", "s", 5), "User: hello there\nBot: Hi!");
    }

    #[test]
    fn test_converse_contextual_answer_skips_callback() {
        let mem = memory();
        mem.converse("u", "s", "my name is Ada", &ts(0), |_| ":)".to_string())
            .unwrap();
        let exchange = mem
            .converse("u", "s", "what's my name?", &ts(1), |_| {
                panic!("callback must not run when memory answers")
            })
            .unwrap();
        assert_eq!(exchange.source, ReplySource::FactAnswer);
        assert_eq!(exchange.reply, "Your name is Ada.");
    }

    // ---- Accessors ----

    #[test]
    fn test_sessions_and_stats() {
        let mem = memory();
        mem.append("u", "s1", "my name is Ada", "hi", &ts(0)).unwrap();
        mem.append("u", "s2", "hello", "hi", &ts(1)).unwrap();
        mem.append("v", "s1", "hello", "hi", &ts(2)).unwrap();

        assert_eq!(mem.sessions("u"), vec!["s1", "s2"]);
        assert!(mem.sessions("nobody").is_empty());

        let stats = mem.stats();
        assert_eq!(stats.turns_in_memory, 3);
        assert_eq!(stats.sessions, 3);
        assert_eq!(stats.facts, 1);
        assert_eq!(stats.degraded_writes, 0);
    }

    #[test]
    fn test_lookup_misses_are_empty() {
        let mem = memory();
        assert!(mem.get_fact("u", "s", "name").is_none());
        assert!(mem.all_facts("u", "s").is_empty());
        assert!(mem.history("u", "s", 10).is_empty());
        assert_eq!(mem.context_text("u", "s", 5), "");
        assert!(mem.last_user_text("u", "s").is_none());
    }

    // ---- Durability ----

    #[test]
    fn test_failed_write_degrades_but_keeps_turn() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turns.jsonl");
        std::fs::write(&path, "").unwrap();
        let read_only = File::open(&path).unwrap();

        let config = MemoryConfig::default();
        let turns = TurnLog::with_file(read_only, config.max_in_memory);
        let mem = SessionMemory::with_turn_log(config, turns);

        let exchange = mem
            .converse("u", "s", "my name is Bob", &ts(0), |_| ":)".to_string())
            .unwrap();
        assert_eq!(exchange.persistence, Persistence::MemoryOnly);
        assert_eq!(mem.last_user_text("u", "s").as_deref(), Some("my name is Bob"));
        assert_eq!(mem.stats().degraded_writes, 1);
    }

    // ---- Concurrency ----

    #[test]
    fn test_gates_are_released() {
        let mem = memory();
        mem.converse("u", "s", "hello", &ts(0), |_| "hi".to_string())
            .unwrap();
        assert_eq!(mem.gate_count(), 0);
    }

    #[test]
    fn test_concurrent_sessions_keep_their_own_order() {
        let mem = Arc::new(memory());
        let mut handles = Vec::new();

        for t in 0..4 {
            let mem = Arc::clone(&mem);
            handles.push(thread::spawn(move || {
                let session = format!("s{}", t);
                for n in 0..25u32 {
                    let text = format!("my favorite number is {}", n);
                    mem.converse("u", &session, &text, &ts(n), |_| "ok".to_string())
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        for t in 0..4 {
            let session = format!("s{}", t);
            let history = mem.history("u", &session, 100);
            assert_eq!(history.len(), 25);
            for (n, turn) in history.iter().enumerate() {
                assert_eq!(turn.user_text, format!("my favorite number is {}", n));
            }
            assert_eq!(
                mem.get_fact("u", &session, "favorite_number").as_deref(),
                Some("24")
            );
        }
        assert_eq!(mem.stats().turns_in_memory, 100);
        assert_eq!(mem.gate_count(), 0);
    }
}
