//! Per-session conversational memory for Synapse.
//!
//! Extracts facts from user messages, keeps a durable log of every exchange
//! with a bounded in-memory working set, and answers questions from what a
//! user has already said.

pub mod error;
pub mod extractor;
pub mod facts;
pub mod format;
pub mod memory;
pub mod oracle;
pub mod query;
pub mod turn_log;

pub use error::MemoryError;
pub use extractor::{ExtractionRule, FactExtractor, KeyStrategy, Precedence};
pub use facts::FactStore;
pub use format::{acknowledge, fact_sentence, transcript};
pub use memory::{Exchange, MemoryStats, ReplySource, SessionMemory, TurnOutcome};
pub use oracle::{KeywordOracle, NlpOracle, GENERAL_INTENT};
pub use query::{Answer, AnswerSource, ContextQueryEngine};
pub use turn_log::{Persistence, ReplayReport, TurnLog};
