//! Contextual question answering over session memory.
//!
//! Tries, in order: direct recall of the last exchange or a recap,
//! structured questions about stored facts (including memory search),
//! and a keyword scan over stored facts. The first producer wins.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use synapse_core::config::MemoryConfig;
use synapse_core::{Fact, SessionKey};

use crate::facts::FactStore;
use crate::format::{fact_sentence, transcript};
use crate::turn_log::TurnLog;

// =============================================================================
// Answer types
// =============================================================================

/// Which layer produced a contextual answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSource {
    /// "What did I say", "what did you say", recap.
    DirectRecall,
    /// A stored fact or a memory search.
    FactAnswer,
    /// Nothing in session memory answers the query.
    NoAnswer,
}

/// A contextual answer and the layer that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
}

impl Answer {
    fn recall(text: String) -> Self {
        Self {
            text,
            source: AnswerSource::DirectRecall,
        }
    }

    fn fact(text: String) -> Self {
        Self {
            text,
            source: AnswerSource::FactAnswer,
        }
    }
}

// =============================================================================
// Pattern tables (compiled once, reused across calls)
// =============================================================================

static USER_RECALL: &[&str] = &[
    "what did i say",
    "what i said",
    "my last message",
    "repeat what i said",
    "last message",
];

static BOT_RECALL: &[&str] = &[
    "what did you say",
    "what you said",
    "repeat that",
    "say that again",
    "your last reply",
    "your last response",
];

static RECAP: &[&str] = &[
    "summarize",
    "summarise",
    "summary",
    "recap",
    "conversation so far",
    "what have we talked about",
];

#[derive(Debug, Clone, Copy)]
enum QuestionTarget {
    Fact(&'static str),
    /// Capture 1 names the thing in `favorite_<thing>`.
    Favorite,
    /// Capture 1 names the thing in `<thing>_name`.
    NameOf,
    /// Capture 1 is a free-text topic.
    MemorySearch,
}

struct QuestionPattern {
    regex: Regex,
    target: QuestionTarget,
}

static QUESTION_PATTERNS: LazyLock<Vec<QuestionPattern>> = LazyLock::new(|| {
    let table: &[(&str, QuestionTarget)] = &[
        (
            r"\b(?:what(?:'s|\s+is)\s+my\s+name|who\s+am\s+i|do\s+you\s+know\s+my\s+name|tell\s+me\s+my\s+name)\b",
            QuestionTarget::Fact("name"),
        ),
        (
            r"\b(?:how\s+old\s+am\s+i|what(?:'s|\s+is)\s+my\s+age)\b",
            QuestionTarget::Fact("age"),
        ),
        (
            r"\b(?:where\s+do\s+i\s+live|where\s+am\s+i\s+living)\b",
            QuestionTarget::Fact("location"),
        ),
        (
            r"\b(?:where\s+am\s+i\s+from|where\s+do\s+i\s+come\s+from)\b",
            QuestionTarget::Fact("origin"),
        ),
        (
            r"\b(?:what(?:'s|\s+is)\s+my\s+pet(?:'s)?\s+name|what(?:'s|\s+is)\s+my\s+pet\s+called|what\s+did\s+i\s+name\s+my\s+pet)\b",
            QuestionTarget::Fact("pet_name"),
        ),
        (
            r"\b(?:what\s+(?:kind\s+of\s+)?pet\s+do\s+i\s+have|do\s+i\s+have\s+a\s+pet|what\s+kind\s+of\s+pet)\b",
            QuestionTarget::Fact("pet"),
        ),
        (
            r"\bwhen(?:'s|\s+is)\s+my\s+birthday\b",
            QuestionTarget::Fact("birthday"),
        ),
        (
            r"\b(?:what\s+do\s+i\s+do\s+for\s+(?:a\s+)?(?:work|living)|what(?:'s|\s+is)\s+my\s+(?:job|occupation|profession))\b",
            QuestionTarget::Fact("occupation"),
        ),
        (
            r"\bwhat\s+do\s+i\s+(?:like|love|enjoy)\b",
            QuestionTarget::Fact("likes"),
        ),
        (
            r"\bwhat(?:'s|\s+is|\s+was)\s+my\s+fav(?:ou?rite)?\s+(\w+)",
            QuestionTarget::Favorite,
        ),
        (
            r"\bwhat(?:'s|\s+is)\s+my\s+(\w+)'s\s+name\b",
            QuestionTarget::NameOf,
        ),
        (
            r"\bwhat\s+did\s+i\s+name\s+my\s+(\w+)",
            QuestionTarget::NameOf,
        ),
        (
            r"\bdo\s+you\s+remember\s+(?:about\s+)?(.+)",
            QuestionTarget::MemorySearch,
        ),
        (
            r"\bwhat\s+did\s+i\s+tell\s+you\s+about\s+(.+)",
            QuestionTarget::MemorySearch,
        ),
        (
            r"\bremember\s+when\s+i\s+said\s+(.+)",
            QuestionTarget::MemorySearch,
        ),
    ];

    table
        .iter()
        .filter_map(|(pat, target)| match Regex::new(pat) {
            Ok(regex) => Some(QuestionPattern {
                regex,
                target: *target,
            }),
            Err(e) => {
                warn!(pattern = %pat, error = %e, "Skipping invalid question pattern");
                None
            }
        })
        .collect()
});

// =============================================================================
// ContextQueryEngine
// =============================================================================

/// Answers questions from a session's facts and recent turns.
#[derive(Debug, Clone)]
pub struct ContextQueryEngine {
    /// Turns included in a recap.
    pub recap_turns: usize,
    /// Recent turns scanned by memory search.
    pub memory_search_turns: usize,
    /// Minimum keyword length for the fallback scan.
    pub min_keyword_len: usize,
}

impl Default for ContextQueryEngine {
    fn default() -> Self {
        Self::from_config(&MemoryConfig::default())
    }
}

impl ContextQueryEngine {
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self {
            recap_turns: config.recap_turns,
            memory_search_turns: config.memory_search_turns,
            min_keyword_len: config.min_keyword_len,
        }
    }

    /// Answer `query` from session memory, or `None` when nothing applies.
    pub fn answer(
        &self,
        turns: &TurnLog,
        facts: &FactStore,
        session: &SessionKey,
        query: &str,
    ) -> Option<Answer> {
        self.answer_turn(turns, facts, session, query, &[])
    }

    /// Like [`answer`](Self::answer), for a message whose facts were just
    /// stored. The keyword scan skips the keys in `just_extracted`, so a
    /// statement is not answered with its own fact.
    pub fn answer_turn(
        &self,
        turns: &TurnLog,
        facts: &FactStore,
        session: &SessionKey,
        query: &str,
        just_extracted: &[Fact],
    ) -> Option<Answer> {
        let lowered = query.trim().to_lowercase().replace(['\u{2019}', '\u{2018}'], "'");
        if lowered.is_empty() {
            return None;
        }

        let answer = self
            .direct_recall(turns, session, &lowered)
            .or_else(|| self.structured(turns, facts, session, &lowered))
            .or_else(|| self.keyword_search(facts, session, &lowered, just_extracted));

        match &answer {
            Some(a) => debug!(source = ?a.source, "Contextual answer found"),
            None => debug!("No contextual answer"),
        }
        answer
    }

    fn direct_recall(&self, turns: &TurnLog, session: &SessionKey, query: &str) -> Option<Answer> {
        if contains_any(query, USER_RECALL) {
            if let Some(text) = turns.last_user_text(session) {
                return Some(Answer::recall(format!("You said: {}", text)));
            }
        }

        if contains_any(query, BOT_RECALL) {
            if let Some(text) = turns.last_bot_text(session) {
                return Some(Answer::recall(format!("I said: {}", text)));
            }
        }

        if contains_any(query, RECAP) {
            let history = turns.history(session, self.recap_turns);
            let text = transcript(&history);
            if !text.is_empty() {
                return Some(Answer::recall(format!("Here is a quick recap:\n{}", text)));
            }
        }

        None
    }

    fn structured(
        &self,
        turns: &TurnLog,
        facts: &FactStore,
        session: &SessionKey,
        query: &str,
    ) -> Option<Answer> {
        for pattern in QUESTION_PATTERNS.iter() {
            let Some(caps) = pattern.regex.captures(query) else {
                continue;
            };
            let capture = || caps.get(1).map(|m| m.as_str().trim().to_string());

            let key = match pattern.target {
                QuestionTarget::Fact(key) => key.to_string(),
                QuestionTarget::Favorite => match capture() {
                    Some(thing) if thing == "colour" => "favorite_color".to_string(),
                    Some(thing) => format!("favorite_{}", thing),
                    None => continue,
                },
                QuestionTarget::NameOf => match capture() {
                    Some(thing) => format!("{}_name", thing),
                    None => continue,
                },
                QuestionTarget::MemorySearch => {
                    let topic = capture().map(|t| clean_topic(&t)).unwrap_or_default();
                    if topic.is_empty() {
                        continue;
                    }
                    return Some(self.memory_search(turns, facts, session, &topic));
                }
            };

            if let Some(value) = facts.get(session, &key) {
                return Some(Answer::fact(fact_sentence(&key, &value)));
            }
        }
        None
    }

    fn memory_search(
        &self,
        turns: &TurnLog,
        facts: &FactStore,
        session: &SessionKey,
        topic: &str,
    ) -> Answer {
        let as_key = topic.replace(' ', "_");
        let hit = facts.iter(session).find(|f| {
            let key = f.key.to_lowercase();
            key.contains(topic) || key.contains(&as_key) || f.value.to_lowercase().contains(topic)
        });
        if let Some(fact) = hit {
            return Answer::fact(format!(
                "Yes, I remember! {}",
                fact_sentence(&fact.key, &fact.value)
            ));
        }

        let said = turns
            .recent(session, self.memory_search_turns)
            .find(|t| t.user_text.to_lowercase().contains(topic));
        if let Some(turn) = said {
            return Answer::fact(format!("Yes, I remember you said: \"{}\"", turn.user_text));
        }

        Answer::fact(format!("I don't recall you telling me about {}.", topic))
    }

    fn keyword_search(
        &self,
        facts: &FactStore,
        session: &SessionKey,
        query: &str,
        skip: &[Fact],
    ) -> Option<Answer> {
        let words = query
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| w.chars().count() >= self.min_keyword_len);

        for word in words {
            let hit = facts.iter(session).find(|f| {
                !skip.iter().any(|s| s.key == f.key)
                    && (f.key.to_lowercase().contains(word) || f.value.to_lowercase().contains(word))
            });
            if let Some(fact) = hit {
                return Some(Answer::fact(fact_sentence(&fact.key, &fact.value)));
            }
        }
        None
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Strip punctuation and leading filler from a memory-search topic.
fn clean_topic(raw: &str) -> String {
    let mut topic = raw
        .trim()
        .trim_end_matches(|c: char| matches!(c, '?' | '.' | '!' | ',' | ';'))
        .trim();
    for filler in ["that ", "when ", "my ", "the "] {
        if let Some(rest) = topic.strip_prefix(filler) {
            topic = rest.trim_start();
        }
    }
    topic.to_string()
}
