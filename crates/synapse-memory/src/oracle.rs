//! NLP oracle seam.
//!
//! The memory core never interprets the analysis itself; callers use it to
//! pick a fallback reply when no contextual answer exists.

use regex::Regex;
use tracing::warn;

use synapse_core::{NlpAnalysis, Sentiment};

/// Analysis provider consulted per user message.
pub trait NlpOracle: Send + Sync {
    fn analyze(&self, text: &str) -> NlpAnalysis;
}

/// Intent used when no keyword matches.
pub const GENERAL_INTENT: &str = "general";

static INTENT_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "greeting",
        &["hello", "hi", "hey", "good morning", "good evening", "good afternoon", "howdy", "greetings"],
    ),
    ("farewell", &["bye", "goodbye", "see you", "take care", "later", "farewell"]),
    ("question", &["what", "why", "how", "when", "where", "who", "which", "whose", "whom"]),
    (
        "request",
        &["please", "can you", "could you", "would you", "help me", "i need", "i want"],
    ),
    ("gratitude", &["thank", "thanks", "appreciate", "grateful"]),
    ("apology", &["sorry", "apologize", "my bad", "forgive"]),
    (
        "affirmation",
        &["yes", "yeah", "yep", "sure", "ok", "okay", "alright", "correct", "right"],
    ),
    ("negation", &["no", "nope", "not", "never", "none", "neither"]),
    ("opinion", &["think", "believe", "feel", "opinion", "view"]),
    (
        "information",
        &["tell me", "explain", "describe", "define", "meaning of", "what is"],
    ),
];

struct IntentPattern {
    intent: &'static str,
    regex: Regex,
}

/// Keyword intent detector: one whole-word alternation per intent.
///
/// Sentiment is always neutral and no entities or nouns are reported.
pub struct KeywordOracle {
    patterns: Vec<IntentPattern>,
}

impl Default for KeywordOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordOracle {
    pub fn new() -> Self {
        let patterns = INTENT_KEYWORDS
            .iter()
            .filter_map(|&(intent, keywords)| {
                let alternation = keywords
                    .iter()
                    .map(|k| regex::escape(k).replace(' ', r"\s+"))
                    .collect::<Vec<_>>()
                    .join("|");
                match Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)) {
                    Ok(regex) => Some(IntentPattern { intent, regex }),
                    Err(e) => {
                        warn!(intent, error = %e, "Skipping invalid intent pattern");
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    /// Intents whose keywords appear in `text`, in table order.
    pub fn intents(&self, text: &str) -> Vec<String> {
        let mut intents: Vec<String> = self
            .patterns
            .iter()
            .filter(|p| p.regex.is_match(text))
            .map(|p| p.intent.to_string())
            .collect();
        if intents.is_empty() {
            intents.push(GENERAL_INTENT.to_string());
        }
        intents
    }
}

impl NlpOracle for KeywordOracle {
    fn analyze(&self, text: &str) -> NlpAnalysis {
        NlpAnalysis {
            intents: self.intents(text),
            sentiment: Sentiment::Neutral,
            entities: Vec::new(),
            nouns: Vec::new(),
        }
    }
}
