use serde::{Deserialize, Serialize};

// =============================================================================
// Conversation records
// =============================================================================

/// Identity of one conversation: a user and one of their sessions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

/// One recorded user/bot exchange.
///
/// Immutable once recorded. The serialized form is one line of the durable
/// turn log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub user_id: String,
    pub session_id: String,
    pub user_text: String,
    pub bot_text: String,
    /// ISO-8601 / RFC 3339 timestamp supplied by the caller.
    pub timestamp: String,
}

impl Turn {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.user_id.clone(), self.session_id.clone())
    }
}

/// A single extracted belief about a user within a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// Namespaced key such as `favorite_color`, `pet_name`, `<thing>_name`.
    pub key: String,
    /// Trimmed, non-empty value.
    pub value: String,
}

impl Fact {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// =============================================================================
// NLP analysis record
// =============================================================================

/// Coarse sentiment label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

/// A named entity recognised in the text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    /// Entity class, e.g. `PERSON`, `GPE`, `NOUN`.
    pub kind: String,
}

/// A noun with its dictionary definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NounDefinition {
    pub word: String,
    pub definition: String,
}

/// Per-utterance analysis returned by an NLP collaborator.
///
/// The memory core never interprets sentiment or entities; callers may
/// persist this alongside a turn in their own records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NlpAnalysis {
    pub intents: Vec<String>,
    pub sentiment: Sentiment,
    pub entities: Vec<Entity>,
    pub nouns: Vec<NounDefinition>,
}
