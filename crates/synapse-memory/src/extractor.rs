//! Regex-based fact extraction.
//!
//! Turns a free-text utterance into zero or more [`Fact`]s using an ordered
//! table of rules. Every rule is evaluated and every match is kept; within a
//! rule group a fallback rule only fires when no specific rule of the same
//! group matched.

use std::collections::HashSet;

use regex::Regex;
use tracing::warn;

use synapse_core::Fact;

/// Terminates a free-text value: sentence punctuation, a conjunction that
/// opens a new clause about the user, or the end.
const VALUE_END: &str = r"(?:[.!?,;]|\s+(?:and|but)\s+(?:i|my)\b|$)";

/// Like [`VALUE_END`], but commas stay inside the phrase.
const PHRASE_END: &str = r"(?:[.!?;]|\s+(?:and|but)\s+(?:i|my)\b|$)";

/// How a matching rule turns its captures into fact keys.
#[derive(Debug, Clone, Copy)]
pub enum KeyStrategy {
    /// Capture 1 is the value of a fixed key.
    Fixed(&'static str),
    /// Capture 1 names the key (`prefix + thing + suffix`), capture 2 is the value.
    /// Things listed in `exclude` are left to a more specific rule.
    Templated {
        prefix: &'static str,
        suffix: &'static str,
        exclude: &'static [&'static str],
    },
    /// Capture N is the value of the N-th key.
    Multi(&'static [&'static str]),
}

/// Whether a rule always fires or only when its group is otherwise silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precedence {
    Specific,
    Fallback,
}

/// A single compiled extraction rule.
pub struct ExtractionRule {
    pub regex: Regex,
    pub strategy: KeyStrategy,
    pub group: Option<&'static str>,
    pub precedence: Precedence,
    accept: fn(&str) -> bool,
}

struct RuleSpec {
    patterns: Vec<String>,
    strategy: KeyStrategy,
    group: Option<&'static str>,
    precedence: Precedence,
    accept: fn(&str) -> bool,
}

impl RuleSpec {
    fn specific(patterns: Vec<String>, strategy: KeyStrategy) -> Self {
        Self {
            patterns,
            strategy,
            group: None,
            precedence: Precedence::Specific,
            accept: |_| true,
        }
    }

    fn in_group(mut self, group: &'static str) -> Self {
        self.group = Some(group);
        self
    }

    fn fallback(mut self) -> Self {
        self.precedence = Precedence::Fallback;
        self
    }

    fn accepting(mut self, accept: fn(&str) -> bool) -> Self {
        self.accept = accept;
        self
    }
}

/// Ordered collection of extraction rules, compiled once and reused.
pub struct FactExtractor {
    rules: Vec<ExtractionRule>,
}

impl Default for FactExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FactExtractor {
    /// Create an extractor with the built-in rule table.
    ///
    /// A pattern that fails to compile is logged and left out; it never
    /// surfaces to callers of [`FactExtractor::extract`].
    pub fn new() -> Self {
        let rules = rule_table()
            .into_iter()
            .flat_map(|spec| {
                let RuleSpec {
                    patterns,
                    strategy,
                    group,
                    precedence,
                    accept,
                } = spec;
                patterns.into_iter().filter_map(move |pat| match Regex::new(&pat) {
                    Ok(regex) => Some(ExtractionRule {
                        regex,
                        strategy,
                        group,
                        precedence,
                        accept,
                    }),
                    Err(e) => {
                        warn!(pattern = %pat, error = %e, "Skipping invalid extraction pattern");
                        None
                    }
                })
            })
            .collect();
        Self { rules }
    }

    /// Number of compiled rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Extract every fact stated in `text`, in rule order.
    ///
    /// Keys are lowercase; values keep the user's casing and are trimmed.
    pub fn extract(&self, text: &str) -> Vec<Fact> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Vec::new();
        }

        let mut facts = Vec::new();
        let mut satisfied_groups: HashSet<&'static str> = HashSet::new();

        for rule in &self.rules {
            if rule.precedence == Precedence::Fallback {
                if let Some(group) = rule.group {
                    if satisfied_groups.contains(group) {
                        continue;
                    }
                }
            }

            let mut matched = false;
            let mut start = 0;
            while let Some(caps) = rule.regex.captures_at(&normalized, start) {
                let produced = apply_strategy(rule, &caps);
                if !produced.is_empty() {
                    matched = true;
                    facts.extend(produced);
                }
                // Resume after the last value, not the terminator: "and my ..."
                // may open the next match.
                let resume = caps
                    .iter()
                    .skip(1)
                    .flatten()
                    .map(|m| m.end())
                    .max()
                    .unwrap_or_else(|| caps.get(0).map_or(normalized.len(), |m| m.end()));
                if resume <= start {
                    break;
                }
                start = resume;
            }

            if matched && rule.precedence == Precedence::Specific {
                if let Some(group) = rule.group {
                    satisfied_groups.insert(group);
                }
            }
        }

        facts
    }
}

fn apply_strategy(rule: &ExtractionRule, caps: &regex::Captures<'_>) -> Vec<Fact> {
    let capture = |i: usize| caps.get(i).map(|m| clean_value(m.as_str()));

    match rule.strategy {
        KeyStrategy::Fixed(key) => match capture(1) {
            Some(value) if !value.is_empty() && (rule.accept)(&value) => {
                vec![Fact::new(key, value)]
            }
            _ => Vec::new(),
        },
        KeyStrategy::Templated {
            prefix,
            suffix,
            exclude,
        } => {
            let (Some(thing), Some(value)) = (capture(1), capture(2)) else {
                return Vec::new();
            };
            let thing = canonical_thing(&thing);
            if thing.is_empty() || value.is_empty() || exclude.contains(&thing.as_str()) {
                return Vec::new();
            }
            if !(rule.accept)(&value) {
                return Vec::new();
            }
            vec![Fact::new(format!("{}{}{}", prefix, thing, suffix), value)]
        }
        KeyStrategy::Multi(keys) => {
            let values: Vec<String> = (1..=keys.len()).filter_map(capture).collect();
            if values.len() != keys.len() || values.iter().any(|v| v.is_empty()) {
                return Vec::new();
            }
            keys.iter()
                .zip(values)
                .map(|(key, value)| Fact::new(*key, value))
                .collect()
        }
    }
}

/// Trim, collapse curly apostrophes, and drop control characters.
fn normalize(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| match c {
            '\u{2019}' | '\u{2018}' => '\'',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect()
}

fn clean_value(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '.' | '!' | '?' | ',' | ';' | ':' | '"' | '\'')
        })
        .to_string()
}

fn canonical_thing(thing: &str) -> String {
    match thing.to_lowercase().as_str() {
        "colour" => "color".to_string(),
        other => other.to_string(),
    }
}

fn is_description(value: &str) -> bool {
    const NOT_DESCRIPTIONS: &[&str] = &[
        "not", "going", "trying", "sorry", "just", "here", "back", "looking", "asking",
        "wondering", "from", "living", "in", "at", "a", "an", "the", "so", "very",
    ];
    let first = value
        .split_whitespace()
        .next()
        .map(str::to_lowercase)
        .unwrap_or_default();
    !first.is_empty()
        && !first.chars().next().is_some_and(|c| c.is_ascii_digit())
        && !NOT_DESCRIPTIONS.contains(&first.as_str())
}

fn rule_table() -> Vec<RuleSpec> {
    let fav = r"fav(?:ou?rite)?";
    let word = r"(\w[\w'-]*)";

    vec![
        // Name
        RuleSpec::specific(
            vec![
                format!(r"(?i)\bmy\s+name(?:\s+is|'s)\s+{word}"),
                format!(r"(?i)\bcall\s+me\s+{word}"),
            ],
            KeyStrategy::Fixed("name"),
        ),
        // Favorites: the color rule is checked before the generic one,
        // which leaves colors alone.
        RuleSpec::specific(
            vec![format!(r"(?i)\bmy\s+{fav}\s+colou?r\s+is\s+(\w+)")],
            KeyStrategy::Fixed("favorite_color"),
        ),
        RuleSpec::specific(
            vec![format!(r"(?i)\bmy\s+{fav}\s+(\w+)\s+is\s+(.+?){VALUE_END}")],
            KeyStrategy::Templated {
                prefix: "favorite_",
                suffix: "",
                exclude: &["color"],
            },
        ),
        // Self statements share a group so the generic "i am X" stays quiet
        // when a more specific statement was recognised.
        RuleSpec::specific(
            vec![
                r"(?i)\bi(?:\s+am|'m)\s+(\d{1,3})(?:\s+years?(?:\s+old)?|\s*(?:[.!?,;]|$))"
                    .to_string(),
                r"(?i)\bmy\s+age\s+is\s+(\d{1,3})\b".to_string(),
            ],
            KeyStrategy::Fixed("age"),
        )
        .in_group("self"),
        RuleSpec::specific(
            vec![format!(
                r"(?i)\bi(?:\s+live|'m\s+living|\s+am\s+living)\s+in\s+(.+?){VALUE_END}"
            )],
            KeyStrategy::Fixed("location"),
        )
        .in_group("self"),
        RuleSpec::specific(
            vec![format!(r"(?i)\bi(?:\s+am|'m|\s+come)\s+from\s+(.+?){VALUE_END}")],
            KeyStrategy::Fixed("origin"),
        )
        .in_group("self"),
        // Pets
        RuleSpec::specific(
            vec![format!(
                r"(?i)\bi\s+have\s+an?\s+(\w[\w\s-]*?)\s+(?:named|called)\s+{word}"
            )],
            KeyStrategy::Multi(&["pet", "pet_name"]),
        ),
        RuleSpec::specific(
            vec![
                format!(r"(?i)\bmy\s+pet(?:'s)?\s+name\s+is\s+{word}"),
                format!(r"(?i)\bmy\s+pet\s+is\s+(?:named|called)\s+{word}"),
            ],
            KeyStrategy::Fixed("pet_name"),
        ),
        RuleSpec::specific(
            vec![
                format!(r"(?i)\bmy\s+(\w+)'s\s+name\s+is\s+{word}"),
                format!(r"(?i)\bmy\s+(\w+)\s+is\s+(?:named|called)\s+{word}"),
            ],
            KeyStrategy::Templated {
                prefix: "",
                suffix: "_name",
                exclude: &["pet"],
            },
        ),
        RuleSpec::specific(
            vec![format!(r"(?i)\bmy\s+birthday\s+is\s+(?:on\s+)?(.+?){PHRASE_END}")],
            KeyStrategy::Fixed("birthday"),
        ),
        RuleSpec::specific(
            vec![
                format!(r"(?i)\bi\s+work\s+as\s+(?:an?\s+)?(.+?){VALUE_END}"),
                format!(r"(?i)\bmy\s+job\s+is\s+(.+?){VALUE_END}"),
                r"(?i)\bi(?:\s+am|'m)\s+an?\s+(\w[\w\s-]*?)\s+by\s+profession".to_string(),
            ],
            KeyStrategy::Fixed("occupation"),
        )
        .in_group("self"),
        RuleSpec::specific(
            vec![r"(?i)\bi\s+(?:like|love|enjoy)\s+(?:the\s+|an?\s+)?(\w+)".to_string()],
            KeyStrategy::Fixed("likes"),
        ),
        RuleSpec::specific(
            vec![format!(
                r"(?i)\bi(?:\s+am|'m)\s+(\w[\w'-]*(?:\s+\w[\w'-]*){{0,2}}?){VALUE_END}"
            )],
            KeyStrategy::Fixed("description"),
        )
        .in_group("self")
        .fallback()
        .accepting(is_description),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Vec<(String, String)> {
        FactExtractor::new()
            .extract(text)
            .into_iter()
            .map(|f| (f.key, f.value))
            .collect()
    }

    fn value_of(facts: &[(String, String)], key: &str) -> Option<String> {
        facts
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    #[test]
    fn test_all_rules_compile() {
        let extractor = FactExtractor::new();
        assert!(extractor.rule_count() >= 13);
    }

    #[test]
    fn test_name() {
        let facts = extract("Hi, my name is Alice.");
        assert_eq!(value_of(&facts, "name").as_deref(), Some("Alice"));

        let facts = extract("my name's bob");
        assert_eq!(value_of(&facts, "name").as_deref(), Some("bob"));
    }

    #[test]
    fn test_favorite_color_specific_rule() {
        let facts = extract("My favourite colour is Blue");
        assert_eq!(facts, vec![("favorite_color".to_string(), "Blue".to_string())]);
    }

    #[test]
    fn test_favorite_generic_rule() {
        let facts = extract("My favorite food is pizza.");
        assert_eq!(facts, vec![("favorite_food".to_string(), "pizza".to_string())]);
    }

    #[test]
    fn test_two_favorites_in_one_sentence() {
        let facts = extract("My favorite color is red and my favorite movie is Alien");
        assert_eq!(value_of(&facts, "favorite_color").as_deref(), Some("red"));
        assert_eq!(value_of(&facts, "favorite_movie").as_deref(), Some("Alien"));
    }

    #[test]
    fn test_values_keep_inner_conjunctions() {
        let facts = extract("My favorite food is mac and cheese.");
        assert_eq!(value_of(&facts, "favorite_food").as_deref(), Some("mac and cheese"));

        let facts = extract("I live in Trinidad and Tobago");
        assert_eq!(value_of(&facts, "location").as_deref(), Some("Trinidad and Tobago"));

        let facts = extract("My favorite movie is Fast and Furious");
        assert_eq!(value_of(&facts, "favorite_movie").as_deref(), Some("Fast and Furious"));
    }

    #[test]
    fn test_conjunction_before_new_clause_ends_value() {
        let facts = extract("I live in Rome but I'm from Naples");
        assert_eq!(value_of(&facts, "location").as_deref(), Some("Rome"));
        assert_eq!(value_of(&facts, "origin").as_deref(), Some("Naples"));
    }

    #[test]
    fn test_pet_yields_two_facts() {
        let facts = extract("I have a dog named Max");
        assert_eq!(value_of(&facts, "pet").as_deref(), Some("dog"));
        assert_eq!(value_of(&facts, "pet_name").as_deref(), Some("Max"));
    }

    #[test]
    fn test_multi_word_pet_type() {
        let facts = extract("i have a golden retriever called Buddy!");
        assert_eq!(value_of(&facts, "pet").as_deref(), Some("golden retriever"));
        assert_eq!(value_of(&facts, "pet_name").as_deref(), Some("Buddy"));
    }

    #[test]
    fn test_thing_name_template() {
        let facts = extract("My car's name is Herbie");
        assert_eq!(value_of(&facts, "car_name").as_deref(), Some("Herbie"));
    }

    #[test]
    fn test_pet_name_not_duplicated_by_template() {
        let facts = extract("my pet's name is Rex");
        assert_eq!(facts, vec![("pet_name".to_string(), "Rex".to_string())]);
    }

    #[test]
    fn test_age_and_location_in_one_sentence() {
        let facts = extract("I am 25 years old and I live in New York.");
        assert_eq!(value_of(&facts, "age").as_deref(), Some("25"));
        assert_eq!(value_of(&facts, "location").as_deref(), Some("New York"));
        assert!(value_of(&facts, "description").is_none());
    }

    #[test]
    fn test_numeric_age_beats_generic_i_am() {
        let facts = extract("I'm 30");
        assert_eq!(facts, vec![("age".to_string(), "30".to_string())]);
    }

    #[test]
    fn test_origin_suppresses_description() {
        let facts = extract("I'm from Lahore");
        assert_eq!(facts, vec![("origin".to_string(), "Lahore".to_string())]);
    }

    #[test]
    fn test_generic_description_fallback() {
        let facts = extract("I am a software engineer");
        assert!(value_of(&facts, "description").is_none());

        let facts = extract("I am happy");
        assert_eq!(value_of(&facts, "description").as_deref(), Some("happy"));
    }

    #[test]
    fn test_description_rejects_filler() {
        assert!(extract("I'm not sure").is_empty());
        assert!(extract("I am going home").is_empty());
    }

    #[test]
    fn test_birthday_keeps_commas() {
        let facts = extract("My birthday is March 3, 1990");
        assert_eq!(value_of(&facts, "birthday").as_deref(), Some("March 3, 1990"));
    }

    #[test]
    fn test_occupation() {
        let facts = extract("I work as a nurse");
        assert_eq!(value_of(&facts, "occupation").as_deref(), Some("nurse"));
    }

    #[test]
    fn test_likes() {
        let facts = extract("I love chess");
        assert_eq!(value_of(&facts, "likes").as_deref(), Some("chess"));
    }

    #[test]
    fn test_questions_yield_nothing() {
        assert!(extract("What's my favorite food?").is_empty());
        assert!(extract("what is my name").is_empty());
        assert!(extract("what is my dog's name?").is_empty());
        assert!(extract("how old am i").is_empty());
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert!(extract("").is_empty());
        assert!(extract("   \n\t ").is_empty());
    }

    #[test]
    fn test_arbitrary_unicode_does_not_panic() {
        let inputs = [
            "\u{1f600}\u{1f600} my name is \u{00c9}lodie",
            "ÄÖÜ my favorite ß is ẞ",
            "\u{0000}\u{ffff} i am \u{200b}",
            "日本語のテキスト",
        ];
        for input in inputs {
            let _ = extract(input);
        }
        let facts = extract("my name is \u{00c9}lodie");
        assert_eq!(value_of(&facts, "name").as_deref(), Some("\u{00c9}lodie"));
    }

    #[test]
    fn test_curly_apostrophe() {
        let facts = extract("I\u{2019}m 41 years old");
        assert_eq!(value_of(&facts, "age").as_deref(), Some("41"));
    }
}
