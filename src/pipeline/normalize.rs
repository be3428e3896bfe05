//! Text normalizer — noise removal, stop-words, stemming.
//!
//! Output text consists only of lowercase ASCII alphanumeric tokens that are
//! neither stop-words nor changed by another stemming pass, joined by single
//! spaces. Normalizing such text again returns it unchanged.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::pipeline::stem::stem_to_fixpoint;
use crate::pipeline::types::{Message, NormalizedMessage};

/// Whole tokens removed before character filtering.
static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S*").unwrap());
static MENTION_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@\w+").unwrap());
static RETWEET_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bRT\b").unwrap());
static SYMBOL_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9\s]+").unwrap());

/// English stop-words, matched after lowercasing.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "now", "of", "off", "on", "once", "only", "or",
    "other", "ought", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should",
    "so", "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your", "yours", "yourself", "yourselves", "im", "ive",
    "id", "youre", "thats", "u", "ur", "amp",
];

static STOP_WORD_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOP_WORDS.iter().copied().collect());

/// Returns true if `token` (any case) is a stop-word.
pub fn is_stop_word(token: &str) -> bool {
    if token.bytes().any(|b| b.is_ascii_uppercase()) {
        STOP_WORD_SET.contains(token.to_ascii_lowercase().as_str())
    } else {
        STOP_WORD_SET.contains(token)
    }
}

/// Cleans, filters and stems message text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextNormalizer;

impl TextNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, message: &Message) -> NormalizedMessage {
        NormalizedMessage {
            id: message.id,
            text: self.normalize_text(&message.text),
        }
    }

    /// Re-normalize an already normalized message (used for idempotence checks).
    pub fn renormalize(&self, message: &NormalizedMessage) -> NormalizedMessage {
        NormalizedMessage {
            id: message.id,
            text: self.normalize_text(&message.text),
        }
    }

    pub fn normalize_text(&self, text: &str) -> String {
        let cleaned = strip_noise(text);
        cleaned
            .split_whitespace()
            .filter(|token| !is_stop_word(token))
            .map(stem_to_fixpoint)
            .filter(|stem| !stem.is_empty() && !is_stop_word(stem))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Normalize a single lexicon entry so it matches normalized text tokens.
    pub fn normalize_token(&self, token: &str) -> Option<String> {
        let text = self.normalize_text(token);
        let mut tokens = text.split(' ').filter(|t| !t.is_empty());
        let first = tokens.next()?.to_string();
        // Multi-word entries cannot match a single token.
        match tokens.next() {
            Some(_) => None,
            None => Some(first),
        }
    }
}

/// Remove URLs, mentions, retweet markers and symbols; lowercase the rest.
fn strip_noise(text: &str) -> String {
    let text = URL_REGEX.replace_all(text, " ");
    let text = MENTION_REGEX.replace_all(&text, " ");
    let text = RETWEET_REGEX.replace_all(&text, " ");
    // Apostrophes join contractions ("don't" → "dont"); other symbols split.
    let text = text.replace(['\'', '\u{2019}'], "");
    let text = SYMBOL_REGEX.replace_all(&text, " ");
    text.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: u64, text: &str) -> Message {
        Message {
            id,
            text: text.into(),
            language: "en".into(),
        }
    }

    #[test]
    fn strips_punctuation_and_stop_words() {
        let normalized = TextNormalizer::new().normalize(&message(1, "I love this!!! ..."));
        assert_eq!(normalized.id, 1);
        assert_eq!(normalized.text, "love");
    }

    #[test]
    fn removes_urls_mentions_and_retweet_marker() {
        let text = "RT @someone: Great game tonight https://t.co/abc123 www.example.com/x";
        let normalized = TextNormalizer::new().normalize_text(text);
        assert_eq!(normalized, "great game tonight");
    }

    #[test]
    fn hashtags_keep_their_word() {
        let normalized = TextNormalizer::new().normalize_text("#Happy days");
        assert_eq!(normalized, "happi dai");
    }

    #[test]
    fn contractions_are_joined() {
        let normalized = TextNormalizer::new().normalize_text("I don't hate it");
        assert_eq!(normalized, "dont hate");
    }

    #[test]
    fn stop_words_case_insensitive() {
        assert!(is_stop_word("THE"));
        assert!(is_stop_word("The"));
        assert!(is_stop_word("the"));
        assert!(!is_stop_word("theme"));
    }

    #[test]
    fn stems_tokens() {
        let normalized = TextNormalizer::new().normalize_text("Loved the amazing movies");
        assert_eq!(normalized, "love amaz movi");
    }

    #[test]
    fn stems_that_become_stop_words_are_dropped() {
        // "ones" stems to "on", a stop-word.
        let normalized = TextNormalizer::new().normalize_text("good ones");
        assert_eq!(normalized, "good");
    }

    #[test]
    fn empty_and_noise_only_text() {
        let n = TextNormalizer::new();
        assert_eq!(n.normalize_text(""), "");
        assert_eq!(n.normalize_text("!!! ... @bob http://x.y"), "");
    }

    #[test]
    fn non_ascii_characters_removed() {
        let normalized = TextNormalizer::new().normalize_text("café 😀 great");
        assert_eq!(normalized, "caf great");
    }

    #[test]
    fn normalization_is_idempotent() {
        let n = TextNormalizer::new();
        let samples = [
            "I love this!!! ...",
            "RT @user: The agreed generalizations were conflated, ugh #fail",
            "Worst. Service. Ever!!! Never again :( http://bit.ly/x",
            "Happiness is underrated; the ones who know, know.",
            "2024 was a YEAR of relational databases",
            "",
        ];
        for sample in samples {
            let once = n.normalize(&message(7, sample));
            let twice = n.renormalize(&once);
            assert_eq!(once, twice, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn normalize_token_for_lexicon_entries() {
        let n = TextNormalizer::new();
        assert_eq!(n.normalize_token("loving").as_deref(), Some("love"));
        assert_eq!(n.normalize_token("the"), None);
        assert_eq!(n.normalize_token("well done"), None);
    }
}
