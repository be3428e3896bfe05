//! Sentiment lexicons and the lexicon scorers built on them.
//!
//! Lexicon keys are normalized with the same [`TextNormalizer`] the pipeline
//! applies to message text, so "loving" in a word list matches the token
//! "love" in a normalized tweet.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::pipeline::normalize::TextNormalizer;
use crate::pipeline::types::{NormalizedMessage, Polarity, Score, ScoredMessage};

const POSITIVE_WORDS: &[&str] = &[
    "amazing", "awesome", "beautiful", "best", "better", "bliss", "brilliant", "calm", "celebrate",
    "charming", "cheerful", "clean", "congratulations", "cool", "cute", "delight", "delightful",
    "easy", "enjoy", "enjoyed", "excellent", "excited", "exciting", "fabulous", "fantastic",
    "fast", "favorite", "fine", "fortunate", "free", "fresh", "friendly", "fun", "funny", "glad",
    "good", "gorgeous", "grateful", "great", "happy", "helpful", "hilarious", "hope", "hopeful",
    "impressive", "incredible", "inspiring", "joy", "kind", "laugh", "like", "love", "loved",
    "lovely", "loving", "lucky", "magnificent", "marvelous", "nice", "perfect", "pleasant",
    "pleased", "positive", "pretty", "proud", "recommend", "relaxed", "reliable", "respect",
    "rich", "safe", "satisfied", "smart", "smile", "smooth", "stunning", "success", "successful",
    "super", "superb", "support", "sweet", "thank", "thanks", "thrilled", "top",
    "welcome", "win", "winner", "wonderful", "wow", "yay",
];

const NEGATIVE_WORDS: &[&str] = &[
    "abuse", "afraid", "angry", "annoyed", "annoying", "anxious", "ashamed", "awful", "bad",
    "boring", "broke", "broken", "bug", "cheap", "complain", "confused", "crap", "crash", "cruel",
    "cry", "damn", "dead", "depressed", "difficult", "dirty", "disappointed", "disappointing",
    "disaster", "disgusting", "dislike", "dreadful", "dumb", "error", "evil", "fail", "failed",
    "failure", "fake", "fear", "filthy", "gross", "guilty", "hard", "hate", "hated", "hell",
    "horrible", "hurt", "ill", "kill", "lame", "lazy", "liar", "lose", "loser", "lost", "mad",
    "mess", "miserable", "miss", "nasty", "negative", "never", "no", "not", "pain", "pathetic",
    "poor", "problem", "rude", "sad", "scam", "scared", "shame", "sick", "slow", "sorry",
    "stupid", "suck", "sucks", "terrible", "tired", "ugh", "ugly", "unfair", "unhappy", "upset",
    "useless", "waste", "weak", "worse", "worst", "wrong",
];

/// How per-token weights are combined into a score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreNormalization {
    /// Sum of matched weights.
    #[default]
    Sum,
    /// Sum of matched weights divided by the number of tokens.
    PerToken,
}

/// Static mapping from normalized token to non-negative weight.
#[derive(Debug, Clone)]
pub struct Lexicon {
    polarity: Polarity,
    weights: HashMap<String, f32>,
}

impl Lexicon {
    /// Built-in English lexicon for a polarity, each word weighted 1.0.
    pub fn builtin(polarity: Polarity, normalizer: &TextNormalizer) -> Self {
        let words = match polarity {
            Polarity::Positive => POSITIVE_WORDS,
            Polarity::Negative => NEGATIVE_WORDS,
        };
        Self::from_weighted(polarity, words.iter().map(|w| (*w, 1.0)), normalizer)
    }

    /// Build from `(word, weight)` pairs. Entries that normalize away
    /// (stop-words, multi-word phrases) are skipped; when two words share a
    /// stem the larger weight wins.
    pub fn from_weighted<'a, I>(polarity: Polarity, entries: I, normalizer: &TextNormalizer) -> Self
    where
        I: IntoIterator<Item = (&'a str, f32)>,
    {
        let mut weights: HashMap<String, f32> = HashMap::new();
        for (word, weight) in entries {
            if !weight.is_finite() || weight < 0.0 {
                warn!(word, weight, "Skipping lexicon entry with invalid weight");
                continue;
            }
            let Some(key) = normalizer.normalize_token(word) else {
                debug!(word, "Lexicon entry normalizes to nothing, skipping");
                continue;
            };
            weights
                .entry(key)
                .and_modify(|w| *w = w.max(weight))
                .or_insert(weight);
        }
        Self { polarity, weights }
    }

    /// Parse a word list: one word per line, optional `word<TAB>weight`,
    /// blank lines and `;` comment lines ignored.
    pub fn parse(
        polarity: Polarity,
        source: &str,
        normalizer: &TextNormalizer,
    ) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();
        for (lineno, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let (word, weight) = match line.split_once('\t') {
                Some((word, weight)) => {
                    let weight: f32 = weight.trim().parse().map_err(|_| {
                        ConfigError::ParseError(format!(
                            "{polarity} lexicon line {}: bad weight {weight:?}",
                            lineno + 1
                        ))
                    })?;
                    if !weight.is_finite() || weight < 0.0 {
                        return Err(ConfigError::InvalidValue {
                            key: format!("{polarity} lexicon line {}", lineno + 1),
                            message: format!("weight must be finite and >= 0, got {weight}"),
                        });
                    }
                    (word.trim(), weight)
                }
                None => (line, 1.0),
            };
            entries.push((word, weight));
        }
        Ok(Self::from_weighted(polarity, entries, normalizer))
    }

    /// Load a word list file (see [`Lexicon::parse`]).
    pub fn from_path(
        polarity: Polarity,
        path: &Path,
        normalizer: &TextNormalizer,
    ) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        let lexicon = Self::parse(polarity, &source, normalizer)?;
        debug!(
            path = %path.display(),
            polarity = %polarity,
            entries = lexicon.len(),
            "Loaded lexicon"
        );
        Ok(lexicon)
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn weight(&self, token: &str) -> f32 {
        self.weights.get(token).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.weights.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// A stateless polarity scorer.
///
/// Implementations must be pure: the same text always yields the same score,
/// and scoring shares no mutable state with any other scorer.
pub trait Scorer: Send + Sync {
    fn polarity(&self) -> Polarity;

    fn score(&self, text: &str) -> Score;

    fn score_message(&self, message: &NormalizedMessage) -> ScoredMessage {
        ScoredMessage {
            id: message.id,
            text: message.text.clone(),
            score: self.score(&message.text),
        }
    }
}

/// Sums lexicon weights over whitespace tokens.
#[derive(Debug, Clone)]
pub struct LexiconScorer {
    lexicon: Lexicon,
    normalization: ScoreNormalization,
}

impl LexiconScorer {
    pub fn new(lexicon: Lexicon, normalization: ScoreNormalization) -> Self {
        Self {
            lexicon,
            normalization,
        }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }
}

impl Scorer for LexiconScorer {
    fn polarity(&self) -> Polarity {
        self.lexicon.polarity()
    }

    fn score(&self, text: &str) -> Score {
        let mut tokens = 0usize;
        let mut total = 0.0f32;
        for token in text.split_whitespace() {
            tokens += 1;
            total += self.lexicon.weight(token);
        }
        match self.normalization {
            ScoreNormalization::Sum => total,
            ScoreNormalization::PerToken if tokens == 0 => 0.0,
            ScoreNormalization::PerToken => total / tokens as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> TextNormalizer {
        TextNormalizer::new()
    }

    fn scorer(polarity: Polarity) -> LexiconScorer {
        LexiconScorer::new(
            Lexicon::builtin(polarity, &normalizer()),
            ScoreNormalization::Sum,
        )
    }

    #[test]
    fn builtin_keys_are_normalized() {
        let lex = Lexicon::builtin(Polarity::Positive, &normalizer());
        assert!(lex.contains("love"));
        assert!(lex.contains("happi"));
        assert!(!lex.contains("happy"));
    }

    #[test]
    fn builtin_lexicons_score_normalized_text() {
        let n = normalizer();
        let text = n.normalize_text("I loved it, happy and thankful");
        assert!(scorer(Polarity::Positive).score(&text) >= 2.0);
        assert_eq!(scorer(Polarity::Negative).score(&text), 0.0);
    }

    #[test]
    fn unknown_tokens_contribute_zero() {
        assert_eq!(scorer(Polarity::Positive).score("xyzzy plugh"), 0.0);
        assert_eq!(scorer(Polarity::Positive).score(""), 0.0);
    }

    #[test]
    fn sums_repeated_tokens() {
        assert_eq!(scorer(Polarity::Negative).score("hate hate"), 2.0);
    }

    #[test]
    fn per_token_normalization() {
        let lex = Lexicon::builtin(Polarity::Positive, &normalizer());
        let s = LexiconScorer::new(lex, ScoreNormalization::PerToken);
        assert!((s.score("love xyzzy") - 0.5).abs() < f32::EPSILON);
        assert_eq!(s.score(""), 0.0);
    }

    #[test]
    fn parse_word_list_with_weights_and_comments() {
        let source = "; opinion lexicon\n\nsuperb\t2.5\ngood\n the \n";
        let lex = Lexicon::parse(Polarity::Positive, source, &normalizer()).unwrap();
        assert_eq!(lex.len(), 2);
        assert_eq!(lex.weight("superb"), 2.5);
        assert_eq!(lex.weight("good"), 1.0);
    }

    #[test]
    fn parse_rejects_bad_weights() {
        let n = normalizer();
        assert!(matches!(
            Lexicon::parse(Polarity::Negative, "bad\tlots", &n),
            Err(ConfigError::ParseError(_))
        ));
        assert!(matches!(
            Lexicon::parse(Polarity::Negative, "bad\t-1", &n),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn shared_stem_keeps_larger_weight() {
        let lex = Lexicon::from_weighted(
            Polarity::Positive,
            [("loved", 1.0), ("loving", 3.0), ("love", 2.0)],
            &normalizer(),
        );
        assert_eq!(lex.len(), 1);
        assert_eq!(lex.weight("love"), 3.0);
    }

    #[test]
    fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("neg-words.txt");
        std::fs::write(&path, "awful\nterrible\t2\n").unwrap();
        let lex = Lexicon::from_path(Polarity::Negative, &path, &normalizer()).unwrap();
        assert_eq!(lex.polarity(), Polarity::Negative);
        assert_eq!(lex.weight("terribl"), 2.0);
    }

    #[test]
    fn score_message_preserves_identity() {
        let msg = NormalizedMessage {
            id: 42,
            text: "love".into(),
        };
        let scored = scorer(Polarity::Positive).score_message(&msg);
        assert_eq!(scored.id, 42);
        assert_eq!(scored.text, "love");
        assert_eq!(scored.score, 1.0);
    }
}
