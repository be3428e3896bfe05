//! Extractor and null filter — payload bytes to `Message`.
//!
//! The extractor fails closed: anything it cannot use becomes a
//! [`Rejection`], never an error. The null filter then drops rejections and
//! counts them.

use serde::Deserialize;
use tracing::trace;

use crate::pipeline::types::{Message, RawRecord};
use crate::stats::PipelineStats;

/// Why a payload was dropped at extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// Not UTF-8, not JSON, or not a JSON object.
    Malformed,
    /// No usable integer identifier.
    MissingId,
    /// No text field.
    MissingText,
    /// Missing language, or not the target language.
    LanguageMismatch,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::MissingId => "missing_id",
            Self::MissingText => "missing_text",
            Self::LanguageMismatch => "language_mismatch",
        }
    }
}

/// The subset of the tweet wire format the pipeline reads.
#[derive(Debug, Deserialize)]
struct TweetPayload {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    id_str: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    full_text: Option<String>,
    #[serde(default)]
    lang: Option<String>,
}

/// Parses payloads and filters to the target language.
#[derive(Debug, Clone)]
pub struct Extractor {
    target_language: String,
}

impl Extractor {
    pub fn new(target_language: impl Into<String>) -> Self {
        Self {
            target_language: target_language.into().to_lowercase(),
        }
    }

    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    /// Extract a message from a raw queue record, discarding its envelope.
    pub fn extract_record(&self, record: RawRecord) -> Result<Message, Rejection> {
        self.extract(&record.into_payload())
    }

    /// Extract a message from payload bytes.
    pub fn extract(&self, payload: &[u8]) -> Result<Message, Rejection> {
        let tweet: TweetPayload =
            serde_json::from_slice(payload).map_err(|_| Rejection::Malformed)?;

        let id = parse_id(tweet.id.as_ref(), tweet.id_str.as_deref()).ok_or(Rejection::MissingId)?;

        let text = tweet
            .text
            .or(tweet.full_text)
            .ok_or(Rejection::MissingText)?;

        let language = tweet.lang.ok_or(Rejection::LanguageMismatch)?;
        if !language.eq_ignore_ascii_case(&self.target_language) {
            trace!(id, lang = %language, "Dropping tweet in non-target language");
            return Err(Rejection::LanguageMismatch);
        }

        Ok(Message {
            id,
            text,
            language: language.to_lowercase(),
        })
    }
}

/// Numeric `id` wins; `id_str` is the fallback used by the tweet wire format.
fn parse_id(id: Option<&serde_json::Value>, id_str: Option<&str>) -> Option<u64> {
    match id {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::Null) | None => id_str.and_then(|s| s.trim().parse().ok()),
        Some(_) => None,
    }
}

/// Keep extracted messages, drop rejections and count them.
pub fn filter_present<I>(results: I, stats: &PipelineStats) -> Vec<Message>
where
    I: IntoIterator<Item = Result<Message, Rejection>>,
{
    results
        .into_iter()
        .filter_map(|result| match result {
            Ok(message) => Some(message),
            Err(rejection) => {
                stats.record_rejection(rejection);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> Extractor {
        Extractor::new("en")
    }

    #[test]
    fn extracts_english_tweet() {
        let msg = extractor()
            .extract(br#"{"id": 1, "text": "I love this!!! ...", "lang": "en"}"#)
            .unwrap();
        assert_eq!(msg.id, 1);
        assert_eq!(msg.text, "I love this!!! ...");
        assert_eq!(msg.language, "en");
    }

    #[test]
    fn language_match_is_case_insensitive() {
        let msg = Extractor::new("EN")
            .extract(br#"{"id": 5, "text": "hi", "lang": "En"}"#)
            .unwrap();
        assert_eq!(msg.language, "en");
    }

    #[test]
    fn rejects_other_language() {
        let result = extractor().extract(br#"{"id": 2, "text": "J'adore", "lang": "fr"}"#);
        assert_eq!(result, Err(Rejection::LanguageMismatch));
    }

    #[test]
    fn rejects_missing_language() {
        let result = extractor().extract(br#"{"id": 2, "text": "hello"}"#);
        assert_eq!(result, Err(Rejection::LanguageMismatch));
    }

    #[test]
    fn rejects_malformed_payloads() {
        let ex = extractor();
        assert_eq!(ex.extract(b"not json"), Err(Rejection::Malformed));
        assert_eq!(ex.extract(b"[1, 2, 3]"), Err(Rejection::Malformed));
        assert_eq!(ex.extract(&[0xff, 0xfe, 0x00]), Err(Rejection::Malformed));
        assert_eq!(ex.extract(b""), Err(Rejection::Malformed));
    }

    #[test]
    fn rejects_bad_identifiers() {
        let ex = extractor();
        assert_eq!(
            ex.extract(br#"{"text": "hi", "lang": "en"}"#),
            Err(Rejection::MissingId)
        );
        assert_eq!(
            ex.extract(br#"{"id": -4, "text": "hi", "lang": "en"}"#),
            Err(Rejection::MissingId)
        );
        assert_eq!(
            ex.extract(br#"{"id": "abc", "text": "hi", "lang": "en"}"#),
            Err(Rejection::MissingId)
        );
        assert_eq!(
            ex.extract(br#"{"id": 1.5, "text": "hi", "lang": "en"}"#),
            Err(Rejection::MissingId)
        );
    }

    #[test]
    fn falls_back_to_id_str() {
        let msg = extractor()
            .extract(br#"{"id_str": "1234567890123", "text": "hi", "lang": "en"}"#)
            .unwrap();
        assert_eq!(msg.id, 1_234_567_890_123);
    }

    #[test]
    fn rejects_missing_text() {
        let result = extractor().extract(br#"{"id": 3, "lang": "en"}"#);
        assert_eq!(result, Err(Rejection::MissingText));
    }

    #[test]
    fn full_text_used_when_text_absent() {
        let msg = extractor()
            .extract(br#"{"id": 3, "full_text": "long form", "lang": "en"}"#)
            .unwrap();
        assert_eq!(msg.text, "long form");
    }

    #[test]
    fn extract_record_discards_envelope() {
        let record = RawRecord::new(0, 10, br#"{"id": 8, "text": "ok", "lang": "en"}"#.to_vec());
        let msg = extractor().extract_record(record).unwrap();
        assert_eq!(msg.id, 8);
    }

    #[test]
    fn filter_present_drops_and_counts_rejections() {
        let stats = PipelineStats::default();
        let ex = extractor();
        let results = vec![
            ex.extract(br#"{"id": 1, "text": "a", "lang": "en"}"#),
            ex.extract(br#"{"id": 2, "text": "b", "lang": "fr"}"#),
            ex.extract(b"garbage"),
            ex.extract(br#"{"id": 3, "text": "c", "lang": "en"}"#),
        ];
        let kept = filter_present(results, &stats);
        assert_eq!(kept.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1, 3]);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.rejected_language, 1);
        assert_eq!(snapshot.rejected_malformed, 1);
        assert_eq!(snapshot.rejected_total(), 2);
    }
}
