//! Sentiment pipeline stages.
//!
//! Every record in a window flows through:
//! 1. `Extractor::extract_record()` — payload to `Message`, language filter
//! 2. `filter_present()` — rejections dropped and counted
//! 3. `TextNormalizer::normalize()` — noise stripped, stop-words removed, stemmed
//! 4. Positive and negative `Scorer`s — two independent sides over the same input
//! 5. `WindowJoiner::join()` — inner join of the sides by id
//! 6. `Labeler::label()` — categorical label per joined record
//!
//! The stages are pure. Scheduling, parallelism and the join deadline live
//! in [`crate::window`].

pub mod extract;
pub mod join;
pub mod label;
pub mod lexicon;
pub mod normalize;
pub mod stem;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::pipeline::extract::{Extractor, filter_present};
use crate::pipeline::join::WindowJoiner;
use crate::pipeline::label::{LabelRule, Labeler};
use crate::pipeline::lexicon::{Lexicon, LexiconScorer, ScoreNormalization, Scorer};
use crate::pipeline::normalize::TextNormalizer;
use crate::pipeline::types::{
    LabeledRecord, NormalizedMessage, Polarity, RawRecord, ScoredMessage,
};
use crate::stats::PipelineStats;

/// The full stage chain for one window's worth of records.
#[derive(Clone)]
pub struct Pipeline {
    extractor: Extractor,
    normalizer: TextNormalizer,
    positive: Arc<dyn Scorer>,
    negative: Arc<dyn Scorer>,
    joiner: WindowJoiner,
    labeler: Labeler,
}

impl Pipeline {
    /// Built-in lexicons, summed scores, zero-margin labels.
    pub fn new(target_language: impl Into<String>) -> Self {
        let normalizer = TextNormalizer::new();
        let scorer = |polarity: Polarity| -> Arc<dyn Scorer> {
            Arc::new(LexiconScorer::new(
                Lexicon::builtin(polarity, &normalizer),
                ScoreNormalization::Sum,
            ))
        };
        Self {
            extractor: Extractor::new(target_language),
            normalizer,
            positive: scorer(Polarity::Positive),
            negative: scorer(Polarity::Negative),
            joiner: WindowJoiner::new(),
            labeler: Labeler::default(),
        }
    }

    /// Build from configuration, loading lexicon files when given.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let normalizer = TextNormalizer::new();
        let load = |polarity: Polarity, path: Option<&Path>| -> Result<Arc<dyn Scorer>, ConfigError> {
            let lexicon = match path {
                Some(path) => Lexicon::from_path(polarity, path, &normalizer)?,
                None => Lexicon::builtin(polarity, &normalizer),
            };
            if lexicon.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("{polarity} lexicon"),
                    message: "no usable entries".into(),
                });
            }
            Ok(Arc::new(LexiconScorer::new(lexicon, config.score_normalization)))
        };

        Ok(Self {
            extractor: Extractor::new(config.target_language.clone()),
            normalizer,
            positive: load(Polarity::Positive, config.positive_lexicon.as_deref())?,
            negative: load(Polarity::Negative, config.negative_lexicon.as_deref())?,
            joiner: WindowJoiner::new(),
            labeler: Labeler::new(config.label_rule),
        })
    }

    /// Replace the scorer for the side it reports as its polarity.
    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        match scorer.polarity() {
            Polarity::Positive => self.positive = scorer,
            Polarity::Negative => self.negative = scorer,
        }
        self
    }

    pub fn with_label_rule(mut self, rule: LabelRule) -> Self {
        self.labeler = Labeler::new(rule);
        self
    }

    pub fn target_language(&self) -> &str {
        self.extractor.target_language()
    }

    pub fn scorer(&self, polarity: Polarity) -> Arc<dyn Scorer> {
        match polarity {
            Polarity::Positive => Arc::clone(&self.positive),
            Polarity::Negative => Arc::clone(&self.negative),
        }
    }

    /// Extract, filter and normalize. Rejections are counted in `stats`.
    pub fn prepare(&self, records: Vec<RawRecord>, stats: &PipelineStats) -> Vec<NormalizedMessage> {
        let extracted = records
            .into_iter()
            .map(|record| self.extractor.extract_record(record));
        filter_present(extracted, stats)
            .iter()
            .map(|message| self.normalizer.normalize(message))
            .collect()
    }

    /// Join both scored sides and label the result.
    pub fn finish(
        &self,
        positive: Vec<ScoredMessage>,
        negative: Vec<ScoredMessage>,
    ) -> Vec<LabeledRecord> {
        self.joiner
            .join(positive, negative)
            .into_iter()
            .map(|record| self.labeler.label(record))
            .collect()
    }

    /// Run every stage on the calling thread.
    pub fn run(&self, records: Vec<RawRecord>, stats: &PipelineStats) -> Vec<LabeledRecord> {
        let prepared = self.prepare(records, stats);
        let positive = score_all(self.positive.as_ref(), &prepared);
        let negative = score_all(self.negative.as_ref(), &prepared);
        let labeled = self.finish(positive, negative);
        stats.record_labeled(labeled.len());
        labeled
    }
}

/// Score every message with one side's scorer.
pub fn score_all(scorer: &dyn Scorer, messages: &[NormalizedMessage]) -> Vec<ScoredMessage> {
    messages.iter().map(|m| scorer.score_message(m)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{Label, Score};

    fn raw(offset: u64, json: &str) -> RawRecord {
        RawRecord::new(0, offset, json.as_bytes().to_vec())
    }

    #[test]
    fn english_tweet_is_labeled_positive() {
        let stats = PipelineStats::default();
        let labeled = Pipeline::new("en").run(
            vec![raw(0, r#"{"id": 1, "text": "I love this!!! ...", "lang": "en"}"#)],
            &stats,
        );
        assert_eq!(labeled.len(), 1);
        assert_eq!(labeled[0].id, 1);
        assert_eq!(labeled[0].text, "love");
        assert_eq!(labeled[0].label, Label::Positive);
        assert_eq!(stats.snapshot().records_labeled, 1);
    }

    #[test]
    fn rejected_records_never_reach_labeler() {
        let stats = PipelineStats::default();
        let labeled = Pipeline::new("en").run(
            vec![
                raw(0, r#"{"id": 2, "text": "je deteste ca", "lang": "fr"}"#),
                raw(1, "not json"),
                raw(2, r#"{"text": "no id", "lang": "en"}"#),
                raw(3, r#"{"id": 3, "text": "I hate rain", "lang": "en"}"#),
            ],
            &stats,
        );
        assert_eq!(labeled.len(), 1);
        assert_eq!(labeled[0].id, 3);
        assert_eq!(labeled[0].label, Label::Negative);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.rejected_total(), 3);
        assert_eq!(snapshot.rejected_language, 1);
    }

    #[test]
    fn prepared_text_is_already_normalized() {
        let pipeline = Pipeline::new("en");
        let prepared = pipeline.prepare(
            vec![raw(0, r#"{"id": 5, "text": "RT @bob Loving the sunny days https://t.co/x", "lang": "en"}"#)],
            &PipelineStats::default(),
        );
        let normalizer = TextNormalizer::new();
        assert_eq!(normalizer.renormalize(&prepared[0]), prepared[0]);
    }

    struct Constant(Polarity, Score);

    impl Scorer for Constant {
        fn polarity(&self) -> Polarity {
            self.0
        }

        fn score(&self, _text: &str) -> Score {
            self.1
        }
    }

    #[test]
    fn with_scorer_replaces_matching_side() {
        let pipeline = Pipeline::new("en").with_scorer(Arc::new(Constant(Polarity::Negative, 9.0)));
        let labeled = pipeline.run(
            vec![raw(0, r#"{"id": 1, "text": "love love love", "lang": "en"}"#)],
            &PipelineStats::default(),
        );
        assert_eq!(labeled[0].negative_score, 9.0);
        assert_eq!(labeled[0].label, Label::Negative);
    }

    #[test]
    fn margin_applies_through_pipeline() {
        let pipeline = Pipeline::new("en").with_label_rule(LabelRule { margin: 5.0 });
        let labeled = pipeline.run(
            vec![raw(0, r#"{"id": 1, "text": "love it", "lang": "en"}"#)],
            &PipelineStats::default(),
        );
        assert_eq!(labeled[0].label, Label::Neutral);
    }

    #[test]
    fn from_config_rejects_empty_lexicon_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positive.txt");
        std::fs::write(&path, "; only comments\n\n").unwrap();
        let config = PipelineConfig {
            positive_lexicon: Some(path),
            ..Default::default()
        };
        assert!(matches!(
            Pipeline::from_config(&config),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
