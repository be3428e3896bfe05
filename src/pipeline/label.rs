//! Labeler — categorical sentiment from a pair of scores.

use serde::Deserialize;

use crate::pipeline::types::{JoinedRecord, Label, LabeledRecord, Score};

/// Decision rule: one side must exceed the other by more than `margin`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LabelRule {
    pub margin: Score,
}

impl Default for LabelRule {
    fn default() -> Self {
        Self { margin: 0.0 }
    }
}

impl LabelRule {
    /// Total over all score pairs; anything not clearly dominant is neutral.
    pub fn classify(&self, positive: Score, negative: Score) -> Label {
        if positive - negative > self.margin {
            Label::Positive
        } else if negative - positive > self.margin {
            Label::Negative
        } else {
            Label::Neutral
        }
    }
}

/// Attaches a label to each joined record.
#[derive(Debug, Clone, Copy, Default)]
pub struct Labeler {
    rule: LabelRule,
}

impl Labeler {
    pub fn new(rule: LabelRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> LabelRule {
        self.rule
    }

    pub fn label(&self, record: JoinedRecord) -> LabeledRecord {
        let label = self.rule.classify(record.positive_score, record.negative_score);
        LabeledRecord {
            id: record.id,
            text: record.text,
            positive_score: record.positive_score,
            negative_score: record.negative_score,
            label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominant_side_wins() {
        let rule = LabelRule::default();
        assert_eq!(rule.classify(2.0, 1.0), Label::Positive);
        assert_eq!(rule.classify(0.0, 0.5), Label::Negative);
    }

    #[test]
    fn equal_and_zero_are_neutral() {
        let rule = LabelRule::default();
        assert_eq!(rule.classify(0.0, 0.0), Label::Neutral);
        assert_eq!(rule.classify(1.5, 1.5), Label::Neutral);
    }

    #[test]
    fn margin_widens_neutral_band() {
        let rule = LabelRule { margin: 1.0 };
        assert_eq!(rule.classify(1.5, 1.0), Label::Neutral);
        assert_eq!(rule.classify(2.5, 1.0), Label::Positive);
        assert_eq!(rule.classify(1.0, 2.5), Label::Negative);
    }

    #[test]
    fn total_and_deterministic() {
        let rule = LabelRule { margin: 0.25 };
        let values = [0.0, 0.1, 0.25, 0.5, 1.0, 3.0, f32::MAX, f32::INFINITY, f32::NAN];
        for &pos in &values {
            for &neg in &values {
                let first = rule.classify(pos, neg);
                let second = rule.classify(pos, neg);
                assert_eq!(first, second, "classify({pos}, {neg})");
            }
        }
        assert_eq!(rule.classify(f32::NAN, 1.0), Label::Neutral);
    }

    #[test]
    fn label_preserves_fields() {
        let labeled = Labeler::default().label(JoinedRecord {
            id: 11,
            text: "love".into(),
            positive_score: 1.0,
            negative_score: 0.0,
        });
        assert_eq!(labeled.id, 11);
        assert_eq!(labeled.text, "love");
        assert_eq!(labeled.label, Label::Positive);
    }
}
