//! Configuration types.
//!
//! A [`PipelineConfig`] is built once at startup (defaults, or `SENTIMENT_*`
//! environment variables) and passed by value into the runtime.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::pipeline::label::LabelRule;
use crate::pipeline::lexicon::ScoreNormalization;
use crate::sink::retry::RetryPolicy;

/// Longest supported window.
const MAX_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// What happens to a record whose queue timestamp precedes the open window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LatePolicy {
    /// Drop it and count it.
    #[default]
    Drop,
    /// Process it in the window that is currently open.
    MergeIntoNext,
}

impl FromStr for LatePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "merge" | "merge_into_next" => Ok(Self::MergeIntoNext),
            other => Err(ConfigError::InvalidValue {
                key: "SENTIMENT_LATE_POLICY".into(),
                message: format!("expected drop or merge, got {other:?}"),
            }),
        }
    }
}

/// Core pipeline and scheduler configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Queue topic the partitions belong to.
    pub topic: String,
    /// Number of queue partitions (one scheduler each).
    pub partitions: u32,
    /// Fixed window length.
    pub window_duration: Duration,
    /// Language code messages must carry.
    pub target_language: String,
    /// Chunks each window is split into for the blocking stages.
    pub workers: usize,
    /// How long after a window closes its join may wait for both sides.
    pub join_timeout: Duration,
    pub late_policy: LatePolicy,
    /// Closed windows that may await processing or dispatch per partition.
    /// Also bounds the windows whose notifications are still being sent.
    pub max_in_flight_windows: usize,
    /// Budget for one window's live notifications, from the moment its
    /// durable write starts. Records not sent by then are dropped.
    pub notify_deadline: Duration,
    /// How long shutdown waits for in-flight windows.
    pub shutdown_grace: Duration,
    /// Durable sink retry policy.
    pub retry: RetryPolicy,
    pub label_rule: LabelRule,
    pub score_normalization: ScoreNormalization,
    /// Optional word list replacing the built-in positive lexicon.
    pub positive_lexicon: Option<PathBuf>,
    /// Optional word list replacing the built-in negative lexicon.
    pub negative_lexicon: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let window_duration = Duration::from_millis(2000);
        Self {
            topic: "tweets".to_string(),
            partitions: 1,
            window_duration,
            target_language: "en".to_string(),
            workers: 4,
            join_timeout: window_duration,
            late_policy: LatePolicy::Drop,
            max_in_flight_windows: 2,
            notify_deadline: window_duration,
            shutdown_grace: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            label_rule: LabelRule::default(),
            score_normalization: ScoreNormalization::Sum,
            positive_lexicon: None,
            negative_lexicon: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `SENTIMENT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(topic) = lookup("SENTIMENT_TOPIC") {
            config.topic = topic;
        }
        if let Some(n) = parse(&lookup, "SENTIMENT_PARTITIONS")? {
            config.partitions = n;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "SENTIMENT_WINDOW_MS")? {
            config.window_duration = Duration::from_millis(ms);
            config.join_timeout = config.window_duration;
            config.notify_deadline = config.window_duration;
        }
        if let Some(lang) = lookup("SENTIMENT_LANGUAGE") {
            config.target_language = lang;
        }
        if let Some(n) = parse(&lookup, "SENTIMENT_WORKERS")? {
            config.workers = n;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "SENTIMENT_JOIN_TIMEOUT_MS")? {
            config.join_timeout = Duration::from_millis(ms);
        }
        if let Some(policy) = lookup("SENTIMENT_LATE_POLICY") {
            config.late_policy = policy.parse()?;
        }
        if let Some(n) = parse(&lookup, "SENTIMENT_MAX_IN_FLIGHT")? {
            config.max_in_flight_windows = n;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "SENTIMENT_NOTIFY_DEADLINE_MS")? {
            config.notify_deadline = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "SENTIMENT_SHUTDOWN_GRACE_MS")? {
            config.shutdown_grace = Duration::from_millis(ms);
        }
        if let Some(n) = parse(&lookup, "SENTIMENT_RETRY_ATTEMPTS")? {
            config.retry.max_attempts = n;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "SENTIMENT_RETRY_BASE_MS")? {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "SENTIMENT_RETRY_MAX_MS")? {
            config.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(margin) = parse(&lookup, "SENTIMENT_LABEL_MARGIN")? {
            config.label_rule = LabelRule { margin };
        }
        if let Some(mode) = lookup("SENTIMENT_SCORE_MODE") {
            config.score_normalization = match mode.trim().to_ascii_lowercase().as_str() {
                "sum" => ScoreNormalization::Sum,
                "per_token" | "ratio" => ScoreNormalization::PerToken,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "SENTIMENT_SCORE_MODE".into(),
                        message: format!("expected sum or per_token, got {other:?}"),
                    });
                }
            };
        }
        config.positive_lexicon = lookup("SENTIMENT_POSITIVE_WORDS").map(PathBuf::from);
        config.negative_lexicon = lookup("SENTIMENT_NEGATIVE_WORDS").map(PathBuf::from);

        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(key: &str, message: &str) -> ConfigError {
            ConfigError::InvalidValue {
                key: key.into(),
                message: message.into(),
            }
        }

        if self.partitions == 0 {
            return Err(invalid("partitions", "must be at least 1"));
        }
        if self.window_duration.is_zero() {
            return Err(invalid("window_duration", "must be greater than zero"));
        }
        if self.window_duration > MAX_WINDOW {
            return Err(invalid("window_duration", "must be at most 24 hours"));
        }
        if self.join_timeout.is_zero() {
            return Err(invalid("join_timeout", "must be greater than zero"));
        }
        if self.notify_deadline.is_zero() {
            return Err(invalid("notify_deadline", "must be greater than zero"));
        }
        if self.workers == 0 {
            return Err(invalid("workers", "must be at least 1"));
        }
        if self.max_in_flight_windows == 0 {
            return Err(invalid("max_in_flight_windows", "must be at least 1"));
        }
        if self.target_language.trim().is_empty() {
            return Err(invalid("target_language", "must not be empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if !self.label_rule.margin.is_finite() || self.label_rule.margin < 0.0 {
            return Err(invalid("label_rule.margin", "must be finite and >= 0"));
        }
        Ok(())
    }
}

/// Where finished windows go.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Root directory for the JSON-lines durable sink.
    pub output_dir: Option<PathBuf>,
    /// libSQL database file for the table durable sink.
    pub db_path: Option<PathBuf>,
    /// Endpoint receiving one POST per labeled record.
    pub notify_url: Option<String>,
    /// Bearer token sent to the notify endpoint.
    pub notify_token: Option<SecretString>,
    pub notify_timeout: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            db_path: None,
            notify_url: None,
            notify_token: None,
            notify_timeout: Duration::from_secs(5),
        }
    }
}

impl SinkConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            output_dir: lookup("SENTIMENT_OUTPUT_DIR").map(PathBuf::from),
            db_path: lookup("SENTIMENT_DB_PATH").map(PathBuf::from),
            notify_url: lookup("SENTIMENT_NOTIFY_URL"),
            notify_token: lookup("SENTIMENT_NOTIFY_TOKEN").map(SecretString::from),
            ..Default::default()
        };
        if let Some(ms) = parse::<u64, _>(&lookup, "SENTIMENT_NOTIFY_TIMEOUT_MS")? {
            config.notify_timeout = Duration::from_millis(ms);
        }
        if let Some(url) = &config.notify_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    key: "SENTIMENT_NOTIFY_URL".into(),
                    message: format!("expected an http(s) URL, got {url:?}"),
                });
            }
        }
        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.window_duration, Duration::from_millis(2000));
        assert_eq!(config.join_timeout, config.window_duration);
        assert_eq!(config.late_policy, LatePolicy::Drop);
        assert_eq!(config.target_language, "en");
    }

    #[test]
    fn env_overrides() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("SENTIMENT_TOPIC", "firehose"),
            ("SENTIMENT_PARTITIONS", "3"),
            ("SENTIMENT_WINDOW_MS", "500"),
            ("SENTIMENT_LATE_POLICY", "merge"),
            ("SENTIMENT_LABEL_MARGIN", "0.5"),
            ("SENTIMENT_SCORE_MODE", "per_token"),
        ]))
        .unwrap();
        assert_eq!(config.topic, "firehose");
        assert_eq!(config.partitions, 3);
        assert_eq!(config.window_duration, Duration::from_millis(500));
        assert_eq!(config.join_timeout, Duration::from_millis(500));
        assert_eq!(config.late_policy, LatePolicy::MergeIntoNext);
        assert_eq!(config.label_rule.margin, 0.5);
        assert_eq!(config.score_normalization, ScoreNormalization::PerToken);
    }

    #[test]
    fn explicit_join_timeout_wins_over_window_default() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("SENTIMENT_JOIN_TIMEOUT_MS", "750"),
            ("SENTIMENT_WINDOW_MS", "500"),
        ]))
        .unwrap();
        assert_eq!(config.join_timeout, Duration::from_millis(750));
        assert_eq!(config.notify_deadline, Duration::from_millis(500));
    }

    #[test]
    fn notify_deadline_override() {
        let config = PipelineConfig::from_lookup(lookup_from(&[(
            "SENTIMENT_NOTIFY_DEADLINE_MS",
            "300",
        )]))
        .unwrap();
        assert_eq!(config.notify_deadline, Duration::from_millis(300));

        let err = PipelineConfig::from_lookup(lookup_from(&[("SENTIMENT_NOTIFY_DEADLINE_MS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "notify_deadline"));
    }

    #[test]
    fn rejects_unparseable_values() {
        let err = PipelineConfig::from_lookup(lookup_from(&[("SENTIMENT_WORKERS", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SENTIMENT_WORKERS"));
    }

    #[test]
    fn rejects_zero_window() {
        let err = PipelineConfig::from_lookup(lookup_from(&[("SENTIMENT_WINDOW_MS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn rejects_unknown_late_policy() {
        assert!("sometimes".parse::<LatePolicy>().is_err());
        assert_eq!("DROP".parse::<LatePolicy>().unwrap(), LatePolicy::Drop);
    }

    #[test]
    fn sink_config_validates_url() {
        let err = SinkConfig::from_lookup(lookup_from(&[("SENTIMENT_NOTIFY_URL", "ftp://x")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let ok = SinkConfig::from_lookup(lookup_from(&[
            ("SENTIMENT_NOTIFY_URL", "http://localhost:9000/tweets"),
            ("SENTIMENT_NOTIFY_TOKEN", "secret"),
        ]))
        .unwrap();
        assert!(ok.notify_token.is_some());
        assert_eq!(ok.notify_timeout, Duration::from_secs(5));
    }
}
