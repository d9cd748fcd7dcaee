use serde::{Deserialize, Serialize};

use crate::error::{SpeechError, SpeechResult};

/// Default sentence rule: any text, a terminal punctuation mark, one whitespace char.
pub const DEFAULT_SENTENCE_PATTERN: &str = r"(?s).*?[。！？!:.?]\s";

/// How the accumulator decides that enough text has been buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Count every occurrence of any configured delimiter substring.
    DelimiterCount,
    /// Count complete sentences matched by the sentence pattern.
    #[default]
    SentencePattern,
}

/// Configuration of a [`SegmentAccumulator`](crate::SegmentAccumulator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulatorConfig {
    pub threshold_mode: ThresholdMode,
    pub threshold_value: usize,
    /// Only consulted in [`ThresholdMode::DelimiterCount`].
    pub delimiters: Vec<String>,
    /// Overrides [`DEFAULT_SENTENCE_PATTERN`] in [`ThresholdMode::SentencePattern`].
    pub sentence_pattern: Option<String>,
}

impl AccumulatorConfig {
    pub fn delimiter_count(threshold: usize, delimiters: &[&str]) -> Self {
        Self {
            threshold_mode: ThresholdMode::DelimiterCount,
            threshold_value: threshold,
            delimiters: delimiters.iter().map(|d| d.to_string()).collect(),
            sentence_pattern: None,
        }
    }

    pub fn sentence_pattern(threshold: usize) -> Self {
        Self {
            threshold_mode: ThresholdMode::SentencePattern,
            threshold_value: threshold,
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold_value = threshold;
        self
    }

    pub fn with_delimiters<I, S>(mut self, delimiters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.delimiters = delimiters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sentence_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.sentence_pattern = Some(pattern.into());
        self
    }

    pub fn pattern(&self) -> &str {
        self.sentence_pattern
            .as_deref()
            .unwrap_or(DEFAULT_SENTENCE_PATTERN)
    }

    pub fn validate(&self) -> SpeechResult<()> {
        if self.threshold_value == 0 {
            return Err(SpeechError::InvalidConfiguration(
                "threshold_value must be at least 1".to_string(),
            ));
        }
        if self.threshold_mode == ThresholdMode::DelimiterCount {
            if self.delimiters.is_empty() {
                return Err(SpeechError::InvalidConfiguration(
                    "delimiter_count mode requires at least one delimiter".to_string(),
                ));
            }
            if self.delimiters.iter().any(|d| d.is_empty()) {
                return Err(SpeechError::InvalidConfiguration(
                    "delimiters must not be empty strings".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            threshold_mode: ThresholdMode::SentencePattern,
            threshold_value: 2,
            delimiters: vec![
                ".".to_string(),
                "!".to_string(),
                "?".to_string(),
                "。".to_string(),
                "！".to_string(),
                "？".to_string(),
                "\n\n".to_string(),
            ],
            sentence_pattern: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn default_config_is_valid() {
        let config = AccumulatorConfig::default();
        assert_ok!(config.validate());
        assert_eq!(config.threshold_mode, ThresholdMode::SentencePattern);
        assert_eq!(config.pattern(), DEFAULT_SENTENCE_PATTERN);
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let config = AccumulatorConfig::sentence_pattern(0);
        assert!(matches!(
            config.validate(),
            Err(SpeechError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn delimiter_mode_needs_delimiters() {
        let config = AccumulatorConfig::delimiter_count(2, &[]);
        assert_err!(config.validate());

        let config = AccumulatorConfig::delimiter_count(2, &[".", ""]);
        assert_err!(config.validate());
    }

    #[test]
    fn deserializes_snake_case_surface() {
        let json = r#"{"threshold_mode":"delimiter_count","threshold_value":3,"delimiters":[".","!","?"]}"#;
        let config: AccumulatorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.threshold_mode, ThresholdMode::DelimiterCount);
        assert_eq!(config.threshold_value, 3);
        assert_eq!(config.delimiters, vec![".", "!", "?"]);
        assert!(config.sentence_pattern.is_none());
    }

    #[test]
    fn builders_override_fields() {
        let config = AccumulatorConfig::default()
            .with_threshold(5)
            .with_delimiters(["!"])
            .with_sentence_pattern(r"[.]\s");
        assert_eq!(config.threshold_value, 5);
        assert_eq!(config.delimiters, vec!["!"]);
        assert_eq!(config.pattern(), r"[.]\s");
    }
}
