//! Sentence boundary detection over the accumulator buffer.

use regex::Regex;

use crate::config::{AccumulatorConfig, ThresholdMode};
use crate::error::SpeechResult;
use crate::sanitizer::ImageMarkup;

/// Result of scanning a buffer for complete sentence-like units.
///
/// Units ending inside image markup are ignored, so `split_at` never cuts
/// through `![alt](url)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Boundary {
    /// Number of complete units found.
    pub count: usize,
    /// Byte offset just past the last complete unit, if any.
    pub split_at: Option<usize>,
}

#[derive(Debug, Clone)]
enum Rule {
    Delimiters(Vec<String>),
    Pattern(Regex),
}

/// Counts complete units and locates the split point for one threshold mode.
#[derive(Debug, Clone)]
pub struct BoundaryDetector {
    rule: Rule,
}

impl BoundaryDetector {
    pub fn from_config(config: &AccumulatorConfig) -> SpeechResult<Self> {
        let rule = match config.threshold_mode {
            ThresholdMode::DelimiterCount => Rule::Delimiters(config.delimiters.clone()),
            ThresholdMode::SentencePattern => Rule::Pattern(Regex::new(config.pattern())?),
        };
        Ok(Self { rule })
    }

    pub fn detect(&self, buffer: &str) -> Boundary {
        let markup = ImageMarkup::scan(buffer);
        match &self.rule {
            Rule::Delimiters(delimiters) => detect_delimiters(buffer, delimiters, &markup),
            Rule::Pattern(pattern) => detect_pattern(buffer, pattern, &markup),
        }
    }
}

fn detect_delimiters(buffer: &str, delimiters: &[String], markup: &ImageMarkup) -> Boundary {
    let mut count = 0;
    let mut last_end: Option<usize> = None;

    for delimiter in delimiters.iter().filter(|d| !d.is_empty()) {
        let ends = buffer
            .match_indices(delimiter.as_str())
            .map(|(pos, _)| pos + delimiter.len())
            .filter(|&end| !markup.cuts(end));
        for end in ends {
            count += 1;
            last_end = Some(last_end.map_or(end, |current| current.max(end)));
        }
    }

    // Whitespace directly after the delimiter belongs to the sentence it ends.
    let split_at = last_end.map(|end| {
        let trailing = buffer[end..]
            .char_indices()
            .find(|(_, c)| !c.is_whitespace())
            .map_or(buffer.len() - end, |(idx, _)| idx);
        end + trailing
    });

    Boundary { count, split_at }
}

fn detect_pattern(buffer: &str, pattern: &Regex, markup: &ImageMarkup) -> Boundary {
    let mut count = 0;
    let mut split_at = None;
    for found in pattern.find_iter(buffer).filter(|found| !markup.cuts(found.end())) {
        count += 1;
        split_at = Some(found.end());
    }
    Boundary { count, split_at }
}
