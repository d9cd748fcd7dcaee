use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_yaml::Value;

use super::schema::TourGuideConfig;
use crate::error::{Result, ServeError};

static ENV_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env reference pattern must compile")
});

pub fn parse_yaml_file<P: AsRef<Path>>(path: P) -> Result<TourGuideConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_yaml_str(&content)
}

pub fn parse_yaml_str(yaml: &str) -> Result<TourGuideConfig> {
    parse_yaml_with(yaml, |name| std::env::var(name).ok())
}

/// Parses `yaml`, then replaces `${VAR}` references in string values using `lookup`.
///
/// Expansion happens after parsing, so references in comments are ignored and
/// substituted text can never change the document structure. A value that is
/// exactly one reference and expands to a number or boolean takes that type,
/// so `port: ${PORT}` works.
pub fn parse_yaml_with<F>(yaml: &str, lookup: F) -> Result<TourGuideConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut document: Value = serde_yaml::from_str(yaml)?;
    let mut missing = Vec::new();
    expand_value(&mut document, &lookup, &mut missing);
    if !missing.is_empty() {
        return Err(ServeError::ConfigError(format!(
            "undefined environment variables: {}",
            missing.join(", ")
        )));
    }
    let config: TourGuideConfig = serde_yaml::from_value(document)?;
    Ok(config)
}

fn expand_value<F>(value: &mut Value, lookup: &F, missing: &mut Vec<String>)
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(text) => {
            if let Some(expanded) = expand_scalar(text, lookup, missing) {
                *value = expanded;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                expand_value(item, lookup, missing);
            }
        }
        Value::Mapping(entries) => {
            for (_, item) in entries.iter_mut() {
                expand_value(item, lookup, missing);
            }
        }
        Value::Tagged(tagged) => expand_value(&mut tagged.value, lookup, missing),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn expand_scalar<F>(text: &str, lookup: &F, missing: &mut Vec<String>) -> Option<Value>
where
    F: Fn(&str) -> Option<String>,
{
    if !ENV_REFERENCE.is_match(text) {
        return None;
    }
    let whole_reference = ENV_REFERENCE
        .find(text)
        .is_some_and(|found| found.start() == 0 && found.end() == text.len());

    let expanded = ENV_REFERENCE
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            lookup(name).unwrap_or_else(|| {
                missing.push(name.to_string());
                String::new()
            })
        })
        .into_owned();

    if whole_reference {
        if let Ok(typed @ (Value::Bool(_) | Value::Number(_))) =
            serde_yaml::from_str::<Value>(&expanded)
        {
            return Some(typed);
        }
    }
    Some(Value::String(expanded))
}
