use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "codellama-34b-instruct";
pub const DEFAULT_TEMPLATE: &str = "template.hb";
pub const DEFAULT_SYSTEM_PROMPT: &str = "SystemPrompt-MutationTestingExpert.txt";
pub const DEFAULT_MUTATE: &str = "**/*.{js,ts}";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("nrAttempts must be at least 1")]
    NoAttempts,
    #[error("maxLinesInPlaceHolder must be at least 1")]
    NoPlaceholderLines,
    #[error("maxTokens must be at least 1")]
    NoTokens,
    #[error("temperature {0} is outside the range 0.0..=2.0")]
    Temperature(f64),
    #[error("mutateOnly must not be empty")]
    EmptyMutateOnly,
    #[error("mutateOnlyLines must list at least one line")]
    EmptyMutateOnlyLines,
    #[error("mutateOnlyLines contains {0:?}, expected positive line numbers (e.g. 1,3,5)")]
    BadLine(String),
    #[error("invalid glob {glob:?}: {reason}")]
    BadGlob { glob: String, reason: String },
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
    #[error("{0} is not a JSON object of header names to values")]
    BadHeaders(&'static str),
    #[error("cannot read {what} {path:?}: {reason}")]
    Unreadable {
        what: &'static str,
        path: String,
        reason: String,
    },
}

/// Parameters of one generation run. Built once, never mutated, and written
/// to `summary.json` as `metaInfo` so a replay can recover it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub model_name: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub max_nr_prompts: usize,
    /// Milliseconds between live requests, 0 disables.
    pub rate_limit: u64,
    pub nr_attempts: u32,
    pub template: String,
    pub system_prompt: String,
    pub mutate: String,
    #[serde(default)]
    pub ignore: String,
    #[serde(default)]
    pub benchmark: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutate_only: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutate_only_lines: Option<Vec<usize>>,
    #[serde(default = "default_max_lines", rename = "maxLinesInPlaceHolder")]
    pub max_lines_in_placeholder: usize,
}

fn default_max_lines() -> usize {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 250,
            max_nr_prompts: 1250,
            rate_limit: 0,
            nr_attempts: 3,
            template: DEFAULT_TEMPLATE.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            mutate: DEFAULT_MUTATE.to_string(),
            ignore: String::new(),
            benchmark: false,
            mutate_only: None,
            mutate_only_lines: None,
            max_lines_in_placeholder: 1,
        }
    }
}

impl Config {
    /// Reject option combinations a run cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nr_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if self.max_lines_in_placeholder == 0 {
            return Err(ConfigError::NoPlaceholderLines);
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::NoTokens);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Temperature(self.temperature));
        }
        if matches!(&self.mutate_only, Some(s) if s.is_empty()) {
            return Err(ConfigError::EmptyMutateOnly);
        }
        if let Some(lines) = &self.mutate_only_lines {
            if lines.is_empty() {
                return Err(ConfigError::EmptyMutateOnlyLines);
            }
            if lines.contains(&0) {
                return Err(ConfigError::BadLine("0".to_string()));
            }
        }
        crate::discover::compile_globs(&self.mutate)?;
        crate::discover::compile_globs(&self.ignore)?;
        Ok(())
    }
}

/// Parse a comma-separated line list such as `1,3,5`.
pub fn parse_lines(text: &str) -> Result<Vec<usize>, ConfigError> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::BadLine(s.to_string())),
        })
        .collect()
}
