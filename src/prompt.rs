use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::location::{self, Location};

pub const PLACEHOLDER: &str = "<PLACEHOLDER>";

/// A code location bound to the fragment that a prompt asks to replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSpec {
    pub location: Location,
    /// Original text of the fragment.
    pub orig: String,
    /// What the placeholder stands for, e.g. "if condition".
    pub feature: String,
}

impl PromptSpec {
    pub fn new(location: Location, orig: impl Into<String>, feature: impl Into<String>) -> Self {
        Self {
            location,
            orig: orig.into(),
            feature: feature.into(),
        }
    }

    /// The whole file with this spec's fragment replaced by the placeholder.
    pub fn code_with_placeholder(&self, source: &str) -> Option<String> {
        location::splice(source, &self.location, PLACEHOLDER)
    }

    /// Decide from the configured filters alone whether to leave this spec out.
    ///
    /// `mutateOnly` gates on the original fragment containing the substring;
    /// `mutateOnlyLines` then gates on the span covering one of the lines.
    /// `mutateOnlyLines` also applies when `mutateOnly` is unset.
    pub fn should_be_skipped(&self, config: &Config) -> bool {
        if let Some(needle) = &config.mutate_only {
            if !self.orig.contains(needle.as_str()) {
                return true;
            }
        }
        match &config.mutate_only_lines {
            None => false,
            Some(lines) => !lines.iter().any(|&l| self.location.contains_line(l)),
        }
    }
}

/// Owns the prompt id sequence of one run.
#[derive(Debug)]
pub struct PromptContext {
    next_id: u64,
}

impl Default for PromptContext {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptContext {
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Restart ids at 1.
    pub fn reset(&mut self) {
        self.next_id = 1;
    }

    pub fn create(&mut self, text: String, spec: PromptSpec) -> Prompt {
        let id = self.next_id;
        self.next_id += 1;
        Prompt { id, text, spec }
    }
}

/// Text sent to the model for one spec. Ids are unique within a
/// [`PromptContext`]; two prompts never compare equal.
#[derive(Debug)]
pub struct Prompt {
    id: u64,
    text: String,
    pub spec: PromptSpec,
}

impl Prompt {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn orig(&self) -> &str {
        &self.spec.orig
    }

    pub fn should_be_skipped(&self, config: &Config) -> bool {
        self.spec.should_be_skipped(config)
    }
}

/// Fill a template. Both `{{name}}` and `{{{name}}}` are accepted.
pub fn render(template: &str, code: &str, spec: &PromptSpec) -> String {
    let mut text = template.to_string();
    for (name, value) in [
        ("code", code),
        ("orig", spec.orig.as_str()),
        ("feature", spec.feature.as_str()),
    ] {
        text = text
            .replace(&format!("{{{{{{{name}}}}}}}"), value)
            .replace(&format!("{{{{{name}}}}}"), value);
    }
    text
}
