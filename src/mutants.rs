use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::location::{self, Location};
use crate::prompt::PromptSpec;
use crate::syntax::SyntaxChecker;

static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n?```").expect("code block pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    Valid,
    SyntacticallyInvalid,
    IdenticalToOriginal,
    DuplicateOfCandidate,
}

/// One proposed replacement for a location.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub location: Location,
    pub original: String,
    pub replacement: String,
    pub classification: Classification,
}

/// A valid candidate as handed to the mutation-test harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutant {
    pub file: String,
    pub line_nr: usize,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
    pub original_code: String,
    pub replacement: String,
    pub prompt_id: u64,
}

impl Mutant {
    pub fn from_candidate(candidate: &Candidate, prompt_id: u64) -> Self {
        let loc = &candidate.location;
        Self {
            file: loc.file.to_string(),
            line_nr: loc.line_nr,
            start_line: loc.start_line,
            start_column: loc.start_column,
            end_line: loc.end_line,
            end_column: loc.end_column,
            original_code: candidate.original.clone(),
            replacement: candidate.replacement.clone(),
            prompt_id,
        }
    }

    pub fn location(&self) -> Location {
        Location {
            file: self.file.clone().into(),
            line_nr: self.line_nr,
            start_line: self.start_line,
            start_column: self.start_column,
            end_line: self.end_line,
            end_column: self.end_column,
        }
    }
}

/// Fenced code blocks of a completion, in order. `None` when the completion
/// has no fenced block at all.
pub fn extract_fragments(completion: &str) -> Option<Vec<String>> {
    let blocks: Vec<String> = CODE_BLOCK
        .captures_iter(completion)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect();
    (!blocks.is_empty()).then_some(blocks)
}

/// Classifies the candidates of one location in the order they are produced.
pub struct Classifier<'a> {
    source: &'a str,
    spec: &'a PromptSpec,
    max_lines: usize,
    seen: HashSet<String>,
}

impl<'a> Classifier<'a> {
    pub fn new(source: &'a str, spec: &'a PromptSpec, max_lines: usize) -> Self {
        Self {
            source,
            spec,
            max_lines,
            seen: HashSet::new(),
        }
    }

    /// Invalid first, then identical-to-original, then duplicate of an
    /// earlier valid replacement for this location.
    pub fn classify(&mut self, checker: &mut SyntaxChecker, replacement: &str) -> Candidate {
        let trimmed = replacement.trim();
        let classification = if !self.is_parsable(checker, trimmed) {
            Classification::SyntacticallyInvalid
        } else if trimmed == self.spec.orig.trim() {
            Classification::IdenticalToOriginal
        } else if !self.seen.insert(trimmed.to_string()) {
            Classification::DuplicateOfCandidate
        } else {
            Classification::Valid
        };
        self.candidate(trimmed, classification)
    }

    /// Candidate for a completion that carried no code at all.
    pub fn malformed(&self, completion: &str) -> Candidate {
        self.candidate(completion.trim(), Classification::SyntacticallyInvalid)
    }

    fn is_parsable(&self, checker: &mut SyntaxChecker, replacement: &str) -> bool {
        if replacement.is_empty() && !self.spec.orig.trim().is_empty() {
            return false;
        }
        if replacement.lines().count() > self.max_lines {
            return false;
        }
        match location::splice(self.source, &self.spec.location, replacement) {
            Some(mutated) => checker.is_valid(&mutated),
            None => false,
        }
    }

    fn candidate(&self, replacement: &str, classification: Classification) -> Candidate {
        Candidate {
            location: self.spec.location.clone(),
            original: self.spec.orig.clone(),
            replacement: replacement.to_string(),
            classification,
        }
    }
}
