//! File selection and placeholder discovery.

use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use glob::{MatchOptions, Pattern};
use tree_sitter::Node;

use crate::config::{Config, ConfigError};
use crate::location::Location;
use crate::prompt::PromptSpec;
use crate::syntax::SyntaxChecker;
use crate::{Language, detect_language};

const SKIP_NAMES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    ".venv",
    "venv",
    "__pycache__",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    "target",
    "dist",
    "build",
    "coverage",
    ".next",
    ".nuxt",
    "MUTATION_TESTING",
    ".llm-cache",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A source file and the placeholder specs found in it.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the package root; used in locations and records.
    pub path: Utf8PathBuf,
    pub language: Language,
    pub text: String,
    pub specs: Vec<PromptSpec>,
}

/// Expand `{a,b}` alternatives, which `glob` does not support.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };
    let Some(close) = pattern[open..].find('}').map(|i| open + i) else {
        return vec![pattern.to_string()];
    };
    let (head, tail) = (&pattern[..open], &pattern[close + 1..]);
    pattern[open + 1..close]
        .split(',')
        .flat_map(|alt| expand_braces(&format!("{head}{alt}{tail}")))
        .collect()
}

/// Compile a glob with brace alternatives. An empty glob matches nothing.
pub fn compile_globs(pattern: &str) -> Result<Vec<Pattern>, ConfigError> {
    if pattern.trim().is_empty() {
        return Ok(vec![]);
    }
    let mut patterns = Vec::new();
    for expanded in expand_braces(pattern.trim()) {
        let mut variants = vec![expanded.clone()];
        if let Some(rest) = expanded.strip_prefix("**/") {
            variants.push(rest.to_string());
        }
        for variant in variants {
            let compiled = Pattern::new(&variant).map_err(|e| ConfigError::BadGlob {
                glob: pattern.to_string(),
                reason: e.to_string(),
            })?;
            patterns.push(compiled);
        }
    }
    Ok(patterns)
}

fn matches_any(patterns: &[Pattern], rel: &Path) -> bool {
    patterns.iter().any(|p| p.matches_path_with(rel, MATCH_OPTIONS))
}

fn should_skip(name: &str) -> bool {
    SKIP_NAMES.iter().any(|s| *s == name)
}

fn walk(root: &Path, dir: &Path, found: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if should_skip(&name.to_string_lossy()) {
            continue;
        }
        let path = entry.path();
        let ft = entry.file_type()?;
        if ft.is_dir() {
            walk(root, &path, found)?;
        } else if ft.is_file() {
            if let Ok(rel) = path.strip_prefix(root) {
                found.push(rel.to_path_buf());
            }
        }
        // Symlinks are not followed
    }
    Ok(())
}

/// Files under `root` matching `mutate` and not `ignore`, relative to `root`, sorted.
pub fn select_files(root: &Path, config: &Config) -> Result<Vec<PathBuf>, ConfigError> {
    let mutate = compile_globs(&config.mutate)?;
    let ignore = compile_globs(&config.ignore)?;
    let mut found = Vec::new();
    walk(root, root, &mut found).map_err(|e| ConfigError::Unreadable {
        what: "package directory",
        path: root.display().to_string(),
        reason: e.to_string(),
    })?;
    found.retain(|rel| matches_any(&mutate, rel) && !matches_any(&ignore, rel));
    found.sort();
    Ok(found)
}

struct Grammar {
    /// (node kind, feature name) pairs whose `condition` field is a placeholder.
    conditionals: &'static [(&'static str, &'static str)],
    call: &'static str,
    /// Member access node kind and the field naming its receiver.
    member: (&'static str, &'static str),
}

const JS_GRAMMAR: Grammar = Grammar {
    conditionals: &[
        ("if_statement", "if condition"),
        ("while_statement", "while condition"),
        ("do_statement", "do-while condition"),
        ("for_statement", "for condition"),
    ],
    call: "call_expression",
    member: ("member_expression", "object"),
};

const PYTHON_GRAMMAR: Grammar = Grammar {
    conditionals: &[
        ("if_statement", "if condition"),
        ("elif_clause", "elif condition"),
        ("while_statement", "while condition"),
    ],
    call: "call",
    member: ("attribute", "object"),
};

const RUST_GRAMMAR: Grammar = Grammar {
    conditionals: &[
        ("if_expression", "if condition"),
        ("while_expression", "while condition"),
    ],
    call: "call_expression",
    member: ("field_expression", "value"),
};

fn grammar_for(language: Language) -> &'static Grammar {
    match language {
        Language::Python => &PYTHON_GRAMMAR,
        Language::Rust => &RUST_GRAMMAR,
        Language::JavaScript | Language::TypeScript | Language::Tsx => &JS_GRAMMAR,
    }
}

fn node_text<'a>(node: Node<'a>, source: &'a str) -> &'a str {
    &source[node.start_byte()..node.end_byte()]
}

fn node_location(file: &Utf8PathBuf, node: Node) -> Location {
    let start = node.start_position();
    let end = node.end_position();
    Location::new(
        file.clone(),
        (start.row + 1, start.column),
        (end.row + 1, end.column),
    )
}

/// Strip wrappers that belong to the statement rather than the condition:
/// `( … )` in JS and the trailing `;` of a `for` header.
fn unwrap_condition(node: Node) -> Option<Node> {
    match node.kind() {
        "parenthesized_expression" | "expression_statement" => node.named_child(0),
        "empty_statement" => None,
        _ => Some(node),
    }
}

struct Collector<'a> {
    file: &'a Utf8PathBuf,
    source: &'a str,
    grammar: &'static Grammar,
    max_lines: usize,
    specs: Vec<PromptSpec>,
}

impl Collector<'_> {
    fn push(&mut self, node: Node, feature: &str) {
        let location = node_location(self.file, node);
        if location.nr_lines() > self.max_lines {
            return;
        }
        if self.specs.iter().any(|s| s.location == location) {
            return;
        }
        self.specs.push(PromptSpec::new(
            location,
            node_text(node, self.source),
            feature,
        ));
    }

    fn walk(&mut self, node: Node) {
        let kind = node.kind();
        if let Some((_, feature)) = self.grammar.conditionals.iter().find(|(k, _)| *k == kind) {
            if let Some(cond) = node.child_by_field_name("condition").and_then(unwrap_condition) {
                self.push(cond, feature);
            }
        } else if kind == self.grammar.call {
            if let Some(callee) = node.child_by_field_name("function") {
                self.push(callee, "callee");
                let (member_kind, receiver_field) = self.grammar.member;
                if callee.kind() == member_kind {
                    if let Some(receiver) = callee.child_by_field_name(receiver_field) {
                        self.push(receiver, "call receiver");
                    }
                }
            }
            if let Some(args) = node.child_by_field_name("arguments") {
                self.push(args, "call arguments");
            }
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child);
        }
    }
}

/// Placeholder specs for `source`, in source order. Spans covering more than
/// `max_lines` lines are left out.
pub fn discover_specs(
    file: &Utf8PathBuf,
    source: &str,
    language: Language,
    max_lines: usize,
) -> Vec<PromptSpec> {
    let Some(mut checker) = SyntaxChecker::new(language) else {
        return vec![];
    };
    let Some(tree) = checker.parse(source) else {
        return vec![];
    };
    if tree.root_node().has_error() {
        tracing::warn!(file = %file, "file does not parse cleanly, skipping");
        return vec![];
    }
    let mut collector = Collector {
        file,
        source,
        grammar: grammar_for(language),
        max_lines,
        specs: Vec::new(),
    };
    collector.walk(tree.root_node());
    let mut specs = collector.specs;
    specs.sort_by_key(|s| {
        (
            s.location.start_line,
            s.location.start_column,
            s.location.end_line,
            s.location.end_column,
        )
    });
    specs
}

/// Select, read and scan every source file of the package at `root`.
pub fn load_package(root: &Path, config: &Config) -> Result<Vec<SourceFile>, ConfigError> {
    let mut files = Vec::new();
    for rel in select_files(root, config)? {
        let Some(language) = detect_language(&rel) else {
            tracing::debug!(file = %rel.display(), "unsupported file type, skipping");
            continue;
        };
        let Ok(path) = Utf8PathBuf::from_path_buf(rel.clone()) else {
            tracing::warn!(file = %rel.display(), "non UTF-8 path, skipping");
            continue;
        };
        let text = fs::read_to_string(root.join(&rel)).map_err(|e| ConfigError::Unreadable {
            what: "source file",
            path: rel.display().to_string(),
            reason: e.to_string(),
        })?;
        let specs = discover_specs(&path, &text, language, config.max_lines_in_placeholder);
        tracing::info!(file = %path, specs = specs.len(), "discovered placeholders");
        files.push(SourceFile {
            path,
            language,
            text,
            specs,
        });
    }
    Ok(files)
}
