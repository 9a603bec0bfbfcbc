//! Run artifacts: `mutants.json`, `summary.json` and one `prompts/prompt<id>.json`
//! per issued prompt. The mutation-test harness reads the first two; a replay
//! reads the last two.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::StateError;
use crate::location::Location;
use crate::model::{FailureCounter, QueryResult, Usage};
use crate::mutants::Mutant;

pub const MUTANTS_FILE: &str = "mutants.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const PROMPTS_DIR: &str = "prompts";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub nr_prompts: usize,
    pub nr_candidates: usize,
    pub nr_syntactically_invalid: usize,
    pub nr_identical: usize,
    pub nr_duplicate: usize,
    pub nr_mutants: usize,
    pub nr_skipped: usize,
    pub nr_query_failed: usize,
    pub nr_replay_missing: usize,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_tokens: u64,
    #[serde(default)]
    pub nr_retries: u32,
    #[serde(default)]
    pub nr_failures: u32,
    pub meta_info: Config,
}

impl RunSummary {
    pub fn new(meta_info: Config) -> Self {
        Self {
            nr_prompts: 0,
            nr_candidates: 0,
            nr_syntactically_invalid: 0,
            nr_identical: 0,
            nr_duplicate: 0,
            nr_mutants: 0,
            nr_skipped: 0,
            nr_query_failed: 0,
            nr_replay_missing: 0,
            total_prompt_tokens: 0,
            total_completion_tokens: 0,
            total_tokens: 0,
            nr_retries: 0,
            nr_failures: 0,
            meta_info,
        }
    }

    pub fn add_usage(&mut self, usage: &Usage) {
        self.total_prompt_tokens += usage.prompt_tokens;
        self.total_completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total_tokens;
    }

    pub fn set_failures(&mut self, counter: FailureCounter) {
        self.nr_retries = counter.nr_retries;
        self.nr_failures = counter.nr_failures;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "camelCase")]
pub enum RecordedOutcome {
    Completed(QueryResult),
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub id: u64,
    pub text: String,
    pub location: Location,
    pub outcome: RecordedOutcome,
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| StateError::json(path, e))?;
    std::fs::write(path, json).map_err(|e| StateError::io(path, e))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, StateError> {
    let data = std::fs::read_to_string(path).map_err(|e| StateError::io(path, e))?;
    serde_json::from_str(&data).map_err(|e| StateError::json(path, e))
}

pub fn prompt_record_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(PROMPTS_DIR).join(format!("prompt{id}.json"))
}

pub fn save_mutants(dir: &Path, mutants: &[Mutant]) -> Result<(), StateError> {
    write_json(&dir.join(MUTANTS_FILE), mutants)
}

pub fn load_mutants(dir: &Path) -> Result<Vec<Mutant>, StateError> {
    read_json(&dir.join(MUTANTS_FILE))
}

pub fn save_summary(dir: &Path, summary: &RunSummary) -> Result<(), StateError> {
    write_json(&dir.join(SUMMARY_FILE), summary)
}

pub fn load_summary(dir: &Path) -> Result<RunSummary, StateError> {
    read_json(&dir.join(SUMMARY_FILE))
}

pub fn save_prompt_record(dir: &Path, record: &PromptRecord) -> Result<(), StateError> {
    write_json(&prompt_record_path(dir, record.id), record)
}

/// All prompt records in `dir`, ordered by id. A missing `prompts/` directory
/// means no prompt was issued.
pub fn load_prompt_records(dir: &Path) -> Result<Vec<PromptRecord>, StateError> {
    let prompts = dir.join(PROMPTS_DIR);
    let entries = match std::fs::read_dir(&prompts) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(StateError::io(&prompts, e)),
    };
    let mut records = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| StateError::io(&prompts, e))?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            records.push(read_json::<PromptRecord>(&path)?);
        }
    }
    records.sort_by_key(|r| r.id);
    Ok(records)
}

/// Remove artifacts of an earlier run so stale prompt records cannot leak
/// into a replay of this one.
pub fn clear_run(dir: &Path) -> Result<(), StateError> {
    let prompts = dir.join(PROMPTS_DIR);
    match std::fs::remove_dir_all(&prompts) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(StateError::io(&prompts, e)),
    }
    for file in [MUTANTS_FILE, SUMMARY_FILE] {
        let path = dir.join(file);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| StateError::io(&path, e))?;
        }
    }
    Ok(())
}
