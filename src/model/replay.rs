use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{FailureCounter, Model, PostOptions, QueryResult};
use crate::config::Config;
use crate::error::{ModelError, StateError};
use crate::state::{self, RecordedOutcome};

/// Answers queries from the prompt records of an earlier run.
///
/// Identical prompt texts (e.g. two files with the same content) are answered
/// in the order their records were issued, so each gets its own outcome.
pub struct ReplayModel {
    config: Config,
    nr_recorded: usize,
    responses: Mutex<HashMap<String, VecDeque<RecordedOutcome>>>,
}

impl ReplayModel {
    /// Load `summary.json` and `prompts/` from a run output directory.
    pub fn open(dir: &Path) -> Result<Self, StateError> {
        let summary = state::load_summary(dir)?;
        let records = state::load_prompt_records(dir)?;
        tracing::info!(dir = %dir.display(), prompts = records.len(), "loaded replay input");
        let nr_recorded = records.len();
        let mut responses: HashMap<String, VecDeque<RecordedOutcome>> = HashMap::new();
        // Records come sorted by id.
        for record in records {
            responses.entry(record.text).or_default().push_back(record.outcome);
        }
        Ok(Self {
            config: summary.meta_info,
            nr_recorded,
            responses: Mutex::new(responses),
        })
    }

    /// Configuration of the recorded run.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn nr_recorded(&self) -> usize {
        self.nr_recorded
    }
}

#[async_trait]
impl Model for ReplayModel {
    async fn query(&self, prompt: &str, _options: &PostOptions) -> Result<QueryResult, ModelError> {
        let outcome = {
            let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
            responses.get_mut(prompt).and_then(VecDeque::pop_front)
        };
        match outcome {
            Some(RecordedOutcome::Completed(result)) => Ok(result),
            Some(RecordedOutcome::Failed) => Err(ModelError::RecordedFailure),
            None => {
                let head: String = prompt.chars().take(60).collect();
                Err(ModelError::ReplayMissingData(head))
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn temperature(&self) -> f64 {
        self.config.temperature
    }

    fn max_tokens(&self) -> u32 {
        self.config.max_tokens
    }

    fn failure_counter(&self) -> FailureCounter {
        FailureCounter::default()
    }
}
