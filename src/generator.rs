//! Turns placeholder specs into validated mutants by querying a model.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::discover::SourceFile;
use crate::error::{ModelError, StateError};
use crate::model::{Model, PostOptions, QueryResult};
use crate::mutants::{Candidate, Classification, Classifier, Mutant, extract_fragments};
use crate::prompt::{Prompt, PromptContext, PromptSpec, render};
use crate::state::{self, PromptRecord, RecordedOutcome, RunSummary};
use crate::syntax::SyntaxChecker;

/// Terminal state of one prompt.
#[derive(Debug, PartialEq)]
pub enum PromptOutcome {
    Skipped,
    QueryFailed,
    ReplayMissing,
    /// Placeholder span did not fit the file text; nothing was queried.
    Unusable,
    Parsed(Vec<Candidate>),
}

/// Everything a run produces.
#[derive(Debug)]
pub struct RunOutput {
    pub summary: RunSummary,
    pub mutants: Vec<Mutant>,
}

pub struct MutantGenerator<'a> {
    model: &'a dyn Model,
    config: &'a Config,
    template: String,
    options: PostOptions,
    prompts: PromptContext,
    out_dir: Option<PathBuf>,
    summary: RunSummary,
    mutants: Vec<Mutant>,
}

impl<'a> MutantGenerator<'a> {
    pub fn new(model: &'a dyn Model, config: &'a Config, template: impl Into<String>) -> Self {
        Self {
            model,
            config,
            template: template.into(),
            options: PostOptions::default(),
            prompts: PromptContext::new(),
            out_dir: None,
            summary: RunSummary::new(config.clone()),
            mutants: Vec::new(),
        }
    }

    /// Write run artifacts (prompt records, mutants, summary) to `dir`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = Some(dir.into());
        self
    }

    pub fn with_options(mut self, options: PostOptions) -> Self {
        self.options = options;
        self
    }

    fn cap_reached(&self) -> bool {
        self.summary.nr_prompts >= self.config.max_nr_prompts
    }

    /// Generate mutants for every file, stopping once `maxNrPrompts` prompts
    /// were issued.
    pub async fn generate(mut self, files: &[SourceFile]) -> Result<RunOutput, StateError> {
        if let Some(dir) = &self.out_dir {
            state::clear_run(dir)?;
        }
        'files: for file in files {
            let Some(mut checker) = SyntaxChecker::new(file.language) else {
                tracing::warn!(file = %file.path, "no grammar available, skipping file");
                continue;
            };
            for spec in &file.specs {
                if self.cap_reached() {
                    tracing::info!(max = self.config.max_nr_prompts, "prompt limit reached");
                    break 'files;
                }
                let outcome = self.process(file, spec, &mut checker).await?;
                self.tally(outcome);
            }
        }

        self.summary.set_failures(self.model.failure_counter());
        if let Some(dir) = &self.out_dir {
            state::save_mutants(dir, &self.mutants)?;
            state::save_summary(dir, &self.summary)?;
        }
        tracing::info!(
            prompts = self.summary.nr_prompts,
            candidates = self.summary.nr_candidates,
            mutants = self.summary.nr_mutants,
            "generation finished"
        );
        Ok(RunOutput {
            summary: self.summary,
            mutants: self.mutants,
        })
    }

    fn build_prompt(&mut self, file: &SourceFile, spec: &PromptSpec) -> Option<Prompt> {
        let code = spec.code_with_placeholder(&file.text)?;
        let text = render(&self.template, &code, spec);
        Some(self.prompts.create(text, spec.clone()))
    }

    /// Drive one spec from PENDING to its terminal state.
    async fn process(
        &mut self,
        file: &SourceFile,
        spec: &PromptSpec,
        checker: &mut SyntaxChecker,
    ) -> Result<PromptOutcome, StateError> {
        let Some(prompt) = self.build_prompt(file, spec) else {
            tracing::warn!(location = ?spec.location, "placeholder outside file text");
            return Ok(PromptOutcome::Unusable);
        };
        if prompt.should_be_skipped(self.config) {
            tracing::debug!(id = prompt.id(), "skipped by mutateOnly filters");
            return Ok(PromptOutcome::Skipped);
        }

        self.summary.nr_prompts += 1;
        tracing::debug!(id = prompt.id(), file = %file.path, line = spec.location.line_nr, "querying");
        let result = self.model.query(prompt.text(), &self.options).await;
        self.record(&prompt, &result)?;

        let result = match result {
            Ok(result) => result,
            Err(ModelError::ReplayMissingData(head)) => {
                tracing::warn!(id = prompt.id(), prompt = %head, "no recorded response");
                return Ok(PromptOutcome::ReplayMissing);
            }
            Err(e) => {
                tracing::warn!(id = prompt.id(), error = %e, "query failed");
                return Ok(PromptOutcome::QueryFailed);
            }
        };

        self.summary.add_usage(&result.usage);
        let candidates = self.classify(&file.text, spec, &result, checker);
        for candidate in &candidates {
            if candidate.classification == Classification::Valid {
                self.mutants.push(Mutant::from_candidate(candidate, prompt.id()));
            }
        }
        Ok(PromptOutcome::Parsed(candidates))
    }

    fn classify(
        &self,
        source: &str,
        spec: &PromptSpec,
        result: &QueryResult,
        checker: &mut SyntaxChecker,
    ) -> Vec<Candidate> {
        let mut classifier = Classifier::new(source, spec, self.config.max_lines_in_placeholder);
        let mut candidates = Vec::new();
        for completion in &result.completions {
            match extract_fragments(completion) {
                Some(fragments) => {
                    for fragment in fragments {
                        candidates.push(classifier.classify(checker, &fragment));
                    }
                }
                None => candidates.push(classifier.malformed(completion)),
            }
        }
        candidates
    }

    fn record(
        &self,
        prompt: &Prompt,
        result: &Result<QueryResult, ModelError>,
    ) -> Result<(), StateError> {
        let Some(dir) = &self.out_dir else {
            return Ok(());
        };
        let outcome = match result {
            Ok(result) => RecordedOutcome::Completed(result.clone()),
            // A replay of this run should hit the same gap, not a failure.
            Err(ModelError::ReplayMissingData(_)) => return Ok(()),
            Err(_) => RecordedOutcome::Failed,
        };
        state::save_prompt_record(
            dir,
            &PromptRecord {
                id: prompt.id(),
                text: prompt.text().to_string(),
                location: prompt.spec.location.clone(),
                outcome,
            },
        )
    }

    fn tally(&mut self, outcome: PromptOutcome) {
        let summary = &mut self.summary;
        match outcome {
            PromptOutcome::Skipped | PromptOutcome::Unusable => summary.nr_skipped += 1,
            PromptOutcome::QueryFailed => summary.nr_query_failed += 1,
            PromptOutcome::ReplayMissing => summary.nr_replay_missing += 1,
            PromptOutcome::Parsed(candidates) => {
                for candidate in candidates {
                    summary.nr_candidates += 1;
                    match candidate.classification {
                        Classification::Valid => summary.nr_mutants += 1,
                        Classification::SyntacticallyInvalid => summary.nr_syntactically_invalid += 1,
                        Classification::IdenticalToOriginal => summary.nr_identical += 1,
                        Classification::DuplicateOfCandidate => summary.nr_duplicate += 1,
                    }
                }
            }
        }
    }
}

/// Output directory used when none is given: `<package>/MUTATION_TESTING`.
pub fn default_output_dir(package: &Path) -> PathBuf {
    package.join("MUTATION_TESTING")
}
