use std::collections::HashMap;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use llm_mutator::Language;
use llm_mutator::config::Config;
use llm_mutator::discover::{SourceFile, discover_specs};
use llm_mutator::error::ModelError;
use llm_mutator::generator::MutantGenerator;
use llm_mutator::model::replay::ReplayModel;
use llm_mutator::model::{FailureCounter, Model, PostOptions, QueryResult, Usage};
use llm_mutator::state::{self, RunSummary};
use tempfile::TempDir;

const TEMPLATE: &str = "{{feature}}: {{orig}}\n{{{code}}}";

fn package() -> Vec<SourceFile> {
    let text = "if (a > b) {\n  go(c);\n}\nwhile (n) step(n);\n";
    let path = Utf8PathBuf::from("src/loop.js");
    let specs = discover_specs(&path, text, Language::JavaScript, 1);
    vec![SourceFile {
        path,
        language: Language::JavaScript,
        text: text.to_string(),
        specs,
    }]
}

/// Answers by the original fragment named in the prompt's first line.
struct ByFragment {
    answers: HashMap<&'static str, Result<&'static str, ()>>,
}

impl ByFragment {
    fn new() -> Self {
        let answers = HashMap::from([
            ("if condition: a > b", Ok("```\na < b\n```\n```\na > b\n```\n```\na <\n```")),
            ("callee: go", Ok("```\nstop\n```\n```\nstop\n```")),
            ("call arguments: (c)", Err(())),
            ("while condition: n", Ok("no code here")),
            ("callee: step", Ok("```\nskip\n```")),
            ("call arguments: (n)", Ok("```\n(n + 1)\n```\n```\n()\n```")),
        ]);
        Self { answers }
    }
}

#[async_trait]
impl Model for ByFragment {
    async fn query(&self, prompt: &str, _options: &PostOptions) -> Result<QueryResult, ModelError> {
        let head = prompt.lines().next().unwrap_or_default();
        match self.answers.get(head) {
            Some(Ok(text)) => Ok(QueryResult::new(
                [text.to_string()],
                Usage { prompt_tokens: 30, completion_tokens: 12, total_tokens: 42 },
            )),
            _ => Err(ModelError::Exhausted {
                attempts: 3,
                last: Box::new(ModelError::Http { status: 500, body: String::new() }),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "by-fragment"
    }

    fn temperature(&self) -> f64 {
        0.0
    }

    fn max_tokens(&self) -> u32 {
        250
    }

    fn failure_counter(&self) -> FailureCounter {
        FailureCounter { nr_retries: 2, nr_failures: 1 }
    }
}

async fn record_run(dir: &std::path::Path) -> RunSummary {
    let model = ByFragment::new();
    let config = Config {
        model_name: "by-fragment".into(),
        ..Config::default()
    };
    MutantGenerator::new(&model, &config, TEMPLATE)
        .with_output_dir(dir)
        .generate(&package())
        .await
        .unwrap()
        .summary
}

async fn replay_run(from: &std::path::Path, to: &std::path::Path) -> (RunSummary, ReplayModel) {
    let model = ReplayModel::open(from).unwrap();
    let config = model.config().clone();
    let run = MutantGenerator::new(&model, &config, TEMPLATE)
        .with_output_dir(to)
        .generate(&package())
        .await
        .unwrap();
    (run.summary, model)
}

#[tokio::test]
async fn replay_reproduces_the_recorded_counts() {
    let recorded_dir = TempDir::new().unwrap();
    let replay_dir = TempDir::new().unwrap();
    let recorded = record_run(recorded_dir.path()).await;

    assert_eq!(recorded.nr_prompts, 6);
    assert_eq!(recorded.nr_query_failed, 1);
    assert_eq!(recorded.nr_candidates, 9);
    assert_eq!(recorded.nr_mutants, 5);
    assert_eq!(recorded.nr_identical, 1);
    assert_eq!(recorded.nr_duplicate, 1);
    assert_eq!(recorded.nr_syntactically_invalid, 2);
    assert_eq!(recorded.nr_failures, 1);

    let (replayed, model) = replay_run(recorded_dir.path(), replay_dir.path()).await;

    assert_eq!(model.nr_recorded(), 6);
    assert_eq!(model.model_name(), "by-fragment");
    assert_eq!(replayed.meta_info, recorded.meta_info);
    assert_eq!(replayed.nr_prompts, recorded.nr_prompts);
    assert_eq!(replayed.nr_candidates, recorded.nr_candidates);
    assert_eq!(replayed.nr_syntactically_invalid, recorded.nr_syntactically_invalid);
    assert_eq!(replayed.nr_identical, recorded.nr_identical);
    assert_eq!(replayed.nr_duplicate, recorded.nr_duplicate);
    assert_eq!(replayed.nr_mutants, recorded.nr_mutants);
    assert_eq!(replayed.nr_query_failed, recorded.nr_query_failed);
    assert_eq!(replayed.total_tokens, recorded.total_tokens);
    assert_eq!(replayed.nr_replay_missing, 0);
    assert_eq!(
        state::load_mutants(replay_dir.path()).unwrap(),
        state::load_mutants(recorded_dir.path()).unwrap()
    );
}

#[tokio::test]
async fn replay_of_a_replay_is_stable() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let third = TempDir::new().unwrap();
    record_run(first.path()).await;

    let (a, _) = replay_run(first.path(), second.path()).await;
    let (b, _) = replay_run(second.path(), third.path()).await;

    assert_eq!(a, b);
}

#[tokio::test]
async fn missing_records_are_counted_not_fatal() {
    let recorded_dir = TempDir::new().unwrap();
    let replay_dir = TempDir::new().unwrap();
    record_run(recorded_dir.path()).await;
    std::fs::remove_file(state::prompt_record_path(recorded_dir.path(), 1)).unwrap();

    let (replayed, _) = replay_run(recorded_dir.path(), replay_dir.path()).await;

    assert_eq!(replayed.nr_prompts, 6);
    assert_eq!(replayed.nr_replay_missing, 1);
    assert_eq!(replayed.nr_query_failed, 1);
    // Only the mutants of the `a > b` prompt are gone.
    assert_eq!(replayed.nr_mutants, 4);
    // The gap is not recorded, so replaying this replay hits it again.
    assert!(!state::prompt_record_path(replay_dir.path(), 1).exists());
}

#[tokio::test]
async fn open_without_summary_fails() {
    let dir = TempDir::new().unwrap();
    assert!(ReplayModel::open(dir.path()).is_err());
}

#[tokio::test]
async fn recorded_failure_replays_as_failure() {
    let recorded_dir = TempDir::new().unwrap();
    record_run(recorded_dir.path()).await;
    let model = ReplayModel::open(recorded_dir.path()).unwrap();

    let failed = state::load_prompt_records(recorded_dir.path())
        .unwrap()
        .into_iter()
        .find(|r| r.text.starts_with("call arguments: (c)"))
        .unwrap();
    let err = model.query(&failed.text, &PostOptions::default()).await.unwrap_err();

    assert!(matches!(err, ModelError::RecordedFailure));
    assert!(matches!(
        model.query("never asked", &PostOptions::default()).await,
        Err(ModelError::ReplayMissingData(_))
    ));
}

/// Answers successive prompts from a fixed list, whatever their text.
struct InTurn {
    answers: std::sync::Mutex<std::collections::VecDeque<&'static str>>,
}

#[async_trait]
impl Model for InTurn {
    async fn query(&self, _prompt: &str, _options: &PostOptions) -> Result<QueryResult, ModelError> {
        let answer = self.answers.lock().unwrap().pop_front().unwrap_or("no code");
        Ok(QueryResult::new([answer.to_string()], Usage::default()))
    }

    fn model_name(&self) -> &str {
        "in-turn"
    }

    fn temperature(&self) -> f64 {
        0.0
    }

    fn max_tokens(&self) -> u32 {
        250
    }

    fn failure_counter(&self) -> FailureCounter {
        FailureCounter::default()
    }
}

fn twin_files() -> Vec<SourceFile> {
    let text = "if (a > b) {}\n";
    ["src/a.js", "src/b.js"]
        .into_iter()
        .map(|p| {
            let path = Utf8PathBuf::from(p);
            let specs = discover_specs(&path, text, Language::JavaScript, 1);
            SourceFile {
                path,
                language: Language::JavaScript,
                text: text.to_string(),
                specs,
            }
        })
        .collect()
}

#[tokio::test]
async fn identical_prompts_replay_their_own_answers() {
    let recorded_dir = TempDir::new().unwrap();
    let replay_dir = TempDir::new().unwrap();
    let model = InTurn {
        answers: std::sync::Mutex::new(["```\na < b\n```", "```\na > b\n```"].into()),
    };
    let config = Config::default();
    let recorded = MutantGenerator::new(&model, &config, TEMPLATE)
        .with_output_dir(recorded_dir.path())
        .generate(&twin_files())
        .await
        .unwrap();
    assert_eq!(recorded.summary.nr_prompts, 2);
    assert_eq!(recorded.summary.nr_mutants, 1);
    assert_eq!(recorded.summary.nr_identical, 1);

    let replay = ReplayModel::open(recorded_dir.path()).unwrap();
    let replayed = MutantGenerator::new(&replay, &config, TEMPLATE)
        .with_output_dir(replay_dir.path())
        .generate(&twin_files())
        .await
        .unwrap();

    assert_eq!(replay.nr_recorded(), 2);
    assert_eq!(replayed.summary.nr_mutants, recorded.summary.nr_mutants);
    assert_eq!(replayed.summary.nr_identical, recorded.summary.nr_identical);
    assert_eq!(replayed.mutants, recorded.mutants);
    assert_eq!(replayed.mutants[0].file, "src/a.js");
}
