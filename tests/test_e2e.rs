use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use llm_mutator::config::Config;
use llm_mutator::discover;
use llm_mutator::error::ModelError;
use llm_mutator::generator::MutantGenerator;
use llm_mutator::model::{FailureCounter, Model, PostOptions, QueryResult, Usage};
use llm_mutator::state::{self, RunSummary};
use llm_mutator::templates;
use tempfile::TempDir;

fn mutator_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_llm-mutator"))
}

fn create_js_package(dir: &Path) {
    std::fs::create_dir_all(dir.join("src")).unwrap();
    std::fs::write(
        dir.join("src/range.js"),
        r#"function clamp(x, lo, hi) {
  if (x < lo) {
    return lo;
  }
  return Math.min(x, hi);
}
"#,
    )
    .unwrap();
    std::fs::write(dir.join("package.json"), r#"{ "name": "range" }"#).unwrap();
}

/// Proposes the same two replacements for every placeholder.
struct Fixed;

#[async_trait]
impl Model for Fixed {
    async fn query(&self, _prompt: &str, _options: &PostOptions) -> Result<QueryResult, ModelError> {
        Ok(QueryResult::new(
            ["```\nx <= lo\n```\n```\n(hi, x)\n```".to_string()],
            Usage { prompt_tokens: 100, completion_tokens: 10, total_tokens: 110 },
        ))
    }

    fn model_name(&self) -> &str {
        "fixed"
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

/// Record a run of the package into `out` the way `generate` would.
async fn record(pkg: &Path, out: &Path) -> RunSummary {
    let config = Config {
        model_name: "fixed".into(),
        ..Config::default()
    };
    let template = templates::resolve(&config.template).unwrap();
    let files = discover::load_package(pkg, &config).unwrap();
    MutantGenerator::new(&Fixed, &config, template)
        .with_output_dir(out)
        .generate(&files)
        .await
        .unwrap()
        .summary
}

fn summary_json(stdout: &[u8]) -> serde_json::Value {
    serde_json::from_slice(stdout).unwrap_or_else(|e| {
        panic!("stdout is not JSON ({e}): {}", String::from_utf8_lossy(stdout))
    })
}

#[tokio::test]
async fn e2e_summary_json() {
    let pkg = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    create_js_package(pkg.path());
    let recorded = record(pkg.path(), out.path()).await;
    assert!(recorded.nr_mutants > 0);

    let output = Command::new(mutator_bin())
        .args(["summary", "--json"])
        .arg(out.path())
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = summary_json(&output.stdout);
    assert_eq!(json["nrPrompts"], recorded.nr_prompts);
    assert_eq!(json["nrMutants"], recorded.nr_mutants);
    assert_eq!(json["metaInfo"]["modelName"], "fixed");
}

#[tokio::test]
async fn e2e_summary_lists_mutants() {
    let pkg = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    create_js_package(pkg.path());
    record(pkg.path(), out.path()).await;

    let output = Command::new(mutator_bin())
        .arg("summary")
        .arg(out.path())
        .arg("--mutants-root")
        .arg(pkg.path())
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("@m1"), "stdout: {stdout}");
    assert!(stdout.contains("x <= lo"), "stdout: {stdout}");
}

#[tokio::test]
async fn e2e_generate_replay_matches_recording() {
    let pkg = TempDir::new().unwrap();
    let recorded_dir = TempDir::new().unwrap();
    let replay_dir = TempDir::new().unwrap();
    create_js_package(pkg.path());
    let recorded = record(pkg.path(), recorded_dir.path()).await;

    let output = Command::new(mutator_bin())
        .arg("generate")
        .arg(pkg.path())
        .arg("--replay")
        .arg(recorded_dir.path())
        .arg("--out-dir")
        .arg(replay_dir.path())
        .arg("--json")
        .env_remove("OPENAI_API_ENDPOINT")
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = summary_json(&output.stdout);
    assert_eq!(json["nrPrompts"], recorded.nr_prompts);
    assert_eq!(json["nrCandidates"], recorded.nr_candidates);
    assert_eq!(json["nrMutants"], recorded.nr_mutants);
    assert_eq!(json["nrReplayMissing"], 0);
    assert_eq!(
        state::load_mutants(replay_dir.path()).unwrap(),
        state::load_mutants(recorded_dir.path()).unwrap()
    );
}

#[test]
fn e2e_replay_into_its_own_dir_is_refused() {
    let pkg = TempDir::new().unwrap();
    create_js_package(pkg.path());
    let dir = pkg.path().join("MUTATION_TESTING");

    let output = Command::new(mutator_bin())
        .arg("generate")
        .arg(pkg.path())
        .arg("--replay")
        .arg(&dir)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("are the same"));
}

#[test]
fn e2e_replay_dir_spelled_differently_is_still_refused() {
    let pkg = TempDir::new().unwrap();
    create_js_package(pkg.path());
    let dir = pkg.path().join("MUTATION_TESTING");
    std::fs::create_dir_all(&dir).unwrap();
    let detour = pkg.path().join("src").join("..").join("MUTATION_TESTING");

    let output = Command::new(mutator_bin())
        .arg("generate")
        .arg(pkg.path())
        .arg("--replay")
        .arg(&dir)
        .arg("--out-dir")
        .arg(&detour)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("are the same"));
}

#[test]
fn e2e_generate_without_endpoint_is_a_config_error() {
    let pkg = TempDir::new().unwrap();
    create_js_package(pkg.path());

    let output = Command::new(mutator_bin())
        .arg("generate")
        .arg(pkg.path())
        .arg("--no-caching")
        .env_remove("OPENAI_API_ENDPOINT")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("OPENAI_API_ENDPOINT"));
}

#[test]
fn e2e_invalid_options_are_rejected() {
    let pkg = TempDir::new().unwrap();
    create_js_package(pkg.path());

    let output = Command::new(mutator_bin())
        .arg("generate")
        .arg(pkg.path())
        .args(["--nr-attempts", "0"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("nrAttempts"));
}

#[test]
fn e2e_missing_package_and_missing_run() {
    let dir = TempDir::new().unwrap();

    let generate = Command::new(mutator_bin())
        .arg("generate")
        .arg(dir.path().join("nope"))
        .output()
        .unwrap();
    assert_eq!(generate.status.code(), Some(2));

    let summary = Command::new(mutator_bin())
        .arg("summary")
        .arg(dir.path())
        .output()
        .unwrap();
    assert_eq!(summary.status.code(), Some(2));
}
