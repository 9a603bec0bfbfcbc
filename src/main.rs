use llm_mutator::config::{self, Config};
use llm_mutator::discover;
use llm_mutator::generator::{self, MutantGenerator};
use llm_mutator::model::caching::CachingModel;
use llm_mutator::model::live::{HttpTransport, LiveModel};
use llm_mutator::model::replay::ReplayModel;
use llm_mutator::model::{Model, PostOptions};
use llm_mutator::output;
use llm_mutator::state;
use llm_mutator::templates;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "llm-mutator", version, about = "LLM-generated mutants for mutation testing")]
struct Cli {
    /// Log debug output (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate mutants for a package
    Generate(GenerateArgs),
    /// Print the summary of a finished run
    Summary {
        /// Run output directory (contains summary.json)
        dir: PathBuf,
        /// Also list the mutants, diffed against the package at this path
        #[arg(long)]
        mutants_root: Option<PathBuf>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Package directory containing the code to mutate
    path: PathBuf,
    /// Prompt template (built-in name or file)
    #[arg(long, env = "LLM_MUTATOR_TEMPLATE", default_value = config::DEFAULT_TEMPLATE)]
    template: String,
    /// System prompt (built-in name or file)
    #[arg(long, env = "LLM_MUTATOR_SYSTEM_PROMPT", default_value = config::DEFAULT_SYSTEM_PROMPT)]
    system_prompt: String,
    /// Model to query
    #[arg(long, env = "LLM_MUTATOR_MODEL", default_value = config::DEFAULT_MODEL)]
    model: String,
    /// Query the model directly, without the response cache
    #[arg(long)]
    no_caching: bool,
    /// Directory holding cached responses
    #[arg(long, env = "LLM_MUTATOR_CACHE_DIR", default_value = ".llm-cache")]
    cache_dir: PathBuf,
    /// Glob of files to mutate, relative to the package
    #[arg(long, default_value = config::DEFAULT_MUTATE)]
    mutate: String,
    /// Glob of files to leave alone
    #[arg(long, default_value = "")]
    ignore: String,
    /// Sampling temperature
    #[arg(long, env = "LLM_MUTATOR_TEMPERATURE", default_value = "0.0")]
    temperature: f64,
    /// Milliseconds between requests (0 is no rate limit)
    #[arg(long, env = "LLM_MUTATOR_RATE_LIMIT", default_value = "0")]
    rate_limit: u64,
    /// Attempts per prompt before giving up
    #[arg(long, default_value = "3")]
    nr_attempts: u32,
    /// Throttle for benchmarking (supersedes --rate-limit)
    #[arg(long)]
    benchmark: bool,
    /// Maximum tokens per completion
    #[arg(long, default_value = "250")]
    max_tokens: u32,
    /// Maximum number of prompts to issue
    #[arg(long, default_value = "1250")]
    max_nr_prompts: usize,
    /// Replay the run recorded in this directory instead of querying
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Only mutate fragments containing this string
    #[arg(long)]
    mutate_only: Option<String>,
    /// Only mutate fragments covering one of these lines (e.g. 1,3,5)
    #[arg(long)]
    mutate_only_lines: Option<String>,
    /// Lines a placeholder may span
    #[arg(long = "max-lines-in-placeholder", default_value = "1")]
    max_lines_in_placeholder: usize,
    /// Preferred providers, comma-separated, for routing endpoints
    #[arg(long)]
    provider: Option<String>,
    /// Where to write mutants.json and summary.json (default: <path>/MUTATION_TESTING)
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
    /// No output besides errors
    #[arg(short, long)]
    quiet: bool,
}

impl GenerateArgs {
    fn config(&self) -> Result<Config, config::ConfigError> {
        let mutate_only_lines = self
            .mutate_only_lines
            .as_deref()
            .map(config::parse_lines)
            .transpose()?;
        Ok(Config {
            model_name: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            max_nr_prompts: self.max_nr_prompts,
            rate_limit: self.rate_limit,
            nr_attempts: self.nr_attempts,
            template: self.template.clone(),
            system_prompt: self.system_prompt.clone(),
            mutate: self.mutate.clone(),
            ignore: self.ignore.clone(),
            benchmark: self.benchmark,
            mutate_only: self.mutate_only.clone(),
            mutate_only_lines,
            max_lines_in_placeholder: self.max_lines_in_placeholder,
        })
    }

    fn post_options(&self) -> PostOptions {
        PostOptions {
            provider_order: self.provider.as_ref().map(|p| {
                p.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
            }),
            ..PostOptions::default()
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("llm_mutator=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Generate(args) => cmd_generate(args).await,
        Commands::Summary {
            dir,
            mutants_root,
            json,
        } => cmd_summary(&dir, mutants_root.as_deref(), json),
    };

    process::exit(exit_code);
}

/// Model and effective configuration for a run.
fn build_model(args: &GenerateArgs) -> Result<(Box<dyn Model>, Config), String> {
    if let Some(replay_dir) = &args.replay {
        let model = ReplayModel::open(replay_dir).map_err(|e| e.to_string())?;
        let mut config = model.config().clone();
        config.mutate = args.mutate.clone();
        config.ignore = args.ignore.clone();
        config.validate().map_err(|e| e.to_string())?;
        println_unless(args.quiet || args.json, &format!(
            "Replaying {} recorded prompts from {}",
            model.nr_recorded(),
            replay_dir.display()
        ));
        return Ok((Box::new(model), config));
    }

    let config = args.config().map_err(|e| e.to_string())?;
    config.validate().map_err(|e| e.to_string())?;
    let system_prompt = templates::resolve(&config.system_prompt).map_err(|e| e.to_string())?;
    let transport = HttpTransport::from_env().map_err(|e| e.to_string())?;
    let live = LiveModel::new(transport, &config, system_prompt);
    let model: Box<dyn Model> = if args.no_caching {
        Box::new(live)
    } else {
        Box::new(CachingModel::new(live, &args.cache_dir))
    };
    Ok((model, config))
}

/// Whether two paths name the same directory; raw comparison when either
/// does not exist yet.
fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn println_unless(quiet: bool, msg: &str) {
    if !quiet {
        println!("{msg}");
    }
}

async fn cmd_generate(args: GenerateArgs) -> i32 {
    if !args.path.is_dir() {
        output::print_error(&format!(
            "Package directory not found: {}. Check the path and try again.",
            args.path.display()
        ));
        return 2;
    }
    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| generator::default_output_dir(&args.path));
    if args.replay.as_deref().is_some_and(|replay| same_dir(replay, &out_dir)) {
        output::print_error("Replay input and output directory are the same. Pass --out-dir.");
        return 2;
    }

    let (model, config) = match build_model(&args) {
        Ok(built) => built,
        Err(e) => {
            output::print_error(&e);
            return 2;
        }
    };
    let template = match templates::resolve(&config.template) {
        Ok(t) => t,
        Err(e) => {
            output::print_error(&e.to_string());
            return 2;
        }
    };
    let files = match discover::load_package(&args.path, &config) {
        Ok(f) => f,
        Err(e) => {
            output::print_error(&e.to_string());
            return 3;
        }
    };
    println_unless(args.quiet || args.json, &format!(
        "*** Generating mutants for {} in {} ({} files)",
        config.mutate,
        args.path.display(),
        files.len()
    ));

    let run = MutantGenerator::new(model.as_ref(), &config, template)
        .with_output_dir(&out_dir)
        .with_options(args.post_options())
        .generate(&files)
        .await;
    let run = match run {
        Ok(run) => run,
        Err(e) => {
            output::print_error(&format!("Failed to write run output: {}", e));
            return 3;
        }
    };

    if args.quiet {
        return 0;
    }
    if args.json {
        match serde_json::to_string(&run.summary) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                output::print_error(&e.to_string());
                return 3;
            }
        }
    } else {
        output::print_summary(&run.summary, &out_dir);
        output::print_success(&format!(
            "Wrote {} and {} to {}",
            state::MUTANTS_FILE,
            state::SUMMARY_FILE,
            out_dir.display()
        ));
    }
    0
}

fn cmd_summary(dir: &Path, mutants_root: Option<&Path>, json_mode: bool) -> i32 {
    let summary = match state::load_summary(dir) {
        Ok(s) => s,
        Err(e) => {
            output::print_error(&format!("No run found: {}. Run `llm-mutator generate` first.", e));
            return 2;
        }
    };
    if json_mode {
        match serde_json::to_string(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                output::print_error(&e.to_string());
                return 3;
            }
        }
    } else {
        output::print_summary(&summary, dir);
    }

    if let Some(root) = mutants_root {
        match state::load_mutants(dir) {
            Ok(mutants) => {
                println!();
                output::print_mutants(&mutants, root);
            }
            Err(e) => {
                output::print_error(&e.to_string());
                return 3;
            }
        }
    }
    0
}
