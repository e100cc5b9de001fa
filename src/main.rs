//! content-curator: binary entrypoint.
//! Runs one selection batch (or prints past selections) and exits.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use content_curator::config::{PipelineConfig, RunSize};
use content_curator::fetch::HttpFetcher;
use content_curator::oracle::build_oracle;
use content_curator::pipeline::{Pipeline, RunReport};
use content_curator::scoring::{PromptSet, ScoringAdapter};
use content_curator::store::{
    CandidateSource, JsonlCandidateSource, JsonlSelectionStore, SelectionRecord,
    DEFAULT_CANDIDATES_PATH, DEFAULT_SELECTED_PATH,
};

const FETCH_TIMEOUT_SECS: u64 = 20;

#[derive(Parser)]
#[command(
    name = "content-curator",
    version,
    about = "Score, shortlist and select industry news candidates per bucket.",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Arguments of the default `select` command.
    #[command(flatten)]
    select: SelectArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    /// A bare invocation is `select` with the top-level arguments.
    fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Select(self.select))
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one selection batch (default).
    Select(SelectArgs),
    /// Print rows already in the selection file.
    Report {
        #[arg(long, env = "SELECTED_PATH", default_value = DEFAULT_SELECTED_PATH)]
        selected: PathBuf,
    },
}

#[derive(Debug, Args)]
struct SelectArgs {
    /// TEST (constrained) or PROD (unconstrained); overrides RUN_SIZE.
    #[arg(long, value_parser = parse_run_size)]
    mode: Option<RunSize>,

    /// Raw candidates (JSON Lines).
    #[arg(long, env = "CANDIDATES_PATH")]
    candidates: Option<PathBuf>,

    /// Append-only selection output, also the dedupe history.
    #[arg(long, env = "SELECTED_PATH")]
    selected: Option<PathBuf>,

    /// Pipeline TOML (defaults to $PIPELINE_CONFIG_PATH or config/pipeline.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory with pass1_scoring.md / pass2_scoring.md overriding the built-in prompts.
    #[arg(long)]
    prompts: Option<PathBuf>,

    /// Run the selection and print it without appending to the selection file.
    #[arg(long)]
    dry_run: bool,
}

fn parse_run_size(s: &str) -> Result<RunSize, String> {
    RunSize::parse(s).ok_or_else(|| format!("unknown mode `{s}` (expected TEST or PROD)"))
}

/// `RUST_LOG` filter (default `content_curator=info,warn`); `LOG_FORMAT=json`
/// switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("content_curator=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env when present; no-op otherwise.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match cli.into_command() {
        Command::Select(args) => run_select(args).await,
        Command::Report { selected } => {
            let rows = JsonlSelectionStore::new(selected).load_records()?;
            print_records(&rows);
            Ok(())
        }
    }
}

async fn run_select(args: SelectArgs) -> Result<()> {
    let mut cfg = match &args.config {
        Some(p) => PipelineConfig::load_from_file(p)?,
        None => PipelineConfig::load_default()?,
    };
    cfg.apply_overrides(|k| std::env::var(k).ok());
    if let Some(mode) = args.mode {
        cfg.run_size = mode;
    }

    let oracle_cfg = cfg.oracle.clone().resolved()?;
    let oracle = build_oracle(&oracle_cfg)?;
    let prompts = match &args.prompts {
        Some(dir) => PromptSet::load_dir(dir)?,
        None => PromptSet::default(),
    };
    let adapter = ScoringAdapter::new(oracle, prompts, cfg.text_limits());
    let fetcher = HttpFetcher::new(FETCH_TIMEOUT_SECS)?;

    let store = JsonlSelectionStore::new(
        args.selected
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SELECTED_PATH)),
    );
    let history = store
        .load_history()
        .with_context(|| format!("reading history from {}", store.path().display()))?;
    let source = JsonlCandidateSource::new(
        args.candidates
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CANDIDATES_PATH)),
    );

    info!(
        mode = %cfg.run_size,
        oracle = adapter.oracle_name(),
        history = history.len(),
        dry_run = args.dry_run,
        "starting selection run"
    );

    let pipeline = Pipeline::new(&cfg, &adapter, &fetcher);
    let now = Utc::now();
    let report = if args.dry_run {
        let raw = source.load().await?;
        pipeline.select(raw, &history, now).await
    } else {
        pipeline.run_once(&source, &history, &store, now).await?
    };

    print_summary(&report);
    print_records(&report.records);
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!(
        "run {}: {} candidates in, {} records, {} ready",
        report.selected_at.to_rfc3339(),
        report.candidates_in,
        report.records.len(),
        report.ready_count()
    );
}

fn print_records(rows: &[SelectionRecord]) {
    for r in rows {
        println!(
            "{:<14} {:<7} {:>5.2} {:<5} {}",
            r.bucket.as_str(),
            r.selection_role.as_str(),
            r.final_score,
            if r.ready_for_write { "ready" } else { "-" },
            r.title
        );
        if !r.key_evidence_notes.is_empty() {
            println!("{:>29} {}", "evidence:", r.key_evidence_notes);
        }
    }
}
