mod display;
mod input;

use std::path::{Path, PathBuf};

use aipanel_core::{PipelineConfig, parse_date};
use aipanel_ingest::normalize;
use aipanel_panel::{Pipeline, RunContext};
use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "aipanel", version, about = "Firm-quarter panel of AI vs. control patent filings")]
struct Cli {
    /// Pipeline config (classifier tables, extractor options, aliases, policy date).
    #[arg(long, global = true, env = "AIPANEL_CONFIG", default_value = "config/panel.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the whole pipeline and write the Parquet tables.
    Run {
        /// Grant files: bulk XML (.xml), an API response (.json) or JSON lines.
        #[arg(long = "grants", required = true, num_args = 1..)]
        grants: Vec<PathBuf>,
        /// Office-action JSON-lines files.
        #[arg(long = "actions", num_args = 1..)]
        actions: Vec<PathBuf>,
        #[arg(long, default_value = "out")]
        out: PathBuf,
        /// Override the policy effective date (YYYY-MM-DD).
        #[arg(long, value_parser = parse_policy_date)]
        policy_date: Option<NaiveDate>,
        /// Override the token window searched around a statute citation.
        #[arg(long)]
        window: Option<usize>,
    },
    /// Classify grant records and print the rule that decided each one.
    Classify {
        #[arg(required = true, num_args = 1..)]
        grants: Vec<PathBuf>,
    },
    /// Scan one office-action text file for a subject-matter rejection.
    Extract {
        file: PathBuf,
        #[arg(long)]
        window: Option<usize>,
    },
    /// Resolve assignee names to firm ids.
    Resolve {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Summarise a written panel.parquet.
    Summary {
        panel: PathBuf,
        /// Show only one firm's rows (queried through DuckDB).
        #[cfg(feature = "duckdb")]
        #[arg(long)]
        firm: Option<String>,
    },
}

fn parse_policy_date(raw: &str) -> Result<NaiveDate, String> {
    parse_date(raw).ok_or_else(|| format!("not a date: {raw:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    info!("aipanel v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            grants,
            actions,
            out,
            policy_date,
            window,
        } => {
            let mut config = load_config(&cli.config, window)?;
            if let Some(date) = policy_date {
                config.panel.policy_effective_date = date;
            }
            run(config, &grants, &actions, &out).await
        }
        Command::Classify { grants } => classify(&load_config(&cli.config, None)?, &grants).await,
        Command::Extract { file, window } => {
            let config = load_config(&cli.config, window)?;
            let text = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let ctx = RunContext::new(&config)?;
            println!("=== {} ===", file.display());
            display::print_extraction(&ctx.extractor().extract(&text));
            Ok(())
        }
        Command::Resolve { names } => {
            let ctx = RunContext::new(&load_config(&cli.config, None)?)?;
            let resolutions: Vec<_> = names
                .into_iter()
                .map(|name| {
                    let resolution = ctx.resolver().resolve(&name);
                    (name, resolution)
                })
                .collect();
            display::print_resolutions(&resolutions);
            Ok(())
        }
        #[cfg(not(feature = "duckdb"))]
        Command::Summary { panel } => summary(&panel),
        #[cfg(feature = "duckdb")]
        Command::Summary { panel, firm } => match firm {
            Some(firm) => firm_rows(&panel, &firm),
            None => summary(&panel),
        },
    }
}

fn load_config(path: &Path, window: Option<usize>) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::load(path).with_context(|| format!("loading config {}", path.display()))?;
    if let Some(window) = window {
        if window == 0 {
            bail!("--window must be at least 1");
        }
        config.extractor.window_tokens = window;
    }
    Ok(config)
}

// ── Commands ──

async fn run(config: PipelineConfig, grants: &[PathBuf], actions: &[PathBuf], out: &Path) -> anyhow::Result<()> {
    let ctx = RunContext::new(&config)?;
    info!(policy_date = %ctx.policy_effective_date(), rules = ctx.classifier().rule_order().len(), "starting run");

    let (patents, office_actions) = tokio::try_join!(
        input::load_all(grants, input::read_patents),
        input::load_all(actions, input::read_office_actions),
    )?;
    if office_actions.is_empty() {
        warn!("no office actions given; every application will lack an outcome");
    }

    let output = tokio::task::spawn_blocking(move || Pipeline::with_context(ctx).run(patents, office_actions))
        .await
        .context("pipeline panicked")?;
    let files = aipanel_store::write_run(out, &output).with_context(|| format!("writing {}", out.display()))?;
    display::print_run(&output, &files);
    Ok(())
}

async fn classify(config: &PipelineConfig, grants: &[PathBuf]) -> anyhow::Result<()> {
    let ctx = RunContext::new(config)?;
    let patents = input::load_all(grants, input::read_patents).await?;

    let mut records = Vec::with_capacity(patents.len());
    for raw in patents {
        match normalize(raw) {
            Ok(n) => records.push(n.record),
            Err(e) => warn!(error = %e, "skipping malformed patent record"),
        }
    }
    records.sort_by(|a, b| a.application_id().cmp(b.application_id()));

    let decisions: Vec<_> = records
        .iter()
        .map(|r| r.application_id().to_string())
        .zip(ctx.classifier().classify_batch(&records))
        .collect();
    display::print_decisions(&decisions);
    Ok(())
}

fn summary(panel: &Path) -> anyhow::Result<()> {
    let batches = aipanel_store::read_parquet(panel).with_context(|| format!("reading {}", panel.display()))?;
    let rows = aipanel_store::panel_rows(&batches)?;
    display::print_panel_summary(&batches, &rows)
}

#[cfg(feature = "duckdb")]
fn firm_rows(panel: &Path, firm: &str) -> anyhow::Result<()> {
    let store = aipanel_store::PanelStore::open()?;
    store.load_panel(panel)?;
    let rows = store.rows_for_firm(firm)?;
    let batch = aipanel_store::panel_batch(&rows)?;
    println!("=== {firm} ===");
    display::print_batches(&[batch])
}
