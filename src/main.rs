//! QA Sweep CLI
//!
//! Runs, evaluates and inspects resumable QA pipeline sweeps.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qa_sweep::{
    config::Config,
    llm::LlmClient,
    persistence::SnapshotStore,
    registry::ExperimentDefinition,
    state::{Metrics, Snapshot},
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// QA Sweep - resumable parameter sweeps over QA pipelines
#[derive(Parser)]
#[command(name = "qa-sweep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run (or resume) the sweep declared in an experiment file
    Run {
        /// Path to the experiment definition (YAML)
        experiment: PathBuf,

        /// Ignore earlier snapshots and start from scratch
        #[arg(long)]
        fresh: bool,
    },

    /// Score the newest results of an experiment and print the averages
    Evaluate {
        /// Path to the experiment definition (YAML)
        experiment: PathBuf,

        /// Also score answers with the LLM judge
        #[arg(long)]
        judge: bool,
    },

    /// Show what the newest snapshot of an experiment contains
    Status {
        /// Experiment name
        name: String,
    },

    /// Delete old snapshots of an experiment
    Prune {
        /// Experiment name
        name: String,

        /// Number of snapshots to keep (defaults to the configured value)
        #[arg(short, long)]
        keep: Option<usize>,
    },

    /// Test LLM connection
    Test,
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { experiment, fresh } => cmd_run(experiment, fresh).await,
        Commands::Evaluate { experiment, judge } => cmd_evaluate(experiment, judge).await,
        Commands::Status { name } => cmd_status(name),
        Commands::Prune { name, keep } => cmd_prune(name, keep),
        Commands::Test => cmd_test().await,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_run(path: PathBuf, fresh: bool) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let definition = ExperimentDefinition::load(&path)
        .with_context(|| format!("Failed to load experiment '{}'", path.display()))?;

    println!("Experiment: {}", definition.name);
    println!("Snapshots:  {}", config.store.snapshot_dir.display());

    let mut experiment = definition
        .build(&config)
        .context("Failed to build experiment")?
        .resume(!fresh);

    let start = Instant::now();
    let outcome = experiment.run().await.context("Sweep failed")?;
    let duration = start.elapsed();

    let results = &outcome.snapshot.results;
    println!("\nSweep finished in {:.2?}", duration);
    println!("  Cells:          {}", results.cells.len());
    println!("  Records total:  {}", results.record_count());
    println!("  New this run:   {}", outcome.produced);

    if !outcome.is_complete() {
        println!("\nFailed groups:");
        for failure in &outcome.failed {
            println!(
                "  {} / {} / {}: {}",
                failure.dataset, failure.chunker, failure.ranker, failure.error
            );
        }
        anyhow::bail!(
            "{} group(s) failed; run again to resume",
            outcome.failed.len()
        );
    }

    Ok(())
}

async fn cmd_evaluate(path: PathBuf, judge: bool) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let definition = ExperimentDefinition::load(&path)
        .with_context(|| format!("Failed to load experiment '{}'", path.display()))?;
    let aggregator = definition
        .aggregator(&config, judge)
        .context("Failed to set up scorers")?;

    let store = SnapshotStore::from_config(&config.store);
    let Some(mut snapshot) = store
        .load(&definition.name)
        .context("Failed to read snapshots")?
    else {
        anyhow::bail!(
            "No results for '{}' in '{}'. Run the experiment first.",
            definition.name,
            store.dir().display()
        );
    };

    let evaluated = aggregator.evaluate(&mut snapshot).await;

    // Keep whatever was scored, even if a scorer gave up part way.
    store.save(&snapshot).context("Failed to save snapshot")?;
    store
        .prune(&snapshot.name, store.keep())
        .context("Failed to prune snapshots")?;

    let report = evaluated.context("Evaluation failed")?;
    println!(
        "Scored {} record(s), {} already scored",
        report.scored, report.unchanged
    );

    if let Some(overall) = &snapshot.results.overall {
        print_metrics_table("Overall", overall);
    }

    Ok(())
}

fn cmd_status(name: String) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let store = SnapshotStore::from_config(&config.store);

    let files = store.list(&name).context("Failed to list snapshots")?;
    let Some(snapshot) = store.load(&name).context("Failed to read snapshots")? else {
        anyhow::bail!(
            "No snapshots for '{}' in '{}'",
            name,
            store.dir().display()
        );
    };

    print_status(&snapshot, files.len());
    Ok(())
}

fn print_status(snapshot: &Snapshot, snapshot_count: usize) {
    let results = &snapshot.results;

    println!("Experiment Status");
    println!("{}", "─".repeat(60));
    println!("  Name:         {}", snapshot.name);
    if !snapshot.description.is_empty() {
        println!("  Description:  {}", snapshot.description);
    }
    println!("  Snapshots:    {}", snapshot_count);
    println!("  Cells:        {}", results.cells.len());
    println!("  Records:      {}", results.record_count());

    println!("\nRecords per cell:");
    for (key, records) in &results.cells {
        println!("  {:>5}  {}", records.len(), key);
    }

    if !results.times.is_empty() {
        println!("\nMean time per operation:");
        for (label, samples) in &results.times {
            if samples.is_empty() {
                continue;
            }
            let mean = samples.iter().sum::<f64>() / samples.len() as f64;
            println!("  {:<20} {:>9.3}s  ({} samples)", label, mean, samples.len());
        }
    }

    if let Some(evaluations) = &results.evaluations {
        print_metrics_table("Per cell", evaluations);
    }
    if let Some(overall) = &results.overall {
        print_metrics_table("Overall", overall);
    }
}

fn print_metrics_table(title: &str, table: &BTreeMap<String, Metrics>) {
    println!("\n{}:", title);
    println!("{}", "─".repeat(60));
    for (key, metrics) in table {
        println!("  {}", key);
        for (name, value) in metrics {
            println!("    {:<18} {:.4}", name, value);
        }
    }
}

fn cmd_prune(name: String, keep: Option<usize>) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let store = SnapshotStore::from_config(&config.store);
    let keep = keep.unwrap_or(store.keep());

    let removed = store
        .prune(&name, keep)
        .context("Failed to prune snapshots")?;
    println!(
        "Removed {} snapshot(s) of '{}', kept the newest {}",
        removed, name, keep
    );

    Ok(())
}

async fn cmd_test() -> Result<()> {
    println!("Testing LLM connection...\n");

    let config = Config::load().context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    let key_preview: String = config.llm.api_key.chars().take(8).collect();
    println!("  API Key:   {}...", key_preview);
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::with_retry(config.llm, config.retry)
        .context("Failed to create LLM client")?;

    println!("Sending test request...");
    match client.test_connection().await {
        Ok(()) => println!("Connection successful!"),
        Err(e) => println!("Connection failed: {}", e),
    }

    Ok(())
}
