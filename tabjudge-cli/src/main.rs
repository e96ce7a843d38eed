//! tabjudge CLI — judge the faithfulness of tabular insights.
//!
//! Thin surface over `tabjudge-core`: prepares datasets, then runs either
//! the G-Eval direct scorer or the claim-level verification pipeline over
//! the prepared units.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabjudge_core::claims::AggregationPolicy;
use tabjudge_core::dataset::{self, DatasetKind};
use tabjudge_core::geval::EvalMode;
use tabjudge_core::inference::StructuredClient;
use tabjudge_core::runner::{BatchRunner, Strategy, save_results};
use tabjudge_core::{JudgeConfig, create_provider, load_config};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// tabjudge: LLM-judged faithfulness evaluation for tabular insights
#[derive(Parser, Debug)]
#[command(name = "tabjudge", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (config discovery)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Directory containing the input JSON files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory for prepared datasets and results
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prepare evaluation units: filter, join human scores, attach tables
    Prep {
        /// Dataset to prepare; omit to prepare all
        #[arg(long)]
        dataset: Option<DatasetKind>,
    },
    /// Rate answers 1-5 against a rubric (G-Eval)
    Score {
        #[arg(long, default_value = "fetaqa")]
        dataset: DatasetKind,
        /// Judge model identifier
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value = "faithfulness")]
        mode: EvalMode,
        /// Bounded concurrency across units
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Decompose insights into claims and verify each against the table
    Verify {
        #[arg(long, default_value = "fetaqa")]
        dataset: DatasetKind,
        /// Judge model identifier
        #[arg(long)]
        model: Option<String>,
        /// Aggregation policy: all, majority, or threshold:<fraction>
        #[arg(long)]
        aggregation: Option<AggregationPolicy>,
        /// Bounded concurrency across units
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

fn init_tracing(verbose: u8, quiet: bool) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "tabjudge", "tabjudge")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "tabjudge.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    guard
}

fn structured_client(config: &JudgeConfig) -> anyhow::Result<StructuredClient> {
    let provider = create_provider(&config.llm).context("failed to initialize LLM provider")?;
    Ok(
        StructuredClient::new(provider, config.llm.retry.clone())
            .with_temperature(config.llm.temperature)
            .with_max_tokens(config.llm.max_tokens),
    )
}

async fn run_batch(
    config: &JudgeConfig,
    dataset: DatasetKind,
    strategy: Strategy,
    concurrency: Option<usize>,
    output_name: String,
) -> anyhow::Result<()> {
    let prepared = dataset::prepared_path(&config.data.output_dir, dataset);
    let units = dataset::load_units(&prepared).with_context(|| {
        format!(
            "no prepared units at {} (run `tabjudge prep` first)",
            prepared.display()
        )
    })?;
    tracing::info!(
        dataset = %dataset,
        model = %config.llm.model,
        units = units.len(),
        "Starting evaluation run"
    );

    let client = structured_client(config)?;
    let runner = BatchRunner::new(client, strategy)
        .with_concurrency(concurrency.unwrap_or(config.eval.concurrency));
    let report = runner.run(units).await;

    let out_path = config.data.output_dir.join(output_name);
    save_results(&out_path, &report.records)?;
    println!(
        "Evaluated {} units ({} failed) -> {}",
        report.records.len(),
        report.failures.len(),
        out_path.display()
    );
    for failure in &report.failures {
        println!(
            "  failed: example_id={} model={}: {}",
            failure.example_id, failure.model, failure.error
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.quiet);

    let mut config = load_config(Some(&cli.workspace), None)
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;
    if let Some(data_dir) = cli.data_dir {
        config.data.data_dir = data_dir;
    }
    if let Some(output_dir) = cli.output_dir {
        config.data.output_dir = output_dir;
    }

    match cli.command {
        Commands::Prep { dataset } => {
            let datasets = match dataset {
                Some(d) => vec![d],
                None => vec![DatasetKind::Fetaqa, DatasetKind::Qtsumm],
            };
            for dataset in datasets {
                let units = dataset::prepare_units(&config.data.data_dir, dataset)
                    .with_context(|| format!("failed to prepare dataset '{dataset}'"))?;
                let path = dataset::prepared_path(&config.data.output_dir, dataset);
                dataset::save_units(&path, &units)?;
                println!("Saved {} units to {}", units.len(), path.display());
            }
        }
        Commands::Score {
            dataset,
            model,
            mode,
            concurrency,
        } => {
            if let Some(model) = model {
                config.llm.model = model;
            }
            let output_name = format!("geval_{mode}_{dataset}_{}.json", config.llm.model);
            run_batch(&config, dataset, Strategy::Direct(mode), concurrency, output_name).await?;
        }
        Commands::Verify {
            dataset,
            model,
            aggregation,
            concurrency,
        } => {
            if let Some(model) = model {
                config.llm.model = model;
            }
            let policy = match aggregation {
                Some(policy) => policy,
                None => config
                    .eval
                    .aggregation
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid eval.aggregation in config: {e}"))?,
            };
            let output_name = format!("claims_{dataset}_{}.json", config.llm.model);
            run_batch(
                &config,
                dataset,
                Strategy::ClaimLevel(policy),
                concurrency,
                output_name,
            )
            .await?;
        }
    }

    Ok(())
}
