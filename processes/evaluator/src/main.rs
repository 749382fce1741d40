//! Command-line entry point for the replay evaluator

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{Config, Environment, File};
use lifecycle_module_tx_tracker::TxTracker;
use lifecycle_process_evaluator::{
    evaluator_config::EvaluatorConfig,
    fixture::{load_input, load_record, save_record},
    Evaluator,
};
use tracing::info;
use tracing_subscriber::{
    filter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter, Layer as _,
    Registry,
};

fn default_config_path() -> PathBuf {
    PathBuf::from(option_env!("LIFECYCLE_EVALUATOR_DEFAULT_CONFIG").unwrap_or("evaluator.toml"))
}

#[derive(Parser, Debug)]
#[command(about = "Replay a chain event log through the transaction tracker")]
struct Args {
    /// Path to configuration; ignored if absent.
    #[arg(long, default_value = default_config_path().into_os_string())]
    config: PathBuf,

    /// Replay input: ledger table and event log.
    #[arg(long)]
    input: Option<PathBuf>,

    /// How settlements on lost forks are treated.
    #[arg(long, value_parser = ["provisional", "permanent"])]
    settlement_mode: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score a run against an expected record (default).
    Score {
        #[arg(long)]
        expected: Option<PathBuf>,
    },
    /// Write the record of a run as a new expected-output file.
    Record {
        #[arg(long)]
        out: PathBuf,
    },
}

fn build_config(args: &Args) -> Result<Config> {
    let mut builder = Config::builder()
        .add_source(File::from(args.config.as_path()).required(false))
        .add_source(Environment::with_prefix("LIFECYCLE"));

    if let Some(input) = &args.input {
        builder = builder.set_override("input", input.to_string_lossy().to_string())?;
    }
    if let Some(mode) = &args.settlement_mode {
        builder = builder.set_override("settlement_mode", mode.as_str())?;
    }
    if let Some(Command::Score {
        expected: Some(expected),
    }) = &args.command
    {
        builder = builder.set_override("expected", expected.to_string_lossy().to_string())?;
    }

    Ok(builder.build()?)
}

pub fn main() -> Result<()> {
    let args = Args::parse();

    // Standard logging using RUST_LOG for log levels default to INFO
    let fmt_layer = fmt::layer().with_filter(
        EnvFilter::from_default_env().add_directive(filter::LevelFilter::INFO.into()),
    );
    Registry::default().with(fmt_layer).init();

    info!("Transaction lifecycle evaluator");

    let config = build_config(&args).context("Failed to load configuration")?;
    let settings = EvaluatorConfig::new(&config).context("Invalid configuration")?;

    let input = load_input(&settings.input)?;
    let evaluator = Evaluator::new(input);
    let mut tracker = TxTracker::new(settings.tracker.clone());

    match args.command {
        Some(Command::Record { out }) => {
            let record = evaluator.run(&mut tracker)?;
            save_record(&out, &record)?;
            info!(path = %out.display(), "Record written");
        }
        Some(Command::Score { .. }) | None => {
            let expected = load_record(&settings.expected)?;
            let report = evaluator.evaluate(&mut tracker, &expected)?;
            println!("SCORE: {}", report.score);
        }
    }

    Ok(())
}
