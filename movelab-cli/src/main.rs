//! MoveLab CLI: train, evaluate, and inspect next-move classifiers.
//!
//! Commands:
//! - `download`: fetch daily bars from Polygon.io into `{data_dir}/{TICKER}.csv`
//! - `train`: run a full experiment from a TOML config file
//! - `evaluate`: score a saved model on a ticker's bars
//! - `features`: build the feature matrix for a ticker and summarize it
//!
//! Logs go to stderr (filter with `RUST_LOG`); reports go to stdout.
//! A `.env` file in the working directory is loaded first, so
//! `POLYGON_API_KEY` can live there.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use movelab_core::Evaluator;
use movelab_runner::{
    download_tickers, evaluate_saved_model, run_experiment, save_result, BarSource,
    CircuitBreaker, CsvBarStore, ExperimentConfig, ExperimentResult, FeatureBuilder,
    OhlcvFeatures, PolygonSource,
};

#[derive(Parser)]
#[command(
    name = "movelab",
    about = "MoveLab CLI: gradient-boosted next-move classification"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download daily bars from Polygon.io (needs POLYGON_API_KEY).
    Download {
        /// Ticker to download; repeat or comma-separate for several.
        #[arg(long, required = true, value_delimiter = ',')]
        ticker: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to five years before the end.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Directory to write `{TICKER}.csv` files into.
        #[arg(long, default_value = "data/raw")]
        data_dir: PathBuf,
    },
    /// Train and evaluate a model from a TOML experiment config.
    Train {
        /// Path to the experiment config file.
        #[arg(long)]
        config: PathBuf,

        /// Skip the classification report and confusion matrix.
        #[arg(long, default_value_t = false)]
        quiet: bool,
    },
    /// Evaluate a saved model on every labeled bar of a ticker.
    Evaluate {
        /// Path to a model written by `train`.
        #[arg(long)]
        model: PathBuf,

        /// Ticker whose bars to score.
        #[arg(long)]
        ticker: String,

        /// Directory holding `{TICKER}.csv` bar files.
        #[arg(long, default_value = "data/raw")]
        data_dir: PathBuf,

        /// Start date (YYYY-MM-DD). Defaults to the first bar.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to the last bar.
        #[arg(long)]
        end: Option<String>,

        /// Bars ahead the label compares against. Must match training.
        #[arg(long, default_value_t = 1)]
        horizon: usize,

        /// Print only the headline metrics.
        #[arg(long, default_value_t = false)]
        quiet: bool,
    },
    /// Build features for a ticker and print the matrix shape and label balance.
    Features {
        #[arg(long)]
        ticker: String,

        #[arg(long, default_value = "data/raw")]
        data_dir: PathBuf,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        #[arg(long, default_value_t = 1)]
        horizon: usize,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Download {
            ticker,
            start,
            end,
            data_dir,
        } => run_download(&ticker, start, end, data_dir),
        Commands::Train { config, quiet } => run_train(config, quiet),
        Commands::Evaluate {
            model,
            ticker,
            data_dir,
            start,
            end,
            horizon,
            quiet,
        } => run_evaluate(model, &ticker, data_dir, start, end, horizon, quiet),
        Commands::Features {
            ticker,
            data_dir,
            start,
            end,
            horizon,
        } => run_features(&ticker, data_dir, start, end, horizon),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}

fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    raw.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
    })
    .transpose()
}

fn run_download(
    tickers: &[String],
    start: Option<String>,
    end: Option<String>,
    data_dir: PathBuf,
) -> Result<()> {
    let start = parse_date(start.as_deref())?;
    let end = parse_date(end.as_deref())?;

    let breaker = Arc::new(CircuitBreaker::for_provider());
    let source = PolygonSource::from_env(breaker)?;
    let store = CsvBarStore::new(data_dir);
    let summary = download_tickers(&source, &store, tickers, start, end);

    for (ticker, path) in &summary.saved {
        println!("[ok] {ticker}: saved to {}", path.display());
    }
    for (ticker, err) in &summary.failed {
        eprintln!("[!] {ticker}: {err}");
    }
    if !summary.all_succeeded() {
        let cooldown = source.circuit_breaker().remaining_cooldown();
        if !cooldown.is_zero() {
            eprintln!("Polygon requests paused for {}s", cooldown.as_secs());
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run_train(config_path: PathBuf, quiet: bool) -> Result<()> {
    let mut config = ExperimentConfig::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if quiet {
        config.report.verbose = false;
    }
    info!(config = %config_path.display(), ticker = %config.data.ticker, "starting experiment");

    let store = CsvBarStore::new(&config.data.data_dir);
    let builder = OhlcvFeatures::new(config.features.horizon);
    let result = run_experiment(&config, &store, &builder, &Evaluator::new())?;

    print_summary(&result);

    if let Some(path) = &config.output.metrics_path {
        save_result(&result, path)?;
        println!("Result saved to: {}", path.display());
    }
    if let Some(path) = &result.model_path {
        println!("Model saved to:  {}", path.display());
    }

    if !result.gate_passed() {
        if let Some(gate) = &result.gate {
            for failure in &gate.failures {
                eprintln!("Gate failed: {failure}");
            }
        }
        std::process::exit(2);
    }
    Ok(())
}

fn run_evaluate(
    model: PathBuf,
    ticker: &str,
    data_dir: PathBuf,
    start: Option<String>,
    end: Option<String>,
    horizon: usize,
    quiet: bool,
) -> Result<()> {
    if horizon == 0 {
        bail!("--horizon must be at least 1");
    }
    let start = parse_date(start.as_deref())?;
    let end = parse_date(end.as_deref())?;

    let store = CsvBarStore::new(data_dir);
    let builder = OhlcvFeatures::new(horizon);
    let evaluation = evaluate_saved_model(
        &model,
        ticker,
        start,
        end,
        &store,
        &builder,
        &Evaluator::new(),
        !quiet,
    )?;

    println!();
    println!("=== Evaluation: {} ===", ticker.to_uppercase());
    println!("Rows:      {}", evaluation.confusion.total());
    for (name, value) in evaluation.metrics.as_map() {
        println!("{:<10} {value:.4}", format!("{name}:"));
    }
    Ok(())
}

fn run_features(
    ticker: &str,
    data_dir: PathBuf,
    start: Option<String>,
    end: Option<String>,
    horizon: usize,
) -> Result<()> {
    let start = parse_date(start.as_deref())?;
    let end = parse_date(end.as_deref())?;

    let store = CsvBarStore::new(data_dir);
    let bars = store.fetch(ticker, start, end)?;
    let builder = OhlcvFeatures::new(horizon);
    let data = builder.build(&bars)?;

    println!("Ticker:    {}", ticker.to_uppercase());
    println!("Bars:      {}", bars.len());
    println!("Rows:      {} ({} warmup bars dropped)", data.len(), builder.warmup());
    println!("Features:  {}", data.x.n_features());
    for name in data.x.feature_names() {
        println!("  - {name}");
    }
    if let (Some(first), Some(last)) = (data.dates.first(), data.dates.last()) {
        println!("Period:    {first} to {last}");
    }
    println!(
        "Labels:    {} up / {} not up ({:.1}% up)",
        data.y.count_positive(),
        data.len() - data.y.count_positive(),
        data.positive_rate() * 100.0
    );
    Ok(())
}

fn print_summary(result: &ExperimentResult) {
    println!();
    println!("=== Experiment Result ===");
    println!("Ticker:         {}", result.ticker);
    println!(
        "Period:         {} to {}",
        result.first_date, result.last_date
    );
    println!("Bars:           {}", result.bar_count);
    println!(
        "Rows:           {} train / {} validation / {} test (test from {})",
        result.train_rows, result.validation_rows, result.test_rows, result.test_start
    );
    println!("Trees:          {}", result.n_trees);
    println!("Dataset hash:   {}", &result.dataset_hash[..16]);
    println!();
    println!("--- Metrics ---");
    println!("Accuracy:       {:.4}", result.metrics.accuracy);
    println!("Precision:      {:.4}", result.metrics.precision);
    println!("Recall:         {:.4}", result.metrics.recall);
    println!("F1 Score:       {:.4}", result.metrics.f1_score);

    let top: Vec<_> = result
        .feature_importances
        .iter()
        .filter(|(_, gain)| *gain > 0.0)
        .take(5)
        .collect();
    if !top.is_empty() {
        println!();
        println!("--- Top Features ---");
        for (name, gain) in top {
            println!("{name:<16}{gain:.3}");
        }
    }

    if let Some(gate) = &result.gate {
        println!();
        println!(
            "Gate:           {}",
            if gate.passed { "PASSED" } else { "FAILED" }
        );
    }
}
