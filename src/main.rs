use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use fxtrend::application::feature_provider::EngineeredFeatureProvider;
use fxtrend::application::trend_predictor::{PipelineRun, TrendPredictor};
use fxtrend::config::AppConfig;
use fxtrend::domain::market::timeframe::Granularity;
use fxtrend::domain::ports::PriceSource;
use fxtrend::infrastructure::duka_csv::DukaCsvSource;
use fxtrend::infrastructure::macro_csv::MacroCsvSource;
use fxtrend::infrastructure::mock::SyntheticPriceSource;
use fxtrend::infrastructure::table_export::{default_export_path, write_processed_csv};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(author, version, about = "Forex trend forecasting pipeline", long_about = None)]
struct Cli {
    /// Currency pair, e.g. EURUSD
    #[arg(short, long, default_value = "EURUSD")]
    symbol: String,

    /// Bar granularity (M1, M5, M15, M30, H1, D1, W1); selects the regime
    #[arg(short, long, default_value = "H1")]
    timeframe: String,

    /// Dukascopy price CSV (defaults to <data_dir>/<tf>/<symbol>_<tf>_raw.csv)
    #[arg(long)]
    data: Option<PathBuf>,

    /// Macro series CSV (date,value), used by the long regime
    #[arg(long = "macro")]
    macro_csv: Option<PathBuf>,

    /// First date to load (YYYY-MM-DD)
    #[arg(long)]
    start: Option<String>,

    /// Last date to load (YYYY-MM-DD)
    #[arg(long)]
    end: Option<String>,

    /// Write the processed table as CSV (default path when no value is given)
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    export: Option<PathBuf>,

    /// Use a seeded synthetic random walk of this many bars instead of a CSV
    #[arg(long)]
    synthetic: Option<usize>,

    /// Random seed for the models
    #[arg(long)]
    seed: Option<u64>,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Accept a symbol outside the configured pairs (warns instead of failing)
    #[arg(long)]
    allow_unknown_pair: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(seed) = cli.seed {
        config.random_seed = seed;
    }

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let granularity = Granularity::from_str(&cli.timeframe)?;
    let regime = granularity.regime();
    let symbol = config.select_pair(&cli.symbol, cli.allow_unknown_pair)?;
    info!(
        "Running {} {} ({} regime, seed {})",
        symbol, granularity, regime, config.random_seed
    );

    let prices: Box<dyn PriceSource> = match cli.synthetic {
        Some(bars) => Box::new(
            SyntheticPriceSource::new(bars, config.random_seed).with_granularity(granularity),
        ),
        None => {
            let path = cli
                .data
                .clone()
                .unwrap_or_else(|| DukaCsvSource::default_path(&config.data_dir, &symbol, granularity));
            let start = parse_date_arg(cli.start.as_deref(), "--start")?.unwrap_or(config.default_start);
            let end = parse_date_arg(cli.end.as_deref(), "--end")?.unwrap_or(config.default_end);
            if start > end {
                anyhow::bail!("--start {} is after --end {}", start, end);
            }
            info!("Loading prices from {:?} ({} to {})", path, start, end);
            Box::new(DukaCsvSource::new(path).with_range(Some(start), Some(end)))
        }
    };

    let profile = config.profile(regime).clone();
    let mut provider = EngineeredFeatureProvider::new(profile.clone(), prices);
    if let Some(path) = &cli.macro_csv {
        if regime.uses_macro_data() {
            provider = provider.with_macro_source(Box::new(MacroCsvSource::new(path)));
        } else {
            warn!("--macro is only used by the long regime; ignoring {:?}", path);
        }
    }

    let mut predictor = TrendPredictor::new(profile, Box::new(provider), config.random_seed)
        .with_policy(config.signal_policy())
        .with_simulator(config.risk_simulator());

    let dataset = predictor
        .preprocess_data()
        .context("Failed to preprocess data")?;

    if let Some(path) = &cli.export {
        let path = if path.as_os_str().is_empty() {
            default_export_path(&config.data_dir, &symbol, granularity)
        } else {
            path.clone()
        };
        write_processed_csv(&dataset.table, &path)
            .with_context(|| format!("Failed to export processed table to {:?}", path))?;
    }

    let run = predictor
        .fit_and_predict(dataset)
        .context("Failed to train and predict")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_report(&symbol, granularity, &run);
    }
    Ok(())
}

fn parse_date_arg(raw: Option<&str>, flag: &str) -> Result<Option<NaiveDate>> {
    raw.map(|s| {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("Failed to parse {} (expected YYYY-MM-DD): {}", flag, s))
    })
    .transpose()
}

fn print_report(symbol: &str, granularity: Granularity, run: &PipelineRun) {
    let prediction = &run.prediction;
    let risk = &prediction.risk;

    println!("{} {} ({} regime)", symbol, granularity, run.regime);
    println!("Windows trained: {}", run.windows);
    println!("Latest close: {:.5}", run.price);
    println!("Prediction: {:.5}", prediction.estimate);
    println!("Trade Signal: {}", prediction.signal);
    println!(
        "Risk: up {:.1}% / down {:.1}%, expected move {:.4}, risk/reward {:.2}, confidence {:.3}",
        risk.up_probability * 100.0,
        risk.down_probability * 100.0,
        risk.expected_move,
        risk.risk_reward,
        risk.confidence
    );
    for warning in &run.warnings {
        println!("Warning: {}", warning);
    }
}
