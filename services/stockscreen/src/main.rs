//! Stockscreen - strong-stock screener over a local market data directory.
//!
//! Loads `~/.stockscreen/config.json`, runs the daily screen and, when
//! enabled, the intraday trend scan, then prints both reports as JSON.

use serde::Serialize;
use stockscreen::screener::{ScreenError, ScreenReport, TrendScanReport};
use stockscreen::ScreenerService;
use stockscreen_common::config::{Config, ConfigSource};
use stockscreen_common::logging::init_logging;
use stockscreen_common::Error;

#[derive(Serialize)]
struct Output<'a> {
    screen: &'a ScreenReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    trend: Option<&'a TrendScanReport>,
}

/// Map a service failure onto the shared error type for the exit code.
fn classify(err: anyhow::Error) -> Error {
    let message = format!("{err:#}");
    match err.downcast_ref::<ScreenError>() {
        Some(ScreenError::EmptyUniverse) | Some(ScreenError::InvalidDateRange { .. }) => {
            Error::InvalidInput(message)
        }
        Some(ScreenError::InvalidCriteria(_)) => Error::Config(message),
        None => Error::DataSource(message),
    }
}

async fn run() -> Result<(), Error> {
    let startup = std::time::Instant::now();

    let (config, source) =
        Config::load_with_env().map_err(|e| Error::Config(format!("{e:#}")))?;
    config.validate()?;

    init_logging(&config.observability);
    tracing::info!("Stockscreen v{}", env!("CARGO_PKG_VERSION"));
    match &source {
        ConfigSource::File(path) => tracing::info!(path = %path.display(), "Loaded config"),
        ConfigSource::Defaults => tracing::info!("Config file not found, using defaults"),
    }

    let service = ScreenerService::new(config);
    let screen = service.run_screen().await.map_err(classify)?;
    let trend = service.run_trend_scan().await.map_err(classify)?;

    let output = Output {
        screen: &screen,
        trend: trend.as_ref(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    tracing::info!(
        duration_ms = startup.elapsed().as_millis() as u64,
        passed = screen.results.len(),
        "Done"
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("stockscreen: {err}");
        std::process::exit(err.exit_code());
    }
}
