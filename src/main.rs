//! Starterkits batch runner.
//!
//! Fetches the configured datasets for each country given on the command
//! line, one country and one dataset at a time.
//!
//! # Usage
//!
//! ```text
//! starterkits KEN UGA
//! STARTERKITS_DATASETS="boundaries,wind:50,roads:primary|secondary" starterkits KEN
//! ```
//!
//! # Environment
//!
//! - `STARTERKITS_DATASETS` - comma-separated dataset list (default: all)
//! - `STARTERKITS_DATA_DIR` - output root (default: `Data`)
//! - `STARTERKITS_OPENTOPOGRAPHY_KEY` - OpenTopography API key
//! - `STARTERKITS_MASK_TO_BOUNDARY` - mask wind and elevation rasters to the boundary

use std::env;

use anyhow::bail;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use starterkits::{Config, DatasetKind, Fetcher};

fn datasets_from_env() -> anyhow::Result<Vec<DatasetKind>> {
    match env::var("STARTERKITS_DATASETS") {
        Ok(list) if !list.trim().is_empty() => Ok(list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<DatasetKind>)
            .collect::<Result<Vec<_>, _>>()?),
        _ => Ok(DatasetKind::all()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("starterkits=info".parse()?))
        .init();

    let countries: Vec<String> = env::args().skip(1).collect();
    if countries.is_empty() {
        bail!("usage: starterkits <ISO3> [<ISO3>...]");
    }

    let datasets = datasets_from_env()?;
    let config = Config::from_env();
    info!(
        data_dir = %config.data_dir.display(),
        datasets = datasets.len(),
        countries = countries.len(),
        "Starting starter-kit fetch"
    );

    let fetcher = Fetcher::new(config);
    let mut failed = 0usize;

    for code in &countries {
        match fetcher.fetch_all(code, &datasets).await {
            Ok(report) => {
                for (dataset, path) in &report.saved {
                    info!(country = %report.country, dataset, path = %path.display(), "Saved");
                }
                for (dataset, reason) in &report.skipped {
                    info!(country = %report.country, dataset, reason, "Nothing to save");
                }
                failed += report.errors.len();
            }
            Err(e) => {
                warn!(country = %code, error = %e, "Batch aborted");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} dataset fetch(es) failed");
    }
    Ok(())
}
