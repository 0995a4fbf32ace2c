//! Runs one refresh cycle and prints the result as JSON.
//!
//! Usage: `aqmon_service [CITY]`. Without a city the configured default is
//! used. Configuration comes from `AQMON_CONFIG` (TOML) and the environment.

use std::process::ExitCode;
use std::sync::Arc;

use aqmon_service::config::ServiceConfig;
use aqmon_service::ingest::openaq::OpenAqClient;
use aqmon_service::ingest::openmeteo::OpenMeteoClient;
use aqmon_service::logging::{self, DataSource};
use aqmon_service::refresh::Refresher;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("aqmon_service: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServiceConfig::from_env()?;
    logging::init_logger(
        config.logging.level,
        config.logging.file.as_deref(),
        config.logging.timestamps,
    )?;

    let city = std::env::args().nth(1).unwrap_or_else(|| config.default_city.clone());

    let openaq = Arc::new(OpenAqClient::new(
        config.openaq.base_url.as_str(),
        config.openaq.api_key.clone(),
        &config.http.user_agent,
        config.http.timeout(),
    )?);
    if config.openaq.api_key.is_none() {
        logging::warn(DataSource::OpenAq, None, "OPENAQ_API_KEY not set; requests may be rejected");
    }
    let weather = Arc::new(OpenMeteoClient::new(
        config.open_meteo.base_url.as_str(),
        &config.http.user_agent,
        config.http.timeout(),
    )?);

    let refresher = Refresher::new(
        openaq.clone(),
        openaq,
        weather,
        config.region_registry(),
        config.refresh_options(),
    );

    let center = config
        .region_registry()
        .default_center_for(&city)
        .unwrap_or_else(|| config.initial_center());

    let result = refresher.refresh(&city, center).await?;
    println!("{}", serde_json::to_string_pretty(&*result)?);
    Ok(())
}
