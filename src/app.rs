use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Timelike};
use fern::Dispatch;
use log::LevelFilter;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;

use crate::core::{
    alerts::model::AlertCategory,
    config::{ConfigManager, LogSettings, Settings},
    coordinator::{ConsoleSpeech, SpeechOutput, TemplateSummarizer},
    error::{ConfigError, FetchError, MonitorError},
    monitor::ProactiveMonitor,
    phrases::{Command, PhraseMatcher},
    source::{DataSource, FileDataSource, WeatherService},
    weather::{OpenWeatherClient, UnavailableWeather},
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("Failed to set up logging: {0}")]
    Logging(#[from] fern::InitError),

    #[error("Failed to set up weather service: {0}")]
    Weather(#[from] FetchError),

    #[error("Invalid trigger phrase pattern: {0}")]
    Phrases(#[from] regex::Error),
}

fn level_filter(level: &str) -> LevelFilter {
    match level.to_uppercase().as_str() {
        "ERROR" => LevelFilter::Error,
        "WARN" => LevelFilter::Warn,
        "DEBUG" => LevelFilter::Debug,
        "TRACE" => LevelFilter::Trace,
        "OFF" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

fn setup_logging(config_dir: &Path, logging: &LogSettings) -> Result<(), fern::InitError> {
    let mut dispatch = Dispatch::new()
        .format(|out, msg, record| {
            out.finish(format_args!(
                "[{}][{:5}][{}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                msg
            ))
        })
        .level(level_filter(&logging.level))
        .chain(std::io::stdout());

    if let Some(file) = &logging.file {
        dispatch = dispatch.chain(fern::log_file(config_dir.join(file))?);
    }

    dispatch.apply()?;
    Ok(())
}

/// Relative data directories are resolved against the config directory.
fn resolve_data_dir(config_dir: &Path, settings: &Settings) -> PathBuf {
    if settings.data_dir.is_absolute() {
        settings.data_dir.clone()
    } else {
        config_dir.join(&settings.data_dir)
    }
}

fn farewell() -> &'static str {
    let hour = Local::now().hour();
    if hour >= 21 || hour < 6 {
        "Good night, take care!"
    } else {
        "Have a good day, drive safe!"
    }
}

/// Load settings, start the monitor and run the console interaction loop
/// until the user exits or stdin closes.
pub async fn run() -> Result<(), AppError> {
    let config_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let config_manager = ConfigManager::new(config_dir.clone());
    let settings = config_manager.load_or_init()?;
    setup_logging(&config_dir, &settings.logging)?;
    log::info!("Loaded settings from {}", config_manager.path().display());

    let mut monitor_config = settings.monitor.clone();
    let weather: Arc<dyn WeatherService> = if settings.weather.api_key.trim().is_empty() {
        log::warn!("No weather API key configured, weather detector disabled");
        let mut poller = monitor_config.poller(AlertCategory::Weather);
        poller.enabled = false;
        monitor_config.pollers.insert(AlertCategory::Weather, poller);
        Arc::new(UnavailableWeather)
    } else {
        Arc::new(OpenWeatherClient::new(settings.weather.clone())?)
    };

    let data_dir = resolve_data_dir(&config_dir, &settings);
    log::info!("Reading documents from {}", data_dir.display());
    let source: Arc<dyn DataSource> = Arc::new(FileDataSource::new(data_dir));
    let speech = Arc::new(ConsoleSpeech);

    let mut monitor = ProactiveMonitor::new(
        source,
        weather,
        Arc::new(TemplateSummarizer),
        Arc::clone(&speech) as Arc<dyn SpeechOutput>,
    );
    let idle_check = Duration::from_secs(monitor_config.delivery.idle_check_secs);
    monitor.start(monitor_config).await?;

    let matcher = PhraseMatcher::new()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut idle = tokio::time::interval(idle_check);
    idle.set_missed_tick_behavior(MissedTickBehavior::Delay);
    idle.tick().await;

    println!("Assistant ready. Ask \"any updates?\" or say \"exit\" to quit.");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        log::error!("Failed to read input: {e}");
                        break;
                    }
                };
                match matcher.classify(&line) {
                    Command::RequestUpdate => {
                        monitor.request_update().await;
                    }
                    Command::Exit => {
                        speech.speak(farewell());
                        break;
                    }
                    Command::Unrecognized => {
                        if !line.trim().is_empty() {
                            log::debug!("Unrecognized input: {line}");
                        }
                    }
                }
            }
            _ = idle.tick() => {
                monitor.deliver_if_pending().await;
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
        }
    }

    monitor.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        assert_eq!(level_filter("debug"), LevelFilter::Debug);
        assert_eq!(level_filter("Warn"), LevelFilter::Warn);
        assert_eq!(level_filter("verbose"), LevelFilter::Info);
    }

    #[test]
    fn test_resolve_data_dir() {
        let mut settings = Settings::default();
        assert_eq!(
            resolve_data_dir(Path::new("/etc/haul"), &settings),
            PathBuf::from("/etc/haul/data")
        );
        settings.data_dir = PathBuf::from("/srv/orders");
        assert_eq!(resolve_data_dir(Path::new("/etc/haul"), &settings), PathBuf::from("/srv/orders"));
    }
}
