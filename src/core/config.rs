use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::alerts::model::AlertCategory;
use super::error::ConfigError;
use super::model::{UserRole, UserScope};

/// Application settings, persisted as `settings.json`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// Directory holding the JSON documents read by the file data source
    pub data_dir: PathBuf,
    #[serde(default)]
    pub logging: LogSettings,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub weather: WeatherSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            logging: LogSettings::default(),
            monitor: MonitorConfig::default(),
            weather: WeatherSettings::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
    /// Optional log file, relative to the config directory
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WeatherSettings {
    /// Leave empty to disable the HTTP weather service
    #[serde(default)]
    pub api_key: String,
    pub base_url: String,
    pub units: String,
    pub timeout_secs: u64,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openweathermap.org/data/2.5/weather".to_string(),
            units: "metric".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Schedule for one detector.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval_secs: u64,
    pub enabled: bool,
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    fn default_for(category: AlertCategory) -> Self {
        let interval_secs = match category {
            AlertCategory::Weather => 1800,
            _ => 120,
        };
        Self {
            interval_secs,
            enabled: true,
        }
    }
}

/// Permit validity windows, per state, in days.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PermitValidity {
    pub default_days: u32,
    #[serde(default)]
    pub by_state: BTreeMap<String, u32>,
}

impl PermitValidity {
    pub fn days_for(&self, state: &str) -> u32 {
        self.by_state
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(state))
            .map(|(_, days)| *days)
            .unwrap_or(self.default_days)
    }
}

impl Default for PermitValidity {
    fn default() -> Self {
        Self {
            default_days: 7,
            by_state: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct WeatherThresholds {
    /// Metres per second
    pub wind_speed: f64,
    /// 0.0 to 1.0
    pub flood_risk: f64,
    /// Whether a storm flag alone is severe
    pub storm: bool,
}

impl Default for WeatherThresholds {
    fn default() -> Self {
        Self {
            wind_speed: 17.0,
            flood_risk: 0.6,
            storm: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// How often the interaction loop checks for pending alerts
    pub idle_check_secs: u64,
    /// Delivered alerts kept for audit
    pub history_limit: usize,
    pub history_max_age_hours: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            idle_check_secs: 15,
            history_limit: 200,
            history_max_age_hours: 24,
        }
    }
}

/// Ten years; longer windows are configuration mistakes.
pub const MAX_PERMIT_VALIDITY_DAYS: u32 = 3650;

/// One year of delivered-alert history.
pub const MAX_HISTORY_AGE_HOURS: u64 = 24 * 365;

/// Everything the alerting engine needs; fixed once the monitor starts.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MonitorConfig {
    #[serde(default)]
    pub user: UserScope,
    #[serde(default = "default_pollers")]
    pub pollers: BTreeMap<AlertCategory, PollerConfig>,
    pub permit_warning_days: u32,
    pub deadline_warning_hours: u32,
    #[serde(default)]
    pub permit_validity: PermitValidity,
    #[serde(default)]
    pub weather_thresholds: WeatherThresholds,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default = "default_failure_backoff")]
    pub failure_backoff_secs: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_pollers() -> BTreeMap<AlertCategory, PollerConfig> {
    AlertCategory::all()
        .iter()
        .map(|category| (*category, PollerConfig::default_for(*category)))
        .collect()
}

fn default_failure_backoff() -> u64 {
    10
}

fn default_max_backoff() -> u64 {
    300
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            user: UserScope::default(),
            pollers: default_pollers(),
            permit_warning_days: 3,
            deadline_warning_hours: 24,
            permit_validity: PermitValidity::default(),
            weather_thresholds: WeatherThresholds::default(),
            delivery: DeliveryConfig::default(),
            failure_backoff_secs: default_failure_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl MonitorConfig {
    /// Poller settings for a category; categories missing from the map use the defaults.
    pub fn poller(&self, category: AlertCategory) -> PollerConfig {
        self.pollers
            .get(&category)
            .copied()
            .unwrap_or_else(|| PollerConfig::default_for(category))
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    /// Reject values the engine cannot run with. Called before any task starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for category in AlertCategory::all() {
            let poller = self.poller(*category);
            if poller.interval_secs == 0 {
                return Err(ConfigError::invalid(
                    format!("pollers.{}.interval_secs", category.key_prefix()),
                    "must be greater than zero",
                ));
            }
        }
        if self.deadline_warning_hours == 0 {
            return Err(ConfigError::invalid("deadline_warning_hours", "must be greater than zero"));
        }
        let validity_range = 1..=MAX_PERMIT_VALIDITY_DAYS;
        let validity_message = format!("must be between 1 and {MAX_PERMIT_VALIDITY_DAYS} days");
        if !validity_range.contains(&self.permit_validity.default_days) {
            return Err(ConfigError::invalid("permit_validity.default_days", validity_message));
        }
        if let Some((state, _)) = self
            .permit_validity
            .by_state
            .iter()
            .find(|(_, days)| !validity_range.contains(*days))
        {
            return Err(ConfigError::invalid(
                format!("permit_validity.by_state.{state}"),
                validity_message,
            ));
        }
        let thresholds = &self.weather_thresholds;
        if !(thresholds.wind_speed.is_finite() && thresholds.wind_speed > 0.0) {
            return Err(ConfigError::invalid("weather_thresholds.wind_speed", "must be a positive number"));
        }
        if !(0.0..=1.0).contains(&thresholds.flood_risk) {
            return Err(ConfigError::invalid("weather_thresholds.flood_risk", "must be between 0 and 1"));
        }
        if self.delivery.idle_check_secs == 0 {
            return Err(ConfigError::invalid("delivery.idle_check_secs", "must be greater than zero"));
        }
        if !(1..=MAX_HISTORY_AGE_HOURS).contains(&self.delivery.history_max_age_hours) {
            return Err(ConfigError::invalid(
                "delivery.history_max_age_hours",
                format!("must be between 1 and {MAX_HISTORY_AGE_HOURS}"),
            ));
        }
        if self.delivery.history_limit == 0 {
            return Err(ConfigError::invalid("delivery.history_limit", "must be greater than zero"));
        }
        if self.max_backoff_secs < self.failure_backoff_secs {
            return Err(ConfigError::invalid(
                "max_backoff_secs",
                "must not be smaller than failure_backoff_secs",
            ));
        }
        if matches!(self.user.role, UserRole::Driver | UserRole::Client)
            && self.user.email.as_deref().map_or(true, |e| e.trim().is_empty())
        {
            return Err(ConfigError::invalid("user.email", "required for driver and client roles"));
        }
        Ok(())
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Load settings, falling back to defaults when the file is absent or unreadable.
    pub fn load(&self) -> Settings {
        match self.try_load() {
            Ok(Some(settings)) => settings,
            Ok(None) => Settings::default(),
            Err(e) => {
                log::warn!("{e}; using default settings");
                Settings::default()
            }
        }
    }

    /// Load settings, writing the defaults out if no file exists yet.
    pub fn load_or_init(&self) -> Result<Settings, ConfigError> {
        match self.try_load()? {
            Some(settings) => Ok(settings),
            None => {
                let settings = Settings::default();
                self.save(&settings)?;
                log::info!("Wrote default settings to {}", self.config_path.display());
                Ok(settings)
            }
        }
    }

    fn try_load(&self) -> Result<Option<Settings>, ConfigError> {
        if !self.config_path.exists() {
            return Ok(None);
        }
        let load_failed = |message: String| ConfigError::LoadFailed {
            path: self.config_path.clone(),
            message,
        };
        let content = fs::read_to_string(&self.config_path).map_err(|e| load_failed(e.to_string()))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| load_failed(e.to_string()))
    }

    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: self.config_path.clone(),
            message,
        };
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(settings).map_err(|e| save_failed(e.to_string()))?;
        fs::write(&self.config_path, content).map_err(|e| save_failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());

        let default = manager.load();
        assert_eq!(default.monitor.permit_warning_days, 3);

        let mut new_settings = Settings::default();
        new_settings.data_dir = PathBuf::from("/tmp/orders");
        new_settings.monitor.deadline_warning_hours = 12;
        new_settings.monitor.permit_validity.by_state.insert("Texas".to_string(), 30);

        manager.save(&new_settings).unwrap();
        let loaded = manager.load();

        assert_eq!(loaded.data_dir, PathBuf::from("/tmp/orders"));
        assert_eq!(loaded.monitor.deadline_warning_hours, 12);
        assert_eq!(loaded.monitor.permit_validity.days_for("texas"), 30);
        assert_eq!(loaded.monitor.permit_validity.days_for("Ohio"), 7);
    }

    #[test]
    fn test_load_or_init_writes_defaults() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().join("nested"));
        let settings = manager.load_or_init().unwrap();
        assert_eq!(settings, Settings::default());
        assert!(manager.path().exists());
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());
        fs::write(manager.path(), "{ not json").unwrap();
        assert_eq!(manager.load(), Settings::default());
        assert!(matches!(manager.load_or_init(), Err(ConfigError::LoadFailed { .. })));
    }

    #[test]
    fn test_partial_monitor_section_uses_defaults() {
        let json = r#"{
            "data_dir": "data",
            "monitor": { "permit_warning_days": 5, "deadline_warning_hours": 48 }
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.monitor.permit_warning_days, 5);
        assert_eq!(settings.monitor.poller(AlertCategory::Weather).interval_secs, 1800);
        assert_eq!(settings.monitor.poller(AlertCategory::Status).interval_secs, 120);
        assert!(settings.monitor.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = MonitorConfig::default();
        config.pollers.insert(
            AlertCategory::Deadline,
            PollerConfig {
                interval_secs: 0,
                enabled: true,
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pollers.deadline.interval_secs"));

        let mut config = MonitorConfig::default();
        config.weather_thresholds.flood_risk = 1.5;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.permit_validity.by_state.insert("Utah".to_string(), 0);
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.delivery.history_max_age_hours = 10_000_000_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("delivery.history_max_age_hours"));

        let mut config = MonitorConfig::default();
        config.permit_validity.default_days = MAX_PERMIT_VALIDITY_DAYS + 1;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.permit_validity.by_state.insert("Texas".to_string(), u32::MAX);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("permit_validity.by_state.Texas"));

        let mut config = MonitorConfig::default();
        config.user = UserScope {
            role: UserRole::Driver,
            email: None,
        };
        assert!(config.validate().is_err());
    }
}
