//! OpenWeatherMap-backed weather service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::config::WeatherSettings;
use super::error::FetchError;
use super::model::{GeoPoint, WeatherSeverity};
use super::source::WeatherService;

const SERVICE_NAME: &str = "openweather";

/// Rainfall (mm in the last hour) treated as certain flooding.
const FLOOD_RAIN_MM: f64 = 50.0;

const MPH_TO_MPS: f64 = 0.447_04;

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    #[serde(default)]
    weather: Vec<Condition>,
    #[serde(default)]
    wind: Option<Wind>,
    #[serde(default)]
    rain: Option<Rain>,
}

#[derive(Debug, Deserialize)]
struct Condition {
    id: u32,
}

#[derive(Debug, Deserialize)]
struct Wind {
    #[serde(default)]
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct Rain {
    #[serde(rename = "1h", default)]
    one_hour: Option<f64>,
}

/// Thunderstorms, heavy snow, squalls and tornadoes.
fn is_storm_condition(id: u32) -> bool {
    matches!(id, 200..=299 | 602 | 622 | 771 | 781)
}

fn severity_from(current: &CurrentWeather, units: &str) -> WeatherSeverity {
    let raw_wind = current.wind.as_ref().map_or(0.0, |w| w.speed);
    let wind_speed = if units == "imperial" {
        raw_wind * MPH_TO_MPS
    } else {
        raw_wind
    };
    let rain = current
        .rain
        .as_ref()
        .and_then(|r| r.one_hour)
        .unwrap_or(0.0);

    WeatherSeverity {
        wind_speed,
        flood_risk: (rain / FLOOD_RAIN_MM).clamp(0.0, 1.0),
        storm: current.weather.iter().any(|c| is_storm_condition(c.id)),
    }
}

pub struct OpenWeatherClient {
    client: Client,
    settings: WeatherSettings,
}

impl OpenWeatherClient {
    pub fn new(settings: WeatherSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { client, settings })
    }

    async fn point_severity(&self, point: GeoPoint) -> Result<WeatherSeverity, FetchError> {
        let response = self
            .client
            .get(&self.settings.base_url)
            .query(&[
                ("lat", point.lat.to_string()),
                ("lon", point.lon.to_string()),
                ("appid", self.settings.api_key.clone()),
                ("units", self.settings.units.clone()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::transient(SERVICE_NAME, format!("HTTP {status}")));
        }
        let current: CurrentWeather = response.json().await?;
        Ok(severity_from(&current, &self.settings.units))
    }
}

#[async_trait]
impl WeatherService for OpenWeatherClient {
    /// Worst conditions across every point of the route.
    async fn severity(&self, route: &[GeoPoint]) -> Result<WeatherSeverity, FetchError> {
        let mut worst = WeatherSeverity::default();
        for point in route {
            worst = worst.worst(self.point_severity(*point).await?);
        }
        Ok(worst)
    }
}

/// Stand-in used when no weather API key is configured.
pub struct UnavailableWeather;

#[async_trait]
impl WeatherService for UnavailableWeather {
    async fn severity(&self, _route: &[GeoPoint]) -> Result<WeatherSeverity, FetchError> {
        Err(FetchError::transient(SERVICE_NAME, "no API key configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> CurrentWeather {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_thunderstorm_with_rain() {
        let current = parse(
            r#"{
                "weather": [{ "id": 211, "main": "Thunderstorm" }],
                "wind": { "speed": 12.5, "deg": 200 },
                "rain": { "1h": 30.0 }
            }"#,
        );
        let severity = severity_from(&current, "metric");
        assert!(severity.storm);
        assert_eq!(severity.wind_speed, 12.5);
        assert!((severity.flood_risk - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_clear_sky_missing_sections() {
        let severity = severity_from(&parse(r#"{ "weather": [{ "id": 800 }] }"#), "metric");
        assert_eq!(severity, WeatherSeverity::default());
    }

    #[test]
    fn test_imperial_wind_converted() {
        let severity = severity_from(&parse(r#"{ "wind": { "speed": 50.0 } }"#), "imperial");
        assert!((severity.wind_speed - 22.352).abs() < 1e-6);
    }

    #[test]
    fn test_flood_risk_clamped() {
        let severity = severity_from(&parse(r#"{ "rain": { "1h": 120.0 } }"#), "metric");
        assert_eq!(severity.flood_risk, 1.0);
    }

    #[tokio::test]
    async fn test_unavailable_weather_is_transient() {
        let err = UnavailableWeather.severity(&[]).await.unwrap_err();
        assert!(matches!(err, FetchError::Transient { .. }));
    }
}
