// In-memory collaborators shared by the scheduler, delivery and monitor tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::coordinator::{SpeechOutput, Summarizer};
use super::error::{FetchError, SummarizerError};
use super::model::{EntityClass, GeoPoint, RecordFilter, WeatherSeverity};
use super::source::{apply_filter, DataSource, WeatherService};
use super::alerts::model::Alert;

#[derive(Default)]
pub struct FakeSource {
    docs: Mutex<HashMap<EntityClass, Vec<Value>>>,
    failing: Mutex<HashSet<EntityClass>>,
    fetch_counts: Mutex<HashMap<EntityClass, usize>>,
    delay: Option<Duration>,
    pub started: AtomicUsize,
    pub completed: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set(&self, class: EntityClass, docs: Value) {
        let docs = match docs {
            Value::Array(items) => items,
            other => vec![other],
        };
        self.docs.lock().unwrap().insert(class, docs);
    }

    pub fn fail(&self, class: EntityClass) {
        self.failing.lock().unwrap().insert(class);
    }

    pub fn recover(&self, class: EntityClass) {
        self.failing.lock().unwrap().remove(&class);
    }

    pub fn fetches(&self, class: EntityClass) -> usize {
        self.fetch_counts.lock().unwrap().get(&class).copied().unwrap_or(0)
    }
}

#[async_trait]
impl DataSource for FakeSource {
    fn name(&self) -> &str {
        "fake source"
    }

    async fn fetch(&self, class: EntityClass, filter: &RecordFilter) -> Result<Vec<Value>, FetchError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        *self.fetch_counts.lock().unwrap().entry(class).or_insert(0) += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(&class) {
            return Err(FetchError::transient(self.name(), "connection refused"));
        }
        let docs = self.docs.lock().unwrap().get(&class).cloned().unwrap_or_default();
        Ok(apply_filter(docs, filter))
    }
}

pub struct FakeWeather {
    severity: Mutex<WeatherSeverity>,
}

impl FakeWeather {
    pub fn calm() -> Self {
        Self {
            severity: Mutex::new(WeatherSeverity::default()),
        }
    }

    pub fn stormy() -> Self {
        let weather = Self::calm();
        weather.set(WeatherSeverity {
            wind_speed: 5.0,
            flood_risk: 0.1,
            storm: true,
        });
        weather
    }

    pub fn set(&self, severity: WeatherSeverity) {
        *self.severity.lock().unwrap() = severity;
    }

    pub fn set_calm(&self) {
        self.set(WeatherSeverity::default());
    }
}

#[async_trait]
impl WeatherService for FakeWeather {
    async fn severity(&self, _route: &[GeoPoint]) -> Result<WeatherSeverity, FetchError> {
        Ok(*self.severity.lock().unwrap())
    }
}

/// Joins alert messages, or fails on demand.
#[derive(Default)]
pub struct FakeSummarizer {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeSummarizer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, alerts: &[Alert]) -> Result<String, SummarizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SummarizerError::Failed("model offline".to_string()));
        }
        Ok(alerts
            .iter()
            .map(|a| a.message.as_str())
            .collect::<Vec<_>>()
            .join(" "))
    }
}

#[derive(Default)]
pub struct RecordingSpeech {
    pub spoken: Mutex<Vec<String>>,
}

impl RecordingSpeech {
    pub fn utterances(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl SpeechOutput for RecordingSpeech {
    fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }
}
