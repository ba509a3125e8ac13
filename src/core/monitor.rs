//! The monitor facade: wires collaborators, scheduler, queue and delivery
//! together behind start/stop and the two delivery entry points.

use std::sync::Arc;

use super::alerts::model::Alert;
use super::alerts::queue::{AlertQueue, DeliveredAlert};
use super::config::MonitorConfig;
use super::coordinator::{DeliveryCoordinator, SpeechOutput, Summarizer, NO_UPDATES_REPLY};
use super::error::MonitorError;
use super::source::{DataSource, WeatherService};
use super::watcher::{PollContext, PollScheduler};

pub struct ProactiveMonitor {
    source: Arc<dyn DataSource>,
    weather: Arc<dyn WeatherService>,
    summarizer: Arc<dyn Summarizer>,
    speech: Arc<dyn SpeechOutput>,
    scheduler: Option<PollScheduler>,
    /// Survives `stop` so alerts detected before shutdown can still be spoken.
    delivery: Option<DeliveryCoordinator>,
}

impl ProactiveMonitor {
    pub fn new(
        source: Arc<dyn DataSource>,
        weather: Arc<dyn WeatherService>,
        summarizer: Arc<dyn Summarizer>,
        speech: Arc<dyn SpeechOutput>,
    ) -> Self {
        Self {
            source,
            weather,
            summarizer,
            speech,
            scheduler: None,
            delivery: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Validate `config` and start every enabled detector. Nothing is spawned
    /// if validation fails.
    pub async fn start(&mut self, config: MonitorConfig) -> Result<(), MonitorError> {
        if self.is_running() {
            return Err(MonitorError::AlreadyRunning);
        }
        config.validate()?;

        let config = Arc::new(config);
        let queue = Arc::new(AlertQueue::new(
            config.delivery.history_limit,
            config.delivery.history_max_age_hours,
        ));
        let ctx = PollContext::new(
            Arc::clone(&config),
            Arc::clone(&self.source),
            Arc::clone(&self.weather),
            Arc::clone(&queue),
        );
        log::info!(
            "Starting monitor for {:?} user using {}",
            config.user.role,
            self.source.name()
        );

        let mut scheduler = PollScheduler::new(ctx);
        scheduler.start();
        self.scheduler = Some(scheduler);
        self.delivery = Some(DeliveryCoordinator::new(
            queue,
            Arc::clone(&self.summarizer),
            Arc::clone(&self.speech),
        ));
        Ok(())
    }

    /// Stop polling. Waits for in-flight cycles; pending alerts stay deliverable.
    pub async fn stop(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop().await;
        }
    }

    pub fn has_pending_alerts(&self) -> bool {
        self.delivery
            .as_ref()
            .is_some_and(|delivery| delivery.queue().has_pending())
    }

    /// Undelivered alerts in delivery order.
    pub fn pending_alerts(&self) -> Vec<Alert> {
        self.delivery
            .as_ref()
            .map(|delivery| delivery.queue().peek_all())
            .unwrap_or_default()
    }

    pub fn delivered_history(&self) -> Vec<DeliveredAlert> {
        self.delivery
            .as_ref()
            .map(|delivery| delivery.queue().history())
            .unwrap_or_default()
    }

    /// Explicit "any updates?" request. Always answers, even with nothing pending.
    pub async fn request_update(&self) -> String {
        if let Some(text) = self.deliver_if_pending().await {
            return text;
        }
        self.speech.speak(NO_UPDATES_REPLY);
        NO_UPDATES_REPLY.to_string()
    }

    /// Idle-timer path: deliver if anything is pending, otherwise stay silent.
    pub async fn deliver_if_pending(&self) -> Option<String> {
        match &self.delivery {
            Some(delivery) => delivery.deliver_pending().await,
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::AlertCategory;
    use crate::core::config::PollerConfig;
    use crate::core::model::EntityClass;
    use crate::core::testing::{FakeSource, FakeSummarizer, FakeWeather, RecordingSpeech};
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        monitor: ProactiveMonitor,
        source: Arc<FakeSource>,
        speech: Arc<RecordingSpeech>,
    }

    fn harness() -> Harness {
        let source = Arc::new(FakeSource::new());
        let speech = Arc::new(RecordingSpeech::default());
        let monitor = ProactiveMonitor::new(
            Arc::clone(&source) as Arc<dyn DataSource>,
            Arc::new(FakeWeather::calm()),
            Arc::new(FakeSummarizer::default()),
            Arc::clone(&speech) as Arc<dyn SpeechOutput>,
        );
        Harness { monitor, source, speech }
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_start() {
        let mut h = harness();
        let mut config = MonitorConfig::default();
        config.pollers.insert(
            AlertCategory::Weather,
            PollerConfig {
                interval_secs: 0,
                enabled: true,
            },
        );

        let err = h.monitor.start(config).await.unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
        assert!(!h.monitor.is_running());
        tokio::task::yield_now().await;
        assert_eq!(h.source.fetches(EntityClass::Orders), 0);
    }

    #[tokio::test]
    async fn test_second_start_rejected() {
        let mut h = harness();
        h.monitor.start(MonitorConfig::default()).await.unwrap();
        assert!(matches!(
            h.monitor.start(MonitorConfig::default()).await,
            Err(MonitorError::AlreadyRunning)
        ));
        h.monitor.stop().await;
        assert!(!h.monitor.is_running());
    }

    #[tokio::test]
    async fn test_request_update_always_answers() {
        let h = harness();
        assert!(!h.monitor.has_pending_alerts());
        assert!(h.monitor.deliver_if_pending().await.is_none());
        assert!(h.speech.utterances().is_empty());

        assert_eq!(h.monitor.request_update().await, NO_UPDATES_REPLY);
        assert_eq!(h.speech.utterances(), vec![NO_UPDATES_REPLY.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detected_change_is_spoken_on_request() {
        let mut h = harness();
        h.source.set(EntityClass::Orders, json!([{ "id": 2883, "status": "dispatched" }]));
        h.monitor.start(MonitorConfig::default()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!h.monitor.has_pending_alerts());

        h.source.set(
            EntityClass::Orders,
            json!([
                { "id": 2883, "status": "delivered" },
                { "id": 2901, "status": "open" }
            ]),
        );
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(h.monitor.has_pending_alerts());
        assert_eq!(h.monitor.pending_alerts().len(), 2);

        let text = h.monitor.request_update().await;
        assert!(text.contains("Order 2883 status has changed from dispatched to delivered"));
        assert!(text.contains("Order 2901 has been assigned to you"));
        assert!(!h.monitor.has_pending_alerts());
        assert_eq!(h.monitor.delivered_history().len(), 2);

        h.monitor.stop().await;
        assert!(h.monitor.deliver_if_pending().await.is_none());
    }
}
