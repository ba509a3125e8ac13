use std::sync::Arc;

use async_trait::async_trait;

use super::alerts::model::Alert;
use super::alerts::queue::AlertQueue;
use super::error::SummarizerError;

/// Spoken when an explicit update request finds nothing pending.
pub const NO_UPDATES_REPLY: &str = "No new updates right now. Everything looks on track.";

/// Turns a batch of alerts into one utterance.
#[async_trait]
pub trait Summarizer: Send + Sync + 'static {
    async fn summarize(&self, alerts: &[Alert]) -> Result<String, SummarizerError>;
}

/// Fire-and-forget speech sink. Once `speak` returns the batch counts as delivered.
pub trait SpeechOutput: Send + Sync + 'static {
    fn speak(&self, text: &str);
}

/// Plain concatenation of alert messages, in delivery order.
pub fn template_text(alerts: &[Alert]) -> String {
    let intro = if alerts.len() == 1 {
        "I have an update for you.".to_string()
    } else {
        format!("I have {} updates for you.", alerts.len())
    };
    let mut text = intro;
    for alert in alerts {
        text.push(' ');
        text.push_str(&alert.message);
    }
    text
}

/// Summarizer that needs no external service.
pub struct TemplateSummarizer;

#[async_trait]
impl Summarizer for TemplateSummarizer {
    async fn summarize(&self, alerts: &[Alert]) -> Result<String, SummarizerError> {
        if alerts.is_empty() {
            return Err(SummarizerError::Empty);
        }
        Ok(template_text(alerts))
    }
}

/// Writes utterances to stdout.
pub struct ConsoleSpeech;

impl SpeechOutput for ConsoleSpeech {
    fn speak(&self, text: &str) {
        println!("Assistant: {text}");
    }
}

pub struct DeliveryCoordinator {
    queue: Arc<AlertQueue>,
    summarizer: Arc<dyn Summarizer>,
    speech: Arc<dyn SpeechOutput>,
}

impl DeliveryCoordinator {
    pub fn new(queue: Arc<AlertQueue>, summarizer: Arc<dyn Summarizer>, speech: Arc<dyn SpeechOutput>) -> Self {
        Self {
            queue,
            summarizer,
            speech,
        }
    }

    pub fn queue(&self) -> &Arc<AlertQueue> {
        &self.queue
    }

    /// Drain the queue and speak one summary of the whole batch.
    /// Returns `None`, and says nothing, when the queue is empty.
    pub async fn deliver_pending(&self) -> Option<String> {
        let batch = self.queue.drain();
        if batch.is_empty() {
            return None;
        }

        let text = match self.summarizer.summarize(&batch).await {
            Ok(summary) if !summary.trim().is_empty() => summary,
            Ok(_) => {
                log::warn!("Summarizer returned empty text, using template");
                template_text(&batch)
            }
            Err(e) => {
                log::warn!("{e}; using template for {} alert(s)", batch.len());
                template_text(&batch)
            }
        };

        self.speech.speak(&text);
        log::info!("Delivered {} alert(s)", batch.len());
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::engine::AlertFactory;
    use crate::core::alerts::model::{ChangeKind, RawChange};
    use crate::core::testing::{FakeSummarizer, RecordingSpeech};
    use chrono::Utc;
    use std::sync::atomic::Ordering;

    fn queue_with_three() -> Arc<AlertQueue> {
        let queue = Arc::new(AlertQueue::new(50, 24));
        let factory = AlertFactory::new();
        let now = Utc::now();
        let changes = [
            RawChange::new(
                "2883",
                ChangeKind::StatusChanged {
                    from: "dispatched".to_string(),
                    to: "delivered".to_string(),
                },
                now,
            ),
            RawChange::new("2890", ChangeKind::NewOrder, now),
            RawChange::new(
                "2883/Texas",
                ChangeKind::PermitExpired {
                    state: "Texas".to_string(),
                    days_overdue: 1,
                },
                now,
            ),
        ];
        for change in &changes {
            queue.enqueue(factory.make_alert(change));
        }
        queue
    }

    #[tokio::test]
    async fn test_summarizer_failure_falls_back_to_template() {
        let queue = queue_with_three();
        let speech = Arc::new(RecordingSpeech::default());
        let coordinator = DeliveryCoordinator::new(
            Arc::clone(&queue),
            Arc::new(FakeSummarizer::failing()),
            Arc::clone(&speech) as Arc<dyn SpeechOutput>,
        );

        let text = coordinator.deliver_pending().await.unwrap();
        assert!(text.starts_with("I have 3 updates for you."));
        assert!(text.contains("Order 2883 status has changed from dispatched to delivered"));
        assert_eq!(speech.utterances(), vec![text]);

        assert!(!queue.has_pending());
        let history = queue.history();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|entry| entry.alert.delivered));
    }

    #[tokio::test]
    async fn test_batch_summarized_once_in_priority_order() {
        let queue = queue_with_three();
        let speech = Arc::new(RecordingSpeech::default());
        let summarizer = Arc::new(FakeSummarizer::default());
        let coordinator = DeliveryCoordinator::new(
            queue,
            Arc::clone(&summarizer) as Arc<dyn Summarizer>,
            Arc::clone(&speech) as Arc<dyn SpeechOutput>,
        );

        let text = coordinator.deliver_pending().await.unwrap();
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
        assert!(text.starts_with("Alert! The permit for Texas"), "critical alert first: {text}");
        assert_eq!(speech.utterances().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_queue_is_silent() {
        let speech = Arc::new(RecordingSpeech::default());
        let summarizer = Arc::new(FakeSummarizer::default());
        let coordinator = DeliveryCoordinator::new(
            Arc::new(AlertQueue::new(50, 24)),
            Arc::clone(&summarizer) as Arc<dyn Summarizer>,
            Arc::clone(&speech) as Arc<dyn SpeechOutput>,
        );

        assert!(coordinator.deliver_pending().await.is_none());
        assert!(speech.utterances().is_empty());
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_template_summarizer_rejects_empty_batch() {
        assert!(matches!(
            TemplateSummarizer.summarize(&[]).await,
            Err(SummarizerError::Empty)
        ));
    }
}
