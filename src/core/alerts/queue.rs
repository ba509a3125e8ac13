// Alert queue - deduplicating, priority-ordered store of undelivered alerts.
//
// Shared between every detector task and the delivery path. All state sits
// behind one mutex so enqueue and drain never interleave.

use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

use super::model::Alert;

/// An alert after it was handed to speech output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveredAlert {
    pub alert: Alert,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Default)]
struct QueueInner {
    /// Undelivered alerts keyed by dedup key
    pending: HashMap<String, Alert>,
    /// Oldest first
    history: VecDeque<DeliveredAlert>,
}

pub struct AlertQueue {
    inner: Mutex<QueueInner>,
    history_limit: usize,
    /// `None` when the configured age does not fit a `TimeDelta`; only the
    /// count bound applies then.
    history_max_age: Option<ChronoDuration>,
}

/// Highest priority first, then oldest, then lowest id.
fn sort_for_delivery(alerts: &mut [Alert]) {
    alerts.sort_by_key(|a| (Reverse(a.priority), a.created_at, a.id));
}

impl AlertQueue {
    pub fn new(history_limit: usize, history_max_age_hours: u64) -> Self {
        let history_max_age = i64::try_from(history_max_age_hours)
            .ok()
            .and_then(ChronoDuration::try_hours);
        Self {
            inner: Mutex::new(QueueInner::default()),
            history_limit,
            history_max_age,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an alert unless one with the same dedup key is still undelivered.
    /// Returns whether the alert was added; the existing alert always wins.
    pub fn enqueue(&self, alert: Alert) -> bool {
        let mut inner = self.lock();
        if inner.pending.contains_key(&alert.dedup_key) {
            log::debug!("Duplicate alert suppressed: {}", alert.dedup_key);
            return false;
        }
        log::info!("Alert queued: [{}] {}", alert.priority.as_str(), alert.dedup_key);
        inner.pending.insert(alert.dedup_key.clone(), alert);
        true
    }

    /// Undelivered alerts in delivery order, without removing them.
    pub fn peek_all(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.lock().pending.values().cloned().collect();
        sort_for_delivery(&mut alerts);
        alerts
    }

    /// Remove every undelivered alert, mark it delivered and record it in the
    /// history log. Returns the batch in delivery order.
    pub fn drain(&self) -> Vec<Alert> {
        self.drain_at(Utc::now())
    }

    fn drain_at(&self, now: DateTime<Utc>) -> Vec<Alert> {
        let mut inner = self.lock();

        let mut batch: Vec<Alert> = std::mem::take(&mut inner.pending).into_values().collect();
        sort_for_delivery(&mut batch);
        for alert in &mut batch {
            alert.delivered = true;
            inner.history.push_back(DeliveredAlert {
                alert: alert.clone(),
                delivered_at: now,
            });
        }

        if let Some(cutoff) = self.history_max_age.and_then(|age| now.checked_sub_signed(age)) {
            while inner
                .history
                .front()
                .is_some_and(|entry| entry.delivered_at < cutoff)
            {
                inner.history.pop_front();
            }
        }
        while inner.history.len() > self.history_limit {
            inner.history.pop_front();
        }

        batch
    }

    pub fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Delivered alerts still retained for audit, oldest first.
    pub fn history(&self) -> Vec<DeliveredAlert> {
        self.lock().history.iter().cloned().collect()
    }
}
