// Alert factory - turns detected changes into prioritized, dedup-keyed alerts.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use super::model::{Alert, AlertPriority, ChangeKind, RawChange, WeatherMetric};
use crate::core::model::is_terminal_status;

/// Assigns ids and builds alerts from raw changes.
pub struct AlertFactory {
    next_id: AtomicU64,
}

impl Default for AlertFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertFactory {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    pub fn make_alert(&self, change: &RawChange) -> Alert {
        Alert {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            category: change.category(),
            priority: priority_for(&change.kind),
            dedup_key: dedup_key(change),
            entity_id: change.entity_id.clone(),
            message: message_for(change),
            created_at: change.detected_at,
            delivered: false,
        }
    }
}

/// Fixed priority table keyed by what was detected.
pub fn priority_for(kind: &ChangeKind) -> AlertPriority {
    match kind {
        ChangeKind::PermitExpired { .. } | ChangeKind::PermitIssue { .. } | ChangeKind::DeadlineOverdue { .. } => {
            AlertPriority::Critical
        }
        ChangeKind::PermitExpiring { .. } | ChangeKind::SevereWeather { .. } => AlertPriority::High,
        ChangeKind::DeadlineApproaching { .. } => AlertPriority::Medium,
        ChangeKind::StatusChanged { to, .. } => {
            if is_terminal_status(to) {
                AlertPriority::Low
            } else {
                AlertPriority::Medium
            }
        }
        ChangeKind::NewOrder => AlertPriority::Low,
    }
}

/// `category:entity:signature`, e.g. `status:2883:dispatched->delivered`.
pub fn dedup_key(change: &RawChange) -> String {
    format!(
        "{}:{}:{}",
        change.category().key_prefix(),
        change.entity_id,
        change.kind.signature()
    )
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

fn spoken_time(at: DateTime<Utc>) -> String {
    at.format("%B %d at %I:%M %p UTC").to_string()
}

/// Permit entity ids are `order/state`.
fn permit_order_id(entity_id: &str) -> &str {
    entity_id.split_once('/').map_or(entity_id, |(order, _)| order)
}

/// Spoken text for a change.
pub fn message_for(change: &RawChange) -> String {
    let id = change.entity_id.as_str();
    match &change.kind {
        ChangeKind::StatusChanged { from, to } => {
            format!("Heads up! Order {id} status has changed from {from} to {to}.")
        }
        ChangeKind::NewOrder => {
            format!("You have a new order assignment. Order {id} has been assigned to you.")
        }
        ChangeKind::PermitExpiring { state, days_remaining } => {
            let when = if *days_remaining == 0 {
                "today".to_string()
            } else {
                format!("in {}", plural(*days_remaining, "day"))
            };
            format!(
                "Reminder: the permit for {state} on order {} is expiring {when}. Please make sure it is renewed on time.",
                permit_order_id(id)
            )
        }
        ChangeKind::PermitExpired { state, days_overdue } => format!(
            "Alert! The permit for {state} on order {} appears to have expired {} ago. Please verify and renew it.",
            permit_order_id(id),
            plural(*days_overdue, "day")
        ),
        ChangeKind::PermitIssue { state, status } => format!(
            "Alert! The permit for {state} on order {} has status {status}. This needs immediate attention.",
            permit_order_id(id)
        ),
        ChangeKind::DeadlineApproaching { deadline, hours_remaining } => format!(
            "Reminder: order {id} has a delivery deadline in approximately {}, scheduled for {}.",
            plural(*hours_remaining, "hour"),
            spoken_time(*deadline)
        ),
        ChangeKind::DeadlineOverdue { deadline, status } => format!(
            "Alert! Order {id} appears to be overdue. The deadline was {}. Current status: {status}.",
            spoken_time(*deadline)
        ),
        ChangeKind::SevereWeather { severity, exceeded } => {
            let conditions: Vec<String> = exceeded
                .iter()
                .map(|metric| match metric {
                    WeatherMetric::WindSpeed => format!("winds of {:.0} metres per second", severity.wind_speed),
                    WeatherMetric::FloodRisk => format!("a {:.0} percent flood risk", severity.flood_risk * 100.0),
                    WeatherMetric::Storm => "storm conditions".to_string(),
                })
                .collect();
            format!(
                "Weather alert for your route on order {id}: {}. Please exercise caution.",
                conditions.join(" and ")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::AlertCategory;
    use crate::core::model::WeatherSeverity;
    use chrono::TimeZone;

    fn change(entity: &str, kind: ChangeKind) -> RawChange {
        RawChange::new(entity, kind, Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_status_alert() {
        let factory = AlertFactory::new();
        let alert = factory.make_alert(&change(
            "2883",
            ChangeKind::StatusChanged {
                from: "dispatched".to_string(),
                to: "delivered".to_string(),
            },
        ));
        assert_eq!(alert.dedup_key, "status:2883:dispatched->delivered");
        assert_eq!(alert.category, AlertCategory::Status);
        assert_eq!(alert.priority, AlertPriority::Low);
        assert!(!alert.delivered);
        assert!(alert.message.contains("from dispatched to delivered"));
    }

    #[test]
    fn test_priority_table() {
        let deadline = Utc.with_ymd_and_hms(2025, 5, 2, 9, 0, 0).unwrap();
        let cases = [
            (ChangeKind::PermitExpired { state: "TX".into(), days_overdue: 1 }, AlertPriority::Critical),
            (ChangeKind::PermitIssue { state: "TX".into(), status: "rejected".into() }, AlertPriority::Critical),
            (ChangeKind::PermitExpiring { state: "TX".into(), days_remaining: 2 }, AlertPriority::High),
            (ChangeKind::DeadlineOverdue { deadline, status: "dispatched".into() }, AlertPriority::Critical),
            (ChangeKind::DeadlineApproaching { deadline, hours_remaining: 5 }, AlertPriority::Medium),
            (
                ChangeKind::SevereWeather {
                    severity: WeatherSeverity::default(),
                    exceeded: vec![WeatherMetric::Storm],
                },
                AlertPriority::High,
            ),
            (ChangeKind::NewOrder, AlertPriority::Low),
            (ChangeKind::StatusChanged { from: "loading".into(), to: "dispatched".into() }, AlertPriority::Medium),
        ];
        for (kind, expected) in cases {
            assert_eq!(priority_for(&kind), expected, "{kind:?}");
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let factory = AlertFactory::new();
        let a = factory.make_alert(&change("1", ChangeKind::NewOrder));
        let b = factory.make_alert(&change("1", ChangeKind::NewOrder));
        assert_ne!(a.id, b.id);
        assert_eq!(a.dedup_key, b.dedup_key);
    }

    #[test]
    fn test_permit_messages() {
        let expiring = message_for(&change(
            "77/Texas",
            ChangeKind::PermitExpiring { state: "Texas".into(), days_remaining: 1 },
        ));
        assert!(expiring.contains("on order 77 is expiring in 1 day."));

        let expired = message_for(&change(
            "77/Texas",
            ChangeKind::PermitExpired { state: "Texas".into(), days_overdue: 3 },
        ));
        assert!(expired.contains("expired 3 days ago"));
    }

    #[test]
    fn test_weather_message_lists_conditions() {
        let message = message_for(&change(
            "8",
            ChangeKind::SevereWeather {
                severity: WeatherSeverity { wind_speed: 22.4, flood_risk: 0.75, storm: false },
                exceeded: vec![WeatherMetric::WindSpeed, WeatherMetric::FloodRisk],
            },
        ));
        assert_eq!(
            message,
            "Weather alert for your route on order 8: winds of 22 metres per second and a 75 percent flood risk. Please exercise caution."
        );
    }
}
