// Change detectors.
//
// Each detector is a pure function of (previous snapshot table, current read)
// that returns the raw changes it saw and the table to keep for next cycle.
// Status, permit and deadline detectors are edge-triggered through values
// stored in the snapshot; the weather detector is level-triggered.

use std::collections::HashSet;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use super::model::{AlertCategory, ChangeKind, RawChange, WeatherMetric};
use crate::core::config::{MonitorConfig, WeatherThresholds};
use crate::core::model::{OrderRecord, PermitRecord, RouteRecord, WeatherSeverity};
use crate::core::state::{Snapshot, SnapshotTable};

const FIELD_STATUS: &str = "status";
const FIELD_ZONE: &str = "zone";
const FIELD_DEADLINE: &str = "deadline";
const FIELD_ATTACHED_AT: &str = "attached_at";

/// Permit statuses that need attention regardless of dates.
const PERMIT_ISSUE_STATUSES: &[&str] = &["expired", "rejected", "cancelled"];

const SECONDS_PER_DAY: i64 = 86_400;

/// Output of one detector run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Detection {
    pub changes: Vec<RawChange>,
    pub snapshot: SnapshotTable,
}

/// Weather observed for one route this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteReading {
    pub route: RouteRecord,
    pub severity: WeatherSeverity,
}

/// What a detector read from its collaborators this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CurrentRead {
    Orders(Vec<OrderRecord>),
    Permits(Vec<PermitRecord>),
    Weather(Vec<RouteReading>),
}

/// Run the detector for `category` against the current read.
///
/// A read of the wrong shape for the category yields no changes and keeps the
/// previous snapshot.
pub fn detect(
    category: AlertCategory,
    previous: Option<&SnapshotTable>,
    current: &CurrentRead,
    config: &MonitorConfig,
    now: DateTime<Utc>,
) -> Detection {
    match (category, current) {
        (AlertCategory::Status, CurrentRead::Orders(orders)) => detect_status_changes(previous, orders, now),
        (AlertCategory::NewOrder, CurrentRead::Orders(orders)) => detect_new_orders(previous, orders, now),
        (AlertCategory::Deadline, CurrentRead::Orders(orders)) => {
            detect_deadlines(previous, orders, config.deadline_warning_hours, now)
        }
        (AlertCategory::PermitExpiry, CurrentRead::Permits(permits)) => detect_permit_expiry(previous, permits, config, now),
        (AlertCategory::Weather, CurrentRead::Weather(readings)) => {
            detect_weather(readings, &config.weather_thresholds, now)
        }
        _ => {
            log::error!("{} detector received a mismatched read", category.display_name());
            Detection {
                changes: Vec::new(),
                snapshot: previous.cloned().unwrap_or_default(),
            }
        }
    }
}

/// Fires when an order's status differs from the last observed value.
/// An order seen for the first time only records its status.
pub fn detect_status_changes(
    previous: Option<&SnapshotTable>,
    orders: &[OrderRecord],
    now: DateTime<Utc>,
) -> Detection {
    let mut detection = Detection::default();

    for order in orders {
        let prior = previous.and_then(|table| table.field(&order.id, FIELD_STATUS));
        if let Some(prior) = prior {
            if prior != order.status {
                detection.changes.push(RawChange::new(
                    order.id.clone(),
                    ChangeKind::StatusChanged {
                        from: prior.to_string(),
                        to: order.status.clone(),
                    },
                    now,
                ));
            }
        }
        detection
            .snapshot
            .insert(Snapshot::new(order.id.clone(), now).with_field(FIELD_STATUS, order.status.clone()));
    }

    detection
}

/// Fires once for every order id not present last cycle.
/// The first cycle (no previous table) only establishes the baseline.
pub fn detect_new_orders(
    previous: Option<&SnapshotTable>,
    orders: &[OrderRecord],
    now: DateTime<Utc>,
) -> Detection {
    let mut detection = Detection::default();
    let mut seen = HashSet::new();

    for order in orders {
        if !seen.insert(order.id.as_str()) {
            continue;
        }
        if let Some(table) = previous {
            if !table.contains(&order.id) {
                detection
                    .changes
                    .push(RawChange::new(order.id.clone(), ChangeKind::NewOrder, now));
            }
        }
        detection.snapshot.insert(Snapshot::new(order.id.clone(), now));
    }

    detection
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PermitZone {
    Valid,
    Expiring,
    Expired,
}

impl PermitZone {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Expiring => "expiring",
            Self::Expired => "expired",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "valid" => Some(Self::Valid),
            "expiring" => Some(Self::Expiring),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// `None` when the expiry falls outside the representable date range.
fn permit_expiry(attached_at: DateTime<Utc>, validity_days: u32) -> Option<DateTime<Utc>> {
    ChronoDuration::try_days(i64::from(validity_days)).and_then(|validity| attached_at.checked_add_signed(validity))
}

/// Whole days until expiry, rounded down (so one hour past expiry is -1).
fn days_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    expiry.signed_duration_since(now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Estimates expiry as attach date + the state's validity window and fires
/// when the permit crosses into "expiring soon" and again into "expired".
/// A permit first seen already past a threshold fires for the worst zone.
/// Independently, a permit whose status turns to expired/rejected/cancelled
/// fires once per status value.
pub fn detect_permit_expiry(
    previous: Option<&SnapshotTable>,
    permits: &[PermitRecord],
    config: &MonitorConfig,
    now: DateTime<Utc>,
) -> Detection {
    let mut detection = Detection::default();
    let warning_days = i64::from(config.permit_warning_days);

    for permit in permits {
        let entity_id = permit.entity_id();
        let mut snapshot = Snapshot::new(entity_id.clone(), now);

        let (zone, days) = match permit.attached_at {
            Some(attached_at) => {
                snapshot = snapshot.with_field(FIELD_ATTACHED_AT, attached_at.to_rfc3339());
                match permit_expiry(attached_at, config.permit_validity.days_for(&permit.state)) {
                    Some(expiry) => {
                        let days = days_until(expiry, now);
                        let zone = if days < 0 {
                            PermitZone::Expired
                        } else if days <= warning_days {
                            PermitZone::Expiring
                        } else {
                            PermitZone::Valid
                        };
                        (zone, days)
                    }
                    None => {
                        log::warn!("Permit {entity_id} attach date {attached_at} is out of range, checking status only");
                        (PermitZone::Valid, 0)
                    }
                }
            }
            None => (PermitZone::Valid, 0),
        };

        let prior_zone = previous
            .and_then(|table| table.field(&entity_id, FIELD_ZONE))
            .and_then(PermitZone::parse)
            .unwrap_or(PermitZone::Valid);

        if zone > prior_zone {
            let kind = match zone {
                PermitZone::Expired => ChangeKind::PermitExpired {
                    state: permit.state.clone(),
                    days_overdue: -days,
                },
                _ => ChangeKind::PermitExpiring {
                    state: permit.state.clone(),
                    days_remaining: days,
                },
            };
            detection.changes.push(RawChange::new(entity_id.clone(), kind, now));
        }
        snapshot = snapshot.with_field(FIELD_ZONE, zone.as_str());

        if let Some(status) = &permit.status {
            let lower = status.to_lowercase();
            let prior_status = previous
                .and_then(|table| table.field(&entity_id, FIELD_STATUS))
                .map(str::to_lowercase);
            if PERMIT_ISSUE_STATUSES.contains(&lower.as_str()) && prior_status.as_deref() != Some(lower.as_str()) {
                detection.changes.push(RawChange::new(
                    entity_id.clone(),
                    ChangeKind::PermitIssue {
                        state: permit.state.clone(),
                        status: status.clone(),
                    },
                    now,
                ));
            }
            snapshot = snapshot.with_field(FIELD_STATUS, status.clone());
        }

        detection.snapshot.insert(snapshot);
    }

    detection
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DeadlineZone {
    Clear,
    Approaching,
    Overdue,
}

impl DeadlineZone {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Approaching => "approaching",
            Self::Overdue => "overdue",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "clear" => Some(Self::Clear),
            "approaching" => Some(Self::Approaching),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }
}

/// Fires when an open order's deadline first comes within the warning window
/// and again once it has passed. Terminal orders never fire.
pub fn detect_deadlines(
    previous: Option<&SnapshotTable>,
    orders: &[OrderRecord],
    warning_hours: u32,
    now: DateTime<Utc>,
) -> Detection {
    let mut detection = Detection::default();
    let warning_secs = i64::from(warning_hours) * 3600;

    for order in orders {
        let mut snapshot = Snapshot::new(order.id.clone(), now);

        let zone = match order.deadline {
            Some(deadline) if !order.is_terminal() => {
                snapshot = snapshot.with_field(FIELD_DEADLINE, deadline.to_rfc3339());
                let remaining = deadline.signed_duration_since(now).num_seconds();
                if remaining < 0 {
                    DeadlineZone::Overdue
                } else if remaining <= warning_secs {
                    DeadlineZone::Approaching
                } else {
                    DeadlineZone::Clear
                }
            }
            _ => DeadlineZone::Clear,
        };

        let prior_zone = previous
            .and_then(|table| table.field(&order.id, FIELD_ZONE))
            .and_then(DeadlineZone::parse)
            .unwrap_or(DeadlineZone::Clear);

        if zone > prior_zone {
            // Clear is never above a prior zone, so the deadline is present here.
            if let Some(deadline) = order.deadline {
                let kind = match zone {
                    DeadlineZone::Overdue => ChangeKind::DeadlineOverdue {
                        deadline,
                        status: order.status.clone(),
                    },
                    _ => ChangeKind::DeadlineApproaching {
                        deadline,
                        hours_remaining: deadline.signed_duration_since(now).num_hours(),
                    },
                };
                detection.changes.push(RawChange::new(order.id.clone(), kind, now));
            }
        }

        detection.snapshot.insert(snapshot.with_field(FIELD_ZONE, zone.as_str()));
    }

    detection
}

/// Metrics of `severity` at or past their thresholds, in a fixed order.
pub fn exceeded_metrics(severity: &WeatherSeverity, thresholds: &WeatherThresholds) -> Vec<WeatherMetric> {
    let mut exceeded = Vec::new();
    if severity.wind_speed >= thresholds.wind_speed {
        exceeded.push(WeatherMetric::WindSpeed);
    }
    if severity.flood_risk >= thresholds.flood_risk {
        exceeded.push(WeatherMetric::FloodRisk);
    }
    if thresholds.storm && severity.storm {
        exceeded.push(WeatherMetric::Storm);
    }
    exceeded
}

/// Fires on every cycle in which an active route's conditions are severe.
pub fn detect_weather(readings: &[RouteReading], thresholds: &WeatherThresholds, now: DateTime<Utc>) -> Detection {
    let mut detection = Detection::default();

    for reading in readings {
        if !reading.route.is_active() {
            continue;
        }
        let severity = reading.severity;
        let exceeded = exceeded_metrics(&severity, thresholds);
        if !exceeded.is_empty() {
            detection.changes.push(RawChange::new(
                reading.route.order_id.clone(),
                ChangeKind::SevereWeather { severity, exceeded },
                now,
            ));
        }
        detection.snapshot.insert(
            Snapshot::new(reading.route.order_id.clone(), now)
                .with_field("wind_speed", format!("{:.1}", severity.wind_speed))
                .with_field("flood_risk", format!("{:.2}", severity.flood_risk))
                .with_field("storm", severity.storm.to_string()),
        );
    }

    detection
}
