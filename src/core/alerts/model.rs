// Alert model types: categories, priorities, detected changes and alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::model::{EntityId, WeatherSeverity};

/// One category per change detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    /// An order's status value changed
    Status,
    /// An order id appeared that was not there last cycle
    NewOrder,
    /// A state permit is about to expire, has expired, or was rejected
    PermitExpiry,
    /// A delivery deadline is close or has passed
    Deadline,
    /// Severe conditions along an active route
    Weather,
}

impl AlertCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Status => "Order Status",
            Self::NewOrder => "New Order",
            Self::PermitExpiry => "Permit Expiry",
            Self::Deadline => "Deadline",
            Self::Weather => "Weather",
        }
    }

    /// Prefix used in dedup keys.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::NewOrder => "new_order",
            Self::PermitExpiry => "permit",
            Self::Deadline => "deadline",
            Self::Weather => "weather",
        }
    }

    pub fn all() -> &'static [AlertCategory] {
        &[
            Self::Status,
            Self::NewOrder,
            Self::PermitExpiry,
            Self::Deadline,
            Self::Weather,
        ]
    }
}

/// Declared low to high so the derived `Ord` puts `Critical` on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherMetric {
    WindSpeed,
    FloodRisk,
    Storm,
}

impl WeatherMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WindSpeed => "wind",
            Self::FloodRisk => "flood",
            Self::Storm => "storm",
        }
    }
}

/// What a detector observed, before priority and dedup key are assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    StatusChanged { from: String, to: String },
    NewOrder,
    PermitExpiring { state: String, days_remaining: i64 },
    PermitExpired { state: String, days_overdue: i64 },
    PermitIssue { state: String, status: String },
    DeadlineApproaching { deadline: DateTime<Utc>, hours_remaining: i64 },
    DeadlineOverdue { deadline: DateTime<Utc>, status: String },
    SevereWeather { severity: WeatherSeverity, exceeded: Vec<WeatherMetric> },
}

impl ChangeKind {
    pub fn category(&self) -> AlertCategory {
        match self {
            Self::StatusChanged { .. } => AlertCategory::Status,
            Self::NewOrder => AlertCategory::NewOrder,
            Self::PermitExpiring { .. } | Self::PermitExpired { .. } | Self::PermitIssue { .. } => {
                AlertCategory::PermitExpiry
            }
            Self::DeadlineApproaching { .. } | Self::DeadlineOverdue { .. } => AlertCategory::Deadline,
            Self::SevereWeather { .. } => AlertCategory::Weather,
        }
    }

    /// Identifies the change itself, independent of when it was seen.
    pub fn signature(&self) -> String {
        match self {
            Self::StatusChanged { from, to } => format!("{from}->{to}"),
            Self::NewOrder => "new".to_string(),
            Self::PermitExpiring { .. } => "expiring".to_string(),
            Self::PermitExpired { .. } => "expired".to_string(),
            Self::PermitIssue { status, .. } => format!("status:{}", status.to_lowercase()),
            Self::DeadlineApproaching { .. } => "approaching".to_string(),
            Self::DeadlineOverdue { .. } => "overdue".to_string(),
            Self::SevereWeather { exceeded, .. } => exceeded
                .iter()
                .map(WeatherMetric::as_str)
                .collect::<Vec<_>>()
                .join("+"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    pub entity_id: EntityId,
    pub kind: ChangeKind,
    pub detected_at: DateTime<Utc>,
}

impl RawChange {
    pub fn new(entity_id: impl Into<EntityId>, kind: ChangeKind, detected_at: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind,
            detected_at,
        }
    }

    pub fn category(&self) -> AlertCategory {
        self.kind.category()
    }
}

/// A prioritized, deduplicated notification waiting to be spoken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    pub category: AlertCategory,
    pub priority: AlertPriority,
    pub dedup_key: String,
    pub entity_id: EntityId,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
}
