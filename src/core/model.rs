use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type EntityId = String;

/// Statuses after which an order no longer needs watching.
pub const TERMINAL_STATUSES: &[&str] = &["delivered", "completed", "closed", "cancelled"];

pub fn is_terminal_status(status: &str) -> bool {
    let lower = status.trim().to_lowercase();
    TERMINAL_STATUSES.iter().any(|s| *s == lower)
}

/// Collections the data source can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityClass {
    Orders,
    Permits,
    Routes,
}

impl EntityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orders => "orders",
            Self::Permits => "permits",
            Self::Routes => "routes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Admin,
    Driver,
    Client,
}

/// The user whose orders are being watched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserScope {
    pub role: UserRole,
    #[serde(default)]
    pub email: Option<String>,
}

/// Admins only see the most recent orders.
pub const ADMIN_ORDER_LIMIT: usize = 20;

/// Restricts a fetch to the records visible to one user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordFilter {
    pub assigned_to: Option<String>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn for_user(scope: &UserScope) -> Self {
        match scope.role {
            UserRole::Admin => Self {
                assigned_to: None,
                limit: Some(ADMIN_ORDER_LIMIT),
            },
            UserRole::Driver | UserRole::Client => Self {
                assigned_to: scope.email.clone(),
                limit: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub id: EntityId,
    pub status: String,
    pub deadline: Option<DateTime<Utc>>,
}

impl OrderRecord {
    pub fn is_terminal(&self) -> bool {
        is_terminal_status(&self.status)
    }
}

/// A state permit attached to an order.
#[derive(Debug, Clone, PartialEq)]
pub struct PermitRecord {
    pub order_id: EntityId,
    pub state: String,
    pub attached_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

impl PermitRecord {
    pub fn entity_id(&self) -> EntityId {
        format!("{}/{}", self.order_id, self.state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteRecord {
    pub order_id: EntityId,
    pub status: String,
    pub points: Vec<GeoPoint>,
}

impl RouteRecord {
    pub fn is_active(&self) -> bool {
        !is_terminal_status(&self.status) && !self.points.is_empty()
    }
}

/// Worst conditions reported along a route.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WeatherSeverity {
    /// Metres per second.
    pub wind_speed: f64,
    /// 0.0 (none) to 1.0 (certain).
    pub flood_risk: f64,
    pub storm: bool,
}

impl WeatherSeverity {
    /// Fold two readings into the worse of each metric.
    pub fn worst(self, other: Self) -> Self {
        Self {
            wind_speed: self.wind_speed.max(other.wind_speed),
            flood_risk: self.flood_risk.max(other.flood_risk),
            storm: self.storm || other.storm,
        }
    }
}
