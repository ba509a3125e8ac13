//! Conversion of raw store documents into typed records.
//!
//! Documents come in two shapes: flat (`{"id": 1, "status": ...}`) and the
//! nested layout the order store uses (`{"id": 1, "order": {...}}`). Fields
//! are looked up in the nested object first, then at the top level.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use super::error::MalformedRecord;
use super::model::{EntityClass, GeoPoint, OrderRecord, PermitRecord, RouteRecord};

const STATUS_FIELDS: &[&str] = &["status", "order_status", "orderStatus", "state"];
const DEADLINE_FIELDS: &[&str] = &["delivery_date", "end_date", "estimated_delivery"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y", "%B %d, %Y"];

/// Records that parsed cleanly plus the ones that were skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub records: Vec<T>,
    pub malformed: Vec<MalformedRecord>,
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            malformed: Vec::new(),
        }
    }
}

fn parse_batch<T>(
    class: EntityClass,
    docs: &[Value],
    parse_one: impl Fn(&Value) -> Result<T, String>,
) -> Parsed<T> {
    let mut parsed = Parsed::default();
    for (index, doc) in docs.iter().enumerate() {
        match parse_one(doc) {
            Ok(record) => parsed.records.push(record),
            Err(reason) => parsed.malformed.push(MalformedRecord { class, index, reason }),
        }
    }
    parsed
}

pub fn parse_orders(docs: &[Value]) -> Parsed<OrderRecord> {
    parse_batch(EntityClass::Orders, docs, parse_order)
}

/// Permits come either as flat permit documents or as order documents
/// carrying one `routeData` entry per state crossed. Order documents expand
/// into one record per entry; a bad entry marks that document's index
/// malformed without dropping its other entries.
pub fn parse_permits(docs: &[Value]) -> Parsed<PermitRecord> {
    let mut parsed = Parsed::default();
    for (index, doc) in docs.iter().enumerate() {
        let mut push = |result: Result<PermitRecord, String>| match result {
            Ok(record) => parsed.records.push(record),
            Err(reason) => parsed.malformed.push(MalformedRecord {
                class: EntityClass::Permits,
                index,
                reason,
            }),
        };

        match lookup(doc, "routeData") {
            Some(Value::Array(entries)) => match required_id(doc, "order_id").or_else(|_| required_id(doc, "id")) {
                Ok(order_id) => {
                    for entry in entries {
                        push(permit_fields(order_id.clone(), entry));
                    }
                }
                Err(reason) => push(Err(reason)),
            },
            _ => push(required_id(doc, "order_id").and_then(|order_id| permit_fields(order_id, doc))),
        }
    }
    parsed
}

pub fn parse_routes(docs: &[Value]) -> Parsed<RouteRecord> {
    parse_batch(EntityClass::Routes, docs, parse_route)
}

fn parse_order(doc: &Value) -> Result<OrderRecord, String> {
    let id = required_id(doc, "id")?;
    let deadline = DEADLINE_FIELDS
        .iter()
        .find_map(|field| lookup(doc, field).and_then(parse_date));

    Ok(OrderRecord {
        id,
        status: extract_status(doc),
        deadline,
    })
}

fn permit_fields(order_id: String, doc: &Value) -> Result<PermitRecord, String> {
    if !doc.is_object() {
        return Err("permit entry is not an object".to_string());
    }
    let state = lookup(doc, "state")
        .or_else(|| lookup(doc, "product_name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "missing permit state".to_string())?
        .to_string();

    let attached_at = match lookup(doc, "attached_at") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(parse_date(raw).ok_or_else(|| format!("unparseable attached_at: {raw}"))?),
    };

    let status = lookup(doc, "permit_status")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(PermitRecord {
        order_id,
        state,
        attached_at,
        status,
    })
}

fn parse_route(doc: &Value) -> Result<RouteRecord, String> {
    let order_id = required_id(doc, "order_id")?;
    let raw_points = lookup(doc, "points")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing route points".to_string())?;

    let mut points = Vec::with_capacity(raw_points.len());
    for raw in raw_points {
        let lat = raw.get("lat").and_then(Value::as_f64);
        let lon = raw.get("lon").and_then(Value::as_f64);
        match (lat, lon) {
            (Some(lat), Some(lon)) if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) => {
                points.push(GeoPoint { lat, lon });
            }
            _ => return Err(format!("invalid route point: {raw}")),
        }
    }

    Ok(RouteRecord {
        order_id,
        status: extract_status(doc),
        points,
    })
}

/// Look a field up in the nested `order` object, then at the top level.
fn lookup<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    doc.get("order")
        .and_then(|order| order.get(field))
        .or_else(|| doc.get(field))
}

fn required_id(doc: &Value, field: &str) -> Result<String, String> {
    if !doc.is_object() {
        return Err("record is not an object".to_string());
    }
    match lookup(doc, field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(format!("missing {field}")),
    }
}

/// First non-empty status string, or `unknown`.
pub fn extract_status(doc: &Value) -> String {
    STATUS_FIELDS
        .iter()
        .find_map(|field| {
            doc.get("order")
                .and_then(|order| order.get(*field))
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
        })
        .or_else(|| {
            STATUS_FIELDS.iter().find_map(|field| {
                doc.get(*field)
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
            })
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parse a date from a string in any supported format, or from unix seconds.
/// Naive values are taken as UTC.
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s.trim()),
        Value::Number(n) => n.as_i64().and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}

pub fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}
