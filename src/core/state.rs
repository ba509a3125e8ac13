use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::alerts::model::AlertCategory;
use super::model::EntityId;

/// Last observed watched fields of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub entity_id: EntityId,
    pub fields: BTreeMap<String, String>,
    pub observed_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(entity_id: impl Into<EntityId>, observed_at: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            fields: BTreeMap::new(),
            observed_at,
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// All snapshots one detector took in a single cycle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SnapshotTable {
    entries: BTreeMap<EntityId, Snapshot>,
}

impl SnapshotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, snapshot: Snapshot) {
        self.entries.insert(snapshot.entity_id.clone(), snapshot);
    }

    pub fn get(&self, entity_id: &str) -> Option<&Snapshot> {
        self.entries.get(entity_id)
    }

    pub fn field(&self, entity_id: &str, name: &str) -> Option<&str> {
        self.get(entity_id).and_then(|s| s.field(name))
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.entries.contains_key(entity_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Snapshot> for SnapshotTable {
    fn from_iter<I: IntoIterator<Item = Snapshot>>(iter: I) -> Self {
        let mut table = Self::new();
        for snapshot in iter {
            table.insert(snapshot);
        }
        table
    }
}

/// Snapshot memory owned by a single detector task.
///
/// `None` until the first successful cycle; afterwards the table is swapped
/// wholesale on every successful cycle and left untouched by failed ones.
#[derive(Debug)]
pub struct SnapshotStore {
    category: AlertCategory,
    table: Option<SnapshotTable>,
}

impl SnapshotStore {
    pub fn new(category: AlertCategory) -> Self {
        Self {
            category,
            table: None,
        }
    }

    pub fn category(&self) -> AlertCategory {
        self.category
    }

    pub fn previous(&self) -> Option<&SnapshotTable> {
        self.table.as_ref()
    }

    pub fn replace(&mut self, table: SnapshotTable) {
        self.table = Some(table);
    }

    pub fn is_primed(&self) -> bool {
        self.table.is_some()
    }
}
