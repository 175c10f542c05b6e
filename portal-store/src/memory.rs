// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory persistence for versioned rows.
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use portal_core::{EntityId, Row, Version};
use tracing::trace;

use crate::filter::{Filter, Mutation};
use crate::traits::RecordStore;

type History = BTreeMap<Version, Row>;

/// Rows grouped by table and entity, every history ordered by version.
#[derive(Clone, Debug, Default)]
pub struct InnerMemoryStore {
    tables: HashMap<String, BTreeMap<EntityId, History>>,
}

/// An in-memory store for versioned rows.
///
/// `MemoryStore` supports usage in asynchronous and multi-threaded contexts by wrapping an
/// `InnerMemoryStore` with an `RwLock` and `Arc`. Cloned instances share the same data.
///
/// This does not persist data permanently, all rows are lost when the process ends. Use this
/// only in development or test contexts.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<InnerMemoryStore>>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtain a read-lock on the store.
    pub fn read_store(&self) -> RwLockReadGuard<'_, InnerMemoryStore> {
        self.inner
            .read()
            .expect("acquire shared read access on store")
    }

    /// Obtain a write-lock on the store.
    pub fn write_store(&self) -> RwLockWriteGuard<'_, InnerMemoryStore> {
        self.inner
            .write()
            .expect("acquire exclusive write access on store")
    }
}

impl InnerMemoryStore {
    fn history_mut(&mut self, row: &Row) -> &mut History {
        self.tables
            .entry(row.table.clone())
            .or_default()
            .entry(row.entity_id)
            .or_default()
    }

    fn head(&self, table: &str, entity_id: &EntityId) -> Option<Version> {
        self.tables
            .get(table)?
            .get(entity_id)?
            .last_key_value()
            .map(|(version, _)| *version)
    }
}

impl RecordStore for MemoryStore {
    type Error = Infallible;

    async fn insert(&self, rows: Vec<Row>) -> Result<usize, Self::Error> {
        let mut store = self.write_store();
        let mut inserted = 0;

        for row in rows {
            let history = store.history_mut(&row);
            if history.insert(row.version(), row).is_none() {
                inserted += 1;
            }
        }

        trace!(inserted, "appended rows");
        Ok(inserted)
    }

    async fn insert_if_head(
        &self,
        row: Row,
        expected: Option<&Version>,
    ) -> Result<bool, Self::Error> {
        let mut store = self.write_store();

        let head = store.head(&row.table, &row.entity_id);
        if head.as_ref() != expected {
            trace!(
                entity_id = %row.entity_id,
                "conditional append rejected, head moved"
            );
            return Ok(false);
        }

        let history = store.history_mut(&row);
        Ok(history.insert(row.version(), row).is_none())
    }

    async fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, Self::Error> {
        let store = self.read_store();

        let Some(entities) = store.tables.get(table) else {
            return Ok(Vec::new());
        };

        let rows = match filter.entity_ids() {
            Some(entity_ids) => entity_ids
                .iter()
                .filter_map(|entity_id| entities.get(entity_id))
                .flat_map(|history| history.values())
                .filter(|row| filter.matches(row))
                .cloned()
                .collect(),
            None => entities
                .values()
                .flat_map(|history| history.values())
                .filter(|row| filter.matches(row))
                .cloned()
                .collect(),
        };

        Ok(rows)
    }

    async fn bulk_mutate(
        &self,
        table: &str,
        filter: &Filter,
        mutation: Mutation,
    ) -> Result<u64, Self::Error> {
        let mut store = self.write_store();

        let Some(entities) = store.tables.get_mut(table) else {
            return Ok(0);
        };

        let mut touched = 0;
        match mutation {
            Mutation::Set(patch) => {
                for row in entities
                    .values_mut()
                    .flat_map(|history| history.values_mut())
                    .filter(|row| filter.matches(row))
                {
                    row.fields.merge(&patch);
                    touched += 1;
                }
            }
            Mutation::Delete => {
                for history in entities.values_mut() {
                    let before = history.len();
                    history.retain(|_, row| !filter.matches(row));
                    touched += (before - history.len()) as u64;
                }
                entities.retain(|_, history| !history.is_empty());
            }
        }

        trace!(table, touched, "bulk mutation applied");
        Ok(touched)
    }
}
