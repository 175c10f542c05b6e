// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use portal_core::cbor::EncodeError;
use portal_core::reconstruct::reconstruct_all;
use portal_core::{
    Clock, EntityId, FieldReader, Record, Resolution, Row, Seq, Snapshot, reconstruct,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::filter::Filter;
use crate::traits::RecordStore;

/// Typed handle on the rows of one record table.
///
/// Reads reconstruct snapshots from the full row history of an entity. Writes never edit: every
/// change appends a complete new version of the record, stamped with a sequence number derived
/// from the observed head and the injected clock.
pub struct Ledger<S, R> {
    store: S,
    clock: Arc<dyn Clock>,
    _marker: PhantomData<R>,
}

impl<S, R> Ledger<S, R>
where
    S: RecordStore,
    R: Record,
{
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            _marker: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reconstruct the current state of an entity, `None` if it has no rows.
    pub async fn load(&self, id: &EntityId) -> Result<Option<Snapshot<R>>, LedgerError<S::Error>> {
        let rows = self
            .store
            .query(R::TABLE, &Filter::Entity(*id))
            .await
            .map_err(LedgerError::Store)?;
        Ok(reconstruct(id, &rows))
    }

    /// Reconstruct every entity with at least one row matching the filter.
    ///
    /// Matching rows only identify the entities, their _complete_ histories are loaded afterwards
    /// so that reconstruction never works on partial data. Callers still need to check the
    /// reconstructed state, an older row might have matched while the current state does not.
    pub async fn load_where(
        &self,
        filter: &Filter,
    ) -> Result<Vec<Snapshot<R>>, LedgerError<S::Error>> {
        let matching = self
            .store
            .query(R::TABLE, filter)
            .await
            .map_err(LedgerError::Store)?;

        let entity_ids: BTreeSet<EntityId> = matching.iter().map(|row| row.entity_id).collect();
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .store
            .query(R::TABLE, &Filter::Entities(entity_ids.into_iter().collect()))
            .await
            .map_err(LedgerError::Store)?;
        Ok(reconstruct_all(&rows))
    }

    /// Reconstruct every entity of the table.
    pub async fn load_all(&self) -> Result<Vec<Snapshot<R>>, LedgerError<S::Error>> {
        let rows = self
            .store
            .query(R::TABLE, &Filter::All)
            .await
            .map_err(LedgerError::Store)?;
        Ok(reconstruct_all(&rows))
    }

    /// All rows of an entity, ordered by version.
    pub async fn history(&self, id: &EntityId) -> Result<Vec<Row>, LedgerError<S::Error>> {
        let mut rows = self
            .store
            .query(R::TABLE, &Filter::Entity(*id))
            .await
            .map_err(LedgerError::Store)?;
        rows.sort_by_key(Row::version);
        rows.dedup_by_key(|row| row.version());
        Ok(rows)
    }

    /// Create a new entity with a freshly minted id.
    pub async fn create(&self, record: &R) -> Result<Snapshot<R>, LedgerError<S::Error>> {
        self.create_with_id(EntityId::random(), record).await
    }

    /// Create a new entity under an id minted by the caller.
    ///
    /// Fails with `LedgerError::Stale` if rows for that id exist already.
    pub async fn create_with_id(
        &self,
        id: EntityId,
        record: &R,
    ) -> Result<Snapshot<R>, LedgerError<S::Error>> {
        let row = Row::from_record(id, Seq::after(None, self.clock.now()), record)?;
        self.append(row, None).await
    }

    /// Create many new entities in one batch.
    ///
    /// Every entity gets its own fresh id. The batch is appended unconditionally.
    pub async fn create_many(
        &self,
        records: &[R],
    ) -> Result<Vec<Snapshot<R>>, LedgerError<S::Error>> {
        let seq = Seq::after(None, self.clock.now());
        let rows = records
            .iter()
            .map(|record| Row::from_record(EntityId::random(), seq, record))
            .collect::<Result<Vec<Row>, EncodeError>>()?;

        let snapshots = rows
            .iter()
            .filter_map(|row| reconstruct(&row.entity_id, std::slice::from_ref(row)))
            .collect();

        self.store
            .insert(rows)
            .await
            .map_err(LedgerError::Store)?;
        Ok(snapshots)
    }

    /// Append the next version of an entity.
    ///
    /// This is the single write path for state transitions: `next` is the full, patched record
    /// derived from the `prior` snapshot. The row is only appended if `prior` is still the latest
    /// version, otherwise another writer got there first and `LedgerError::Stale` is returned.
    /// Nothing is retried.
    pub async fn commit(
        &self,
        prior: &Snapshot<R>,
        next: &R,
    ) -> Result<Snapshot<R>, LedgerError<S::Error>> {
        let seq = Seq::after(Some(prior.head.seq), self.clock.now());
        let row = Row::from_record(prior.entity_id, seq, next)?;
        let mut snapshot = self.append(row, Some(prior)).await?;
        snapshot.created = prior.created;
        snapshot.revisions = prior.revisions + 1;
        snapshot.record = keep_first_writes(&prior.record, next);
        Ok(snapshot)
    }

    /// Load an entity, derive its next version and commit it.
    ///
    /// The closure sees the current snapshot and either returns the patched record or rejects
    /// the transition with its own error.
    pub async fn update<F, X>(&self, id: &EntityId, patch: F) -> Result<Snapshot<R>, X>
    where
        F: FnOnce(&Snapshot<R>) -> Result<R, X>,
        X: From<LedgerError<S::Error>>,
    {
        let prior = self
            .load(id)
            .await?
            .ok_or(LedgerError::NotFound(R::TABLE, *id))?;
        let next = patch(&prior)?;
        Ok(self.commit(&prior, &next).await?)
    }

    async fn append(
        &self,
        row: Row,
        prior: Option<&Snapshot<R>>,
    ) -> Result<Snapshot<R>, LedgerError<S::Error>> {
        let entity_id = row.entity_id;
        let version = row.version();
        let snapshot = Snapshot {
            entity_id,
            head: version,
            created: row.seq,
            revisions: 1,
            record: row.to_record::<R>(),
        };

        let appended = self
            .store
            .insert_if_head(row, prior.map(|prior| &prior.head))
            .await
            .map_err(LedgerError::Store)?;

        if !appended {
            warn!(
                table = R::TABLE,
                %entity_id,
                "concurrent write detected, rejecting stale version"
            );
            return Err(LedgerError::Stale(R::TABLE, entity_id));
        }

        debug!(table = R::TABLE, %entity_id, %version, "appended version");
        Ok(snapshot)
    }
}

/// Resolve `next` against `prior` the way reconstruction would after the append.
fn keep_first_writes<R: Record>(prior: &R, next: &R) -> R {
    let first = prior.to_fields();
    let mut fields = next.to_fields();
    for column in R::COLUMNS
        .iter()
        .filter(|column| column.resolution == Resolution::FirstWriteWins)
    {
        if let Some(value) = first.get(column.name) {
            fields.insert(column.name, value.clone());
        }
    }
    R::from_fields(&FieldReader::new(R::TABLE, &fields))
}

impl<S, R> Clone for Ledger<S, R>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            _marker: PhantomData,
        }
    }
}

impl<S, R> fmt::Debug for Ledger<S, R>
where
    S: fmt::Debug,
    R: Record,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("table", &R::TABLE)
            .field("store", &self.store)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum LedgerError<E>
where
    E: Error,
{
    /// Storage collaborator failed. Surfaced unchanged, nothing is retried.
    #[error(transparent)]
    Store(E),

    /// Encoding a row for hashing failed.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// No rows exist for the entity.
    #[error("no {0} entity with id {1}")]
    NotFound(&'static str, EntityId),

    /// Another version was appended after the writer read the entity.
    #[error("{0} entity {1} was changed concurrently")]
    Stale(&'static str, EntityId),
}
