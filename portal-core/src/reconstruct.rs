// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fold the row history of an entity into its current state.
use std::collections::{BTreeMap, BTreeSet};

use crate::fields::{FieldReader, Fields};
use crate::id::EntityId;
use crate::record::{Record, Resolution};
use crate::row::{Row, Version};
use crate::timestamp::Seq;

/// Current state of an entity, as reconstructed from all its rows.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot<R> {
    pub entity_id: EntityId,

    /// Latest version of the entity. Writers pass this on as the expected head when appending
    /// the next version.
    pub head: Version,

    /// Sequence number of the first row, marks the creation of the entity.
    pub created: Seq,

    /// Number of distinct rows the snapshot was folded from.
    pub revisions: usize,

    pub record: R,
}

/// Reconstruct the current state of an entity from its rows.
///
/// Every column declared by the record type is resolved independently: last-write-wins columns
/// take the value of the highest-versioned row carrying that column, first-write-wins columns the
/// value of the lowest-versioned one. Rows of other entities or other tables are ignored, as are
/// duplicates of the same row.
///
/// The result is a pure function of the _set_ of rows. Supplying the same rows in any order
/// yields an identical snapshot. Returns `None` if no row belongs to the entity.
pub fn reconstruct<R: Record>(entity_id: &EntityId, rows: &[Row]) -> Option<Snapshot<R>> {
    let history: BTreeMap<Version, &Row> = rows
        .iter()
        .filter(|row| &row.entity_id == entity_id && row.table == R::TABLE)
        .map(|row| (row.version(), row))
        .collect();

    let (head, _) = history.last_key_value()?;
    let (first, _) = history.first_key_value()?;

    let mut resolved = Fields::new();
    for column in R::COLUMNS {
        let mut carrying = history
            .values()
            .filter_map(|row| row.fields.get(column.name));
        let value = match column.resolution {
            Resolution::LastWriteWins => carrying.next_back(),
            Resolution::FirstWriteWins => carrying.next(),
        };
        if let Some(value) = value {
            resolved.insert(column.name, value.clone());
        }
    }

    Some(Snapshot {
        entity_id: *entity_id,
        head: *head,
        created: first.seq,
        revisions: history.len(),
        record: R::from_fields(&FieldReader::new(R::TABLE, &resolved)),
    })
}

/// Group rows by entity and reconstruct every entity found.
///
/// Snapshots are returned in creation order, ties broken by entity id.
pub fn reconstruct_all<R: Record>(rows: &[Row]) -> Vec<Snapshot<R>> {
    let entity_ids: BTreeSet<EntityId> = rows
        .iter()
        .filter(|row| row.table == R::TABLE)
        .map(|row| row.entity_id)
        .collect();

    let mut snapshots: Vec<Snapshot<R>> = entity_ids
        .iter()
        .filter_map(|entity_id| reconstruct(entity_id, rows))
        .collect();
    snapshots.sort_by(|a, b| {
        a.created
            .cmp(&b.created)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
    snapshots
}

#[cfg(test)]
mod tests;
