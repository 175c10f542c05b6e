// SPDX-License-Identifier: MIT OR Apache-2.0

use std::error::Error;

use portal_core::{Row, Version};

use crate::filter::{Filter, Mutation};

/// Interface of the append-only storage collaborator.
///
/// Stores never edit rows as part of normal state transitions, every new version of an entity is
/// an additional row. Rows are identified by their content hash, appending a row which is already
/// known is a no-op.
pub trait RecordStore {
    type Error: Error;

    /// Append rows.
    ///
    /// Returns the number of rows which were actually inserted, rows already present are skipped.
    /// Rows are appended unconditionally and not atomically with respect to each other.
    fn insert(&self, rows: Vec<Row>) -> impl Future<Output = Result<usize, Self::Error>>;

    /// Append a row if the current head of its entity is still the expected version.
    ///
    /// `None` expects the entity to have no rows at all. Returns `true` when the insert occurred
    /// and `false` when another version was appended since the caller read the entity. Checking
    /// the head and inserting happen atomically.
    fn insert_if_head(
        &self,
        row: Row,
        expected: Option<&Version>,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Query all rows of a table matching the filter.
    ///
    /// Filters match _single rows_, to reconstruct entities the full row history needs to be
    /// loaded afterwards (see `Ledger::load_where`).
    fn query(
        &self,
        table: &str,
        filter: &Filter,
    ) -> impl Future<Output = Result<Vec<Row>, Self::Error>>;

    /// Administrative in-place patch or deletion of all matching rows.
    ///
    /// This is not a state transition and bypasses the append-only history. It gives no
    /// visibility or atomicity guarantees with respect to concurrent appends. Returns the number
    /// of rows touched.
    fn bulk_mutate(
        &self,
        table: &str,
        filter: &Filter,
        mutation: Mutation,
    ) -> impl Future<Output = Result<u64, Self::Error>>;
}
