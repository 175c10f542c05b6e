// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence of versioned rows on top of append-only storage.
//!
//! The [`RecordStore`] trait describes the storage collaborator the portal relies on. It offers
//! what the underlying storage engines actually provide: appending rows, reading them back with a
//! predicate and an administrative bulk mutation. There is no update-in-place.
//!
//! On top of that the trait requires one extra primitive, a _conditional append_
//! ([`RecordStore::insert_if_head`]). A writer passes the head version it observed when it read
//! the entity, the row is only appended if nobody else appended a newer version in the meantime.
//! This closes the check-then-write race between concurrent, uncoordinated writers without
//! requiring locks or a single authoritative process.
//!
//! [`Ledger`] is a typed handle over one record table which combines reading (reconstruction of
//! snapshots) with writing new versions through conditional appends.
//!
//! ## Store implementations
//!
//! An in-memory store for development and tests is provided by [`MemoryStore`] (`memory` feature
//! flag) and a persistent SQLite store by [`SqliteStore`] (`sqlite` feature flag). Both are
//! enabled by default.
mod filter;
mod ledger;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
mod traits;

pub use filter::{Filter, Mutation};
pub use ledger::{Ledger, LedgerError};
#[cfg(feature = "memory")]
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteError, SqliteStore, SqliteStoreBuilder};
pub use traits::RecordStore;
