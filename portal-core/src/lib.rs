// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data types for modelling mutable entities on top of append-only storage.
//!
//! Storage engines used by the portal only offer two primitives: appending rows and bulk
//! administrative mutation. There is no update-in-place, no row-level locking and no
//! compare-and-swap. Every "mutation" of an entity is therefore a brand-new [`Row`] carrying the
//! entity's id, a [`Seq`] and a full copy of all its columns.
//!
//! Readers fold the complete row history of an entity into one current [`Snapshot`] with
//! [`reconstruct`]. Which row wins is decided column by column, by the resolution rule every
//! [`Record`] type declares for its columns:
//!
//! - [`Resolution::LastWriteWins`]: value of the row with the highest [`Version`].
//! - [`Resolution::FirstWriteWins`]: value of the row with the lowest [`Version`], used for
//!   creation timestamps which must never change.
//!
//! A [`Version`] is the pair of sequence number and row hash. Sequence numbers are hybrid
//! timestamps which move forward with wall time but always increase for a writer who has seen the
//! previous version. Two writers racing on the same entity can still produce equal sequence
//! numbers, the row hash breaks such ties so that reconstruction stays a pure function of the
//! set of rows, independent of the order in which they were read.
//!
//! ```
//! use portal_core::{Column, EntityId, FieldReader, Fields, Record, Row, Seq, Timestamp, reconstruct};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Note {
//!     text: String,
//! }
//!
//! impl Record for Note {
//!     const TABLE: &'static str = "notes";
//!     const COLUMNS: &'static [Column] = &[Column::lww("text")];
//!
//!     fn to_fields(&self) -> Fields {
//!         Fields::new().with_text("text", &self.text)
//!     }
//!
//!     fn from_fields(fields: &FieldReader<'_>) -> Self {
//!         Self { text: fields.text("text") }
//!     }
//! }
//!
//! let id = EntityId::random();
//! let first = Seq::after(None, Timestamp::new(1_000));
//! let second = Seq::after(Some(first), Timestamp::new(1_000));
//!
//! let rows = vec![
//!     Row::new("notes", id, second, Note { text: "bye".into() }.to_fields()).unwrap(),
//!     Row::new("notes", id, first, Note { text: "hi".into() }.to_fields()).unwrap(),
//! ];
//!
//! let snapshot = reconstruct::<Note>(&id, &rows).unwrap();
//! assert_eq!(snapshot.record.text, "bye");
//! assert_eq!(snapshot.created, first);
//! ```
pub mod cbor;
pub mod clock;
pub mod fields;
pub mod hash;
pub mod id;
pub mod reconstruct;
pub mod record;
pub mod row;
mod serde;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
pub mod timestamp;

pub use clock::{Clock, SystemClock};
pub use fields::{FieldReader, FieldValue, Fields};
pub use hash::{Hash, HashError};
pub use id::{EntityId, IdError, UserId};
pub use reconstruct::{Snapshot, reconstruct, reconstruct_all};
pub use record::{Column, Record, Resolution};
pub use row::{Row, Version};
pub use timestamp::{Seq, Timestamp};
