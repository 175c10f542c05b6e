// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::cbor::{EncodeError, encode_cbor};
use crate::fields::{FieldReader, Fields};
use crate::hash::Hash;
use crate::id::EntityId;
use crate::record::Record;
use crate::timestamp::Seq;

/// Total order of rows of one entity.
///
/// Rows are ordered by sequence number first. Equal sequence numbers (two writers racing within
/// the same tick) are ordered by row hash, which is arbitrary but the same for every reader.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub seq: Seq,
    pub row_id: Hash,
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.seq, self.row_id)
    }
}

/// One immutable version of an entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub table: String,
    pub entity_id: EntityId,
    pub seq: Seq,
    pub row_id: Hash,
    pub fields: Fields,
}

impl Row {
    /// Create a new row, deriving its id from the hash over all other values.
    pub fn new(
        table: &str,
        entity_id: EntityId,
        seq: Seq,
        fields: Fields,
    ) -> Result<Self, EncodeError> {
        let bytes = encode_cbor(&(table, &entity_id, &seq, &fields))?;
        Ok(Self {
            table: table.to_string(),
            entity_id,
            seq,
            row_id: Hash::new(bytes),
            fields,
        })
    }

    /// Create a new row from a typed record.
    pub fn from_record<R: Record>(
        entity_id: EntityId,
        seq: Seq,
        record: &R,
    ) -> Result<Self, EncodeError> {
        Self::new(R::TABLE, entity_id, seq, record.to_fields())
    }

    pub fn version(&self) -> Version {
        Version {
            seq: self.seq,
            row_id: self.row_id,
        }
    }

    /// Parse this single row as a record, without resolving against other rows.
    pub fn to_record<R: Record>(&self) -> R {
        R::from_fields(&FieldReader::new(R::TABLE, &self.fields))
    }
}
