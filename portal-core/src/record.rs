// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fields::{FieldReader, Fields};

/// Rule deciding which row of an entity's history provides the value of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Value of the row with the highest version.
    LastWriteWins,

    /// Value of the row with the lowest version. Used for values which must never change once
    /// written, like creation timestamps.
    FirstWriteWins,
}

/// Column declaration of a record type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub resolution: Resolution,
}

impl Column {
    pub const fn lww(name: &'static str) -> Self {
        Self {
            name,
            resolution: Resolution::LastWriteWins,
        }
    }

    pub const fn fww(name: &'static str) -> Self {
        Self {
            name,
            resolution: Resolution::FirstWriteWins,
        }
    }
}

/// Typed version record of one entity family.
///
/// Implementors declare the table their rows live in and the resolution rule of every column.
/// Columns which are not declared are ignored during reconstruction.
///
/// Every row written for a record carries _all_ columns, even unchanged ones, as reconstruction
/// resolves every column independently.
pub trait Record: Clone + Sized {
    const TABLE: &'static str;

    const COLUMNS: &'static [Column];

    /// Full set of column values for a new row.
    fn to_fields(&self) -> Fields;

    /// Construct the record from resolved column values.
    ///
    /// Parsing is total: missing or malformed values map onto declared defaults.
    fn from_fields(fields: &FieldReader<'_>) -> Self;
}
