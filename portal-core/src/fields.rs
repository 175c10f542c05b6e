// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loosely typed column values as they are stored, and total parsing into typed records.
use std::collections::BTreeMap;
use std::collections::btree_map::Iter;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::id::{EntityId, UserId};
use crate::timestamp::Timestamp;

/// Single column value of a row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Text(String),
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&UserId> for FieldValue {
    fn from(value: &UserId) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<&EntityId> for FieldValue {
    fn from(value: &EntityId) -> Self {
        Self::Text(value.to_hex())
    }
}

/// Column name to value map of a single row.
///
/// Columns are kept ordered, encoding the same fields always yields the same bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: &str, value: impl Into<FieldValue>) {
        self.0.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.0.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, String, FieldValue> {
        self.0.iter()
    }

    /// Overwrite columns with all values from `patch`.
    pub fn merge(&mut self, patch: &Fields) {
        for (column, value) in patch.iter() {
            self.0.insert(column.clone(), value.clone());
        }
    }

    pub fn with(mut self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn with_text(self, column: &str, value: &str) -> Self {
        self.with(column, value)
    }

    pub fn with_integer(self, column: &str, value: i64) -> Self {
        self.with(column, value)
    }

    pub fn with_bool(self, column: &str, value: bool) -> Self {
        self.with(column, value)
    }

    pub fn with_timestamp(self, column: &str, value: Timestamp) -> Self {
        self.with(column, value.as_millis() as i64)
    }

    pub fn with_optional_timestamp(self, column: &str, value: Option<Timestamp>) -> Self {
        match value {
            Some(value) => self.with_timestamp(column, value),
            None => self.with(column, FieldValue::Null),
        }
    }

    pub fn with_optional_text(self, column: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.with_text(column, value),
            None => self.with(column, FieldValue::Null),
        }
    }

    /// Store a structured value as JSON text.
    pub fn with_json<T: Serialize>(self, column: &str, value: &T) -> Self {
        // Serializing plain data structures into a string does not fail, fall back to "null"
        // which parses into the declared default again.
        let json = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
        self.with(column, json)
    }
}

impl FromIterator<(String, FieldValue)> for Fields {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(BTreeMap::from_iter(iter))
    }
}

/// Total, read-only view on resolved fields used to construct typed records.
///
/// Every accessor returns a declared default when the column is missing or holds a value of an
/// unexpected type. Malformed structured sub-fields degrade to their default instead of failing
/// the whole record.
#[derive(Clone, Copy, Debug)]
pub struct FieldReader<'a> {
    table: &'a str,
    fields: &'a Fields,
}

impl<'a> FieldReader<'a> {
    pub fn new(table: &'a str, fields: &'a Fields) -> Self {
        Self { table, fields }
    }

    pub fn text(&self, column: &str) -> String {
        self.optional_text(column).unwrap_or_default()
    }

    pub fn optional_text(&self, column: &str) -> Option<String> {
        match self.fields.get(column) {
            Some(FieldValue::Text(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn integer(&self, column: &str) -> i64 {
        match self.fields.get(column) {
            Some(FieldValue::Integer(value)) => *value,
            _ => 0,
        }
    }

    pub fn bool(&self, column: &str) -> bool {
        matches!(self.fields.get(column), Some(FieldValue::Bool(true)))
    }

    pub fn timestamp(&self, column: &str) -> Timestamp {
        self.optional_timestamp(column).unwrap_or_default()
    }

    pub fn optional_timestamp(&self, column: &str) -> Option<Timestamp> {
        match self.fields.get(column) {
            Some(FieldValue::Integer(value)) => Some(Timestamp::new((*value).max(0) as u64)),
            _ => None,
        }
    }

    pub fn user(&self, column: &str) -> UserId {
        UserId::new(self.text(column))
    }

    pub fn optional_user(&self, column: &str) -> Option<UserId> {
        self.optional_text(column).map(UserId::new)
    }

    pub fn entity_id(&self, column: &str) -> Option<EntityId> {
        self.optional_text(column)
            .and_then(|value| self.parse_or_warn(column, &value))
    }

    /// Parse a text column with `FromStr`, falling back to the type's default.
    pub fn parse<T: FromStr + Default>(&self, column: &str) -> T {
        self.optional_text(column)
            .and_then(|value| self.parse_or_warn(column, &value))
            .unwrap_or_default()
    }

    /// Parse a JSON text column into a structured value, falling back to the type's default.
    pub fn json<T: DeserializeOwned + Default>(&self, column: &str) -> T {
        let Some(value) = self.optional_text(column) else {
            return T::default();
        };

        match serde_json::from_str::<Option<T>>(&value) {
            Ok(parsed) => parsed.unwrap_or_default(),
            Err(err) => {
                warn!(
                    table = self.table,
                    column, "degrading malformed structured field to default: {err}"
                );
                T::default()
            }
        }
    }

    fn parse_or_warn<T: FromStr>(&self, column: &str, value: &str) -> Option<T> {
        match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!(
                    table = self.table,
                    column, "ignoring unparseable field value '{value}'"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::id::EntityId;
    use crate::timestamp::Timestamp;

    use super::{FieldReader, FieldValue, Fields};

    #[test]
    fn typed_accessors() {
        let id = EntityId::random();
        let fields = Fields::new()
            .with_text("name", "panda")
            .with_integer("count", 3)
            .with_bool("active", true)
            .with_timestamp("created_at", Timestamp::new(42))
            .with("game_id", &id)
            .with_json("moves", &vec!["e4".to_string(), "e5".to_string()]);
        let reader = FieldReader::new("test", &fields);

        assert_eq!(reader.text("name"), "panda");
        assert_eq!(reader.integer("count"), 3);
        assert!(reader.bool("active"));
        assert_eq!(reader.timestamp("created_at"), Timestamp::new(42));
        assert_eq!(reader.entity_id("game_id"), Some(id));
        assert_eq!(reader.json::<Vec<String>>("moves"), vec!["e4", "e5"]);
    }

    #[test]
    fn missing_and_mistyped_columns_use_defaults() {
        let fields = Fields::new()
            .with_integer("name", 7)
            .with_text("count", "seven")
            .with("nothing", FieldValue::Null);
        let reader = FieldReader::new("test", &fields);

        assert_eq!(reader.text("name"), "");
        assert_eq!(reader.integer("count"), 0);
        assert!(!reader.bool("unknown"));
        assert_eq!(reader.optional_timestamp("nothing"), None);
        assert_eq!(reader.entity_id("nothing"), None);
    }

    #[test]
    fn malformed_json_degrades_to_default() {
        let fields = Fields::new()
            .with_text("moves", "[\"e4\", ")
            .with_text("sections", "null");
        let reader = FieldReader::new("test", &fields);

        assert_eq!(reader.json::<Vec<String>>("moves"), Vec::<String>::new());
        assert_eq!(reader.json::<Vec<String>>("sections"), Vec::<String>::new());
    }

    #[test]
    fn merge_overwrites_columns() {
        let mut fields = Fields::new()
            .with_text("white_name", "old")
            .with_integer("white_clock_ms", 10);
        fields.merge(&Fields::new().with_text("white_name", "new"));

        assert_eq!(
            fields.get("white_name"),
            Some(&FieldValue::Text("new".into()))
        );
        assert_eq!(fields.get("white_clock_ms"), Some(&FieldValue::Integer(10)));
    }
}
