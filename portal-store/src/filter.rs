// SPDX-License-Identifier: MIT OR Apache-2.0

use portal_core::{EntityId, FieldValue, Fields, Row};

/// Predicate over single rows of a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    /// Every row.
    All,

    /// Rows of one entity.
    Entity(EntityId),

    /// Rows of any of the given entities.
    Entities(Vec<EntityId>),

    /// Rows where a column holds exactly the given value.
    Equals { column: String, value: FieldValue },

    /// Rows matching all inner filters.
    And(Vec<Filter>),

    /// Rows matching at least one inner filter.
    Or(Vec<Filter>),
}

impl Filter {
    pub fn equals(column: &str, value: impl Into<FieldValue>) -> Self {
        Self::Equals {
            column: column.to_string(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::All => true,
            Filter::Entity(entity_id) => &row.entity_id == entity_id,
            Filter::Entities(entity_ids) => entity_ids.contains(&row.entity_id),
            Filter::Equals { column, value } => row.fields.get(column) == Some(value),
            Filter::And(filters) => filters.iter().all(|filter| filter.matches(row)),
            Filter::Or(filters) => filters.iter().any(|filter| filter.matches(row)),
        }
    }

    /// Entity ids this filter is restricted to, if any.
    ///
    /// Stores use this to narrow down which rows need to be loaded before evaluating the filter
    /// on every candidate.
    pub fn entity_ids(&self) -> Option<Vec<EntityId>> {
        match self {
            Filter::Entity(entity_id) => Some(vec![*entity_id]),
            Filter::Entities(entity_ids) => Some(entity_ids.clone()),
            Filter::And(filters) => filters.iter().find_map(Filter::entity_ids),
            _ => None,
        }
    }
}

/// Administrative change applied by `RecordStore::bulk_mutate`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// Overwrite the given columns in place.
    Set(Fields),

    /// Remove matching rows.
    Delete,
}

#[cfg(test)]
mod tests {
    use portal_core::{EntityId, Fields, Row, Seq, Timestamp};

    use super::Filter;

    fn row(entity_id: EntityId, from: &str, to: &str) -> Row {
        Row::new(
            "invitations",
            entity_id,
            Seq::after(None, Timestamp::new(1)),
            Fields::new().with_text("from_id", from).with_text("to_id", to),
        )
        .unwrap()
    }

    #[test]
    fn match_rows() {
        let id = EntityId::random();
        let row = row(id, "alice", "bob");

        assert!(Filter::All.matches(&row));
        assert!(Filter::Entity(id).matches(&row));
        assert!(!Filter::Entity(EntityId::random()).matches(&row));
        assert!(Filter::equals("from_id", "alice").matches(&row));
        assert!(!Filter::equals("from_id", "bob").matches(&row));
        assert!(!Filter::equals("missing", "alice").matches(&row));

        let pair = Filter::Or(vec![
            Filter::And(vec![
                Filter::equals("from_id", "bob"),
                Filter::equals("to_id", "alice"),
            ]),
            Filter::And(vec![
                Filter::equals("from_id", "alice"),
                Filter::equals("to_id", "bob"),
            ]),
        ]);
        assert!(pair.matches(&row));
    }

    #[test]
    fn narrow_down_entities() {
        let id = EntityId::random();
        assert_eq!(Filter::Entity(id).entity_ids(), Some(vec![id]));
        assert_eq!(
            Filter::And(vec![Filter::equals("to_id", "bob"), Filter::Entity(id)]).entity_ids(),
            Some(vec![id])
        );
        assert_eq!(Filter::equals("to_id", "bob").entity_ids(), None);
        assert_eq!(
            Filter::Or(vec![Filter::Entity(id), Filter::All]).entity_ids(),
            None
        );
    }
}
