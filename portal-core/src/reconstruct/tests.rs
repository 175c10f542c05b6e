// SPDX-License-Identifier: MIT OR Apache-2.0

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha20Rng;

use crate::fields::{FieldReader, Fields};
use crate::id::EntityId;
use crate::record::{Column, Record};
use crate::row::Row;
use crate::timestamp::{Seq, Timestamp};

use super::{reconstruct, reconstruct_all};

#[derive(Clone, Debug, PartialEq)]
struct Ticket {
    status: String,
    labels: Vec<String>,
    counter: i64,
    created_at: Timestamp,
}

impl Record for Ticket {
    const TABLE: &'static str = "tickets";

    const COLUMNS: &'static [Column] = &[
        Column::lww("status"),
        Column::lww("labels"),
        Column::lww("counter"),
        Column::fww("created_at"),
    ];

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with_text("status", &self.status)
            .with_json("labels", &self.labels)
            .with_integer("counter", self.counter)
            .with_timestamp("created_at", self.created_at)
    }

    fn from_fields(fields: &FieldReader<'_>) -> Self {
        Self {
            status: fields.text("status"),
            labels: fields.json("labels"),
            counter: fields.integer("counter"),
            created_at: fields.timestamp("created_at"),
        }
    }
}

fn ticket(status: &str, counter: i64, created_at: u64) -> Ticket {
    Ticket {
        status: status.to_string(),
        labels: vec![status.to_string()],
        counter,
        created_at: Timestamp::new(created_at),
    }
}

fn history(id: EntityId) -> Vec<Row> {
    let seq_1 = Seq::after(None, Timestamp::new(100));
    let seq_2 = Seq::after(Some(seq_1), Timestamp::new(200));
    let seq_3 = Seq::after(Some(seq_2), Timestamp::new(200));
    let seq_4 = Seq::after(Some(seq_3), Timestamp::new(350));

    vec![
        Row::from_record(id, seq_1, &ticket("open", 1, 100)).unwrap(),
        Row::from_record(id, seq_2, &ticket("review", 2, 200)).unwrap(),
        Row::from_record(id, seq_3, &ticket("review", 3, 200)).unwrap(),
        Row::from_record(id, seq_4, &ticket("closed", 4, 350)).unwrap(),
    ]
}

#[test]
fn last_write_wins_and_first_write_wins() {
    let id = EntityId::random();
    let rows = history(id);

    let snapshot = reconstruct::<Ticket>(&id, &rows).unwrap();
    assert_eq!(snapshot.record.status, "closed");
    assert_eq!(snapshot.record.counter, 4);
    assert_eq!(snapshot.record.labels, vec!["closed"]);
    // Creation time never moves after the first row.
    assert_eq!(snapshot.record.created_at, Timestamp::new(100));
    assert_eq!(snapshot.created, rows[0].seq);
    assert_eq!(snapshot.head, rows[3].version());
    assert_eq!(snapshot.revisions, 4);
}

#[test]
fn order_independent() {
    let id = EntityId::random();
    let mut rows = history(id);
    let expected = reconstruct::<Ticket>(&id, &rows).unwrap();

    let mut rng = ChaCha20Rng::seed_from_u64(7);
    for _ in 0..50 {
        rows.shuffle(&mut rng);
        assert_eq!(reconstruct::<Ticket>(&id, &rows).unwrap(), expected);
    }

    rows.reverse();
    assert_eq!(reconstruct::<Ticket>(&id, &rows).unwrap(), expected);
}

#[test]
fn equal_seq_resolved_by_row_hash() {
    let id = EntityId::random();
    let seq_1 = Seq::after(None, Timestamp::new(100));
    // Two writers racing from the same head within the same millisecond.
    let seq_2 = Seq::after(Some(seq_1), Timestamp::new(150));

    let base = Row::from_record(id, seq_1, &ticket("open", 1, 100)).unwrap();
    let writer_a = Row::from_record(id, seq_2, &ticket("review", 2, 100)).unwrap();
    let writer_b = Row::from_record(id, seq_2, &ticket("closed", 2, 100)).unwrap();
    let winner = if writer_a.row_id > writer_b.row_id {
        "review"
    } else {
        "closed"
    };

    let rows_ab = vec![base.clone(), writer_a.clone(), writer_b.clone()];
    let rows_ba = vec![writer_b, base, writer_a];

    let snapshot_ab = reconstruct::<Ticket>(&id, &rows_ab).unwrap();
    let snapshot_ba = reconstruct::<Ticket>(&id, &rows_ba).unwrap();
    assert_eq!(snapshot_ab, snapshot_ba);
    assert_eq!(snapshot_ab.record.status, winner);
}

#[test]
fn columns_resolve_independently() {
    let id = EntityId::random();
    let seq_1 = Seq::after(None, Timestamp::new(100));
    let seq_2 = Seq::after(Some(seq_1), Timestamp::new(200));

    // A later row which does not carry every column only overrides what it carries.
    let full = Row::from_record(id, seq_1, &ticket("open", 1, 100)).unwrap();
    let partial = Row::new("tickets", id, seq_2, Fields::new().with_integer("counter", 9)).unwrap();

    let snapshot = reconstruct::<Ticket>(&id, &[partial, full]).unwrap();
    assert_eq!(snapshot.record.status, "open");
    assert_eq!(snapshot.record.counter, 9);
}

#[test]
fn malformed_sub_field_degrades() {
    let id = EntityId::random();
    let seq = Seq::after(None, Timestamp::new(100));
    let fields = ticket("open", 1, 100)
        .to_fields()
        .with_text("labels", "{not json");

    let row = Row::new("tickets", id, seq, fields).unwrap();
    let snapshot = reconstruct::<Ticket>(&id, &[row]).unwrap();
    assert_eq!(snapshot.record.status, "open");
    assert!(snapshot.record.labels.is_empty());
}

#[test]
fn no_rows_no_snapshot() {
    let id = EntityId::random();
    assert!(reconstruct::<Ticket>(&id, &[]).is_none());

    // Rows of other entities and tables do not count.
    let other = history(EntityId::random());
    assert!(reconstruct::<Ticket>(&id, &other).is_none());

    let foreign_table = Row::new(
        "games",
        id,
        Seq::after(None, Timestamp::new(1)),
        Fields::new(),
    )
    .unwrap();
    assert!(reconstruct::<Ticket>(&id, &[foreign_table]).is_none());
}

#[test]
fn duplicates_collapse() {
    let id = EntityId::random();
    let mut rows = history(id);
    rows.extend(history(id));

    let snapshot = reconstruct::<Ticket>(&id, &rows).unwrap();
    assert_eq!(snapshot.revisions, 4);
}

#[test]
fn group_by_entity() {
    let id_1 = EntityId::random();
    let id_2 = EntityId::random();

    let late = Row::from_record(
        id_2,
        Seq::after(None, Timestamp::new(900)),
        &ticket("open", 1, 900),
    )
    .unwrap();
    let mut rows = vec![late];
    rows.extend(history(id_1));

    let snapshots = reconstruct_all::<Ticket>(&rows);
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].entity_id, id_1);
    assert_eq!(snapshots[1].entity_id, id_2);
}
