// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistent storage.
use portal_core::cbor::{EncodeError, decode_cbor, encode_cbor};
use portal_core::{EntityId, Fields, HashError, IdError, Row, Seq, Timestamp, Version};
use sqlx::migrate::{MigrateDatabase, Migrator};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, QueryBuilder, Sqlite, migrate, query};
use thiserror::Error;
use tracing::trace;

use crate::filter::{Filter, Mutation};
use crate::traits::RecordStore;

/// Create SQLite database if it doesn't already exist.
pub async fn create_database(url: &str) -> Result<(), SqliteError> {
    if !Sqlite::database_exists(url).await? {
        Sqlite::create_database(url).await?
    }
    Ok(())
}

/// Get migrations from folder without running them.
pub fn migrations() -> Migrator {
    migrate!()
}

/// Run any pending database migrations from inside the application.
pub async fn run_pending_migrations(pool: &sqlx::SqlitePool) -> Result<(), SqliteError> {
    migrations().run(pool).await?;
    Ok(())
}

#[derive(Debug)]
pub struct SqliteStoreBuilder {
    url: String,
    max_connections: u32,
    run_migrations: bool,
    create_database: bool,
}

impl Default for SqliteStoreBuilder {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".into(),
            max_connections: 16,
            create_database: true,
            run_migrations: true,
        }
    }
}

impl SqliteStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(any(test, feature = "test_utils"))]
    pub fn random_memory_url(mut self) -> Self {
        // Combining Rust tests with in-memory databases can lead to unsound behaviour, this
        // "workaround" assigns every temporary database a different, random name and keeps them
        // isolated from other tests.
        //
        // See related issue: https://github.com/launchbadge/sqlx/issues/2510
        self.url = format!(
            "sqlite://dbmem{}?mode=memory&cache=private",
            rand::random::<u32>()
        );
        self
    }

    pub fn database_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn create_database(mut self, create_database: bool) -> Self {
        self.create_database = create_database;
        self
    }

    pub fn run_default_migrations(mut self, run_migrations: bool) -> Self {
        self.run_migrations = run_migrations;
        self
    }

    pub async fn build(self) -> Result<SqliteStore, SqliteError> {
        if self.create_database {
            create_database(&self.url).await?;
        }

        let pool: sqlx::SqlitePool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.url)
            .await?;

        if self.run_migrations {
            run_pending_migrations(&pool).await?;
        }

        Ok(SqliteStore::new(pool))
    }
}

/// SQLite database with connection pool.
///
/// This struct can be cloned and used in multiple places in the application, every cloned
/// instance re-uses the same connection pool.
///
/// All rows of all record tables live in one SQLite table. Sequence numbers, entity ids and row
/// ids are stored in their own indexed columns, the row's fields as one CBOR blob. Filters are
/// narrowed down by table and entity ids inside SQL and evaluated on the decoded fields
/// afterwards.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
}

impl SqliteStore {
    pub(crate) fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Shortcut building an in-memory SQLite database with a randomised name for testing purposes.
    #[cfg(any(test, feature = "test_utils"))]
    pub async fn temporary() -> Self {
        SqliteStoreBuilder::new()
            .random_memory_url()
            .max_connections(1)
            .build()
            .await
            .expect("migrations succeeded")
    }

    async fn insert_row<'e, E>(executor: E, row: &Row) -> Result<bool, SqliteError>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        let result = query(
            "
            INSERT OR IGNORE
            INTO
                records_v1 (
                    row_id,
                    table_name,
                    entity_id,
                    seq_time,
                    seq_logical,
                    fields
                )
            VALUES
                (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(row.row_id.to_hex())
        .bind(&row.table)
        .bind(row.entity_id.to_hex())
        .bind(row.seq.timestamp().as_millis() as i64)
        .bind(row.seq.logical() as i64)
        .bind(encode_fields(&row.fields)?)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

impl RecordStore for SqliteStore {
    type Error = SqliteError;

    async fn insert(&self, rows: Vec<Row>) -> Result<usize, Self::Error> {
        let mut tx = self.pool.begin().await?;

        let mut inserted = 0;
        for row in &rows {
            if Self::insert_row(&mut *tx, row).await? {
                inserted += 1;
            }
        }

        tx.commit().await?;
        trace!(inserted, "appended rows");
        Ok(inserted)
    }

    async fn insert_if_head(
        &self,
        row: Row,
        expected: Option<&Version>,
    ) -> Result<bool, Self::Error> {
        // The head checks and the insert run as one statement, SQLite executes it atomically.
        let result = match expected {
            None => {
                query(
                    "
                    INSERT OR IGNORE
                    INTO
                        records_v1 (
                            row_id,
                            table_name,
                            entity_id,
                            seq_time,
                            seq_logical,
                            fields
                        )
                    SELECT
                        ?, ?, ?, ?, ?, ?
                    WHERE NOT EXISTS (
                        SELECT
                            1
                        FROM
                            records_v1
                        WHERE
                            table_name = ?
                            AND entity_id = ?
                    )
                    ",
                )
                .bind(row.row_id.to_hex())
                .bind(&row.table)
                .bind(row.entity_id.to_hex())
                .bind(row.seq.timestamp().as_millis() as i64)
                .bind(row.seq.logical() as i64)
                .bind(encode_fields(&row.fields)?)
                .bind(&row.table)
                .bind(row.entity_id.to_hex())
                .execute(&self.pool)
                .await?
            }
            Some(head) => {
                let head_time = head.seq.timestamp().as_millis() as i64;
                let head_logical = head.seq.logical() as i64;

                query(
                    "
                    INSERT OR IGNORE
                    INTO
                        records_v1 (
                            row_id,
                            table_name,
                            entity_id,
                            seq_time,
                            seq_logical,
                            fields
                        )
                    SELECT
                        ?, ?, ?, ?, ?, ?
                    WHERE EXISTS (
                        SELECT
                            1
                        FROM
                            records_v1
                        WHERE
                            table_name = ?
                            AND entity_id = ?
                            AND row_id = ?
                    )
                    AND NOT EXISTS (
                        SELECT
                            1
                        FROM
                            records_v1
                        WHERE
                            table_name = ?
                            AND entity_id = ?
                            AND (
                                seq_time > ?
                                OR (seq_time = ? AND seq_logical > ?)
                                OR (seq_time = ? AND seq_logical = ? AND row_id > ?)
                            )
                    )
                    ",
                )
                .bind(row.row_id.to_hex())
                .bind(&row.table)
                .bind(row.entity_id.to_hex())
                .bind(row.seq.timestamp().as_millis() as i64)
                .bind(row.seq.logical() as i64)
                .bind(encode_fields(&row.fields)?)
                .bind(&row.table)
                .bind(row.entity_id.to_hex())
                .bind(head.row_id.to_hex())
                .bind(&row.table)
                .bind(row.entity_id.to_hex())
                .bind(head_time)
                .bind(head_time)
                .bind(head_logical)
                .bind(head_time)
                .bind(head_logical)
                .bind(head.row_id.to_hex())
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            trace!(
                entity_id = %row.entity_id,
                "conditional append rejected, head moved"
            );
        }
        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, Self::Error> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "
            SELECT
                row_id,
                table_name,
                entity_id,
                seq_time,
                seq_logical,
                fields
            FROM
                records_v1
            WHERE
                table_name = ",
        );
        builder.push_bind(table);

        if let Some(entity_ids) = filter.entity_ids() {
            if entity_ids.is_empty() {
                return Ok(Vec::new());
            }

            builder.push(" AND entity_id IN (");
            let mut separated = builder.separated(", ");
            for entity_id in entity_ids {
                separated.push_bind(entity_id.to_hex());
            }
            separated.push_unseparated(")");
        }

        builder.push(" ORDER BY entity_id, seq_time, seq_logical, row_id");

        let rows = builder
            .build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let row: Row = row.try_into()?;
            if filter.matches(&row) {
                result.push(row);
            }
        }
        Ok(result)
    }

    async fn bulk_mutate(
        &self,
        table: &str,
        filter: &Filter,
        mutation: Mutation,
    ) -> Result<u64, Self::Error> {
        let rows = self.query(table, filter).await?;
        let mut tx = self.pool.begin().await?;

        let mut touched = 0;
        for mut row in rows {
            let result = match &mutation {
                Mutation::Set(patch) => {
                    row.fields.merge(patch);
                    query(
                        "
                        UPDATE
                            records_v1
                        SET
                            fields = ?
                        WHERE
                            row_id = ?
                        ",
                    )
                    .bind(encode_fields(&row.fields)?)
                    .bind(row.row_id.to_hex())
                    .execute(&mut *tx)
                    .await?
                }
                Mutation::Delete => {
                    query(
                        "
                        DELETE FROM
                            records_v1
                        WHERE
                            row_id = ?
                        ",
                    )
                    .bind(row.row_id.to_hex())
                    .execute(&mut *tx)
                    .await?
                }
            };
            touched += result.rows_affected();
        }

        tx.commit().await?;
        trace!(table, touched, "bulk mutation applied");
        Ok(touched)
    }
}

fn encode_fields(fields: &Fields) -> Result<Vec<u8>, SqliteError> {
    encode_cbor(fields).map_err(|err| SqliteError::Encode("fields".to_string(), err))
}

/// Single row as it is stored in the SQLite database.
#[derive(Debug, FromRow)]
struct RecordRow {
    row_id: String,
    table_name: String,
    entity_id: String,
    seq_time: i64,
    seq_logical: i64,
    fields: Vec<u8>,
}

impl TryFrom<RecordRow> for Row {
    type Error = SqliteError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let entity_id: EntityId = row
            .entity_id
            .parse()
            .map_err(|err: IdError| SqliteError::Decode("entity_id".into(), err.into()))?;
        let row_id = row
            .row_id
            .parse()
            .map_err(|err: HashError| SqliteError::Decode("row_id".into(), err.into()))?;
        let seq = Seq::from_parts(
            Timestamp::new(row.seq_time.max(0) as u64),
            row.seq_logical.clamp(0, u32::MAX as i64) as u32,
        );
        let fields: Fields = decode_cbor(&row.fields[..])
            .map_err(|err| SqliteError::Decode("fields".into(), err.into()))?;

        Ok(Row {
            table: row.table_name,
            entity_id,
            seq,
            row_id,
            fields,
        })
    }
}

#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database and connection error.
    #[error(transparent)]
    Sqlite(#[from] sqlx::Error),

    /// SQL table schema migration error.
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Encoding row fields before storing them into the database failed. This is a critical
    /// error.
    #[error("failed encoding '{0}' value before storing to database: {1}")]
    Encode(String, EncodeError),

    /// Invalid, corrupted data was found in the database. This is a critical error.
    #[error("could not decode corrupted '{0}' value from database: {1}")]
    Decode(String, DecodeError),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    DecodeCbor(#[from] portal_core::cbor::DecodeError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Id(#[from] IdError),
}
