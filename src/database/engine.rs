//! DuckDB staging database
//!
//! One DuckDB file holds the `conf` control tables (watermarks, failures,
//! runs, OAuth tokens) and the `stg` staging tables, one per entity.

use crate::auth::{TokenSet, TokenStore};
use crate::buffer::RecordSink;
use crate::error::{Error, Result};
use crate::ledger::{FailureLedger, FailureRecord, NewFailure, RunLedger, RunRecord};
use crate::mapping::StagingRecord;
use crate::state::{WatermarkKey, WatermarkRecord, WatermarkStore};
use crate::types::{Clock, JsonValue, RunStatus, SystemClock};
use chrono::NaiveDateTime;
use duckdb::{params, Connection, Row};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

const CONTROL_SCHEMA: &str = "
CREATE SCHEMA IF NOT EXISTS conf;
CREATE SCHEMA IF NOT EXISTS stg;

CREATE TABLE IF NOT EXISTS conf.load_control (
    entity VARCHAR NOT NULL,
    physical_table VARCHAR NOT NULL,
    stage VARCHAR NOT NULL,
    last_load_time TIMESTAMP NOT NULL,
    supports_incremental BOOLEAN NOT NULL,
    PRIMARY KEY (entity, physical_table, stage)
);

CREATE SEQUENCE IF NOT EXISTS conf.import_failure_seq START 1;
CREATE TABLE IF NOT EXISTS conf.import_failure (
    failure_id BIGINT DEFAULT nextval('conf.import_failure_seq') PRIMARY KEY,
    entity VARCHAR NOT NULL,
    reference_id VARCHAR NOT NULL,
    error_message VARCHAR NOT NULL,
    run_id BIGINT,
    occurred_at TIMESTAMP NOT NULL,
    resolved BOOLEAN NOT NULL DEFAULT false,
    resolved_at TIMESTAMP
);

CREATE SEQUENCE IF NOT EXISTS conf.etl_run_seq START 1;
CREATE TABLE IF NOT EXISTS conf.etl_run (
    run_id BIGINT DEFAULT nextval('conf.etl_run_seq') PRIMARY KEY,
    table_label VARCHAR NOT NULL,
    action VARCHAR NOT NULL,
    status VARCHAR NOT NULL,
    started_at TIMESTAMP NOT NULL,
    finished_at TIMESTAMP,
    error_message VARCHAR
);

CREATE TABLE IF NOT EXISTS conf.oauth_token (
    id INTEGER PRIMARY KEY,
    access_token VARCHAR NOT NULL,
    refresh_token VARCHAR NOT NULL,
    expires_at BIGINT NOT NULL
);
";

const FAILURE_COLUMNS: &str = "failure_id, entity, reference_id, error_message, run_id, \
                               occurred_at, resolved, resolved_at";

const RUN_COLUMNS: &str =
    "run_id, table_label, action, status, started_at, finished_at, error_message";

/// One stored staging row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedRow {
    /// Upsert conflict key
    pub natural_key: String,
    /// Mapped record
    pub record: JsonValue,
    /// First time the key was written
    pub loaded_at: NaiveDateTime,
    /// Last time the key was written
    pub updated_at: NaiveDateTime,
}

/// Staging database on DuckDB
pub struct StagingDatabase {
    conn: Mutex<Connection>,
    path: String,
    clock: Arc<dyn Clock>,
}

impl StagingDatabase {
    /// Open (or create) the database at `path`; `:memory:` opens an
    /// in-memory database
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| Error::storage(format!("Failed to open DuckDB at {path}: {e}")))?;

        let db = Self {
            conn: Mutex::new(conn),
            path: path.to_string(),
            clock: Arc::new(SystemClock),
        };
        db.init_schema()?;
        info!(path, "Staging database ready");
        Ok(db)
    }

    /// Open an in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Replace the clock used for staging timestamps
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Database path
    pub fn path(&self) -> &str {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::state("database connection lock poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(CONTROL_SCHEMA)?;
        Ok(())
    }

    /// Create the staging table for `table` if it does not exist
    pub fn create_staging_table(&self, table: &str) -> Result<()> {
        let conn = self.conn()?;
        create_staging_table(&conn, table)
    }

    /// Rows of a staging table ordered by natural key
    pub fn staged_rows(&self, table: &str) -> Result<Vec<StagedRow>> {
        let name = staging_table_name(table)?;
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT natural_key, record, loaded_at, updated_at FROM {name} ORDER BY natural_key"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, NaiveDateTime>(2)?,
                    row.get::<_, NaiveDateTime>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(natural_key, record, loaded_at, updated_at)| {
                Ok(StagedRow {
                    natural_key,
                    record: serde_json::from_str(&record)?,
                    loaded_at,
                    updated_at,
                })
            })
            .collect()
    }

    /// Check the database answers queries
    pub fn check(&self) -> Result<()> {
        let one: i32 = self.conn()?.query_row("SELECT 1", [], |row| row.get(0))?;
        if one == 1 {
            Ok(())
        } else {
            Err(Error::storage("DuckDB health check returned an unexpected value"))
        }
    }
}

impl std::fmt::Debug for StagingDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingDatabase")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Whether `name` is safe to splice into SQL as an identifier
fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

fn staging_table_name(table: &str) -> Result<String> {
    if is_identifier(table) {
        Ok(format!("stg.{table}"))
    } else {
        Err(Error::invalid_value(
            "physical_table",
            format!("'{table}' is not a valid table name"),
        ))
    }
}

fn create_staging_table(conn: &Connection, table: &str) -> Result<()> {
    let name = staging_table_name(table)?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {name} (
            natural_key VARCHAR PRIMARY KEY,
            record VARCHAR NOT NULL,
            loaded_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        );"
    ))?;
    Ok(())
}

/// Map a "no rows" error to `None`
fn optional<T>(result: std::result::Result<T, duckdb::Error>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Record sink
// ============================================================================

impl RecordSink for StagingDatabase {
    fn upsert(&self, table: &str, records: &[StagingRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let name = staging_table_name(table)?;
        let now = self.clock.now();

        let mut conn = self.conn()?;
        create_staging_table(&conn, table)?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {name} (natural_key, record, loaded_at, updated_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (natural_key) DO UPDATE SET
                     record = excluded.record,
                     updated_at = excluded.updated_at"
            ))?;
            for record in records {
                let body = serde_json::to_string(&record.fields)?;
                stmt.execute(params![record.natural_key, body, now, now])?;
            }
        }
        tx.commit()?;

        debug!(table, records = records.len(), "Upserted batch");
        Ok(records.len())
    }
}

// ============================================================================
// Watermark store
// ============================================================================

impl WatermarkStore for StagingDatabase {
    fn get(&self, key: &WatermarkKey) -> Result<Option<WatermarkRecord>> {
        let conn = self.conn()?;
        optional(conn.query_row(
            "SELECT last_load_time, supports_incremental FROM conf.load_control
             WHERE entity = ? AND physical_table = ? AND stage = ?",
            params![key.entity, key.physical_table, key.stage],
            |row| {
                Ok(WatermarkRecord::new(
                    key.clone(),
                    row.get(0)?,
                    row.get(1)?,
                ))
            },
        ))
    }

    fn upsert(&self, record: &WatermarkRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO conf.load_control
                 (entity, physical_table, stage, last_load_time, supports_incremental)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (entity, physical_table, stage) DO UPDATE SET
                 last_load_time = excluded.last_load_time,
                 supports_incremental = excluded.supports_incremental",
            params![
                record.key.entity,
                record.key.physical_table,
                record.key.stage,
                record.last_load_time,
                record.supports_incremental
            ],
        )?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<WatermarkRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT entity, physical_table, stage, last_load_time, supports_incremental
             FROM conf.load_control ORDER BY entity, physical_table, stage",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(WatermarkRecord::new(
                    WatermarkKey::new(
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ),
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ============================================================================
// Failure ledger
// ============================================================================

fn failure_from_row(row: &Row<'_>) -> duckdb::Result<FailureRecord> {
    Ok(FailureRecord {
        failure_id: row.get(0)?,
        entity: row.get(1)?,
        reference_id: row.get(2)?,
        error_message: row.get(3)?,
        run_id: row.get(4)?,
        occurred_at: row.get(5)?,
        resolved: row.get(6)?,
        resolved_at: row.get(7)?,
    })
}

impl StagingDatabase {
    fn query_failures(&self, unresolved_only: bool, entity: Option<&str>) -> Result<Vec<FailureRecord>> {
        let mut sql = format!("SELECT {FAILURE_COLUMNS} FROM conf.import_failure WHERE 1 = 1");
        if unresolved_only {
            sql.push_str(" AND resolved = false");
        }
        if entity.is_some() {
            sql.push_str(" AND entity = ?");
        }
        sql.push_str(" ORDER BY failure_id");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = match entity {
            Some(entity) => stmt
                .query_map(params![entity], failure_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], failure_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }
}

impl FailureLedger for StagingDatabase {
    fn record(&self, failure: &NewFailure, at: NaiveDateTime) -> Result<i64> {
        let conn = self.conn()?;
        let failure_id = conn.query_row(
            "INSERT INTO conf.import_failure
                 (entity, reference_id, error_message, run_id, occurred_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING failure_id",
            params![
                failure.entity,
                failure.reference_id,
                failure.error_message,
                failure.run_id,
                at
            ],
            |row| row.get(0),
        )?;
        Ok(failure_id)
    }

    fn unresolved(&self, entity: Option<&str>) -> Result<Vec<FailureRecord>> {
        self.query_failures(true, entity)
    }

    fn all(&self, entity: Option<&str>) -> Result<Vec<FailureRecord>> {
        self.query_failures(false, entity)
    }

    fn mark_resolved(&self, entity: &str, reference_id: &str, at: NaiveDateTime) -> Result<usize> {
        let conn = self.conn()?;
        let flipped = conn.execute(
            "UPDATE conf.import_failure SET resolved = true, resolved_at = ?
             WHERE entity = ? AND reference_id = ? AND resolved = false",
            params![at, entity, reference_id],
        )?;
        Ok(flipped)
    }
}

// ============================================================================
// Run ledger
// ============================================================================

fn run_from_row(row: &Row<'_>) -> duckdb::Result<(RunRecord, String)> {
    let status: String = row.get(3)?;
    Ok((
        RunRecord {
            run_id: row.get(0)?,
            table_label: row.get(1)?,
            action: row.get(2)?,
            status: RunStatus::Started,
            started_at: row.get(4)?,
            finished_at: row.get(5)?,
            error_message: row.get(6)?,
        },
        status,
    ))
}

fn with_status((mut record, status): (RunRecord, String)) -> Result<RunRecord> {
    record.status = status.parse()?;
    Ok(record)
}

impl RunLedger for StagingDatabase {
    fn start(&self, table_label: &str, action: &str, at: NaiveDateTime) -> Result<i64> {
        let conn = self.conn()?;
        let run_id = conn.query_row(
            "INSERT INTO conf.etl_run (table_label, action, status, started_at)
             VALUES (?, ?, ?, ?)
             RETURNING run_id",
            params![table_label, action, RunStatus::Started.as_str(), at],
            |row| row.get(0),
        )?;
        Ok(run_id)
    }

    fn finish(
        &self,
        run_id: i64,
        status: RunStatus,
        at: NaiveDateTime,
        error_message: Option<&str>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(Error::state(format!("run {run_id} cannot finish as {status}")));
        }
        let conn = self.conn()?;
        let current: Option<String> = optional(conn.query_row(
            "SELECT status FROM conf.etl_run WHERE run_id = ?",
            params![run_id],
            |row| row.get(0),
        ))?;
        match current {
            None => return Err(Error::state(format!("unknown run {run_id}"))),
            Some(current) if current.parse::<RunStatus>()?.is_terminal() => {
                return Err(Error::state(format!("run {run_id} already {current}")));
            }
            Some(_) => {}
        }

        conn.execute(
            "UPDATE conf.etl_run SET status = ?, finished_at = ?, error_message = ?
             WHERE run_id = ?",
            params![status.as_str(), at, error_message, run_id],
        )?;
        Ok(())
    }

    fn get(&self, run_id: i64) -> Result<Option<RunRecord>> {
        let conn = self.conn()?;
        optional(conn.query_row(
            &format!("SELECT {RUN_COLUMNS} FROM conf.etl_run WHERE run_id = ?"),
            params![run_id],
            run_from_row,
        ))?
        .map(with_status)
        .transpose()
    }

    fn recent(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM conf.etl_run ORDER BY run_id DESC LIMIT ?"
        ))?;
        let rows = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(with_status).collect()
    }
}

// ============================================================================
// Token store
// ============================================================================

impl TokenStore for StagingDatabase {
    fn load(&self) -> Result<Option<TokenSet>> {
        let conn = self.conn()?;
        optional(conn.query_row(
            "SELECT access_token, refresh_token, expires_at FROM conf.oauth_token WHERE id = 1",
            [],
            |row| {
                Ok(TokenSet::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        ))
    }

    fn save(&self, tokens: &TokenSet) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO conf.oauth_token (id, access_token, refresh_token, expires_at)
             VALUES (1, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                 access_token = excluded.access_token,
                 refresh_token = excluded.refresh_token,
                 expires_at = excluded.expires_at",
            params![tokens.access_token, tokens.refresh_token, tokens.expires_at],
        )?;
        Ok(())
    }
}
