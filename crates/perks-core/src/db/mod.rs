//! `SQLite` store utilities.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so readers proceed while a writer holds the lock
//! - `busy_timeout = 5s` bounds how long a mutation waits for the write lock
//! - `foreign_keys = ON`

pub mod migrations;
pub mod query;
pub mod schema;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, types::Type};
use std::{path::Path, time::Duration};

/// Busy timeout used for store connections unless configured otherwise.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the store database, apply runtime pragmas, and migrate the
/// schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening, configuring, or migrating the database fails.
pub fn open_store(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create store directory {}", parent.display()))?;
    }

    let mut conn =
        Connection::open(path).with_context(|| format!("open store database {}", path.display()))?;

    configure_connection(&conn, busy_timeout).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;

    Ok(conn)
}

/// Open a private in-memory store with the latest schema.
///
/// # Errors
///
/// Returns an error if `SQLite` cannot allocate the database or migrations fail.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("open in-memory store")?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;
    Ok(conn)
}

fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

/// Attempt to open an existing store.
///
/// Returns `Ok(None)` when the file is missing, or when it exists but cannot
/// be opened or its metadata row is unreadable.
///
/// # Errors
///
/// Currently infallible; the `Result` leaves room for unexpected I/O failures.
pub fn try_open_store(path: &Path, busy_timeout: Duration) -> Result<Option<Connection>> {
    if !path.exists() {
        return Ok(None);
    }

    match open_store(path, busy_timeout) {
        Ok(conn) => {
            let meta: rusqlite::Result<i64> = conn.query_row(
                "SELECT schema_version FROM store_meta WHERE id = 1",
                [],
                |row| row.get(0),
            );
            if meta.is_ok() {
                Ok(Some(conn))
            } else {
                tracing::warn!(path = %path.display(), "store database corrupt");
                Ok(None)
            }
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to open store database"
            );
            Ok(None)
        }
    }
}

/// Convert a stored millisecond timestamp into an instant.
pub(crate) fn millis_to_datetime(column: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Integer,
            format!("timestamp {millis}ms out of range").into(),
        )
    })
}

/// Parse an optional stored `YYYY-MM-DD` date.
pub(crate) fn parse_date(column: usize, text: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    text.map(|text| {
        NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
        })
    })
    .transpose()
}
