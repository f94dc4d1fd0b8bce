//! Raw store reader
//!
//! Reads the `fixation` and `ide_context` tables of a per-session SQLite store.
//! Connections are opened read-only and dropped as soon as the tables are
//! materialized.

use crate::error::GazeError;
use crate::types::{FixationEvent, IdeContextEvent, RawTables, ScreenFixation};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, OpenFlags, Row};
use std::path::{Path, PathBuf};

const FIXATION_QUERY: &str = "SELECT
        fixation_order_number,
        fixation_start_event_time,
        duration,
        source_file_line,
        source_file_col,
        token,
        syntactic_category
    FROM fixation
    ORDER BY fixation_order_number ASC";

const IDE_CONTEXT_QUERY: &str = "SELECT time_stamp, x, y
    FROM ide_context
    ORDER BY time_stamp ASC";

const SCREEN_FIXATION_QUERY: &str = "SELECT x AS start_x, y AS start_y, duration
    FROM fixation
    ORDER BY fixation_order_number ASC";

/// Source of the two raw tables of a session
pub trait RawStoreReader {
    /// Materialize both raw tables
    fn read_tables(&self) -> Result<RawTables, GazeError>;
}

/// A session store backed by a SQLite file
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, GazeError> {
        // SQLite would happily create an empty database for a missing path
        if !self.path.is_file() {
            return Err(GazeError::StoreUnavailable(format!(
                "{}: no such file",
                self.path.display()
            )));
        }

        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| self.unavailable(e))
    }

    fn unavailable(&self, e: rusqlite::Error) -> GazeError {
        GazeError::StoreUnavailable(format!("{}: {}", self.path.display(), e))
    }

    fn read_fixations(&self, conn: &Connection) -> Result<Vec<FixationEvent>, GazeError> {
        let mut stmt = conn.prepare(FIXATION_QUERY).map_err(|e| self.unavailable(e))?;

        let rows = stmt
            .query_map([], |row| {
                let line = optional_i64(row, 3)?;
                let column = optional_i64(row, 4)?;
                let (Some(line), Some(column)) = (line, column) else {
                    return Ok(None);
                };

                Ok(Some(FixationEvent {
                    order_number: required_i64(row, 0)?,
                    start_time: required_i64(row, 1)?,
                    duration: required_f64(row, 2)?,
                    line,
                    column,
                    token: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    syntactic_category: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                }))
            })
            .map_err(|e| self.unavailable(e))?;

        let mut fixations = Vec::new();
        let mut unpositioned = 0usize;
        for row in rows {
            match row.map_err(|e| self.unavailable(e))? {
                Some(fixation) => fixations.push(fixation),
                None => unpositioned += 1,
            }
        }

        if unpositioned > 0 {
            log::debug!(
                "{}: dropped {} fixations without a source position",
                self.path.display(),
                unpositioned
            );
        }

        Ok(fixations)
    }

    fn read_ide_context(&self, conn: &Connection) -> Result<Vec<IdeContextEvent>, GazeError> {
        let mut stmt = conn
            .prepare(IDE_CONTEXT_QUERY)
            .map_err(|e| self.unavailable(e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(IdeContextEvent {
                    timestamp: required_i64(row, 0)?,
                    x: optional_f64(row, 1)?.unwrap_or_default(),
                    y: optional_f64(row, 2)?.unwrap_or_default(),
                })
            })
            .map_err(|e| self.unavailable(e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.unavailable(e))
    }

    /// Read fixations in screen coordinates for gaze-comparison tooling
    pub fn read_screen_fixations(&self) -> Result<Vec<ScreenFixation>, GazeError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(SCREEN_FIXATION_QUERY)
            .map_err(|e| self.unavailable(e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(ScreenFixation {
                    start_x: optional_f64(row, 0)?.unwrap_or_default(),
                    start_y: optional_f64(row, 1)?.unwrap_or_default(),
                    duration: required_f64(row, 2)?,
                })
            })
            .map_err(|e| self.unavailable(e))?;

        let fixations = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.unavailable(e))?;
        Ok(fixations)
    }

    /// Write `question_<id>.tsv` next to the store and return its path
    pub fn export_tsv(&self, question_id: &str) -> Result<PathBuf, GazeError> {
        let fixations = self.read_screen_fixations()?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let out_path = dir.join(format!("question_{question_id}.tsv"));

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(&out_path)?;
        for fixation in &fixations {
            writer.serialize(fixation)?;
        }
        writer.flush()?;

        log::debug!(
            "wrote {} screen fixations to {}",
            fixations.len(),
            out_path.display()
        );
        Ok(out_path)
    }
}

impl RawStoreReader for SqliteStore {
    fn read_tables(&self) -> Result<RawTables, GazeError> {
        let conn = self.connect()?;
        let fixations = self.read_fixations(&conn)?;
        let ide_context = self.read_ide_context(&conn)?;
        drop(conn);

        log::debug!(
            "{}: read {} fixations, {} ide samples",
            self.path.display(),
            fixations.len(),
            ide_context.len()
        );

        Ok(RawTables {
            fixations,
            ide_context,
        })
    }
}

/// In-memory tables, for callers that already hold decoded rows
impl RawStoreReader for RawTables {
    fn read_tables(&self) -> Result<RawTables, GazeError> {
        Ok(self.clone())
    }
}

fn conversion_error(idx: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        ty,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn parse_text_number(idx: usize, bytes: &[u8]) -> rusqlite::Result<f64> {
    let text = std::str::from_utf8(bytes).map_err(rusqlite::Error::Utf8Error)?;
    text.trim()
        .parse::<f64>()
        .map_err(|e| conversion_error(idx, Type::Text, format!("'{text}' is not numeric: {e}")))
}

/// Numeric columns are loosely typed in recorder output (INTEGER, REAL or TEXT)
fn optional_f64(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<f64>> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(v) => Ok(Some(v as f64)),
        ValueRef::Real(v) => Ok(Some(v)),
        ValueRef::Text(bytes) => parse_text_number(idx, bytes).map(Some),
        ValueRef::Blob(_) => Err(conversion_error(
            idx,
            Type::Blob,
            "expected a numeric value".to_string(),
        )),
    }
}

fn optional_i64(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<i64>> {
    match row.get_ref(idx)? {
        ValueRef::Integer(v) => Ok(Some(v)),
        _ => optional_f64(row, idx).map(|v| v.map(|v| v as i64)),
    }
}

fn required_f64(row: &Row<'_>, idx: usize) -> rusqlite::Result<f64> {
    optional_f64(row, idx)?
        .ok_or_else(|| conversion_error(idx, Type::Null, "unexpected NULL".to_string()))
}

fn required_i64(row: &Row<'_>, idx: usize) -> rusqlite::Result<i64> {
    optional_i64(row, idx)?
        .ok_or_else(|| conversion_error(idx, Type::Null, "unexpected NULL".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_store, fixation, ws};
    use tempfile::TempDir;

    #[test]
    fn test_read_tables_orders_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db01.db3");
        // Inserted out of order on purpose
        create_store(
            &path,
            &[fixation(2, 6, 1, "y", 2.0), fixation(0, 5, 1, "x", 1.0), ws(1, 5, 2, 0.5)],
            &[3_000, 1_000, 2_000],
        );

        let tables = SqliteStore::new(&path).read_tables().unwrap();

        let orders: Vec<i64> = tables.fixations.iter().map(|f| f.order_number).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(tables.fixations[1].token, "WHITESPACE");
        let stamps: Vec<i64> = tables.ide_context.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![1_000, 2_000, 3_000]);
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let result = SqliteStore::new(dir.path().join("nope.db3")).read_tables();
        assert!(matches!(result, Err(GazeError::StoreUnavailable(_))));
        // Must not have created the file as a side effect
        assert!(!dir.path().join("nope.db3").exists());
    }

    #[test]
    fn test_missing_table_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db02.db3");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE fixation (fixation_order_number INTEGER);")
            .unwrap();
        drop(conn);

        let result = SqliteStore::new(&path).read_tables();
        assert!(matches!(result, Err(GazeError::StoreUnavailable(_))));
    }

    #[test]
    fn test_corrupt_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db03.db3");
        std::fs::write(&path, b"definitely not sqlite").unwrap();

        let result = SqliteStore::new(&path).read_tables();
        assert!(matches!(result, Err(GazeError::StoreUnavailable(_))));
    }

    #[test]
    fn test_text_timestamps_and_null_positions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db04.db3");
        create_store(&path, &[fixation(0, 3, 4, "a", 0.25)], &[]);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "INSERT INTO ide_context (time_stamp, x, y) VALUES ('1700000000500', 10.0, 20.0);
             INSERT INTO fixation (fixation_order_number, fixation_start_event_time, duration,
                 source_file_line, source_file_col, token, syntactic_category, x, y)
             VALUES (1, 10, 0.1, NULL, NULL, 'b', 'id', 0.0, 0.0);",
        )
        .unwrap();
        drop(conn);

        let tables = SqliteStore::new(&path).read_tables().unwrap();
        assert_eq!(tables.fixations.len(), 1);
        assert_eq!(tables.ide_context[0].timestamp, 1_700_000_000_500);
        assert_eq!(tables.ide_context[0].x, 10.0);
    }

    #[test]
    fn test_export_tsv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db05.db3");
        create_store(
            &path,
            &[fixation(0, 5, 1, "x", 1.0), fixation(1, 6, 1, "y", 2.0)],
            &[1_000],
        );

        let out = SqliteStore::new(&path).export_tsv("05").unwrap();
        assert_eq!(out, dir.path().join("question_05.tsv"));

        let content = std::fs::read_to_string(out).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("start_x\tstart_y\tduration"));
        assert_eq!(lines.count(), 2);
    }
}
