//! Shared fixtures for unit tests

use crate::types::{CodeRegion, FixationEvent};
use rusqlite::{params, Connection};
use std::path::Path;

pub fn fixation(order: i64, line: i64, column: i64, token: &str, duration: f64) -> FixationEvent {
    FixationEvent {
        order_number: order,
        start_time: order * 100_000,
        duration,
        line,
        column,
        token: token.to_string(),
        syntactic_category: "identifier".to_string(),
    }
}

pub fn ws(order: i64, line: i64, column: i64, duration: f64) -> FixationEvent {
    fixation(order, line, column, "WHITESPACE", duration)
}

pub fn region(line: i64, category: &str) -> CodeRegion {
    CodeRegion {
        line,
        category: category.to_string(),
    }
}

/// Create a store with the recorder's two tables
pub fn create_store(path: &Path, fixations: &[FixationEvent], ide_stamps: &[i64]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE fixation (
            fixation_order_number INTEGER,
            fixation_start_event_time INTEGER,
            duration REAL,
            source_file_line INTEGER,
            source_file_col INTEGER,
            token TEXT,
            syntactic_category TEXT,
            x REAL,
            y REAL
        );
        CREATE TABLE ide_context (time_stamp INTEGER, x REAL, y REAL);",
    )
    .unwrap();

    for f in fixations {
        conn.execute(
            "INSERT INTO fixation VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                f.order_number,
                f.start_time,
                f.duration,
                f.line,
                f.column,
                f.token,
                f.syntactic_category,
                f.column as f64 * 8.0,
                f.line as f64 * 16.0,
            ],
        )
        .unwrap();
    }

    for (i, stamp) in ide_stamps.iter().enumerate() {
        conn.execute(
            "INSERT INTO ide_context VALUES (?1, ?2, ?3)",
            params![stamp, i as f64, i as f64 * 2.0],
        )
        .unwrap();
    }
}
