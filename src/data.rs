//! In-memory mock database standing in for a real metrics source.
//!
//! A fresh SQLite database is created for every [`MetricsDatabase::open`],
//! seeded with a fixed set of rows, and discarded when dropped.

use rusqlite::{types::ValueRef, Connection};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_QUERY: &str = "SELECT x, y FROM metrics";

const SQL_SCHEMA: &str = "CREATE TABLE metrics (
    id INTEGER PRIMARY KEY,
    x INTEGER NOT NULL,
    y INTEGER NOT NULL
)";

const SQL_INSERT: &str = "INSERT INTO metrics (x, y) VALUES (?1, ?2)";

/// Rows seeded into `metrics`, as `(x, y)`.
pub const MOCK_ROWS: [(i64, i64); 7] = [(1, 10), (2, 15), (3, 12), (4, 18), (5, 22), (6, 20), (7, 25)];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
}

impl DataPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The seeded rows as points, without going through SQLite.
pub fn mock_points() -> Vec<DataPoint> {
    MOCK_ROWS
        .iter()
        .map(|&(x, y)| DataPoint::new(x as f64, y as f64))
        .collect()
}

pub struct MetricsDatabase {
    conn: Connection,
}

impl MetricsDatabase {
    pub fn open() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.populate_mock_data()?;
        Ok(db)
    }

    fn populate_mock_data(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(SQL_SCHEMA)?;
        let mut stmt = self.conn.prepare(SQL_INSERT)?;
        for (x, y) in MOCK_ROWS {
            stmt.execute(rusqlite::params![x, y])?;
        }
        Ok(())
    }

    /// Runs `sql` and reads the first two columns of each row as `x` and `y`.
    pub fn query_points(&self, sql: &str) -> rusqlite::Result<Vec<DataPoint>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(DataPoint::new(numeric(row, 0)?, numeric(row, 1)?))
        })?;
        rows.collect()
    }
}

fn numeric(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<f64> {
    match row.get_ref(index)? {
        ValueRef::Integer(value) => Ok(value as f64),
        ValueRef::Real(value) => Ok(value),
        other => Err(rusqlite::Error::InvalidColumnType(
            index,
            row.as_ref().column_name(index)?.to_string(),
            other.data_type(),
        )),
    }
}
