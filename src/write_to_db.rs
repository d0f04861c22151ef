//! TimescaleDB sink and the strategies it can use to insert points.
//!
//! Points land in a `points` hypertable:
//!
//! ```sql
//! CREATE TABLE points (
//!     measurement TEXT NOT NULL,
//!     tags        TEXT NOT NULL,
//!     fields      TEXT NOT NULL,
//!     "timestamp" BIGINT NOT NULL
//! );
//! ```
//!
//! Tags and fields are stored as their line protocol fragments.

use std::str::FromStr;

use log::{debug, info, trace};
use postgres::params::{ConnectParams, Host};
use postgres::types::ToSql;
use postgres::{Connection, TlsMode};

use crate::config::Config;
use crate::error::{ConfigError, SinkError};
use crate::point::MetricPoint;
use crate::sink::MetricSink;


/// PostgreSQL caps a statement at 65535 parameters; four per point.
const MAX_POINTS_PER_STATEMENT: usize = 1000;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStrategy {
    /// One multi-row `INSERT` per batch.
    MultiInsert,
    /// One `insert_point` stored procedure call per point.
    Single,
}

impl FromStr for WriteStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "multi" => Ok(WriteStrategy::MultiInsert),
            "single" => Ok(WriteStrategy::Single),
            other => Err(ConfigError::Invalid(format!("unknown write strategy `{}`", other))),
        }
    }
}


/// Owns the database connection for the lifetime of the sink; the
/// connection closes when the sink is dropped.
pub struct TimescaleSink {
    db: Connection,
    strategy: WriteStrategy,
}

impl TimescaleSink {
    pub fn connect(config: &Config) -> Result<Self, SinkError> {
        info!("Connecting to database `{}` at {}:{}...", config.db_name, config.db_host, config.db_port);
        let db_params = ConnectParams::builder()
            .port(config.db_port)
            .database(&config.db_name)
            .user(&config.db_username, Some(config.db_password.as_str()))
            .build(Host::Tcp(config.db_host.clone()));
        let db = Connection::connect(db_params, TlsMode::None)?;
        debug!("Writing with the {:?} strategy.", config.db_strategy);
        Ok(TimescaleSink { db, strategy: config.db_strategy })
    }
}

impl MetricSink for TimescaleSink {
    fn write(&mut self, points: &[MetricPoint]) -> Result<usize, SinkError> {
        let rows = rows(points);
        let mut written = 0;
        match self.strategy {
            WriteStrategy::MultiInsert => {
                for chunk in rows.chunks(MAX_POINTS_PER_STATEMENT) {
                    written += multi_insert(&self.db, chunk)?;
                }
            }
            WriteStrategy::Single => written += single(&self.db, &rows)?,
        }
        Ok(written)
    }
}


/// Column values for one point.
#[derive(Debug, PartialEq)]
struct Row {
    measurement: String,
    tags: String,
    fields: String,
    timestamp: i64,
}

fn rows(points: &[MetricPoint]) -> Vec<Row> {
    points
        .iter()
        .map(|point| Row {
            measurement: point.measurement.clone(),
            tags: point.tag_set(),
            fields: point.field_set(),
            timestamp: point.timestamp.timestamp(),
        })
        .collect()
}

/// Batch-write points using a normal `INSERT` statement.
fn multi_insert(db: &Connection, rows: &[Row]) -> Result<usize, SinkError> {
    if rows.is_empty() {
        return Ok(0);
    }
    let (query, params) = prepare_multi_insert(rows);
    trace!("Query:  {}", query);

    let rows_modified = db.execute(&query, &params)?;
    debug!("Inserted {} point(s).", rows_modified);
    Ok(rows_modified as usize)
}

/// Write points one at a time using the `insert_point` stored procedure.
fn single(db: &Connection, rows: &[Row]) -> Result<usize, SinkError> {
    let mut written = 0;
    for row in rows {
        db.execute(
            "SELECT insert_point($1, $2, $3, $4)",
            &[&row.measurement, &row.tags, &row.fields, &row.timestamp],
        )?;
        written += 1;
    }
    debug!("Inserted {} point(s).", written);
    Ok(written)
}

fn prepare_multi_insert(rows: &[Row]) -> (String, Vec<&dyn ToSql>) {
    let mut tuples: Vec<String> = Vec::with_capacity(rows.len());
    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(rows.len() * 4);
    for (index, row) in rows.iter().enumerate() {
        let base = index * 4;
        tuples.push(format!("(${}, ${}, ${}, ${})", base + 1, base + 2, base + 3, base + 4));

        params.push(&row.measurement);
        params.push(&row.tags);
        params.push(&row.fields);
        params.push(&row.timestamp);
    }
    let query = format!(
        "INSERT INTO points (measurement, tags, fields, \"timestamp\") VALUES {}",
        tuples.join(",")
    );
    (query, params)
}
