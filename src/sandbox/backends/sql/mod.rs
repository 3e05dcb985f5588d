//! SQL on an embedded SQLite database.
//!
//! One connection is opened on first use and shared by every later run, so
//! tables created by one script are visible to the next until [`reset`].
//!
//! [`reset`]: ExecutionBackend::reset

mod statements;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::DatabaseConfig;
use crate::error::{PolyrunError, Result};
use crate::output::{ansi, ExecutionOutput, SqlResult, RETRY_HINT};
use crate::sandbox::slot::RuntimeSlot;
use crate::sandbox::traits::{BackendCapabilities, ExecutionBackend, ExecutionJob};

pub use statements::{is_query, split};

const EMPTY_SCRIPT: &str = "No SQL statements to execute";

/// What one statement produced.
#[derive(Debug)]
enum StatementResult {
    Rows(SqlResult),
    Ack(String),
    Failed(String),
}

pub struct SqlBackend {
    url: String,
    connection: RuntimeSlot<Mutex<SqliteConnection>>,
}

impl SqlBackend {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            connection: RuntimeSlot::new("sqlite"),
        }
    }

    async fn run_statement(conn: &mut SqliteConnection, statement: &str) -> StatementResult {
        let outcome = if is_query(statement) {
            sqlx::query(statement)
                .fetch_all(&mut *conn)
                .await
                .map(|rows| StatementResult::Rows(to_table(&rows)))
        } else {
            sqlx::query(statement)
                .execute(&mut *conn)
                .await
                .map(|done| StatementResult::Ack(acknowledgement(done.rows_affected())))
        };

        outcome.unwrap_or_else(|e| {
            debug!(error = %e, "Statement failed");
            StatementResult::Failed(error_message(&e))
        })
    }
}

fn acknowledgement(rows_affected: u64) -> String {
    if rows_affected > 0 {
        format!("Query OK, {} row(s) affected", rows_affected)
    } else {
        "Query executed successfully".to_string()
    }
}

/// The database's own message, without sqlx's wrapping.
fn error_message(error: &sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db) => db.message().to_string(),
        None => error.to_string(),
    }
}

/// Column names come from the first row; no rows gives an empty table.
fn to_table(rows: &[SqliteRow]) -> SqlResult {
    let Some(first) = rows.first() else {
        return SqlResult::empty_table();
    };

    let columns = first
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();
    let values = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| column_value(row, i)).collect())
        .collect();

    SqlResult::Table { columns, values }
}

fn column_value(row: &SqliteRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    let value = match type_name.as_str() {
        "INTEGER" => row.try_get_unchecked::<i64, _>(index).map(Value::from),
        "REAL" => row
            .try_get_unchecked::<f64, _>(index)
            .map(|f| serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(|bytes| Value::String(format!("<blob {} bytes>", bytes.len()))),
        _ => row.try_get_unchecked::<String, _>(index).map(Value::String),
    };
    value.unwrap_or(Value::Null)
}

/// Fold per-statement results into one output.
fn aggregate(results: Vec<StatementResult>) -> ExecutionOutput {
    let failed = results
        .iter()
        .any(|result| matches!(result, StatementResult::Failed(_)));
    let has_rows = results
        .iter()
        .any(|result| matches!(result, StatementResult::Rows(_)));

    if has_rows {
        let mut acks = Vec::new();
        let mut entries = Vec::new();
        for result in results {
            match result {
                StatementResult::Rows(table) => entries.push(table),
                StatementResult::Failed(error) => entries.push(SqlResult::Failed { error }),
                StatementResult::Ack(message) => acks.push(message),
            }
        }
        return ExecutionOutput::sql(acks.join("\n"), entries, failed);
    }

    let lines: Vec<String> = results
        .into_iter()
        .map(|result| match result {
            StatementResult::Ack(message) => message,
            StatementResult::Failed(error) => ansi::red(&format!("Error: {}", error)),
            StatementResult::Rows(_) => String::new(),
        })
        .collect();

    if failed {
        ExecutionOutput::failure(lines.join("\n"))
    } else {
        ExecutionOutput::console(lines.join("\n"))
    }
}

#[async_trait]
impl ExecutionBackend for SqlBackend {
    fn name(&self) -> &str {
        "sql"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            lazy_runtime: true,
            persistent_state: true,
            networking: false,
            multi_file: false,
        }
    }

    async fn execute(&self, job: &ExecutionJob) -> Result<ExecutionOutput> {
        let statements = split(&job.code);
        if statements.is_empty() {
            return Ok(ExecutionOutput::console(EMPTY_SCRIPT));
        }

        let url = self.url.clone();
        let connection = self
            .connection
            .get_or_try_init(|| async move {
                let conn = SqliteConnection::connect(&url).await?;
                Ok(Mutex::new(conn))
            })
            .await;
        let connection = match connection {
            Ok(connection) => connection,
            Err(e) => {
                warn!(error = %e, "Failed to open database");
                let error = PolyrunError::RuntimeLoad {
                    runtime: "SQL".to_string(),
                    reason: e.to_string(),
                };
                return Ok(ExecutionOutput::infrastructure(&error.to_string(), RETRY_HINT));
            }
        };

        let mut conn = connection.lock().await;
        let mut results = Vec::with_capacity(statements.len());
        for statement in &statements {
            debug!(statement = %statement, "Executing statement");
            results.push(Self::run_statement(&mut conn, statement).await);
        }

        Ok(aggregate(results))
    }

    async fn reset(&self) -> Result<()> {
        self.connection.reset().await;
        Ok(())
    }
}
