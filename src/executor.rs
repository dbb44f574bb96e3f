use crate::dataset::Dataset;
use crate::db::SqlSandbox;
use crate::errors::{AppError, AppResult};
use crate::models::{AdhocQueryResult, QueryLimits};
use crate::policy::{QueryPolicy, ValidatedQuery};
use base64::Engine;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, ErrorCode, InterruptHandle};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::time::{timeout, Duration};

const INTERRUPT_RETRY: Duration = Duration::from_millis(25);

/// Runs validated ad-hoc SQL against the sandbox copy of the dataset with a row
/// cap and a hard deadline.
#[derive(Debug, Clone)]
pub struct AdhocExecutor {
    sandbox: Arc<SqlSandbox>,
    policy: QueryPolicy,
}

impl AdhocExecutor {
    pub fn new(dataset: &Dataset, limits: QueryLimits) -> AppResult<Self> {
        QueryPolicy::validate_limits(&limits)?;
        Ok(Self {
            sandbox: Arc::new(SqlSandbox::materialize(dataset)?),
            policy: QueryPolicy::new(limits),
        })
    }

    pub fn limits(&self) -> &QueryLimits {
        self.policy.limits()
    }

    pub async fn execute(&self, query_text: &str) -> AppResult<AdhocQueryResult> {
        let query = self.policy.validate(query_text).inspect_err(|error| {
            tracing::info!(error = %error, "ad-hoc query rejected");
        })?;
        let limits = *self.policy.limits();
        let sandbox = Arc::clone(&self.sandbox);
        let interrupt = Arc::new(InterruptSlot::default());
        let started = Instant::now();

        let mut task = tokio::task::spawn_blocking({
            let interrupt = Arc::clone(&interrupt);
            move || {
                let conn = sandbox.open_reader()?;
                interrupt.arm(&conn);
                run_capped(&conn, &query, limits.max_rows)
            }
        });
        let outcome = timeout(limits.timeout(), &mut task).await;
        match outcome {
            Ok(Ok(result)) => {
                let mut result = result?;
                result.elapsed_ms = started.elapsed().as_millis() as u64;
                tracing::debug!(
                    rows = result.row_count,
                    truncated = result.truncated,
                    elapsed_ms = result.elapsed_ms,
                    "ad-hoc query finished"
                );
                Ok(result)
            }
            Ok(Err(error)) => Err(AppError::Internal(format!("Query worker failed: {}", error))),
            Err(_) => {
                interrupt.fire();
                // The worker may still be opening its connection or not yet
                // stepping; keep interrupting until it is gone.
                tokio::spawn({
                    let interrupt = Arc::clone(&interrupt);
                    async move {
                        while timeout(INTERRUPT_RETRY, &mut task).await.is_err() {
                            interrupt.fire();
                        }
                    }
                });
                tracing::warn!(timeout_ms = limits.timeout_ms, "ad-hoc query timed out");
                Err(AppError::Timeout(format!(
                    "Query exceeded the {}ms execution limit and was cancelled",
                    limits.timeout_ms
                )))
            }
        }
    }
}

/// Interrupt handle of the worker's connection, published once the worker has
/// opened it.
#[derive(Default)]
struct InterruptSlot(Mutex<Option<InterruptHandle>>);

impl InterruptSlot {
    fn arm(&self, conn: &Connection) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(conn.get_interrupt_handle());
        }
    }

    fn fire(&self) {
        if let Ok(slot) = self.0.lock() {
            if let Some(handle) = slot.as_ref() {
                handle.interrupt();
            }
        }
    }
}

fn run_capped(conn: &Connection, query: &ValidatedQuery, row_cap: usize) -> AppResult<AdhocQueryResult> {
    let mut stmt = conn.prepare(&query.sql).map_err(query_error)?;
    if !stmt.readonly() {
        return Err(AppError::Forbidden("Statement would modify the database".to_string()));
    }
    let columns = stmt
        .column_names()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    let mut rows = stmt.query([]).map_err(query_error)?;
    let mut result_rows = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows.next().map_err(query_error)? {
        if result_rows.len() >= row_cap {
            truncated = true;
            break;
        }
        let mut record = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            let value = row.get::<usize, SqlValue>(index).map_err(query_error)?;
            record.push(json_value_from_sql(value));
        }
        result_rows.push(record);
    }

    Ok(AdhocQueryResult {
        row_count: result_rows.len(),
        rows: result_rows,
        columns,
        truncated,
        row_cap,
        elapsed_ms: 0,
    })
}

fn json_value_from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(value) => Value::from(value),
        SqlValue::Real(value) => serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(value) => Value::String(value),
        SqlValue::Blob(bytes) => Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
    }
}

fn query_error(error: rusqlite::Error) -> AppError {
    match error.sqlite_error_code() {
        Some(ErrorCode::OperationInterrupted) => AppError::Timeout("Query was interrupted".to_string()),
        Some(ErrorCode::ReadOnly) => AppError::Forbidden("Statement would modify the database".to_string()),
        _ => AppError::Query(error.to_string()),
    }
}
