use crate::dataset::{parse_period_end, parse_period_type, Dataset};
use crate::errors::{AppError, AppResult};
use crate::models::{Company, FinancialFact};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const COMPANY_COLUMNS: &[&str] = &["id", "ticker", "name"];
const FACT_COLUMNS: &[&str] = &[
    "id",
    "company_id",
    "period_type",
    "period_end",
    "metric_name",
    "value",
    "unit",
];

struct RawFactRow {
    id: i64,
    company_id: i64,
    period_type: String,
    period_end: String,
    metric_name: String,
    value: Value,
    unit: Option<String>,
}

/// Reads both tables out of an SQLite dataset file. The file is opened read-only
/// and every failure, including "not a database", is reported as a load error.
pub fn read_source(path: &Path) -> AppResult<(Vec<Company>, Vec<FinancialFact>)> {
    if !path.is_file() {
        return Err(AppError::Load(format!("Dataset file '{}' does not exist", path.display())));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(load_error)?;

    let company_columns = table_columns(&conn, "Company")?;
    require_columns("Company", &company_columns, COMPANY_COLUMNS)?;
    let fact_columns = table_columns(&conn, "FinancialFact")?;
    require_columns("FinancialFact", &fact_columns, FACT_COLUMNS)?;

    let sector_expr = if company_columns.contains("sector") { "sector" } else { "NULL" };
    let mut stmt = conn
        .prepare(&format!("SELECT id, ticker, name, {} FROM Company", sector_expr))
        .map_err(load_error)?;
    let companies = stmt
        .query_map([], |row| {
            Ok(Company {
                id: row.get(0)?,
                ticker: row.get(1)?,
                name: row.get(2)?,
                sector: row.get(3)?,
            })
        })
        .map_err(load_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(load_error)?;

    let mut stmt = conn
        .prepare(
            "SELECT id, company_id, period_type, period_end, metric_name, value, unit
             FROM FinancialFact",
        )
        .map_err(load_error)?;
    let raw_facts = stmt
        .query_map([], |row| {
            Ok(RawFactRow {
                id: row.get(0)?,
                company_id: row.get(1)?,
                period_type: row.get(2)?,
                period_end: row.get(3)?,
                metric_name: row.get(4)?,
                value: row.get(5)?,
                unit: row.get(6)?,
            })
        })
        .map_err(load_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(load_error)?;

    let facts = raw_facts
        .into_iter()
        .map(parse_fact_row)
        .collect::<AppResult<Vec<_>>>()?;

    Ok((companies, facts))
}

fn parse_fact_row(raw: RawFactRow) -> AppResult<FinancialFact> {
    let value = match raw.value {
        Value::Real(value) => value,
        Value::Integer(value) => value as f64,
        Value::Null => {
            return Err(AppError::Load(format!("Fact {} has no value", raw.id)));
        }
        Value::Text(text) => text.trim().parse::<f64>().map_err(|_| {
            AppError::Load(format!("Fact {} has non-numeric value '{}'", raw.id, text))
        })?,
        Value::Blob(_) => {
            return Err(AppError::Load(format!("Fact {} has a binary value", raw.id)));
        }
    };
    Ok(FinancialFact {
        id: raw.id,
        company_id: raw.company_id,
        period_type: parse_period_type(&raw.period_type, raw.id)?,
        period_end: parse_period_end(&raw.period_end, raw.id)?,
        metric_name: raw.metric_name,
        value,
        unit: raw.unit.unwrap_or_default(),
    })
}

fn table_columns(conn: &Connection, table: &str) -> AppResult<BTreeSet<String>> {
    let pragma = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&pragma).map_err(load_error)?;
    let mut rows = stmt.query([]).map_err(load_error)?;
    let mut columns = BTreeSet::new();
    while let Some(row) = rows.next().map_err(load_error)? {
        let name: String = row.get(1).map_err(load_error)?;
        columns.insert(name.to_ascii_lowercase());
    }
    if columns.is_empty() {
        return Err(AppError::Load(format!("Dataset is missing table '{}'", table)));
    }
    Ok(columns)
}

fn require_columns(table: &str, present: &BTreeSet<String>, required: &[&str]) -> AppResult<()> {
    let missing = required
        .iter()
        .filter(|column| !present.contains(**column))
        .copied()
        .collect::<Vec<_>>();
    if missing.is_empty() {
        return Ok(());
    }
    Err(AppError::Load(format!(
        "Table '{}' is missing required column(s): {}",
        table,
        missing.join(", ")
    )))
}

fn load_error(error: rusqlite::Error) -> AppError {
    AppError::Load(error.to_string())
}

/// Private on-disk SQLite copy of the dataset that ad-hoc queries run against.
/// The file is written once and never changed; every reader opens its own
/// read-only connection without a shared cache, so readers never wait on each
/// other. The directory is removed when the sandbox is dropped.
#[derive(Debug)]
pub struct SqlSandbox {
    path: PathBuf,
    _dir: TempDir,
}

impl SqlSandbox {
    pub fn materialize(dataset: &Dataset) -> AppResult<Self> {
        let dir = tempfile::Builder::new().prefix("xbrl-lookup-").tempdir()?;
        let path = dir.path().join("sandbox.db");
        let mut conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;

        let tx = conn.transaction()?;
        {
            let mut insert_company =
                tx.prepare("INSERT INTO Company (id, ticker, name, sector) VALUES (?1, ?2, ?3, ?4)")?;
            for company in dataset.companies() {
                insert_company.execute(params![company.id, company.ticker, company.name, company.sector])?;
            }

            let mut insert_fact = tx.prepare(
                "INSERT INTO FinancialFact (
                   id, company_id, period_type, period_end, metric_name, value, unit
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (_, fact) in dataset.facts() {
                insert_fact.execute(params![
                    fact.id,
                    fact.company_id,
                    fact.period_type.as_str(),
                    fact.period_end,
                    fact.metric_name,
                    fact.value,
                    fact.unit,
                ])?;
            }
        }
        tx.commit()?;
        conn.close().map_err(|(_, error)| AppError::from(error))?;

        tracing::debug!(
            path = %path.display(),
            companies = dataset.companies().len(),
            facts = dataset.fact_count(),
            "sql sandbox materialized"
        );

        Ok(Self { path, _dir: dir })
    }

    /// Opens a fresh read-only connection. Blocking; call it off the async
    /// executor.
    pub fn open_reader(&self) -> AppResult<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA query_only = ON;")?;
        Ok(conn)
    }
}
