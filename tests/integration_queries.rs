use rusqlite::Connection;
use std::path::Path;
use xbrl_lookup_lib::models::{PeriodType, QueryLimits};
use xbrl_lookup_lib::{load, AppError, DatasetSource, QueryEngine};

fn write_dataset(path: &Path, extra_sql: &str) {
    let conn = Connection::open(path).expect("open fixture");
    conn.execute_batch(
        "CREATE TABLE Company (id INTEGER PRIMARY KEY, ticker TEXT, name TEXT, sector TEXT);
         CREATE TABLE FinancialFact (
           id INTEGER PRIMARY KEY, company_id INTEGER, period_type TEXT, period_end TEXT,
           metric_name TEXT, value REAL, unit TEXT
         );
         INSERT INTO Company VALUES (1, 'AAPL', 'Apple Inc.', 'Technology');
         INSERT INTO Company VALUES (2, 'MSFT', 'Microsoft Corporation', 'Technology');
         INSERT INTO FinancialFact VALUES (1, 1, 'ANNUAL', '2023-12-31', 'Revenue', 383285000000, 'USD');
         INSERT INTO FinancialFact VALUES (2, 1, 'ANNUAL', '2022-12-31', 'Revenue', 394328000000, 'USD');
         INSERT INTO FinancialFact VALUES (3, 2, 'ANNUAL', '2023-06-30', 'NetIncome', 72361000000, 'USD');",
    )
    .expect("fixture schema");
    if !extra_sql.is_empty() {
        conn.execute_batch(extra_sql).expect("fixture extras");
    }
}

fn engine_for(path: &Path) -> QueryEngine {
    QueryEngine::load(&DatasetSource::Sqlite(path.to_path_buf()), QueryLimits::default()).expect("engine")
}

#[test]
fn lookup_returns_both_revenue_facts_in_period_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("facts.db");
    write_dataset(&path, "");
    let engine = engine_for(&path);

    let facts = engine.lookup("AAPL", "Revenue", None).expect("lookup");
    let ends: Vec<String> = facts.iter().map(|fact| fact.period_end.to_string()).collect();
    assert_eq!(ends, vec!["2022-12-31", "2023-12-31"]);

    assert!(matches!(engine.lookup("ZZZZ", "Revenue", None), Err(AppError::NotFound(_))));
}

#[test]
fn trend_needs_two_points() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("facts.db");
    write_dataset(&path, "");
    let engine = engine_for(&path);
    assert!(matches!(
        engine.trend("MSFT", "NetIncome", None),
        Err(AppError::InsufficientData(_))
    ));

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("facts.db");
    write_dataset(
        &path,
        "INSERT INTO FinancialFact VALUES (4, 2, 'ANNUAL', '2022-06-30', 'NetIncome', 72738000000, 'USD');",
    );
    let engine = engine_for(&path);
    let points = engine
        .trend("msft", "NetIncome", Some(PeriodType::Annual))
        .expect("trend");
    assert_eq!(points.len(), 2);
    assert!(points[0].period_end < points[1].period_end);
}

#[test]
fn orphan_and_duplicate_facts_fail_to_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orphan = dir.path().join("orphan.db");
    write_dataset(
        &orphan,
        "INSERT INTO FinancialFact VALUES (9, 42, 'ANNUAL', '2023-12-31', 'Revenue', 1, 'USD');",
    );
    assert!(matches!(
        load(&DatasetSource::Sqlite(orphan)),
        Err(AppError::Load(_))
    ));

    let duplicate = dir.path().join("duplicate.db");
    write_dataset(
        &duplicate,
        "INSERT INTO FinancialFact VALUES (9, 1, 'ANNUAL', '2023-12-31', 'Revenue', 1, 'USD');",
    );
    assert!(matches!(
        load(&DatasetSource::Sqlite(duplicate)),
        Err(AppError::Load(_))
    ));
}

#[test]
fn every_loaded_fact_resolves_to_a_company() {
    let dataset = load(&DatasetSource::Demo).expect("demo");
    for (company, fact) in dataset.facts() {
        assert_eq!(company.id, fact.company_id);
        assert!(dataset.company(fact.company_id).is_some());
    }
}

#[tokio::test]
async fn delete_is_rejected_whatever_the_dataset() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("facts.db");
    write_dataset(&path, "");
    for engine in [engine_for(&path), QueryEngine::load(&DatasetSource::Demo, QueryLimits::default()).expect("demo")] {
        let result = engine.execute("DELETE FROM FinancialFact").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert!(!engine.lookup("AAPL", "Revenue", None).expect("still there").is_empty());
    }
}

#[tokio::test]
async fn large_result_is_capped_within_the_deadline() {
    let engine = QueryEngine::load(&DatasetSource::Demo, QueryLimits::default()).expect("engine");
    let started = std::time::Instant::now();
    let result = engine
        .execute(
            "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 5000)
             SELECT n.x, c.ticker FROM n CROSS JOIN (SELECT ticker FROM Company LIMIT 1) c",
        )
        .await
        .expect("capped");
    assert_eq!(result.rows.len(), 1_000);
    assert!(result.truncated);
    assert!(started.elapsed() < engine.limits().timeout());
}
