use crate::dataset::{parse_period_end, parse_period_type};
use crate::errors::{AppError, AppResult};
use crate::models::{Company, FinancialFact};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const DEMO_DATASET_YAML: &str = include_str!("demo_dataset.yaml");

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedDocument {
    pub companies: Vec<SeedCompany>,
    #[serde(default)]
    pub facts: Vec<SeedFact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedCompany {
    pub id: i64,
    pub ticker: String,
    pub name: String,
    #[serde(default)]
    pub sector: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedFact {
    pub id: i64,
    #[serde(alias = "companyId")]
    pub company_id: i64,
    #[serde(alias = "periodType")]
    pub period_type: String,
    #[serde(alias = "periodEnd")]
    pub period_end: String,
    #[serde(alias = "metricName")]
    pub metric_name: String,
    pub value: f64,
    pub unit: String,
}

pub fn demo_records() -> AppResult<(Vec<Company>, Vec<FinancialFact>)> {
    let document: SeedDocument = serde_yaml::from_str(DEMO_DATASET_YAML)
        .map_err(|error| AppError::Internal(format!("bundled demo dataset is invalid: {}", error)))?;
    into_records(document)
}

pub fn read_json(path: &Path) -> AppResult<(Vec<Company>, Vec<FinancialFact>)> {
    let raw = read_source_text(path)?;
    let document: SeedDocument = serde_json::from_str(&raw)
        .map_err(|error| AppError::Load(format!("Malformed JSON dataset '{}': {}", path.display(), error)))?;
    into_records(document)
}

pub fn read_yaml(path: &Path) -> AppResult<(Vec<Company>, Vec<FinancialFact>)> {
    let raw = read_source_text(path)?;
    let document: SeedDocument = serde_yaml::from_str(&raw)
        .map_err(|error| AppError::Load(format!("Malformed YAML dataset '{}': {}", path.display(), error)))?;
    into_records(document)
}

fn read_source_text(path: &Path) -> AppResult<String> {
    fs::read_to_string(path)
        .map_err(|error| AppError::Load(format!("Unable to read dataset '{}': {}", path.display(), error)))
}

fn into_records(document: SeedDocument) -> AppResult<(Vec<Company>, Vec<FinancialFact>)> {
    let companies = document
        .companies
        .into_iter()
        .map(|company| Company {
            id: company.id,
            ticker: company.ticker,
            name: company.name,
            sector: company.sector,
        })
        .collect();

    let facts = document
        .facts
        .into_iter()
        .map(|fact| {
            Ok(FinancialFact {
                id: fact.id,
                company_id: fact.company_id,
                period_type: parse_period_type(&fact.period_type, fact.id)?,
                period_end: parse_period_end(&fact.period_end, fact.id)?,
                metric_name: fact.metric_name,
                value: fact.value,
                unit: fact.unit,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok((companies, facts))
}

#[cfg(test)]
mod tests {
    use super::{demo_records, read_json, read_yaml};
    use crate::dataset::Dataset;
    use crate::errors::AppError;
    use crate::models::PeriodType;

    #[test]
    fn demo_dataset_passes_every_invariant() {
        let (companies, facts) = demo_records().expect("demo records");
        let dataset = Dataset::from_records(companies, facts).expect("demo dataset");
        assert_eq!(dataset.companies().len(), 3);
        assert_eq!(dataset.fact_count(), 30);
        for ticker in ["AAPL", "MSFT", "TSLA"] {
            assert!(dataset.company_by_ticker(ticker).is_some(), "missing {}", ticker);
        }
    }

    #[test]
    fn reads_json_seed_with_camel_case_aliases() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("seed.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "companies": [{ "id": 7, "ticker": "nvda", "name": "NVIDIA" }],
                "facts": [{
                    "id": 1,
                    "companyId": 7,
                    "periodType": "10-Q",
                    "periodEnd": "2024-01-28",
                    "metricName": "Revenue",
                    "value": 22103000000.0,
                    "unit": "USD"
                }]
            })
            .to_string(),
        )
        .expect("write seed");

        let (companies, facts) = read_json(&path).expect("read json");
        assert_eq!(companies[0].sector, None);
        assert_eq!(facts[0].period_type, PeriodType::Quarterly);
    }

    #[test]
    fn missing_required_field_is_a_load_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("seed.yaml");
        std::fs::write(
            &path,
            "companies:\n  - id: 1\n    ticker: AAPL\n    name: Apple\nfacts:\n  - id: 1\n    company_id: 1\n    period_type: ANNUAL\n    period_end: \"2023-09-30\"\n    metric_name: Revenue\n    value: 10\n",
        )
        .expect("write seed");

        let result = read_yaml(&path);
        assert!(matches!(result, Err(AppError::Load(message)) if message.contains("unit")));
    }

    #[test]
    fn unreadable_source_is_a_load_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = read_yaml(&dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(AppError::Load(_))));
    }

    #[test]
    fn bad_period_end_names_the_fact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("seed.yaml");
        std::fs::write(
            &path,
            "companies:\n  - id: 1\n    ticker: AAPL\n    name: Apple\nfacts:\n  - id: 42\n    company_id: 1\n    period_type: ANNUAL\n    period_end: \"2023/09/30\"\n    metric_name: Revenue\n    value: 10\n    unit: USD\n",
        )
        .expect("write seed");

        let result = read_yaml(&path);
        assert!(matches!(result, Err(AppError::Load(message)) if message.contains("Fact 42")));
    }
}
