use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_ROWS: usize = 1_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_MAX_QUERY_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    Annual,
    Quarterly,
}

impl PeriodType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Annual => "ANNUAL",
            Self::Quarterly => "QUARTERLY",
        }
    }

    /// Accepts the canonical names plus the SEC form/fiscal-period spellings
    /// older extracts used (`10-K`, `FY`, `10-Q`, `Q1`..`Q4`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ANNUAL" | "10-K" | "FY" => Some(Self::Annual),
            "QUARTERLY" | "10-Q" | "Q1" | "Q2" | "Q3" | "Q4" => Some(Self::Quarterly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: i64,
    pub ticker: String,
    pub name: String,
    pub sector: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialFact {
    pub id: i64,
    pub company_id: i64,
    pub period_type: PeriodType,
    pub period_end: NaiveDate,
    pub metric_name: String,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub period_end: NaiveDate,
    pub value: f64,
}

impl From<&FinancialFact> for TrendPoint {
    fn from(fact: &FinancialFact) -> Self {
        Self {
            period_end: fact.period_end,
            value: fact.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSeries {
    pub ticker: String,
    pub company_name: String,
    pub metric_name: String,
    pub unit: Option<String>,
    pub points: Vec<TrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub ticker: String,
    pub company_name: String,
    pub relevance_score: u32,
    pub fact: FinancialFact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyFactCount {
    pub ticker: String,
    pub name: String,
    pub fact_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub total_companies: usize,
    pub total_facts: usize,
    pub unique_metrics: usize,
    pub earliest_period_end: Option<NaiveDate>,
    pub latest_period_end: Option<NaiveDate>,
    pub facts_by_period_type: BTreeMap<PeriodType, usize>,
    pub top_companies: Vec<CompanyFactCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyOverview {
    pub company: Company,
    pub fact_count: usize,
    pub metric_count: usize,
    pub latest_period_end: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonEntry {
    pub ticker: String,
    pub company_name: String,
    pub period_type: PeriodType,
    pub period_end: NaiveDate,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdhocQueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    pub truncated: bool,
    pub row_cap: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLimits {
    pub max_rows: usize,
    pub timeout_ms: u64,
    pub max_query_bytes: usize,
}

impl QueryLimits {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_query_bytes: DEFAULT_MAX_QUERY_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PeriodType;

    #[test]
    fn period_type_accepts_form_type_aliases() {
        assert_eq!(PeriodType::parse("annual"), Some(PeriodType::Annual));
        assert_eq!(PeriodType::parse(" 10-K "), Some(PeriodType::Annual));
        assert_eq!(PeriodType::parse("10-q"), Some(PeriodType::Quarterly));
        assert_eq!(PeriodType::parse("Q3"), Some(PeriodType::Quarterly));
        assert_eq!(PeriodType::parse("monthly"), None);
    }

    #[test]
    fn period_type_serializes_in_upper_case() {
        let raw = serde_json::to_string(&PeriodType::Quarterly).expect("serialize");
        assert_eq!(raw, "\"QUARTERLY\"");
    }
}
