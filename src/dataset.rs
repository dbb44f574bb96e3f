use crate::db;
use crate::errors::{AppError, AppResult};
use crate::models::{Company, FinancialFact, PeriodType};
use crate::seed;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;

static TICKER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9.\-]{0,9}$").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSource {
    Demo,
    Sqlite(PathBuf),
    Json(PathBuf),
    Yaml(PathBuf),
}

impl DatasetSource {
    pub fn from_location(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::Config("dataset location cannot be empty".to_string()));
        }
        if trimmed.eq_ignore_ascii_case("demo") {
            return Ok(Self::Demo);
        }

        let path = PathBuf::from(trimmed);
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "db" | "sqlite" | "sqlite3" => Ok(Self::Sqlite(path)),
            "json" => Ok(Self::Json(path)),
            "yaml" | "yml" => Ok(Self::Yaml(path)),
            _ => Err(AppError::Config(format!(
                "Unsupported dataset location '{}': expected 'demo' or a .db/.sqlite/.json/.yaml file",
                trimmed
            ))),
        }
    }
}

impl fmt::Display for DatasetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Demo => write!(f, "demo"),
            Self::Sqlite(path) => write!(f, "sqlite:{}", path.display()),
            Self::Json(path) => write!(f, "json:{}", path.display()),
            Self::Yaml(path) => write!(f, "yaml:{}", path.display()),
        }
    }
}

/// Immutable, validated view of every company and fact. Built once and shared
/// read-only for the lifetime of the process.
#[derive(Debug)]
pub struct Dataset {
    companies: Vec<Company>,
    by_id: HashMap<i64, usize>,
    by_ticker: HashMap<String, usize>,
    facts: HashMap<i64, Vec<FinancialFact>>,
    fact_count: usize,
}

impl Dataset {
    pub fn from_records(companies: Vec<Company>, facts: Vec<FinancialFact>) -> AppResult<Self> {
        let mut normalized_companies = Vec::with_capacity(companies.len());
        let mut by_ticker = HashMap::new();
        let mut seen_ids = HashSet::new();

        for company in companies {
            let company = normalize_company(company)?;
            if !seen_ids.insert(company.id) {
                return Err(AppError::Load(format!("Duplicate company id {}", company.id)));
            }
            if by_ticker.contains_key(&company.ticker) {
                return Err(AppError::Load(format!("Duplicate ticker '{}'", company.ticker)));
            }
            by_ticker.insert(company.ticker.clone(), company.id);
            normalized_companies.push(company);
        }

        normalized_companies.sort_by_key(|company| company.id);
        let by_id: HashMap<i64, usize> = normalized_companies
            .iter()
            .enumerate()
            .map(|(index, company)| (company.id, index))
            .collect();
        let by_ticker = by_ticker
            .into_iter()
            .filter_map(|(ticker, id)| by_id.get(&id).map(|index| (ticker, *index)))
            .collect();

        let mut grouped: HashMap<i64, Vec<FinancialFact>> = HashMap::new();
        let mut seen_fact_ids = HashSet::new();
        let mut seen_keys: HashSet<(i64, PeriodType, NaiveDate, String)> = HashSet::new();
        let fact_count = facts.len();

        for fact in facts {
            let fact = normalize_fact(fact)?;
            if !seen_fact_ids.insert(fact.id) {
                return Err(AppError::Load(format!("Duplicate fact id {}", fact.id)));
            }
            if !by_id.contains_key(&fact.company_id) {
                return Err(AppError::Load(format!(
                    "Fact {} references unknown company id {}",
                    fact.id, fact.company_id
                )));
            }
            let key = (fact.company_id, fact.period_type, fact.period_end, fact.metric_name.clone());
            if !seen_keys.insert(key) {
                return Err(AppError::Load(format!(
                    "Duplicate fact for company {} / {} / {} / '{}' (fact {})",
                    fact.company_id,
                    fact.period_type.as_str(),
                    fact.period_end,
                    fact.metric_name,
                    fact.id
                )));
            }
            grouped.entry(fact.company_id).or_default().push(fact);
        }

        for company_facts in grouped.values_mut() {
            company_facts.sort_by(|left, right| {
                left.period_end
                    .cmp(&right.period_end)
                    .then(left.period_type.cmp(&right.period_type))
                    .then_with(|| left.metric_name.cmp(&right.metric_name))
                    .then(left.id.cmp(&right.id))
            });
        }

        Ok(Self {
            companies: normalized_companies,
            by_id,
            by_ticker,
            facts: grouped,
            fact_count,
        })
    }

    pub fn companies(&self) -> &[Company] {
        &self.companies
    }

    pub fn company(&self, company_id: i64) -> Option<&Company> {
        self.by_id.get(&company_id).map(|index| &self.companies[*index])
    }

    pub fn company_by_ticker(&self, ticker: &str) -> Option<&Company> {
        let key = ticker.trim().to_ascii_uppercase();
        self.by_ticker.get(&key).map(|index| &self.companies[*index])
    }

    /// Facts of one company ordered by period end ascending.
    pub fn facts_for(&self, company_id: i64) -> &[FinancialFact] {
        self.facts.get(&company_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn facts(&self) -> impl Iterator<Item = (&Company, &FinancialFact)> + '_ {
        self.companies
            .iter()
            .flat_map(move |company| self.facts_for(company.id).iter().map(move |fact| (company, fact)))
    }

    pub fn fact_count(&self) -> usize {
        self.fact_count
    }
}

pub fn load(source: &DatasetSource) -> AppResult<Dataset> {
    let (companies, facts) = match source {
        DatasetSource::Demo => seed::demo_records()?,
        DatasetSource::Sqlite(path) => db::read_source(path)?,
        DatasetSource::Json(path) => seed::read_json(path)?,
        DatasetSource::Yaml(path) => seed::read_yaml(path)?,
    };
    let dataset = Dataset::from_records(companies, facts).inspect_err(|error| {
        tracing::error!(source = %source, error = %error, "dataset rejected");
    })?;
    tracing::info!(
        source = %source,
        companies = dataset.companies().len(),
        facts = dataset.fact_count(),
        "dataset loaded"
    );
    Ok(dataset)
}

fn normalize_company(company: Company) -> AppResult<Company> {
    let ticker = company.ticker.trim().to_ascii_uppercase();
    if !TICKER_PATTERN.is_match(&ticker) {
        return Err(AppError::Load(format!(
            "Company {} has invalid ticker '{}'",
            company.id, company.ticker
        )));
    }
    let name = company.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Load(format!("Company {} has an empty name", company.id)));
    }
    let sector = company
        .sector
        .map(|sector| sector.trim().to_string())
        .filter(|sector| !sector.is_empty());
    Ok(Company {
        id: company.id,
        ticker,
        name,
        sector,
    })
}

fn normalize_fact(fact: FinancialFact) -> AppResult<FinancialFact> {
    let metric_name = fact.metric_name.trim().to_string();
    if metric_name.is_empty() {
        return Err(AppError::Load(format!("Fact {} has an empty metric name", fact.id)));
    }
    if !fact.value.is_finite() {
        return Err(AppError::Load(format!(
            "Fact {} has non-finite value {}",
            fact.id, fact.value
        )));
    }
    let unit = fact.unit.trim().to_string();
    if unit.is_empty() {
        return Err(AppError::Load(format!("Fact {} has a value but no unit", fact.id)));
    }
    Ok(FinancialFact {
        metric_name,
        unit,
        ..fact
    })
}

/// Parses an ISO `YYYY-MM-DD` period end, naming the offending fact on failure.
pub(crate) fn parse_period_end(raw: &str, fact_id: i64) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|error| {
        AppError::Load(format!(
            "Fact {} has invalid period end '{}': {}",
            fact_id, raw, error
        ))
    })
}

pub(crate) fn parse_period_type(raw: &str, fact_id: i64) -> AppResult<PeriodType> {
    PeriodType::parse(raw).ok_or_else(|| {
        AppError::Load(format!(
            "Fact {} has unknown period type '{}'",
            fact_id, raw
        ))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{Dataset, DatasetSource};
    use crate::errors::AppError;
    use crate::models::{Company, FinancialFact, PeriodType};
    use chrono::NaiveDate;
    use std::path::PathBuf;

    pub(crate) fn company(id: i64, ticker: &str, name: &str) -> Company {
        Company {
            id,
            ticker: ticker.to_string(),
            name: name.to_string(),
            sector: Some("Technology".to_string()),
        }
    }

    pub(crate) fn fact(
        id: i64,
        company_id: i64,
        period_type: PeriodType,
        period_end: &str,
        metric_name: &str,
        value: f64,
    ) -> FinancialFact {
        FinancialFact {
            id,
            company_id,
            period_type,
            period_end: NaiveDate::parse_from_str(period_end, "%Y-%m-%d").expect("date"),
            metric_name: metric_name.to_string(),
            value,
            unit: "USD".to_string(),
        }
    }

    #[test]
    fn indexes_by_ticker_and_sorts_facts_ascending() {
        let dataset = Dataset::from_records(
            vec![company(1, "aapl", "Apple Inc.")],
            vec![
                fact(1, 1, PeriodType::Annual, "2023-12-31", "Revenue", 383.0),
                fact(2, 1, PeriodType::Annual, "2022-12-31", "Revenue", 394.0),
                fact(3, 1, PeriodType::Quarterly, "2023-12-31", "Revenue", 119.0),
            ],
        )
        .expect("dataset");

        let apple = dataset.company_by_ticker("AaPl").expect("ticker lookup");
        assert_eq!(apple.ticker, "AAPL");
        let ids: Vec<i64> = dataset.facts_for(apple.id).iter().map(|fact| fact.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(dataset.fact_count(), 3);
    }

    #[test]
    fn rejects_orphan_fact() {
        let result = Dataset::from_records(
            vec![company(1, "AAPL", "Apple Inc.")],
            vec![fact(1, 99, PeriodType::Annual, "2023-12-31", "Revenue", 1.0)],
        );
        assert!(matches!(result, Err(AppError::Load(message)) if message.contains("unknown company")));
    }

    #[test]
    fn rejects_duplicate_fact_key() {
        let result = Dataset::from_records(
            vec![company(1, "AAPL", "Apple Inc.")],
            vec![
                fact(1, 1, PeriodType::Annual, "2023-12-31", "Revenue", 1.0),
                fact(2, 1, PeriodType::Annual, "2023-12-31", "Revenue", 2.0),
            ],
        );
        assert!(matches!(result, Err(AppError::Load(_))));
    }

    #[test]
    fn same_period_end_with_other_period_type_is_not_a_duplicate() {
        let dataset = Dataset::from_records(
            vec![company(1, "AAPL", "Apple Inc.")],
            vec![
                fact(1, 1, PeriodType::Annual, "2023-12-31", "Revenue", 1.0),
                fact(2, 1, PeriodType::Quarterly, "2023-12-31", "Revenue", 2.0),
            ],
        );
        assert!(dataset.is_ok());
    }

    #[test]
    fn rejects_case_insensitive_duplicate_ticker() {
        let result = Dataset::from_records(
            vec![company(1, "AAPL", "Apple Inc."), company(2, "aapl", "Apple Again")],
            vec![],
        );
        assert!(matches!(result, Err(AppError::Load(message)) if message.contains("Duplicate ticker")));
    }

    #[test]
    fn rejects_non_finite_values_and_missing_units() {
        let nan = Dataset::from_records(
            vec![company(1, "AAPL", "Apple Inc.")],
            vec![fact(1, 1, PeriodType::Annual, "2023-12-31", "Revenue", f64::NAN)],
        );
        assert!(matches!(nan, Err(AppError::Load(_))));

        let mut unitless = fact(1, 1, PeriodType::Annual, "2023-12-31", "Revenue", 1.0);
        unitless.unit = "  ".to_string();
        let result = Dataset::from_records(vec![company(1, "AAPL", "Apple Inc.")], vec![unitless]);
        assert!(matches!(result, Err(AppError::Load(message)) if message.contains("no unit")));
    }

    #[test]
    fn rejects_duplicate_company_and_fact_ids() {
        let companies = Dataset::from_records(
            vec![company(1, "AAPL", "Apple Inc."), company(1, "MSFT", "Microsoft Corporation")],
            vec![],
        );
        assert!(matches!(companies, Err(AppError::Load(message)) if message.contains("Duplicate company id 1")));

        let facts = Dataset::from_records(
            vec![company(1, "AAPL", "Apple Inc.")],
            vec![
                fact(5, 1, PeriodType::Annual, "2023-12-31", "Revenue", 1.0),
                fact(5, 1, PeriodType::Annual, "2022-12-31", "Revenue", 2.0),
            ],
        );
        assert!(matches!(facts, Err(AppError::Load(message)) if message.contains("Duplicate fact id 5")));
    }

    #[test]
    fn rejects_malformed_tickers() {
        for ticker in ["", "-AAPL", "TOO-LONG-TICKER", "BRK B", "AAPL$"] {
            let result = Dataset::from_records(vec![company(1, ticker, "Somebody")], vec![]);
            assert!(
                matches!(&result, Err(AppError::Load(message)) if message.contains("invalid ticker")),
                "ticker {:?} was accepted",
                ticker
            );
        }
        assert!(Dataset::from_records(vec![company(1, "brk.b", "Berkshire Hathaway")], vec![]).is_ok());
    }

    #[test]
    fn rejects_blank_company_name_and_metric_name() {
        let nameless = Dataset::from_records(vec![company(1, "AAPL", "   ")], vec![]);
        assert!(matches!(nameless, Err(AppError::Load(message)) if message.contains("empty name")));

        let metricless = Dataset::from_records(
            vec![company(1, "AAPL", "Apple Inc.")],
            vec![fact(3, 1, PeriodType::Annual, "2023-12-31", " ", 1.0)],
        );
        assert!(matches!(metricless, Err(AppError::Load(message)) if message.contains("empty metric name")));
    }

    #[test]
    fn source_kind_follows_location() {
        assert_eq!(DatasetSource::from_location("demo").expect("demo"), DatasetSource::Demo);
        assert_eq!(
            DatasetSource::from_location("data/facts.SQLITE").expect("sqlite"),
            DatasetSource::Sqlite(PathBuf::from("data/facts.SQLITE"))
        );
        assert_eq!(
            DatasetSource::from_location("seed.yml").expect("yaml"),
            DatasetSource::Yaml(PathBuf::from("seed.yml"))
        );
        assert!(matches!(
            DatasetSource::from_location("facts.csv"),
            Err(AppError::Config(_))
        ));
    }
}
