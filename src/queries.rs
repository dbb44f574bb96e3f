//! Read-only queries over a loaded [`Dataset`]. Every function takes the dataset
//! explicitly; nothing here caches or mutates.

use crate::dataset::Dataset;
use crate::errors::{AppError, AppResult};
use crate::models::{
    Company, CompanyFactCount, CompanyOverview, ComparisonEntry, DatasetSummary, FinancialFact, PeriodType,
    SearchHit, TrendPoint, TrendSeries,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const DEFAULT_SEARCH_LIMIT: usize = 50;
const MAX_SEARCH_LIMIT: usize = 500;
const TOP_COMPANIES: usize = 5;

const SCORE_EXACT_METRIC: u32 = 100;
const SCORE_METRIC_CONTAINS: u32 = 80;
const SCORE_EXACT_TICKER: u32 = 70;
const SCORE_COMPANY_CONTAINS: u32 = 40;

pub fn lookup(
    dataset: &Dataset,
    ticker: &str,
    metric_name: &str,
    period_type: Option<PeriodType>,
) -> AppResult<Vec<FinancialFact>> {
    let company = resolve_ticker(dataset, ticker)?;
    let metric_name = metric_name.trim();
    Ok(dataset
        .facts_for(company.id)
        .iter()
        .filter(|fact| fact.metric_name == metric_name)
        .filter(|fact| period_type.map_or(true, |period| fact.period_type == period))
        .cloned()
        .collect())
}

/// Time series of one metric for one company. Fewer than two points is not a
/// trend and is reported as `InsufficientData`.
pub fn trend(
    dataset: &Dataset,
    ticker: &str,
    metric_name: &str,
    period_type: Option<PeriodType>,
) -> AppResult<Vec<TrendPoint>> {
    let points = lookup(dataset, ticker, metric_name, period_type)?
        .iter()
        .map(TrendPoint::from)
        .collect::<Vec<_>>();
    if points.len() < 2 {
        return Err(AppError::InsufficientData(format!(
            "{} has {} '{}' data point(s); a trend needs at least 2",
            ticker.trim().to_ascii_uppercase(),
            points.len(),
            metric_name.trim()
        )));
    }
    Ok(points)
}

/// One series per ticker for charting several companies together. Series shorter
/// than two points are kept; the caller decides how to draw them.
pub fn trend_series(
    dataset: &Dataset,
    metric_name: &str,
    tickers: &[String],
    period_type: Option<PeriodType>,
) -> AppResult<Vec<TrendSeries>> {
    let metric_name = metric_name.trim();
    let companies: Vec<&Company> = if tickers.is_empty() {
        dataset
            .companies()
            .iter()
            .filter(|company| {
                dataset
                    .facts_for(company.id)
                    .iter()
                    .any(|fact| fact.metric_name == metric_name)
            })
            .collect()
    } else {
        tickers
            .iter()
            .map(|ticker| resolve_ticker(dataset, ticker))
            .collect::<AppResult<Vec<_>>>()?
    };

    Ok(companies
        .into_iter()
        .map(|company| {
            let facts = dataset
                .facts_for(company.id)
                .iter()
                .filter(|fact| fact.metric_name == metric_name)
                .filter(|fact| period_type.map_or(true, |period| fact.period_type == period))
                .collect::<Vec<_>>();
            TrendSeries {
                ticker: company.ticker.clone(),
                company_name: company.name.clone(),
                metric_name: metric_name.to_string(),
                unit: facts.first().map(|fact| fact.unit.clone()),
                points: facts.into_iter().map(TrendPoint::from).collect(),
            }
        })
        .collect())
}

pub fn search(dataset: &Dataset, term: &str, limit: usize) -> Vec<SearchHit> {
    let term = term.trim();
    if term.is_empty() {
        return Vec::new();
    }
    let limit = limit.clamp(1, MAX_SEARCH_LIMIT);

    let mut hits = score_facts(dataset, term);
    if hits.is_empty() {
        let mut best: HashMap<i64, SearchHit> = HashMap::new();
        for word in term.split_whitespace().filter(|word| word.chars().count() > 2) {
            for hit in score_facts(dataset, word) {
                let better = best
                    .get(&hit.fact.id)
                    .map_or(true, |existing| existing.relevance_score < hit.relevance_score);
                if better {
                    best.insert(hit.fact.id, hit);
                }
            }
        }
        hits = best.into_values().collect();
    }

    hits.sort_by(|left, right| {
        right
            .relevance_score
            .cmp(&left.relevance_score)
            .then(right.fact.period_end.cmp(&left.fact.period_end))
            .then_with(|| left.company_name.cmp(&right.company_name))
            .then_with(|| left.fact.metric_name.cmp(&right.fact.metric_name))
            .then(left.fact.id.cmp(&right.fact.id))
    });
    hits.truncate(limit);
    hits
}

fn score_facts(dataset: &Dataset, term: &str) -> Vec<SearchHit> {
    let needle = term.to_lowercase();
    dataset
        .facts()
        .filter_map(|(company, fact)| {
            let metric = fact.metric_name.to_lowercase();
            let score = if metric == needle {
                SCORE_EXACT_METRIC
            } else if metric.contains(&needle) {
                SCORE_METRIC_CONTAINS
            } else if company.ticker.eq_ignore_ascii_case(term) {
                SCORE_EXACT_TICKER
            } else if company.name.to_lowercase().contains(&needle) {
                SCORE_COMPANY_CONTAINS
            } else {
                return None;
            };
            Some(SearchHit {
                ticker: company.ticker.clone(),
                company_name: company.name.clone(),
                relevance_score: score,
                fact: fact.clone(),
            })
        })
        .collect()
}

pub fn summary(dataset: &Dataset) -> DatasetSummary {
    let mut metrics = BTreeSet::new();
    let mut facts_by_period_type = BTreeMap::new();
    let mut earliest = None;
    let mut latest = None;

    for (_, fact) in dataset.facts() {
        metrics.insert(fact.metric_name.as_str());
        *facts_by_period_type.entry(fact.period_type).or_insert(0) += 1;
        earliest = Some(earliest.map_or(fact.period_end, |current| fact.period_end.min(current)));
        latest = Some(latest.map_or(fact.period_end, |current| fact.period_end.max(current)));
    }

    let mut top_companies = dataset
        .companies()
        .iter()
        .map(|company| CompanyFactCount {
            ticker: company.ticker.clone(),
            name: company.name.clone(),
            fact_count: dataset.facts_for(company.id).len(),
        })
        .filter(|entry| entry.fact_count > 0)
        .collect::<Vec<_>>();
    top_companies.sort_by(|left, right| {
        right
            .fact_count
            .cmp(&left.fact_count)
            .then_with(|| left.name.cmp(&right.name))
    });
    top_companies.truncate(TOP_COMPANIES);

    DatasetSummary {
        total_companies: dataset.companies().len(),
        total_facts: dataset.fact_count(),
        unique_metrics: metrics.len(),
        earliest_period_end: earliest,
        latest_period_end: latest,
        facts_by_period_type,
        top_companies,
    }
}

pub fn companies(dataset: &Dataset) -> Vec<CompanyOverview> {
    let mut overview = dataset
        .companies()
        .iter()
        .map(|company| {
            let facts = dataset.facts_for(company.id);
            CompanyOverview {
                company: company.clone(),
                fact_count: facts.len(),
                metric_count: facts
                    .iter()
                    .map(|fact| fact.metric_name.as_str())
                    .collect::<BTreeSet<_>>()
                    .len(),
                latest_period_end: facts.last().map(|fact| fact.period_end),
            }
        })
        .collect::<Vec<_>>();
    overview.sort_by(|left, right| left.company.name.cmp(&right.company.name));
    overview
}

pub fn metric_names(dataset: &Dataset) -> Vec<String> {
    dataset
        .facts()
        .map(|(_, fact)| fact.metric_name.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(ToString::to_string)
        .collect()
}

/// Latest reported value of a metric for every company that reports it,
/// largest first.
pub fn compare(dataset: &Dataset, metric_name: &str, period_type: Option<PeriodType>) -> Vec<ComparisonEntry> {
    let metric_name = metric_name.trim();
    let mut entries = dataset
        .companies()
        .iter()
        .filter_map(|company| {
            dataset
                .facts_for(company.id)
                .iter()
                .rev()
                .find(|fact| {
                    fact.metric_name == metric_name
                        && period_type.map_or(true, |period| fact.period_type == period)
                })
                .map(|fact| ComparisonEntry {
                    ticker: company.ticker.clone(),
                    company_name: company.name.clone(),
                    period_type: fact.period_type,
                    period_end: fact.period_end,
                    value: fact.value,
                    unit: fact.unit.clone(),
                })
        })
        .collect::<Vec<_>>();
    entries.sort_by(|left, right| {
        right
            .value
            .total_cmp(&left.value)
            .then_with(|| left.ticker.cmp(&right.ticker))
    });
    entries
}

fn resolve_ticker<'a>(dataset: &'a Dataset, ticker: &str) -> AppResult<&'a Company> {
    dataset
        .company_by_ticker(ticker)
        .ok_or_else(|| AppError::NotFound(format!("Unknown ticker '{}'", ticker.trim())))
}
