use crate::dataset::{self, Dataset, DatasetSource};
use crate::errors::AppResult;
use crate::executor::AdhocExecutor;
use crate::models::{
    AdhocQueryResult, CompanyOverview, ComparisonEntry, DatasetSummary, FinancialFact, PeriodType, QueryLimits,
    SearchHit, TrendPoint, TrendSeries,
};
use crate::queries;
use std::sync::Arc;

/// Everything the presentation layer calls into: the loaded dataset plus the
/// ad-hoc executor built from it. Cheap to clone and safe to share across
/// concurrent requests.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    dataset: Arc<Dataset>,
    executor: AdhocExecutor,
}

impl QueryEngine {
    pub fn load(source: &DatasetSource, limits: QueryLimits) -> AppResult<Self> {
        let dataset = dataset::load(source)?;
        Self::from_dataset(Arc::new(dataset), limits)
    }

    pub fn from_dataset(dataset: Arc<Dataset>, limits: QueryLimits) -> AppResult<Self> {
        let executor = AdhocExecutor::new(&dataset, limits)?;
        Ok(Self { dataset, executor })
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn limits(&self) -> &QueryLimits {
        self.executor.limits()
    }

    pub fn lookup(
        &self,
        ticker: &str,
        metric_name: &str,
        period_type: Option<PeriodType>,
    ) -> AppResult<Vec<FinancialFact>> {
        queries::lookup(&self.dataset, ticker, metric_name, period_type)
    }

    pub fn trend(&self, ticker: &str, metric_name: &str, period_type: Option<PeriodType>) -> AppResult<Vec<TrendPoint>> {
        queries::trend(&self.dataset, ticker, metric_name, period_type)
    }

    pub fn trend_series(
        &self,
        metric_name: &str,
        tickers: &[String],
        period_type: Option<PeriodType>,
    ) -> AppResult<Vec<TrendSeries>> {
        queries::trend_series(&self.dataset, metric_name, tickers, period_type)
    }

    pub async fn execute(&self, query_text: &str) -> AppResult<AdhocQueryResult> {
        self.executor.execute(query_text).await
    }

    pub fn search(&self, term: &str, limit: usize) -> Vec<SearchHit> {
        queries::search(&self.dataset, term, limit)
    }

    pub fn summary(&self) -> DatasetSummary {
        queries::summary(&self.dataset)
    }

    pub fn companies(&self) -> Vec<CompanyOverview> {
        queries::companies(&self.dataset)
    }

    pub fn metric_names(&self) -> Vec<String> {
        queries::metric_names(&self.dataset)
    }

    pub fn compare(&self, metric_name: &str, period_type: Option<PeriodType>) -> Vec<ComparisonEntry> {
        queries::compare(&self.dataset, metric_name, period_type)
    }
}
