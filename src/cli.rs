use crate::config::{ConfigOverrides, CONFIG_ENV, DATASET_ENV};
use crate::engine::QueryEngine;
use crate::errors::AppResult;
use crate::models::PeriodType;
use crate::queries::DEFAULT_SEARCH_LIMIT;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "xbrl-lookup", version, about = "Query company financial facts")]
pub struct Cli {
    /// `demo`, an SQLite file, or a JSON/YAML seed file.
    #[arg(long, global = true, env = DATASET_ENV)]
    pub dataset: Option<String>,

    #[arg(long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub max_rows: Option<usize>,

    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Facts for one company and metric, oldest first.
    Lookup {
        ticker: String,
        metric: String,
        #[arg(long, value_parser = parse_period_type)]
        period: Option<PeriodType>,
    },
    /// Time series for one company and metric; needs at least two points.
    Trend {
        ticker: String,
        metric: String,
        #[arg(long, value_parser = parse_period_type)]
        period: Option<PeriodType>,
    },
    /// Time series of a metric for several companies (all when none given).
    Series {
        metric: String,
        tickers: Vec<String>,
        #[arg(long, value_parser = parse_period_type)]
        period: Option<PeriodType>,
    },
    /// Run one read-only SQL statement.
    Query { sql: String },
    Search {
        term: String,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    Summary,
    Companies,
    Metrics,
    /// Latest value of a metric for every company, largest first.
    Compare {
        metric: String,
        #[arg(long, value_parser = parse_period_type)]
        period: Option<PeriodType>,
    },
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            dataset: self.dataset.clone(),
            config_path: self.config.clone(),
            max_rows: self.max_rows,
            timeout_ms: self.timeout_ms,
            log_dir: self.log_dir.clone(),
        }
    }
}

fn parse_period_type(raw: &str) -> Result<PeriodType, String> {
    PeriodType::parse(raw).ok_or_else(|| format!("unknown period type '{}' (use annual or quarterly)", raw))
}

/// Runs one command and returns its JSON rendering.
pub async fn dispatch(engine: &QueryEngine, command: &Command) -> AppResult<String> {
    match command {
        Command::Lookup { ticker, metric, period } => render(&engine.lookup(ticker, metric, *period)?),
        Command::Trend { ticker, metric, period } => render(&engine.trend(ticker, metric, *period)?),
        Command::Series { metric, tickers, period } => render(&engine.trend_series(metric, tickers, *period)?),
        Command::Query { sql } => render(&engine.execute(sql).await?),
        Command::Search { term, limit } => render(&engine.search(term, *limit)),
        Command::Summary => render(&engine.summary()),
        Command::Companies => render(&engine.companies()),
        Command::Metrics => render(&engine.metric_names()),
        Command::Compare { metric, period } => render(&engine.compare(metric, *period)),
    }
}

fn render<T: Serialize>(value: &T) -> AppResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
