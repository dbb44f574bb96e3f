use crate::dataset::DatasetSource;
use crate::errors::{AppError, AppResult};
use crate::models::QueryLimits;
use crate::policy::QueryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DATASET_ENV: &str = "XBRL_LOOKUP_DATASET";
pub const CONFIG_ENV: &str = "XBRL_LOOKUP_CONFIG";
pub const DEFAULT_DATASET: &str = "demo";

/// Optional YAML config file. Every field falls back to the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
    pub dataset: Option<String>,
    pub max_rows: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub max_query_bytes: Option<usize>,
    pub log_dir: Option<PathBuf>,
}

impl ConfigFile {
    pub fn read(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|error| AppError::Config(format!("Unable to read config '{}': {}", path.display(), error)))?;
        serde_yaml::from_str(&raw)
            .map_err(|error| AppError::Config(format!("Invalid config '{}': {}", path.display(), error)))
    }
}

/// Values given on the command line (or their environment fallbacks). These
/// win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub dataset: Option<String>,
    pub config_path: Option<PathBuf>,
    pub max_rows: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub dataset: DatasetSource,
    pub limits: QueryLimits,
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetSource::Demo,
            limits: QueryLimits::default(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    pub fn resolve(overrides: ConfigOverrides) -> AppResult<Self> {
        let (file, base_dir) = match &overrides.config_path {
            Some(path) => (ConfigFile::read(path)?, path.parent().map(Path::to_path_buf)),
            None => (ConfigFile::default(), None),
        };

        let dataset = match (overrides.dataset, file.dataset) {
            (Some(location), _) => DatasetSource::from_location(&location)?,
            (None, Some(location)) => relative_to(DatasetSource::from_location(&location)?, base_dir.as_deref()),
            (None, None) => DatasetSource::from_location(DEFAULT_DATASET)?,
        };

        let defaults = QueryLimits::default();
        let limits = QueryLimits {
            max_rows: overrides.max_rows.or(file.max_rows).unwrap_or(defaults.max_rows),
            timeout_ms: overrides.timeout_ms.or(file.timeout_ms).unwrap_or(defaults.timeout_ms),
            max_query_bytes: file.max_query_bytes.unwrap_or(defaults.max_query_bytes),
        };
        QueryPolicy::validate_limits(&limits)?;

        Ok(Self {
            dataset,
            limits,
            log_dir: overrides.log_dir.or(file.log_dir),
        })
    }
}

/// Dataset paths written in a config file are relative to that file.
fn relative_to(source: DatasetSource, base_dir: Option<&Path>) -> DatasetSource {
    let Some(base_dir) = base_dir else {
        return source;
    };
    let rebase = |path: PathBuf| {
        if path.is_absolute() {
            path
        } else {
            base_dir.join(path)
        }
    };
    match source {
        DatasetSource::Demo => DatasetSource::Demo,
        DatasetSource::Sqlite(path) => DatasetSource::Sqlite(rebase(path)),
        DatasetSource::Json(path) => DatasetSource::Json(rebase(path)),
        DatasetSource::Yaml(path) => DatasetSource::Yaml(rebase(path)),
    }
}
