use crate::store::{EXAM_HEADERS, FINANCIAL_HEADERS, MAIN_HEADERS};
use crate::validate::DuplicatePolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_CONFIG: &str = "SCHOOLD_CONFIG";
pub const ENV_STORE_PATH: &str = "SCHOOLD_STORE_PATH";
pub const ENV_MODEL_PATH: &str = "SCHOOLD_MODEL_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: StoreConfig,
    pub validation: ValidationConfig,
    pub forecast: ForecastConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
    pub main_sheet: String,
    pub financial_sheet: String,
    pub exams_sheet: String,
    /// Service-account key for hosted sheet backends. The SQLite store
    /// ignores it.
    pub credentials_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            main_sheet: "full-dataset".to_string(),
            financial_sheet: "financial-dataset".to_string(),
            exams_sheet: "exams-dataset".to_string(),
            credentials_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    /// Reject entries whose first `n` cells match an existing row. Unset
    /// disables duplicate detection.
    pub duplicate_prefix: Option<usize>,
}

impl ValidationConfig {
    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        match self.duplicate_prefix {
            Some(n) if n > 0 => DuplicatePolicy::Prefix(n),
            _ => DuplicatePolicy::Disabled,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    pub model_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetNames {
    pub main: String,
    pub financial: String,
    pub exams: String,
}

impl SheetNames {
    /// Sheet name paired with its positional header.
    pub fn layouts(&self) -> Vec<(&str, &[&str])> {
        vec![
            (self.main.as_str(), &MAIN_HEADERS[..]),
            (self.financial.as_str(), &FINANCIAL_HEADERS[..]),
            (self.exams.as_str(), &EXAM_HEADERS[..]),
        ]
    }
}

impl Default for SheetNames {
    fn default() -> Self {
        StoreConfig::default().sheet_names()
    }
}

impl StoreConfig {
    pub fn sheet_names(&self) -> SheetNames {
        SheetNames {
            main: self.main_sheet.clone(),
            financial: self.financial_sheet.clone(),
            exams: self.exams_sheet.clone(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Applies `SCHOOLD_*` overrides through `lookup` (normally
    /// `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_STORE_PATH).filter(|v| !v.is_empty()) {
            self.store.path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup(ENV_MODEL_PATH).filter(|v| !v.is_empty()) {
            self.forecast.model_path = Some(PathBuf::from(v));
        }
    }
}
