use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    data::domain::{LookbackDays, Year},
    error::{ConfigError, PipelineResult},
    io::SerdeFormat,
};

pub const DEFAULT_MASTERLIST_URL: &str = "http://data.gdeltproject.org/gdeltv2/masterfilelist.txt";

/// Top-level configuration of a pipeline run.
///
/// Loaded from JSON (every field optional) or assembled with the `with_*` builders.
///
/// # Example
/// ```
/// use gdelt_features::config::PipelineConfig;
///
/// let cfg = PipelineConfig::default()
///     .with_data_root("/tmp/gdelt")
///     .with_years([2024])
///     .with_lookbacks([1, 3])
///     .with_cache(false);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory every artifact lives under.
    data_root: PathBuf,
    /// Skip units whose artifact already exists.
    cache: bool,
    years: Vec<u16>,
    /// Instrument names; each needs `financial/raw/{name}.csv`.
    instruments: Vec<String>,
    lookbacks: Vec<u32>,
    limits: StageLimits,
    fetch: FetchConfig,

    // === Aggregation ===
    /// First day the rolling scan may emit.
    scan_start: NaiveDate,
    /// Leading rows dropped from every feature matrix.
    warmup_rows: usize,

    // === Correlation ===
    /// Mentions later than this after their event do not count.
    recency_days: u32,
    /// Also wait for the following quarter's buckets before correlating.
    require_following_quarter: bool,

    scaler_format: SerdeFormat,
}

/// In-flight unit bounds per stage plus the size of the CPU worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageLimits {
    pub download: usize,
    pub bucket: usize,
    pub correlate: usize,
    pub financial: usize,
    /// `None` uses the machine's available parallelism.
    pub workers: Option<usize>,
}

impl Default for StageLimits {
    fn default() -> Self {
        Self {
            download: 10,
            bucket: 10,
            correlate: 2,
            financial: 16,
            workers: None,
        }
    }
}

impl StageLimits {
    pub fn worker_threads(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub masterlist_url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            masterlist_url: DEFAULT_MASTERLIST_URL.to_string(),
            request_timeout_secs: 300,
            connect_timeout_secs: 30,
            user_agent: format!("gdelt-features/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            cache: true,
            years: (2021..=2025).collect(),
            instruments: vec!["spx".to_string(), "btc".to_string()],
            lookbacks: vec![1, 2, 3, 5, 8, 13],
            limits: StageLimits::default(),
            fetch: FetchConfig::default(),
            scan_start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            warmup_rows: 14,
            recency_days: 7,
            require_following_quarter: false,
            scaler_format: SerdeFormat::default(),
        }
    }
}

// ================================================================================================
// Loading & Validation
// ================================================================================================

impl PipelineConfig {
    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            msg: e.to_string(),
        })?;
        let cfg = serde_json::from_str(&text).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            msg: e.to_string(),
        })?;
        Ok(cfg)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        let invalid = |msg: String| -> PipelineResult<()> { Err(ConfigError::Invalid(msg).into()) };

        if self.years.is_empty() {
            return invalid("at least one year is required".to_string());
        }
        if let Some(y) = self.years.iter().find(|y| !(1970..=9999).contains(*y)) {
            return invalid(format!("year {y} is out of range"));
        }
        if let Some(d) = self.lookbacks.iter().find(|d| **d == 0) {
            return invalid(format!("lookback must be positive, got {d}"));
        }
        for name in &self.instruments {
            if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
                return invalid(format!("instrument name '{name}' is not a valid file stem"));
            }
        }
        if self.instruments.iter().collect::<BTreeSet<_>>().len() != self.instruments.len() {
            return invalid("instrument names must be unique".to_string());
        }
        let l = &self.limits;
        if [l.download, l.bucket, l.correlate, l.financial].contains(&0) {
            return invalid("stage limits must be positive".to_string());
        }
        if l.workers == Some(0) {
            return invalid("worker pool needs at least one thread".to_string());
        }
        if self.recency_days == 0 {
            return invalid("recency window must be at least one day".to_string());
        }
        if self.fetch.request_timeout_secs == 0 || self.fetch.connect_timeout_secs == 0 {
            return invalid("fetch timeouts must be positive".to_string());
        }
        Ok(())
    }
}

// ================================================================================================
// Builder Methods
// ================================================================================================

impl PipelineConfig {
    pub fn with_data_root(self, data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            ..self
        }
    }

    pub fn with_cache(self, cache: bool) -> Self {
        Self { cache, ..self }
    }

    pub fn with_years(self, years: impl IntoIterator<Item = u16>) -> Self {
        Self {
            years: years.into_iter().collect(),
            ..self
        }
    }

    pub fn with_instruments<S: Into<String>>(self, names: impl IntoIterator<Item = S>) -> Self {
        Self {
            instruments: names.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_lookbacks(self, lookbacks: impl IntoIterator<Item = u32>) -> Self {
        Self {
            lookbacks: lookbacks.into_iter().collect(),
            ..self
        }
    }

    pub fn with_limits(self, limits: StageLimits) -> Self {
        Self { limits, ..self }
    }

    pub fn with_fetch(self, fetch: FetchConfig) -> Self {
        Self { fetch, ..self }
    }

    pub fn with_scan_start(self, scan_start: NaiveDate) -> Self {
        Self { scan_start, ..self }
    }

    pub fn with_warmup_rows(self, warmup_rows: usize) -> Self {
        Self {
            warmup_rows,
            ..self
        }
    }

    pub fn with_recency_days(self, recency_days: u32) -> Self {
        Self {
            recency_days,
            ..self
        }
    }

    pub fn with_require_following_quarter(self, require: bool) -> Self {
        Self {
            require_following_quarter: require,
            ..self
        }
    }

    pub fn with_scaler_format(self, scaler_format: SerdeFormat) -> Self {
        Self {
            scaler_format,
            ..self
        }
    }
}

// ================================================================================================
// Accessors
// ================================================================================================

impl PipelineConfig {
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn cache(&self) -> bool {
        self.cache
    }

    /// Configured years, deduplicated and ascending.
    pub fn years(&self) -> Vec<Year> {
        self.years
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(Year)
            .collect()
    }

    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    pub fn lookbacks(&self) -> Vec<LookbackDays> {
        self.lookbacks.iter().copied().map(LookbackDays).collect()
    }

    pub fn limits(&self) -> &StageLimits {
        &self.limits
    }

    pub fn fetch(&self) -> &FetchConfig {
        &self.fetch
    }

    pub fn scan_start(&self) -> NaiveDate {
        self.scan_start
    }

    pub fn warmup_rows(&self) -> usize {
        self.warmup_rows
    }

    pub fn recency_days(&self) -> u32 {
        self.recency_days
    }

    pub fn require_following_quarter(&self) -> bool {
        self.require_following_quarter
    }

    pub fn scaler_format(&self) -> SerdeFormat {
        self.scaler_format
    }
}
