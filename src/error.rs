use std::path::PathBuf;

use indicatif::style::TemplateError;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Errors raised while retrieving raw feed bytes.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for '{url}'")]
    Status { url: String, status: u16 },

    #[error("Request to '{url}' failed: {msg}")]
    Request { url: String, msg: String },

    #[error("Request to '{url}' timed out")]
    Timeout { url: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Mirror has no file for '{url}' at {path}")]
    MissingMirrorFile { url: String, path: PathBuf },
}

/// Errors raised while decoding a raw feed file into a typed table.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Empty file")]
    EmptyFile,

    #[error("Failed to decompress {format} payload: {msg}")]
    Decompress { format: &'static str, msg: String },

    #[error("Malformed value in column '{column}': '{value}'")]
    MalformedValue { column: String, value: String },

    #[error("Failed to read delimited table: {0}")]
    Table(String),
}

/// Errors related to data frames, columns and domain conversions.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Data frame error: {0}")]
    DataFrame(String),

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Column '{column}' has unexpected type: {msg}")]
    ColumnType { column: String, msg: String },

    #[error("Invalid quarter: {0}")]
    InvalidQuarter(u32),

    #[error("Scaler has no range for column '{0}'")]
    UnknownScalerColumn(String),
}

/// Fatal errors of the feature aggregation. No partial output is written.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("Missing financial series '{name}' at {path}")]
    MissingFinancialSeries { name: String, path: PathBuf },

    #[error("Corrupt correlated file {path}: {msg}")]
    CorruptCorrelated { path: PathBuf, msg: String },

    #[error("No correlated files found in {0}")]
    NoCorrelatedData(PathBuf),

    #[error("Aggregation produced no rows after dropping {warmup} warm-up rows")]
    EmptyMatrix { warmup: usize },
}

/// Errors related to file I/O and serialization.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("Postcard serialization failed")]
    Postcard(#[from] postcard::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Failed to write data: {0}")]
    WriteFailed(String),

    #[error("Failed to read data: {0}")]
    ReadFailed(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid pipeline configuration: {0}")]
    Invalid(String),

    #[error("Failed to load configuration from {path}: {msg}")]
    Load { path: PathBuf, msg: String },
}

/// Errors related to the runtime itself: worker pools, tasks, progress rendering.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("Task join error: {0}")]
    Join(String),

    #[error("Progress bar error")]
    ProgressBar(#[from] TemplateError),

    #[error("System error: {0}")]
    Generic(String),
}

impl PipelineError {
    /// Short, stable label used in stage summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Parse(_) => "parse",
            Self::Data(_) => "data",
            Self::Aggregation(_) => "aggregation",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
            Self::System(_) => "system",
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(IoError::Io(value))
    }
}

pub(crate) fn polars_err(context: &str, e: polars::error::PolarsError) -> PipelineError {
    DataError::DataFrame(format!("{context}: {e}")).into()
}
