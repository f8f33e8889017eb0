use std::path::{Path, PathBuf};

use crate::{
    data::{
        domain::{LookbackDays, Year, YearQuarter},
        record::RecordKind,
    },
    io::SerdeFormat,
};

pub const PARQUET_EXT: &str = "parquet";

/// On-disk layout of every artifact below a data root.
///
/// ```text
/// masterlist/masterfilelist.txt
/// parsed/{kind}/{year}/{YYYYMMDDhhmmss}.parquet
/// quarters/{kind}/{year}-{q}.parquet
/// correlated/{year}-{q}.parquet
/// financial/raw/{name}.csv
/// financial/processed/{name}.parquet
/// financial/processed/scalers/{name}.{fmt}
/// aggregated/{days}/features.{parquet,csv}
/// aggregated/{days}/scaler.{fmt}
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn masterlist(&self) -> PathBuf {
        self.root.join("masterlist").join("masterfilelist.txt")
    }

    pub fn parsed_dir(&self, kind: RecordKind, year: Year) -> PathBuf {
        self.root
            .join("parsed")
            .join(kind.to_string())
            .join(year.to_string())
    }

    pub fn parsed_file(&self, kind: RecordKind, year: Year, stamp: &str) -> PathBuf {
        self.parsed_dir(kind, year)
            .join(format!("{stamp}.{PARQUET_EXT}"))
    }

    pub fn quarter_file(&self, kind: RecordKind, yq: YearQuarter) -> PathBuf {
        self.root
            .join("quarters")
            .join(kind.to_string())
            .join(format!("{yq}.{PARQUET_EXT}"))
    }

    pub fn correlated_dir(&self) -> PathBuf {
        self.root.join("correlated")
    }

    pub fn correlated_file(&self, yq: YearQuarter) -> PathBuf {
        self.correlated_dir().join(format!("{yq}.{PARQUET_EXT}"))
    }

    pub fn financial_raw(&self, name: &str) -> PathBuf {
        self.root.join("financial").join("raw").join(format!("{name}.csv"))
    }

    pub fn financial_processed(&self, name: &str) -> PathBuf {
        self.root
            .join("financial")
            .join("processed")
            .join(format!("{name}.{PARQUET_EXT}"))
    }

    pub fn financial_scaler(&self, name: &str, fmt: SerdeFormat) -> PathBuf {
        self.root
            .join("financial")
            .join("processed")
            .join("scalers")
            .join(format!("{name}.{fmt}"))
    }

    pub fn aggregated_dir(&self, days: LookbackDays) -> PathBuf {
        self.root.join("aggregated").join(days.to_string())
    }

    pub fn features_parquet(&self, days: LookbackDays) -> PathBuf {
        self.aggregated_dir(days)
            .join(format!("features.{PARQUET_EXT}"))
    }

    pub fn features_csv(&self, days: LookbackDays) -> PathBuf {
        self.aggregated_dir(days).join("features.csv")
    }

    pub fn features_scaler(&self, days: LookbackDays, fmt: SerdeFormat) -> PathBuf {
        self.aggregated_dir(days).join(format!("scaler.{fmt}"))
    }
}

/// Lists the finished `.parquet` artifacts of a directory, sorted by file name.
///
/// Temporary siblings and other files are ignored. A missing directory yields `None`.
pub fn list_parquet(dir: &Path) -> std::io::Result<Option<Vec<PathBuf>>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_artifact = path.is_file()
            && path.extension().is_some_and(|e| e == PARQUET_EXT)
            && !path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
        if is_artifact {
            files.push(path);
        }
    }
    files.sort();
    Ok(Some(files))
}
