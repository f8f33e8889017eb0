use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use polars::prelude::{
    CsvWriter, DataFrame, ParquetCompression, ParquetReader, ParquetWriter, SerReader, SerWriter,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::{DataError, IoError, PipelineError, PipelineResult};

// ================================================================================================
// Serde Formats
// ================================================================================================

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    PartialOrd,
    Eq,
    Hash,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    IntoStaticStr,
    Default,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SerdeFormat {
    #[default]
    Postcard,
    Json,
}

impl SerdeFormat {
    pub fn from_path(path: &str) -> PipelineResult<Self> {
        match path
            .rsplit_once('.')
            .ok_or_else(|| err(path, true))?
            .1
            .to_lowercase()
            .as_str()
        {
            "postcard" => Ok(Self::Postcard),
            "json" => Ok(Self::Json),
            ext => Err(err(ext, false)),
        }
    }

    pub fn to_bytes<T: Serialize>(&self, value: &T) -> PipelineResult<Vec<u8>> {
        let bytes = match self {
            Self::Postcard => postcard::to_stdvec(value).map_err(IoError::Postcard)?,
            Self::Json => serde_json::to_vec_pretty(value).map_err(IoError::Json)?,
        };
        Ok(bytes)
    }

    pub fn from_bytes<T: DeserializeOwned>(&self, bytes: &[u8]) -> PipelineResult<T> {
        let value = match self {
            Self::Postcard => postcard::from_bytes(bytes).map_err(IoError::Postcard)?,
            Self::Json => serde_json::from_slice(bytes).map_err(IoError::Json)?,
        };
        Ok(value)
    }
}

fn err(s: &str, missing_extension: bool) -> PipelineError {
    let msg = if missing_extension {
        format!("Unsupported file format: missing or invalid extension in path '{s}'")
    } else {
        format!("Unsupported file format: '{s}'")
    };
    IoError::UnsupportedFormat(msg).into()
}

/// Serializes `value` to `path`, choosing the format from the file extension.
pub fn save<T: Serialize>(value: &T, path: &Path) -> PipelineResult<()> {
    let fmt = SerdeFormat::from_path(&path.to_string_lossy())?;
    let bytes = fmt.to_bytes(value)?;
    write_atomic(path, |w| w.write_all(&bytes).map_err(|e| IoError::Io(e).into()))
}

/// Loads a value written by [`save`].
pub fn load<T: DeserializeOwned>(path: &Path) -> PipelineResult<T> {
    let fmt = SerdeFormat::from_path(&path.to_string_lossy())?;
    let bytes = std::fs::read(path).map_err(|e| {
        IoError::ReadFailed(format!("Failed to read {}: {e}", path.display()))
    })?;
    fmt.from_bytes(&bytes)
}

// ================================================================================================
// Atomic Local Writes
// ================================================================================================

/// Temporary sibling a write goes to before it is renamed into place.
pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Writes through `fill` into a temporary sibling of `path`, then renames it into place.
///
/// Parent directories are created as needed. On failure the temporary file is removed
/// and `path` is left untouched.
pub fn write_atomic<F>(path: &Path, fill: F) -> PipelineResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> PipelineResult<()>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            IoError::FileSystem(format!(
                "Failed to create directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    let tmp = temp_sibling(path);
    let result = File::create(&tmp)
        .map_err(|e| {
            PipelineError::from(IoError::WriteFailed(format!(
                "Failed to create {}: {e}",
                tmp.display()
            )))
        })
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            fill(&mut writer)?;
            writer
                .into_inner()
                .map_err(|e| IoError::WriteFailed(e.to_string()))?
                .sync_all()
                .map_err(IoError::Io)?;
            Ok(())
        })
        .and_then(|()| std::fs::rename(&tmp, path).map_err(|e| IoError::Io(e).into()));

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Whether `artifact` exists and no input was modified after it.
///
/// Unreadable timestamps count as stale.
pub fn is_up_to_date(artifact: &Path, inputs: &[PathBuf]) -> bool {
    let modified = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
    let Some(built) = modified(artifact) else {
        return false;
    };
    inputs
        .iter()
        .all(|input| modified(input).is_some_and(|t| t <= built))
}

// ================================================================================================
// Tables
// ================================================================================================

pub fn write_parquet(df: &mut DataFrame, path: &Path) -> PipelineResult<()> {
    write_atomic(path, |w| {
        ParquetWriter::new(w)
            .with_compression(ParquetCompression::Zstd(None))
            .finish(df)
            .map(|_| ())
            .map_err(|e| {
                IoError::WriteFailed(format!("Parquet to {}: {e}", path.display())).into()
            })
    })
}

pub fn write_csv(df: &mut DataFrame, path: &Path) -> PipelineResult<()> {
    write_atomic(path, |w| {
        CsvWriter::new(w)
            .include_header(true)
            .finish(df)
            .map_err(|e| IoError::WriteFailed(format!("CSV to {}: {e}", path.display())).into())
    })
}

pub fn read_parquet(path: &Path) -> PipelineResult<DataFrame> {
    let file = File::open(path).map_err(|e| {
        IoError::ReadFailed(format!("Failed to open {}: {e}", path.display()))
    })?;
    ParquetReader::new(file).finish().map_err(|e| {
        DataError::DataFrame(format!("Failed to read {}: {e}", path.display())).into()
    })
}
