use std::{collections::BTreeSet, io::Write};

use crate::{
    data::{domain::Year, layout::DataLayout, record::RecordKind},
    error::{IoError, PipelineResult},
    io::write_atomic,
    transport::fetcher::FeedFetcher,
};

/// One raw feed file announced by the master list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedFile {
    pub url: String,
    pub kind: RecordKind,
    pub year: Year,
    /// `YYYYMMDDhhmmss` publication stamp taken from the file name.
    pub stamp: String,
}

impl FeedFile {
    /// Parses one `<size> <hash> <url>` line.
    ///
    /// Lines with fewer fields, unknown feed types or a malformed stamp yield `None`.
    pub fn from_line(line: &str) -> Option<Self> {
        let url = line.split_whitespace().nth(2)?;
        let name = url.rsplit('/').next()?;
        let mut parts = name.split('.');
        let stamp = parts.next()?;
        let kind = RecordKind::from_feed_type(parts.next()?)?;

        if stamp.len() < 14 || !stamp.bytes().take(14).all(|b| b.is_ascii_digit()) {
            return None;
        }
        let stamp = &stamp[..14];
        let year = stamp[..4].parse().ok().map(Year)?;

        Some(Self {
            url: url.to_string(),
            kind,
            year,
            stamp: stamp.to_string(),
        })
    }
}

/// The parsed master file list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MasterList {
    files: Vec<FeedFile>,
}

impl MasterList {
    pub fn parse(text: &str) -> Self {
        let mut skipped = 0usize;
        let files = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| {
                let file = FeedFile::from_line(l);
                skipped += usize::from(file.is_none());
                file
            })
            .collect::<Vec<_>>();
        tracing::debug!(files = files.len(), skipped, "Parsed master list");
        Self { files }
    }

    /// Returns the cached list when `cache` is set and a copy exists; otherwise
    /// fetches it from `url` and refreshes the cached copy.
    #[tracing::instrument(skip(layout, fetcher))]
    pub async fn load<F: FeedFetcher>(
        layout: &DataLayout,
        fetcher: &F,
        url: &str,
        cache: bool,
    ) -> PipelineResult<Self> {
        let path = layout.masterlist();
        if cache && path.is_file() {
            let bytes = tokio::fs::read(&path).await.map_err(|e| {
                IoError::ReadFailed(format!("Failed to read {}: {e}", path.display()))
            })?;
            tracing::info!(path = %path.display(), "Using cached master list");
            return Ok(Self::parse(&String::from_utf8_lossy(&bytes)));
        }

        let bytes = fetcher.fetch(url).await?;
        write_atomic(&path, |w| {
            w.write_all(&bytes).map_err(|e| IoError::Io(e).into())
        })?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "Fetched master list");
        Ok(Self::parse(&String::from_utf8_lossy(&bytes)))
    }

    pub fn files(&self) -> &[FeedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn of(&self, kind: RecordKind, year: Year) -> impl Iterator<Item = &FeedFile> {
        self.files
            .iter()
            .filter(move |f| f.kind == kind && f.year == year)
    }

    pub fn years(&self) -> BTreeSet<Year> {
        self.files.iter().map(|f| f.year).collect()
    }
}
