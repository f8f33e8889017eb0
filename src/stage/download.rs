use std::path::PathBuf;

use crate::{
    data::{domain::Year, layout::DataLayout, record::RecordKind},
    error::PipelineResult,
    scheduler::{UnitStatus, WorkUnit, WorkerPool},
    stage::parse::parse_feed,
    transport::{
        fetcher::FeedFetcher,
        masterlist::{FeedFile, MasterList},
    },
};

/// Kinds in download order.
pub const DOWNLOAD_ORDER: [RecordKind; 3] =
    [RecordKind::Event, RecordKind::Detail, RecordKind::Mention];

/// One feed file to fetch and parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadUnit {
    pub file: FeedFile,
    pub dest: PathBuf,
}

impl WorkUnit for DownloadUnit {
    fn id(&self) -> String {
        format!("{}:{}", self.file.kind, self.file.stamp)
    }

    fn artifact(&self) -> Option<PathBuf> {
        Some(self.dest.clone())
    }
}

/// One unit per announced file of the configured years, grouped by year then kind.
pub fn plan_downloads(layout: &DataLayout, list: &MasterList, years: &[Year]) -> Vec<DownloadUnit> {
    years
        .iter()
        .flat_map(|&year| DOWNLOAD_ORDER.iter().map(move |&kind| (year, kind)))
        .flat_map(|(year, kind)| list.of(kind, year))
        .map(|file| DownloadUnit {
            dest: layout.parsed_file(file.kind, file.year, &file.stamp),
            file: file.clone(),
        })
        .collect()
}

/// Fetches the raw file, then parses it on the worker pool.
pub async fn download<F: FeedFetcher>(
    unit: DownloadUnit,
    fetcher: F,
    pool: WorkerPool,
) -> PipelineResult<UnitStatus> {
    let raw = fetcher.fetch(&unit.file.url).await?;
    let DownloadUnit { file, dest } = unit;
    let rows = pool.submit(move || parse_feed(&raw, file.kind, &dest)).await?;
    tracing::debug!(rows, "Downloaded feed file");
    Ok(UnitStatus::Done)
}
