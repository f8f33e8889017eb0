use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use polars::prelude::{DataFrame, IntoLazy, LazyFrame, UnionArgs, col, concat};
use strum::IntoEnumIterator;

use crate::{
    data::{
        domain::{Quarter, Year, YearQuarter},
        layout::{DataLayout, list_parquet},
        record::RecordKind,
    },
    error::{IoError, PipelineResult, polars_err},
    io::{read_parquet, write_parquet},
    polars_ext::ExprExt,
    scheduler::WorkUnit,
    transport::schema::FeedCol,
};

/// One quarter bucket to build: its parsed inputs and its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPlan {
    pub kind: RecordKind,
    pub yq: YearQuarter,
    pub files: Vec<PathBuf>,
    pub dest: PathBuf,
}

impl WorkUnit for BucketPlan {
    fn id(&self) -> String {
        format!("{}:{}", self.kind, self.yq)
    }

    fn artifact(&self) -> Option<PathBuf> {
        Some(self.dest.clone())
    }

    fn inputs(&self) -> Vec<PathBuf> {
        self.files.clone()
    }
}

/// Extracts the month from characters 5-6 of a parsed file name.
pub fn month_of(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let month = name.get(4..6)?;
    if !month.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    month.parse().ok().filter(|m| (1..=12).contains(m))
}

/// Partitions files into exactly four quarter buckets.
///
/// Files without a valid month in their name are dropped with a warning.
pub fn partition_by_quarter(files: Vec<PathBuf>) -> BTreeMap<Quarter, Vec<PathBuf>> {
    let mut buckets: BTreeMap<Quarter, Vec<PathBuf>> =
        Quarter::iter().map(|q| (q, Vec::new())).collect();

    for file in files {
        match month_of(&file).and_then(Quarter::from_month) {
            Some(q) => buckets.entry(q).or_default().push(file),
            None => tracing::warn!(file = %file.display(), "Ignoring file without a valid month"),
        }
    }
    buckets
}

/// Plans the four buckets of `kind` for `year`.
///
/// A year whose parsed directory does not exist yields no plans.
#[tracing::instrument(skip(layout))]
pub fn plan_year(
    layout: &DataLayout,
    kind: RecordKind,
    year: Year,
) -> PipelineResult<Vec<BucketPlan>> {
    let dir = layout.parsed_dir(kind, year);
    let Some(files) = list_parquet(&dir).map_err(|e| {
        IoError::FileSystem(format!("Failed to list {}: {e}", dir.display()))
    })?
    else {
        tracing::warn!(dir = %dir.display(), "No parsed files for year");
        return Ok(Vec::new());
    };

    let plans = partition_by_quarter(files)
        .into_iter()
        .map(|(quarter, files)| {
            let yq = YearQuarter::new(year, quarter);
            BucketPlan {
                kind,
                yq,
                files,
                dest: layout.quarter_file(kind, yq),
            }
        })
        .collect();
    Ok(plans)
}

/// Concatenates the plan's parsed files and writes the bucket. Returns the row count.
///
/// Event buckets keep only rows with a valid root category, stored as an integer
/// in `EventBaseCode`. An empty plan writes an empty table with the bucket schema.
#[tracing::instrument(skip(plan), fields(kind = %plan.kind, quarter = %plan.yq, files = plan.files.len()))]
pub fn write_bucket(plan: &BucketPlan) -> PipelineResult<usize> {
    let mut df = build_bucket(plan.kind, &plan.files)?;
    write_parquet(&mut df, &plan.dest)?;
    tracing::debug!(rows = df.height(), "Wrote quarter bucket");
    Ok(df.height())
}

pub fn build_bucket(kind: RecordKind, files: &[PathBuf]) -> PipelineResult<DataFrame> {
    if files.is_empty() {
        return Ok(DataFrame::empty_with_schema(&kind.bucket_schema()));
    }

    let retained = kind
        .retained()
        .iter()
        .map(|c| col(c.name()))
        .collect::<Vec<_>>();

    let frames = files
        .iter()
        .map(|f| read_parquet(f).map(|df| df.lazy().select(retained.clone())))
        .collect::<PipelineResult<Vec<LazyFrame>>>()?;

    let mut lf = concat(frames, UnionArgs::default())
        .map_err(|e| polars_err(&format!("concatenating {kind} files"), e))?;

    if kind == RecordKind::Event {
        let code = FeedCol::EventBaseCode.name();
        lf = lf
            .with_column(col(code.clone()).cameo_category().alias(code.clone()))
            .filter(col(code).is_not_null());
    }

    lf.collect()
        .map_err(|e| polars_err(&format!("building {kind} bucket"), e))
}
