use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::{
    Column, DataFrame, IntoLazy, JoinArgs, JoinType, LazyFrame, SortMultipleOptions, col,
};
use strum::IntoEnumIterator;

use crate::{
    data::{
        domain::{Category, EpochDay, LookbackDays},
        layout::{DataLayout, list_parquet},
    },
    error::{AggregationError, IoError, PipelineResult, polars_err},
    io::{SerdeFormat, read_parquet, save, write_csv, write_parquet},
    math::{
        scaler::MinMaxScaler,
        window::{CorrelatedRow, DailyFeatureVector, RollingAggregator},
    },
    polars_ext::DataFrameExt,
    transport::schema::{FeatureMetric, FeedCol, feature_column},
};

const REQUIRED: [FeedCol; 8] = [
    FeedCol::Time,
    FeedCol::EventBaseCode,
    FeedCol::GoldsteinScale,
    FeedCol::MentionsCount,
    FeedCol::WordCount,
    FeedCol::Negative,
    FeedCol::Positive,
    FeedCol::Finance,
];

/// Everything one lookback run reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatePlan {
    pub lookback: LookbackDays,
    pub series: Vec<(String, PathBuf)>,
    pub correlated_dir: PathBuf,
    pub features_parquet: PathBuf,
    pub features_csv: PathBuf,
    pub scaler: PathBuf,
    pub scan_start: NaiveDate,
    pub warmup_rows: usize,
}

impl AggregatePlan {
    pub fn new(
        layout: &DataLayout,
        instruments: &[String],
        lookback: LookbackDays,
        scan_start: NaiveDate,
        warmup_rows: usize,
        fmt: SerdeFormat,
    ) -> Self {
        Self {
            lookback,
            series: instruments
                .iter()
                .map(|name| (name.clone(), layout.financial_processed(name)))
                .collect(),
            correlated_dir: layout.correlated_dir(),
            features_parquet: layout.features_parquet(lookback),
            features_csv: layout.features_csv(lookback),
            scaler: layout.features_scaler(lookback, fmt),
            scan_start,
            warmup_rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrixSummary {
    pub lookback: LookbackDays,
    pub rows: usize,
    pub columns: usize,
    pub first_day: Option<NaiveDate>,
    pub last_day: Option<NaiveDate>,
    pub path: PathBuf,
}

impl std::fmt::Display for FeatureMatrixSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lookback {}: {} rows x {} columns",
            self.lookback, self.rows, self.columns
        )?;
        if let (Some(first), Some(last)) = (self.first_day, self.last_day) {
            write!(f, " ({first} .. {last})")?;
        }
        write!(f, " -> {}", self.path.display())
    }
}

/// Builds the feature matrix of one lookback and persists it with its scaler.
///
/// Every input is read and every step computed before the first artifact is written.
#[tracing::instrument(skip_all, fields(lookback = %plan.lookback))]
pub fn aggregate(plan: &AggregatePlan) -> PipelineResult<FeatureMatrixSummary> {
    let series = plan
        .series
        .iter()
        .map(|(name, path)| load_series(name, path))
        .collect::<PipelineResult<Vec<_>>>()?;

    let vectors = roll_correlated(plan)?;
    let features = feature_frame(&vectors)?;
    if features.height() <= plan.warmup_rows {
        return Err(AggregationError::EmptyMatrix {
            warmup: plan.warmup_rows,
        }
        .into());
    }
    let first_day = vectors.get(plan.warmup_rows).and_then(|v| v.day.date());
    let last_day = vectors.last().and_then(|v| v.day.date());
    let features = features.slice(plan.warmup_rows as i64, usize::MAX);

    let matrix = join_targets(features, series)?;
    let mentions = Category::all()
        .map(|c| feature_column(c.get(), FeatureMetric::TotalMentions))
        .collect::<Vec<_>>();
    let mention_refs = mentions.iter().map(String::as_str).collect::<Vec<_>>();
    let (scaler, mut matrix) = MinMaxScaler::fit_transform(matrix, &mention_refs)?;

    write_parquet(&mut matrix, &plan.features_parquet)?;
    write_csv(&mut matrix, &plan.features_csv)?;
    save(&scaler, &plan.scaler)?;

    let summary = FeatureMatrixSummary {
        lookback: plan.lookback,
        rows: matrix.height(),
        columns: matrix.width(),
        first_day,
        last_day,
        path: plan.features_parquet.clone(),
    };
    tracing::info!(%summary, "Wrote feature matrix");
    Ok(summary)
}

fn load_series(name: &str, path: &Path) -> PipelineResult<LazyFrame> {
    if !path.is_file() {
        return Err(AggregationError::MissingFinancialSeries {
            name: name.to_string(),
            path: path.to_path_buf(),
        }
        .into());
    }
    let df = read_parquet(path)?;
    df.require_columns(&[FeedCol::Timestamp, FeedCol::CloseToClose])?;
    Ok(df.lazy().select([
        col(FeedCol::Timestamp.name()),
        col(FeedCol::CloseToClose.name()).alias(name),
    ]))
}

/// Runs the rolling aggregation over every correlated file in name order.
///
/// Empty files are skipped, so the latest non-empty file is the one cut at its
/// maximum time.
pub fn roll_correlated(plan: &AggregatePlan) -> PipelineResult<Vec<DailyFeatureVector>> {
    let dir = &plan.correlated_dir;
    let files = list_parquet(dir)
        .map_err(|e| IoError::FileSystem(format!("Failed to list {}: {e}", dir.display())))?
        .filter(|files| !files.is_empty())
        .ok_or_else(|| AggregationError::NoCorrelatedData(dir.clone()))?;

    let mut populated = Vec::with_capacity(files.len());
    for path in &files {
        let rows = read_correlated(path)?;
        if rows.is_empty() {
            tracing::warn!(file = %path.display(), "Skipping empty correlated file");
            continue;
        }
        populated.push((path, rows));
    }

    let mut agg = RollingAggregator::new(plan.lookback, EpochDay::from_date(plan.scan_start));
    let last = populated.len().saturating_sub(1);
    for (i, (path, rows)) in populated.into_iter().enumerate() {
        tracing::debug!(file = %path.display(), rows = rows.len(), "Rolling correlated file");
        agg.push_file(rows, i == last);
    }
    Ok(agg.finish())
}

/// Reads one correlated table into rows. Rows without a time are dropped.
pub fn read_correlated(path: &Path) -> PipelineResult<Vec<CorrelatedRow>> {
    let corrupt = |msg: String| AggregationError::CorruptCorrelated {
        path: path.to_path_buf(),
        msg,
    };
    let df = read_parquet(path).map_err(|e| corrupt(e.to_string()))?;
    df.require_columns(&REQUIRED)
        .map_err(|e| corrupt(e.to_string()))?;

    let read = |c: FeedCol| df.i64_values(c).map_err(|e| corrupt(e.to_string()));
    let time = read(FeedCol::Time)?;
    let category = read(FeedCol::EventBaseCode)?;
    let mentions = read(FeedCol::MentionsCount)?;
    let words = read(FeedCol::WordCount)?;
    let negative = read(FeedCol::Negative)?;
    let positive = read(FeedCol::Positive)?;
    let finance = read(FeedCol::Finance)?;
    let goldstein = df
        .f64_values(FeedCol::GoldsteinScale)
        .map_err(|e| corrupt(e.to_string()))?;

    let rows = (0..df.height())
        .filter_map(|i| {
            Some(CorrelatedRow {
                time_ms: time[i]?,
                category: category[i].and_then(Category::new),
                goldstein: goldstein[i],
                mentions: mentions[i].unwrap_or(0),
                word_count: words[i].unwrap_or(0),
                negative: negative[i].unwrap_or(0),
                positive: positive[i].unwrap_or(0),
                finance: finance[i].unwrap_or(0),
            })
        })
        .collect();
    Ok(rows)
}

/// Lays the vectors out as `{c}_{metric}` columns for categories 1..=20, then `Timestamp`.
pub fn feature_frame(vectors: &[DailyFeatureVector]) -> PipelineResult<DataFrame> {
    let mut columns = Vec::with_capacity(Category::all().count() * 5 + 1);
    for category in Category::all() {
        let stats = vectors.iter().map(|v| v.stats(category)).collect::<Vec<_>>();
        for metric in FeatureMetric::iter() {
            let name = feature_column(category.get(), metric);
            let column = match metric {
                FeatureMetric::TotalMentions => Column::new(
                    name.into(),
                    stats.iter().map(|s| s.total_mentions).collect::<Vec<_>>(),
                ),
                FeatureMetric::Goldstein => {
                    Column::new(name.into(), stats.iter().map(|s| s.goldstein).collect::<Vec<_>>())
                }
                FeatureMetric::Positive => {
                    Column::new(name.into(), stats.iter().map(|s| s.positive).collect::<Vec<_>>())
                }
                FeatureMetric::Negative => {
                    Column::new(name.into(), stats.iter().map(|s| s.negative).collect::<Vec<_>>())
                }
                FeatureMetric::Finance => {
                    Column::new(name.into(), stats.iter().map(|s| s.finance).collect::<Vec<_>>())
                }
            };
            columns.push(column);
        }
    }
    columns.push(Column::new(
        FeedCol::Timestamp.name(),
        vectors.iter().map(|v| v.day.timestamp()).collect::<Vec<_>>(),
    ));
    DataFrame::new(columns).map_err(|e| polars_err("assembling feature frame", e))
}

/// Left-joins every target series on `Timestamp`, orders by it, then drops it.
fn join_targets(features: DataFrame, series: Vec<LazyFrame>) -> PipelineResult<DataFrame> {
    let ts = FeedCol::Timestamp.name();
    let mut lf = features.lazy();
    for target in series {
        lf = lf.join(
            target,
            [col(ts.clone())],
            [col(ts.clone())],
            JoinArgs::new(JoinType::Left),
        );
    }
    let mut df = lf
        .sort(vec![ts.clone()], SortMultipleOptions::default().with_maintain_order(true))
        .collect()
        .map_err(|e| polars_err("joining financial targets", e))?;
    df.drop_in_place(ts.as_str())
        .map_err(|e| polars_err("dropping timestamp", e))?;
    Ok(df)
}
