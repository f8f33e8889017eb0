use std::path::PathBuf;

use itertools::Itertools;
use polars::prelude::{
    DataFrame, DataType, IntoLazy, JoinArgs, JoinType, LazyFrame, SortMultipleOptions, TimeUnit,
    UnionArgs, col, concat, len, lit,
};

use crate::{
    data::{
        domain::{MILLIS_PER_DAY, YearQuarter},
        layout::DataLayout,
        record::RecordKind,
    },
    error::{PipelineResult, polars_err},
    io::{read_parquet, write_parquet},
    polars_ext::ExprExt,
    scheduler::{UnitStatus, WorkUnit},
    transport::schema::{CORRELATED_KEYS, CORRELATED_VALUES, FeedCol},
};

const MENTION_TIME: &str = "MentionTime";

/// Inputs of one correlation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationPlan {
    pub yq: YearQuarter,
    pub events: PathBuf,
    pub mentions: Vec<PathBuf>,
    pub details: Vec<PathBuf>,
    pub dest: PathBuf,
}

/// Whether a quarter can be correlated yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready(CorrelationPlan),
    /// Upstream buckets are missing; lists what is absent.
    NotReady(Vec<PathBuf>),
}

/// One quarter to correlate. Readiness is decided when the unit runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelateUnit {
    pub layout: DataLayout,
    pub yq: YearQuarter,
    pub require_following: bool,
    pub recency_days: u32,
}

impl WorkUnit for CorrelateUnit {
    fn id(&self) -> String {
        self.yq.to_string()
    }

    fn artifact(&self) -> Option<PathBuf> {
        Some(self.layout.correlated_file(self.yq))
    }

    /// Every bucket the quarter reads, including the following quarter's when present.
    fn inputs(&self) -> Vec<PathBuf> {
        let next = self.yq.next();
        [
            self.layout.quarter_file(RecordKind::Event, self.yq),
            self.layout.quarter_file(RecordKind::Mention, self.yq),
            self.layout.quarter_file(RecordKind::Detail, self.yq),
            self.layout.quarter_file(RecordKind::Mention, next),
            self.layout.quarter_file(RecordKind::Detail, next),
        ]
        .into_iter()
        .filter(|p| p.is_file())
        .collect()
    }
}

impl CorrelateUnit {
    /// Correlates the quarter, or reports which buckets are still missing.
    pub fn run(&self) -> PipelineResult<UnitStatus> {
        match plan_quarter(&self.layout, self.yq, self.require_following) {
            Readiness::NotReady(missing) => {
                let missing = missing.iter().map(|p| p.display()).join(", ");
                Ok(UnitStatus::NotReady(format!("missing {missing}")))
            }
            Readiness::Ready(plan) => {
                write_correlated(&plan, self.recency_days)?;
                Ok(UnitStatus::Done)
            }
        }
    }
}

/// Checks the buckets a quarter needs.
///
/// The quarter's own event, mention and detail buckets are required. Mention and
/// detail buckets of the following quarter are included when present, so coverage
/// that crosses the boundary is caught. With `require_following` they are required too.
pub fn plan_quarter(layout: &DataLayout, yq: YearQuarter, require_following: bool) -> Readiness {
    let next = yq.next();
    let events = layout.quarter_file(RecordKind::Event, yq);
    let mentions = layout.quarter_file(RecordKind::Mention, yq);
    let details = layout.quarter_file(RecordKind::Detail, yq);
    let next_mentions = layout.quarter_file(RecordKind::Mention, next);
    let next_details = layout.quarter_file(RecordKind::Detail, next);

    let mut required = vec![&events, &mentions, &details];
    if require_following {
        required.extend([&next_mentions, &next_details]);
    }
    let missing = required
        .into_iter()
        .filter(|p| !p.is_file())
        .cloned()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Readiness::NotReady(missing);
    }

    let mut mention_files = vec![mentions];
    if next_mentions.is_file() {
        mention_files.push(next_mentions);
    }
    let mut detail_files = vec![details];
    if next_details.is_file() {
        detail_files.push(next_details);
    }

    Readiness::Ready(CorrelationPlan {
        yq,
        events,
        mentions: mention_files,
        details: detail_files,
        dest: layout.correlated_file(yq),
    })
}

/// Runs the plan and writes the correlated table. Returns the row count.
#[tracing::instrument(skip(plan), fields(quarter = %plan.yq))]
pub fn write_correlated(plan: &CorrelationPlan, recency_days: u32) -> PipelineResult<usize> {
    let events = read_parquet(&plan.events)?;
    let mentions = concat_files(&plan.mentions)?;
    let details = concat_files(&plan.details)?;

    let mut df = correlate(events, mentions, details, recency_days)?;
    write_parquet(&mut df, &plan.dest)?;
    tracing::debug!(rows = df.height(), "Wrote correlated quarter");
    Ok(df.height())
}

fn concat_files(files: &[PathBuf]) -> PipelineResult<LazyFrame> {
    let frames = files
        .iter()
        .map(|f| read_parquet(f).map(IntoLazy::lazy))
        .collect::<PipelineResult<Vec<_>>>()?;
    concat(frames, UnionArgs::default()).map_err(|e| polars_err("concatenating buckets", e))
}

/// Joins events to their mentions within the recency window and to the mentioned
/// documents, then aggregates per event key.
///
/// Mentions outside `[event_time, event_time + recency_days]` never contribute.
/// Mentions without a matching document count towards `MentionsCount` with zero
/// sentiment sums. The result is sorted by `(Time, GlobalEventID)` and then the
/// remaining keys so re-runs write identical files.
pub fn correlate(
    events: DataFrame,
    mentions: LazyFrame,
    details: LazyFrame,
    recency_days: u32,
) -> PipelineResult<DataFrame> {
    let id = FeedCol::GlobalEventId.name();
    let time = FeedCol::Time.name();
    let window_ms = i64::from(recency_days) * MILLIS_PER_DAY;

    let events = events.lazy().select([
        col(id.clone()),
        col(FeedCol::SqlDate.name()).compact_date_ms().alias(time.clone()),
        col(FeedCol::EventBaseCode.name()).cast(DataType::Int64),
        col(FeedCol::QuadClass.name()),
        col(FeedCol::GoldsteinScale.name()),
        col(FeedCol::ActionGeoCountryCode.name()),
    ]);

    let mentions = mentions.select([
        col(id.clone()),
        col(FeedCol::MentionTimeDate.name())
            .compact_timestamp_ms()
            .alias(MENTION_TIME),
        col(FeedCol::MentionIdentifier.name()),
    ]);

    let details = details.select([
        col(FeedCol::DocumentIdentifier.name()),
        col(FeedCol::WordCount.name()),
        col(FeedCol::Negative.name()),
        col(FeedCol::Positive.name()),
        col(FeedCol::Finance.name()),
    ]);

    let in_window = col(MENTION_TIME)
        .gt_eq(col(time.clone()))
        .and(col(MENTION_TIME).lt_eq(col(time.clone()) + lit(window_ms)));

    let keys = CORRELATED_KEYS.iter().map(|c| col(c.name())).collect::<Vec<_>>();
    let ordered = CORRELATED_KEYS
        .iter()
        .chain(&CORRELATED_VALUES)
        .map(|c| col(c.name()))
        .collect::<Vec<_>>();
    // Time first, then the event id and the remaining keys.
    let mut sort_by = CORRELATED_KEYS.iter().map(|c| c.name()).collect::<Vec<_>>();
    sort_by.swap(0, 1);

    events
        .join(
            mentions,
            [col(id.clone())],
            [col(id.clone())],
            JoinArgs::new(JoinType::Inner),
        )
        .filter(in_window)
        .join(
            details,
            [col(FeedCol::MentionIdentifier.name())],
            [col(FeedCol::DocumentIdentifier.name())],
            JoinArgs::new(JoinType::Left),
        )
        .group_by(keys)
        .agg([
            len()
                .cast(DataType::Int64)
                .alias(FeedCol::MentionsCount.name()),
            col(FeedCol::WordCount.name()).sum(),
            col(FeedCol::Negative.name()).sum(),
            col(FeedCol::Positive.name()).sum(),
            col(FeedCol::Finance.name()).sum(),
        ])
        .with_column(
            col(time.clone())
                .cast(DataType::Datetime(TimeUnit::Milliseconds, None))
                .alias(time),
        )
        .select(ordered)
        .sort(
            sort_by,
            SortMultipleOptions::default()
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .collect()
        .map_err(|e| polars_err("correlating events", e))
}
