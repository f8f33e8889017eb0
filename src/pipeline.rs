use std::fmt;

use strum::IntoEnumIterator;

use crate::{
    config::PipelineConfig,
    data::{
        domain::{Quarter, YearQuarter},
        layout::DataLayout,
        record::RecordKind,
    },
    error::PipelineResult,
    scheduler::{Scheduler, StageOptions, StageReport, UnitStatus},
    stage::{
        aggregate::{AggregatePlan, FeatureMatrixSummary, aggregate},
        bucket::{BucketPlan, plan_year, write_bucket},
        correlate::CorrelateUnit,
        download::{download, plan_downloads},
        financial::{FinancialPlan, write_series},
    },
    transport::{fetcher::FeedFetcher, masterlist::MasterList},
};

/// Kinds in bucketing order.
pub const BUCKET_ORDER: [RecordKind; 3] = [RecordKind::Event, RecordKind::Detail, RecordKind::Mention];

/// Reports of every stage of one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub stages: Vec<StageReport>,
    pub matrices: Vec<FeatureMatrixSummary>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn failed_units(&self) -> usize {
        self.stages.iter().map(StageReport::failed).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stage in &self.stages {
            writeln!(f, "{}", stage.summary())?;
            for failure in &stage.failures {
                writeln!(f, "  failed {} [{}]: {}", failure.unit, failure.error.kind(), failure.error)?;
            }
        }
        for matrix in &self.matrices {
            writeln!(f, "{matrix}")?;
        }
        if self.cancelled {
            writeln!(f, "run cancelled")?;
        }
        Ok(())
    }
}

/// Drives the stages over one data root.
#[derive(Debug, Clone)]
pub struct Pipeline<F: FeedFetcher> {
    config: PipelineConfig,
    layout: DataLayout,
    fetcher: F,
    scheduler: Scheduler,
}

impl<F: FeedFetcher> Pipeline<F> {
    pub fn new(config: PipelineConfig, fetcher: F, scheduler: Scheduler) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            layout: DataLayout::new(config.data_root()),
            config,
            fetcher,
            scheduler,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn cancelled(&self) -> bool {
        self.scheduler.cancellation().is_cancelled()
    }

    pub async fn masterlist(&self) -> PipelineResult<MasterList> {
        let list = MasterList::load(
            &self.layout,
            &self.fetcher,
            &self.config.fetch().masterlist_url,
            self.config.cache(),
        )
        .await?;
        tracing::info!(files = list.len(), years = list.years().len(), "Master list ready");
        Ok(list)
    }

    pub async fn download(&self, list: &MasterList) -> PipelineResult<StageReport> {
        let units = plan_downloads(&self.layout, list, &self.config.years());
        let opts = StageOptions::new("download", self.config.limits().download, self.config.cache());
        let fetcher = self.fetcher.clone();
        self.scheduler
            .run_stage(opts, units, move |unit, pool| {
                download(unit, fetcher.clone(), pool)
            })
            .await
    }

    pub async fn bucket(&self, kind: RecordKind) -> PipelineResult<StageReport> {
        let mut units = Vec::new();
        for year in self.config.years() {
            units.extend(plan_year(&self.layout, kind, year)?);
        }
        let opts = StageOptions::new(
            format!("bucket {kind}"),
            self.config.limits().bucket,
            self.config.cache(),
        );
        self.scheduler
            .run_stage(opts, units, |plan: BucketPlan, pool| async move {
                pool.submit(move || write_bucket(&plan)).await?;
                Ok(UnitStatus::Done)
            })
            .await
    }

    pub async fn correlate(&self) -> PipelineResult<StageReport> {
        let units = self
            .config
            .years()
            .into_iter()
            .flat_map(|year| Quarter::iter().map(move |q| YearQuarter::new(year, q)))
            .map(|yq| CorrelateUnit {
                layout: self.layout.clone(),
                yq,
                require_following: self.config.require_following_quarter(),
                recency_days: self.config.recency_days(),
            })
            .collect();
        let opts = StageOptions::new("correlate", self.config.limits().correlate, self.config.cache());
        self.scheduler
            .run_stage(opts, units, |unit: CorrelateUnit, pool| async move {
                pool.submit(move || unit.run()).await
            })
            .await
    }

    pub async fn financial(&self) -> PipelineResult<StageReport> {
        let fmt = self.config.scaler_format();
        let units = self
            .config
            .instruments()
            .iter()
            .map(|name| FinancialPlan::new(&self.layout, name, fmt))
            .collect();
        let opts = StageOptions::new("financial", self.config.limits().financial, false);
        self.scheduler
            .run_stage(opts, units, |plan: FinancialPlan, pool| async move {
                pool.submit(move || write_series(&plan)).await?;
                Ok(UnitStatus::Done)
            })
            .await
    }

    /// Builds the feature matrix of every lookback, one after the other.
    ///
    /// The first failure aborts the remaining lookbacks.
    pub async fn aggregate(&self) -> PipelineResult<Vec<FeatureMatrixSummary>> {
        let mut out = Vec::new();
        for lookback in self.config.lookbacks() {
            if self.cancelled() {
                tracing::warn!("Aggregation cancelled");
                break;
            }
            let plan = AggregatePlan::new(
                &self.layout,
                self.config.instruments(),
                lookback,
                self.config.scan_start(),
                self.config.warmup_rows(),
                self.config.scaler_format(),
            );
            let summary = self
                .scheduler
                .pool()
                .submit(move || aggregate(&plan))
                .await?;
            out.push(summary);
        }
        Ok(out)
    }

    /// Runs every stage in order. Unit failures are reported, not returned.
    #[tracing::instrument(skip_all, fields(root = %self.layout.root().display()))]
    pub async fn run(&self) -> PipelineResult<RunSummary> {
        let mut summary = RunSummary::default();

        let list = self.masterlist().await?;
        summary.stages.push(self.download(&list).await?);

        for kind in BUCKET_ORDER {
            if self.cancelled() {
                break;
            }
            summary.stages.push(self.bucket(kind).await?);
        }
        if !self.cancelled() {
            summary.stages.push(self.correlate().await?);
        }
        if !self.cancelled() {
            summary.stages.push(self.financial().await?);
        }
        if !self.cancelled() {
            summary.matrices = self.aggregate().await?;
        }

        summary.cancelled = self.cancelled();
        tracing::info!(
            stages = summary.stages.len(),
            failed_units = summary.failed_units(),
            matrices = summary.matrices.len(),
            "Run finished"
        );
        Ok(summary)
    }
}
