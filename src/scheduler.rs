//! Bounded, cancellable execution of a stage's work units.
//!
//! Every stage runs through [`Scheduler::run_stage`]: a generator feeds units into a
//! bounded job channel, `K` workers pull from it and run each unit on its own task,
//! and a collector folds the outcomes into a [`StageReport`]. CPU-heavy work inside a
//! unit goes through the shared [`WorkerPool`].

pub mod pool;
pub mod progress;

use std::{
    fmt::Debug,
    future::Future,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;

pub use self::{
    pool::WorkerPool,
    progress::{ProgressSink, SilentProgress, StageProgress, TerminalProgress},
};
use crate::{
    error::{PipelineError, PipelineResult, SystemError},
    scheduler::{pool::panic_message, progress::ProgressTicket},
};

/// One independently executable piece of a stage.
pub trait WorkUnit: Send + Sync + Debug + 'static {
    /// Identity used in logs and failure reports.
    fn id(&self) -> String;

    /// The output whose existence marks the unit as done. `None` disables the cache gate.
    fn artifact(&self) -> Option<PathBuf>;

    /// Files the artifact is built from. A newer input makes the artifact stale.
    fn inputs(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// What a unit's work reports back when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Done,
    /// Inputs are not available yet.
    NotReady(String),
}

#[derive(Debug)]
pub enum UnitOutcome {
    Completed,
    Cached,
    Skipped(String),
    Failed(PipelineError),
}

#[derive(Debug)]
pub struct UnitFailure {
    pub unit: String,
    pub error: PipelineError,
}

#[derive(Debug)]
pub struct StageReport {
    pub label: String,
    pub total: usize,
    pub completed: usize,
    pub cached: usize,
    pub skipped: usize,
    pub failures: Vec<UnitFailure>,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl StageReport {
    fn new(label: &str, total: usize) -> Self {
        Self {
            label: label.to_string(),
            total,
            completed: 0,
            cached: 0,
            skipped: 0,
            failures: Vec::new(),
            elapsed: Duration::ZERO,
            cancelled: false,
        }
    }

    fn record(&mut self, unit: String, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Completed => self.completed += 1,
            UnitOutcome::Cached => self.cached += 1,
            UnitOutcome::Skipped(reason) => {
                tracing::info!(stage = %self.label, %unit, %reason, "Unit skipped");
                self.skipped += 1;
            }
            UnitOutcome::Failed(error) => {
                tracing::error!(stage = %self.label, %unit, kind = error.kind(), %error, "Unit failed");
                self.failures.push(UnitFailure { unit, error });
            }
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Units that produced an outcome.
    pub fn processed(&self) -> usize {
        self.completed + self.cached + self.skipped + self.failed()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    pub fn summary(&self) -> String {
        let mut s = format!(
            "{}: {} completed, {} cached, {} skipped, {} failed of {} in {}",
            self.label,
            self.completed,
            self.cached,
            self.skipped,
            self.failed(),
            self.total,
            humantime::format_duration(Duration::from_millis(self.elapsed.as_millis() as u64)),
        );
        if self.cancelled {
            s.push_str(" (cancelled)");
        }
        s
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOptions {
    pub label: String,
    pub in_flight: usize,
    pub cache: bool,
}

impl StageOptions {
    pub fn new(label: impl Into<String>, in_flight: usize, cache: bool) -> Self {
        Self {
            label: label.into(),
            in_flight: in_flight.max(1),
            cache,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    pool: WorkerPool,
    progress: Arc<dyn ProgressSink>,
    cx: CancellationToken,
}

impl Scheduler {
    pub fn new(pool: WorkerPool, progress: Arc<dyn ProgressSink>, cx: CancellationToken) -> Self {
        Self { pool, progress, cx }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cx
    }

    /// Runs `work` for every unit with at most `opts.in_flight` units at a time.
    ///
    /// Unit failures and panics are recorded in the report and never stop siblings.
    /// Only failures of the scheduler itself are returned as errors.
    #[tracing::instrument(skip_all, fields(stage = %opts.label, units = units.len()))]
    pub async fn run_stage<U, W, Fut>(
        &self,
        opts: StageOptions,
        units: Vec<U>,
        work: W,
    ) -> PipelineResult<StageReport>
    where
        U: WorkUnit,
        W: Fn(U, WorkerPool) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PipelineResult<UnitStatus>> + Send + 'static,
    {
        let started = Instant::now();
        let mut report = StageReport::new(&opts.label, units.len());
        let stage = self.progress.stage(&opts.label, units.len() as u64)?;
        let work = Arc::new(work);

        // === 1. Generator ===
        let (job_tx, job_rx) = async_channel::bounded::<U>(opts.in_flight * 2);
        let mut generator = JoinSet::new();
        generator.spawn(generator::run(self.cx.clone(), job_tx, units));

        // === 2. Workers ===
        let (out_tx, mut out_rx) = mpsc::channel::<(String, UnitOutcome)>(opts.in_flight * 2);
        let mut workers = JoinSet::new();
        for _ in 0..opts.in_flight {
            let args = worker::Args {
                cx: self.cx.clone(),
                rx: job_rx.clone(),
                tx: out_tx.clone(),
                pool: self.pool.clone(),
                progress: stage.clone(),
                cache: opts.cache,
                work: work.clone(),
            };
            workers.spawn(worker::run(args));
        }
        drop(job_rx);
        drop(out_tx);

        // === 3. Collector ===
        while let Some((unit, outcome)) = out_rx.recv().await {
            report.record(unit, outcome);
        }

        // === 4. Cleanup ===
        drain(workers).await?;
        drain(generator).await?;

        report.cancelled = self.cx.is_cancelled();
        report.elapsed = started.elapsed();
        stage.finish(&report.summary());
        tracing::info!(summary = %report.summary(), "Stage finished");
        Ok(report)
    }
}

async fn drain(mut set: JoinSet<()>) -> PipelineResult<()> {
    while let Some(res) = set.join_next().await {
        res.map_err(|e| SystemError::Join(e.to_string()))?;
    }
    Ok(())
}

// ================================================================================================
// Generator
// ================================================================================================

mod generator {
    use tokio_util::sync::CancellationToken;

    pub async fn run<U>(cx: CancellationToken, tx: async_channel::Sender<U>, units: Vec<U>) {
        for unit in units {
            tokio::select! {
            biased;
            _ = cx.cancelled() => {
                tracing::info!("Generator cancelled; no further units are fed.");
                return;
            }
            res = tx.send(unit) => {
                if res.is_err() {
                    tracing::debug!("Job channel closed; generator exiting.");
                    return;
                }
            }
            }
        }
    }
}

// ================================================================================================
// Worker
// ================================================================================================

mod worker {
    use std::{future::Future, sync::Arc};

    use tokio::sync::mpsc::Sender;
    use tokio_util::sync::CancellationToken;

    use super::{
        ProgressTicket, StageProgress, SystemError, UnitOutcome, UnitStatus, WorkUnit,
        WorkerPool, panic_message,
    };
    use crate::{error::PipelineResult, io::is_up_to_date};

    pub struct Args<U, W> {
        pub cx: CancellationToken,
        pub rx: async_channel::Receiver<U>,
        pub tx: Sender<(String, UnitOutcome)>,
        pub pool: WorkerPool,
        pub progress: Arc<dyn StageProgress>,
        pub cache: bool,
        pub work: Arc<W>,
    }

    pub async fn run<U, W, Fut>(args: Args<U, W>)
    where
        U: WorkUnit,
        W: Fn(U, WorkerPool) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PipelineResult<UnitStatus>> + Send + 'static,
    {
        let Args {
            cx,
            rx,
            tx,
            pool,
            progress,
            cache,
            work,
        } = args;

        loop {
            let unit = tokio::select! {
            biased;
            _ = cx.cancelled() => break,
            job = rx.recv() => match job {
                Ok(unit) => unit,
                Err(_) => break,
            },
            };

            let id = unit.id();
            let ticket = ProgressTicket::new(progress.clone(), id.clone());
            let outcome = execute(unit, cache, &pool, work.as_ref()).await;
            let send = tx.send((id, outcome)).await;
            drop(ticket);
            if send.is_err() {
                tracing::debug!("Outcome channel closed; worker exiting.");
                break;
            }
        }
    }

    #[tracing::instrument(skip_all, fields(unit = %unit.id()))]
    async fn execute<U, W, Fut>(unit: U, cache: bool, pool: &WorkerPool, work: &W) -> UnitOutcome
    where
        U: WorkUnit,
        W: Fn(U, WorkerPool) -> Fut,
        Fut: Future<Output = PipelineResult<UnitStatus>> + Send + 'static,
    {
        if cache
            && unit
                .artifact()
                .is_some_and(|p| p.is_file() && is_up_to_date(&p, &unit.inputs()))
        {
            tracing::debug!("Artifact up to date; skipping unit.");
            return UnitOutcome::Cached;
        }

        match tokio::spawn(work(unit, pool.clone())).await {
            Ok(Ok(UnitStatus::Done)) => UnitOutcome::Completed,
            Ok(Ok(UnitStatus::NotReady(reason))) => UnitOutcome::Skipped(reason),
            Ok(Err(e)) => UnitOutcome::Failed(e),
            Err(e) if e.is_panic() => UnitOutcome::Failed(
                SystemError::WorkerPanicked(panic_message(e.into_panic().as_ref())).into(),
            ),
            Err(e) => UnitOutcome::Failed(SystemError::Join(e.to_string()).into()),
        }
    }
}
