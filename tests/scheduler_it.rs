use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use gdelt_features::{
    error::{PipelineError, SystemError},
    prelude::*,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Recorder {
    advances: Mutex<HashMap<String, usize>>,
    finished: Mutex<Vec<String>>,
}

#[derive(Debug, Default, Clone)]
struct CountingProgress(Arc<Recorder>);

impl ProgressSink for CountingProgress {
    fn stage(&self, _label: &str, _total: u64) -> PipelineResult<Arc<dyn StageProgress>> {
        Ok(self.0.clone())
    }
}

impl StageProgress for Recorder {
    fn advance(&self, unit: &str) {
        *self
            .advances
            .lock()
            .unwrap()
            .entry(unit.to_string())
            .or_default() += 1;
    }

    fn finish(&self, summary: &str) {
        self.finished.lock().unwrap().push(summary.to_string());
    }
}

#[derive(Debug)]
struct Job {
    n: usize,
    artifact: Option<PathBuf>,
}

impl WorkUnit for Job {
    fn id(&self) -> String {
        format!("job-{}", self.n)
    }

    fn artifact(&self) -> Option<PathBuf> {
        self.artifact.clone()
    }
}

fn scheduler(progress: CountingProgress) -> Scheduler {
    Scheduler::new(
        WorkerPool::new(2).unwrap(),
        Arc::new(progress),
        CancellationToken::new(),
    )
}

#[tokio::test]
async fn every_started_unit_advances_progress_once() {
    let dir = tempfile::tempdir().unwrap();
    let done = dir.path().join("done.parquet");
    std::fs::write(&done, b"x").unwrap();

    let progress = CountingProgress::default();
    let units = (0..12)
        .map(|n| Job {
            n,
            artifact: (n == 0).then(|| done.clone()),
        })
        .collect();

    let report = scheduler(progress.clone())
        .run_stage(StageOptions::new("mixed", 4, true), units, |job: Job, pool| async move {
            match job.n % 4 {
                0 => Ok(UnitStatus::Done),
                1 => Err(SystemError::Generic("unit failed".to_string()).into()),
                2 => panic!("unit task panicked"),
                _ => {
                    pool.submit(|| -> PipelineResult<UnitStatus> { panic!("pool work panicked") })
                        .await
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(report.total, 12);
    assert_eq!(report.cached, 1);
    assert_eq!(report.completed, 2);
    assert_eq!(report.failed(), 9);
    assert_eq!(report.processed(), 12);

    let panics = report
        .failures
        .iter()
        .filter(|f| matches!(f.error, PipelineError::System(SystemError::WorkerPanicked(_))))
        .count();
    assert_eq!(panics, 6);

    let advances = progress.0.advances.lock().unwrap();
    assert_eq!(advances.len(), 12);
    assert!(advances.values().all(|&n| n == 1));
    assert_eq!(progress.0.finished.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn cache_off_runs_every_unit() {
    let dir = tempfile::tempdir().unwrap();
    let done = dir.path().join("done.parquet");
    std::fs::write(&done, b"x").unwrap();

    let units = (0..3)
        .map(|n| Job {
            n,
            artifact: Some(done.clone()),
        })
        .collect();
    let report = scheduler(CountingProgress::default())
        .run_stage(StageOptions::new("no-cache", 2, false), units, |_job: Job, _pool| async {
            Ok::<_, PipelineError>(UnitStatus::Done)
        })
        .await
        .unwrap();
    assert_eq!(report.completed, 3);
    assert_eq!(report.cached, 0);
}

#[tokio::test]
async fn not_ready_units_are_skips_not_failures() {
    let units = (0..5).map(|n| Job { n, artifact: None }).collect();
    let report = scheduler(CountingProgress::default())
        .run_stage(StageOptions::new("skips", 1, true), units, |job: Job, _pool| async move {
            if job.n < 3 {
                Ok::<_, PipelineError>(UnitStatus::NotReady(format!("waiting on {}", job.n)))
            } else {
                Ok(UnitStatus::Done)
            }
        })
        .await
        .unwrap();
    assert_eq!(report.skipped, 3);
    assert_eq!(report.completed, 2);
    assert!(report.is_clean());
}

#[tokio::test]
async fn cancellation_stops_feeding_units() {
    let progress = CountingProgress::default();
    let scheduler = scheduler(progress.clone());
    let cx = scheduler.cancellation().clone();

    let units = (0..50).map(|n| Job { n, artifact: None }).collect();
    let report = scheduler
        .run_stage(StageOptions::new("cancel", 1, true), units, move |job: Job, _pool| {
            let cx = cx.clone();
            async move {
                if job.n == 2 {
                    cx.cancel();
                }
                Ok::<_, PipelineError>(UnitStatus::Done)
            }
        })
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(report.processed() >= 3);
    assert!(report.processed() < 50);
    assert_eq!(report.failed(), 0);
    assert_eq!(
        progress.0.advances.lock().unwrap().len(),
        report.processed()
    );
}
