use std::{fmt::Debug, sync::Arc};

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{PipelineResult, SystemError};

const TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta_precise}) {msg}";

/// Creates one progress handle per stage run.
pub trait ProgressSink: Send + Sync + Debug {
    fn stage(&self, label: &str, total: u64) -> PipelineResult<Arc<dyn StageProgress>>;
}

/// Progress of a single stage. Implementations must be thread-safe.
pub trait StageProgress: Send + Sync {
    /// Called exactly once per unit that was started.
    fn advance(&self, unit: &str);

    fn finish(&self, summary: &str);
}

/// Renders an `indicatif` bar per stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalProgress;

impl ProgressSink for TerminalProgress {
    fn stage(&self, label: &str, total: u64) -> PipelineResult<Arc<dyn StageProgress>> {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(TEMPLATE)
                .map_err(SystemError::ProgressBar)?
                .progress_chars("#>-"),
        );
        bar.set_message(label.to_string());
        Ok(Arc::new(TerminalStage { bar }))
    }
}

struct TerminalStage {
    bar: ProgressBar,
}

impl StageProgress for TerminalStage {
    fn advance(&self, _unit: &str) {
        self.bar.inc(1);
    }

    fn finish(&self, summary: &str) {
        self.bar.finish_with_message(summary.to_string());
    }
}

/// Discards progress. Used in tests and container runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn stage(&self, _label: &str, _total: u64) -> PipelineResult<Arc<dyn StageProgress>> {
        Ok(Arc::new(SilentProgress))
    }
}

impl StageProgress for SilentProgress {
    fn advance(&self, _unit: &str) {}

    fn finish(&self, _summary: &str) {}
}

/// Advances its stage progress when dropped, whatever happened to the unit.
pub(crate) struct ProgressTicket {
    progress: Arc<dyn StageProgress>,
    unit: String,
}

impl ProgressTicket {
    pub(crate) fn new(progress: Arc<dyn StageProgress>, unit: String) -> Self {
        Self { progress, unit }
    }
}

impl Drop for ProgressTicket {
    fn drop(&mut self) {
        self.progress.advance(&self.unit);
    }
}
