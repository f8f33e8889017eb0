//! Batch pipeline from global news-event feeds to a daily rolling feature matrix.
//!
//! Raw feed files are parsed into daily tables, bucketed into calendar quarters,
//! correlated across events, mentions and article details, and finally rolled into
//! per-day category statistics joined with scaled financial return series.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gdelt_features::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> PipelineResult<()> {
//! let config = PipelineConfig::default().with_years([2021]).with_lookbacks([1, 13]);
//! let fetcher = HttpFetcher::new(config.fetch())?;
//! let pool = WorkerPool::new(config.limits().worker_threads())?;
//! let scheduler = Scheduler::new(pool, Arc::new(TerminalProgress), CancellationToken::new());
//!
//! let summary = Pipeline::new(config, fetcher, scheduler)?.run().await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod io;
mod macros;
pub mod math;
pub mod pipeline;
pub mod polars_ext;
pub mod prelude;
pub mod scheduler;
pub mod stage;
pub mod transport;
