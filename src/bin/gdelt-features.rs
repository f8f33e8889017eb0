use std::{env, fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gdelt_features::prelude::*;
use time::macros::format_description;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const APP_NAME: &str = "gdelt-features";

#[derive(Debug, Parser)]
#[command(name = APP_NAME, version, about)]
struct Cli {
    /// JSON configuration file; flags below override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Recompute artifacts that already exist.
    #[arg(long, global = true)]
    no_cache: bool,

    /// Comma separated years, e.g. `2021,2022`.
    #[arg(long, global = true, value_delimiter = ',')]
    years: Vec<u16>,

    /// Comma separated lookback windows in days.
    #[arg(long, global = true, value_delimiter = ',')]
    lookback: Vec<u32>,

    /// Serve raw feed files from a local directory instead of HTTP.
    #[arg(long, global = true)]
    mirror: Option<PathBuf>,

    /// Hide progress bars.
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Every stage, in order (default).
    Run,
    /// Master list, then fetch and parse raw feed files.
    Download,
    /// Bucket parsed files into quarters.
    Bucket,
    /// Correlate events, mentions and details per quarter.
    Correlate,
    /// Prepare scaled financial series.
    Financial,
    /// Build the feature matrix for every lookback.
    Aggregate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing()?;

    let config = load_config(&cli)?;
    let cx = CancellationToken::new();
    spawn_ctrl_c(cx.clone());

    let pool = WorkerPool::new(config.limits().worker_threads())?;
    let progress: Arc<dyn ProgressSink> = if cli.quiet {
        Arc::new(SilentProgress)
    } else {
        Arc::new(TerminalProgress)
    };
    let scheduler = Scheduler::new(pool, progress, cx);
    let command = cli.command.unwrap_or(Command::Run);

    let summary = match &cli.mirror {
        Some(dir) => execute(command, config, MirrorFetcher::new(dir), scheduler).await?,
        None => {
            let fetcher = HttpFetcher::new(config.fetch())?;
            execute(command, config, fetcher, scheduler).await?
        }
    };

    print!("{summary}");
    info!(failed_units = summary.failed_units(), "Done");
    Ok(())
}

async fn execute<F: FeedFetcher>(
    command: Command,
    config: PipelineConfig,
    fetcher: F,
    scheduler: Scheduler,
) -> Result<RunSummary> {
    let pipeline = Pipeline::new(config, fetcher, scheduler)?;
    let mut summary = RunSummary::default();

    match command {
        Command::Run => return pipeline.run().await.context("Pipeline run failed"),
        Command::Download => {
            let list = pipeline
                .masterlist()
                .await
                .context("Failed to obtain the master list")?;
            summary.stages.push(pipeline.download(&list).await?);
        }
        Command::Bucket => {
            for kind in gdelt_features::pipeline::BUCKET_ORDER {
                summary.stages.push(pipeline.bucket(kind).await?);
            }
        }
        Command::Correlate => summary.stages.push(pipeline.correlate().await?),
        Command::Financial => summary.stages.push(pipeline.financial().await?),
        Command::Aggregate => {
            summary.matrices = pipeline.aggregate().await.context("Aggregation failed")?;
        }
    }
    summary.cancelled = pipeline.scheduler().cancellation().is_cancelled();
    Ok(summary)
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(root) = &cli.data_root {
        config = config.with_data_root(root);
    }
    if cli.no_cache {
        config = config.with_cache(false);
    }
    if !cli.years.is_empty() {
        config = config.with_years(cli.years.iter().copied());
    }
    if !cli.lookback.is_empty() {
        config = config.with_lookbacks(cli.lookback.iter().copied());
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn spawn_ctrl_c(cx: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight units");
            cx.cancel();
        }
    });
}

// ================================================================================================
// Tracing Configuration
// ================================================================================================

fn init_tracing() -> Result<Option<WorkerGuard>> {
    // Detect if running in container
    let in_container =
        env::var("CONTAINER").is_ok() || std::path::Path::new("/.dockerenv").exists();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if in_container {
        // Container mode: log to stdout
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .init();

        info!("Logging to stdout (container mode)");
        Ok(None)
    } else {
        // Local mode: log to file
        let log_dir = dirs::state_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("state")))
            .context("Failed to find a state or home directory")?
            .join(APP_NAME)
            .join("logs");
        fs::create_dir_all(&log_dir)?;

        let timestamp = time::OffsetDateTime::now_utc()
            .format(&format_description!(
                "[year][month][day]-[hour][minute][second]"
            ))
            .context("Failed to format timestamp")?;
        let file_name = format!("{APP_NAME}-{timestamp}.log");
        let file_path = log_dir.join(&file_name);

        let file_appender = tracing_appender::rolling::never(&log_dir, &file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(non_blocking)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .init();

        info!(log_file = %file_path.display(), "Logging to file (local mode)");
        Ok(Some(guard))
    }
}
