// 1. Traits
pub use crate::polars_ext::{DataFrameExt, ExprExt};
pub use crate::scheduler::{ProgressSink, StageProgress, WorkUnit};
pub use crate::transport::fetcher::FeedFetcher;

// 2. Driver & Runtime
pub use crate::config::{FetchConfig, PipelineConfig, StageLimits};
pub use crate::pipeline::{Pipeline, RunSummary};
pub use crate::scheduler::{
    Scheduler, SilentProgress, StageOptions, StageReport, TerminalProgress, UnitOutcome,
    UnitStatus, WorkerPool,
};

// 3. Domain Types
pub use crate::data::{
    domain::{Category, EpochDay, LookbackDays, Quarter, Year, YearQuarter},
    layout::DataLayout,
    record::RecordKind,
};
pub use crate::math::{
    scaler::{ColumnRange, MinMaxScaler},
    window::{CategoryStats, CorrelatedRow, DailyFeatureVector, RollingAggregator},
};
pub use crate::stage::aggregate::FeatureMatrixSummary;
pub use crate::transport::{
    fetcher::{HttpFetcher, MirrorFetcher},
    masterlist::{FeedFile, MasterList},
};

// 4. Persistence
pub use crate::io::{SerdeFormat, load, save};

// 5. Errors
pub use crate::error::{PipelineError, PipelineResult};
