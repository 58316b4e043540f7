use rankboard_config::ConfigError;
use rankboard_core::IdentityError;
use rankboard_store::StoreError;
use thiserror::Error;

mod chart;
mod collation;
mod delta;
mod grouping;
mod legacy;
mod merge;
mod probe;
mod score;
mod service;
mod table;

pub use chart::{ChartLine, ChartPoint, ChartSeries, chart_series};
pub use collation::LabelCollator;
pub use delta::{Delta, DeltaDirection, SHARP_CHANGE_THRESHOLD, classify};
pub use grouping::{DisplayGroup, MoveDirection, SeriesGrouper, group_key_for, move_group};
pub use legacy::{ImportReport, SkippedTask, parse_legacy_history};
pub use merge::{
    MergeOutcome, merge, merge_all, merge_into, prefer_incoming, reconcile, rename_brand,
};
pub use probe::{Measurement, ProbeError, RankProbe, TaskOutcome, TaskStatus};
pub use score::{OUT_OF_RANGE_SCORE, TOP_SCORE, position_score, to_score};
pub use service::RankHistoryService;
pub use table::{DeltaCell, DeltaRow, DeltaTable, delta_table};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ambiguous reconciliation: {0}")]
    AmbiguousReconciliation(String),
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),
    #[error("unknown group '{group_key}' for channel {channel}")]
    UnknownGroup {
        channel: rankboard_core::ChannelKind,
        group_key: String,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("preference '{key}' is unreadable: {source}")]
    UnreadablePreference {
        key: String,
        source: serde_json::Error,
    },
}
