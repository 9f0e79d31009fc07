// mod.rs - Core logic module

pub mod alignment;
pub mod classify;
pub mod context;
pub mod partition;
pub mod pipeline;
pub mod precision;
pub mod profile;

// Re-export main types for convenience
pub use alignment::{global_identity, AlignmentConfig};
pub use classify::{
    decide, score_targets, ClassificationEngine, ClassificationOutcome, Decision, Mode, ScoreRow,
    StageConfig,
};
pub use context::{CancelToken, LogEntry, LogLevel, RunContext, RunLog, UnitFailure};
pub use partition::{Criterion, PartitionConfig, PartitionEngine, SortOrder};
pub use pipeline::{
    group_column, profiles_for, run_classification, run_clustering, training_from_clustering,
    ClassificationSettings, ClusteringResult, ClusteringSettings,
};
pub use precision::{validate_precision_recall, PrecisionReport};
pub use profile::{BuildReport, Profile, ProfileBuilder, ProfileSet, RebuildReport};
