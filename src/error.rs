// error.rs - Error taxonomy for clustering and classification runs

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by an external alignment or profile backend
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with status {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("invalid backend output: {0}")]
    InvalidOutput(String),

    #[error("{0}")]
    Rejected(String),
}

/// Errors produced by the partition, profile and classification engines.
///
/// Fatal variants abort the run; the others are recorded against a single
/// unit (one group or one target) and the batch continues.
#[derive(Debug, Error)]
pub enum HcError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid FASTA input '{path}': {message}")]
    Fasta { path: PathBuf, message: String },

    #[error("Newick parse error at byte {position}: {message}")]
    Newick { position: usize, message: String },

    #[error("malformed tree: {0}")]
    MalformedTree(String),

    #[error("no clade reaches the minimum group size {min_group_size} at alpha {alpha}; all leaves are orphans")]
    ThresholdUnreachable { alpha: f64, min_group_size: usize },

    #[error("alignment failed for group {group_id}: {source}")]
    AlignmentFailed {
        group_id: u32,
        #[source]
        source: OracleError,
    },

    #[error("profile model build failed for group {group_id}: {source}")]
    ModelBuildFailed {
        group_id: u32,
        #[source]
        source: OracleError,
    },

    #[error("scoring failed for '{sequence_id}' against group {group_id}: {source}")]
    ScoringFailed {
        sequence_id: String,
        group_id: u32,
        #[source]
        source: OracleError,
    },

    #[error("no usable profiles: all {attempted} profile builds failed")]
    NoProfilesAvailable { attempted: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("run cancelled: {0}")]
    Cancelled(String),
}

impl HcError {
    /// Whether this error aborts the whole run
    pub fn is_fatal(&self) -> bool {
        match self {
            HcError::Io { .. }
            | HcError::Fasta { .. }
            | HcError::Newick { .. }
            | HcError::MalformedTree(_)
            | HcError::NoProfilesAvailable { .. }
            | HcError::Config(_)
            | HcError::Cancelled(_) => true,
            HcError::ThresholdUnreachable { .. }
            | HcError::AlignmentFailed { .. }
            | HcError::ModelBuildFailed { .. }
            | HcError::ScoringFailed { .. } => false,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HcError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, HcError>;
