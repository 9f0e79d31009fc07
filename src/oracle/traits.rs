// traits.rs - Narrow interfaces to alignment and profile backends

use crate::data::Sequence;
use crate::error::OracleError;
use std::fmt::Debug;
use std::path::PathBuf;

/// One row of a multiple alignment (residues may contain `-` gaps)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedRecord {
    pub id: String,
    pub residues: Vec<u8>,
}

impl AlignedRecord {
    pub fn new(id: impl Into<String>, residues: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            residues: residues.into(),
        }
    }

    /// Unaligned record straight from a sequence
    pub fn from_sequence(seq: &Sequence) -> Self {
        Self::new(seq.id.clone(), seq.ungapped())
    }
}

/// Where a backend keeps a built model
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactHandle {
    /// Model file on disk (e.g. an HMM)
    File(PathBuf),
    /// In-memory representative rows
    Sequences(Vec<AlignedRecord>),
    /// Backend-specific token
    Opaque(String),
}

/// Opaque model produced by a `ProfileOracle`; only its producer interprets it
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub backend: &'static str,
    pub handle: ArtifactHandle,
}

/// Decision thresholds expressed in a backend's own score units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreThresholds {
    pub acceptance: f64,
    pub separation: f64,
    pub relaxed_separation: f64,
}

impl ScoreThresholds {
    /// Scores in 0..1, such as fractional identity
    pub const UNIT: ScoreThresholds = ScoreThresholds {
        acceptance: 0.5,
        separation: 0.1,
        relaxed_separation: 0.02,
    };
}

/// Produces a multiple alignment for a group's members.
///
/// Construct-and-forget: implementations do not retry.
pub trait AlignmentOracle: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn align(&self, group_id: u32, members: &[&Sequence]) -> Result<Vec<AlignedRecord>, OracleError>;
}

/// Builds profile models from alignments and scores sequences against them.
///
/// Higher scores mean a better fit. `score` must be safe to call
/// concurrently for different targets on the same model.
pub trait ProfileOracle: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn build(&self, group_id: u32, alignment: &[AlignedRecord]) -> Result<ModelArtifact, OracleError>;

    fn score(&self, model: &ModelArtifact, target: &Sequence) -> Result<f64, OracleError>;

    /// Release resources held by a model that is no longer referenced
    fn discard(&self, model: &ModelArtifact) {
        if let ArtifactHandle::File(path) = &model.handle {
            let _ = std::fs::remove_file(path);
        }
    }
}
