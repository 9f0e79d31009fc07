// identity.rs - Built-in profile backend scoring by pairwise identity

use crate::core::alignment::{global_identity, AlignmentConfig};
use crate::data::Sequence;
use crate::error::OracleError;
use crate::oracle::{AlignedRecord, ArtifactHandle, ModelArtifact, ProfileOracle, ScoreThresholds};

const BACKEND: &str = "identity";

/// A group's "profile" is a set of representative members; a target scores
/// the best global alignment identity (0..1) against any representative.
#[derive(Debug, Clone)]
pub struct IdentityOracle {
    config: AlignmentConfig,
    max_representatives: usize,
}

impl IdentityOracle {
    pub const THRESHOLDS: ScoreThresholds = ScoreThresholds::UNIT;

    pub fn new(config: AlignmentConfig, max_representatives: usize) -> Self {
        Self {
            config,
            max_representatives: max_representatives.max(1),
        }
    }
}

impl Default for IdentityOracle {
    fn default() -> Self {
        Self::new(AlignmentConfig::default(), 20)
    }
}

impl ProfileOracle for IdentityOracle {
    fn name(&self) -> &str {
        BACKEND
    }

    fn description(&self) -> &str {
        "Built-in global alignment identity against group representatives"
    }

    fn build(&self, group_id: u32, alignment: &[AlignedRecord]) -> Result<ModelArtifact, OracleError> {
        let mut representatives: Vec<AlignedRecord> = alignment
            .iter()
            .map(|r| AlignedRecord::new(r.id.clone(), self.config.sanitize(&r.residues)))
            .filter(|r| !r.residues.is_empty())
            .collect();
        if representatives.is_empty() {
            return Err(OracleError::Rejected(format!(
                "group {} has no non-empty members",
                group_id
            )));
        }
        representatives.sort_by(|a, b| a.id.cmp(&b.id));
        representatives.truncate(self.max_representatives);

        Ok(ModelArtifact {
            backend: BACKEND,
            handle: ArtifactHandle::Sequences(representatives),
        })
    }

    fn score(&self, model: &ModelArtifact, target: &Sequence) -> Result<f64, OracleError> {
        let representatives = match &model.handle {
            ArtifactHandle::Sequences(reps) if model.backend == BACKEND => reps,
            _ => {
                return Err(OracleError::Rejected(format!(
                    "model from backend '{}' cannot be scored by identity",
                    model.backend
                )))
            }
        };

        let mut best = 0.0f64;
        for rep in representatives {
            let identity = global_identity(&self.config, &target.residues, &rep.residues)
                .map_err(OracleError::InvalidOutput)?;
            best = best.max(identity);
        }
        Ok(best)
    }
}
