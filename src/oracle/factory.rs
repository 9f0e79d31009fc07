// factory.rs - Construct alignment and profile backends by name

use super::*;
use crate::core::alignment::AlignmentConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tool locations and backend tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    pub mafft: PathBuf,
    pub famsa: PathBuf,
    pub hmmbuild: PathBuf,
    pub hmmsearch: PathBuf,
    /// Scratch directory for tool inputs, outputs and model files
    pub scratch_dir: PathBuf,
    /// Pairwise alignment preset for the identity backend
    pub alignment_mode: String,
    pub max_representatives: usize,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            mafft: PathBuf::from("mafft"),
            famsa: PathBuf::from("famsa"),
            hmmbuild: PathBuf::from("hmmbuild"),
            hmmsearch: PathBuf::from("hmmsearch"),
            scratch_dir: std::env::temp_dir().join("hmmerctter"),
            alignment_mode: "protein".to_string(),
            max_representatives: 20,
        }
    }
}

/// The pair of backends a run works with
#[derive(Debug)]
pub struct Backends {
    pub aligner: Box<dyn AlignmentOracle>,
    pub profiles: Box<dyn ProfileOracle>,
}

pub struct OracleFactory;

impl OracleFactory {
    /// Create the backend pair for a profile backend name and aligner preset
    pub fn create(
        backend: &str,
        aligner: AlignerKind,
        settings: &BackendSettings,
    ) -> Result<Backends, String> {
        let profiles = Self::create_profile_oracle(backend, settings)?;
        let aligner: Box<dyn AlignmentOracle> = match backend {
            // Identity scoring aligns pairwise itself
            "identity" => Box::new(PassthroughAligner),
            _ => Self::create_aligner(aligner, settings),
        };
        Ok(Backends { aligner, profiles })
    }

    pub fn create_profile_oracle(
        backend: &str,
        settings: &BackendSettings,
    ) -> Result<Box<dyn ProfileOracle>, String> {
        match backend {
            "hmmer" => Ok(Box::new(HmmerOracle::new(
                settings.hmmbuild.clone(),
                settings.hmmsearch.clone(),
                settings.scratch_dir.clone(),
            ))),
            "identity" => {
                let config = AlignmentConfig::from_mode(&settings.alignment_mode)?;
                if settings.max_representatives == 0 {
                    return Err("max_representatives must be at least 1".to_string());
                }
                Ok(Box::new(IdentityOracle::new(config, settings.max_representatives)))
            }
            _ => Err(format!(
                "Unknown profile backend: {}. Use: {}",
                backend,
                Self::list_available()
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }

    pub fn create_aligner(kind: AlignerKind, settings: &BackendSettings) -> Box<dyn AlignmentOracle> {
        let program = match kind {
            AlignerKind::Famsa => settings.famsa.clone(),
            _ => settings.mafft.clone(),
        };
        Box::new(ExternalAligner::new(kind, program, settings.scratch_dir.clone()))
    }

    /// Default decision thresholds on a backend's score scale
    pub fn default_thresholds(backend: &str) -> Result<ScoreThresholds, String> {
        match backend {
            "hmmer" => Ok(HmmerOracle::THRESHOLDS),
            "identity" => Ok(IdentityOracle::THRESHOLDS),
            _ => Err(format!("Unknown profile backend: {}", backend)),
        }
    }

    /// List all available profile backends
    pub fn list_available() -> Vec<(&'static str, &'static str)> {
        vec![
            ("hmmer", "HMMER3 profile HMMs via hmmbuild/hmmsearch (bit scores)"),
            ("identity", "Built-in pairwise identity against group representatives (0-1)"),
        ]
    }
}
