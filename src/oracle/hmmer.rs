// hmmer.rs - Profile HMM backend driving hmmbuild and hmmsearch

use crate::data::Sequence;
use crate::error::OracleError;
use crate::oracle::process::{run_tool, write_records, Scratch};
use crate::oracle::{AlignedRecord, ArtifactHandle, ModelArtifact, ProfileOracle, ScoreThresholds};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

const BACKEND: &str = "hmmer";

/// Builds one HMM per group and scores targets by full-sequence bit score
#[derive(Debug)]
pub struct HmmerOracle {
    hmmbuild: PathBuf,
    hmmsearch: PathBuf,
    scratch: Scratch,
}

impl HmmerOracle {
    /// Bit-score defaults: a hit needs 20 bits, and 10 bits over the runner-up
    pub const THRESHOLDS: ScoreThresholds = ScoreThresholds {
        acceptance: 20.0,
        separation: 10.0,
        relaxed_separation: 3.0,
    };

    pub fn new(
        hmmbuild: impl Into<PathBuf>,
        hmmsearch: impl Into<PathBuf>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            hmmbuild: hmmbuild.into(),
            hmmsearch: hmmsearch.into(),
            scratch: Scratch::new(scratch_dir),
        }
    }

    fn model_path<'a>(&self, model: &'a ModelArtifact) -> Result<&'a Path, OracleError> {
        match &model.handle {
            ArtifactHandle::File(path) if model.backend == BACKEND => Ok(path),
            _ => Err(OracleError::Rejected(format!(
                "model from backend '{}' cannot be scored by hmmer",
                model.backend
            ))),
        }
    }
}

impl ProfileOracle for HmmerOracle {
    fn name(&self) -> &str {
        BACKEND
    }

    fn description(&self) -> &str {
        "HMMER3 profile HMMs (hmmbuild / hmmsearch bit scores)"
    }

    fn build(&self, group_id: u32, alignment: &[AlignedRecord]) -> Result<ModelArtifact, OracleError> {
        if alignment.is_empty() {
            return Err(OracleError::Rejected(format!("group {} has an empty alignment", group_id)));
        }
        let stem = format!("group_{}", group_id);
        let afa = self.scratch.path(&stem, "afa")?;
        let hmm = self.scratch.path(&stem, "hmm")?;
        write_records(&afa, alignment)?;

        let result = run_tool(
            &self.hmmbuild,
            [
                OsStr::new("--cpu"),
                OsStr::new("1"),
                OsStr::new("--informat"),
                OsStr::new("afa"),
                OsStr::new("-n"),
                OsStr::new(&stem),
                hmm.as_os_str(),
                afa.as_os_str(),
            ],
        );
        let _ = fs::remove_file(&afa);
        result?;

        if !hmm.is_file() {
            return Err(OracleError::InvalidOutput(format!(
                "hmmbuild produced no model for group {}",
                group_id
            )));
        }

        Ok(ModelArtifact {
            backend: BACKEND,
            handle: ArtifactHandle::File(hmm),
        })
    }

    fn score(&self, model: &ModelArtifact, target: &Sequence) -> Result<f64, OracleError> {
        let hmm = self.model_path(model)?;
        let fasta = self.scratch.path("target", "fasta")?;
        let tbl = self.scratch.path("target", "tbl")?;
        write_records(&fasta, &[AlignedRecord::from_sequence(target)])?;

        let result = run_tool(
            &self.hmmsearch,
            [
                OsStr::new("--cpu"),
                OsStr::new("1"),
                OsStr::new("--noali"),
                OsStr::new("--max"),
                OsStr::new("-E"),
                OsStr::new("1e10"),
                OsStr::new("--tblout"),
                tbl.as_os_str(),
                hmm.as_os_str(),
                fasta.as_os_str(),
            ],
        )
        .and_then(|_| {
            fs::read_to_string(&tbl)
                .map_err(|e| OracleError::InvalidOutput(format!("cannot read hit table: {}", e)))
        })
        .and_then(|text| parse_tblout_score(&text, &target.id));

        let _ = fs::remove_file(&fasta);
        let _ = fs::remove_file(&tbl);
        result
    }
}

/// Best full-sequence bit score for `target_id` in an hmmsearch `--tblout`
/// table. A target with no reported hit scores 0.
pub fn parse_tblout_score(text: &str, target_id: &str) -> Result<f64, OracleError> {
    let mut best: Option<f64> = None;
    for line in text.lines() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            return Err(OracleError::InvalidOutput(format!("short hit table row: {}", line)));
        }
        if fields[0] != target_id {
            continue;
        }
        let score: f64 = fields[5]
            .parse()
            .map_err(|_| OracleError::InvalidOutput(format!("bad score field '{}'", fields[5])))?;
        best = Some(best.map_or(score, |b: f64| b.max(score)));
    }
    Ok(best.unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Origin;

    const TABLE: &str = "\
#                                                               --- full sequence ---- --- best 1 domain ----
# target name        accession  query name           accession    E-value  score  bias   E-value  score  bias
#------------------- ---------- -------------------- ---------- --------- ------ ----- --------- ------ -----
seqA                 -          group_1              -            3.2e-40  128.4   0.1   3.9e-40  128.1   0.1
# Program:         hmmsearch
";

    #[test]
    fn test_parse_tblout_score() {
        assert_eq!(parse_tblout_score(TABLE, "seqA").unwrap(), 128.4);
        assert_eq!(parse_tblout_score(TABLE, "seqB").unwrap(), 0.0);
        assert!(parse_tblout_score("seqA - g1 -\n", "seqA").is_err());
    }

    #[test]
    fn test_foreign_model_rejected() {
        let oracle = HmmerOracle::new("hmmbuild", "hmmsearch", "/nonexistent");
        let model = ModelArtifact {
            backend: "identity",
            handle: ArtifactHandle::Opaque("x".into()),
        };
        let target = Sequence::new("t", b"MKV".to_vec(), Origin::Target);
        assert!(matches!(oracle.score(&model, &target), Err(OracleError::Rejected(_))));
    }

    #[test]
    fn test_missing_hmmbuild_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = HmmerOracle::new("/nonexistent/hmmbuild", "/nonexistent/hmmsearch", dir.path());
        let aln = vec![AlignedRecord::new("a", b"MKV".to_vec())];
        assert!(matches!(oracle.build(1, &aln), Err(OracleError::Launch { .. })));
    }
}
