// aligners.rs - Multiple alignment backends selected by the aligner option

use crate::data::Sequence;
use crate::error::OracleError;
use crate::oracle::process::{parse_records, read_records, run_tool, write_records, Scratch};
use crate::oracle::{AlignedRecord, AlignmentOracle};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

/// The four recognized alignment strategies (`--aligner 0..3`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignerKind {
    MafftGinsi,
    MafftGlobal,
    MafftAuto,
    Famsa,
}

impl AlignerKind {
    pub fn from_selector(selector: u8) -> Result<Self, String> {
        match selector {
            0 => Ok(AlignerKind::MafftGinsi),
            1 => Ok(AlignerKind::MafftGlobal),
            2 => Ok(AlignerKind::MafftAuto),
            3 => Ok(AlignerKind::Famsa),
            _ => Err(format!("Invalid aligner selector: {}. Use 0-3", selector)),
        }
    }

    pub fn selector(&self) -> u8 {
        match self {
            AlignerKind::MafftGinsi => 0,
            AlignerKind::MafftGlobal => 1,
            AlignerKind::MafftAuto => 2,
            AlignerKind::Famsa => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AlignerKind::MafftGinsi => "mafft-ginsi",
            AlignerKind::MafftGlobal => "mafft-global",
            AlignerKind::MafftAuto => "mafft-auto",
            AlignerKind::Famsa => "famsa",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AlignerKind::MafftGinsi => "MAFFT G-INS-i (global pair, iterative refinement)",
            AlignerKind::MafftGlobal => "MAFFT global pair, no iterative refinement",
            AlignerKind::MafftAuto => "MAFFT automatic strategy selection",
            AlignerKind::Famsa => "FAMSA progressive alignment",
        }
    }

    pub fn all() -> [AlignerKind; 4] {
        [
            AlignerKind::MafftGinsi,
            AlignerKind::MafftGlobal,
            AlignerKind::MafftAuto,
            AlignerKind::Famsa,
        ]
    }

    /// Arguments placed before the input path; famsa also takes an output path
    fn arguments(&self) -> &'static [&'static str] {
        match self {
            AlignerKind::MafftGinsi => &["--globalpair", "--maxiterate", "1000", "--quiet", "--thread", "1"],
            AlignerKind::MafftGlobal => &["--globalpair", "--quiet", "--thread", "1"],
            AlignerKind::MafftAuto => &["--auto", "--quiet", "--thread", "1"],
            AlignerKind::Famsa => &["-t", "1"],
        }
    }

    fn writes_stdout(&self) -> bool {
        !matches!(self, AlignerKind::Famsa)
    }
}

/// Runs mafft or famsa on a scratch FASTA file
#[derive(Debug)]
pub struct ExternalAligner {
    kind: AlignerKind,
    program: PathBuf,
    scratch: Scratch,
}

impl ExternalAligner {
    pub fn new(kind: AlignerKind, program: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            program: program.into(),
            scratch: Scratch::new(scratch_dir),
        }
    }

    pub fn kind(&self) -> AlignerKind {
        self.kind
    }
}

impl AlignmentOracle for ExternalAligner {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn description(&self) -> &str {
        self.kind.description()
    }

    fn align(&self, group_id: u32, members: &[&Sequence]) -> Result<Vec<AlignedRecord>, OracleError> {
        let records: Vec<AlignedRecord> = members.iter().map(|s| AlignedRecord::from_sequence(s)).collect();
        if records.is_empty() {
            return Err(OracleError::Rejected(format!("group {} has no members", group_id)));
        }
        if records.len() == 1 {
            return Ok(records);
        }

        let stem = format!("group_{}", group_id);
        let input = self.scratch.path(&stem, "fasta")?;
        write_records(&input, &records)?;

        let mut args: Vec<OsString> = self.kind.arguments().iter().map(OsString::from).collect();
        args.push(input.clone().into_os_string());

        let result = if self.kind.writes_stdout() {
            run_tool(&self.program, &args).and_then(|stdout| parse_records(stdout.as_slice()))
        } else {
            let output = self.scratch.path(&stem, "afa")?;
            args.push(output.clone().into_os_string());
            let parsed = run_tool(&self.program, &args).and_then(|_| read_records(&output));
            let _ = fs::remove_file(&output);
            parsed
        };
        let _ = fs::remove_file(&input);

        let aligned = result?;
        check_alignment(&records, &aligned)?;
        Ok(aligned)
    }
}

/// Aligned output must cover every member with equal-length rows
fn check_alignment(input: &[AlignedRecord], aligned: &[AlignedRecord]) -> Result<(), OracleError> {
    if aligned.len() != input.len() {
        return Err(OracleError::InvalidOutput(format!(
            "aligner returned {} rows for {} sequences",
            aligned.len(),
            input.len()
        )));
    }
    let width = aligned[0].residues.len();
    if aligned.iter().any(|r| r.residues.len() != width) {
        return Err(OracleError::InvalidOutput("alignment rows differ in length".to_string()));
    }
    Ok(())
}

/// Hands members through unaligned; for backends that align internally
#[derive(Debug, Default)]
pub struct PassthroughAligner;

impl AlignmentOracle for PassthroughAligner {
    fn name(&self) -> &str {
        "none"
    }

    fn description(&self) -> &str {
        "No multiple alignment; members are passed through ungapped"
    }

    fn align(&self, group_id: u32, members: &[&Sequence]) -> Result<Vec<AlignedRecord>, OracleError> {
        if members.is_empty() {
            return Err(OracleError::Rejected(format!("group {} has no members", group_id)));
        }
        Ok(members.iter().map(|s| AlignedRecord::from_sequence(s)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Origin;

    #[test]
    fn test_selector_round_trip() {
        for kind in AlignerKind::all() {
            assert_eq!(AlignerKind::from_selector(kind.selector()).unwrap(), kind);
        }
        assert!(AlignerKind::from_selector(4).is_err());
        assert_eq!(AlignerKind::from_selector(0).unwrap().name(), "mafft-ginsi");
    }

    #[test]
    fn test_single_member_skips_tool() {
        let aligner = ExternalAligner::new(AlignerKind::Famsa, "/nonexistent/famsa", "/nonexistent/tmp");
        let seq = Sequence::new("a", b"MK-V".to_vec(), Origin::Training);
        let aligned = aligner.align(1, &[&seq]).unwrap();
        assert_eq!(aligned, vec![AlignedRecord::new("a", b"MKV".to_vec())]);
    }

    #[test]
    fn test_missing_tool_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let aligner = ExternalAligner::new(AlignerKind::MafftAuto, "/nonexistent/mafft", dir.path());
        let a = Sequence::new("a", b"MKV".to_vec(), Origin::Training);
        let b = Sequence::new("b", b"MKL".to_vec(), Origin::Training);
        assert!(matches!(aligner.align(2, &[&a, &b]), Err(OracleError::Launch { .. })));
    }

    #[test]
    fn test_ragged_alignment_rejected() {
        let input = vec![AlignedRecord::new("a", b"MKV".to_vec()), AlignedRecord::new("b", b"MK".to_vec())];
        let ragged = vec![AlignedRecord::new("a", b"MKV".to_vec()), AlignedRecord::new("b", b"MK".to_vec())];
        assert!(check_alignment(&input, &ragged).is_err());
    }
}
