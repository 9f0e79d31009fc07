// process.rs - External tool invocation and scratch files

use crate::error::OracleError;
use crate::oracle::AlignedRecord;
use bio::io::fasta;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};

/// Scratch directory handing out unique file names to concurrent workers
#[derive(Debug)]
pub struct Scratch {
    dir: PathBuf,
    counter: AtomicU64,
}

impl Scratch {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, stem: &str, ext: &str) -> Result<PathBuf, OracleError> {
        fs::create_dir_all(&self.dir).map_err(|e| OracleError::Launch {
            program: format!("mkdir {}", self.dir.display()),
            source: e,
        })?;
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .dir
            .join(format!("{}_{}_{}.{}", stem, std::process::id(), n, ext)))
    }
}

/// Remove a run's scratch directory; a missing directory is not an error
pub fn remove_scratch_dir(dir: &Path) -> Result<(), String> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(format!(
            "Failed to remove scratch directory '{}': {}",
            dir.display(),
            e
        )),
    }
}

/// Run a tool to completion and return its stdout
pub fn run_tool<I, S>(program: &Path, args: I) -> Result<Vec<u8>, OracleError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program.display().to_string();
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| OracleError::Launch {
            program: name.clone(),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(OracleError::ExitStatus {
            program: name,
            status: output.status.code().unwrap_or(-1),
            stderr: stderr.lines().last().unwrap_or("").trim().to_string(),
        });
    }
    Ok(output.stdout)
}

pub fn write_records(path: &Path, records: &[AlignedRecord]) -> Result<(), OracleError> {
    let to_err = |e: std::io::Error| {
        OracleError::InvalidOutput(format!("cannot write {}: {}", path.display(), e))
    };
    let file = File::create(path).map_err(to_err)?;
    let mut writer = fasta::Writer::new(file);
    for record in records {
        writer.write(&record.id, None, &record.residues).map_err(to_err)?;
    }
    writer.flush().map_err(to_err)
}

pub fn read_records(path: &Path) -> Result<Vec<AlignedRecord>, OracleError> {
    let file = File::open(path).map_err(|e| {
        OracleError::InvalidOutput(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_records(BufReader::new(file))
}

pub fn parse_records<R: std::io::Read>(reader: R) -> Result<Vec<AlignedRecord>, OracleError> {
    let mut records = Vec::new();
    for record in fasta::Reader::new(reader).records() {
        let record = record.map_err(|e| OracleError::InvalidOutput(e.to_string()))?;
        records.push(AlignedRecord::new(record.id(), record.seq().to_ascii_uppercase()));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Scratch::new(dir.path().join("tmp"));
        let a = scratch.path("group_1", "afa").unwrap();
        let b = scratch.path("group_1", "afa").unwrap();
        assert_ne!(a, b);
        assert!(scratch.dir().is_dir());
    }

    #[test]
    fn test_records_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aln.afa");
        let records = vec![
            AlignedRecord::new("a", b"MK-V".to_vec()),
            AlignedRecord::new("b", b"MKLV".to_vec()),
        ];
        write_records(&path, &records).unwrap();
        assert_eq!(read_records(&path).unwrap(), records);
    }

    #[test]
    fn test_missing_program_is_launch_error() {
        let err = run_tool(Path::new("/nonexistent/tool"), ["--help"]).unwrap_err();
        assert!(matches!(err, OracleError::Launch { .. }));
    }
}
