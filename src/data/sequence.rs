// sequence.rs - Labeled sequences and FASTA loading

use crate::error::{HcError, Result};
use bio::io::fasta;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::OnceLock;

/// Which input a sequence came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Training,
    Target,
}

/// A single labeled sequence. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub id: String,
    pub description: Option<String>,
    pub residues: Vec<u8>,
    pub origin: Origin,
}

fn group_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|\s)group=(\d+)(?:\s|$)").expect("valid group tag regex"))
}

impl Sequence {
    pub fn new(id: impl Into<String>, residues: impl Into<Vec<u8>>, origin: Origin) -> Self {
        Self {
            id: id.into(),
            description: None,
            residues: residues.into(),
            origin,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    /// Residues with alignment gap characters removed, upper-cased
    pub fn ungapped(&self) -> Vec<u8> {
        self.residues
            .iter()
            .filter(|&&b| b != b'-' && b != b'.')
            .map(|b| b.to_ascii_uppercase())
            .collect()
    }

    /// Group id carried in the FASTA description as `group=<id>`
    pub fn group_tag(&self) -> Option<u32> {
        let desc = self.description.as_deref()?;
        group_tag_regex()
            .captures(desc)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

/// Ordered set of sequences with unique ids
#[derive(Debug, Clone, Default)]
pub struct SequenceSet {
    sequences: Vec<Sequence>,
    index: HashMap<String, usize>,
}

impl SequenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from in-memory records, rejecting duplicate ids
    pub fn from_sequences(sequences: impl IntoIterator<Item = Sequence>) -> Result<Self> {
        let mut set = Self::new();
        for seq in sequences {
            set.push(seq)?;
        }
        Ok(set)
    }

    /// Load every record of a FASTA file
    pub fn from_fasta(path: &Path, origin: Origin) -> Result<Self> {
        let file = File::open(path).map_err(|e| HcError::io(path, e))?;
        let reader = fasta::Reader::new(BufReader::new(file));
        let mut set = Self::new();

        for record_result in reader.records() {
            let record = record_result.map_err(|e| HcError::Fasta {
                path: path.to_path_buf(),
                message: format!("invalid record: {}", e),
            })?;

            if record.id().is_empty() {
                return Err(HcError::Fasta {
                    path: path.to_path_buf(),
                    message: "record with empty identifier".to_string(),
                });
            }

            let mut seq = Sequence::new(record.id(), record.seq().to_vec(), origin);
            if let Some(desc) = record.desc() {
                seq = seq.with_description(desc);
            }

            set.push(seq).map_err(|e| match e {
                HcError::Fasta { message, .. } => HcError::Fasta {
                    path: path.to_path_buf(),
                    message,
                },
                other => other,
            })?;
        }

        if set.is_empty() {
            return Err(HcError::Fasta {
                path: path.to_path_buf(),
                message: "no sequences found".to_string(),
            });
        }

        println!("🧬 Loaded {} sequences from {}", set.len(), path.display());
        Ok(set)
    }

    pub fn push(&mut self, seq: Sequence) -> Result<()> {
        if self.index.contains_key(&seq.id) {
            return Err(HcError::Fasta {
                path: "<memory>".into(),
                message: format!("duplicate sequence id '{}'", seq.id),
            });
        }
        self.index.insert(seq.id.clone(), self.sequences.len());
        self.sequences.push(seq);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Sequence> {
        self.index.get(id).map(|&i| &self.sequences[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sequence> {
        self.sequences.iter()
    }

    pub fn as_slice(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sequences.iter().map(|s| s.id.as_str())
    }
}

/// Write sequences as FASTA (used for result listings and backend inputs)
pub fn write_fasta<'a>(
    path: &Path,
    sequences: impl IntoIterator<Item = &'a Sequence>,
) -> Result<usize> {
    let file = File::create(path).map_err(|e| HcError::io(path, e))?;
    let mut writer = fasta::Writer::new(file);
    let mut written = 0;
    for seq in sequences {
        writer
            .write(&seq.id, seq.description.as_deref(), &seq.residues)
            .map_err(|e| HcError::io(path, e))?;
        written += 1;
    }
    writer.flush().map_err(|e| HcError::io(path, e))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_group_tag() {
        let tagged = Sequence::new("a", b"MKV".to_vec(), Origin::Training)
            .with_description("kinase group=12 partial");
        assert_eq!(tagged.group_tag(), Some(12));

        let untagged = Sequence::new("b", b"MKV".to_vec(), Origin::Training)
            .with_description("subgroup=3");
        assert_eq!(untagged.group_tag(), None);
    }

    #[test]
    fn test_ungapped() {
        let seq = Sequence::new("a", b"mk-V..L".to_vec(), Origin::Training);
        assert_eq!(seq.ungapped(), b"MKVL".to_vec());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = SequenceSet::from_sequences(vec![
            Sequence::new("x", b"AAA".to_vec(), Origin::Target),
            Sequence::new("x", b"CCC".to_vec(), Origin::Target),
        ]);
        assert!(matches!(result, Err(HcError::Fasta { .. })));
    }

    #[test]
    fn test_fasta_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.fasta");
        let mut file = File::create(&path).unwrap();
        writeln!(file, ">s2 group=1\nMKVL\nAA\n>s1\nGGG").unwrap();
        drop(file);

        let set = SequenceSet::from_fasta(&path, Origin::Training).unwrap();
        let ids: Vec<&str> = set.ids().collect();
        assert_eq!(ids, vec!["s2", "s1"]);
        assert_eq!(set.get("s2").unwrap().residues, b"MKVLAA".to_vec());
        assert_eq!(set.get("s2").unwrap().group_tag(), Some(1));

        let out = dir.path().join("out.fasta");
        assert_eq!(write_fasta(&out, set.iter()).unwrap(), 2);
        let reread = SequenceSet::from_fasta(&out, Origin::Target).unwrap();
        assert_eq!(reread.len(), 2);
        assert_eq!(reread.get("s1").unwrap().origin, Origin::Target);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SequenceSet::from_fasta(Path::new("/nonexistent/x.fa"), Origin::Target)
            .unwrap_err();
        assert!(matches!(err, HcError::Io { .. }));
        assert!(err.is_fatal());
    }
}
