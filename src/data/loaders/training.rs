// training.rs - Loaders for established training groups

use crate::data::{Group, Origin, SequenceSet};
use crate::error::{HcError, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Training sequences together with the groups they define
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub sequences: SequenceSet,
    pub groups: Vec<Group>,
}

fn group_file_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^group_(\d+)\.(?:fasta|fa|faa|fas)$").expect("valid group file regex")
    })
}

/// Load training groups from either a tagged FASTA file or a clustering results directory
pub fn load_training(path: &Path) -> Result<TrainingSet> {
    if path.is_dir() {
        load_groups_dir(path)
    } else {
        load_tagged_fasta(path)
    }
}

/// FASTA whose descriptions carry `group=<id>`; untagged records are skipped
pub fn load_tagged_fasta(path: &Path) -> Result<TrainingSet> {
    let all = SequenceSet::from_fasta(path, Origin::Training)?;

    let mut members: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    let mut tagged = SequenceSet::new();
    let mut untagged = 0usize;

    for seq in all.iter() {
        match seq.group_tag() {
            Some(0) => {
                return Err(HcError::Fasta {
                    path: path.to_path_buf(),
                    message: format!("'{}' carries group=0; group ids start at 1", seq.id),
                })
            }
            Some(group_id) => {
                members.entry(group_id).or_default().push(seq.id.clone());
                tagged.push(seq.clone())?;
            }
            None => untagged += 1,
        }
    }

    if untagged > 0 {
        println!(
            "⚠️  {} training records without a group=<id> tag were ignored",
            untagged
        );
    }

    finish(path, tagged, members)
}

/// Results directory holding `group_<id>.fasta` member listings
pub fn load_groups_dir(dir: &Path) -> Result<TrainingSet> {
    let groups_dir = resolve_groups_dir(dir);

    let entries = fs::read_dir(&groups_dir).map_err(|e| HcError::io(&groups_dir, e))?;
    let mut files: Vec<(u32, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| HcError::io(&groups_dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(caps) = group_file_regex().captures(name) {
            if let Ok(group_id) = caps[1].parse::<u32>() {
                files.push((group_id, entry.path()));
            }
        }
    }
    files.sort();

    let mut sequences = SequenceSet::new();
    let mut members: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for (group_id, file) in &files {
        let listing = SequenceSet::from_fasta(file, Origin::Training)?;
        for seq in listing.iter() {
            if sequences.contains(&seq.id) {
                return Err(HcError::Fasta {
                    path: file.clone(),
                    message: format!("'{}' is listed in more than one group", seq.id),
                });
            }
            sequences.push(seq.clone())?;
            members.entry(*group_id).or_default().push(seq.id.clone());
        }
    }

    finish(&groups_dir, sequences, members)
}

/// `<dir>/All_Results/Groups_100PR`, `<dir>/Groups_100PR`, or `<dir>` itself
fn resolve_groups_dir(dir: &Path) -> PathBuf {
    let nested = dir.join("All_Results").join("Groups_100PR");
    if nested.is_dir() {
        return nested;
    }
    let direct = dir.join("Groups_100PR");
    if direct.is_dir() {
        return direct;
    }
    dir.to_path_buf()
}

fn finish(
    source: &Path,
    sequences: SequenceSet,
    members: BTreeMap<u32, Vec<String>>,
) -> Result<TrainingSet> {
    if members.is_empty() {
        return Err(HcError::Fasta {
            path: source.to_path_buf(),
            message: "no training groups found".to_string(),
        });
    }

    let groups: Vec<Group> = members
        .into_iter()
        .map(|(group_id, ids)| Group::new(group_id, ids))
        .collect();

    println!(
        "📚 Training set: {} groups, {} sequences",
        groups.len(),
        sequences.len()
    );

    Ok(TrainingSet { sequences, groups })
}
