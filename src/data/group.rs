// group.rs - Groups and the partition of training sequences

use crate::data::NodeId;
use crate::error::HcError;
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Lifecycle status of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupStatus {
    /// Usable for profile building and classification
    Established,
    /// Excluded from classification (e.g. its profile could not be built);
    /// its members are reported as orphans downstream
    OrphanSource,
}

/// A disjoint set of sequence ids sharing one profile.
///
/// Groups are snapshots: membership changes produce a new `Group` value
/// instead of mutating an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub group_id: u32,
    pub member_ids: BTreeSet<String>,
    pub status: GroupStatus,
    /// Tree node whose clade defined the group, when it came from a partition
    pub clade: Option<NodeId>,
}

impl Group {
    pub fn new(group_id: u32, members: impl IntoIterator<Item = String>) -> Self {
        Self {
            group_id,
            member_ids: members.into_iter().collect(),
            status: GroupStatus::Established,
            clade: None,
        }
    }

    pub fn with_clade(mut self, clade: NodeId) -> Self {
        self.clade = Some(clade);
        self
    }

    pub fn len(&self) -> usize {
        self.member_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.member_ids.contains(id)
    }

    pub fn is_usable(&self) -> bool {
        self.status == GroupStatus::Established
    }

    /// New snapshot with additional members folded in
    pub fn with_members<'a>(&self, extra: impl IntoIterator<Item = &'a str>) -> Group {
        let mut next = self.clone();
        next.member_ids.extend(extra.into_iter().map(str::to_string));
        next
    }

    /// New snapshot flagged as unusable
    pub fn as_orphan_source(&self) -> Group {
        let mut next = self.clone();
        next.status = GroupStatus::OrphanSource;
        next
    }

    /// CRC32 over the sorted member ids; identifies a membership snapshot
    pub fn fingerprint(&self) -> u32 {
        membership_fingerprint(self.member_ids.iter().map(String::as_str))
    }
}

/// Fingerprint of a membership listing (order-independent for sorted input)
pub fn membership_fingerprint<'a>(ids: impl IntoIterator<Item = &'a str>) -> u32 {
    let mut hasher = Hasher::new();
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize()
}

/// Where a training sequence ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Group(u32),
    Orphan,
    Outlier,
}

/// Result of cutting a tree: disjoint groups plus the two unplaced buckets
#[derive(Debug, Default)]
pub struct Partition {
    pub groups: Vec<Group>,
    pub orphans: BTreeSet<String>,
    pub outliers: BTreeSet<String>,
    /// Recoverable condition raised while partitioning (threshold unreachable)
    pub notice: Option<HcError>,
}

impl Partition {
    pub fn group(&self, group_id: u32) -> Option<&Group> {
        self.groups.iter().find(|g| g.group_id == group_id)
    }

    pub fn bucket_of(&self, id: &str) -> Option<Bucket> {
        if let Some(group) = self.groups.iter().find(|g| g.contains(id)) {
            return Some(Bucket::Group(group.group_id));
        }
        if self.orphans.contains(id) {
            return Some(Bucket::Orphan);
        }
        if self.outliers.contains(id) {
            return Some(Bucket::Outlier);
        }
        None
    }

    pub fn grouped_count(&self) -> usize {
        self.groups.iter().map(Group::len).sum()
    }

    pub fn total(&self) -> usize {
        self.grouped_count() + self.orphans.len() + self.outliers.len()
    }

    /// Every id lands in exactly one bucket and nothing else is present
    pub fn check_invariant<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Result<(), String> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for group in &self.groups {
            for id in &group.member_ids {
                *seen.entry(id.as_str()).or_default() += 1;
            }
        }
        for id in self.orphans.iter().chain(self.outliers.iter()) {
            *seen.entry(id.as_str()).or_default() += 1;
        }

        if let Some((id, n)) = seen.iter().find(|(_, &n)| n > 1) {
            return Err(format!("'{}' appears in {} buckets", id, n));
        }

        let mut expected = 0;
        for id in ids {
            expected += 1;
            if !seen.contains_key(id) {
                return Err(format!("'{}' is in no bucket", id));
            }
        }
        if expected != seen.len() {
            return Err(format!(
                "partition holds {} ids, expected {}",
                seen.len(),
                expected
            ));
        }
        Ok(())
    }
}
