// partition.rs - Cut a phylogenetic tree into groups, orphans and outliers

use crate::core::context::RunContext;
use crate::data::{Group, NodeId, Partition, SequenceSet, Tree};
use crate::error::{HcError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Order in which qualifying clades claim leaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest clades first (`--sorting 1`)
    Ascending,
    /// Largest clades first (`--sorting 2`)
    Descending,
}

impl SortOrder {
    pub fn from_selector(selector: u8) -> std::result::Result<Self, String> {
        match selector {
            1 => Ok(SortOrder::Ascending),
            2 => Ok(SortOrder::Descending),
            _ => Err(format!("Invalid sorting: {}. Use 1 (ascending) or 2 (descending)", selector)),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Ascending => write!(f, "ascending"),
            SortOrder::Descending => write!(f, "descending"),
        }
    }
}

/// Which node annotation is compared against alpha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Criterion {
    /// Node support (percent) >= alpha
    Support,
    /// Length of the branch above the node >= alpha
    BranchLength,
}

impl FromStr for Criterion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "support" => Ok(Criterion::Support),
            "branch-length" | "length" => Ok(Criterion::BranchLength),
            _ => Err(format!("Invalid criterion: {}. Use: support, branch-length", s)),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Support => write!(f, "support"),
            Criterion::BranchLength => write!(f, "branch-length"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub alpha: f64,
    pub min_group_size: usize,
    pub sort_order: SortOrder,
    pub criterion: Criterion,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            alpha: 3.0,
            min_group_size: 4,
            sort_order: SortOrder::Ascending,
            criterion: Criterion::Support,
        }
    }
}

impl PartitionConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(HcError::Config(format!(
                "alpha threshold must be a non-negative number, got {}",
                self.alpha
            )));
        }
        if self.min_group_size == 0 {
            return Err(HcError::Config("minimum group size must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Walks a tree bottom-up and turns qualifying clades into groups
#[derive(Debug, Clone)]
pub struct PartitionEngine {
    config: PartitionConfig,
}

impl PartitionEngine {
    pub fn new(config: PartitionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Whether a clade node passes the threshold rule
    fn qualifies(&self, tree: &Tree, id: NodeId) -> bool {
        let node = tree.node(id);
        if id == tree.root() || node.is_leaf() {
            return false;
        }
        match self.config.criterion {
            Criterion::Support => node.support.map_or(false, |s| s >= self.config.alpha),
            Criterion::BranchLength => node.branch_length >= self.config.alpha,
        }
    }

    /// Partition the training sequences using the tree.
    ///
    /// Every id of `sequences` lands in exactly one bucket. Sequences the tree
    /// does not mention become orphans.
    pub fn partition(&self, tree: &Tree, sequences: &SequenceSet, ctx: &RunContext) -> Result<Partition> {
        tree.validate_against(sequences)?;
        let min = self.config.min_group_size;

        let order = tree.post_order();
        let mut rank = vec![0usize; tree.len()];
        for (position, &id) in order.iter().enumerate() {
            rank[id] = position;
        }
        let counts = tree.leaf_counts();

        let mut candidates: Vec<NodeId> = order
            .iter()
            .copied()
            .filter(|&id| counts[id] >= min && self.qualifies(tree, id))
            .collect();
        match self.config.sort_order {
            SortOrder::Ascending => candidates.sort_by_key(|&id| (counts[id], rank[id])),
            SortOrder::Descending => candidates.sort_by_key(|&id| (Reverse(counts[id]), rank[id])),
        }

        // group index per leaf node, None while unclaimed
        let mut claimed_by: Vec<Option<usize>> = vec![None; tree.len()];
        let mut formed: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
        for &clade in &candidates {
            let free: Vec<NodeId> = tree
                .leaves_under(clade)
                .into_iter()
                .filter(|&leaf| claimed_by[leaf].is_none())
                .collect();
            if free.len() < min {
                continue;
            }
            for &leaf in &free {
                claimed_by[leaf] = Some(formed.len());
            }
            formed.push((clade, free));
        }

        // Number groups by traversal position of their clade
        formed.sort_by_key(|(clade, _)| rank[*clade]);
        let mut partition = Partition::default();
        for (index, (clade, leaves)) in formed.iter().enumerate() {
            let members = leaves
                .iter()
                .filter_map(|&leaf| tree.leaf_label(leaf))
                .map(str::to_string);
            let group = Group::new(index as u32 + 1, members).with_clade(*clade);
            ctx.log.info(format!(
                "Group {}: {} members (clade node {}, {} {})",
                group.group_id,
                group.len(),
                clade,
                self.config.criterion,
                match self.config.criterion {
                    Criterion::Support => tree.node(*clade).support.unwrap_or(0.0),
                    Criterion::BranchLength => tree.node(*clade).branch_length,
                }
            ));
            partition.groups.push(group);
        }

        // holds_group[n]: the subtree under n contains a grouped leaf
        let mut holds_group = vec![false; tree.len()];
        for &id in &order {
            holds_group[id] = claimed_by[id].is_some()
                || tree.node(id).children.iter().any(|&child| holds_group[child]);
        }

        for leaf in tree.leaves() {
            if claimed_by[leaf].is_some() {
                continue;
            }
            let Some(label) = tree.leaf_label(leaf) else { continue };
            if near_group(tree, leaf, &holds_group) {
                partition.outliers.insert(label.to_string());
            } else {
                partition.orphans.insert(label.to_string());
            }
        }

        let in_tree: BTreeSet<&str> = tree.leaf_labels().into_iter().collect();
        let absent: Vec<&str> = sequences.ids().filter(|id| !in_tree.contains(id)).collect();
        if !absent.is_empty() {
            ctx.log.warn(format!(
                "{} training sequence(s) absent from the tree are treated as orphans",
                absent.len()
            ));
            println!("⚠️  {} training sequences are not in the tree (orphans)", absent.len());
            partition.orphans.extend(absent.into_iter().map(str::to_string));
        }

        if partition.groups.is_empty() {
            let notice = HcError::ThresholdUnreachable {
                alpha: self.config.alpha,
                min_group_size: min,
            };
            ctx.log.warn(notice.to_string());
            println!("⚠️  {}", notice);
            partition.notice = Some(notice);
        }

        ctx.log.info(format!(
            "Partition: {} groups, {} grouped, {} orphans, {} outliers",
            partition.groups.len(),
            partition.grouped_count(),
            partition.orphans.len(),
            partition.outliers.len()
        ));

        debug_assert!(partition.check_invariant(sequences.ids()).is_ok());
        Ok(partition)
    }
}

/// An unclaimed leaf sits next to a group when a sibling subtree holds
/// grouped leaves. The leaf holds none itself, so that is its parent's flag.
fn near_group(tree: &Tree, leaf: NodeId, holds_group: &[bool]) -> bool {
    tree.node(leaf)
        .parent
        .map_or(false, |parent| holds_group[parent])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Bucket, Origin, Sequence};

    fn sequences_for(tree: &Tree) -> SequenceSet {
        SequenceSet::from_sequences(
            tree.leaf_labels()
                .into_iter()
                .map(|label| Sequence::new(label, b"MKV".to_vec(), Origin::Training)),
        )
        .unwrap()
    }

    fn engine(alpha: f64, min: usize, order: SortOrder) -> PartitionEngine {
        PartitionEngine::new(PartitionConfig {
            alpha,
            min_group_size: min,
            sort_order: order,
            criterion: Criterion::Support,
        })
        .unwrap()
    }

    fn ctx() -> RunContext {
        RunContext::new(1).unwrap().quiet()
    }

    fn members(group: &Group) -> Vec<&str> {
        group.member_ids.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_long_caterpillar_neighbourhoods() {
        let depth = 20_000;
        let mut newick = "(".repeat(depth + 1);
        newick.push_str("(L0,L1,L2,L3)95");
        for i in 4..depth + 4 {
            newick.push_str(&format!(",L{})", i));
        }
        newick.push_str(",(O1,O2)10);");
        let tree = Tree::from_newick(&newick).unwrap();
        let sequences = sequences_for(&tree);

        let partition = engine(50.0, 4, SortOrder::Ascending)
            .partition(&tree, &sequences, &ctx())
            .unwrap();
        assert_eq!(partition.groups.len(), 1);
        assert_eq!(members(&partition.groups[0]), vec!["L0", "L1", "L2", "L3"]);
        assert_eq!(partition.outliers.len(), depth);
        assert!(partition.outliers.contains("L4"));
        assert!(partition.outliers.contains(&format!("L{}", depth + 3)));
        let orphans: Vec<&str> = partition.orphans.iter().map(String::as_str).collect();
        assert_eq!(orphans, vec!["O1", "O2"]);
    }

    #[test]
    fn test_ten_leaf_single_clade() {
        let tree = Tree::from_newick(
            "((A:1,B:1,C:1,D:1,E:1)95:1,((F:1,G:1)20:1,(H:1,(I:1,J:1)10:1)15:1)30:1);",
        )
        .unwrap();
        let seqs = sequences_for(&tree);
        let partition = engine(70.0, 4, SortOrder::Ascending)
            .partition(&tree, &seqs, &ctx())
            .unwrap();

        assert_eq!(partition.groups.len(), 1);
        assert_eq!(partition.groups[0].group_id, 1);
        assert_eq!(members(&partition.groups[0]), vec!["A", "B", "C", "D", "E"]);
        assert_eq!(partition.orphans.len() + partition.outliers.len(), 5);
        assert!(partition.check_invariant(seqs.ids()).is_ok());
        assert!(partition.notice.is_none());
    }

    #[test]
    fn test_sibling_of_group_is_outlier() {
        let tree = Tree::from_newick("(((A,B,C,D)95,E)40,(F,G)10);").unwrap();
        let seqs = sequences_for(&tree);
        let partition = engine(70.0, 4, SortOrder::Ascending)
            .partition(&tree, &seqs, &ctx())
            .unwrap();

        assert_eq!(partition.bucket_of("E"), Some(Bucket::Outlier));
        assert_eq!(partition.bucket_of("F"), Some(Bucket::Orphan));
        assert_eq!(partition.bucket_of("A"), Some(Bucket::Group(1)));
    }

    #[test]
    fn test_sort_order_decides_nested_claims() {
        // Outer clade of 8 contains an inner clade of 4, both qualifying
        let newick = "(((A,B,C,D)90,E,F,G,H)85,(I,J)5);";
        let tree = Tree::from_newick(newick).unwrap();
        let seqs = sequences_for(&tree);

        let asc = engine(70.0, 4, SortOrder::Ascending)
            .partition(&tree, &seqs, &ctx())
            .unwrap();
        assert_eq!(asc.groups.len(), 2);
        assert_eq!(members(&asc.groups[0]), vec!["A", "B", "C", "D"]);
        assert_eq!(members(&asc.groups[1]), vec!["E", "F", "G", "H"]);

        let desc = engine(70.0, 4, SortOrder::Descending)
            .partition(&tree, &seqs, &ctx())
            .unwrap();
        assert_eq!(desc.groups.len(), 1);
        assert_eq!(desc.groups[0].len(), 8);
    }

    #[test]
    fn test_threshold_unreachable_orphans_everything() {
        let tree = Tree::from_newick("((A,B)50,(C,D)60);").unwrap();
        let seqs = sequences_for(&tree);
        let partition = engine(99.0, 2, SortOrder::Ascending)
            .partition(&tree, &seqs, &ctx())
            .unwrap();

        assert!(partition.groups.is_empty());
        assert_eq!(partition.orphans.len(), 4);
        assert!(partition.outliers.is_empty());
        assert!(matches!(
            partition.notice,
            Some(HcError::ThresholdUnreachable { min_group_size: 2, .. })
        ));
    }

    #[test]
    fn test_root_is_never_a_group() {
        let tree = Tree::from_newick("(A,B,C,D)100;").unwrap();
        let seqs = sequences_for(&tree);
        let partition = engine(50.0, 2, SortOrder::Ascending)
            .partition(&tree, &seqs, &ctx())
            .unwrap();
        assert!(partition.groups.is_empty());
    }

    #[test]
    fn test_unknown_leaf_is_malformed() {
        let tree = Tree::from_newick("((A,B)90,(C,Z)90);").unwrap();
        let seqs = SequenceSet::from_sequences(
            ["A", "B", "C"]
                .iter()
                .map(|id| Sequence::new(*id, b"MKV".to_vec(), Origin::Training)),
        )
        .unwrap();
        let err = engine(70.0, 2, SortOrder::Ascending)
            .partition(&tree, &seqs, &ctx())
            .unwrap_err();
        assert!(matches!(err, HcError::MalformedTree(_)));
    }

    #[test]
    fn test_sequences_missing_from_tree_are_orphans() {
        let tree = Tree::from_newick("((A,B)90,(C,D)90);").unwrap();
        let mut seqs = sequences_for(&tree);
        seqs.push(Sequence::new("X", b"MKV".to_vec(), Origin::Training)).unwrap();
        let partition = engine(70.0, 2, SortOrder::Ascending)
            .partition(&tree, &seqs, &ctx())
            .unwrap();
        assert_eq!(partition.bucket_of("X"), Some(Bucket::Orphan));
        assert!(partition.check_invariant(seqs.ids()).is_ok());
    }

    #[test]
    fn test_branch_length_criterion() {
        let tree = Tree::from_newick("((A:0.1,B:0.1,C:0.1):0.8,(D:0.1,E:0.1,F:0.1):0.05);").unwrap();
        let seqs = sequences_for(&tree);
        let engine = PartitionEngine::new(PartitionConfig {
            alpha: 0.5,
            min_group_size: 3,
            sort_order: SortOrder::Ascending,
            criterion: Criterion::BranchLength,
        })
        .unwrap();
        let partition = engine.partition(&tree, &seqs, &ctx()).unwrap();
        assert_eq!(partition.groups.len(), 1);
        assert_eq!(members(&partition.groups[0]), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_partition_is_deterministic_and_complete() {
        let supports = [95.0, 10.0, 80.0, 75.0, 30.0, 99.0, 71.0, 5.0];
        for (i, order) in [SortOrder::Ascending, SortOrder::Descending].iter().enumerate() {
            for min in 1..=4 {
                // Caterpillar over 9 leaves with varying supports
                let mut newick = String::from("L0");
                for (k, s) in supports.iter().enumerate() {
                    newick = format!("({},L{}){}", newick, k + 1, s + i as f64);
                }
                newick = format!("({},(M1,M2)88);", newick);
                let tree = Tree::from_newick(&newick).unwrap();
                let seqs = sequences_for(&tree);
                let e = engine(70.0, min, *order);

                let first = e.partition(&tree, &seqs, &ctx()).unwrap();
                let second = e.partition(&tree, &seqs, &ctx()).unwrap();
                assert!(first.check_invariant(seqs.ids()).is_ok());
                assert_eq!(first.groups, second.groups);
                assert_eq!(first.orphans, second.orphans);
                assert_eq!(first.outliers, second.outliers);
                for (n, group) in first.groups.iter().enumerate() {
                    assert_eq!(group.group_id, n as u32 + 1);
                    assert!(group.len() >= min);
                }
            }
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(PartitionEngine::new(PartitionConfig {
            alpha: -1.0,
            ..Default::default()
        })
        .is_err());
        assert!(PartitionEngine::new(PartitionConfig {
            min_group_size: 0,
            ..Default::default()
        })
        .is_err());
        assert_eq!(SortOrder::from_selector(2).unwrap(), SortOrder::Descending);
        assert!(SortOrder::from_selector(3).is_err());
        assert_eq!("branch-length".parse::<Criterion>().unwrap(), Criterion::BranchLength);
    }
}
