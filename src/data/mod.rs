// mod.rs - Data structures module

pub mod assignment;
pub mod group;
pub mod loaders;
pub mod sequence;
pub mod tree;

// Re-export main types for convenience
pub use assignment::{Assignment, AssignmentTable, Status, StatusCounts};
pub use group::{membership_fingerprint, Bucket, Group, GroupStatus, Partition};
pub use loaders::{load_training, TrainingSet};
pub use sequence::{write_fasta, Origin, Sequence, SequenceSet};
pub use tree::{parse_support_label, Node, NodeId, Tree};
