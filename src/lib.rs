// lib.rs - hmmerctter library root

//! # hmmerctter - Tree-guided clustering and profile-based classification of protein families
//!
//! Module 1 cuts a phylogenetic tree into disjoint groups of sequences (plus
//! Orphans and Outliers), builds one profile per group and checks that each
//! profile separates its members from every other grouped sequence.
//! Module 2 scores target sequences against the group profiles and assigns
//! each one to a group, or leaves it as an Orphan or Outlier.
//!
//! ## Features
//!
//! - **Deterministic partitioning**: support or branch-length criterion, ascending or descending clade order
//! - **Pluggable backends**: HMMER (hmmbuild/hmmsearch) or built-in parasail identity scoring
//! - **Outlier rescue**: standard, OR, IOR and OR+IOR strategies plus step-3 refinement
//! - **Per-run thread pools**: cancellation and timeouts checked per work unit
//! - **Run records**: timestamped run log and JSON summary, written even on failure
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use hmmerctter::prelude::*;
//! use std::path::Path;
//!
//! let sequences = SequenceSet::from_fasta(Path::new("family.fasta"), Origin::Training)?;
//! let tree = Tree::from_newick_file(Path::new("family.nwk"))?;
//!
//! let settings = BackendSettings::default();
//! let backends = OracleFactory::create("identity", AlignerKind::MafftGinsi, &settings)
//!     .map_err(HcError::Config)?;
//! let ctx = RunContext::new(4)?;
//!
//! let result = run_clustering(
//!     &sequences,
//!     &tree,
//!     backends.aligner.as_ref(),
//!     backends.profiles.as_ref(),
//!     &ClusteringSettings::default(),
//!     &ctx,
//! )?;
//! println!("{} groups", result.groups.len());
//! # Ok::<(), HcError>(())
//! ```

// Re-export all main modules
pub mod cli;
pub mod core;
pub mod data;
pub mod error;
pub mod oracle;
pub mod output;

// Convenience prelude for common imports
pub mod prelude {
    pub use crate::cli::{validate_args, Args, ValidationResult};
    pub use crate::core::{run_classification, run_clustering, training_from_clustering};
    pub use crate::core::{
        ClassificationEngine, ClassificationSettings, ClusteringSettings, Mode, PartitionConfig,
        PartitionEngine, ProfileBuilder, ProfileSet, RunContext, StageConfig,
    };
    pub use crate::data::{Group, Origin, Partition, Sequence, SequenceSet, Status, Tree};
    pub use crate::error::{HcError, Result};
    pub use crate::oracle::{AlignerKind, AlignmentOracle, BackendSettings, OracleFactory, ProfileOracle};
}

// Re-export main types at the root level for convenience
pub use cli::{Args, ValidationResult};
pub use core::{ClassificationEngine, PartitionEngine, ProfileBuilder, RunContext};
pub use data::{AssignmentTable, Group, Partition, SequenceSet, Status, Tree};
pub use error::{HcError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn get_info() -> String {
    format!(
        "hmmerctter v{} - Tree-guided clustering and classification of protein families",
        VERSION
    )
}
