// mod.rs - Alignment and profile backends behind narrow traits

pub mod aligners;
pub mod factory;
pub mod hmmer;
pub mod identity;
pub mod process;
pub mod traits;

pub use aligners::{AlignerKind, ExternalAligner, PassthroughAligner};
pub use factory::{BackendSettings, Backends, OracleFactory};
pub use hmmer::{parse_tblout_score, HmmerOracle};
pub use identity::IdentityOracle;
pub use process::remove_scratch_dir;
pub use traits::{
    AlignedRecord, AlignmentOracle, ArtifactHandle, ModelArtifact, ProfileOracle, ScoreThresholds,
};
