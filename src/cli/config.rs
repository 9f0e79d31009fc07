// config.rs - Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    // Input/Output
    pub input: Option<String>,
    pub tree: Option<String>,
    pub target: Option<String>,
    pub training_fasta: Option<String>,
    pub target_fasta: Option<String>,
    pub output_dir: Option<String>,

    // Partition
    pub min_group_size: Option<usize>,
    pub sorting: Option<u8>,
    pub threshold: Option<f64>,
    pub criterion: Option<String>,

    // Classification
    pub mode: Option<u8>,
    pub step3: Option<u8>,
    pub acceptance_threshold: Option<f64>,
    pub separation_threshold: Option<f64>,
    pub relaxed_separation: Option<f64>,
    pub max_rescue_rounds: Option<u32>,
    pub max_refinement_rounds: Option<u32>,
    pub validate_pr: Option<bool>,

    // Backends
    pub aligner: Option<u8>,
    pub backend: Option<String>,
    pub mafft: Option<String>,
    pub famsa: Option<String>,
    pub hmmbuild: Option<String>,
    pub hmmsearch: Option<String>,
    pub alignment_mode: Option<String>,
    pub max_representatives: Option<usize>,

    // Performance
    pub cores: Option<usize>,
    pub timeout: Option<u64>,

    // Flags
    pub dry_run: Option<bool>,
}

impl Config {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        println!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(path, content)
            .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

        println!("📄 Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Generate a sample configuration file with comments
    pub fn generate_sample() -> String {
        r#"# hmmerctter.toml - Configuration file for hmmerctter and hc2m2
# Command line arguments will override these settings

# =============================================================================
# INPUT/OUTPUT
# =============================================================================

# Module 1: sequences and the tree built from them
input = "/path/to/sequences.fasta"
tree = "/path/to/sequences.nwk"

# Optional: classify these targets against the new groups
# target = "/path/to/targets.fasta"

# Module 2: training groups (FASTA with group=<id> tags, or a Module 1
# results directory) and the sequences to classify
# training_fasta = "/path/to/All_Results"
# target_fasta = "/path/to/targets.fasta"

output_dir = "results"

# =============================================================================
# PARTITION
# =============================================================================

# Minimum number of sequences per group
min_group_size = 4

# Clade sort order: 1 ascending (smallest first), 2 descending
sorting = 1

# Alpha threshold; supports are read as percent (fractions are rescaled)
threshold = 3.0

# Node criterion compared to alpha: support, branch-length
criterion = "support"

# =============================================================================
# CLASSIFICATION
# =============================================================================

# Outlier rescue: 0 standard, 1 OR, 2 IOR, 3 OR+IOR
mode = 0

# Step 3 refinement: 0 off, 1 on
step3 = 1

# Decision thresholds, in the units of the profile backend. Left unset, they
# default to 20 / 10 / 3 bits for hmmer and 0.5 / 0.1 / 0.02 for identity
# acceptance_threshold = 20.0
# separation_threshold = 10.0
# relaxed_separation = 3.0

# Round caps for iterative rescue and step 3
max_rescue_rounds = 5
max_refinement_rounds = 3

# Split groups into Groups_100PR / Groups_low_PR
validate_pr = true

# =============================================================================
# BACKENDS
# =============================================================================

# Aligner: 0 mafft-ginsi, 1 mafft-global, 2 mafft-auto, 3 famsa
aligner = 0

# Profile backend: hmmer, identity
backend = "hmmer"

# Tool locations (looked up on PATH by default)
# mafft = "/usr/local/bin/mafft"
# famsa = "/usr/local/bin/famsa"
# hmmbuild = "/usr/local/bin/hmmbuild"
# hmmsearch = "/usr/local/bin/hmmsearch"

# Identity backend: protein, protein-strict, dna
alignment_mode = "protein"
max_representatives = 20

# =============================================================================
# PERFORMANCE
# =============================================================================

cores = 4

# Abort after this many seconds
# timeout = 3600

# =============================================================================
# FLAGS
# =============================================================================

dry_run = false
"#
        .to_string()
    }
}
