// args.rs - Command line arguments definition

use argh::FromArgs;

#[derive(FromArgs)]
/// HMMERCTTER - tree-guided clustering of protein families (Module 1)
pub struct Args {
    /// input FASTA with every sequence that appears in the tree
    #[argh(option)]
    pub input: Option<String>,

    /// newick tree whose leaves are the input sequence ids
    #[argh(option)]
    pub tree: Option<String>,

    /// minimum number of sequences per group (default: 4)
    #[argh(option, default = "4")]
    pub min_group_size: usize,

    /// clade sort order: 1 ascending, 2 descending (default: 1)
    #[argh(option, default = "1")]
    pub sorting: u8,

    /// aligner: 0 mafft-ginsi, 1 mafft-global, 2 mafft-auto, 3 famsa (default: 0)
    #[argh(option, default = "0")]
    pub aligner: u8,

    /// number of worker threads (default: 4)
    #[argh(option, default = "4")]
    pub cores: usize,

    /// alpha threshold a clade must reach to become a group (default: 3.0)
    #[argh(option, default = "3.0")]
    pub threshold: f64,

    /// outlier rescue: 0 standard, 1 OR, 2 IOR, 3 OR+IOR (default: 0)
    #[argh(option, default = "0")]
    pub mode: u8,

    /// node criterion compared to alpha: support, branch-length (default: support)
    #[argh(option, default = "String::from(\"support\")")]
    pub criterion: String,

    /// output directory (default: .)
    #[argh(option, default = "String::from(\".\")")]
    pub output_dir: String,

    /// profile backend: hmmer, identity (default: hmmer)
    #[argh(option, default = "String::from(\"hmmer\")")]
    pub backend: String,

    /// abort the run after this many seconds
    #[argh(option)]
    pub timeout: Option<u64>,

    /// target FASTA to classify against the new groups (runs Module 2)
    #[argh(option)]
    pub target: Option<String>,

    /// step 3 refinement when classifying targets: 0 off, 1 on (default: 1)
    #[argh(option, default = "1")]
    pub step3: u8,

    /// validate inputs and print the partition plan without building profiles
    #[argh(switch)]
    pub dry_run: bool,

    /// path to TOML configuration file
    #[argh(option)]
    pub config: Option<String>,

    /// generate sample configuration file and exit
    #[argh(switch)]
    pub generate_config: bool,
}

/// Module 2 (`hc2m2`) arguments, filled from the clap matches
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyArgs {
    pub training_fasta: Option<String>,
    pub target_fasta: Option<String>,
    pub cores: usize,
    pub step3: u8,
    pub output_dir: String,
    pub backend: String,
    pub timeout: Option<u64>,
    pub config: Option<String>,
}

impl Default for ClassifyArgs {
    fn default() -> Self {
        Self {
            training_fasta: None,
            target_fasta: None,
            cores: 4,
            step3: 1,
            output_dir: ".".to_string(),
            backend: "hmmer".to_string(),
            timeout: None,
            config: None,
        }
    }
}
