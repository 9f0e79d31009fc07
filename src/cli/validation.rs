// validation.rs - Input validation utilities

use crate::cli::args::{Args, ClassifyArgs};
use crate::cli::config::Config;
use crate::core::{
    ClassificationSettings, ClusteringSettings, Criterion, Mode, PartitionConfig, SortOrder,
    StageConfig,
};
use crate::oracle::{AlignerKind, BackendSettings, OracleFactory};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Scratch directory created under the output directory for tool files
pub const SCRATCH_DIR: &str = ".hmmerctter_tmp";

/// Validated Module 1 run (plus the optional Module 2 chain)
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub input: PathBuf,
    pub tree: PathBuf,
    pub target: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub clustering: ClusteringSettings,
    pub classification: ClassificationSettings,
    pub aligner: AlignerKind,
    pub backend: String,
    pub backends: BackendSettings,
    pub cores: usize,
    pub timeout: Option<Duration>,
    pub dry_run: bool,
}

/// Validated Module 2 run
#[derive(Debug, Clone)]
pub struct ClassifyValidation {
    pub training: PathBuf,
    pub targets: PathBuf,
    pub output_dir: PathBuf,
    pub classification: ClassificationSettings,
    pub aligner: AlignerKind,
    pub backend: String,
    pub backends: BackendSettings,
    pub cores: usize,
    pub timeout: Option<Duration>,
}

/// Validate all command line arguments
pub fn validate_args(args: &Args, config: &Config) -> Result<ValidationResult, String> {
    let input = require_path(args.input.as_deref(), "--input")?;
    let tree = require_path(args.tree.as_deref(), "--tree")?;
    let target = match args.target.as_deref() {
        Some(path) => Some(require_path(Some(path), "--target")?),
        None => None,
    };

    if args.min_group_size == 0 {
        return Err("Minimum group size must be at least 1".to_string());
    }
    if !args.threshold.is_finite() || args.threshold < 0.0 {
        return Err(format!(
            "Threshold must be a non-negative number, got {}",
            args.threshold
        ));
    }
    let partition = PartitionConfig {
        alpha: args.threshold,
        min_group_size: args.min_group_size,
        sort_order: SortOrder::from_selector(args.sorting)?,
        criterion: Criterion::from_str(&args.criterion)?,
    };
    partition.validate().map_err(|e| e.to_string())?;

    let mode = Mode::from_selector(args.mode)?;
    let refinement = step3_flag(args.step3)?;
    let aligner = AlignerKind::from_selector(args.aligner)?;
    validate_cores(args.cores)?;
    validate_backend(&args.backend)?;

    let stage = stage_config(config, refinement, &args.backend)?;
    let output_dir = PathBuf::from(&args.output_dir);
    let backends = backend_settings(config, &output_dir)?;

    Ok(ValidationResult {
        input,
        tree,
        target,
        clustering: ClusteringSettings {
            partition,
            mode,
            stage: StageConfig {
                refinement: false,
                ..stage.clone()
            },
            validate_pr: config.validate_pr.unwrap_or(true),
        },
        classification: ClassificationSettings { mode, stage },
        output_dir,
        aligner,
        backend: args.backend.clone(),
        backends,
        cores: args.cores,
        timeout: args.timeout.map(Duration::from_secs),
        dry_run: args.dry_run,
    })
}

/// Validate `hc2m2` arguments
pub fn validate_classify_args(
    args: &ClassifyArgs,
    config: &Config,
) -> Result<ClassifyValidation, String> {
    let training = require_path(args.training_fasta.as_deref(), "--training-fasta")?;
    let targets = require_path(args.target_fasta.as_deref(), "--target-fasta")?;

    let refinement = step3_flag(args.step3)?;
    validate_cores(args.cores)?;
    validate_backend(&args.backend)?;
    let mode = Mode::from_selector(config.mode.unwrap_or(0))?;
    let aligner = AlignerKind::from_selector(config.aligner.unwrap_or(0))?;

    let output_dir = PathBuf::from(&args.output_dir);
    let backends = backend_settings(config, &output_dir)?;

    Ok(ClassifyValidation {
        training,
        targets,
        classification: ClassificationSettings {
            mode,
            stage: stage_config(config, refinement, &args.backend)?,
        },
        output_dir,
        aligner,
        backend: args.backend.clone(),
        backends,
        cores: args.cores,
        timeout: args.timeout.map(Duration::from_secs),
    })
}

fn require_path(value: Option<&str>, flag: &str) -> Result<PathBuf, String> {
    let value = value.ok_or_else(|| format!("{} is required", flag))?;
    let path = PathBuf::from(value);
    if !path.exists() {
        return Err(format!("{} path does not exist: {}", flag, value));
    }
    Ok(path)
}

fn step3_flag(step3: u8) -> Result<bool, String> {
    match step3 {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(format!("Invalid step3: {}. Use 0 (off) or 1 (on)", step3)),
    }
}

fn validate_cores(cores: usize) -> Result<(), String> {
    if cores == 0 {
        return Err("Number of cores must be at least 1".to_string());
    }
    Ok(())
}

fn validate_backend(backend: &str) -> Result<(), String> {
    let available = OracleFactory::list_available();
    if !available.iter().any(|(name, _)| *name == backend) {
        return Err(format!(
            "Invalid backend '{}'. Available: {}",
            backend,
            available
                .iter()
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    Ok(())
}

/// Classification thresholds from the config file, backend defaults elsewhere
pub fn stage_config(config: &Config, refinement: bool, backend: &str) -> Result<StageConfig, String> {
    let defaults = StageConfig::with_thresholds(OracleFactory::default_thresholds(backend)?);
    let stage = StageConfig {
        acceptance_threshold: config
            .acceptance_threshold
            .unwrap_or(defaults.acceptance_threshold),
        separation_threshold: config
            .separation_threshold
            .unwrap_or(defaults.separation_threshold),
        relaxed_separation: config
            .relaxed_separation
            .unwrap_or(defaults.relaxed_separation),
        max_rescue_rounds: config.max_rescue_rounds.unwrap_or(defaults.max_rescue_rounds),
        refinement,
        max_refinement_rounds: config
            .max_refinement_rounds
            .unwrap_or(defaults.max_refinement_rounds),
    };
    stage.validate().map_err(|e| e.to_string())?;
    Ok(stage)
}

/// Tool paths and identity settings; scratch files live under the output directory
pub fn backend_settings(config: &Config, output_dir: &Path) -> Result<BackendSettings, String> {
    let mut settings = BackendSettings {
        scratch_dir: output_dir.join(SCRATCH_DIR),
        ..BackendSettings::default()
    };
    if let Some(path) = &config.mafft {
        settings.mafft = PathBuf::from(path);
    }
    if let Some(path) = &config.famsa {
        settings.famsa = PathBuf::from(path);
    }
    if let Some(path) = &config.hmmbuild {
        settings.hmmbuild = PathBuf::from(path);
    }
    if let Some(path) = &config.hmmsearch {
        settings.hmmsearch = PathBuf::from(path);
    }
    if let Some(mode) = &config.alignment_mode {
        settings.alignment_mode = mode.clone();
    }
    if let Some(max) = config.max_representatives {
        if max == 0 {
            return Err("max_representatives must be at least 1".to_string());
        }
        settings.max_representatives = max;
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decide;
    use crate::data::Status;
    use argh::FromArgs;

    fn inputs() -> (tempfile::TempDir, String, String) {
        let dir = tempfile::tempdir().unwrap();
        let fasta = dir.path().join("seqs.fasta");
        let tree = dir.path().join("seqs.nwk");
        std::fs::write(&fasta, ">a\nMKV\n").unwrap();
        std::fs::write(&tree, "(a,b);").unwrap();
        let fasta = fasta.to_string_lossy().into_owned();
        let tree = tree.to_string_lossy().into_owned();
        (dir, fasta, tree)
    }

    fn parse(extra: &[&str], fasta: &str, tree: &str) -> Args {
        let mut argv = vec!["--input", fasta, "--tree", tree];
        argv.extend_from_slice(extra);
        Args::from_args(&["hmmerctter"], &argv).unwrap()
    }

    #[test]
    fn test_defaults_validate() {
        let (_dir, fasta, tree) = inputs();
        let result = validate_args(&parse(&[], &fasta, &tree), &Config::new()).unwrap();
        assert_eq!(result.clustering.partition, PartitionConfig::default());
        assert_eq!(result.clustering.mode, Mode::Standard);
        assert!(!result.clustering.stage.refinement);
        assert!(result.classification.stage.refinement);
        assert_eq!(result.aligner, AlignerKind::MafftGinsi);
        assert!(result.backends.scratch_dir.ends_with(SCRATCH_DIR));
    }

    #[test]
    fn test_out_of_range_selectors() {
        let (_dir, fasta, tree) = inputs();
        let config = Config::new();
        for extra in [
            &["--min-group-size", "0"][..],
            &["--sorting", "3"],
            &["--aligner", "4"],
            &["--cores", "0"],
            &["--mode", "4"],
            &["--step3", "2"],
            &["--criterion", "bootstrap"],
            &["--backend", "blast"],
        ] {
            let args = parse(extra, &fasta, &tree);
            assert!(validate_args(&args, &config).is_err(), "accepted {:?}", extra);
        }
    }

    #[test]
    fn test_hmmer_defaults_use_bit_scores() {
        let (_dir, fasta, tree) = inputs();
        let args = parse(&["--backend", "hmmer"], &fasta, &tree);
        let result = validate_args(&args, &Config::new()).unwrap();
        let stage = &result.classification.stage;
        let verdict = |scores: &[(u32, f64)]| {
            decide(scores, stage.acceptance_threshold, stage.separation_threshold).status
        };

        assert_eq!(verdict(&[(1, 250.3), (2, 250.0)]), Status::Outlier);
        assert_eq!(verdict(&[(1, 1.9), (2, 1.7)]), Status::Orphan);
        assert_eq!(verdict(&[(1, 250.3), (2, 120.0)]), Status::Assigned { group_id: 1 });
        assert_eq!(
            result.clustering.stage.separation_threshold,
            stage.separation_threshold
        );

        let args = parse(&["--backend", "identity"], &fasta, &tree);
        let identity = validate_args(&args, &Config::new()).unwrap();
        assert_eq!(identity.classification.stage.acceptance_threshold, 0.5);
    }

    #[test]
    fn test_missing_inputs() {
        let args = Args::from_args(&["hmmerctter"], &["--tree", "missing.nwk"]).unwrap();
        let err = validate_args(&args, &Config::new()).unwrap_err();
        assert!(err.contains("--input"));
    }

    #[test]
    fn test_threshold_rules_from_config() {
        let relaxed_too_large = Config {
            relaxed_separation: Some(0.5),
            separation_threshold: Some(0.1),
            ..Config::default()
        };
        assert!(stage_config(&relaxed_too_large, true, "identity").is_err());

        let zero_rounds = Config {
            max_rescue_rounds: Some(0),
            ..Config::default()
        };
        assert!(stage_config(&zero_rounds, true, "hmmer").is_err());

        let custom = Config {
            acceptance_threshold: Some(20.0),
            ..Config::default()
        };
        let stage = stage_config(&custom, false, "identity").unwrap();
        assert_eq!(stage.acceptance_threshold, 20.0);
        assert!(!stage.refinement);
    }

    #[test]
    fn test_classify_args() {
        let (_dir, fasta, _tree) = inputs();
        let args = ClassifyArgs {
            training_fasta: Some(fasta.clone()),
            target_fasta: Some(fasta),
            step3: 0,
            ..ClassifyArgs::default()
        };
        let config = Config {
            mode: Some(3),
            ..Config::default()
        };
        let result = validate_classify_args(&args, &config).unwrap();
        assert_eq!(result.classification.mode, Mode::Combined);
        assert!(!result.classification.stage.refinement);
    }
}
