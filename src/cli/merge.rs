// merge.rs - Merge configuration file with CLI arguments

use crate::cli::{Args, ClassifyArgs, Config};

impl Args {
    /// Merge with configuration from file
    /// CLI arguments take precedence over config file values
    pub fn merge_with_config(mut self, config: &Config) -> Self {
        // Input/Output
        if self.input.is_none() {
            self.input = config.input.clone();
        }
        if self.tree.is_none() {
            self.tree = config.tree.clone();
        }
        if self.target.is_none() {
            self.target = config.target.clone();
        }
        if self.output_dir == "." {
            if let Some(dir) = &config.output_dir {
                self.output_dir = dir.clone();
            }
        }

        // Partition (only override defaults, not explicit CLI values)
        if self.min_group_size == 4 {
            if let Some(size) = config.min_group_size {
                self.min_group_size = size;
            }
        }
        if self.sorting == 1 {
            if let Some(sorting) = config.sorting {
                self.sorting = sorting;
            }
        }
        if self.threshold == 3.0 {
            if let Some(threshold) = config.threshold {
                self.threshold = threshold;
            }
        }
        if self.criterion == "support" {
            if let Some(criterion) = &config.criterion {
                self.criterion = criterion.clone();
            }
        }

        // Classification
        if self.mode == 0 {
            if let Some(mode) = config.mode {
                self.mode = mode;
            }
        }
        if self.step3 == 1 {
            if let Some(step3) = config.step3 {
                self.step3 = step3;
            }
        }

        // Backends
        if self.aligner == 0 {
            if let Some(aligner) = config.aligner {
                self.aligner = aligner;
            }
        }
        if self.backend == "hmmer" {
            if let Some(backend) = &config.backend {
                self.backend = backend.clone();
            }
        }

        // Performance
        if self.cores == 4 {
            if let Some(cores) = config.cores {
                self.cores = cores;
            }
        }
        if self.timeout.is_none() {
            self.timeout = config.timeout;
        }

        // Flags (CLI flags take precedence, config only sets if not explicitly set)
        if !self.dry_run && config.dry_run.unwrap_or(false) {
            self.dry_run = true;
        }

        self
    }

    /// Load configuration and merge with CLI args; the config is returned
    /// for the settings that only live in the file
    pub fn with_config_file(self, config_path: &str) -> Result<(Self, Config), String> {
        let config = Config::from_file(config_path)?;
        let merged = self.merge_with_config(&config);
        Ok((merged, config))
    }
}

impl ClassifyArgs {
    /// Same precedence rules as [`Args::merge_with_config`]
    pub fn merge_with_config(mut self, config: &Config) -> Self {
        if self.training_fasta.is_none() {
            self.training_fasta = config.training_fasta.clone();
        }
        if self.target_fasta.is_none() {
            self.target_fasta = config.target_fasta.clone();
        }
        if self.output_dir == "." {
            if let Some(dir) = &config.output_dir {
                self.output_dir = dir.clone();
            }
        }
        if self.cores == 4 {
            if let Some(cores) = config.cores {
                self.cores = cores;
            }
        }
        if self.step3 == 1 {
            if let Some(step3) = config.step3 {
                self.step3 = step3;
            }
        }
        if self.backend == "hmmer" {
            if let Some(backend) = &config.backend {
                self.backend = backend.clone();
            }
        }
        if self.timeout.is_none() {
            self.timeout = config.timeout;
        }
        self
    }

    pub fn with_config_file(self, config_path: &str) -> Result<(Self, Config), String> {
        let config = Config::from_file(config_path)?;
        let merged = self.merge_with_config(&config);
        Ok((merged, config))
    }
}
