// pipeline.rs - Module 1 (tree clustering) and Module 2 (classification) runs

use crate::core::classify::{ClassificationEngine, ClassificationOutcome, Mode, StageConfig};
use crate::core::context::RunContext;
use crate::core::partition::{PartitionConfig, PartitionEngine};
use crate::core::precision::{validate_precision_recall, PrecisionReport};
use crate::core::profile::{ProfileBuilder, ProfileSet};
use crate::data::{Group, Partition, Sequence, SequenceSet, Status, TrainingSet, Tree};
use crate::error::{HcError, Result};
use crate::oracle::{AlignmentOracle, ProfileOracle};
use std::collections::BTreeSet;

/// Parameters of a Module 1 run
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringSettings {
    pub partition: PartitionConfig,
    /// Strategy used to rescue partition outliers
    pub mode: Mode,
    pub stage: StageConfig,
    pub validate_pr: bool,
}

impl Default for ClusteringSettings {
    fn default() -> Self {
        Self {
            partition: PartitionConfig::default(),
            mode: Mode::Standard,
            stage: StageConfig {
                refinement: false,
                ..StageConfig::default()
            },
            validate_pr: true,
        }
    }
}

/// Everything Module 1 produced
#[derive(Debug)]
pub struct ClusteringResult {
    pub partition: Partition,
    /// Partition groups; failed builds are flagged as orphan sources
    pub groups: Vec<Group>,
    pub profiles: ProfileSet,
    pub precision: Vec<PrecisionReport>,
    /// Classification of partition outliers against the group profiles
    pub rescue: Option<ClassificationOutcome>,
}

impl ClusteringResult {
    /// Outliers rescued into a group, with the group id
    pub fn rescued(&self) -> Vec<(String, u32)> {
        let Some(rescue) = &self.rescue else {
            return Vec::new();
        };
        rescue
            .table
            .final_assignments()
            .into_iter()
            .filter_map(|a| a.group_id().map(|g| (a.sequence_id.clone(), g)))
            .collect()
    }

    /// Partition outliers that stayed unplaced
    pub fn remaining_outliers(&self) -> BTreeSet<String> {
        let rescued: BTreeSet<String> = self.rescued().into_iter().map(|(id, _)| id).collect();
        self.partition
            .outliers
            .iter()
            .filter(|id| !rescued.contains(*id))
            .cloned()
            .collect()
    }

    /// Whether a group passed the precision/recall check (true when unchecked)
    pub fn passes_pr(&self, group_id: u32) -> bool {
        if self.precision.is_empty() {
            return self.profiles.get(group_id).is_some();
        }
        self.precision
            .iter()
            .any(|r| r.group_id == group_id && r.passed)
    }
}

/// Module 1: partition the tree, build group profiles, check them and try
/// to place the partition outliers.
///
/// A tree without any qualifying clade is not an error (the partition
/// carries the notice); groups whose profiles all fail to build are.
pub fn run_clustering(
    sequences: &SequenceSet,
    tree: &Tree,
    aligner: &dyn AlignmentOracle,
    oracle: &dyn ProfileOracle,
    settings: &ClusteringSettings,
    ctx: &RunContext,
) -> Result<ClusteringResult> {
    ctx.log.info(format!(
        "Clustering {} sequences (alpha {}, min group size {}, sorting {}, criterion {})",
        sequences.len(),
        settings.partition.alpha,
        settings.partition.min_group_size,
        settings.partition.sort_order,
        settings.partition.criterion
    ));

    let engine = PartitionEngine::new(settings.partition.clone())?;
    let partition = engine.partition(tree, sequences, ctx)?;
    println!(
        "🌿 Partition: {} groups, {} orphans, {} outliers",
        partition.groups.len(),
        partition.orphans.len(),
        partition.outliers.len()
    );

    let mut result = ClusteringResult {
        groups: partition.groups.clone(),
        partition,
        profiles: ProfileSet::new(),
        precision: Vec::new(),
        rescue: None,
    };
    if result.groups.is_empty() {
        return Ok(result);
    }

    let builder = ProfileBuilder::new(aligner, oracle, sequences);
    let report = builder.build_all(&result.groups, ctx)?;
    for group in result.groups.iter_mut() {
        if report.failed.contains(&group.group_id) {
            *group = group.as_orphan_source();
        }
    }
    report.profiles.ensure_available(report.attempted)?;
    result.profiles = report.profiles;

    if settings.validate_pr {
        result.precision =
            validate_precision_recall(&result.groups, &result.profiles, sequences, oracle, ctx)?;
    }

    if !result.partition.outliers.is_empty() {
        let outliers = SequenceSet::from_sequences(
            result
                .partition
                .outliers
                .iter()
                .filter_map(|id| sequences.get(id))
                .cloned(),
        )?;
        let stage = StageConfig {
            refinement: false,
            ..settings.stage.clone()
        };
        let rescue = ClassificationEngine::new(builder, settings.mode, stage)?;
        let outcome = rescue.classify(&outliers, &result.groups, result.profiles.clone(), ctx)?;
        let rescued = outcome.table.counts().assigned;
        ctx.log.info(format!(
            "Outlier rescue ({}): {} of {} outliers placed",
            settings.mode,
            rescued,
            outliers.len()
        ));
        println!("🛟 Rescued {}/{} outliers", rescued, outliers.len());
        result.rescue = Some(outcome);
    }

    Ok(result)
}

/// Parameters of a Module 2 run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationSettings {
    pub mode: Mode,
    pub stage: StageConfig,
}

/// Module 2: build (or reuse) profiles for the training groups and classify
/// the targets. Fails before any row exists when no profile is usable.
pub fn run_classification(
    training: &TrainingSet,
    targets: &SequenceSet,
    aligner: &dyn AlignmentOracle,
    oracle: &dyn ProfileOracle,
    prebuilt: Option<ProfileSet>,
    settings: &ClassificationSettings,
    ctx: &RunContext,
) -> Result<ClassificationOutcome> {
    if let Some(clash) = targets.ids().find(|id| training.sequences.contains(id)) {
        return Err(HcError::Config(format!(
            "target '{}' is also a training sequence; ids must be distinct",
            clash
        )));
    }

    let builder = ProfileBuilder::new(aligner, oracle, &training.sequences);
    let mut groups = training.groups.clone();
    let profiles = match prebuilt {
        Some(profiles) => profiles,
        None => {
            let report = builder.build_all(&groups, ctx)?;
            for group in groups.iter_mut() {
                if report.failed.contains(&group.group_id) {
                    *group = group.as_orphan_source();
                }
            }
            report.profiles.ensure_available(report.attempted)?;
            report.profiles
        }
    };
    profiles.ensure_available(groups.len())?;

    let engine = ClassificationEngine::new(builder, settings.mode, settings.stage.clone())?;
    let outcome = engine.classify(targets, &groups, profiles, ctx)?;

    let counts = outcome.table.counts();
    ctx.log.info(format!(
        "Classification finished after {} pass(es): {} assigned, {} orphans, {} outliers, {} failed",
        outcome.passes, counts.assigned, counts.orphan, counts.outlier, counts.failed
    ));
    Ok(outcome)
}

/// Training set built from a Module 1 result: established groups that
/// passed the precision/recall check (or all usable groups when unchecked)
pub fn training_from_clustering(result: &ClusteringResult, sequences: &SequenceSet) -> Result<TrainingSet> {
    let groups: Vec<Group> = result
        .groups
        .iter()
        .filter(|g| g.is_usable() && result.passes_pr(g.group_id))
        .cloned()
        .collect();
    let members: Vec<Sequence> = groups
        .iter()
        .flat_map(|g| g.member_ids.iter())
        .filter_map(|id| sequences.get(id))
        .cloned()
        .collect();
    Ok(TrainingSet {
        sequences: SequenceSet::from_sequences(members)?,
        groups,
    })
}

/// Profiles of the groups kept in a training set
pub fn profiles_for(training: &TrainingSet, profiles: &ProfileSet) -> ProfileSet {
    let mut kept = ProfileSet::new();
    for group in &training.groups {
        if let Some(profile) = profiles.get(group.group_id) {
            kept.insert(profile.clone());
        }
    }
    kept
}

/// Final row status label and group column (`-1` when not assigned)
pub fn group_column(status: &Status) -> i64 {
    status.group_id().map_or(-1, i64::from)
}
