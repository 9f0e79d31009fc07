// classify.rs - Score targets against group profiles and assign them

use crate::core::context::{RunContext, UnitFailure};
use crate::core::profile::{ProfileBuilder, ProfileSet};
use crate::data::{Assignment, AssignmentTable, Group, Sequence, SequenceSet, Status};
use crate::error::{HcError, Result};
use crate::oracle::{ProfileOracle, ScoreThresholds};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Classification strategy (`--mode 0..3`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Single best-hit pass
    #[default]
    Standard,
    /// One extra pass re-deciding outliers with the relaxed separation
    OutlierRescue,
    /// Rebuild profiles and rescore outliers until nothing moves
    IterativeRescue,
    /// Outlier rescue followed by iterative rescue
    Combined,
}

impl Mode {
    pub fn from_selector(selector: u8) -> std::result::Result<Self, String> {
        match selector {
            0 => Ok(Mode::Standard),
            1 => Ok(Mode::OutlierRescue),
            2 => Ok(Mode::IterativeRescue),
            3 => Ok(Mode::Combined),
            _ => Err(format!(
                "Invalid mode: {}. Use 0 (standard), 1 (OR), 2 (IOR) or 3 (OR+IOR)",
                selector
            )),
        }
    }

    pub fn selector(&self) -> u8 {
        match self {
            Mode::Standard => 0,
            Mode::OutlierRescue => 1,
            Mode::IterativeRescue => 2,
            Mode::Combined => 3,
        }
    }

    fn rescues_once(&self) -> bool {
        matches!(self, Mode::OutlierRescue | Mode::Combined)
    }

    fn iterates(&self) -> bool {
        matches!(self, Mode::IterativeRescue | Mode::Combined)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Standard => "standard",
            Mode::OutlierRescue => "OR",
            Mode::IterativeRescue => "IOR",
            Mode::Combined => "OR+IOR",
        };
        write!(f, "{}", s)
    }
}

/// Acceptance rules and loop bounds for one classification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Minimum best score for any assignment
    pub acceptance_threshold: f64,
    /// Minimum best minus runner-up margin
    pub separation_threshold: f64,
    /// Margin used when rescuing outliers (OR, OR+IOR)
    pub relaxed_separation: f64,
    pub max_rescue_rounds: u32,
    /// Step 3: fold assignments back into groups and rescore unresolved targets
    pub refinement: bool,
    pub max_refinement_rounds: u32,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.5,
            separation_threshold: 0.1,
            relaxed_separation: 0.02,
            max_rescue_rounds: 5,
            refinement: true,
            max_refinement_rounds: 3,
        }
    }
}

impl StageConfig {
    /// Defaults with the decision thresholds of a particular score scale
    pub fn with_thresholds(thresholds: ScoreThresholds) -> Self {
        Self {
            acceptance_threshold: thresholds.acceptance,
            separation_threshold: thresholds.separation,
            relaxed_separation: thresholds.relaxed_separation,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("acceptance_threshold", self.acceptance_threshold),
            ("separation_threshold", self.separation_threshold),
            ("relaxed_separation", self.relaxed_separation),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(HcError::Config(format!("{} must be a finite number", name)));
            }
        }
        if self.separation_threshold < 0.0 || self.relaxed_separation < 0.0 {
            return Err(HcError::Config("separation thresholds must be non-negative".to_string()));
        }
        if self.relaxed_separation > self.separation_threshold {
            return Err(HcError::Config(format!(
                "relaxed_separation ({}) must not exceed separation_threshold ({})",
                self.relaxed_separation, self.separation_threshold
            )));
        }
        if self.max_rescue_rounds == 0 || self.max_refinement_rounds == 0 {
            return Err(HcError::Config("round caps must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Outcome of the acceptance rule for one target
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub status: Status,
    /// Best (group, score), ties broken by the lower group id
    pub best: Option<(u32, f64)>,
    pub runner_up: Option<f64>,
}

impl Decision {
    pub fn margin(&self) -> Option<f64> {
        match (self.best, self.runner_up) {
            (Some((_, best)), Some(second)) => Some(best - second),
            (Some(_), None) => Some(f64::INFINITY),
            _ => None,
        }
    }
}

/// Apply the acceptance rule to one target's scores.
///
/// Orphan when the best score is below `acceptance`; otherwise Assigned when
/// best minus runner-up is at least `separation`, else Outlier. With a
/// single profile the margin is unbounded.
pub fn decide(scores: &[(u32, f64)], acceptance: f64, separation: f64) -> Decision {
    let mut best: Option<(u32, f64)> = None;
    for &(group_id, score) in scores.iter().filter(|(_, s)| s.is_finite()) {
        best = match best {
            Some((g, s)) if s > score || (s == score && g < group_id) => Some((g, s)),
            _ => Some((group_id, score)),
        };
    }

    let Some((best_group, best_score)) = best else {
        return Decision {
            status: Status::Orphan,
            best: None,
            runner_up: None,
        };
    };

    let runner_up = scores
        .iter()
        .filter(|(g, s)| *g != best_group && s.is_finite())
        .map(|&(_, s)| s)
        .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))));

    let status = if best_score < acceptance {
        Status::Orphan
    } else if runner_up.map_or(f64::INFINITY, |second| best_score - second) >= separation {
        Status::Assigned { group_id: best_group }
    } else {
        Status::Outlier
    };

    Decision {
        status,
        best: Some((best_group, best_score)),
        runner_up,
    }
}

/// One score reported by the profile backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRow {
    pub sequence_id: String,
    pub stage: u32,
    pub group_id: u32,
    pub score: f64,
}

/// Everything a classification run produced
#[derive(Debug)]
pub struct ClassificationOutcome {
    pub table: AssignmentTable,
    /// Final group snapshots (with folded-in targets when feedback ran)
    pub groups: Vec<Group>,
    pub profiles: ProfileSet,
    pub scores: Vec<ScoreRow>,
    /// Stage number of the last pass
    pub passes: u32,
    pub rescue_rounds: u32,
    pub refinement_rounds: u32,
}

/// A target id with its (group, score) list, or the scoring failure
pub type ScoredTarget = (String, std::result::Result<Vec<(u32, f64)>, HcError>);

/// Score targets against every profile in parallel; a barrier for the pass.
///
/// A target whose scoring fails carries the error instead of scores. On
/// cancellation nothing is returned.
pub fn score_targets(
    targets: &[&Sequence],
    profiles: &ProfileSet,
    oracle: &dyn ProfileOracle,
    ctx: &RunContext,
    during: &str,
) -> Result<Vec<ScoredTarget>> {
    let pb = ctx.progress_bar(targets.len(), during);

    let results: Vec<Option<ScoredTarget>> = ctx.install(|| {
        targets
            .par_iter()
            .map(|target| {
                if ctx.should_stop() {
                    return None;
                }
                let mut scores = Vec::with_capacity(profiles.len());
                for profile in profiles.iter() {
                    match oracle.score(&profile.model, target) {
                        Ok(score) => scores.push((profile.group_id, score)),
                        Err(source) => {
                            pb.inc(1);
                            return Some((
                                target.id.clone(),
                                Err(HcError::ScoringFailed {
                                    sequence_id: target.id.clone(),
                                    group_id: profile.group_id,
                                    source,
                                }),
                            ));
                        }
                    }
                }
                pb.inc(1);
                Some((target.id.clone(), Ok(scores)))
            })
            .collect()
    });
    pb.finish_and_clear();

    ctx.check_cancelled(during)?;
    Ok(results.into_iter().flatten().collect())
}


/// Mutable bookkeeping of a single classify call
struct RunState {
    table: AssignmentTable,
    groups: BTreeMap<u32, Group>,
    profiles: ProfileSet,
    latest_scores: HashMap<String, Vec<(u32, f64)>>,
    score_log: Vec<ScoreRow>,
    folded: HashSet<String>,
    stage: u32,
}

/// Scores targets against profiles and drives the per-sequence state machine
/// `Unclassified -> {Assigned, Orphan, Outlier}`, with optional rescue of
/// outliers and step-3 refinement. Assigned is terminal.
pub struct ClassificationEngine<'a> {
    builder: ProfileBuilder<'a>,
    mode: Mode,
    config: StageConfig,
}

impl<'a> ClassificationEngine<'a> {
    pub fn new(builder: ProfileBuilder<'a>, mode: Mode, config: StageConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            builder,
            mode,
            config,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Classify every target. Groups must be the snapshots `profiles` were
    /// built from; they are only replaced (never mutated) as targets fold in.
    pub fn classify(
        &self,
        targets: &SequenceSet,
        groups: &[Group],
        profiles: ProfileSet,
        ctx: &RunContext,
    ) -> Result<ClassificationOutcome> {
        profiles.ensure_available(groups.len().max(profiles.len()))?;
        let builder = self.builder.clone().with_pool(targets);

        ctx.log.info(format!(
            "Classifying {} targets against {} profiles (mode {}, step 3 {})",
            targets.len(),
            profiles.len(),
            self.mode,
            if self.config.refinement { "on" } else { "off" }
        ));

        let mut state = RunState {
            table: AssignmentTable::new(),
            groups: groups.iter().map(|g| (g.group_id, g.clone())).collect(),
            profiles,
            latest_scores: HashMap::new(),
            score_log: Vec::new(),
            folded: HashSet::new(),
            stage: 1,
        };

        // Primary pass
        let all: Vec<&Sequence> = targets.iter().collect();
        let scored = score_targets(&all, &state.profiles, self.builder.oracle(), ctx, "primary scoring")?;
        for (sequence_id, result) in scored {
            match result {
                Ok(scores) => {
                    let decision = decide(
                        &scores,
                        self.config.acceptance_threshold,
                        self.config.separation_threshold,
                    );
                    self.commit(&mut state, ctx, &sequence_id, &decision);
                    self.remember(&mut state, sequence_id, scores);
                }
                Err(e) => {
                    ctx.record_failure(UnitFailure::sequence(&sequence_id, 1, e.to_string()));
                    state.table.record(Assignment {
                        sequence_id,
                        status: Status::Failed {
                            reason: e.to_string(),
                        },
                        stage: 1,
                        score: None,
                        runner_up: None,
                    });
                }
            }
        }
        self.report_pass(&state, "primary pass");

        if self.mode.rescues_once() {
            self.outlier_rescue(&mut state, ctx);
        }

        let mut rescue_rounds = 0;
        if self.mode.iterates() {
            let separation = match self.mode {
                Mode::Combined => self.config.relaxed_separation,
                _ => self.config.separation_threshold,
            };
            for round in 1..=self.config.max_rescue_rounds {
                let outliers = state.table.ids_where(|s| matches!(s, Status::Outlier));
                if outliers.is_empty() {
                    break;
                }
                rescue_rounds = round;
                match self.feedback_round(&mut state, &builder, targets, &outliers, separation, ctx)? {
                    Some(0) | None => break,
                    Some(_) => {}
                }
            }
            ctx.log.info(format!("Iterative rescue ran {} round(s)", rescue_rounds));
            self.report_pass(&state, "outlier rescue");
        }

        let mut refinement_rounds = 0;
        if self.config.refinement {
            for round in 1..=self.config.max_refinement_rounds {
                let unresolved = state.table.ids_where(Status::is_unresolved);
                if unresolved.is_empty() {
                    break;
                }
                refinement_rounds = round;
                match self.feedback_round(
                    &mut state,
                    &builder,
                    targets,
                    &unresolved,
                    self.config.separation_threshold,
                    ctx,
                )? {
                    Some(0) | None => break,
                    Some(_) => {}
                }
            }
            ctx.log.info(format!("Step 3 refinement ran {} round(s)", refinement_rounds));
            self.report_pass(&state, "step 3 refinement");
        }

        Ok(ClassificationOutcome {
            table: state.table,
            groups: state.groups.into_values().collect(),
            profiles: state.profiles,
            scores: state.score_log,
            passes: state.stage,
            rescue_rounds,
            refinement_rounds,
        })
    }

    /// Re-decide current outliers on their existing scores with the relaxed margin
    fn outlier_rescue(&self, state: &mut RunState, ctx: &RunContext) {
        state.stage += 1;
        let outliers = state.table.ids_where(|s| matches!(s, Status::Outlier));
        let mut rescued = 0;
        for id in outliers {
            let Some(scores) = state.latest_scores.get(&id) else { continue };
            let decision = decide(
                scores,
                self.config.acceptance_threshold,
                self.config.relaxed_separation,
            );
            if decision.status.is_assigned() {
                self.commit(state, ctx, &id, &decision);
                rescued += 1;
            }
        }
        ctx.log.info(format!(
            "Stage {}: outlier rescue reassigned {} sequence(s)",
            state.stage, rescued
        ));
    }

    /// Fold new assignments into their groups, rebuild what changed, then
    /// rescore `candidates`. Only transitions to Assigned are accepted.
    ///
    /// Returns the number of newly assigned candidates, or `None` when no
    /// profile survived the rebuild.
    fn feedback_round(
        &self,
        state: &mut RunState,
        builder: &ProfileBuilder<'_>,
        targets: &SequenceSet,
        candidates: &[String],
        separation: f64,
        ctx: &RunContext,
    ) -> Result<Option<usize>> {
        let folded = self.fold_assigned(state);
        if folded > 0 {
            let groups: Vec<Group> = state.groups.values().cloned().collect();
            let report = builder.rebuild_changed(&state.profiles, &groups, ctx)?;
            for group_id in &report.failed {
                if let Some(group) = state.groups.get_mut(group_id) {
                    *group = group.as_orphan_source();
                }
            }
            state.profiles = report.profiles;
            if state.profiles.is_empty() {
                ctx.log.warn("No profile survived rebuilding; stopping feedback passes");
                println!("⚠️  No profile survived rebuilding; stopping feedback passes");
                return Ok(None);
            }
        }

        state.stage += 1;
        let stage = state.stage;
        let to_score: Vec<&Sequence> = candidates.iter().filter_map(|id| targets.get(id)).collect();
        let scored = score_targets(&to_score, &state.profiles, self.builder.oracle(), ctx, "rescoring")?;

        let mut assigned = 0;
        for (sequence_id, result) in scored {
            match result {
                Ok(scores) => {
                    let decision = decide(&scores, self.config.acceptance_threshold, separation);
                    if decision.status.is_assigned() {
                        self.commit(state, ctx, &sequence_id, &decision);
                        assigned += 1;
                    }
                    self.remember(state, sequence_id, scores);
                }
                Err(e) => {
                    ctx.record_failure(UnitFailure::sequence(&sequence_id, stage, e.to_string()));
                }
            }
        }
        ctx.log.info(format!(
            "Stage {}: {} folded, {} of {} rescored sequence(s) assigned",
            stage,
            folded,
            assigned,
            candidates.len()
        ));
        Ok(Some(assigned))
    }

    /// Add assigned targets not yet folded to new snapshots of their groups
    fn fold_assigned(&self, state: &mut RunState) -> usize {
        let pending: Vec<(u32, String)> = state
            .table
            .final_assignments()
            .into_iter()
            .filter(|a| !state.folded.contains(&a.sequence_id))
            .filter_map(|a| a.group_id().map(|g| (g, a.sequence_id.clone())))
            .collect();

        let mut folded = 0;
        for (group_id, sequence_id) in pending {
            if let Some(group) = state.groups.get_mut(&group_id) {
                *group = group.with_members([sequence_id.as_str()]);
                folded += 1;
            }
            state.folded.insert(sequence_id);
        }
        folded
    }

    fn commit(&self, state: &mut RunState, ctx: &RunContext, sequence_id: &str, decision: &Decision) {
        let stage = state.stage;
        let margin = decision
            .margin()
            .map(|m| if m.is_finite() { format!("{:.3}", m) } else { "inf".to_string() })
            .unwrap_or_else(|| "-".to_string());
        ctx.log.info(format!(
            "stage {}: {} -> {} (best {}, margin {})",
            stage,
            sequence_id,
            decision.status,
            decision
                .best
                .map(|(g, s)| format!("group {} = {:.3}", g, s))
                .unwrap_or_else(|| "-".to_string()),
            margin
        ));
        state.table.record(Assignment {
            sequence_id: sequence_id.to_string(),
            status: decision.status.clone(),
            stage,
            score: decision.best.map(|(_, s)| s),
            runner_up: decision.runner_up,
        });
    }

    fn remember(&self, state: &mut RunState, sequence_id: String, scores: Vec<(u32, f64)>) {
        let stage = state.stage;
        state
            .score_log
            .extend(scores.iter().map(|&(group_id, score)| ScoreRow {
                sequence_id: sequence_id.clone(),
                stage,
                group_id,
                score,
            }));
        state.latest_scores.insert(sequence_id, scores);
    }

    fn report_pass(&self, state: &RunState, label: &str) {
        let counts = state.table.counts();
        println!(
            "🎯 {} (stage {}): {} assigned, {} orphans, {} outliers, {} failed",
            label, state.stage, counts.assigned, counts.orphan, counts.outlier, counts.failed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profile::testing::*;
    use crate::data::Origin;

    fn ctx() -> RunContext {
        RunContext::new(2).unwrap().quiet()
    }

    fn config(separation: f64, refinement: bool) -> StageConfig {
        StageConfig {
            acceptance_threshold: 0.5,
            separation_threshold: separation,
            relaxed_separation: separation.min(0.02),
            max_rescue_rounds: 5,
            refinement,
            max_refinement_rounds: 3,
        }
    }

    fn run(
        oracle: &TableOracle,
        training: &SequenceSet,
        groups: &[Group],
        targets: &SequenceSet,
        mode: Mode,
        config: StageConfig,
    ) -> Result<ClassificationOutcome> {
        let ctx = ctx();
        let builder = ProfileBuilder::new(&PASSTHROUGH, oracle, training);
        let profiles = builder.build_all(groups, &ctx)?.profiles;
        let engine = ClassificationEngine::new(builder, mode, config)?;
        engine.classify(targets, groups, profiles, &ctx)
    }

    #[test]
    fn test_decide_scenarios() {
        let clear = decide(&[(1, 0.95), (2, 0.40)], 0.5, 0.2);
        assert_eq!(clear.status, Status::Assigned { group_id: 1 });

        let close = decide(&[(1, 0.80), (2, 0.78)], 0.5, 0.2);
        assert_eq!(close.status, Status::Outlier);

        let weak = decide(&[(1, 0.30), (2, 0.10)], 0.5, 0.2);
        assert_eq!(weak.status, Status::Orphan);

        assert_eq!(decide(&[], 0.5, 0.2).status, Status::Orphan);
    }

    #[test]
    fn test_decide_single_profile_and_ties() {
        let single = decide(&[(7, 0.6)], 0.5, 10.0);
        assert_eq!(single.status, Status::Assigned { group_id: 7 });
        assert_eq!(single.margin(), Some(f64::INFINITY));

        let tie = decide(&[(3, 0.9), (2, 0.9)], 0.5, 0.0);
        assert_eq!(tie.best, Some((2, 0.9)));
        assert_eq!(tie.status, Status::Assigned { group_id: 2 });

        let nan = decide(&[(1, f64::NAN), (2, 0.9)], 0.5, 0.1);
        assert_eq!(nan.status, Status::Assigned { group_id: 2 });
    }

    #[test]
    fn test_margin_monotonicity() {
        let score_sets: Vec<Vec<(u32, f64)>> = vec![
            vec![(1, 0.95), (2, 0.40)],
            vec![(1, 0.80), (2, 0.78), (3, 0.10)],
            vec![(1, 0.55), (2, 0.20)],
            vec![(1, 0.70)],
            vec![(1, 0.60), (2, 0.65), (3, 0.64)],
            vec![(1, 0.30)],
        ];
        let separations = [0.0, 0.01, 0.05, 0.1, 0.2, 0.4, 0.8];
        for scores in &score_sets {
            let mut was_assigned = true;
            for &sep in &separations {
                let status = decide(scores, 0.5, sep).status;
                if !was_assigned {
                    assert!(!status.is_assigned(), "{:?} reassigned at {}", scores, sep);
                }
                if !status.is_assigned() {
                    assert!(matches!(status, Status::Outlier | Status::Orphan));
                }
                was_assigned = status.is_assigned();
            }
        }
    }

    #[test]
    fn test_standard_pass_scenarios() {
        let training = seqs(&["a", "b", "c", "d"], Origin::Training);
        let targets = seqs(&["t1", "t2", "t3"], Origin::Target);
        let groups = vec![group(1, &["a", "b"]), group(2, &["c", "d"])];
        let oracle = TableOracle::new()
            .with_score("t1", 1, 0.95)
            .with_score("t1", 2, 0.40)
            .with_score("t2", 1, 0.80)
            .with_score("t2", 2, 0.78)
            .with_score("t3", 1, 0.10);

        let outcome = run(&oracle, &training, &groups, &targets, Mode::Standard, config(0.2, false)).unwrap();
        let table = &outcome.table;
        assert_eq!(table.status("t1"), Some(&Status::Assigned { group_id: 1 }));
        assert_eq!(table.status("t2"), Some(&Status::Outlier));
        assert_eq!(table.status("t3"), Some(&Status::Orphan));
        assert_eq!(table.len(), 3);
        assert_eq!(outcome.passes, 1);
        assert_eq!(outcome.scores.len(), 6);
    }

    #[test]
    fn test_no_profiles_is_fatal_with_no_rows() {
        let training = seqs(&["a", "b"], Origin::Training);
        let targets = seqs(&["t1"], Origin::Target);
        let groups = vec![group(1, &["a"]), group(2, &["b"])];
        let oracle = TableOracle::new().fail_group(1).fail_group(2);

        let result = run(&oracle, &training, &groups, &targets, Mode::Standard, config(0.1, true));
        match result {
            Err(HcError::NoProfilesAvailable { attempted }) => assert_eq!(attempted, 2),
            other => panic!("expected NoProfilesAvailable, got {:?}", other.map(|o| o.table.len())),
        }
    }

    #[test]
    fn test_scoring_failure_is_per_target() {
        let training = seqs(&["a", "b"], Origin::Training);
        let targets = seqs(&["t1", "bad"], Origin::Target);
        let groups = vec![group(1, &["a"]), group(2, &["b"])];
        let oracle = TableOracle::new()
            .with_score("t1", 1, 0.9)
            .fail_target("bad");

        let outcome = run(&oracle, &training, &groups, &targets, Mode::Standard, config(0.1, false)).unwrap();
        assert_eq!(outcome.table.status("t1"), Some(&Status::Assigned { group_id: 1 }));
        assert!(matches!(outcome.table.status("bad"), Some(Status::Failed { .. })));
        assert_eq!(outcome.table.counts().failed, 1);
    }

    #[test]
    fn test_or_mode_rescues_close_calls() {
        let training = seqs(&["a", "b"], Origin::Training);
        let targets = seqs(&["t1"], Origin::Target);
        let groups = vec![group(1, &["a"]), group(2, &["b"])];
        let oracle = TableOracle::new().with_score("t1", 1, 0.80).with_score("t1", 2, 0.75);

        let standard = run(&oracle, &training, &groups, &targets, Mode::Standard, config(0.1, false)).unwrap();
        assert_eq!(standard.table.status("t1"), Some(&Status::Outlier));

        let rescued = run(&oracle, &training, &groups, &targets, Mode::OutlierRescue, config(0.1, false)).unwrap();
        let row = rescued.table.latest("t1").unwrap();
        assert_eq!(row.status, Status::Assigned { group_id: 1 });
        assert_eq!(row.stage, 2);
        assert_eq!(rescued.table.rows().len(), 2);
    }

    #[test]
    fn test_ior_terminates_within_round_cap() {
        let training = seqs(&["a", "b"], Origin::Training);
        let targets = seqs(&["t0", "t1", "t2", "t3", "t4"], Origin::Target);
        let groups = vec![group(1, &["a"]), group(2, &["b"])];
        let mut oracle = TableOracle::new().with_score("t0", 1, 0.9).with_score("t0", 2, 0.1);
        // Every outlier looks ambiguous until group 1 has grown by one more member
        for (k, id) in ["t1", "t2", "t3", "t4"].iter().enumerate() {
            oracle = oracle
                .with_score(id, 1, 0.6)
                .with_score(id, 2, 0.6)
                .grown_score(id, 1, k + 2, 0.9);
        }
        let cfg = StageConfig {
            max_rescue_rounds: 2,
            ..config(0.1, false)
        };

        let outcome = run(&oracle, &training, &groups, &targets, Mode::IterativeRescue, cfg).unwrap();
        let table = &outcome.table;
        assert_eq!(outcome.rescue_rounds, 2);
        assert_eq!(table.latest("t1").unwrap().stage, 2);
        assert_eq!(table.latest("t2").unwrap().stage, 3);
        assert_eq!(table.status("t2"), Some(&Status::Assigned { group_id: 1 }));
        assert_eq!(table.status("t3"), Some(&Status::Outlier));
        assert_eq!(table.status("t4"), Some(&Status::Outlier));
        assert_eq!(outcome.passes, 3);
    }

    #[test]
    fn test_ior_with_oscillating_scores_stops_at_round_cap() {
        // Each rebuild flips which group looks best for the next outlier
        let training = seqs(&["a", "b"], Origin::Training);
        let targets = seqs(&["t0", "t1", "t2", "t3", "t4"], Origin::Target);
        let groups = vec![group(1, &["a"]), group(2, &["b"])];
        let mut oracle = TableOracle::new().with_score("t0", 1, 0.9);
        for t in ["t1", "t2", "t3", "t4"] {
            oracle = oracle.with_score(t, 1, 0.6).with_score(t, 2, 0.6);
        }
        let oracle = oracle
            .grown_score("t1", 1, 2, 0.9)
            .grown_score("t2", 1, 3, 0.2)
            .grown_score("t3", 1, 3, 0.62)
            .grown_score("t3", 2, 2, 0.4);
        let capped = StageConfig {
            max_rescue_rounds: 3,
            ..config(0.1, false)
        };

        let outcome = run(&oracle, &training, &groups, &targets, Mode::IterativeRescue, capped).unwrap();
        assert_eq!(outcome.rescue_rounds, 3);
        assert_eq!(outcome.passes, 4);
        assert_eq!(outcome.table.status("t1"), Some(&Status::Assigned { group_id: 1 }));
        assert_eq!(outcome.table.status("t2"), Some(&Status::Assigned { group_id: 2 }));
        assert_eq!(outcome.table.status("t3"), Some(&Status::Assigned { group_id: 1 }));
        assert_eq!(outcome.table.status("t4"), Some(&Status::Outlier));
    }

    #[test]
    fn test_step3_assigns_orphan_in_stage_two() {
        let training = seqs(&["a", "b", "c", "d"], Origin::Training);
        let targets = seqs(&["t1", "t2"], Origin::Target);
        let groups = vec![group(1, &["a", "b"]), group(2, &["c", "d"])];
        let oracle = TableOracle::new()
            .with_score("t1", 1, 0.9)
            .with_score("t1", 2, 0.1)
            .with_score("t2", 1, 0.3)
            .with_score("t2", 2, 0.1)
            .grown_score("t2", 1, 3, 0.85);

        let without = run(&oracle, &training, &groups, &targets, Mode::Standard, config(0.1, false)).unwrap();
        assert_eq!(without.table.status("t2"), Some(&Status::Orphan));

        let outcome = run(&oracle, &training, &groups, &targets, Mode::Standard, config(0.1, true)).unwrap();
        let t2 = outcome.table.latest("t2").unwrap();
        assert_eq!(t2.status, Status::Assigned { group_id: 1 });
        assert_eq!(t2.stage, 2);
        assert_eq!(outcome.table.latest("t1").unwrap().stage, 1);

        let g1 = outcome.groups.iter().find(|g| g.group_id == 1).unwrap();
        assert!(g1.contains("t1"));
        assert_eq!(outcome.profiles.get(1).unwrap().version, 2);
        assert!(outcome.refinement_rounds <= 3);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let training = seqs(&["a", "b", "c"], Origin::Training);
        let targets = seqs(&["t1", "t2", "t3", "t4"], Origin::Target);
        let groups = vec![group(1, &["a"]), group(2, &["b"]), group(3, &["c"])];
        let oracle = TableOracle::new()
            .with_score("t1", 1, 0.9)
            .with_score("t2", 2, 0.7)
            .with_score("t2", 3, 0.7)
            .with_score("t3", 3, 0.6)
            .with_score("t4", 1, 0.2);

        let first = run(&oracle, &training, &groups, &targets, Mode::Combined, config(0.1, true)).unwrap();
        let second = run(&oracle, &training, &groups, &targets, Mode::Combined, config(0.1, true)).unwrap();
        let a: Vec<Assignment> = first.table.final_assignments().into_iter().cloned().collect();
        let b: Vec<Assignment> = second.table.final_assignments().into_iter().cloned().collect();
        assert_eq!(a, b);
        assert_eq!(a[1].status, Status::Outlier);
        assert_eq!(a[2].group_id(), Some(3));
    }

    #[test]
    fn test_stage_config_validation() {
        assert!(StageConfig::default().validate().is_ok());
        let bad = StageConfig {
            relaxed_separation: 0.5,
            separation_threshold: 0.1,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let zero = StageConfig {
            max_rescue_rounds: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
        assert_eq!(Mode::from_selector(3).unwrap(), Mode::Combined);
        assert!(Mode::from_selector(4).is_err());
    }
}
