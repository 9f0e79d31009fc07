// precision.rs - 100% precision/recall check of group profiles

use crate::core::classify::score_targets;
use crate::core::context::{RunContext, UnitFailure};
use crate::core::profile::ProfileSet;
use crate::data::{Group, Sequence, SequenceSet};
use crate::error::Result;
use crate::oracle::ProfileOracle;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Per-group outcome of the precision/recall check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrecisionReport {
    pub group_id: u32,
    pub members: usize,
    pub min_member_score: Option<f64>,
    pub max_non_member_score: Option<f64>,
    /// Every member outscores every non-member against this group's profile
    pub passed: bool,
}

/// Score every grouped sequence against every profile and check that each
/// profile separates its own members from all other grouped sequences.
///
/// Groups without a profile, or with a member that could not be scored, fail.
pub fn validate_precision_recall(
    groups: &[Group],
    profiles: &ProfileSet,
    sequences: &SequenceSet,
    oracle: &dyn ProfileOracle,
    ctx: &RunContext,
) -> Result<Vec<PrecisionReport>> {
    let grouped: Vec<&Sequence> = groups
        .iter()
        .flat_map(|g| g.member_ids.iter())
        .filter_map(|id| sequences.get(id))
        .collect();

    let scored = score_targets(&grouped, profiles, oracle, ctx, "precision/recall check")?;

    let mut by_target: HashMap<String, Vec<(u32, f64)>> = HashMap::new();
    let mut unscored: BTreeSet<String> = BTreeSet::new();
    for (id, result) in scored {
        match result {
            Ok(scores) => {
                by_target.insert(id, scores);
            }
            Err(e) => {
                ctx.record_failure(UnitFailure::sequence(&id, 1, e.to_string()));
                unscored.insert(id);
            }
        }
    }

    let mut reports = Vec::with_capacity(groups.len());
    for group in groups {
        let group_id = group.group_id;
        let mut min_member: Option<f64> = None;
        let mut max_other: Option<f64> = None;
        for (id, scores) in &by_target {
            let Some(&(_, score)) = scores.iter().find(|(g, _)| *g == group_id) else {
                continue;
            };
            if group.contains(id) {
                min_member = Some(min_member.map_or(score, |m| m.min(score)));
            } else {
                max_other = Some(max_other.map_or(score, |m| m.max(score)));
            }
        }

        let complete = profiles.get(group_id).is_some()
            && !group.member_ids.iter().any(|id| unscored.contains(id));
        let passed = complete
            && match (min_member, max_other) {
                (Some(member), Some(other)) => member > other,
                (Some(_), None) => true,
                _ => false,
            };

        ctx.log.info(format!(
            "Group {} precision/recall: {} (min member {}, max non-member {})",
            group_id,
            if passed { "100%" } else { "below 100%" },
            fmt_score(min_member),
            fmt_score(max_other)
        ));
        reports.push(PrecisionReport {
            group_id,
            members: group.len(),
            min_member_score: min_member,
            max_non_member_score: max_other,
            passed,
        });
    }

    let passing = reports.iter().filter(|r| r.passed).count();
    println!("✅ {}/{} groups reach 100% precision/recall", passing, reports.len());
    Ok(reports)
}

fn fmt_score(score: Option<f64>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{:.3}", s))
}
