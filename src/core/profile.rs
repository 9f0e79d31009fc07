// profile.rs - Group to profile bookkeeping on top of the backends

use crate::core::context::{RunContext, UnitFailure};
use crate::data::{Group, Sequence, SequenceSet};
use crate::error::{HcError, OracleError, Result};
use crate::oracle::{AlignmentOracle, ModelArtifact, ProfileOracle};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// A built model tied to one group and one membership snapshot
#[derive(Debug, Clone)]
pub struct Profile {
    pub group_id: u32,
    pub model: ModelArtifact,
    pub built_from: BTreeSet<String>,
    pub fingerprint: u32,
    /// 1 for the first build, incremented on every rebuild
    pub version: u32,
}

impl Profile {
    /// True if the group's membership no longer matches the build snapshot
    pub fn is_stale_for(&self, group: &Group) -> bool {
        self.group_id != group.group_id
            || self.fingerprint != group.fingerprint()
            || self.built_from != group.member_ids
    }
}

/// Profiles keyed and iterated by group id
#[derive(Debug, Clone, Default)]
pub struct ProfileSet {
    profiles: BTreeMap<u32, Profile>,
}

impl ProfileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, profile: Profile) -> Option<Profile> {
        self.profiles.insert(profile.group_id, profile)
    }

    pub fn remove(&mut self, group_id: u32) -> Option<Profile> {
        self.profiles.remove(&group_id)
    }

    pub fn get(&self, group_id: u32) -> Option<&Profile> {
        self.profiles.get(&group_id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    pub fn group_ids(&self) -> Vec<u32> {
        self.profiles.keys().copied().collect()
    }

    /// Fails when nothing is left to classify against
    pub fn ensure_available(&self, attempted: usize) -> Result<()> {
        if self.is_empty() {
            return Err(HcError::NoProfilesAvailable { attempted });
        }
        Ok(())
    }
}

/// Outcome of building profiles for a batch of groups
#[derive(Debug, Default)]
pub struct BuildReport {
    pub profiles: ProfileSet,
    /// Groups whose build failed; they must be excluded from classification
    pub failed: Vec<u32>,
    pub attempted: usize,
}

/// Outcome of refreshing stale profiles
#[derive(Debug, Default)]
pub struct RebuildReport {
    pub profiles: ProfileSet,
    pub rebuilt: Vec<u32>,
    pub failed: Vec<u32>,
}

/// Builds and rebuilds profiles through the alignment and profile backends.
///
/// Member ids are resolved against one or more sequence pools, so groups
/// that absorbed target sequences during refinement can be rebuilt.
#[derive(Clone)]
pub struct ProfileBuilder<'a> {
    aligner: &'a dyn AlignmentOracle,
    oracle: &'a dyn ProfileOracle,
    pools: Vec<&'a SequenceSet>,
}

impl<'a> ProfileBuilder<'a> {
    pub fn new(
        aligner: &'a dyn AlignmentOracle,
        oracle: &'a dyn ProfileOracle,
        sequences: &'a SequenceSet,
    ) -> Self {
        Self {
            aligner,
            oracle,
            pools: vec![sequences],
        }
    }

    pub fn with_pool(mut self, sequences: &'a SequenceSet) -> Self {
        self.pools.push(sequences);
        self
    }

    pub fn oracle(&self) -> &'a dyn ProfileOracle {
        self.oracle
    }

    fn lookup(&self, id: &str) -> Option<&'a Sequence> {
        self.pools.iter().copied().find_map(|pool| pool.get(id))
    }

    /// Align the group's members and fit a model
    pub fn build(&self, group: &Group) -> Result<Profile> {
        self.build_version(group, 1)
    }

    /// Rebuild when the group has moved on from the profile's snapshot
    pub fn rebuild(&self, previous: &Profile, group: &Group) -> Result<Profile> {
        if !previous.is_stale_for(group) {
            return Ok(previous.clone());
        }
        self.build_version(group, previous.version + 1)
    }

    fn build_version(&self, group: &Group, version: u32) -> Result<Profile> {
        let group_id = group.group_id;
        if !group.is_usable() {
            return Err(HcError::ModelBuildFailed {
                group_id,
                source: OracleError::Rejected("group is marked unusable".to_string()),
            });
        }

        let mut members: Vec<&Sequence> = Vec::with_capacity(group.len());
        for id in &group.member_ids {
            let seq = self.lookup(id).ok_or_else(|| HcError::AlignmentFailed {
                group_id,
                source: OracleError::Rejected(format!("member '{}' has no sequence", id)),
            })?;
            members.push(seq);
        }

        let alignment = self
            .aligner
            .align(group_id, &members)
            .map_err(|source| HcError::AlignmentFailed { group_id, source })?;
        let model = self
            .oracle
            .build(group_id, &alignment)
            .map_err(|source| HcError::ModelBuildFailed { group_id, source })?;

        Ok(Profile {
            group_id,
            model,
            built_from: group.member_ids.clone(),
            fingerprint: group.fingerprint(),
            version,
        })
    }

    /// Build every usable group in parallel. Failures are recorded per group.
    ///
    /// All builds finish before anything is returned; on cancellation every
    /// finished model is discarded and nothing is committed.
    pub fn build_all(&self, groups: &[Group], ctx: &RunContext) -> Result<BuildReport> {
        let usable: Vec<&Group> = groups.iter().filter(|g| g.is_usable()).collect();
        let pb = ctx.progress_bar(usable.len(), "building profiles");

        let results: Vec<(u32, Option<Result<Profile>>)> = ctx.install(|| {
            usable
                .par_iter()
                .map(|group| {
                    if ctx.should_stop() {
                        return (group.group_id, None);
                    }
                    let result = self.build(group);
                    pb.inc(1);
                    (group.group_id, Some(result))
                })
                .collect()
        });
        pb.finish_and_clear();

        if let Err(e) = ctx.check_cancelled("profile building") {
            self.discard_results(results);
            return Err(e);
        }

        let mut report = BuildReport {
            attempted: usable.len(),
            ..Default::default()
        };
        for (group_id, result) in results {
            match result {
                Some(Ok(profile)) => {
                    ctx.log.info(format!(
                        "Profile built for group {} ({} members, backend {})",
                        group_id,
                        profile.built_from.len(),
                        profile.model.backend
                    ));
                    report.profiles.insert(profile);
                }
                Some(Err(e)) => {
                    ctx.record_failure(UnitFailure::group(group_id, e.to_string()));
                    report.failed.push(group_id);
                }
                None => report.failed.push(group_id),
            }
        }

        println!(
            "🧱 Built {}/{} profiles ({} failed)",
            report.profiles.len(),
            report.attempted,
            report.failed.len()
        );
        Ok(report)
    }

    /// Rebuild every profile whose group changed, as one barrier step.
    ///
    /// Groups without a profile in `current` are ignored. Failed rebuilds
    /// drop the profile rather than keep a stale one. Superseded models stay
    /// on disk since `current` may still be shared.
    pub fn rebuild_changed(
        &self,
        current: &ProfileSet,
        groups: &[Group],
        ctx: &RunContext,
    ) -> Result<RebuildReport> {
        let stale: Vec<(&Profile, &Group)> = groups
            .iter()
            .filter_map(|g| current.get(g.group_id).map(|p| (p, g)))
            .filter(|(p, g)| p.is_stale_for(g))
            .collect();

        let results: Vec<(u32, Option<Result<Profile>>)> = ctx.install(|| {
            stale
                .par_iter()
                .map(|(previous, group)| {
                    if ctx.should_stop() {
                        return (group.group_id, None);
                    }
                    (group.group_id, Some(self.rebuild(previous, group)))
                })
                .collect()
        });

        if let Err(e) = ctx.check_cancelled("profile rebuild") {
            self.discard_results(results);
            return Err(e);
        }

        let mut report = RebuildReport {
            profiles: current.clone(),
            ..Default::default()
        };
        for (group_id, result) in results {
            match result {
                Some(Ok(profile)) => {
                    ctx.log.info(format!(
                        "Profile for group {} rebuilt (version {}, {} members)",
                        group_id,
                        profile.version,
                        profile.built_from.len()
                    ));
                    report.rebuilt.push(group_id);
                    report.profiles.insert(profile);
                }
                Some(Err(e)) => {
                    ctx.record_failure(UnitFailure::group(group_id, e.to_string()));
                    report.failed.push(group_id);
                    report.profiles.remove(group_id);
                }
                None => {
                    report.failed.push(group_id);
                    report.profiles.remove(group_id);
                }
            }
        }
        Ok(report)
    }

    fn discard_results(&self, results: Vec<(u32, Option<Result<Profile>>)>) {
        for (_, result) in results {
            if let Some(Ok(profile)) = result {
                self.oracle.discard(&profile.model);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic in-memory backends shared by the engine tests

    use super::*;
    use crate::oracle::{AlignedRecord, ArtifactHandle, PassthroughAligner};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub static PASSTHROUGH: PassthroughAligner = PassthroughAligner;

    /// Scores come from a table keyed by (target id, group id). A target
    /// that is itself a member scores `member_score`. Groups listed in
    /// `failing` cannot be built.
    #[derive(Debug, Default)]
    pub struct TableOracle {
        pub scores: HashMap<(String, u32), f64>,
        /// Overrides keyed by (target, group, member count) for rebuilt models
        pub grown: HashMap<(String, u32, usize), f64>,
        pub failing: BTreeSet<u32>,
        pub failing_targets: BTreeSet<String>,
        pub member_score: f64,
        pub builds: AtomicUsize,
    }

    impl TableOracle {
        pub fn new() -> Self {
            Self {
                member_score: 1.0,
                ..Default::default()
            }
        }

        pub fn with_score(mut self, target: &str, group_id: u32, score: f64) -> Self {
            self.scores.insert((target.to_string(), group_id), score);
            self
        }

        pub fn grown_score(mut self, target: &str, group_id: u32, members: usize, score: f64) -> Self {
            self.grown.insert((target.to_string(), group_id, members), score);
            self
        }

        pub fn fail_group(mut self, group_id: u32) -> Self {
            self.failing.insert(group_id);
            self
        }

        pub fn fail_target(mut self, target: &str) -> Self {
            self.failing_targets.insert(target.to_string());
            self
        }

        pub fn build_count(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }
    }

    fn encode(group_id: u32, members: &[AlignedRecord]) -> String {
        let ids: Vec<&str> = members.iter().map(|r| r.id.as_str()).collect();
        format!("{}|{}", group_id, ids.join(","))
    }

    fn decode(token: &str) -> Option<(u32, Vec<&str>)> {
        let (group, ids) = token.split_once('|')?;
        Some((group.parse().ok()?, ids.split(',').filter(|s| !s.is_empty()).collect()))
    }

    impl ProfileOracle for TableOracle {
        fn name(&self) -> &str {
            "table"
        }

        fn description(&self) -> &str {
            "in-memory score table"
        }

        fn build(&self, group_id: u32, alignment: &[AlignedRecord]) -> std::result::Result<ModelArtifact, OracleError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&group_id) {
                return Err(OracleError::Rejected(format!("group {} refuses to build", group_id)));
            }
            Ok(ModelArtifact {
                backend: "table",
                handle: ArtifactHandle::Opaque(encode(group_id, alignment)),
            })
        }

        fn score(&self, model: &ModelArtifact, target: &Sequence) -> std::result::Result<f64, OracleError> {
            if self.failing_targets.contains(&target.id) {
                return Err(OracleError::InvalidOutput(format!("cannot score {}", target.id)));
            }
            let ArtifactHandle::Opaque(token) = &model.handle else {
                return Err(OracleError::Rejected("foreign model".into()));
            };
            let (group_id, members) =
                decode(token).ok_or_else(|| OracleError::InvalidOutput("bad token".into()))?;
            if members.contains(&target.id.as_str()) {
                return Ok(self.member_score);
            }
            if let Some(&s) = self.grown.get(&(target.id.clone(), group_id, members.len())) {
                return Ok(s);
            }
            Ok(self
                .scores
                .get(&(target.id.clone(), group_id))
                .copied()
                .unwrap_or(0.0))
        }
    }

    pub fn seqs(ids: &[&str], origin: crate::data::Origin) -> SequenceSet {
        SequenceSet::from_sequences(ids.iter().map(|id| Sequence::new(*id, b"MKV".to_vec(), origin))).unwrap()
    }

    pub fn group(group_id: u32, ids: &[&str]) -> Group {
        Group::new(group_id, ids.iter().map(|s| s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::data::Origin;

    fn ctx() -> RunContext {
        RunContext::new(2).unwrap().quiet()
    }

    #[test]
    fn test_build_all_excludes_failed_groups() {
        let training = seqs(&["a", "b", "c", "d"], Origin::Training);
        let oracle = TableOracle::new().fail_group(2);
        let builder = ProfileBuilder::new(&PASSTHROUGH, &oracle, &training);
        let groups = vec![group(1, &["a", "b"]), group(2, &["c", "d"])];

        let ctx = ctx();
        let report = builder.build_all(&groups, &ctx).unwrap();
        assert_eq!(report.profiles.group_ids(), vec![1]);
        assert_eq!(report.failed, vec![2]);
        assert_eq!(report.attempted, 2);
        assert_eq!(ctx.failures().len(), 1);
    }

    #[test]
    fn test_all_builds_fail_means_no_profiles() {
        let training = seqs(&["a", "b"], Origin::Training);
        let oracle = TableOracle::new().fail_group(1).fail_group(2);
        let builder = ProfileBuilder::new(&PASSTHROUGH, &oracle, &training);
        let groups = vec![group(1, &["a"]), group(2, &["b"])];

        let report = builder.build_all(&groups, &ctx()).unwrap();
        assert!(matches!(
            report.profiles.ensure_available(report.attempted),
            Err(HcError::NoProfilesAvailable { attempted: 2 })
        ));
    }

    #[test]
    fn test_stale_profile_is_rebuilt() {
        let training = seqs(&["a", "b"], Origin::Training);
        let targets = seqs(&["t1"], Origin::Target);
        let oracle = TableOracle::new();
        let builder = ProfileBuilder::new(&PASSTHROUGH, &oracle, &training).with_pool(&targets);

        let g1 = group(1, &["a", "b"]);
        let profile = builder.build(&g1).unwrap();
        assert!(!profile.is_stale_for(&g1));

        let same = builder.rebuild(&profile, &g1).unwrap();
        assert_eq!(same.version, 1);
        assert_eq!(oracle.build_count(), 1);

        let grown = g1.with_members(["t1"]);
        assert!(profile.is_stale_for(&grown));
        let fresh = builder.rebuild(&profile, &grown).unwrap();
        assert_eq!(fresh.version, 2);
        assert!(fresh.built_from.contains("t1"));
        assert_eq!(oracle.build_count(), 2);
    }

    #[test]
    fn test_unknown_member_fails_alignment() {
        let training = seqs(&["a"], Origin::Training);
        let oracle = TableOracle::new();
        let builder = ProfileBuilder::new(&PASSTHROUGH, &oracle, &training);
        let err = builder.build(&group(4, &["a", "ghost"])).unwrap_err();
        assert!(matches!(err, HcError::AlignmentFailed { group_id: 4, .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_rebuild_changed_drops_failures() {
        let training = seqs(&["a", "b", "c"], Origin::Training);
        let oracle = TableOracle::new();
        let builder = ProfileBuilder::new(&PASSTHROUGH, &oracle, &training);
        let ctx = ctx();
        let groups = vec![group(1, &["a"]), group(2, &["b"])];
        let built = builder.build_all(&groups, &ctx).unwrap().profiles;

        let changed = vec![groups[0].with_members(["c"]), groups[1].as_orphan_source().with_members(["c"])];
        let report = builder.rebuild_changed(&built, &changed, &ctx).unwrap();
        assert_eq!(report.rebuilt, vec![1]);
        assert_eq!(report.failed, vec![2]);
        assert_eq!(report.profiles.group_ids(), vec![1]);
        assert_eq!(report.profiles.get(1).unwrap().version, 2);
    }

    #[test]
    fn test_cancelled_build_commits_nothing() {
        let training = seqs(&["a", "b"], Origin::Training);
        let oracle = TableOracle::new();
        let builder = ProfileBuilder::new(&PASSTHROUGH, &oracle, &training);
        let ctx = ctx();
        ctx.cancel_token().cancel();
        let result = builder.build_all(&[group(1, &["a", "b"])], &ctx);
        assert!(matches!(result, Err(HcError::Cancelled(_))));
    }
}
