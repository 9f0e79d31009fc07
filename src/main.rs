// main.rs - CLI entry point (Module 1, optionally chained into Module 2)

use hmmerctter::cli::{validate_args, Args, Config, ValidationResult};
use hmmerctter::core::{
    profiles_for, run_classification, run_clustering, training_from_clustering, CancelToken,
    PartitionEngine, RunContext,
};
use hmmerctter::data::{Origin, SequenceSet, Tree};
use hmmerctter::oracle::{remove_scratch_dir, OracleFactory};
use hmmerctter::output::{
    write_classification_csv, write_clustering_results, write_run_records, write_scores_tsv,
    RunSummary, CLASSIFICATION_TABLE, CLUSTERING_LOG, SCORE_TABLE,
};

fn main() {
    if let Err(e) = run_main() {
        eprintln!("❌ ERROR: {}", e);
        std::process::exit(1);
    }
}

fn run_main() -> Result<(), String> {
    let args: Args = argh::from_env();
    let command_line = std::env::args().collect::<Vec<String>>().join(" ");

    // Handle generate config first
    if args.generate_config {
        let sample_config = Config::generate_sample();
        println!("{}", sample_config);
        println!("\n💡 Save this content to a .toml file and use --config /path/to/config.toml");
        return Ok(());
    }

    // Load configuration file if specified
    let (args, config) = match args.config.clone() {
        Some(config_path) => args.with_config_file(&config_path)?,
        None => (args, Config::new()),
    };

    let validated = validate_args(&args, &config)?;

    println!("🚀 HMMERCTTER v{}", env!("CARGO_PKG_VERSION"));
    println!("📂 Input: {}", validated.input.display());
    println!("🌳 Tree: {}", validated.tree.display());
    println!(
        "✂️  Partition: alpha {} ({}), min group size {}, {} order",
        validated.clustering.partition.alpha,
        validated.clustering.partition.criterion,
        validated.clustering.partition.min_group_size,
        validated.clustering.partition.sort_order
    );
    println!(
        "🧬 Backend: {} (aligner {}), mode {}",
        validated.backend,
        validated.aligner.name(),
        validated.clustering.mode
    );
    println!("🧵 Cores: {}", validated.cores);

    let interrupt = CancelToken::on_interrupt().map_err(|e| e.to_string())?;
    let mut ctx = RunContext::new(validated.cores)
        .map_err(|e| e.to_string())?
        .with_cancel_token(interrupt);
    if let Some(timeout) = validated.timeout {
        ctx = ctx.with_timeout(timeout);
    }
    ctx.log.info(format!("Command: {}", command_line));
    ctx.log.info(format!("Input FASTA: {}", validated.input.display()));
    ctx.log.info(format!("Tree: {}", validated.tree.display()));

    let mut summary = RunSummary::new("hmmerctter", &command_line, effective_config(&validated));
    let outcome = run_pipeline(&validated, &ctx, &command_line);

    let records = write_run_records(
        &validated.output_dir,
        CLUSTERING_LOG,
        &ctx,
        &mut summary,
        &outcome,
    );
    if let Err(e) = remove_scratch_dir(&validated.backends.scratch_dir) {
        eprintln!("⚠️  {}", e);
    }

    outcome?;
    records?;
    println!("⏱️  Total time: {:.2}s", ctx.elapsed().as_secs_f64());
    Ok(())
}

fn run_pipeline(
    validated: &ValidationResult,
    ctx: &RunContext,
    command_line: &str,
) -> Result<Vec<(&'static str, usize)>, String> {
    let sequences =
        SequenceSet::from_fasta(&validated.input, Origin::Training).map_err(|e| e.to_string())?;
    let tree = Tree::from_newick_file(&validated.tree).map_err(|e| e.to_string())?;
    println!(
        "✅ Loaded {} sequences and a tree with {} leaves",
        sequences.len(),
        tree.leaf_count()
    );

    if validated.dry_run {
        let engine =
            PartitionEngine::new(validated.clustering.partition.clone()).map_err(|e| e.to_string())?;
        let partition = engine.partition(&tree, &sequences, ctx).map_err(|e| e.to_string())?;
        for group in &partition.groups {
            println!("  • group {}: {} sequences", group.group_id, group.len());
        }
        println!(
            "✅ Dry run completed successfully: {} groups, {} orphans, {} outliers",
            partition.groups.len(),
            partition.orphans.len(),
            partition.outliers.len()
        );
        return Ok(vec![
            ("groups", partition.groups.len()),
            ("orphans", partition.orphans.len()),
            ("outliers", partition.outliers.len()),
        ]);
    }

    let backends = OracleFactory::create(&validated.backend, validated.aligner, &validated.backends)?;
    let result = run_clustering(
        &sequences,
        &tree,
        backends.aligner.as_ref(),
        backends.profiles.as_ref(),
        &validated.clustering,
        ctx,
    )
    .map_err(|e| e.to_string())?;
    if let Some(notice) = &result.partition.notice {
        println!("⚠️  {}", notice);
    }

    write_clustering_results(&validated.output_dir, &result, &sequences, command_line)?;

    let passing = result
        .groups
        .iter()
        .filter(|g| result.passes_pr(g.group_id))
        .count();
    let mut counts = vec![
        ("sequences", sequences.len()),
        ("groups", result.groups.len()),
        ("groups_100pr", passing),
        ("profiles", result.profiles.len()),
        ("orphans", result.partition.orphans.len()),
        ("outliers", result.remaining_outliers().len()),
        ("rescued_outliers", result.rescued().len()),
    ];

    let Some(target) = &validated.target else {
        if let Some(rescue) = &result.rescue {
            write_scores_tsv(&validated.output_dir.join(SCORE_TABLE), &rescue.scores, command_line)?;
        }
        return Ok(counts);
    };

    println!("\n🎯 Classifying targets from: {}", target.display());
    ctx.log.info(format!("Target FASTA: {}", target.display()));
    let targets = SequenceSet::from_fasta(target, Origin::Target).map_err(|e| e.to_string())?;
    let training = training_from_clustering(&result, &sequences).map_err(|e| e.to_string())?;
    let prebuilt = profiles_for(&training, &result.profiles);

    let outcome = run_classification(
        &training,
        &targets,
        backends.aligner.as_ref(),
        backends.profiles.as_ref(),
        Some(prebuilt),
        &validated.classification,
        ctx,
    )
    .map_err(|e| e.to_string())?;

    write_classification_csv(&validated.output_dir.join(CLASSIFICATION_TABLE), &outcome.table)?;
    write_scores_tsv(&validated.output_dir.join(SCORE_TABLE), &outcome.scores, command_line)?;

    let status = outcome.table.counts();
    counts.extend([
        ("targets", targets.len()),
        ("assigned", status.assigned),
        ("target_orphans", status.orphan),
        ("target_outliers", status.outlier),
        ("failed", status.failed),
    ]);
    Ok(counts)
}

fn effective_config(validated: &ValidationResult) -> serde_json::Value {
    serde_json::json!({
        "input": validated.input,
        "tree": validated.tree,
        "target": validated.target,
        "output_dir": validated.output_dir,
        "partition": validated.clustering.partition,
        "mode": validated.clustering.mode.to_string(),
        "stage": validated.classification.stage,
        "validate_pr": validated.clustering.validate_pr,
        "aligner": validated.aligner.name(),
        "backend": validated.backend,
        "backends": validated.backends,
        "cores": validated.cores,
        "timeout_seconds": validated.timeout.map(|t| t.as_secs()),
        "dry_run": validated.dry_run,
    })
}
