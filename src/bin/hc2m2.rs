// hc2m2.rs - Module 2: classify target sequences against established groups

use clap::{Arg, ArgMatches, Command};
use hmmerctter::cli::{validate_classify_args, ClassifyArgs, ClassifyValidation, Config};
use hmmerctter::core::{run_classification, CancelToken, RunContext};
use hmmerctter::data::{load_training, Origin, SequenceSet};
use hmmerctter::oracle::{remove_scratch_dir, OracleFactory};
use hmmerctter::output::{
    write_classification_csv, write_run_records, write_scores_tsv, RunSummary,
    CLASSIFICATION_LOG, CLASSIFICATION_TABLE, SCORE_TABLE,
};

fn main() {
    if let Err(e) = run_main() {
        eprintln!("❌ ERROR: {}", e);
        std::process::exit(1);
    }
}

fn build_cli() -> Command {
    Command::new("hc2m2")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Classifies target sequences against HMMERCTTER groups (Module 2)")
        .arg(Arg::new("training-fasta")
            .long("training-fasta")
            .value_name("PATH")
            .help("Training FASTA with group=<id> tags, or a Module 1 results directory"))
        .arg(Arg::new("target-fasta")
            .long("target-fasta")
            .value_name("FILE")
            .help("FASTA with the sequences to classify"))
        .arg(Arg::new("cores")
            .long("cores")
            .value_name("N")
            .help("Number of worker threads (default: 4)")
            .default_value("4"))
        .arg(Arg::new("step3")
            .long("step3")
            .value_name("0|1")
            .help("Step 3 refinement: 0 off, 1 on (default: 1)")
            .default_value("1"))
        .arg(Arg::new("output-dir")
            .long("output-dir")
            .value_name("DIR")
            .help("Output directory (default: .)")
            .default_value("."))
        .arg(Arg::new("backend")
            .long("backend")
            .value_name("NAME")
            .help("Profile backend: hmmer, identity (default: hmmer)")
            .default_value("hmmer"))
        .arg(Arg::new("timeout")
            .long("timeout")
            .value_name("SECONDS")
            .help("Abort the run after this many seconds"))
        .arg(Arg::new("config")
            .long("config")
            .value_name("FILE")
            .help("Path to TOML configuration file"))
}

fn parse_number<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>, String> {
    match matches.get_one::<String>(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("Invalid --{} value: {}", name, raw)),
        None => Ok(None),
    }
}

fn classify_args(matches: &ArgMatches) -> Result<ClassifyArgs, String> {
    let defaults = ClassifyArgs::default();
    Ok(ClassifyArgs {
        training_fasta: matches.get_one::<String>("training-fasta").cloned(),
        target_fasta: matches.get_one::<String>("target-fasta").cloned(),
        cores: parse_number(matches, "cores")?.unwrap_or(defaults.cores),
        step3: parse_number(matches, "step3")?.unwrap_or(defaults.step3),
        output_dir: matches
            .get_one::<String>("output-dir")
            .cloned()
            .unwrap_or(defaults.output_dir),
        backend: matches
            .get_one::<String>("backend")
            .cloned()
            .unwrap_or(defaults.backend),
        timeout: parse_number(matches, "timeout")?,
        config: matches.get_one::<String>("config").cloned(),
    })
}

fn run_main() -> Result<(), String> {
    let matches = build_cli().get_matches();
    let command_line = std::env::args().collect::<Vec<String>>().join(" ");

    let args = classify_args(&matches)?;
    let (args, config) = match args.config.clone() {
        Some(config_path) => args.with_config_file(&config_path)?,
        None => (args, Config::new()),
    };
    let validated = validate_classify_args(&args, &config)?;

    println!("🔬 HMMERCTTER Module 2 v{}", env!("CARGO_PKG_VERSION"));
    println!("📚 Training: {}", validated.training.display());
    println!("🎯 Targets: {}", validated.targets.display());
    println!(
        "🧬 Backend: {}, mode {}, step 3 {}",
        validated.backend,
        validated.classification.mode,
        if validated.classification.stage.refinement { "on" } else { "off" }
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
    ctx.log.info(format!("Training input: {}", validated.training.display()));
    ctx.log.info(format!("Target FASTA: {}", validated.targets.display()));

    let mut summary = RunSummary::new("hc2m2", &command_line, effective_config(&validated));
    let outcome = run(&validated, &ctx, &command_line);

    let records = write_run_records(
        &validated.output_dir,
        CLASSIFICATION_LOG,
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

fn run(
    validated: &ClassifyValidation,
    ctx: &RunContext,
    command_line: &str,
) -> Result<Vec<(&'static str, usize)>, String> {
    let training = load_training(&validated.training).map_err(|e| e.to_string())?;
    let targets =
        SequenceSet::from_fasta(&validated.targets, Origin::Target).map_err(|e| e.to_string())?;
    println!("✅ Loaded {} target sequences", targets.len());

    let backends = OracleFactory::create(&validated.backend, validated.aligner, &validated.backends)?;
    let outcome = run_classification(
        &training,
        &targets,
        backends.aligner.as_ref(),
        backends.profiles.as_ref(),
        None,
        &validated.classification,
        ctx,
    )
    .map_err(|e| e.to_string())?;

    write_classification_csv(&validated.output_dir.join(CLASSIFICATION_TABLE), &outcome.table)?;
    write_scores_tsv(&validated.output_dir.join(SCORE_TABLE), &outcome.scores, command_line)?;

    let status = outcome.table.counts();
    Ok(vec![
        ("training_groups", training.groups.len()),
        ("profiles", outcome.profiles.len()),
        ("targets", targets.len()),
        ("assigned", status.assigned),
        ("orphans", status.orphan),
        ("outliers", status.outlier),
        ("failed", status.failed),
        ("passes", outcome.passes as usize),
    ])
}

fn effective_config(validated: &ClassifyValidation) -> serde_json::Value {
    serde_json::json!({
        "training": validated.training,
        "targets": validated.targets,
        "output_dir": validated.output_dir,
        "mode": validated.classification.mode.to_string(),
        "stage": validated.classification.stage,
        "aligner": validated.aligner.name(),
        "backend": validated.backend,
        "backends": validated.backends,
        "cores": validated.cores,
        "timeout_seconds": validated.timeout.map(|t| t.as_secs()),
    })
}
