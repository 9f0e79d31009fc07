// mod.rs - Result writers: directory layout, tables and run logs

pub mod summary;

pub use summary::{RunStatus, RunSummary};

use crate::core::pipeline::{group_column, ClusteringResult};
use crate::core::{RunContext, RunLog, ScoreRow};
use crate::data::{write_fasta, AssignmentTable, Sequence, SequenceSet};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Module 1 results directory
pub const RESULTS_DIR: &str = "All_Results";
pub const GROUPS_PASSING_DIR: &str = "Groups_100PR";
pub const GROUPS_LOW_DIR: &str = "Groups_low_PR";
pub const CLUSTERING_LOG: &str = "HMMERCTTER_Auto_ALL.log";
pub const CLASSIFICATION_LOG: &str = "Module_2.log";
pub const CLASSIFICATION_TABLE: &str = "final_classification.csv";
pub const SCORE_TABLE: &str = "scores.tsv";
pub const SUMMARY_FILE: &str = "run_summary.json";

/// Ensure parent directory exists before creating file
fn ensure_parent_dir(file_path: &Path) -> Result<(), String> {
    if let Some(parent) = file_path.parent() {
        create_dir_all(parent).map_err(|e| {
            format!("Failed to create parent directory '{}': {}", parent.display(), e)
        })?;
    }
    Ok(())
}

fn create_writer(file_path: &Path) -> Result<BufWriter<File>, String> {
    ensure_parent_dir(file_path)?;
    let file = File::create(file_path)
        .map_err(|e| format!("Failed to create output file '{}': {}", file_path.display(), e))?;
    Ok(BufWriter::new(file))
}

fn write_header(writer: &mut impl Write, command_line: &str) -> Result<(), String> {
    writeln!(writer, "# Command: {}", command_line).map_err(|e| format!("Write error: {}", e))?;
    writeln!(
        writer,
        "# Generated: {}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
    .map_err(|e| format!("Write error: {}", e))?;
    writeln!(writer, "# hmmerctter v{}", env!("CARGO_PKG_VERSION"))
        .map_err(|e| format!("Write error: {}", e))?;
    Ok(())
}

fn write_listing<'a>(
    file_path: &Path,
    sequences: impl IntoIterator<Item = &'a Sequence>,
) -> Result<usize, String> {
    ensure_parent_dir(file_path)?;
    write_fasta(file_path, sequences).map_err(|e| e.to_string())
}

fn lookup<'a>(sequences: &'a SequenceSet, ids: &'a BTreeSet<String>) -> impl Iterator<Item = &'a Sequence> {
    ids.iter().filter_map(move |id| sequences.get(id))
}

#[derive(Serialize)]
struct RescuedRow<'a> {
    sequence: &'a str,
    group: u32,
    stage: u32,
    score: Option<f64>,
}

/// Write the Module 1 directory tree under `out_dir/All_Results`.
///
/// Groups passing the precision/recall check go to `Groups_100PR`, the rest
/// to `Groups_low_PR`. Rescued outliers leave the Outliers listing.
pub fn write_clustering_results(
    out_dir: &Path,
    result: &ClusteringResult,
    sequences: &SequenceSet,
    command_line: &str,
) -> Result<PathBuf, String> {
    let root = out_dir.join(RESULTS_DIR);
    create_dir_all(&root)
        .map_err(|e| format!("Failed to create results directory '{}': {}", root.display(), e))?;

    let mut passing = 0;
    for group in &result.groups {
        let subdir = if result.passes_pr(group.group_id) {
            passing += 1;
            GROUPS_PASSING_DIR
        } else {
            GROUPS_LOW_DIR
        };
        let path = root.join(subdir).join(format!("group_{}.fasta", group.group_id));
        write_listing(&path, lookup(sequences, &group.member_ids))?;
    }
    // Both group directories exist even when empty
    for subdir in [GROUPS_PASSING_DIR, GROUPS_LOW_DIR] {
        create_dir_all(root.join(subdir)).map_err(|e| format!("Failed to create '{}': {}", subdir, e))?;
    }

    let orphans = write_listing(
        &root.join("Orphans").join("orphans.fasta"),
        lookup(sequences, &result.partition.orphans),
    )?;
    let remaining = result.remaining_outliers();
    let outliers = write_listing(
        &root.join("Outliers").join("outliers.fasta"),
        lookup(sequences, &remaining),
    )?;

    write_partition_table(&root.join("partition.tsv"), result, command_line)?;
    write_rescued(&root.join("rescued_outliers.csv"), result)?;

    println!(
        "✅ Results written to: {} ({} groups at 100% PR, {} low PR, {} orphans, {} outliers)",
        root.display(),
        passing,
        result.groups.len() - passing,
        orphans,
        outliers
    );
    Ok(root)
}

/// Every partitioned leaf with its bucket and group (`-1` outside groups)
fn write_partition_table(
    file_path: &Path,
    result: &ClusteringResult,
    command_line: &str,
) -> Result<(), String> {
    let mut writer = create_writer(file_path)?;
    write_header(&mut writer, command_line)?;
    writeln!(writer, "sequence\tbucket\tgroup").map_err(|e| format!("Write error: {}", e))?;

    for group in &result.partition.groups {
        for id in &group.member_ids {
            writeln!(writer, "{}\tgroup\t{}", id, group.group_id)
                .map_err(|e| format!("Write error: {}", e))?;
        }
    }
    for id in &result.partition.orphans {
        writeln!(writer, "{}\torphan\t-1", id).map_err(|e| format!("Write error: {}", e))?;
    }
    for id in &result.partition.outliers {
        writeln!(writer, "{}\toutlier\t-1", id).map_err(|e| format!("Write error: {}", e))?;
    }

    writer.flush().map_err(|e| format!("Flush error: {}", e))?;
    Ok(())
}

fn write_rescued(file_path: &Path, result: &ClusteringResult) -> Result<(), String> {
    let mut writer = csv_writer(file_path, &["sequence", "group", "stage", "score"])?;

    let rows = result
        .rescue
        .iter()
        .flat_map(|rescue| rescue.table.final_assignments());
    for row in rows {
        if let Some(group) = row.group_id() {
            writer
                .serialize(RescuedRow {
                    sequence: &row.sequence_id,
                    group,
                    stage: row.stage,
                    score: row.score,
                })
                .map_err(|e| format!("Write error: {}", e))?;
        }
    }

    writer.flush().map_err(|e| format!("Flush error: {}", e))?;
    Ok(())
}

/// CSV writer with an explicit header row, so empty tables keep their columns
fn csv_writer(file_path: &Path, header: &[&str]) -> Result<csv::Writer<File>, String> {
    ensure_parent_dir(file_path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(file_path)
        .map_err(|e| format!("Failed to create output file '{}': {}", file_path.display(), e))?;
    writer
        .write_record(header)
        .map_err(|e| format!("Write error: {}", e))?;
    Ok(writer)
}

#[derive(Serialize)]
struct ClassificationRow<'a> {
    sequence: &'a str,
    group: i64,
    stage: u32,
    status: &'static str,
    score: Option<f64>,
}

/// Write the final classification table, one row per target in input order.
///
/// Columns `sequence,group,stage,status,score`; `group` is `-1` unless the
/// target is assigned.
pub fn write_classification_csv(file_path: &Path, table: &AssignmentTable) -> Result<(), String> {
    let mut writer = csv_writer(file_path, &["sequence", "group", "stage", "status", "score"])?;

    let rows = table.final_assignments();
    for row in &rows {
        writer
            .serialize(ClassificationRow {
                sequence: &row.sequence_id,
                group: group_column(&row.status),
                stage: row.stage,
                status: row.status.label(),
                score: row.score,
            })
            .map_err(|e| format!("Write error: {}", e))?;
    }

    writer.flush().map_err(|e| format!("Flush error: {}", e))?;
    println!("✅ Classification written to: {} ({} targets)", file_path.display(), rows.len());
    Ok(())
}

/// Write every score reported during the run
pub fn write_scores_tsv(file_path: &Path, rows: &[ScoreRow], command_line: &str) -> Result<(), String> {
    let mut writer = create_writer(file_path)?;
    write_header(&mut writer, command_line)?;
    writeln!(writer, "sequence\tstage\tgroup\tscore").map_err(|e| format!("Write error: {}", e))?;
    for row in rows {
        writeln!(
            writer,
            "{}\t{}\t{}\t{:.4}",
            row.sequence_id, row.stage, row.group_id, row.score
        )
        .map_err(|e| format!("Write error: {}", e))?;
    }
    writer.flush().map_err(|e| format!("Flush error: {}", e))?;
    Ok(())
}

/// Write the run log; called on success and failure alike
pub fn write_run_log(file_path: &Path, log: &RunLog) -> Result<(), String> {
    ensure_parent_dir(file_path)?;
    log.write_to(file_path).map_err(|e| e.to_string())?;
    println!("📝 Run log written to: {}", file_path.display());
    Ok(())
}

/// Write the run log and JSON summary of a finished or failed run.
///
/// `outcome` carries the counts of a completed run or the fatal diagnostic.
pub fn write_run_records(
    out_dir: &Path,
    log_name: &str,
    ctx: &RunContext,
    summary: &mut RunSummary,
    outcome: &Result<Vec<(&'static str, usize)>, String>,
) -> Result<(), String> {
    match outcome {
        Ok(counts) => {
            for (name, value) in counts {
                summary.count(name, *value);
            }
            ctx.log.info("Run completed successfully");
        }
        Err(e) => {
            ctx.log.error(format!("Run failed: {}", e));
            summary.fail(e.clone());
        }
    }
    summary.finish(ctx);

    write_run_log(&out_dir.join(log_name), &ctx.log)?;
    summary.write(&out_dir.join(SUMMARY_FILE))
}
