// summary.rs - JSON run summary (status, configuration, counts, failures)

use crate::core::{RunContext, UnitFailure};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Status document written next to the results of every run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub tool: String,
    pub version: String,
    pub command: String,
    pub status: RunStatus,
    pub error: Option<String>,
    pub generated: String,
    pub elapsed_seconds: f64,
    pub config: serde_json::Value,
    pub counts: BTreeMap<String, usize>,
    pub failures: Vec<UnitFailure>,
}

impl RunSummary {
    pub fn new(tool: &str, command: &str, config: serde_json::Value) -> Self {
        Self {
            tool: tool.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            command: command.to_string(),
            status: RunStatus::Completed,
            error: None,
            generated: chrono::Utc::now().to_rfc3339(),
            elapsed_seconds: 0.0,
            config,
            counts: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    pub fn count(&mut self, name: &str, value: usize) -> &mut Self {
        self.counts.insert(name.to_string(), value);
        self
    }

    pub fn fail(&mut self, error: impl Into<String>) -> &mut Self {
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self
    }

    /// Copy elapsed time and unit failures from the run context
    pub fn finish(&mut self, ctx: &RunContext) -> &mut Self {
        self.elapsed_seconds = ctx.elapsed().as_secs_f64();
        self.failures = ctx.failures();
        self
    }

    pub fn write(&self, file_path: &Path) -> Result<(), String> {
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create parent directory '{}': {}", parent.display(), e))?;
        }
        let file = File::create(file_path)
            .map_err(|e| format!("Failed to create output file '{}': {}", file_path.display(), e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| format!("Failed to write run summary: {}", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_summary_json() {
        let ctx = RunContext::new(1).unwrap().quiet();
        ctx.record_failure(UnitFailure::group(7, "hmmbuild exited with status 1"));

        let mut summary = RunSummary::new("hc2m2", "hc2m2 --cores 1", serde_json::json!({"cores": 1}));
        summary.count("assigned", 0).fail("no profile could be built").finish(&ctx);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_summary.json");
        summary.write(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["config"]["cores"], 1);
        assert_eq!(value["counts"]["assigned"], 0);
        assert_eq!(value["failures"][0]["group_id"], 7);
    }
}
