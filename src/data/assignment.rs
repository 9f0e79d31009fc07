// assignment.rs - Per-sequence classification status and the stage table

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Classification status of one sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Status {
    Unclassified,
    Assigned { group_id: u32 },
    Orphan,
    Outlier,
    /// Scoring failed for this sequence; not a policy outcome
    Failed { reason: String },
}

impl Status {
    pub fn group_id(&self) -> Option<u32> {
        match self {
            Status::Assigned { group_id } => Some(*group_id),
            _ => None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self, Status::Assigned { .. })
    }

    /// Still open to rescue or refinement
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Status::Orphan | Status::Outlier)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Status::Unclassified => "unclassified",
            Status::Assigned { .. } => "assigned",
            Status::Orphan => "orphan",
            Status::Outlier => "outlier",
            Status::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Assigned { group_id } => write!(f, "assigned(group {})", group_id),
            Status::Failed { reason } => write!(f, "failed({})", reason),
            other => write!(f, "{}", other.label()),
        }
    }
}

/// One row of the assignment table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub sequence_id: String,
    pub status: Status,
    /// Classification pass that produced this row (1 = primary pass)
    pub stage: u32,
    /// Best profile score seen for this decision
    pub score: Option<f64>,
    /// Second-best profile score, when more than one profile scored
    pub runner_up: Option<f64>,
}

impl Assignment {
    pub fn group_id(&self) -> Option<u32> {
        self.status.group_id()
    }

    pub fn margin(&self) -> Option<f64> {
        match (self.score, self.runner_up) {
            (Some(best), Some(second)) => Some(best - second),
            _ => None,
        }
    }
}

/// Counts of final statuses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub assigned: usize,
    pub orphan: usize,
    pub outlier: usize,
    pub failed: usize,
}

/// Append-only table of assignment rows.
///
/// Later rows for the same sequence supersede earlier ones; stages never
/// decrease for a given sequence.
#[derive(Debug, Clone, Default)]
pub struct AssignmentTable {
    rows: Vec<Assignment>,
    latest: HashMap<String, usize>,
    order: Vec<String>,
}

impl AssignmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, row: Assignment) {
        debug_assert!(row.stage >= 1, "stages start at 1");
        if let Some(&prev) = self.latest.get(&row.sequence_id) {
            debug_assert!(
                self.rows[prev].stage <= row.stage,
                "stage went backwards for {}",
                row.sequence_id
            );
        } else {
            self.order.push(row.sequence_id.clone());
        }
        self.latest.insert(row.sequence_id.clone(), self.rows.len());
        self.rows.push(row);
    }

    /// Every row ever recorded, in insertion order
    pub fn rows(&self) -> &[Assignment] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn latest(&self, sequence_id: &str) -> Option<&Assignment> {
        self.latest.get(sequence_id).map(|&i| &self.rows[i])
    }

    pub fn status(&self, sequence_id: &str) -> Option<&Status> {
        self.latest(sequence_id).map(|a| &a.status)
    }

    /// Final row per sequence, in first-seen order
    pub fn final_assignments(&self) -> Vec<&Assignment> {
        self.order
            .iter()
            .filter_map(|id| self.latest(id))
            .collect()
    }

    /// Ids whose final status matches the predicate, in first-seen order
    pub fn ids_where(&self, predicate: impl Fn(&Status) -> bool) -> Vec<String> {
        self.final_assignments()
            .into_iter()
            .filter(|a| predicate(&a.status))
            .map(|a| a.sequence_id.clone())
            .collect()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for row in self.final_assignments() {
            match row.status {
                Status::Assigned { .. } => counts.assigned += 1,
                Status::Orphan => counts.orphan += 1,
                Status::Outlier => counts.outlier += 1,
                Status::Failed { .. } => counts.failed += 1,
                Status::Unclassified => {}
            }
        }
        counts
    }
}
