//! Results of a seeding run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How the pipeline finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedStatus {
    /// All requested stages ran.
    Done,

    /// The core stage wrote nothing, so later tiers were skipped.
    EarlyDone,

    /// Cancellation was requested; results cover the stages that completed.
    PartialDone,
}

/// Per-object counters for one tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectCounts {
    /// Object API name.
    pub object: String,

    /// Records returned by the source query.
    pub queried: usize,

    /// Records created in the target.
    pub inserted: usize,

    /// Records updated in the target (upsert only).
    pub updated: usize,

    /// Records the target rejected, plus post-insert updates that failed.
    pub failed: usize,

    /// Records the preparer refused to write.
    pub skipped: usize,
}

impl ObjectCounts {
    /// Zeroed counters for an object.
    pub fn new(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            queried: 0,
            inserted: 0,
            updated: 0,
            failed: 0,
            skipped: 0,
        }
    }
}

/// One entry of the error log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedErrorEntry {
    /// Object the record belongs to.
    pub object: String,

    /// Source record id, when one is known.
    pub source_id: Option<String>,

    /// Pipeline stage that produced the error: `remap`, `insert`, `upsert`,
    /// `self-ref update`, `upload`, or `link`.
    pub stage: String,

    /// Human-readable message.
    pub message: String,
}

impl SeedErrorEntry {
    pub fn new(
        object: impl Into<String>,
        source_id: Option<String>,
        stage: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            object: object.into(),
            source_id,
            stage: stage.to_string(),
            message: message.into(),
        }
    }
}

/// Summary of the file-transfer stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileTransferSummary {
    /// Distinct documents linked to seeded records.
    pub documents: usize,

    /// Latest versions found for those documents.
    pub versions: usize,

    /// Versions actually uploaded to the target.
    pub uploaded: usize,

    /// Links recreated in the target.
    pub links_created: usize,

    /// Binary bytes moved (or, in a dry run, that would move).
    pub bytes_transferred: u64,

    /// Versions or links the target rejected.
    pub failed: usize,
}

/// Everything a seeding run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedResults {
    /// How the run finished.
    pub status: SeedStatus,

    /// Core-object counters.
    pub core: Option<ObjectCounts>,

    /// Child-tier counters, in plan order.
    pub children: Vec<ObjectCounts>,

    /// Grandchild-tier counters, in plan order.
    pub grandchildren: Vec<ObjectCounts>,

    /// Task counters, when tasks were included and the stage ran.
    pub tasks: Option<ObjectCounts>,

    /// Event counters, when events were included and the stage ran.
    pub events: Option<ObjectCounts>,

    /// File-transfer summary, when files were included and the stage ran.
    pub files: Option<FileTransferSummary>,

    /// Error log across all stages.
    pub errors: Vec<SeedErrorEntry>,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl SeedResults {
    /// Empty results stamped with a start time.
    pub fn started_now() -> Self {
        let now = Utc::now();
        Self {
            status: SeedStatus::Done,
            core: None,
            children: Vec::new(),
            grandchildren: Vec::new(),
            tasks: None,
            events: None,
            files: None,
            errors: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Every populated tier's counters, core first.
    pub fn all_counts(&self) -> Vec<&ObjectCounts> {
        self.core
            .iter()
            .chain(self.children.iter())
            .chain(self.grandchildren.iter())
            .chain(self.tasks.iter())
            .chain(self.events.iter())
            .collect()
    }

    /// Total failed records across tiers.
    pub fn total_failed(&self) -> usize {
        self.all_counts().iter().map(|c| c.failed).sum()
    }

    /// Convert to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_counts_order() {
        let mut results = SeedResults::started_now();
        results.core = Some(ObjectCounts::new("Account"));
        results.children.push(ObjectCounts::new("Contact"));
        results.tasks = Some(ObjectCounts::new("Task"));

        let names: Vec<&str> = results.all_counts().iter().map(|c| c.object.as_str()).collect();
        assert_eq!(names, vec!["Account", "Contact", "Task"]);
    }

    #[test]
    fn test_total_failed_sums_tiers() {
        let mut results = SeedResults::started_now();
        let mut core = ObjectCounts::new("Account");
        core.failed = 2;
        let mut child = ObjectCounts::new("Contact");
        child.failed = 1;
        results.core = Some(core);
        results.children.push(child);
        assert_eq!(results.total_failed(), 3);
    }

    #[test]
    fn test_results_round_trip_json() {
        let results = SeedResults::started_now();
        let json = results.to_json().unwrap();
        let back: SeedResults = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, SeedStatus::Done);
    }
}
