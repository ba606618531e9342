use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Style learnings extracted from one PR, stored as `learnings/{number}.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Learning {
    pub pr_number: u64,
    /// Copied from the PR for display
    pub pr_title: String,
    #[serde(default)]
    pub learnings: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub processed_at: DateTime<Utc>,
}

/// Resume state of the learning pass, stored as `learnings/status.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub total_prs: usize,
    pub processed_prs: usize,
    /// Highest PR number fully processed; 0 when nothing has been.
    pub last_pr: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// What the generation service is asked to return for a PR.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ExtractedLearnings {
    #[serde(default)]
    pub learnings: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Outcome counts of one learning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// PR numbers that produced a saved learning, in processing order
    pub processed: Vec<u64>,
    pub skipped: usize,
    pub failed: usize,
}
