use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A GitHub account as it appears on pull requests, commits and comments.
///
/// GitHub returns `null` for deleted accounts and for commits whose author
/// email is not linked to an account; those map to `User::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub id: u64,
    pub avatar_url: String,
    pub html_url: String,
    /// "User", "Bot" or "Organization"
    #[serde(rename = "type")]
    pub kind: String,
}

/// Source or target branch of a pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub label: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sha: String,
}

/// Pull request metadata as stored in `pulls/{number}/pr.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Absent until the PR is closed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    /// Absent unless the PR was merged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
    pub user: User,
    pub base: Branch,
    pub head: Branch,
    pub url: String,
    pub html_url: String,
    pub comments_url: String,
    pub review_comments: u64,
    pub comments: u64,
    pub commits: u64,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
}

/// A commit belonging to a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub author: User,
    pub committer: User,
    pub message: String,
    pub url: String,
    /// Authored date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

/// A conversation comment or a line-level review comment.
///
/// On disk the variant is the `type` field (`"issue"` or `"review"`), with
/// the review-only fields flattened next to the shared ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub body: String,
    pub user: User,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub url: String,
    pub html_url: String,
    #[serde(flatten)]
    pub kind: CommentKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommentKind {
    /// Top-level PR conversation comment
    Issue,
    /// Comment anchored to a file in the diff
    Review(ReviewAnchor),
}

/// File-anchoring fields of a review comment.
///
/// Line and position fields are `None` when GitHub omits them, which it does
/// for comments on outdated diff positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewAnchor {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_start_line: Option<u32>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub original_commit_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub diff_hunk: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to_id: Option<u64>,
}

impl Comment {
    pub fn anchor(&self) -> Option<&ReviewAnchor> {
        match &self.kind {
            CommentKind::Issue => None,
            CommentKind::Review(anchor) => Some(anchor),
        }
    }

    /// True when the comment carries a diff excerpt, i.e. it was left on code.
    pub fn has_diff_hunk(&self) -> bool {
        self.anchor().is_some_and(|a| !a.diff_hunk.is_empty())
    }

    /// Stored discriminator, "issue" or "review".
    pub fn type_tag(&self) -> &'static str {
        match self.kind {
            CommentKind::Issue => "issue",
            CommentKind::Review(_) => "review",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Pending,
}

impl std::fmt::Display for ReviewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReviewState::Approved => "APPROVED",
            ReviewState::ChangesRequested => "CHANGES_REQUESTED",
            ReviewState::Commented => "COMMENTED",
            ReviewState::Dismissed => "DISMISSED",
            ReviewState::Pending => "PENDING",
        };
        write!(f, "{}", s)
    }
}

/// A submitted review. The body is empty for approve/reject-only reviews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub user: User,
    pub body: String,
    pub state: ReviewState,
    pub html_url: String,
    /// `None` for pending reviews
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    pub commit_id: String,
}

/// Repository-wide state in `metadata.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub last_updated: DateTime<Utc>,
    pub total_prs: usize,
    pub repository: String,
    pub owner: String,
    /// author login -> comment count, accumulated over every download
    #[serde(default)]
    pub author_stats: BTreeMap<String, u64>,
}

/// Everything downloaded for one pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrData {
    pub pr: PullRequest,
    pub commits: Vec<Commit>,
    pub comments: Vec<Comment>,
    pub reviews: Vec<Review>,
}
