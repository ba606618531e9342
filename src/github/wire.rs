//! GitHub REST response shapes and their mapping onto the stored records.
//!
//! Only the fields that are kept are declared. Anything GitHub may send as
//! `null` or leave out is an `Option` or `#[serde(default)]` here.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::pr::{
    Branch, Comment, CommentKind, Commit, PullRequest, Review, ReviewAnchor, ReviewState, User,
};

#[derive(Debug, Deserialize)]
pub(crate) struct WireUser {
    #[serde(default)]
    login: String,
    #[serde(default)]
    id: u64,
    #[serde(default)]
    avatar_url: String,
    #[serde(default)]
    html_url: String,
    #[serde(rename = "type", default)]
    kind: String,
}

fn user(wire: Option<WireUser>) -> User {
    wire.map(|u| User {
        login: u.login,
        id: u.id,
        avatar_url: u.avatar_url,
        html_url: u.html_url,
        kind: u.kind,
    })
    .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireBranch {
    #[serde(default)]
    label: String,
    #[serde(rename = "ref", default)]
    git_ref: String,
    #[serde(default)]
    sha: String,
}

fn branch(wire: Option<WireBranch>) -> Branch {
    wire.map(|b| Branch {
        label: b.label,
        git_ref: b.git_ref,
        sha: b.sha,
    })
    .unwrap_or_default()
}

/// Both the list and the detail endpoint; the counters only come with detail.
#[derive(Debug, Deserialize)]
pub(crate) struct WirePullRequest {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    state: String,
    body: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    merged_at: Option<DateTime<Utc>>,
    user: Option<WireUser>,
    base: Option<WireBranch>,
    head: Option<WireBranch>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    comments_url: String,
    #[serde(default)]
    review_comments: u64,
    #[serde(default)]
    comments: u64,
    #[serde(default)]
    commits: u64,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    changed_files: u64,
}

impl From<WirePullRequest> for PullRequest {
    fn from(w: WirePullRequest) -> Self {
        PullRequest {
            number: w.number,
            title: w.title,
            state: w.state,
            body: w.body.unwrap_or_default(),
            created_at: w.created_at,
            updated_at: w.updated_at,
            closed_at: w.closed_at,
            merged_at: w.merged_at,
            user: user(w.user),
            base: branch(w.base),
            head: branch(w.head),
            url: w.url,
            html_url: w.html_url,
            comments_url: w.comments_url,
            review_comments: w.review_comments,
            comments: w.comments,
            commits: w.commits,
            additions: w.additions,
            deletions: w.deletions,
            changed_files: w.changed_files,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireCommit {
    sha: String,
    #[serde(default)]
    html_url: String,
    commit: WireGitCommit,
    author: Option<WireUser>,
    committer: Option<WireUser>,
}

#[derive(Debug, Deserialize)]
struct WireGitCommit {
    #[serde(default)]
    message: String,
    author: Option<WireSignature>,
}

#[derive(Debug, Deserialize)]
struct WireSignature {
    date: Option<DateTime<Utc>>,
}

impl From<WireCommit> for Commit {
    fn from(w: WireCommit) -> Self {
        Commit {
            sha: w.sha,
            author: user(w.author),
            committer: user(w.committer),
            message: w.commit.message,
            url: w.html_url,
            date: w.commit.author.and_then(|a| a.date),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireIssueComment {
    id: u64,
    body: Option<String>,
    user: Option<WireUser>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    html_url: String,
}

impl From<WireIssueComment> for Comment {
    fn from(w: WireIssueComment) -> Self {
        Comment {
            id: w.id,
            body: w.body.unwrap_or_default(),
            user: user(w.user),
            created_at: w.created_at,
            updated_at: w.updated_at,
            url: w.url,
            html_url: w.html_url,
            kind: CommentKind::Issue,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireReviewComment {
    id: u64,
    body: Option<String>,
    user: Option<WireUser>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    path: String,
    position: Option<u32>,
    line: Option<u32>,
    start_line: Option<u32>,
    original_position: Option<u32>,
    original_start_line: Option<u32>,
    commit_id: Option<String>,
    original_commit_id: Option<String>,
    diff_hunk: Option<String>,
    in_reply_to_id: Option<u64>,
}

impl From<WireReviewComment> for Comment {
    fn from(w: WireReviewComment) -> Self {
        Comment {
            id: w.id,
            body: w.body.unwrap_or_default(),
            user: user(w.user),
            created_at: w.created_at,
            updated_at: w.updated_at,
            url: w.url,
            html_url: w.html_url,
            kind: CommentKind::Review(ReviewAnchor {
                path: w.path,
                position: w.position,
                line: w.line,
                start_line: w.start_line,
                original_position: w.original_position,
                original_start_line: w.original_start_line,
                commit_id: w.commit_id.unwrap_or_default(),
                original_commit_id: w.original_commit_id.unwrap_or_default(),
                diff_hunk: w.diff_hunk.unwrap_or_default(),
                in_reply_to_id: w.in_reply_to_id,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireReview {
    id: u64,
    user: Option<WireUser>,
    body: Option<String>,
    state: ReviewState,
    #[serde(default)]
    html_url: String,
    submitted_at: Option<DateTime<Utc>>,
    commit_id: Option<String>,
}

impl From<WireReview> for Review {
    fn from(w: WireReview) -> Self {
        Review {
            id: w.id,
            user: user(w.user),
            body: w.body.unwrap_or_default(),
            state: w.state,
            html_url: w.html_url,
            submitted_at: w.submitted_at,
            commit_id: w.commit_id.unwrap_or_default(),
        }
    }
}
