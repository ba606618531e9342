pub mod types;

pub use types::{AuthorSet, CommentRow, RowKind, TIMESTAMP_FORMAT};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::pr::{Comment, PullRequest, RepositoryMetadata, Review};
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("No metadata found in {} - run 'download' first", .0.display())]
    NoData(std::path::PathBuf),

    #[error("Failed to load metadata: {0}")]
    Metadata(#[source] StoreError),

    #[error("Failed to list downloaded pull requests: {0}")]
    ListPrs(#[source] StoreError),
}

/// Matching rows plus the repository metadata they were drawn from.
#[derive(Debug)]
pub struct QueryResult {
    pub metadata: RepositoryMetadata,
    pub rows: Vec<CommentRow>,
}

/// Find every comment, and every non-empty review body, written by one of
/// `authors` across all downloaded PRs.
#[instrument(skip_all, fields(authors = ?authors))]
pub fn filter_by_authors(
    store: &RecordStore,
    authors: &AuthorSet,
) -> Result<QueryResult, QueryError> {
    let metadata = store.load_metadata().map_err(|e| {
        if e.is_not_found() {
            QueryError::NoData(store.root().to_path_buf())
        } else {
            QueryError::Metadata(e)
        }
    })?;
    let rows = collect_rows(store, authors)?;
    debug!(rows = rows.len(), "query complete");
    Ok(QueryResult { metadata, rows })
}

/// A PR without `pr.json`, or with a malformed record file, is skipped; a
/// missing comments or reviews file reads as empty.
///
/// Rows ordered by PR number, then timestamp; equal keys keep the order in
/// which they were read (comments before reviews).
pub fn collect_rows(
    store: &RecordStore,
    authors: &AuthorSet,
) -> Result<Vec<CommentRow>, QueryError> {
    let mut rows = Vec::new();
    for number in store.list_pr_numbers().map_err(QueryError::ListPrs)? {
        match store.load_pr_data(number) {
            Ok(data) => {
                rows.extend(matching_rows(&data.pr, &data.comments, &data.reviews, authors));
            }
            Err(e) if e.is_not_found() => warn!(pr = number, error = %e, "skipping incomplete PR"),
            Err(e) => error!(pr = number, error = %e, "skipping PR with malformed records"),
        }
    }
    rows.sort_by(|a, b| {
        a.pr_number
            .cmp(&b.pr_number)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    Ok(rows)
}

fn matching_rows(
    pr: &PullRequest,
    comments: &[Comment],
    reviews: &[Review],
    authors: &AuthorSet,
) -> Vec<CommentRow> {
    let comment_rows = comments
        .iter()
        .filter(|c| authors.contains(&c.user.login))
        .map(|c| {
            let anchor = c.anchor();
            CommentRow {
                pr_number: pr.number,
                pr_title: pr.title.clone(),
                author: c.user.login.clone(),
                comment_type: if anchor.is_some() {
                    RowKind::Review
                } else {
                    RowKind::Issue
                },
                body: c.body.clone(),
                created_at: format_timestamp(Some(c.created_at)),
                url: c.html_url.clone(),
                path: anchor.map(|a| a.path.clone()).unwrap_or_default(),
                line: anchor.and_then(|a| a.line),
            }
        });

    let review_rows = reviews
        .iter()
        .filter(|r| authors.contains(&r.user.login) && !r.body.is_empty())
        .map(|r| CommentRow {
            pr_number: pr.number,
            pr_title: pr.title.clone(),
            author: r.user.login.clone(),
            comment_type: RowKind::Review,
            body: r.body.clone(),
            created_at: format_timestamp(r.submitted_at),
            url: r.html_url.clone(),
            path: String::new(),
            line: None,
        });

    comment_rows.chain(review_rows).collect()
}

pub fn format_timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}
