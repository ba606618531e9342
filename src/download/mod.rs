use chrono::Utc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::github::{GitHubError, PrState, PullRequestSource};
use crate::pr::{PrData, PullRequest, RepositoryMetadata};
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Failed to prepare data directory: {0}")]
    Layout(#[source] StoreError),

    #[error("Failed to list {state} pull requests: {source}")]
    List {
        state: PrState,
        #[source]
        source: GitHubError,
    },

    #[error("Download cancelled after {completed} of {total} pull requests")]
    Cancelled { completed: usize, total: usize },
}

/// Outcome counts of one download run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub total: usize,
    pub saved: usize,
    pub failed: usize,
}

/// Walks every open and closed PR of a repository and stores its records.
///
/// There is no cursor: each run re-fetches the full PR list and overwrites
/// whatever is already on disk.
pub struct Downloader<'a, S: PullRequestSource> {
    source: &'a S,
    store: &'a RecordStore,
    owner: String,
    repo: String,
    pr_delay: Duration,
}

impl<'a, S: PullRequestSource> Downloader<'a, S> {
    pub fn new(
        source: &'a S,
        store: &'a RecordStore,
        owner: impl Into<String>,
        repo: impl Into<String>,
        pr_delay: Duration,
    ) -> Self {
        Self {
            source,
            store,
            owner: owner.into(),
            repo: repo.into(),
            pr_delay,
        }
    }

    /// Download every PR, closed ones first.
    ///
    /// A PR whose fetch or save fails is logged and skipped. Metadata is
    /// written once, after the last PR.
    pub async fn download_all(&self) -> Result<DownloadSummary, DownloadError> {
        info!(owner = %self.owner, repo = %self.repo, "starting PR download");
        self.store.ensure_layout().map_err(DownloadError::Layout)?;

        let mut metadata = match self.store.load_metadata() {
            Ok(metadata) => metadata,
            Err(e) if e.is_not_found() => {
                info!("no existing metadata, starting fresh");
                RepositoryMetadata::default()
            }
            Err(e) => {
                error!(error = %e, "existing metadata is unreadable, starting fresh");
                RepositoryMetadata::default()
            }
        };

        let mut targets = self.list(PrState::Closed).await?;
        targets.extend(self.list(PrState::Open).await?);
        let total = targets.len();

        let mut summary = DownloadSummary {
            total,
            ..DownloadSummary::default()
        };

        for (i, pr) in targets.iter().enumerate() {
            let number = pr.number;
            info!(pr = number, progress = %format!("{}/{}", i + 1, total), "downloading PR");

            let data = match self
                .fetch(number)
                .instrument(info_span!("pr", pr = number))
                .await
            {
                Ok(data) => data,
                Err(e) if e.is_aborted() => {
                    warn!(pr = number, "download interrupted");
                    return Err(DownloadError::Cancelled {
                        completed: summary.saved,
                        total,
                    });
                }
                Err(e) => {
                    error!(pr = number, error = %e, "failed to download PR, skipping");
                    summary.failed += 1;
                    continue;
                }
            };

            if let Err(e) = self.store.save_pr_data(&data) {
                error!(pr = number, error = %e, "failed to save PR, skipping");
                summary.failed += 1;
                continue;
            }

            data.tally_authors(&mut metadata.author_stats);
            summary.saved += 1;

            if i + 1 < total && !self.pr_delay.is_zero() {
                tokio::time::sleep(self.pr_delay).await;
            }
        }

        metadata.owner = self.owner.clone();
        metadata.repository = self.repo.clone();
        metadata.total_prs = total;
        metadata.last_updated = Utc::now();
        if let Err(e) = self.store.save_metadata(&metadata) {
            error!(error = %e, "failed to save metadata");
        }

        info!(
            total = summary.total,
            saved = summary.saved,
            failed = summary.failed,
            authors = metadata.author_stats.len(),
            "download complete"
        );
        Ok(summary)
    }

    async fn list(&self, state: PrState) -> Result<Vec<PullRequest>, DownloadError> {
        info!(%state, "fetching pull request list");
        let prs = self
            .source
            .list_pull_requests(state)
            .await
            .map_err(|source| DownloadError::List { state, source })?;
        info!(%state, count = prs.len(), "found pull requests");
        Ok(prs)
    }

    /// Detail, commits, issue comments then review comments, and reviews.
    async fn fetch(&self, number: u64) -> Result<PrData, GitHubError> {
        let pr = self.source.pull_request(number).await?;
        let commits = self.source.commits(number).await?;
        let mut comments = self.source.issue_comments(number).await?;
        comments.extend(self.source.review_comments(number).await?);
        let reviews = self.source.reviews(number).await?;
        debug!(
            commits = commits.len(),
            comments = comments.len(),
            reviews = reviews.len(),
            "fetched PR records"
        );
        Ok(PrData {
            pr,
            commits,
            comments,
            reviews,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pr::fixtures::*;
    use crate::pr::{Comment, Commit, Review};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap, HashSet};
    use tempfile::TempDir;

    /// In-memory repository host.
    #[derive(Default)]
    struct FakeSource {
        closed: Vec<u64>,
        open: Vec<u64>,
        issue_comments: HashMap<u64, Vec<Comment>>,
        review_comments: HashMap<u64, Vec<Comment>>,
        reviews: HashMap<u64, Vec<Review>>,
        failing: HashSet<u64>,
        aborting: HashSet<u64>,
    }

    impl FakeSource {
        fn check(&self, number: u64) -> Result<(), GitHubError> {
            if self.aborting.contains(&number) {
                return Err(GitHubError::RateLimiterAborted {
                    operation: "get pull request",
                    repo: "org/repo".to_string(),
                });
            }
            if self.failing.contains(&number) {
                let source = reqwest::Client::new()
                    .get("not a url")
                    .build()
                    .unwrap_err();
                return Err(GitHubError::Request {
                    operation: "get pull request",
                    repo: "org/repo".to_string(),
                    pr: Some(number),
                    source,
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PullRequestSource for FakeSource {
        async fn list_pull_requests(
            &self,
            state: PrState,
        ) -> Result<Vec<PullRequest>, GitHubError> {
            let numbers = match state {
                PrState::Closed => &self.closed,
                PrState::Open => &self.open,
            };
            Ok(numbers.iter().map(|&n| pull_request(n, "listed")).collect())
        }

        async fn pull_request(&self, number: u64) -> Result<PullRequest, GitHubError> {
            self.check(number)?;
            Ok(pull_request(number, &format!("PR {}", number)))
        }

        async fn commits(&self, _number: u64) -> Result<Vec<Commit>, GitHubError> {
            Ok(vec![])
        }

        async fn issue_comments(&self, number: u64) -> Result<Vec<Comment>, GitHubError> {
            Ok(self.issue_comments.get(&number).cloned().unwrap_or_default())
        }

        async fn review_comments(&self, number: u64) -> Result<Vec<Comment>, GitHubError> {
            Ok(self.review_comments.get(&number).cloned().unwrap_or_default())
        }

        async fn reviews(&self, number: u64) -> Result<Vec<Review>, GitHubError> {
            Ok(self.reviews.get(&number).cloned().unwrap_or_default())
        }
    }

    fn two_pr_source() -> FakeSource {
        let at = "2024-01-01T00:00:00Z";
        let mut source = FakeSource {
            closed: vec![1],
            open: vec![2],
            ..FakeSource::default()
        };
        source
            .issue_comments
            .insert(1, vec![issue_comment(10, "alice", "thanks", at)]);
        source.review_comments.insert(
            1,
            vec![
                review_comment(11, "bob", "rename", at, Some(4)),
                review_comment(12, "alice", "agreed", at, None),
            ],
        );
        source.reviews.insert(
            1,
            vec![review(13, "bob", "", at), review(14, "carol", "lgtm", at)],
        );
        source
            .review_comments
            .insert(2, vec![review_comment(20, "carol", "typo", at, Some(1))]);
        source
            .reviews
            .insert(2, vec![review(21, "alice", "nice work", at)]);
        source
    }

    #[tokio::test]
    async fn test_download_saves_prs_and_author_stats() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path());
        let source = two_pr_source();

        let summary = Downloader::new(&source, &store, "org", "repo", Duration::ZERO)
            .download_all()
            .await
            .unwrap();
        assert_eq!(summary, DownloadSummary { total: 2, saved: 2, failed: 0 });

        let metadata = store.load_metadata().unwrap();
        assert_eq!(metadata.owner, "org");
        assert_eq!(metadata.repository, "repo");
        assert_eq!(metadata.total_prs, 2);
        let expected: BTreeMap<String, u64> = [("alice", 3), ("bob", 1), ("carol", 2)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(metadata.author_stats, expected);

        let first = store.load_pr_data(1).unwrap();
        assert_eq!(first.comments.len(), 3);
        assert_eq!(first.comments[0].type_tag(), "issue");
        assert_eq!(first.comments[1].type_tag(), "review");
        assert_eq!(store.list_pr_numbers().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_stats_accumulate_over_existing_metadata() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path());
        let mut prior = RepositoryMetadata::default();
        prior.author_stats.insert("alice".to_string(), 10);
        store.save_metadata(&prior).unwrap();

        Downloader::new(&two_pr_source(), &store, "org", "repo", Duration::ZERO)
            .download_all()
            .await
            .unwrap();
        assert_eq!(store.load_metadata().unwrap().author_stats["alice"], 13);
    }

    #[tokio::test]
    async fn test_failed_pr_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path());
        let mut source = two_pr_source();
        source.failing.insert(1);

        let summary = Downloader::new(&source, &store, "org", "repo", Duration::ZERO)
            .download_all()
            .await
            .unwrap();
        assert_eq!(summary, DownloadSummary { total: 2, saved: 1, failed: 1 });
        assert_eq!(store.list_pr_numbers().unwrap(), vec![2]);

        let metadata = store.load_metadata().unwrap();
        assert_eq!(metadata.total_prs, 2);
        assert_eq!(metadata.author_stats.get("bob"), None);
    }

    #[tokio::test]
    async fn test_cancellation_stops_without_metadata() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path());
        let mut source = two_pr_source();
        source.aborting.insert(2);

        let err = Downloader::new(&source, &store, "org", "repo", Duration::ZERO)
            .download_all()
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Cancelled { completed: 1, total: 2 }));
        assert_eq!(store.list_pr_numbers().unwrap(), vec![1]);
        assert!(store.load_metadata().unwrap_err().is_not_found());
    }
}
