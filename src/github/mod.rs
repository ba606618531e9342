pub mod limiter;
mod wire;

pub use limiter::{LimiterAborted, RateLimiter};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, LINK, USER_AGENT};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::pr::{Comment, Commit, PullRequest, Review};
use wire::{WireCommit, WireIssueComment, WirePullRequest, WireReview, WireReviewComment};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// GitHub's maximum page size.
const PER_PAGE: &str = "100";

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("Failed to {operation} for {repo}{}: {source}", pr_suffix(.pr))]
    Request {
        operation: &'static str,
        repo: String,
        pr: Option<u64>,
        #[source]
        source: reqwest::Error,
    },

    #[error("Rate limiter aborted before {operation} for {repo}")]
    RateLimiterAborted {
        operation: &'static str,
        repo: String,
    },
}

fn pr_suffix(pr: &Option<u64>) -> String {
    pr.map(|n| format!(" PR #{}", n)).unwrap_or_default()
}

impl GitHubError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, GitHubError::RateLimiterAborted { .. })
    }
}

/// State filter for listing pull requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrState {
    Open,
    Closed,
}

impl PrState {
    fn as_str(self) -> &'static str {
        match self {
            PrState::Open => "open",
            PrState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read side of a repository host. Every list call returns the complete,
/// server-ordered result across all pages.
#[async_trait]
pub trait PullRequestSource: Send + Sync {
    async fn list_pull_requests(&self, state: PrState) -> Result<Vec<PullRequest>, GitHubError>;

    async fn pull_request(&self, number: u64) -> Result<PullRequest, GitHubError>;

    async fn commits(&self, number: u64) -> Result<Vec<Commit>, GitHubError>;

    async fn issue_comments(&self, number: u64) -> Result<Vec<Comment>, GitHubError>;

    async fn review_comments(&self, number: u64) -> Result<Vec<Comment>, GitHubError>;

    async fn reviews(&self, number: u64) -> Result<Vec<Review>, GitHubError>;
}

/// GitHub REST client for one repository.
///
/// Every request, including each page of a list, first waits on the rate
/// limiter. Failures are returned as-is; there are no retries here.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
    token: String,
    limiter: RateLimiter,
}

/// Identifies one call in errors and logs.
struct Call<'a> {
    operation: &'static str,
    path: String,
    query: &'a [(&'static str, &'static str)],
    pr: Option<u64>,
}

impl GitHubClient {
    pub fn new(
        api_url: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
            limiter,
        }
    }

    fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    fn repo_path(&self, rest: &str) -> String {
        format!("/repos/{}/{}/{}", self.owner, self.repo, rest)
    }

    fn request_error(&self, call: &Call<'_>, source: reqwest::Error) -> GitHubError {
        GitHubError::Request {
            operation: call.operation,
            repo: self.full_name(),
            pr: call.pr,
            source,
        }
    }

    /// Issue one GET for `page` (or no page parameter) and return the
    /// decoded body together with the next page number, if any.
    async fn get_page<T: DeserializeOwned>(
        &self,
        call: &Call<'_>,
        page: Option<u32>,
    ) -> Result<(T, Option<u32>), GitHubError> {
        self.limiter
            .acquire()
            .await
            .map_err(|LimiterAborted| GitHubError::RateLimiterAborted {
                operation: call.operation,
                repo: self.full_name(),
            })?;

        let mut request = self
            .http
            .get(format!("{}{}", self.api_url, call.path))
            .header(USER_AGENT, "pr-learnings")
            .header(ACCEPT, "application/vnd.github+json")
            .bearer_auth(&self.token)
            .query(call.query);
        if let Some(page) = page {
            request = request.query(&[("page", page)]);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.request_error(call, e))?;
        let next = next_page(response.headers());
        let body = response
            .json::<T>()
            .await
            .map_err(|e| self.request_error(call, e))?;
        Ok((body, next))
    }

    /// Walk every page of a list endpoint, mapping items into records.
    async fn get_all<W, T>(&self, call: Call<'_>) -> Result<Vec<T>, GitHubError>
    where
        W: DeserializeOwned,
        T: From<W>,
    {
        let mut items = Vec::new();
        let mut page = Some(1);
        while let Some(current) = page {
            let (batch, next) = self.get_page::<Vec<W>>(&call, Some(current)).await?;
            debug!(operation = call.operation, page = current, items = batch.len(), "fetched page");
            items.extend(batch.into_iter().map(T::from));
            page = next;
        }
        Ok(items)
    }
}

#[async_trait]
impl PullRequestSource for GitHubClient {
    #[instrument(skip(self), fields(owner = %self.owner, repo = %self.repo))]
    async fn list_pull_requests(&self, state: PrState) -> Result<Vec<PullRequest>, GitHubError> {
        let query = [
            ("state", state.as_str()),
            ("sort", "created"),
            ("direction", "desc"),
            ("per_page", PER_PAGE),
        ];
        self.get_all::<WirePullRequest, _>(Call {
            operation: "list pull requests",
            path: self.repo_path("pulls"),
            query: &query,
            pr: None,
        })
        .await
    }

    #[instrument(skip(self), fields(owner = %self.owner, repo = %self.repo))]
    async fn pull_request(&self, number: u64) -> Result<PullRequest, GitHubError> {
        let call = Call {
            operation: "get pull request",
            path: self.repo_path(&format!("pulls/{}", number)),
            query: &[],
            pr: Some(number),
        };
        let (pr, _) = self.get_page::<WirePullRequest>(&call, None).await?;
        Ok(pr.into())
    }

    #[instrument(skip(self), fields(owner = %self.owner, repo = %self.repo))]
    async fn commits(&self, number: u64) -> Result<Vec<Commit>, GitHubError> {
        self.get_all::<WireCommit, _>(Call {
            operation: "list commits",
            path: self.repo_path(&format!("pulls/{}/commits", number)),
            query: &[("per_page", PER_PAGE)],
            pr: Some(number),
        })
        .await
    }

    #[instrument(skip(self), fields(owner = %self.owner, repo = %self.repo))]
    async fn issue_comments(&self, number: u64) -> Result<Vec<Comment>, GitHubError> {
        self.get_all::<WireIssueComment, _>(Call {
            operation: "list issue comments",
            path: self.repo_path(&format!("issues/{}/comments", number)),
            query: &[("per_page", PER_PAGE)],
            pr: Some(number),
        })
        .await
    }

    #[instrument(skip(self), fields(owner = %self.owner, repo = %self.repo))]
    async fn review_comments(&self, number: u64) -> Result<Vec<Comment>, GitHubError> {
        self.get_all::<WireReviewComment, _>(Call {
            operation: "list review comments",
            path: self.repo_path(&format!("pulls/{}/comments", number)),
            query: &[("per_page", PER_PAGE)],
            pr: Some(number),
        })
        .await
    }

    #[instrument(skip(self), fields(owner = %self.owner, repo = %self.repo))]
    async fn reviews(&self, number: u64) -> Result<Vec<Review>, GitHubError> {
        self.get_all::<WireReview, _>(Call {
            operation: "list reviews",
            path: self.repo_path(&format!("pulls/{}/reviews", number)),
            query: &[("per_page", PER_PAGE)],
            pr: Some(number),
        })
        .await
    }
}

/// Page number of the `rel="next"` entry of a `Link` header.
///
/// `<https://api.github.com/repos/o/r/pulls?page=2>; rel="next", <...>; rel="last"`
pub(crate) fn next_page(headers: &HeaderMap) -> Option<u32> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim() == "rel=\"next\"");
        if !is_next {
            return None;
        }
        let url = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        let parsed = reqwest::Url::parse(url).ok()?;
        let page = parsed
            .query_pairs()
            .find(|(key, _)| key == "page")
            .and_then(|(_, value)| value.parse::<u32>().ok())?;
        (page > 0).then_some(page)
    })
}
