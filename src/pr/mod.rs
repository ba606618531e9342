pub mod types;

pub use types::{
    Branch, Comment, CommentKind, Commit, PrData, PullRequest, RepositoryMetadata, Review,
    ReviewAnchor, ReviewState, User,
};

use std::collections::BTreeMap;

impl PrData {
    /// Whether any comment was left on a line of the diff.
    pub fn has_code_review(&self) -> bool {
        self.comments.iter().any(Comment::has_diff_hunk)
    }

    /// True when there is neither a comment nor a review to learn from.
    pub fn is_silent(&self) -> bool {
        self.comments.is_empty() && self.reviews.is_empty()
    }

    /// Add this PR's comments, and its reviews that carry a body, to the
    /// per-author comment counts.
    pub fn tally_authors(&self, stats: &mut BTreeMap<String, u64>) {
        let comment_authors = self.comments.iter().map(|c| &c.user.login);
        let review_authors = self
            .reviews
            .iter()
            .filter(|r| !r.body.is_empty())
            .map(|r| &r.user.login);

        for login in comment_authors.chain(review_authors) {
            *stats.entry(login.clone()).or_default() += 1;
        }
    }
}
