use serde::Serialize;

/// Fixed-width, zero-padded, so rows sort correctly as strings.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of a result row: a conversation comment, or review feedback
/// (line-level review comments and review summary bodies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    Issue,
    Review,
}

impl std::fmt::Display for RowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowKind::Issue => write!(f, "issue"),
            RowKind::Review => write!(f, "review"),
        }
    }
}

/// One comment or review body by a requested author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentRow {
    pub pr_number: u64,
    pub pr_title: String,
    pub author: String,
    pub comment_type: RowKind,
    pub body: String,
    /// Formatted with `TIMESTAMP_FORMAT`; empty for a review never submitted
    pub created_at: String,
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Requested authors, deduplicated, in the order given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorSet(Vec<String>);

impl AuthorSet {
    /// Parse a comma-separated list, trimming blanks and dropping empties.
    pub fn parse(list: &str) -> Self {
        let mut authors: Vec<String> = Vec::new();
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if !authors.iter().any(|a| a == name) {
                authors.push(name.to_string());
            }
        }
        AuthorSet(authors)
    }

    pub fn contains(&self, login: &str) -> bool {
        self.0.iter().any(|a| a == login)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}
