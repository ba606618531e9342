use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::learn::types::{Learning, ProcessingStatus};
use crate::pr::{Comment, Commit, PrData, PullRequest, RepositoryMetadata, Review};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{} not found", path.display())]
    NotFound { path: PathBuf },

    #[error("Malformed record in {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Per-PR record files, in the order they are written.
const PR_FILE: &str = "pr.json";
const COMMITS_FILE: &str = "commits.json";
const COMMENTS_FILE: &str = "comments.json";
const REVIEWS_FILE: &str = "reviews.json";
const STATUS_FILE: &str = "status.json";

/// Flat-file JSON store rooted at the data directory:
///
/// ```text
/// {root}/metadata.json
/// {root}/pulls/{number}/{pr,commits,comments,reviews}.json
/// {root}/learnings/status.json
/// {root}/learnings/{number}.json
/// ```
///
/// Writes overwrite the whole file in place. There is no locking; one
/// process at a time.
#[derive(Debug, Clone)]
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pulls_dir(&self) -> PathBuf {
        self.root.join("pulls")
    }

    fn pr_dir(&self, number: u64) -> PathBuf {
        self.pulls_dir().join(number.to_string())
    }

    fn learnings_dir(&self) -> PathBuf {
        self.root.join("learnings")
    }

    fn metadata_path(&self) -> PathBuf {
        self.root.join("metadata.json")
    }

    /// Create the data root and the `pulls` directory.
    pub fn ensure_layout(&self) -> Result<(), StoreError> {
        let pulls = self.pulls_dir();
        fs::create_dir_all(&pulls).map_err(|e| StoreError::io(&pulls, e))
    }

    /// Write the four record files of one PR. A failure part-way leaves the
    /// files written so far in place.
    pub fn save_pr_data(&self, data: &PrData) -> Result<(), StoreError> {
        let dir = self.pr_dir(data.pr.number);
        save_json(&dir.join(PR_FILE), &data.pr)?;
        save_json(&dir.join(COMMITS_FILE), &data.commits)?;
        save_json(&dir.join(COMMENTS_FILE), &data.comments)?;
        save_json(&dir.join(REVIEWS_FILE), &data.reviews)?;
        debug!(pr = data.pr.number, dir = %dir.display(), "saved PR records");
        Ok(())
    }

    pub fn load_pull_request(&self, number: u64) -> Result<PullRequest, StoreError> {
        load_json(&self.pr_dir(number).join(PR_FILE))
    }

    pub fn load_commits(&self, number: u64) -> Result<Vec<Commit>, StoreError> {
        load_json(&self.pr_dir(number).join(COMMITS_FILE))
    }

    pub fn load_comments(&self, number: u64) -> Result<Vec<Comment>, StoreError> {
        load_json(&self.pr_dir(number).join(COMMENTS_FILE))
    }

    pub fn load_reviews(&self, number: u64) -> Result<Vec<Review>, StoreError> {
        load_json(&self.pr_dir(number).join(REVIEWS_FILE))
    }

    /// Load everything stored for a PR.
    ///
    /// Only `pr.json` is mandatory. A missing commits, comments or reviews
    /// file is logged and read as empty; a malformed one is an error.
    pub fn load_pr_data(&self, number: u64) -> Result<PrData, StoreError> {
        let pr = self.load_pull_request(number)?;
        Ok(PrData {
            commits: or_empty(self.load_commits(number), number, COMMITS_FILE)?,
            comments: or_empty(self.load_comments(number), number, COMMENTS_FILE)?,
            reviews: or_empty(self.load_reviews(number), number, REVIEWS_FILE)?,
            pr,
        })
    }

    /// Numbers of all downloaded PRs, ascending. Entries of `pulls/` that are
    /// not numeric directories are ignored; a missing `pulls/` reads as none.
    pub fn list_pr_numbers(&self) -> Result<Vec<u64>, StoreError> {
        let dir = self.pulls_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut numbers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(number) = entry.file_name().to_str().and_then(|n| n.parse::<u64>().ok()) {
                numbers.push(number);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    pub fn save_metadata(&self, metadata: &RepositoryMetadata) -> Result<(), StoreError> {
        save_json(&self.metadata_path(), metadata)
    }

    pub fn load_metadata(&self) -> Result<RepositoryMetadata, StoreError> {
        load_json(&self.metadata_path())
    }

    pub fn save_learning(&self, learning: &Learning) -> Result<(), StoreError> {
        let path = self
            .learnings_dir()
            .join(format!("{}.json", learning.pr_number));
        save_json(&path, learning)
    }

    #[cfg(test)]
    pub fn load_learning(&self, number: u64) -> Result<Learning, StoreError> {
        load_json(&self.learnings_dir().join(format!("{}.json", number)))
    }

    /// Every stored learning, in directory enumeration order. Unreadable or
    /// malformed files are logged and left out.
    pub fn load_all_learnings(&self) -> Result<Vec<Learning>, StoreError> {
        let dir = self.learnings_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut learnings = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&dir, e))?.path();
            let is_learning = path.extension().is_some_and(|ext| ext == "json")
                && path.file_name().is_some_and(|name| name != STATUS_FILE);
            if !is_learning {
                continue;
            }
            match load_json::<Learning>(&path) {
                Ok(learning) => learnings.push(learning),
                Err(e) => error!(error = %e, "skipping unreadable learning"),
            }
        }
        Ok(learnings)
    }

    pub fn save_status(&self, status: &ProcessingStatus) -> Result<(), StoreError> {
        save_json(&self.learnings_dir().join(STATUS_FILE), status)
    }

    pub fn load_status(&self) -> Result<ProcessingStatus, StoreError> {
        load_json(&self.learnings_dir().join(STATUS_FILE))
    }
}

fn or_empty<T>(
    loaded: Result<Vec<T>, StoreError>,
    number: u64,
    file: &str,
) -> Result<Vec<T>, StoreError> {
    match loaded {
        Err(e) if e.is_not_found() => {
            warn!(pr = number, file, "record file missing, treating as empty");
            Ok(Vec::new())
        }
        other => other,
    }
}

/// Pretty-print `value` to `path`, creating parent directories.
fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let mut json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    json.push(b'\n');

    let mut file = fs::File::create(path).map_err(|e| StoreError::io(path, e))?;
    file.write_all(&json).map_err(|e| StoreError::io(path, e))
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_slice(&contents).map_err(|source| StoreError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pr::fixtures::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, RecordStore) {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path().join("data"));
        (dir, store)
    }

    #[test]
    fn test_pr_data_round_trip() {
        let (_dir, store) = store();
        let mut data = pr_data(
            42,
            vec![
                issue_comment(1, "alice", "thanks", "2024-02-01T09:00:00Z"),
                review_comment(2, "bob", "rename this", "2024-02-01T10:00:00Z", None),
            ],
            vec![review(3, "alice", "", "2024-02-01T11:00:00Z")],
        );
        data.pr.merged_at = Some(ts("2024-02-02T00:00:00Z"));

        store.save_pr_data(&data).unwrap();
        let loaded = store.load_pr_data(42).unwrap();
        assert_eq!(loaded, data);
        assert_eq!(loaded.pr.closed_at, None);
    }

    #[test]
    fn test_files_land_at_fixed_paths() {
        let (_dir, store) = store();
        store.save_pr_data(&pr_data(7, vec![], vec![])).unwrap();
        for file in ["pr.json", "commits.json", "comments.json", "reviews.json"] {
            assert!(store.root().join("pulls/7").join(file).is_file(), "{}", file);
        }
        let raw = fs::read_to_string(store.root().join("pulls/7/pr.json")).unwrap();
        assert!(raw.contains("\n  \"number\": 7,"));
        assert!(!raw.contains("closed_at"));
    }

    #[test]
    fn test_missing_vs_malformed() {
        let (_dir, store) = store();
        assert!(store.load_metadata().unwrap_err().is_not_found());

        fs::create_dir_all(store.root()).unwrap();
        fs::write(store.root().join("metadata.json"), "{ not json").unwrap();
        let err = store.load_metadata().unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[test]
    fn test_optional_files_default_to_empty() {
        let (_dir, store) = store();
        store.save_pr_data(&pr_data(5, vec![], vec![])).unwrap();
        fs::remove_file(store.root().join("pulls/5/comments.json")).unwrap();
        fs::remove_file(store.root().join("pulls/5/reviews.json")).unwrap();

        let loaded = store.load_pr_data(5).unwrap();
        assert!(loaded.comments.is_empty());
        assert!(loaded.reviews.is_empty());

        fs::remove_file(store.root().join("pulls/5/pr.json")).unwrap();
        assert!(store.load_pr_data(5).unwrap_err().is_not_found());
    }

    #[test]
    fn test_malformed_optional_file_is_an_error() {
        let (_dir, store) = store();
        store.save_pr_data(&pr_data(5, vec![], vec![])).unwrap();
        fs::write(store.root().join("pulls/5/reviews.json"), "[{]").unwrap();
        assert!(matches!(
            store.load_pr_data(5).unwrap_err(),
            StoreError::Malformed { .. }
        ));
    }

    #[test]
    fn test_list_pr_numbers_sorted_numeric_dirs_only() {
        let (_dir, store) = store();
        assert!(store.list_pr_numbers().unwrap().is_empty());

        for n in [10, 2, 33] {
            store.save_pr_data(&pr_data(n, vec![], vec![])).unwrap();
        }
        fs::create_dir_all(store.root().join("pulls/not-a-pr")).unwrap();
        fs::write(store.root().join("pulls/99"), "stray file").unwrap();

        assert_eq!(store.list_pr_numbers().unwrap(), vec![2, 10, 33]);
    }

    #[test]
    fn test_metadata_round_trip() {
        let (_dir, store) = store();
        let mut metadata = RepositoryMetadata {
            last_updated: ts("2024-05-01T12:00:00Z"),
            total_prs: 3,
            repository: "repo".to_string(),
            owner: "org".to_string(),
            ..RepositoryMetadata::default()
        };
        metadata.author_stats.insert("alice".to_string(), 4);
        store.save_metadata(&metadata).unwrap();
        assert_eq!(store.load_metadata().unwrap(), metadata);
    }

    #[test]
    fn test_learnings_exclude_status_file() {
        let (_dir, store) = store();
        let learning = Learning {
            pr_number: 8,
            pr_title: "Tidy errors".to_string(),
            learnings: vec!["Use thiserror for library errors".to_string()],
            topics: vec!["errors".to_string()],
            processed_at: ts("2024-05-01T12:00:00Z"),
        };
        store.save_learning(&learning).unwrap();
        store
            .save_status(&ProcessingStatus {
                total_prs: 1,
                processed_prs: 1,
                last_pr: 8,
                updated_at: Some(ts("2024-05-01T12:00:00Z")),
            })
            .unwrap();
        fs::write(store.root().join("learnings/9.json"), "garbage").unwrap();

        let all = store.load_all_learnings().unwrap();
        assert_eq!(all, vec![learning.clone()]);
        assert_eq!(store.load_learning(8).unwrap(), learning);
        assert_eq!(store.load_status().unwrap().last_pr, 8);
    }
}
