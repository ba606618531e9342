pub mod prompt;
pub mod types;

pub use types::{Learning, ProcessSummary, ProcessingStatus};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::pr::PrData;
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Generation service returned an error: {0}")]
    Service(String),

    #[error("Generation service returned no content")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to read processing status: {0}")]
    Status(#[source] StoreError),

    #[error("Failed to list downloaded pull requests: {0}")]
    ListPrs(#[source] StoreError),

    #[error("Failed to load learnings: {0}")]
    LoadLearnings(#[source] StoreError),

    #[error("No learnings found - run 'process-prs' first")]
    NothingToSynthesize,

    #[error("Failed to synthesize style guide: {0}")]
    Generation(#[from] GenerationError),

    #[error("Failed to write style guide to {}: {source}", path.display())]
    WriteGuide {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A text-generation service: prompt in, free-form text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Ask the generator for the learnings of one PR.
///
/// An empty answer, or one without a parseable learnings object, yields an
/// empty `Learning` rather than an error.
pub async fn extract_learning<G: TextGenerator + ?Sized>(
    generator: &G,
    data: &PrData,
) -> Result<Learning, GenerationError> {
    let text = match generator.generate(&prompt::extraction_prompt(data)).await {
        Ok(text) => text,
        Err(GenerationError::EmptyResponse) => {
            warn!(pr = data.pr.number, "generation returned no content");
            String::new()
        }
        Err(e) => return Err(e),
    };
    let extracted = prompt::parse_learnings(&text).unwrap_or_else(|| {
        warn!(pr = data.pr.number, "could not parse learnings from response");
        types::ExtractedLearnings::default()
    });
    Ok(Learning {
        pr_number: data.pr.number,
        pr_title: data.pr.title.clone(),
        learnings: extracted.learnings,
        topics: extracted.topics,
        processed_at: Utc::now(),
    })
}

/// Resumable pass that turns downloaded PRs into stored learnings.
///
/// PRs are visited in ascending number order starting after the persisted
/// cursor. The status file is rewritten after every processed PR, so an
/// interruption loses at most the PR in flight.
pub struct LearningProcessor<'a, G: TextGenerator> {
    generator: &'a G,
    store: &'a RecordStore,
    pr_delay: Duration,
}

/// Why a PR was passed over without calling the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    NoDiscussion,
    NoCodeReview,
}

fn skip_reason(data: &PrData) -> Option<SkipReason> {
    if data.is_silent() {
        Some(SkipReason::NoDiscussion)
    } else if !data.has_code_review() {
        Some(SkipReason::NoCodeReview)
    } else {
        None
    }
}

impl<'a, G: TextGenerator> LearningProcessor<'a, G> {
    pub fn new(generator: &'a G, store: &'a RecordStore, pr_delay: Duration) -> Self {
        Self {
            generator,
            store,
            pr_delay,
        }
    }

    pub async fn process_all(&self) -> Result<ProcessSummary, ProcessError> {
        info!("starting PR processing");

        let mut status = match self.store.load_status() {
            Ok(status) => status,
            Err(e) if e.is_not_found() => ProcessingStatus::default(),
            Err(e) => return Err(ProcessError::Status(e)),
        };

        let numbers = self.store.list_pr_numbers().map_err(ProcessError::ListPrs)?;
        status.total_prs = numbers.len();
        info!(total = numbers.len(), "found downloaded PRs");

        let start = numbers.partition_point(|&n| n <= status.last_pr);
        if status.last_pr > 0 {
            info!(
                cursor = status.last_pr,
                already_done = start,
                remaining = numbers.len() - start,
                "resuming"
            );
        }

        let mut summary = ProcessSummary::default();
        for (i, &number) in numbers.iter().enumerate().skip(start) {
            info!(pr = number, progress = %format!("{}/{}", i + 1, numbers.len()), "processing PR");

            let processed = self
                .process_one(number, &mut status, &mut summary)
                .instrument(info_span!("pr", pr = number))
                .await;

            if processed && i + 1 < numbers.len() && !self.pr_delay.is_zero() {
                tokio::time::sleep(self.pr_delay).await;
            }
        }

        info!(
            processed = summary.processed.len(),
            skipped = summary.skipped,
            failed = summary.failed,
            total_processed = status.processed_prs,
            "processing complete"
        );
        Ok(summary)
    }

    /// Returns whether the generator was called for this PR.
    async fn process_one(
        &self,
        number: u64,
        status: &mut ProcessingStatus,
        summary: &mut ProcessSummary,
    ) -> bool {
        let data = match self.store.load_pr_data(number) {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, "failed to load PR, skipping");
                summary.failed += 1;
                return false;
            }
        };

        if let Some(reason) = skip_reason(&data) {
            debug!(?reason, "skipping PR");
            summary.skipped += 1;
            return false;
        }

        let learning = match extract_learning(self.generator, &data).await {
            Ok(learning) => learning,
            Err(e) => {
                error!(error = %e, "generation failed, skipping");
                summary.failed += 1;
                return true;
            }
        };

        if let Err(e) = self.store.save_learning(&learning) {
            error!(error = %e, "failed to save learning, skipping");
            summary.failed += 1;
            return true;
        }

        status.processed_prs += 1;
        status.last_pr = number;
        status.updated_at = Some(Utc::now());
        if let Err(e) = self.store.save_status(status) {
            error!(error = %e, "failed to save processing status");
        }

        if learning.learnings.is_empty() {
            info!("no style learnings found");
        } else {
            info!(
                learnings = learning.learnings.len(),
                topics = learning.topics.len(),
                "extracted learnings"
            );
        }
        summary.processed.push(number);
        true
    }
}

/// Result of a synthesis run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisSummary {
    pub prs: usize,
    pub learnings: usize,
    /// Topic tags by descending frequency
    pub topics: Vec<(String, usize)>,
}

/// Merge every stored learning into one style guide written to `output`.
pub async fn synthesize<G: TextGenerator + ?Sized>(
    generator: &G,
    store: &RecordStore,
    output: &Path,
) -> Result<SynthesisSummary, ProcessError> {
    let learnings = store
        .load_all_learnings()
        .map_err(ProcessError::LoadLearnings)?;
    if learnings.is_empty() {
        return Err(ProcessError::NothingToSynthesize);
    }

    let statements: Vec<&str> = learnings
        .iter()
        .flat_map(|l| l.learnings.iter().map(String::as_str))
        .collect();
    let topics = tally_topics(&learnings);
    info!(
        prs = learnings.len(),
        learnings = statements.len(),
        "synthesizing style guide"
    );
    debug!(top_topics = ?topics.iter().take(10).collect::<Vec<_>>(), "topic frequency");

    let guide = generator
        .generate(&prompt::synthesis_prompt(&statements))
        .await?;
    std::fs::write(output, guide).map_err(|source| ProcessError::WriteGuide {
        path: output.to_path_buf(),
        source,
    })?;
    info!(path = %output.display(), "style guide saved");

    Ok(SynthesisSummary {
        prs: learnings.len(),
        learnings: statements.len(),
        topics,
    })
}

fn tally_topics(learnings: &[Learning]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for topic in learnings.iter().flat_map(|l| &l.topics) {
        *counts.entry(topic.as_str()).or_default() += 1;
    }
    let mut topics: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(topic, count)| (topic.to_string(), count))
        .collect();
    topics.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    topics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pr::fixtures::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records prompts and answers with a canned response.
    struct FakeGenerator {
        prompts: Mutex<Vec<String>>,
        response: String,
        fail: bool,
        blocked: bool,
    }

    impl FakeGenerator {
        fn answering(response: &str) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                response: response.to_string(),
                fail: false,
                blocked: false,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextGenerator for FakeGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                return Err(GenerationError::Service("quota exceeded".to_string()));
            }
            if self.blocked {
                return Err(GenerationError::EmptyResponse);
            }
            Ok(self.response.clone())
        }
    }

    const ANSWER: &str = r#"{"learnings": ["Prefer iterators"], "topics": ["style"]}"#;
    const AT: &str = "2024-01-01T00:00:00Z";

    fn reviewed(number: u64) -> PrData {
        pr_data(
            number,
            vec![review_comment(number * 10, "alice", "use iter()", AT, Some(3))],
            vec![],
        )
    }

    fn store_with(prs: &[PrData]) -> (TempDir, RecordStore) {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path());
        for pr in prs {
            store.save_pr_data(pr).unwrap();
        }
        (dir, store)
    }

    #[tokio::test]
    async fn test_resume_after_cursor() {
        let prs: Vec<PrData> = [1, 2, 3, 5, 8].into_iter().map(reviewed).collect();
        let (_dir, store) = store_with(&prs);
        store
            .save_status(&ProcessingStatus {
                total_prs: 5,
                processed_prs: 3,
                last_pr: 3,
                updated_at: None,
            })
            .unwrap();

        let generator = FakeGenerator::answering(ANSWER);
        let summary = LearningProcessor::new(&generator, &store, Duration::ZERO)
            .process_all()
            .await
            .unwrap();

        assert_eq!(summary.processed, vec![5, 8]);
        assert_eq!(generator.calls().len(), 2);
        assert!(generator.calls()[0].contains("PR #5:"));
        assert!(generator.calls()[1].contains("PR #8:"));

        let status = store.load_status().unwrap();
        assert_eq!(status.last_pr, 8);
        assert_eq!(status.processed_prs, 5);
        assert_eq!(status.total_prs, 5);
        assert!(store.load_learning(1).unwrap_err().is_not_found());
        assert_eq!(store.load_learning(5).unwrap().learnings, vec!["Prefer iterators"]);
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let prs: Vec<PrData> = [4, 9].into_iter().map(reviewed).collect();
        let (_dir, store) = store_with(&prs);
        let generator = FakeGenerator::answering(ANSWER);
        let processor = LearningProcessor::new(&generator, &store, Duration::ZERO);

        assert_eq!(processor.process_all().await.unwrap().processed, vec![4, 9]);
        let status = store.load_status().unwrap();

        let second = processor.process_all().await.unwrap();
        assert!(second.processed.is_empty());
        assert_eq!(generator.calls().len(), 2);
        assert_eq!(store.load_status().unwrap(), status);
    }

    #[tokio::test]
    async fn test_prs_without_code_review_are_not_sent() {
        let silent = pr_data(1, vec![], vec![]);
        let chatty = pr_data(
            2,
            vec![issue_comment(20, "bob", "ship it", AT)],
            vec![review(21, "bob", "approved", AT)],
        );
        let (_dir, store) = store_with(&[silent, chatty, reviewed(3)]);
        let generator = FakeGenerator::answering(ANSWER);

        let summary = LearningProcessor::new(&generator, &store, Duration::ZERO)
            .process_all()
            .await
            .unwrap();
        assert_eq!(summary.processed, vec![3]);
        assert_eq!(summary.skipped, 2);
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_does_not_advance_cursor() {
        let (_dir, store) = store_with(&[reviewed(1), reviewed(2)]);
        let generator = FakeGenerator {
            fail: true,
            ..FakeGenerator::answering(ANSWER)
        };

        let summary = LearningProcessor::new(&generator, &store, Duration::ZERO)
            .process_all()
            .await
            .unwrap();
        assert!(summary.processed.is_empty());
        assert_eq!(summary.failed, 2);
        assert!(store.load_status().unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unparseable_answer_stores_empty_learning() {
        let (_dir, store) = store_with(&[reviewed(6)]);
        let generator = FakeGenerator::answering("Sorry, nothing to report.");

        let summary = LearningProcessor::new(&generator, &store, Duration::ZERO)
            .process_all()
            .await
            .unwrap();
        assert_eq!(summary.processed, vec![6]);
        let learning = store.load_learning(6).unwrap();
        assert!(learning.learnings.is_empty());
        assert_eq!(learning.pr_title, "PR 6");
    }

    #[tokio::test]
    async fn test_blocked_answer_stores_empty_learning_and_advances() {
        let (_dir, store) = store_with(&[reviewed(7)]);
        let generator = FakeGenerator {
            blocked: true,
            ..FakeGenerator::answering(ANSWER)
        };

        let summary = LearningProcessor::new(&generator, &store, Duration::ZERO)
            .process_all()
            .await
            .unwrap();
        assert_eq!(summary.processed, vec![7]);
        assert_eq!(summary.failed, 0);
        let learning = store.load_learning(7).unwrap();
        assert!(learning.learnings.is_empty());
        assert!(learning.topics.is_empty());
        assert_eq!(store.load_status().unwrap().last_pr, 7);
    }

    #[tokio::test]
    async fn test_missing_pr_record_is_skipped() {
        let (dir, store) = store_with(&[reviewed(1), reviewed(2)]);
        std::fs::remove_file(dir.path().join("pulls/1/pr.json")).unwrap();
        let generator = FakeGenerator::answering(ANSWER);

        let summary = LearningProcessor::new(&generator, &store, Duration::ZERO)
            .process_all()
            .await
            .unwrap();
        assert_eq!(summary.processed, vec![2]);
        assert_eq!(summary.failed, 1);
    }

    fn learning(number: u64, learnings: &[&str], topics: &[&str]) -> Learning {
        Learning {
            pr_number: number,
            pr_title: format!("PR {}", number),
            learnings: learnings.iter().map(|s| s.to_string()).collect(),
            topics: topics.iter().map(|s| s.to_string()).collect(),
            processed_at: ts(AT),
        }
    }

    #[tokio::test]
    async fn test_synthesize_writes_generated_guide() {
        let (dir, store) = store_with(&[]);
        store
            .save_learning(&learning(1, &["Use snake_case"], &["naming", "style"]))
            .unwrap();
        store
            .save_learning(&learning(2, &["Avoid unwrap", "Log errors"], &["errors", "style"]))
            .unwrap();
        let output = dir.path().join("STYLE_GUIDE.md");
        std::fs::write(&output, "old guide").unwrap();

        let generator = FakeGenerator::answering("# Style Guide\n");
        let summary = synthesize(&generator, &store, &output).await.unwrap();

        assert_eq!(summary.prs, 2);
        assert_eq!(summary.learnings, 3);
        assert_eq!(summary.topics[0], ("style".to_string(), 2));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "# Style Guide\n");

        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("Based on 3 learnings"));
        for statement in ["Use snake_case", "Avoid unwrap", "Log errors"] {
            assert!(calls[0].contains(&format!("- {}\n", statement)));
        }
    }

    #[tokio::test]
    async fn test_synthesize_without_learnings() {
        let (dir, store) = store_with(&[]);
        let generator = FakeGenerator::answering("unused");
        let err = synthesize(&generator, &store, &dir.path().join("out.md"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::NothingToSynthesize));
        assert!(generator.calls().is_empty());
    }
}
