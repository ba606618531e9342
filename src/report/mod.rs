pub mod types;

pub use types::OutputFormat;

use colored::Colorize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::pr::RepositoryMetadata;
use crate::query::{AuthorSet, CommentRow, TIMESTAMP_FORMAT};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),

    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to encode CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Longest body printed in text output, ellipsis included.
const MAX_BODY_CHARS: usize = 500;

const CSV_HEADER: [&str; 9] = [
    "PR Number",
    "PR Title",
    "Author",
    "Type",
    "Body",
    "Created At",
    "URL",
    "Path",
    "Line",
];

/// Render query rows in the requested format. Terminal styling is only
/// applied to text output when `styled` is set.
pub fn render(
    format: OutputFormat,
    rows: &[CommentRow],
    metadata: &RepositoryMetadata,
    authors: &AuthorSet,
    styled: bool,
) -> Result<String, ReportError> {
    match format {
        OutputFormat::Json => render_json(rows),
        OutputFormat::Csv => render_csv(rows),
        OutputFormat::Text => Ok(render_text(rows, metadata, authors, styled)),
    }
}

fn render_json(rows: &[CommentRow]) -> Result<String, ReportError> {
    Ok(serde_json::to_string_pretty(rows)?)
}

fn render_csv(rows: &[CommentRow]) -> Result<String, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for row in rows {
        writer.write_record([
            row.pr_number.to_string(),
            row.pr_title.clone(),
            row.author.clone(),
            row.comment_type.to_string(),
            row.body.clone(),
            row.created_at.clone(),
            row.url.clone(),
            row.path.clone(),
            row.line.map(|l| l.to_string()).unwrap_or_default(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::FileWrite(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Repository header, all-time comment counts of the requested authors
/// (from metadata, not from `rows`), then the rows grouped by PR.
fn render_text(
    rows: &[CommentRow],
    metadata: &RepositoryMetadata,
    authors: &AuthorSet,
    styled: bool,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Repository: {}/{}", metadata.owner, metadata.repository);
    let _ = writeln!(out, "Total PRs: {}", metadata.total_prs);
    let _ = writeln!(
        out,
        "Last Updated: {}",
        metadata.last_updated.format(TIMESTAMP_FORMAT)
    );
    out.push('\n');

    out.push_str("Author Statistics:\n");
    for author in authors.iter() {
        let count = metadata.author_stats.get(author).copied().unwrap_or(0);
        let _ = writeln!(out, "  {}: {} comments", author, count);
    }
    out.push('\n');

    let mut groups: BTreeMap<u64, Vec<&CommentRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.pr_number).or_default().push(row);
    }

    let _ = writeln!(
        out,
        "Found {} comments from selected authors in {} PRs:\n",
        rows.len(),
        groups.len()
    );

    for (number, group) in &groups {
        let title = format!("PR #{}: {}", number, group[0].pr_title);
        if styled {
            let _ = writeln!(out, "{}", title.bold());
        } else {
            let _ = writeln!(out, "{}", title);
        }
        let _ = writeln!(out, "{}", "-".repeat(80));

        for row in group {
            let _ = writeln!(
                out,
                "Author: {} | Type: {} | Date: {}",
                row.author, row.comment_type, row.created_at
            );
            if !row.path.is_empty() {
                let _ = write!(out, "File: {}", row.path);
                if let Some(line) = row.line {
                    let _ = write!(out, " (line {})", line);
                }
                out.push('\n');
            }
            let _ = writeln!(out, "URL: {}\n", row.url);
            let _ = writeln!(out, "{}\n", truncate(&row.body, MAX_BODY_CHARS));
        }
        out.push('\n');
    }
    out
}

/// Cut `text` to at most `max` characters, ending in "..." when shortened.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Print the rendered output to stdout, or write it to `output_path`.
#[instrument(skip(content), fields(bytes = content.len()))]
pub fn output(content: &str, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            println!("{}", content);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            std::fs::write(path, content)?;
            Ok(())
        }
    }
}
