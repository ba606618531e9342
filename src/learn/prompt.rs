use std::fmt::Write;

use super::types::ExtractedLearnings;
use crate::pr::PrData;

const EXTRACTION_INSTRUCTIONS: &str = "\
Analyze this pull request and extract the coding style learnings, conventions and \
best practices that reviewers asked for.

Pay particular attention to comments that quote a diff hunk: they show the exact code \
under review next to the reviewer's feedback on it.

Look for:

1. Code style preferences (formatting, naming, structure)
2. Architecture patterns and design decisions
3. Error handling approaches
4. Performance considerations
5. Testing requirements and patterns
6. Documentation standards
7. Language-specific idioms

Only extract concrete, actionable guidance a future contributor could follow. Ignore \
discussion of specific bugs or feature logic.

Respond with JSON in exactly this shape:
{
  \"learnings\": [\"learning 1\", \"learning 2\"],
  \"topics\": [\"topic1\", \"topic2\"]
}

Pull request:
";

/// Prompt asking for the learnings of a single PR.
pub fn extraction_prompt(data: &PrData) -> String {
    let mut prompt = String::from(EXTRACTION_INSTRUCTIONS);
    push_pr_context(&mut prompt, data);
    prompt
}

/// PR header, every comment with its file anchor, then review bodies.
fn push_pr_context(out: &mut String, data: &PrData) {
    let pr = &data.pr;
    let _ = writeln!(out, "PR #{}: {}", pr.number, pr.title);
    let _ = writeln!(out, "Author: {}", pr.user.login);
    let _ = writeln!(out, "State: {}", pr.state);
    if !pr.body.is_empty() {
        let _ = writeln!(out, "\nDescription:\n{}", pr.body);
    }

    out.push_str("\n--- Comments ---\n");
    for comment in &data.comments {
        let _ = writeln!(out, "\n[{} by {}]", comment.type_tag(), comment.user.login);
        if let Some(anchor) = comment.anchor() {
            let _ = write!(out, "File: {}", anchor.path);
            if let Some(line) = anchor.line {
                let _ = write!(out, " (line {})", line);
            }
            out.push('\n');
            if !anchor.diff_hunk.is_empty() {
                let _ = writeln!(out, "Diff:\n{}", anchor.diff_hunk);
            }
        }
        let _ = writeln!(out, "{}", comment.body);
    }

    let reviews: Vec<_> = data.reviews.iter().filter(|r| !r.body.is_empty()).collect();
    if !reviews.is_empty() {
        out.push_str("\n--- Reviews ---\n");
        for review in reviews {
            let _ = writeln!(out, "\n[{} review by {}]", review.state, review.user.login);
            let _ = writeln!(out, "{}", review.body);
        }
    }
}

/// Prompt asking for one style guide from all collected learnings.
pub fn synthesis_prompt(learnings: &[&str]) -> String {
    let mut prompt = format!(
        "Based on {} learnings extracted from this project's code reviews, write a concise \
style guide (one to two pages) covering the most important coding conventions and \
practices.\n\n",
        learnings.len()
    );
    prompt.push_str(
        "Keep it practical. Include sections on:\n\n\
1. Code Style and Formatting\n\
2. Architecture Patterns\n\
3. Error Handling\n\
4. Performance Guidelines\n\
5. Testing Requirements\n\
6. Documentation Standards\n\n\
Write Markdown with clear sections and short examples where they help. Favor the \
patterns reviewers raised most often and held most strongly.\n\n\
Learnings:\n",
    );
    for learning in learnings {
        let _ = writeln!(prompt, "- {}", learning);
    }
    prompt.push_str(
        "\nThe guide is for new contributors who want their code to fit the project's \
established style.",
    );
    prompt
}

/// Pull the learnings object out of free-form model output.
///
/// Takes the text between the first `{` and the last `}`. Returns `None`
/// when there is no such span or it does not parse.
pub(crate) fn parse_learnings(text: &str) -> Option<ExtractedLearnings> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
