//! Shapes scraped issues into training tasks
//!
//! Every issue yields a summarization, a classification and a
//! question-answering task; issues with comments also yield a conversation
//! task. Each task carries a `metadata` object describing its source issue.

use crate::output::TransformedRecord;
use crate::source::Issue;
use serde_json::{json, Map, Value};

pub const SUMMARIZATION: &str = "summarization";
pub const CLASSIFICATION: &str = "classification";
pub const QUESTION_ANSWERING: &str = "question_answering";
pub const CONVERSATION: &str = "conversation";

/// Builds the output record for `issue` in `partition`
pub fn to_record(partition: &str, issue: &Issue) -> TransformedRecord {
    let mut tasks = vec![
        summarization_task(issue),
        classification_task(issue),
        question_answering_task(issue),
    ];
    if issue.has_comments() {
        tasks.push(conversation_task(issue));
    }

    TransformedRecord::new(partition, issue.key.clone(), tasks)
}

fn summarization_task(issue: &Issue) -> Value {
    task(
        issue,
        SUMMARIZATION,
        "Summarize the following software issue in one concise sentence:",
        [
            ("input", Value::String(clean_text(&full_text(issue)))),
            ("output", Value::String(clean_text(&issue.summary))),
        ],
    )
}

fn classification_task(issue: &Issue) -> Value {
    let input = format!("{}\n\n{}", issue.summary, issue.description);
    task(
        issue,
        CLASSIFICATION,
        "Classify this software issue by priority and current status:",
        [
            ("input", Value::String(clean_text(&input))),
            (
                "output",
                json!({ "priority": issue.priority, "status": issue.status }),
            ),
        ],
    )
}

fn question_answering_task(issue: &Issue) -> Value {
    task(
        issue,
        QUESTION_ANSWERING,
        "Answer the question based on the provided context:",
        [
            ("context", Value::String(clean_text(&full_text(issue)))),
            (
                "question",
                Value::String("What is the main problem described in this issue?".to_string()),
            ),
            ("answer", Value::String(clean_text(&issue.summary))),
        ],
    )
}

fn conversation_task(issue: &Issue) -> Value {
    let mut turns = Vec::with_capacity(issue.comments.len() + 1);
    turns.push(json!({
        "role": "system",
        "content": format!(
            "Issue: {}\nDescription: {}",
            clean_text(&issue.summary),
            clean_text(&issue.description)
        ),
    }));
    for comment in &issue.comments {
        turns.push(json!({
            "role": "user",
            "author": comment.author,
            "content": clean_text(&comment.body),
            "timestamp": comment.created,
        }));
    }

    task(
        issue,
        CONVERSATION,
        "Continue this technical discussion about the software issue:",
        [("conversation", Value::Array(turns))],
    )
}

fn task<const N: usize>(
    issue: &Issue,
    task_type: &str,
    instruction: &str,
    fields: [(&str, Value); N],
) -> Value {
    let mut object = Map::new();
    object.insert("metadata".to_string(), metadata(issue, task_type));
    for (name, value) in fields {
        object.insert(name.to_string(), value);
    }
    object.insert(
        "instruction".to_string(),
        Value::String(instruction.to_string()),
    );
    Value::Object(object)
}

fn metadata(issue: &Issue, task_type: &str) -> Value {
    json!({
        "issue_key": issue.key,
        "project": issue.project(),
        "task_type": task_type,
        "status": issue.status,
        "priority": issue.priority,
        "created": issue.created,
        "updated": issue.updated,
        "reporter": issue.reporter,
        "assignee": issue.assignee,
        "labels": issue.labels,
    })
}

/// Title, description and comments as one block of text
fn full_text(issue: &Issue) -> String {
    let mut text = format!("Title: {}\n\n", issue.summary);

    if !issue.description.trim().is_empty() {
        text.push_str(&format!("Description: {}\n\n", issue.description));
    }

    if issue.has_comments() {
        text.push_str("Comments:\n");
        for comment in &issue.comments {
            text.push_str(&format!("- {}: {}\n", comment.author, comment.body));
        }
    }

    text
}

/// Strips markup and collapses whitespace
///
/// Removes `<...>` HTML tags and `{...}` wiki macros.
pub fn clean_text(text: &str) -> String {
    let stripped = strip_delimited(&strip_delimited(text, '<', '>'), '{', '}');
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Removes every non-empty `open ... close` span; an unterminated span is kept
fn strip_delimited(text: &str, open: char, close: char) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(open) {
        let after = &rest[start + open.len_utf8()..];
        match after.find(close) {
            Some(end) if end > 0 => {
                result.push_str(&rest[..start]);
                rest = &after[end + close.len_utf8()..];
            }
            _ => {
                let keep = start + open.len_utf8();
                result.push_str(&rest[..keep]);
                rest = &rest[keep..];
            }
        }
    }

    result.push_str(rest);
    result
}
