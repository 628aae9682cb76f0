//! HTML parser for issue-tracker pages
//!
//! This module handles parsing:
//! - Listing pages into the issue keys they link to
//! - Issue detail pages into an [`Issue`]
//!
//! Every field has an ordered list of selectors; the first one that matches
//! an element with non-empty text wins, so markup changes on the remote side
//! only need a new selector appended here.

use crate::source::issue::{Comment, Issue};
use scraper::{ElementRef, Html, Selector};

const LISTING_LINK_SELECTOR: &str = "a[href*='/browse/']";
const LISTING_FALLBACK_SELECTOR: &str = ".issue-link, .issuekey, [data-issue-key]";

const SUMMARY_SELECTORS: &[&str] = &["#summary-val", ".summary", "h1"];
const DESCRIPTION_SELECTORS: &[&str] = &["#description-val", ".description", ".user-content-block"];
const STATUS_SELECTORS: &[&str] = &["#status-val", ".status", "[data-field-id='status']"];
const PRIORITY_SELECTORS: &[&str] = &["#priority-val", ".priority", "[data-field-id='priority']"];
const ASSIGNEE_SELECTORS: &[&str] = &["#assignee-val", ".assignee", "[data-field-id='assignee']"];
const REPORTER_SELECTORS: &[&str] = &["#reporter-val", ".reporter", "[data-field-id='reporter']"];
const CREATED_SELECTORS: &[&str] = &["#created-val", ".created", "[data-field-id='created']"];
const UPDATED_SELECTORS: &[&str] = &["#updated-val", ".updated", "[data-field-id='updated']"];

const LABEL_SELECTOR: &str = ".labels .lozenge, .label, [data-field-id='labels'] .lozenge";

const COMMENT_SELECTOR: &str = ".activity-comment, .comment, .issue-data-block";
const COMMENT_AUTHOR_SELECTORS: &[&str] = &[".author", ".user-hover", ".comment-author"];
const COMMENT_BODY_SELECTORS: &[&str] = &[
    ".comment-body",
    ".user-content-block",
    ".activity-comment-content",
];
const COMMENT_DATE_SELECTORS: &[&str] = &[".comment-date", ".date", ".activity-date"];

/// Extracts issue keys from a listing page, de-duplicated in page order
///
/// Keys come from links to `/browse/<KEY>`. If the page has none, elements
/// marked as issue keys are tried instead, preferring their `data-issue-key`
/// attribute over their text.
pub fn extract_issue_keys(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut keys: Vec<String> = Vec::new();

    if let Ok(selector) = Selector::parse(LISTING_LINK_SELECTOR) {
        for link in document.select(&selector) {
            if let Some(key) = link.value().attr("href").and_then(find_issue_key) {
                push_unique(&mut keys, key);
            }
        }
    }

    if keys.is_empty() {
        if let Ok(selector) = Selector::parse(LISTING_FALLBACK_SELECTOR) {
            for element in document.select(&selector) {
                let key = match element.value().attr("data-issue-key") {
                    Some(data_key) if !data_key.trim().is_empty() => {
                        Some(data_key.trim().to_string())
                    }
                    _ => find_issue_key(&element_text(&element)),
                };
                if let Some(key) = key {
                    push_unique(&mut keys, key);
                }
            }
        }
    }

    keys
}

/// Parses an issue detail page
///
/// # Returns
///
/// * `Some(Issue)` - The page has a summary
/// * `None` - No summary was found; the page is not an issue page
pub fn parse_issue(html: &str, key: &str) -> Option<Issue> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let summary = first_text(&root, SUMMARY_SELECTORS)?;

    Some(Issue {
        key: key.to_string(),
        summary,
        description: first_text(&root, DESCRIPTION_SELECTORS).unwrap_or_default(),
        status: first_text(&root, STATUS_SELECTORS).unwrap_or_default(),
        priority: first_text(&root, PRIORITY_SELECTORS).unwrap_or_default(),
        assignee: first_text(&root, ASSIGNEE_SELECTORS).unwrap_or_default(),
        reporter: first_text(&root, REPORTER_SELECTORS).unwrap_or_default(),
        created: first_text(&root, CREATED_SELECTORS).unwrap_or_default(),
        updated: first_text(&root, UPDATED_SELECTORS).unwrap_or_default(),
        labels: extract_labels(&document),
        comments: extract_comments(&document),
    })
}

fn extract_labels(document: &Html) -> Vec<String> {
    let mut labels = Vec::new();
    if let Ok(selector) = Selector::parse(LABEL_SELECTOR) {
        for element in document.select(&selector) {
            let label = element_text(&element);
            if !label.is_empty() {
                push_unique(&mut labels, label);
            }
        }
    }
    labels
}

/// Comments without a body are dropped
fn extract_comments(document: &Html) -> Vec<Comment> {
    let Ok(selector) = Selector::parse(COMMENT_SELECTOR) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| {
            let body = first_text(&element, COMMENT_BODY_SELECTORS)?;
            Some(Comment {
                author: first_text(&element, COMMENT_AUTHOR_SELECTORS).unwrap_or_default(),
                body,
                created: first_text(&element, COMMENT_DATE_SELECTORS).unwrap_or_default(),
            })
        })
        .collect()
}

/// Text of the first element under `scope` matching any selector, in selector order
fn first_text(scope: &ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|css| {
        let selector = Selector::parse(css).ok()?;
        scope
            .select(&selector)
            .map(|element| element_text(&element))
            .find(|text| !text.is_empty())
    })
}

/// Element text, trimmed, with runs of whitespace collapsed to one space
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Finds the first `[A-Z]+-[0-9]+` token in `text`
fn find_issue_key(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut start = 0;

    while start < bytes.len() {
        if !bytes[start].is_ascii_uppercase() {
            start += 1;
            continue;
        }

        let mut dash = start;
        while dash < bytes.len() && bytes[dash].is_ascii_uppercase() {
            dash += 1;
        }

        let mut end = dash + 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }

        if dash < bytes.len() && bytes[dash] == b'-' && end > dash + 1 {
            return Some(text[start..end].to_string());
        }
        start = dash;
    }

    None
}

fn push_unique(values: &mut Vec<String>, value: String) {
    if !values.contains(&value) {
        values.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_issue_page() -> &'static str {
        r#"<html><body>
            <h1 id="summary-val">  Executor   crashes on
                empty partition </h1>
            <div id="description-val"><p>Steps to reproduce:</p><p>run the job</p></div>
            <span id="status-val">Open</span>
            <span id="priority-val">Major</span>
            <span id="assignee-val">alice</span>
            <span id="reporter-val">bob</span>
            <span id="created-val">2024-01-02</span>
            <span id="updated-val">2024-01-05</span>
            <ul class="labels">
                <li><a class="lozenge">core</a></li>
                <li><a class="lozenge">bug</a></li>
                <li><a class="lozenge">core</a></li>
            </ul>
            <div class="activity-comment">
                <a class="author">carol</a>
                <span class="date">2024-01-03</span>
                <div class="comment-body">Confirmed on 3.4</div>
            </div>
            <div class="activity-comment">
                <a class="author">dave</a>
            </div>
        </body></html>"#
    }

    #[test]
    fn test_find_issue_key() {
        assert_eq!(find_issue_key("/jira/browse/SPARK-123"), Some("SPARK-123".to_string()));
        assert_eq!(find_issue_key("see HADOOP-7 and X-1"), Some("HADOOP-7".to_string()));
        assert_eq!(find_issue_key("a Ab-12 AB-"), None);
        assert_eq!(find_issue_key(""), None);
    }

    #[test]
    fn test_extract_issue_keys_from_links() {
        let html = r#"<table>
            <tr><td><a href="/jira/browse/SPARK-3">SPARK-3</a></td>
                <td><a href="/jira/browse/SPARK-3">Summary link</a></td></tr>
            <tr><td><a href="https://host/jira/browse/SPARK-1">SPARK-1</a></td></tr>
            <tr><td><a href="/jira/secure/Dashboard.jspa">home</a></td></tr>
        </table>"#;

        assert_eq!(extract_issue_keys(html), vec!["SPARK-3", "SPARK-1"]);
    }

    #[test]
    fn test_extract_issue_keys_fallback() {
        let html = r#"<div>
            <span data-issue-key="KAFKA-10">x</span>
            <span class="issuekey">KAFKA-11</span>
            <span class="issue-link">no key here</span>
        </div>"#;

        assert_eq!(extract_issue_keys(html), vec!["KAFKA-10", "KAFKA-11"]);
    }

    #[test]
    fn test_extract_issue_keys_empty_page() {
        assert!(extract_issue_keys("<html><body>No issues</body></html>").is_empty());
    }

    #[test]
    fn test_parse_issue_fields() {
        let issue = parse_issue(create_test_issue_page(), "SPARK-1").unwrap();

        assert_eq!(issue.key, "SPARK-1");
        assert_eq!(issue.summary, "Executor crashes on empty partition");
        assert_eq!(issue.description, "Steps to reproduce: run the job");
        assert_eq!(issue.status, "Open");
        assert_eq!(issue.priority, "Major");
        assert_eq!(issue.assignee, "alice");
        assert_eq!(issue.reporter, "bob");
        assert_eq!(issue.created, "2024-01-02");
        assert_eq!(issue.updated, "2024-01-05");
        assert_eq!(issue.labels, vec!["core", "bug"]);
    }

    #[test]
    fn test_parse_issue_comments_without_body_are_dropped() {
        let issue = parse_issue(create_test_issue_page(), "SPARK-1").unwrap();

        assert_eq!(
            issue.comments,
            vec![Comment {
                author: "carol".to_string(),
                body: "Confirmed on 3.4".to_string(),
                created: "2024-01-03".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_issue_fallback_selectors() {
        let html = r#"<html><body>
            <h1>Plain heading summary</h1>
            <div data-field-id="status">Resolved</div>
        </body></html>"#;

        let issue = parse_issue(html, "P-1").unwrap();
        assert_eq!(issue.summary, "Plain heading summary");
        assert_eq!(issue.status, "Resolved");
        assert!(issue.description.is_empty());
        assert!(issue.labels.is_empty());
        assert!(!issue.has_comments());
    }

    #[test]
    fn test_parse_issue_without_summary() {
        assert!(parse_issue("<html><body><p>Login required</p></body></html>", "P-1").is_none());
    }
}
