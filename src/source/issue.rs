//! Issue data extracted from issue-tracker pages

use serde::{Deserialize, Serialize};

/// A single comment on an issue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
    pub created: String,
}

/// An issue as scraped from its detail page
///
/// Fields the page did not provide are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    pub summary: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub assignee: String,
    pub reporter: String,
    pub created: String,
    pub updated: String,
    pub labels: Vec<String>,
    pub comments: Vec<Comment>,
}

impl Issue {
    /// Project prefix of the key (`KAFKA-123` -> `KAFKA`)
    pub fn project(&self) -> &str {
        match self.key.find('-') {
            Some(dash) if dash > 0 => &self.key[..dash],
            _ => &self.key,
        }
    }

    pub fn has_comments(&self) -> bool {
        !self.comments.is_empty()
    }
}
