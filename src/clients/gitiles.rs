use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Modify,
    Delete,
    Rename,
    Copy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeDiff {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    #[serde(default)]
    pub old_path: String,
    #[serde(default)]
    pub new_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub email: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commit {
    pub id: String,
    #[serde(default)]
    pub author: Option<User>,
    #[serde(default)]
    pub committer: Option<User>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub tree_diff: Vec<TreeDiff>,
}

impl Commit {
    pub fn author_email(&self) -> &str {
        self.author.as_ref().map(|u| u.email.as_str()).unwrap_or_default()
    }

    pub fn committer_email(&self) -> &str {
        self.committer
            .as_ref()
            .map(|u| u.email.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogRequest {
    pub project: String,
    pub committish: String,
    pub exclude_ancestors_of: Option<String>,
    pub page_size: usize,
    pub tree_diff: bool,
}

#[async_trait]
pub trait GitilesClient: Send + Sync {
    /// Commits reachable from `committish`, newest first.
    async fn log(&self, host: &str, request: &LogRequest) -> Result<Vec<Commit>, ClientError>;

    /// Map of ref name to revision under `refs_path`.
    async fn refs(
        &self,
        host: &str,
        project: &str,
        refs_path: &str,
    ) -> Result<HashMap<String, String>, ClientError>;
}

/// Split a gitiles repo URL into `(host, project)`.
///
/// `https://chromium.googlesource.com/infra/infra.git` yields
/// `("chromium.googlesource.com", "infra/infra")`.
pub fn parse_repo_url(url: &str) -> Result<(String, String), ClientError> {
    let rest = url
        .strip_prefix("https://")
        .ok_or_else(|| ClientError::InvalidResponse(format!("{url} is not an https URL")))?;
    let (host, path) = rest
        .split_once('/')
        .ok_or_else(|| ClientError::InvalidResponse(format!("{url} has no project")))?;
    let project = path
        .trim_start_matches("a/")
        .trim_end_matches('/')
        .trim_end_matches(".git");
    if host.is_empty() || project.is_empty() {
        return Err(ClientError::InvalidResponse(format!(
            "{url} is not a valid repo URL"
        )));
    }
    Ok((host.to_string(), project.to_string()))
}
