use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IssueStatus {
    Assigned,
    Available,
    Archived,
    Duplicate,
    ExternalDependency,
    Fixed,
    Started,
    #[default]
    Untriaged,
    Verified,
    WontFix,
}

impl IssueStatus {
    /// Statuses of issues that are no longer tracking anything.
    pub const CLOSED: [IssueStatus; 5] = [
        IssueStatus::Archived,
        IssueStatus::Duplicate,
        IssueStatus::Fixed,
        IssueStatus::Verified,
        IssueStatus::WontFix,
    ];

    pub fn is_closed(self) -> bool {
        Self::CLOSED.contains(&self)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    pub id: i64,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: IssueStatus,
    /// Email of the issue reporter.
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub content: String,
    /// Labels added or removed by this comment (`-Label` for removals).
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuesListRequest {
    pub project_id: String,
    pub query: String,
    /// Include closed issues in the search.
    pub include_closed: bool,
}

#[async_trait]
pub trait MonorailClient: Send + Sync {
    /// File `issue`; the returned issue carries the assigned id.
    async fn insert_issue(&self, issue: &Issue) -> Result<Issue, ClientError>;

    async fn insert_comment(
        &self,
        project_id: &str,
        issue_id: i64,
        comment: &Comment,
    ) -> Result<(), ClientError>;

    async fn issues_list(&self, request: &IssuesListRequest) -> Result<Vec<Issue>, ClientError>;

    async fn list_comments(
        &self,
        project_id: &str,
        issue_id: i64,
    ) -> Result<Vec<Comment>, ClientError>;

    async fn get_issue(&self, project_id: &str, issue_id: i64) -> Result<Issue, ClientError>;
}
