mod buildbucket;
pub mod fake;
mod gerrit;
mod gitiles;
mod monorail;
mod releases;
mod retry;

use std::sync::Arc;

pub use buildbucket::{parse_build_url, Build, BuildRef, BuildStatus, BuildbucketClient, Step};
pub use gerrit::{
    AccountInfo, ApprovalInfo, Change, GerritClient, LabelInfo, BOT_COMMIT_LABEL,
    CODE_REVIEW_LABEL,
};
pub use gitiles::{parse_repo_url, ChangeType, Commit, GitilesClient, LogRequest, TreeDiff, User};
pub use monorail::{Comment, Issue, IssueStatus, IssuesListRequest, MonorailClient};
pub use releases::{Release, ReleaseClient};
pub use retry::{with_backoff, BackoffConfig};

/// The external services a rule or notifier may talk to.
///
/// The Gerrit client is bound to the host of the ref being audited.
#[derive(Clone)]
pub struct Clients {
    /// Account the service files issues and lands automated commits as.
    pub service_account: String,
    pub gerrit: Arc<dyn GerritClient>,
    pub gitiles: Arc<dyn GitilesClient>,
    pub monorail: Arc<dyn MonorailClient>,
    pub buildbucket: Arc<dyn BuildbucketClient>,
    pub releases: Arc<dyn ReleaseClient>,
}
