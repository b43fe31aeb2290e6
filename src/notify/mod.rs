mod merge;
mod monorail;
mod violation;

use async_trait::async_trait;

use crate::clients::Clients;
use crate::config::RefConfig;
use crate::error::AuditError;
use crate::model::RelevantCommit;

pub use merge::{
    CommentOnBugToAcknowledgeMerge, FileBugForMergeApprovalViolation, PARTIAL_ACK_STATE,
};
pub use monorail::{existing_issue, post_comment, post_issue};
pub use violation::{violation_summary, CommentOrFileMonorailIssue, LABEL_TOKEN};

/// Tells humans about the outcome of a ruleset on a commit.
///
/// `state` is what this notifier returned for the same commit and ruleset
/// last time, empty if it never ran. A non-empty state means the side effect
/// already happened, fully or in part, and must not be repeated. The
/// returned state is stored by the caller and passed back on the next call,
/// as is the state carried by [`AuditError::PartiallyNotified`].
#[async_trait]
pub trait Notification: Send + Sync {
    async fn notify(
        &self,
        cfg: &RefConfig,
        commit: &RelevantCommit,
        clients: &Clients,
        state: &str,
    ) -> Result<String, AuditError>;
}
