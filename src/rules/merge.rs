//! Rules for commits merged into release branches.

use async_trait::async_trait;
use tracing::warn;

use super::context::AuditParams;
use super::engine::Rule;
use crate::clients::Clients;
use crate::config::MILESTONE_NUMBER_TOKEN;
use crate::error::AuditError;
use crate::messages::bug_ids_from_commit_message;
use crate::model::{set_token, RelevantCommit, RuleResult, RuleStatus};

/// Metadata token carrying the comma separated bugs a merge refers to.
pub const BUG_NUMBERS_TOKEN: &str = "BugNumbers";

/// Label a release manager puts on a bug to approve merging its fix into
/// milestone `milestone`.
pub fn merge_approved_label(milestone: &str) -> String {
    format!("Merge-Approved-{milestone}")
}

fn milestone(params: &AuditParams) -> Result<String, AuditError> {
    params
        .repo_config
        .metadata_token(MILESTONE_NUMBER_TOKEN)
        .ok_or_else(|| {
            AuditError::Config(format!(
                "ref {} has no {MILESTONE_NUMBER_TOKEN} in its metadata",
                params.repo_config.name
            ))
        })
}

/// A merge into a release branch needs one of its bugs to carry the
/// milestone's merge approval label, applied by a release manager.
#[derive(Debug, Clone, Default)]
pub struct OnlyMergeApprovedChange {
    /// Release managers; their own merges and their approvals count.
    pub allowed_users: Vec<String>,
    /// Automated accounts allowed to merge without approval.
    pub allowed_robots: Vec<String>,
}

impl OnlyMergeApprovedChange {
    const NAME: &'static str = "OnlyMergeApprovedChange";

    fn is_allowed(&self, account: &str) -> bool {
        self.allowed_users.iter().any(|u| u == account)
            || self.allowed_robots.iter().any(|r| r == account)
    }

    async fn bug_is_approved(
        &self,
        project: &str,
        bug: i64,
        label: &str,
        clients: &Clients,
    ) -> Result<bool, AuditError> {
        if let Err(e) = clients.monorail.get_issue(project, bug).await {
            warn!(bug, error = %e, "Skipping bug that could not be fetched");
            return Ok(false);
        }
        let comments = clients.monorail.list_comments(project, bug).await?;
        Ok(comments.iter().any(|c| {
            self.allowed_users.iter().any(|u| *u == c.author) && c.labels.iter().any(|l| l == label)
        }))
    }
}

#[async_trait]
impl Rule for OnlyMergeApprovedChange {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(
        &self,
        params: &AuditParams,
        commit: &mut RelevantCommit,
        clients: &Clients,
    ) -> Result<RuleResult, AuditError> {
        if self.is_allowed(&commit.author_account) || self.is_allowed(&commit.committer_account) {
            return Ok(RuleResult::passed(Self::NAME));
        }
        let milestone = milestone(params)?;
        let branch = &params.repo_config.branch_name;

        let Ok(bugs) = bug_ids_from_commit_message(&commit.commit_message) else {
            return Ok(RuleResult::failed(
                Self::NAME,
                format!(
                    "Revision {} was merged to {branch} branch with no bug attached!",
                    commit.commit_hash
                ),
            ));
        };

        let label = merge_approved_label(&milestone);
        let project = &params.repo_config.monorail_project;
        for bug in &bugs {
            let Ok(id) = bug.parse::<i64>() else {
                continue;
            };
            if self.bug_is_approved(project, id, &label, clients).await? {
                return Ok(RuleResult::passed(Self::NAME));
            }
        }

        let mut result = RuleResult::failed(
            Self::NAME,
            format!(
                "Revision {} was merged to {branch} branch without merge approval from any of the release managers",
                commit.commit_hash
            ),
        );
        result.meta_data = set_token(BUG_NUMBERS_TOKEN, &bugs.join(","), &result.meta_data)?;
        Ok(result)
    }
}

/// Every merge with a bug gets an acknowledgement comment on that bug.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcknowledgeMerge;

#[async_trait]
impl Rule for AcknowledgeMerge {
    fn name(&self) -> &str {
        "AcknowledgeMerge"
    }

    async fn run(
        &self,
        _params: &AuditParams,
        commit: &mut RelevantCommit,
        _clients: &Clients,
    ) -> Result<RuleResult, AuditError> {
        let Ok(bugs) = bug_ids_from_commit_message(&commit.commit_message) else {
            return Ok(RuleResult::skipped(self.name()));
        };
        let mut result = RuleResult::new(self.name(), RuleStatus::NotificationRequired);
        result.meta_data = set_token(BUG_NUMBERS_TOKEN, &bugs.join(","), "")?;
        Ok(result)
    }
}
