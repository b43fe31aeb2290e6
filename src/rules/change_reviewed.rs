use async_trait::async_trait;
use chrono::Duration;

use super::context::AuditParams;
use super::engine::Rule;
use crate::clients::{Change, Clients, BOT_COMMIT_LABEL, CODE_REVIEW_LABEL};
use crate::error::AuditError;
use crate::model::{RelevantCommit, RuleResult, RuleStatus};

/// Time a commit landed without review has to get an after-the-fact
/// approval before it counts as a violation.
pub const REVIEW_GRACE_DAYS: i64 = 7;

/// Verifies a landed change was approved by someone other than its owner.
#[derive(Debug, Clone, Default)]
pub struct ChangeReviewed {
    /// Authors whose commits need no review.
    pub robots: Vec<String>,
}

impl ChangeReviewed {
    const NAME: &'static str = "ChangeReviewed";

    async fn change_with_labels(
        &self,
        commit: &RelevantCommit,
        clients: &Clients,
    ) -> Result<Change, AuditError> {
        let changes = clients
            .gerrit
            .change_query(&format!("commit:{}", commit.commit_hash))
            .await?;
        let Some(change) = changes.first() else {
            return Err(AuditError::indeterminate(
                Self::NAME,
                format!("no CL found for commit {:?}", commit.commit_hash),
            ));
        };
        Ok(clients
            .gerrit
            .change_details(&change.change_id, &["DETAILED_LABELS"])
            .await?)
    }
}

#[async_trait]
impl Rule for ChangeReviewed {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(
        &self,
        params: &AuditParams,
        commit: &mut RelevantCommit,
        clients: &Clients,
    ) -> Result<RuleResult, AuditError> {
        if let Some(previous) = commit.get_result(Self::NAME) {
            let polled_recently = commit
                .last_external_poll
                .is_some_and(|t| params.now - t < params.external_poll_interval);
            if previous.rule_result_status != RuleStatus::RulePending || polled_recently {
                return Ok(previous.clone());
            }
        }
        if self.robots.iter().any(|r| *r == commit.author_account) {
            return Ok(RuleResult::skipped(Self::NAME));
        }

        commit.last_external_poll = Some(params.now);
        let change = self.change_with_labels(commit, clients).await?;

        if let Some(bot_commit) = change.labels.get(BOT_COMMIT_LABEL) {
            if bot_commit.max_votes().next().is_some() {
                return Ok(RuleResult::passed(Self::NAME));
            }
        }
        let Some(code_review) = change.labels.get(CODE_REVIEW_LABEL) else {
            return Err(AuditError::indeterminate(
                Self::NAME,
                format!(
                    "change {} has no {CODE_REVIEW_LABEL} label details",
                    change.change_number
                ),
            ));
        };
        if code_review
            .max_votes()
            .any(|vote| vote.account_id != change.owner.account_id)
        {
            return Ok(RuleResult::passed(Self::NAME));
        }

        if params.now - commit.commit_time < Duration::days(REVIEW_GRACE_DAYS) {
            return Ok(RuleResult::pending(
                Self::NAME,
                format!(
                    "The commit {} has not yet been approved by a reviewer other than its owner",
                    commit.commit_hash
                ),
            ));
        }
        Ok(RuleResult::failed(
            Self::NAME,
            format!(
                "The commit {} was not approved by a reviewer other than its owner within {REVIEW_GRACE_DAYS} days of landing",
                commit.commit_hash
            ),
        ))
    }
}
