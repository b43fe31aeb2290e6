//! Notifiers for merges into release branches.

use async_trait::async_trait;
use tracing::warn;

use super::monorail::{post_comment, post_issue};
use super::Notification;
use crate::clients::Clients;
use crate::config::{RefConfig, MILESTONE_NUMBER_TOKEN};
use crate::error::AuditError;
use crate::model::{get_token, RelevantCommit, RuleResult, RuleStatus};
use crate::rules::BUG_NUMBERS_TOKEN;

fn milestone(cfg: &RefConfig) -> Result<String, AuditError> {
    cfg.metadata_token(MILESTONE_NUMBER_TOKEN).ok_or_else(|| {
        AuditError::Config(format!(
            "ref {} has no {MILESTONE_NUMBER_TOKEN} in its metadata",
            cfg.name
        ))
    })
}

/// Bug ids recorded by the rules in `results`, in order, without duplicates.
fn bug_numbers(results: &[&RuleResult]) -> Vec<String> {
    let mut bugs: Vec<String> = Vec::new();
    for result in results {
        let Some(list) = get_token(BUG_NUMBERS_TOKEN, &result.meta_data) else {
            continue;
        };
        for bug in list.split(',').map(str::trim).filter(|b| !b.is_empty()) {
            if !bugs.iter().any(|b| b == bug) {
                bugs.push(bug.to_string());
            }
        }
    }
    bugs
}

/// Files an issue for a merge that landed without approval.
#[derive(Debug, Clone, Default)]
pub struct FileBugForMergeApprovalViolation {
    pub components: Vec<String>,
    pub labels: Vec<String>,
}

#[async_trait]
impl Notification for FileBugForMergeApprovalViolation {
    async fn notify(
        &self,
        cfg: &RefConfig,
        commit: &RelevantCommit,
        clients: &Clients,
        state: &str,
    ) -> Result<String, AuditError> {
        if !state.is_empty() {
            return Ok(state.to_string());
        }
        let violations = commit.get_violations();
        if violations.is_empty() {
            return Ok(state.to_string());
        }
        let milestone = milestone(cfg)?;

        let summary = format!(
            "Merge approval violation detected on {:?} in M{milestone}",
            commit.commit_hash
        );
        let mut description = format!(
            "{} was merged to {} without an approved merge request.\n",
            cfg.link_to_commit(&commit.commit_hash),
            cfg.branch_name
        );
        for violation in &violations {
            description.push_str(&format!("\n - {}", violation.message));
        }
        let bugs = bug_numbers(&violations);
        if !bugs.is_empty() {
            description.push_str(&format!("\n\nReferenced bugs: {}", bugs.join(", ")));
        }

        let mut labels = self.labels.clone();
        labels.push(format!("M-{milestone}"));
        let issue_id = post_issue(
            cfg,
            &summary,
            &description,
            clients,
            &self.components,
            &labels,
            Some(&commit.author_account),
        )
        .await?;
        Ok(format!("BUG={issue_id}"))
    }
}

/// Prefix of the state recorded while some acknowledgement comments are
/// still missing. The bugs after it already have their comment.
pub const PARTIAL_ACK_STATE: &str = "Commenting on BUG(S)=";
const ACK_STATE: &str = "Comment posted on BUG(S)=";

/// Comments on every bug a merge refers to, marking it merged into the
/// milestone.
///
/// Each bug is commented on at most once. When a comment fails the bugs
/// already acknowledged are returned in a [`PARTIAL_ACK_STATE`] state
/// through [`AuditError::PartiallyNotified`], and the next call only
/// comments on the rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommentOnBugToAcknowledgeMerge;

#[async_trait]
impl Notification for CommentOnBugToAcknowledgeMerge {
    async fn notify(
        &self,
        cfg: &RefConfig,
        commit: &RelevantCommit,
        clients: &Clients,
        state: &str,
    ) -> Result<String, AuditError> {
        let mut commented: Vec<String> = match state.strip_prefix(PARTIAL_ACK_STATE) {
            Some(done) => done
                .split(',')
                .filter(|b| !b.is_empty())
                .map(str::to_string)
                .collect(),
            None if !state.is_empty() => return Ok(state.to_string()),
            None => Vec::new(),
        };
        let requests = commit.results_with_status(RuleStatus::NotificationRequired);
        if requests.is_empty() {
            return Ok(state.to_string());
        }
        let milestone = milestone(cfg)?;
        let label = format!("Merge-Merged-{milestone}");
        let content = format!(
            "The following revision refers to this bug:\n  {}\n\nMerged to {} (M{milestone}) by {}.",
            cfg.link_to_commit(&commit.commit_hash),
            cfg.branch_name,
            commit.committer_account
        );

        for bug in bug_numbers(&requests) {
            if commented.contains(&bug) {
                continue;
            }
            let Ok(id) = bug.parse::<i64>() else {
                warn!(bug = %bug, "Ignoring malformed bug number");
                continue;
            };
            if let Err(e) = clients.monorail.get_issue(&cfg.monorail_project, id).await {
                warn!(bug = id, error = %e, "Not acknowledging merge on bug that could not be fetched");
                continue;
            }
            if let Err(e) = post_comment(cfg, id, &content, clients, &[label.clone()]).await {
                if commented.is_empty() {
                    return Err(e);
                }
                return Err(AuditError::PartiallyNotified {
                    state: format!("{PARTIAL_ACK_STATE}{}", commented.join(",")),
                    source: Box::new(e),
                });
            }
            commented.push(bug);
        }
        Ok(format!("{ACK_STATE}{}", commented.join(",")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::fake::FakeClients;
    use crate::clients::Issue;
    use crate::error::ClientError;
    use crate::rules::test_ref_config;
    use pretty_assertions::assert_eq;

    fn release_config() -> RefConfig {
        RefConfig {
            branch_name: "refs/branch-heads/3538".to_string(),
            metadata: "MilestoneNumber:70".to_string(),
            ..test_ref_config()
        }
    }

    fn ack_commit(bugs: &str) -> RelevantCommit {
        let mut required = RuleResult::new("AcknowledgeMerge", RuleStatus::NotificationRequired);
        required.meta_data = format!("BugNumbers:{bugs}");
        RelevantCommit {
            commit_hash: "badc0de".to_string(),
            author_account: "author@test.com".to_string(),
            committer_account: "committer@test.com".to_string(),
            result: vec![required],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_acknowledge_merge_comments_on_bug() {
        let fakes = FakeClients::new();
        fakes.monorail.add_issue(Issue {
            id: 8675389,
            ..Default::default()
        });

        let state = CommentOnBugToAcknowledgeMerge
            .notify(&release_config(), &ack_commit("8675389"), &fakes.clients(), "")
            .await
            .unwrap();

        assert_eq!(state, "Comment posted on BUG(S)=8675389");
        let comments = fakes.monorail.posted_comments();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].0, 8675389);
        assert_eq!(comments[0].1.labels, vec!["Merge-Merged-70".to_string()]);
        assert!(comments[0].1.content.contains("refs/branch-heads/3538"));
    }

    #[tokio::test]
    async fn test_acknowledge_merge_skips_unknown_bugs() {
        let fakes = FakeClients::new();
        fakes.monorail.add_issue(Issue {
            id: 2,
            ..Default::default()
        });
        let state = CommentOnBugToAcknowledgeMerge
            .notify(&release_config(), &ack_commit("1,2"), &fakes.clients(), "")
            .await
            .unwrap();
        assert_eq!(state, "Comment posted on BUG(S)=2");
    }

    #[tokio::test]
    async fn test_acknowledge_merge_resumes_after_failed_comment() {
        let fakes = FakeClients::new();
        for id in [1, 2, 3] {
            fakes.monorail.add_issue(Issue {
                id,
                ..Default::default()
            });
        }
        fakes
            .monorail
            .fail_next_comment(2, ClientError::Transport("timeout".to_string()));
        let commit = ack_commit("1,2,3");

        let err = CommentOnBugToAcknowledgeMerge
            .notify(&release_config(), &commit, &fakes.clients(), "")
            .await
            .unwrap_err();
        assert_eq!(err.partial_state(), Some("Commenting on BUG(S)=1"));

        let state = CommentOnBugToAcknowledgeMerge
            .notify(
                &release_config(),
                &commit,
                &fakes.clients(),
                "Commenting on BUG(S)=1",
            )
            .await
            .unwrap();
        assert_eq!(state, "Comment posted on BUG(S)=1,2,3");
        let bugs: Vec<i64> = fakes
            .monorail
            .posted_comments()
            .iter()
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(bugs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_acknowledge_merge_first_comment_failure_has_no_state() {
        let fakes = FakeClients::new();
        fakes.monorail.add_issue(Issue {
            id: 1,
            ..Default::default()
        });
        fakes
            .monorail
            .fail_next_comment(1, ClientError::Transport("timeout".to_string()));

        let err = CommentOnBugToAcknowledgeMerge
            .notify(&release_config(), &ack_commit("1"), &fakes.clients(), "")
            .await
            .unwrap_err();
        assert_eq!(err.partial_state(), None);
        assert_eq!(fakes.monorail.mutations(), 0);
    }

    #[tokio::test]
    async fn test_acknowledge_merge_requires_milestone() {
        let fakes = FakeClients::new();
        let err = CommentOnBugToAcknowledgeMerge
            .notify(&test_ref_config(), &ack_commit("1"), &fakes.clients(), "")
            .await
            .unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_acknowledge_merge_is_idempotent() {
        let fakes = FakeClients::new();
        let state = CommentOnBugToAcknowledgeMerge
            .notify(
                &release_config(),
                &ack_commit("1"),
                &fakes.clients(),
                "Comment posted on BUG(S)=1",
            )
            .await
            .unwrap();
        assert_eq!(state, "Comment posted on BUG(S)=1");
        assert_eq!(fakes.monorail.mutations(), 0);
    }

    #[tokio::test]
    async fn test_file_bug_for_merge_violation() {
        let fakes = FakeClients::new();
        let mut failed = RuleResult::failed("OnlyMergeApprovedChange", "merged without approval");
        failed.meta_data = "BugNumbers:123,456".to_string();
        let commit = RelevantCommit {
            commit_hash: "badc0de".to_string(),
            author_account: "author@test.com".to_string(),
            result: vec![failed],
            ..Default::default()
        };
        let notifier = FileBugForMergeApprovalViolation {
            components: vec!["Programs>PMO>Browser>Release".to_string()],
            labels: vec!["CommitLog-Audit-Violation".to_string()],
        };

        let state = notifier
            .notify(&release_config(), &commit, &fakes.clients(), "")
            .await
            .unwrap();

        assert_eq!(state, "BUG=12345");
        let filed = fakes.monorail.inserted();
        assert_eq!(
            filed[0].labels,
            vec!["CommitLog-Audit-Violation".to_string(), "M-70".to_string()]
        );
        assert!(filed[0].summary.contains("M70"));
        assert!(filed[0].description.contains("123, 456"));
    }

    #[tokio::test]
    async fn test_file_bug_without_violation_is_noop() {
        let fakes = FakeClients::new();
        let state = FileBugForMergeApprovalViolation::default()
            .notify(&test_ref_config(), &ack_commit("1"), &fakes.clients(), "")
            .await
            .unwrap();
        assert_eq!(state, "");
        assert_eq!(fakes.monorail.mutations(), 0);
    }
}
