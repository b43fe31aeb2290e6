use async_trait::async_trait;

use super::monorail::post_issue;
use super::Notification;
use crate::clients::Clients;
use crate::config::RefConfig;
use crate::error::AuditError;
use crate::model::RelevantCommit;

/// Metadata token key a rule uses to ask for an extra label on the issue.
pub const LABEL_TOKEN: &str = "label";

/// Files one issue per violating commit, or comments on the issue the
/// auditor already filed for it.
#[derive(Debug, Clone, Default)]
pub struct CommentOrFileMonorailIssue {
    pub components: Vec<String>,
    pub labels: Vec<String>,
}

pub fn violation_summary(commit: &RelevantCommit) -> String {
    format!("Audit violation detected on {:?}", commit.commit_hash)
}

#[async_trait]
impl Notification for CommentOrFileMonorailIssue {
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

        let mut labels = self.labels.clone();
        let mut description = format!(
            "Audit found the following violations in {}:\n",
            cfg.link_to_commit(&commit.commit_hash)
        );
        for violation in &violations {
            description.push_str(&format!("\n - {}", violation.message));
            for line in violation.meta_data.lines() {
                if let Some(label) = line.strip_prefix(LABEL_TOKEN).and_then(|l| l.strip_prefix(':')) {
                    if !labels.iter().any(|l| l == label) {
                        labels.push(label.to_string());
                    }
                }
            }
        }

        let issue_id = post_issue(
            cfg,
            &violation_summary(commit),
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
