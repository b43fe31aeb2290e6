//! Filing and commenting on tracker issues on behalf of the auditor.

use tracing::{info, warn};

use crate::clients::{Clients, Comment, Issue, IssueStatus, IssuesListRequest};
use crate::config::RefConfig;
use crate::error::{AuditError, ClientError};

/// A previously filed issue may be reused only if it is still open, was filed
/// by the auditor itself and is about the same thing. Anyone else filing a
/// look-alike issue must not be able to swallow a notification.
fn is_valid_issue(issue: &Issue, summary: &str, service_account: &str) -> bool {
    !issue.status.is_closed() && issue.author == service_account && issue.summary.starts_with(summary)
}

/// Open issue the auditor already filed with this summary, if any.
pub async fn existing_issue(
    cfg: &RefConfig,
    summary: &str,
    clients: &Clients,
) -> Result<Option<i64>, AuditError> {
    let issues = clients
        .monorail
        .issues_list(&IssuesListRequest {
            project_id: cfg.monorail_project.clone(),
            query: format!("summary:{summary:?}"),
            include_closed: false,
        })
        .await?;
    Ok(issues
        .iter()
        .find(|issue| is_valid_issue(issue, summary, &clients.service_account))
        .map(|issue| issue.id))
}

/// File an issue, or comment on the matching issue the auditor filed
/// earlier. Returns the issue id.
///
/// When the tracker refuses `owner` as the issue owner, the issue is filed
/// unowned with `owner` in CC instead.
pub async fn post_issue(
    cfg: &RefConfig,
    summary: &str,
    description: &str,
    clients: &Clients,
    components: &[String],
    labels: &[String],
    owner: Option<&str>,
) -> Result<i64, AuditError> {
    if let Some(id) = existing_issue(cfg, summary, clients).await? {
        info!(issue = id, summary, "Commenting on existing issue");
        post_comment(cfg, id, description, clients, &[]).await?;
        return Ok(id);
    }

    let mut issue = Issue {
        project_id: cfg.monorail_project.clone(),
        summary: summary.to_string(),
        description: description.to_string(),
        status: IssueStatus::Untriaged,
        author: clients.service_account.clone(),
        owner: owner.filter(|o| !o.is_empty()).map(str::to_string),
        components: components.to_vec(),
        labels: labels.to_vec(),
        ..Default::default()
    };
    if issue.owner.is_some() {
        issue.status = IssueStatus::Assigned;
    }
    let filed = match clients.monorail.insert_issue(&issue).await {
        Ok(filed) => filed,
        Err(ClientError::Rejected(reason)) if issue.owner.is_some() => {
            warn!(owner = ?issue.owner, reason = %reason, "Owner rejected by tracker, filing with owner in CC");
            issue.cc.extend(issue.owner.take());
            issue.status = IssueStatus::Untriaged;
            clients.monorail.insert_issue(&issue).await?
        }
        Err(e) => return Err(e.into()),
    };
    info!(issue = filed.id, summary, "Filed issue");
    Ok(filed.id)
}

/// Add a comment to issue `issue_id`, optionally setting labels.
pub async fn post_comment(
    cfg: &RefConfig,
    issue_id: i64,
    content: &str,
    clients: &Clients,
    labels: &[String],
) -> Result<(), AuditError> {
    clients
        .monorail
        .insert_comment(
            &cfg.monorail_project,
            issue_id,
            &Comment {
                author: clients.service_account.clone(),
                content: content.to_string(),
                labels: labels.to_vec(),
            },
        )
        .await?;
    Ok(())
}
