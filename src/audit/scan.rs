//! Fetching a ref's new commits and recording the relevant ones.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::clients::{parse_repo_url, Clients, Commit, LogRequest};
use crate::config::RefConfig;
use crate::error::{AuditError, ClientError};
use crate::model::{AuditStatus, RefState, RelevantCommit};
use crate::store::CommitStore;

/// Relevant commits written per store call.
pub const SCAN_BATCH_SIZE: usize = 100;

fn full_ref_name(branch: &str) -> String {
    if branch.starts_with("refs/") {
        branch.to_string()
    } else {
        format!("refs/heads/{branch}")
    }
}

/// Commits from the tip of the ref back to, excluding, the last known commit,
/// newest first.
///
/// Returns [`AuditError::PauseRef`] when the ref cannot be followed any more:
/// the update is too large, or the last known commit no longer exists (a
/// force push).
pub async fn get_commit_log(
    cfg: &RefConfig,
    state: &RefState,
    clients: &Clients,
    max_commits: usize,
) -> Result<Vec<Commit>, AuditError> {
    let (host, project) = parse_repo_url(&cfg.base_repo_url)?;
    let branch = full_ref_name(&cfg.branch_name);
    debug!(branch = %branch, "Resolving ref tip");
    let refs = clients.gitiles.refs(&host, &project, &branch).await?;
    let new_head = refs.get(&branch).cloned().ok_or_else(|| {
        ClientError::NotFound(format!("branch {branch} in project {project}"))
    })?;
    let old_head = state.last_known_commit.clone();

    let request = LogRequest {
        project: project.clone(),
        committish: new_head.clone(),
        exclude_ancestors_of: (!old_head.is_empty()).then(|| old_head.clone()),
        page_size: max_commits,
        ..Default::default()
    };
    match clients.gitiles.log(&host, &request).await {
        Ok(log) if log.len() >= max_commits => {
            return Err(AuditError::PauseRef(format!(
                "{} new commits on {branch}, at most {max_commits} are audited per update",
                log.len()
            )));
        }
        Ok(log) => return Ok(log),
        Err(e) if e.is_not_found() => {}
        Err(e) => {
            error!(error = %e, old_head = %old_head, "Could not get children of last known commit");
            return Err(e.into());
        }
    }

    // Either the old head vanished (force push), the new head is not visible
    // yet, or gitiles returned a spurious 404. Only the first one pauses.
    let probe = |committish: &str| LogRequest {
        project: project.clone(),
        committish: committish.to_string(),
        page_size: 1,
        ..Default::default()
    };
    if let Err(e) = clients.gitiles.log(&host, &probe(&new_head)).await {
        error!(error = %e, new_head = %new_head, "Could not get log of ref tip");
        return Err(e.into());
    }
    match clients.gitiles.log(&host, &probe(&old_head)).await {
        Err(e) if e.is_not_found() => Err(AuditError::PauseRef(format!(
            "last known commit {old_head} is no longer reachable in {project}"
        ))),
        Ok(_) => Err(ClientError::InvalidResponse(format!(
            "Weirdly, log({old_head}) and log({new_head}) work, but not log({old_head}..{new_head})"
        ))
        .into()),
        Err(e) => {
            error!(error = %e, old_head = %old_head, "Could not get log of last known commit");
            Err(e.into())
        }
    }
}

fn commit_time(commit: &Commit) -> Result<DateTime<Utc>, AuditError> {
    commit
        .committer
        .as_ref()
        .or(commit.author.as_ref())
        .map(|u| u.time)
        .ok_or_else(|| {
            ClientError::InvalidResponse(format!("commit {} has no commit time", commit.id)).into()
        })
}

/// Record the commits of `log` that any ruleset of `cfg` applies to and
/// advance `state` past the whole log.
///
/// New relevant commits are linked newest to oldest, the oldest pointing at
/// the previous `last_relevant_commit`. Commits already stored are left
/// alone. Returns the number of relevant commits found.
pub async fn scan_commits(
    log: &[Commit],
    cfg: &RefConfig,
    state: &mut RefState,
    store: &dyn CommitStore,
    now: DateTime<Utc>,
) -> Result<usize, AuditError> {
    let relevant: Vec<&Commit> = log
        .iter()
        .filter(|commit| cfg.matching_ruleset(commit).is_some())
        .collect();

    // Oldest batch first, so a failure part way leaves a linked prefix.
    let mut end = relevant.len();
    while end > 0 {
        let begin = end.saturating_sub(SCAN_BATCH_SIZE);
        let mut previous = match relevant.get(end) {
            Some(older) => older.id.clone(),
            None => state.last_relevant_commit.clone(),
        };
        let mut batch = Vec::with_capacity(end - begin);
        for commit in relevant[begin..end].iter().rev() {
            batch.push(RelevantCommit {
                ref_state_key: state.repo_url.clone(),
                commit_hash: commit.id.clone(),
                previous_relevant_commit: previous,
                status: AuditStatus::AuditScheduled,
                commit_time: commit_time(commit)?,
                committer_account: commit.committer_email().to_string(),
                author_account: commit.author_email().to_string(),
                commit_message: commit.message.clone(),
                ..Default::default()
            });
            previous = commit.id.clone();
        }
        let written = store.insert_new_commits(&batch).await?;
        if written > 0 {
            info!(
                ref_url = %state.repo_url,
                from = %batch[0].commit_hash,
                to = %batch[batch.len() - 1].commit_hash,
                written,
                "Saved relevant commits"
            );
        }
        end = begin;
    }

    if let Some(tip) = log.first() {
        state.last_known_commit = tip.id.clone();
        state.last_known_commit_time = tip.committer.as_ref().map(|u| u.time);
    }
    if let Some(newest) = relevant.first() {
        state.last_relevant_commit = newest.id.clone();
        state.last_relevant_commit_time = newest.committer.as_ref().map(|u| u.time);
    }
    state.last_updated_time = now;
    store.put_ref_state(state).await?;
    Ok(relevant.len())
}
