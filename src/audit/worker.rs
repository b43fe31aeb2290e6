//! Running the rules over a ref's undecided commits.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::clients::Clients;
use crate::error::AuditError;
use crate::model::{AuditStatus, RelevantCommit, RuleStatus};
use crate::rules::AuditParams;

/// Run every rule of every ruleset matching `commit` and derive its status.
///
/// Rules with a terminal result from an earlier pass are not run again. If
/// any rule errors the status is left alone and `retries` grows; after
/// `max_retries` errored passes the commit is `AuditFailed`.
pub async fn audit_commit(
    params: &AuditParams,
    mut commit: RelevantCommit,
    clients: &Clients,
    max_retries: u32,
) -> RelevantCommit {
    let mut errored = false;
    for (ruleset_name, ruleset) in &params.repo_config.rules {
        if !ruleset.matches_relevant_commit(&commit) {
            continue;
        }
        let rule_params = params
            .clone()
            .with_triggering_account(ruleset.triggering_account(&commit).to_string());
        for rule in &ruleset.rules {
            let done = commit
                .get_result(rule.name())
                .is_some_and(|r| r.rule_result_status != RuleStatus::RulePending);
            if done {
                continue;
            }
            match rule.run(&rule_params, &mut commit, clients).await {
                Ok(result) => {
                    commit.set_result(result);
                }
                Err(e) => {
                    errored = true;
                    error!(
                        commit = %commit.commit_hash,
                        ruleset = %ruleset_name,
                        rule = rule.name(),
                        error = %e,
                        "Rule failed to run"
                    );
                }
            }
        }
    }

    if errored {
        commit.retries += 1;
        if commit.retries > max_retries {
            warn!(commit = %commit.commit_hash, retries = commit.retries, "Giving up auditing commit");
            commit.status = AuditStatus::AuditFailed;
        }
        return commit;
    }

    let has = |status: RuleStatus| !commit.results_with_status(status).is_empty();
    let pending = has(RuleStatus::RulePending);
    let action_required = has(RuleStatus::RuleFailed) || has(RuleStatus::NotificationRequired);
    commit.status = if pending {
        AuditStatus::AuditPending
    } else if action_required {
        AuditStatus::AuditCompletedWithActionRequired
    } else {
        AuditStatus::AuditCompleted
    };
    debug!(commit = %commit.commit_hash, status = commit.status.to_short_string(), "Audited commit");
    commit
}

/// Commits audited by one pass.
#[derive(Debug, Default)]
pub struct AuditBatch {
    pub commits: Vec<RelevantCommit>,
    /// The pass hit its deadline or was cancelled; commits still running were
    /// dropped and are picked up again next pass.
    pub interrupted: bool,
}

/// Audit the scheduled and pending commits of `params.ref_state` with at
/// most `workers` commits in flight.
pub async fn perform_scheduled_audits(
    params: &AuditParams,
    clients: &Clients,
    workers: usize,
    max_retries: u32,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<AuditBatch, AuditError> {
    let undecided = params
        .store
        .commits_with_status(
            &params.ref_state.repo_url,
            &[AuditStatus::AuditScheduled, AuditStatus::AuditPending],
        )
        .await?;
    if undecided.is_empty() {
        return Ok(AuditBatch::default());
    }

    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let audited: Arc<Mutex<BTreeMap<String, RelevantCommit>>> = Arc::default();
    let mut tasks = JoinSet::new();
    for commit in undecided {
        let semaphore = Arc::clone(&semaphore);
        let audited = Arc::clone(&audited);
        let params = params.clone();
        let clients = clients.clone();
        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            let commit = audit_commit(&params, commit, &clients, max_retries).await;
            audited
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(commit.commit_hash.clone(), commit);
        });
    }

    let interrupted = tokio::select! {
        () = drain(&mut tasks) => false,
        () = cancel.cancelled() => true,
        () = tokio::time::sleep_until(deadline) => true,
    };
    if interrupted {
        warn!(
            ref_url = %params.ref_state.repo_url,
            unfinished = tasks.len(),
            "Audit interrupted, keeping finished commits"
        );
        tasks.shutdown().await;
    }

    let commits = std::mem::take(&mut *audited.lock().unwrap_or_else(PoisonError::into_inner))
        .into_values()
        .collect();
    Ok(AuditBatch {
        commits,
        interrupted,
    })
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Audit task panicked");
        }
    }
}
