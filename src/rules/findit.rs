//! Rules for commits landed by automated culprit-finding services.

use std::borrow::Cow;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::context::AuditParams;
use super::engine::Rule;
use crate::clients::{parse_build_url, parse_repo_url, BuildStatus, Change, Clients, LogRequest};
use crate::error::{AuditError, StoreError};
use crate::messages::{
    failed_build_from_commit_message, failed_step_from_commit_message, is_flake_revert,
    FAILED_BUILD_PREFIX,
};
use crate::model::{RelevantCommit, RuleResult};
use crate::store::CommitStore;

/// Commits the triggering account may land in any 24 hours.
pub const MAX_AUTO_COMMITS_PER_DAY: usize = 8;
/// Commits the triggering account may author in any 24 hours.
pub const MAX_AUTO_REVERTS_PER_DAY: usize = 20;
/// Longest allowed delay between a culprit landing and its revert.
pub const MAX_CULPRIT_AGE_HOURS: i64 = 24;

const DEFAULT_FAILED_STEP: &str = "compile";

/// Relationship between an account and a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Committer,
    Author,
}

impl Role {
    fn account_of(self, commit: &RelevantCommit) -> &str {
        match self {
            Role::Committer => &commit.committer_account,
            Role::Author => &commit.author_account,
        }
    }
}

/// Count commits where `account` has `role`, walking back from `commit`
/// through `previous_relevant_commit` until a commit older than `cutoff` or
/// the root of the chain. `commit` itself is included.
pub async fn count_relevant_commits(
    store: &dyn CommitStore,
    commit: &RelevantCommit,
    cutoff: DateTime<Utc>,
    account: &str,
    role: Role,
) -> Result<usize, AuditError> {
    let mut counter = 0;
    let mut current = Cow::Borrowed(commit);
    loop {
        if current.commit_time < cutoff {
            return Ok(counter);
        }
        if role.account_of(&current) == account {
            counter += 1;
        }
        if current.previous_relevant_commit.is_empty() {
            return Ok(counter);
        }
        let previous = store
            .get_commit(&commit.ref_state_key, &current.previous_relevant_commit)
            .await?
            .ok_or_else(|| StoreError::CommitNotFound {
                ref_key: commit.ref_state_key.clone(),
                hash: current.previous_relevant_commit.clone(),
            })?;
        current = Cow::Owned(previous);
    }
}

/// At most [`MAX_AUTO_COMMITS_PER_DAY`] commits committed by the triggering
/// account in the 24 hours up to this one.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoCommitsPerDay;

#[async_trait]
impl Rule for AutoCommitsPerDay {
    fn name(&self) -> &str {
        "AutoCommitsPerDay"
    }

    async fn run(
        &self,
        params: &AuditParams,
        commit: &mut RelevantCommit,
        _clients: &Clients,
    ) -> Result<RuleResult, AuditError> {
        let cutoff = commit.commit_time - Duration::hours(24);
        let count = count_relevant_commits(
            params.store.as_ref(),
            commit,
            cutoff,
            &params.triggering_account,
            Role::Committer,
        )
        .await?;
        if count > MAX_AUTO_COMMITS_PER_DAY {
            return Ok(RuleResult::failed(
                self.name(),
                format!(
                    "{count} commits were committed by account {} in 24 hours, and the maximum allowed is {MAX_AUTO_COMMITS_PER_DAY}",
                    params.triggering_account
                ),
            ));
        }
        Ok(RuleResult::passed(self.name()))
    }
}

/// At most [`MAX_AUTO_REVERTS_PER_DAY`] commits authored by the triggering
/// account in the 24 hours up to this one.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoRevertsPerDay;

#[async_trait]
impl Rule for AutoRevertsPerDay {
    fn name(&self) -> &str {
        "AutoRevertsPerDay"
    }

    async fn run(
        &self,
        params: &AuditParams,
        commit: &mut RelevantCommit,
        _clients: &Clients,
    ) -> Result<RuleResult, AuditError> {
        let cutoff = commit.commit_time - Duration::hours(24);
        let count = count_relevant_commits(
            params.store.as_ref(),
            commit,
            cutoff,
            &params.triggering_account,
            Role::Author,
        )
        .await?;
        if count > MAX_AUTO_REVERTS_PER_DAY {
            return Ok(RuleResult::failed(
                self.name(),
                format!(
                    "{count} commits were created by {} account in 24 hours, and the maximum allowed is {MAX_AUTO_REVERTS_PER_DAY}",
                    params.triggering_account
                ),
            ));
        }
        Ok(RuleResult::passed(self.name()))
    }
}

/// Look up the revert CL for `commit` and, if it reverts something, the
/// culprit CL with its current revision.
///
/// Gerrit's `revert_of` does not mean the change is a pure revert; see
/// [`RevertOfCulprit`].
async fn revert_and_culprit(
    rule: &str,
    commit: &RelevantCommit,
    clients: &Clients,
) -> Result<(Change, Option<Change>), AuditError> {
    let changes = clients
        .gerrit
        .change_query(&format!("commit:{}", commit.commit_hash))
        .await?;
    let Some(found) = changes.first() else {
        return Err(AuditError::indeterminate(
            rule,
            format!("no CL found for commit {:?}", commit.commit_hash),
        ));
    };
    let revert = clients.gerrit.change_details(&found.change_id, &[]).await?;
    if revert.revert_of == 0 {
        return Ok((revert, None));
    }
    let culprit = clients
        .gerrit
        .change_details(&revert.revert_of.to_string(), &["CURRENT_REVISION"])
        .await?;
    if culprit.current_revision.is_empty() {
        return Err(AuditError::indeterminate(
            rule,
            format!(
                "could not get current_revision for CL {}",
                culprit.change_number
            ),
        ));
    }
    Ok((revert, Some(culprit)))
}

async fn require_culprit(
    rule: &str,
    commit: &RelevantCommit,
    clients: &Clients,
) -> Result<Change, AuditError> {
    match revert_and_culprit(rule, commit, clients).await? {
        (_, Some(culprit)) => Ok(culprit),
        (_, None) => Err(AuditError::indeterminate(
            rule,
            format!(
                "commit {:?} does not appear to be a revert according to gerrit",
                commit.commit_hash
            ),
        )),
    }
}

/// The culprit must have landed less than [`MAX_CULPRIT_AGE_HOURS`] before
/// its revert.
#[derive(Debug, Clone, Copy, Default)]
pub struct CulpritAge;

#[async_trait]
impl Rule for CulpritAge {
    fn name(&self) -> &str {
        "CulpritAge"
    }

    async fn run(
        &self,
        params: &AuditParams,
        commit: &mut RelevantCommit,
        clients: &Clients,
    ) -> Result<RuleResult, AuditError> {
        let culprit = require_culprit(self.name(), commit, clients).await?;
        let (host, project) = parse_repo_url(&params.repo_config.base_repo_url)?;
        let log = clients
            .gitiles
            .log(
                &host,
                &LogRequest {
                    project,
                    committish: culprit.current_revision.clone(),
                    page_size: 1,
                    ..Default::default()
                },
            )
            .await?;
        let Some(culprit_time) = log.first().and_then(|c| c.committer.as_ref()).map(|u| u.time)
        else {
            return Err(AuditError::indeterminate(
                self.name(),
                format!("commit {} not found in repo", culprit.current_revision),
            ));
        };

        if commit.commit_time - culprit_time > Duration::hours(MAX_CULPRIT_AGE_HOURS) {
            return Ok(RuleResult::failed(
                self.name(),
                format!(
                    "The revert {} landed more than {MAX_CULPRIT_AGE_HOURS}h after the culprit {} landed",
                    commit.commit_hash, culprit.current_revision
                ),
            ));
        }
        Ok(RuleResult::passed(self.name()))
    }
}

/// The culprit must be in the blamelist of the failed build the revert
/// points at. Reverts of flaky-test culprits are exempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct CulpritInBuild;

#[async_trait]
impl Rule for CulpritInBuild {
    fn name(&self) -> &str {
        "CulpritInBuild"
    }

    async fn run(
        &self,
        _params: &AuditParams,
        commit: &mut RelevantCommit,
        clients: &Clients,
    ) -> Result<RuleResult, AuditError> {
        if is_flake_revert(&commit.commit_message) {
            return Ok(RuleResult::skipped(self.name()));
        }
        let culprit = require_culprit(self.name(), commit, clients).await?;

        let Ok(build_url) = failed_build_from_commit_message(&commit.commit_message) else {
            return Ok(RuleResult::failed(
                self.name(),
                format!(
                    "The revert does not point to a failed build, expected link prefixed with {FAILED_BUILD_PREFIX:?}"
                ),
            ));
        };
        let build = clients
            .buildbucket
            .get_build(&parse_build_url(&build_url)?)
            .await?;

        if build.blamelist.contains(&culprit.current_revision) {
            return Ok(RuleResult::passed(self.name()));
        }
        Ok(RuleResult::failed(
            self.name(),
            format!(
                "Hash {} not found in changes for build {build_url:?}",
                culprit.current_revision
            ),
        ))
    }
}

/// The build the revert points at must have failed in the step the revert
/// names (`compile` when none is named).
#[derive(Debug, Clone, Copy, Default)]
pub struct FailedBuildIsAppropriateFailure;

#[async_trait]
impl Rule for FailedBuildIsAppropriateFailure {
    fn name(&self) -> &str {
        "FailedBuildIsAppropriateFailure"
    }

    async fn run(
        &self,
        _params: &AuditParams,
        commit: &mut RelevantCommit,
        clients: &Clients,
    ) -> Result<RuleResult, AuditError> {
        let step_name = failed_step_from_commit_message(&commit.commit_message)
            .unwrap_or_else(|_| DEFAULT_FAILED_STEP.to_string());
        let Ok(build_url) = failed_build_from_commit_message(&commit.commit_message) else {
            return Ok(RuleResult::failed(
                self.name(),
                format!(
                    "The revert does not point to a failed build, expected link prefixed with {FAILED_BUILD_PREFIX:?}"
                ),
            ));
        };
        let build = clients
            .buildbucket
            .get_build(&parse_build_url(&build_url)?)
            .await?;

        let failed_as_expected = build.steps.iter().any(|step| {
            (step.leaf_name() == step_name || step.name == step_name)
                && step.status == BuildStatus::Failure
        });
        if failed_as_expected {
            return Ok(RuleResult::passed(self.name()));
        }
        Ok(RuleResult::failed(
            self.name(),
            format!(
                "Referred build {build_url:?} does not have an expected failure in the following step: {step_name}"
            ),
        ))
    }
}

/// The commit must be a pure revert of the culprit and name the culprit's
/// revision in its message.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevertOfCulprit;

#[async_trait]
impl Rule for RevertOfCulprit {
    fn name(&self) -> &str {
        "RevertOfCulprit"
    }

    async fn run(
        &self,
        _params: &AuditParams,
        commit: &mut RelevantCommit,
        clients: &Clients,
    ) -> Result<RuleResult, AuditError> {
        let (revert, culprit) = revert_and_culprit(self.name(), commit, clients).await?;
        let Some(culprit) = culprit else {
            return Ok(RuleResult::failed(
                self.name(),
                format!(
                    "Commit {:?} does not appear to be a revert, according to gerrit",
                    commit.commit_hash
                ),
            ));
        };
        if !clients.gerrit.is_change_pure_revert(&revert.change_id).await? {
            return Ok(RuleResult::failed(
                self.name(),
                format!(
                    "Commit {:?} is a revert but not a *pure* revert, according to gerrit",
                    commit.commit_hash
                ),
            ));
        }
        if !commit.commit_message.contains(&culprit.current_revision) {
            return Ok(RuleResult::failed(
                self.name(),
                format!(
                    "Commit {:?} does not include the revision it reverts in its commit message",
                    commit.commit_hash
                ),
            ));
        }
        Ok(RuleResult::passed(self.name()))
    }
}

/// A commit landed by the triggering account must also be authored by it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnlyCommitsOwnChange;

#[async_trait]
impl Rule for OnlyCommitsOwnChange {
    fn name(&self) -> &str {
        "OnlyCommitsOwnChange"
    }

    async fn run(
        &self,
        params: &AuditParams,
        commit: &mut RelevantCommit,
        _clients: &Clients,
    ) -> Result<RuleResult, AuditError> {
        if commit.committer_account == params.triggering_account
            && commit.committer_account != commit.author_account
        {
            return Ok(RuleResult::failed(
                self.name(),
                format!(
                    "Service account {} committed a commit by someone else: {}",
                    commit.committer_account, commit.author_account
                ),
            ));
        }
        Ok(RuleResult::passed(self.name()))
    }
}
