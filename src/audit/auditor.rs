//! The per-ref audit pass: scan, audit, save, notify.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::scan::{get_commit_log, scan_commits};
use super::worker::perform_scheduled_audits;
use crate::clients::{with_backoff, BackoffConfig, Clients};
use crate::config::{AuditSettings, Config, RefConfig};
use crate::error::{AuditError, StoreError};
use crate::model::{AuditStatus, RefState, RelevantCommit, RuleStatus};
use crate::notify::post_issue;
use crate::rules::AuditParams;
use crate::store::CommitStore;

const AUDIT_COMPONENTS: &[&str] = &["Infra>Security>Audit"];
/// Notification state key used for the audit failure issue.
pub const AUDIT_FAILURE_STATE: &str = "AuditFailure";

fn audit_components() -> Vec<String> {
    AUDIT_COMPONENTS.iter().map(|c| c.to_string()).collect()
}

/// Persist audited commits, overwriting only those still undecided in the
/// store. Returns how many were written.
pub async fn save_audited_commits(
    store: &dyn CommitStore,
    commits: &[RelevantCommit],
    backoff: &BackoffConfig,
) -> Result<usize, AuditError> {
    if commits.is_empty() {
        return Ok(0);
    }
    let saved = with_backoff(backoff, "put_audited_commits", move || {
        store.put_audited_commits(commits)
    })
    .await?;
    Ok(saved)
}

async fn save_commit(
    store: &dyn CommitStore,
    commit: &RelevantCommit,
    backoff: &BackoffConfig,
) -> Result<(), StoreError> {
    with_backoff(backoff, "put_commit", move || store.put_commit(commit)).await
}

/// Whether every ruleset that produced a failure or a notification request
/// on `commit` has recorded a notification state.
fn all_notified(cfg: &RefConfig, commit: &RelevantCommit) -> bool {
    cfg.rules
        .iter()
        .filter(|(_, ruleset)| ruleset.matches_relevant_commit(commit))
        .filter(|(_, ruleset)| {
            ruleset.rules.iter().any(|rule| {
                commit.get_result(rule.name()).is_some_and(|r| {
                    matches!(
                        r.rule_result_status,
                        RuleStatus::RuleFailed | RuleStatus::NotificationRequired
                    )
                })
            })
        })
        .all(|(name, _)| !commit.get_notification_state(name).is_empty())
}

/// Run the notifier of every matching ruleset on the ref's commits that
/// require action and have not been fully notified.
///
/// Each notifier gets the state it returned last time, so a notification
/// that already went out is never repeated. Returns how many commits got a
/// new notification state.
pub async fn notify_about_violations(
    cfg: &RefConfig,
    state: &RefState,
    clients: &Clients,
    store: &dyn CommitStore,
    backoff: &BackoffConfig,
) -> Result<usize, AuditError> {
    let commits = store
        .commits_with_status(
            &state.repo_url,
            &[AuditStatus::AuditCompletedWithActionRequired],
        )
        .await?;
    let mut notified = 0;
    for mut commit in commits.into_iter().filter(|c| !c.notified_all) {
        let before = commit.notification_states.clone();
        let mut errored = false;
        for (ruleset_name, ruleset) in &cfg.rules {
            if !ruleset.matches_relevant_commit(&commit) {
                continue;
            }
            let prior = commit.get_notification_state(ruleset_name);
            match ruleset
                .notification
                .notify(cfg, &commit, clients, &prior)
                .await
            {
                Ok(next) if next != prior => commit.set_notification_state(ruleset_name, &next),
                Ok(_) => {}
                Err(e) => {
                    errored = true;
                    if let Some(partial) = e.partial_state().filter(|p| *p != prior) {
                        commit.set_notification_state(ruleset_name, partial);
                    }
                    error!(
                        commit = %commit.commit_hash,
                        ruleset = %ruleset_name,
                        error = %e,
                        "Failed to notify about violation"
                    );
                }
            }
        }
        commit.notified_all = !errored && all_notified(cfg, &commit);
        if commit.notification_states != before {
            notified += 1;
        }
        save_commit(store, &commit, backoff).await?;
    }
    Ok(notified)
}

/// File an issue for every commit that exhausted its retries, once.
/// Returns how many issues were filed or commented on.
pub async fn report_audit_failure(
    cfg: &RefConfig,
    state: &RefState,
    clients: &Clients,
    store: &dyn CommitStore,
    backoff: &BackoffConfig,
) -> Result<usize, AuditError> {
    let commits = store
        .commits_with_status(&state.repo_url, &[AuditStatus::AuditFailed])
        .await?;
    let mut reported = 0;
    for mut commit in commits.into_iter().filter(|c| !c.notified_all) {
        let summary = format!(
            "Audit on {:?} failed over {} times",
            commit.commit_hash, commit.retries
        );
        let description = format!(
            "Commit {} has caused the audit process to fail repeatedly. \
             Please audit it manually.",
            cfg.link_to_commit(&commit.commit_hash)
        );
        let issue_id = match post_issue(
            cfg,
            &summary,
            &description,
            clients,
            &audit_components(),
            &["AuditFailure".to_string()],
            None,
        )
        .await
        {
            Ok(id) => id,
            Err(e) => {
                error!(commit = %commit.commit_hash, error = %e, "Failed to report audit failure");
                continue;
            }
        };
        commit.set_notification_state(AUDIT_FAILURE_STATE, &format!("BUG={issue_id}"));
        commit.notified_all = true;
        save_commit(store, &commit, backoff).await?;
        reported += 1;
    }
    Ok(reported)
}

/// File (or comment on) the issue telling that commits of a ref could not
/// be fetched.
pub async fn report_ref_failure(
    cfg: &RefConfig,
    state: &RefState,
    clients: &Clients,
) -> Result<i64, AuditError> {
    let summary = format!("Failed to get commits from {}", state.config_name);
    let description = format!(
        "Auditing of {} is paused.\n\nLastUpdatedTime: {}\nLastKnownCommit: {}\n\n\
         Set overwrite_last_known_commit in the ref configuration to resume auditing.",
        state.repo_url,
        state.last_updated_time.to_rfc3339(),
        state.last_known_commit
    );
    post_issue(
        cfg,
        &summary,
        &description,
        clients,
        &audit_components(),
        &["GetRefCommitFailure".to_string()],
        None,
    )
    .await
}

/// Report the ref and stop auditing it until an operator overwrites its last
/// known commit.
pub async fn pause_ref_auditing(
    cfg: &RefConfig,
    state: &mut RefState,
    clients: &Clients,
    store: &dyn CommitStore,
) -> Result<(), AuditError> {
    let issue_id = report_ref_failure(cfg, state, clients).await?;
    state.paused = true;
    store.put_ref_state(state).await?;
    warn!(ref_url = %state.repo_url, issue = issue_id, "Paused ref auditing");
    Ok(())
}

/// What one pass over a ref did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    pub pass_id: Uuid,
    pub ref_url: String,
    /// Relevant commits found by scanning.
    pub scanned: usize,
    /// Audited commits written back to the store.
    pub audited: usize,
    /// Commits that got a new notification state.
    pub notified: usize,
    pub audit_failures_reported: usize,
    pub paused: bool,
    /// Cancelled or out of time; notification was skipped.
    pub interrupted: bool,
}

impl PassOutcome {
    fn new(ref_url: &str) -> Self {
        Self {
            pass_id: Uuid::new_v4(),
            ref_url: ref_url.to_string(),
            scanned: 0,
            audited: 0,
            notified: 0,
            audit_failures_reported: 0,
            paused: false,
            interrupted: false,
        }
    }
}

/// Drives audit passes over the configured refs.
pub struct Auditor {
    settings: AuditSettings,
    clients: Clients,
    store: Arc<dyn CommitStore>,
    refs: BTreeMap<String, Arc<RefConfig>>,
    backoff: BackoffConfig,
}

impl Auditor {
    pub fn new(config: &Config, clients: Clients, store: Arc<dyn CommitStore>) -> Self {
        Self {
            settings: config.audit.clone(),
            clients,
            store,
            refs: config.refs.clone(),
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Create the missing ref states of every configured ref, resolving
    /// dynamic refs to their current concrete branches. Returns the keys of
    /// all concrete refs.
    pub async fn ensure_ref_states(&self, now: DateTime<Utc>) -> Result<Vec<String>, AuditError> {
        let mut keys = Vec::new();
        for (name, cfg) in &self.refs {
            let concrete: Vec<RefState> = if cfg.dynamic_ref.is_some() {
                let refs = match cfg.concrete_refs(self.clients.releases.as_ref()).await {
                    Ok(refs) => refs,
                    Err(e) => {
                        error!(config = %name, error = %e, "Failed to resolve dynamic refs");
                        continue;
                    }
                };
                refs.into_iter()
                    .map(|r| {
                        let state = RefState {
                            branch_name: Some(r.branch_name),
                            metadata: Some(r.metadata),
                            ..Default::default()
                        };
                        let repo_url = cfg.set_concrete_ref(&state).repo_url();
                        RefState { repo_url, ..state }
                    })
                    .collect()
            } else {
                vec![RefState {
                    repo_url: cfg.repo_url(),
                    ..Default::default()
                }]
            };

            for state in concrete {
                keys.push(state.repo_url.clone());
                if self.store.get_ref_state(&state.repo_url).await?.is_some() {
                    continue;
                }
                let state = RefState {
                    config_name: name.clone(),
                    last_known_commit: cfg.starting_commit.clone(),
                    last_updated_time: now,
                    ..state
                };
                self.store.put_ref_state(&state).await?;
                info!(ref_url = %state.repo_url, config = %name, "Created ref state");
            }
        }
        Ok(keys)
    }

    /// Run one pass over every configured ref, one ref at a time.
    pub async fn run_all(&self, cancel: &CancellationToken) -> Result<Vec<PassOutcome>, AuditError> {
        let now = Utc::now();
        let mut outcomes = Vec::new();
        for ref_url in self.ensure_ref_states(now).await? {
            if cancel.is_cancelled() {
                break;
            }
            match self.run_pass_at(&ref_url, now, cancel).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(ref_url = %ref_url, error = %e, "Audit pass failed"),
            }
        }
        Ok(outcomes)
    }

    pub async fn run_pass(
        &self,
        ref_url: &str,
        cancel: &CancellationToken,
    ) -> Result<PassOutcome, AuditError> {
        self.run_pass_at(ref_url, Utc::now(), cancel).await
    }

    /// Audit one concrete ref as of `now`.
    pub async fn run_pass_at(
        &self,
        ref_url: &str,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<PassOutcome, AuditError> {
        let outcome = PassOutcome::new(ref_url);
        let span = info_span!("audit_pass", pass_id = %outcome.pass_id, ref_url);
        self.pass(outcome, now, cancel).instrument(span).await
    }

    async fn pass(
        &self,
        mut outcome: PassOutcome,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<PassOutcome, AuditError> {
        let store = self.store.as_ref();
        let mut state = store
            .get_ref_state(&outcome.ref_url)
            .await?
            .ok_or_else(|| StoreError::RefStateNotFound(outcome.ref_url.clone()))?;
        let base = self.refs.get(&state.config_name).ok_or_else(|| {
            AuditError::Config(format!("no ref config named {}", state.config_name))
        })?;
        let cfg = Arc::new(base.set_concrete_ref(&state));

        if !state.paused && now - state.last_updated_time > self.settings.stuck_scanner_duration() {
            warn!(last_updated = %state.last_updated_time, "Ref has not been updated, pausing");
            pause_ref_auditing(&cfg, &mut state, &self.clients, store).await?;
            outcome.paused = true;
            return Ok(outcome);
        }

        if state.paused {
            let overwrite = &cfg.overwrite_last_known_commit;
            if overwrite.is_empty() || *overwrite == state.accepted_overwrite_last_known_commit {
                info!("Ref is paused");
                outcome.paused = true;
                return Ok(outcome);
            }
            info!(commit = %overwrite, "Resuming paused ref from overwritten last known commit");
            state.accepted_overwrite_last_known_commit = overwrite.clone();
            state.last_known_commit = overwrite.clone();
            state.paused = false;
            store.put_ref_state(&state).await?;
        }

        let log = match get_commit_log(
            &cfg,
            &state,
            &self.clients,
            self.settings.max_commits_per_ref_update,
        )
        .await
        {
            Ok(log) => log,
            Err(AuditError::PauseRef(reason)) => {
                warn!(reason = %reason, "Cannot follow ref, pausing");
                pause_ref_auditing(&cfg, &mut state, &self.clients, store).await?;
                outcome.paused = true;
                return Ok(outcome);
            }
            Err(e) => return Err(e),
        };
        outcome.scanned = scan_commits(&log, &cfg, &mut state, store, now).await?;

        if cancel.is_cancelled() {
            warn!("Pass cancelled before auditing");
            outcome.interrupted = true;
            return Ok(outcome);
        }

        let params = AuditParams::new(Arc::clone(&cfg), state.clone(), Arc::clone(&self.store))
            .with_now(now)
            .with_external_poll_interval(self.settings.external_poll_interval());
        let deadline = tokio::time::Instant::now() + self.settings.pass_timeout();
        let batch = perform_scheduled_audits(
            &params,
            &self.clients,
            self.settings.workers,
            self.settings.max_retries_per_commit,
            deadline,
            cancel,
        )
        .await?;
        outcome.audited = save_audited_commits(store, &batch.commits, &self.backoff).await?;
        if batch.interrupted {
            warn!(audited = outcome.audited, "Pass interrupted, skipping notification");
            outcome.interrupted = true;
            return Ok(outcome);
        }

        outcome.notified =
            notify_about_violations(&cfg, &state, &self.clients, store, &self.backoff).await?;
        outcome.audit_failures_reported =
            report_audit_failure(&cfg, &state, &self.clients, store, &self.backoff).await?;
        info!(
            scanned = outcome.scanned,
            audited = outcome.audited,
            notified = outcome.notified,
            "Audit pass finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::fake::FakeClients;
    use crate::clients::Issue;
    use crate::config::AccountRules;
    use crate::error::ClientError;
    use crate::model::RuleResult;
    use crate::notify::{CommentOnBugToAcknowledgeMerge, Notification};
    use crate::rules::{test_ref_config, DummyRule};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts real notifications and returns a fixed state.
    #[derive(Default)]
    struct CountingNotification {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Notification for CountingNotification {
        async fn notify(
            &self,
            _cfg: &RefConfig,
            _commit: &RelevantCommit,
            _clients: &Clients,
            state: &str,
        ) -> Result<String, AuditError> {
            if !state.is_empty() {
                return Ok(state.to_string());
            }
            if self.fail {
                return Err(AuditError::Config("tracker misconfigured".to_string()));
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("NOTIFIED={n}"))
        }
    }

    fn fast_backoff() -> BackoffConfig {
        BackoffConfig {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            multiplier: 2,
            max_delay: Duration::from_millis(2),
        }
    }

    fn config_with(notifier: Arc<dyn Notification>) -> RefConfig {
        let mut cfg = test_ref_config();
        cfg.rules.insert(
            "rules".to_string(),
            AccountRules::new(
                "*",
                vec![Arc::new(DummyRule::new(RuleResult::failed("DummyRule", "bad")))],
                notifier,
            ),
        );
        cfg
    }

    fn ref_state(cfg: &RefConfig) -> RefState {
        RefState {
            repo_url: cfg.repo_url(),
            config_name: cfg.name.clone(),
            last_updated_time: Utc::now(),
            ..Default::default()
        }
    }

    fn action_required(cfg: &RefConfig, hash: &str) -> RelevantCommit {
        RelevantCommit {
            ref_state_key: cfg.repo_url(),
            commit_hash: hash.to_string(),
            author_account: "author@test.com".to_string(),
            status: AuditStatus::AuditCompletedWithActionRequired,
            result: vec![RuleResult::failed("DummyRule", "bad")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_notifies_at_most_once() {
        let notifier = Arc::new(CountingNotification::default());
        let cfg = config_with(notifier.clone());
        let state = ref_state(&cfg);
        let store = MemoryStore::new();
        store.put_commit(&action_required(&cfg, "badc0de")).await.unwrap();
        let fakes = FakeClients::new();

        let notified = notify_about_violations(&cfg, &state, &fakes.clients(), &store, &fast_backoff())
            .await
            .unwrap();
        assert_eq!(notified, 1);
        let stored = store.get_commit(&cfg.repo_url(), "badc0de").await.unwrap().unwrap();
        assert!(stored.notified_all);
        assert_eq!(stored.notification_states, vec!["rules:NOTIFIED=1".to_string()]);

        // A re-run with the flag cleared still passes the stored state back.
        store
            .put_commit(&RelevantCommit {
                notified_all: false,
                ..stored
            })
            .await
            .unwrap();
        let notified = notify_about_violations(&cfg, &state, &fakes.clients(), &store, &fast_backoff())
            .await
            .unwrap();
        assert_eq!(notified, 0);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_notification_is_retried() {
        let cfg = config_with(Arc::new(CountingNotification {
            fail: true,
            ..Default::default()
        }));
        let state = ref_state(&cfg);
        let store = MemoryStore::new();
        store.put_commit(&action_required(&cfg, "badc0de")).await.unwrap();
        let fakes = FakeClients::new();

        let notified = notify_about_violations(&cfg, &state, &fakes.clients(), &store, &fast_backoff())
            .await
            .unwrap();
        assert_eq!(notified, 0);
        let stored = store.get_commit(&cfg.repo_url(), "badc0de").await.unwrap().unwrap();
        assert!(!stored.notified_all);
        assert!(stored.notification_states.is_empty());
    }

    #[tokio::test]
    async fn test_merge_acknowledged_once_across_failed_pass() {
        let mut required = RuleResult::new("AcknowledgeMerge", RuleStatus::NotificationRequired);
        required.meta_data = "BugNumbers:1,2".to_string();
        let mut cfg = test_ref_config();
        cfg.metadata = "MilestoneNumber:70".to_string();
        cfg.rules.insert(
            "ack".to_string(),
            AccountRules::new(
                "*",
                vec![Arc::new(DummyRule::new(required.clone()))],
                Arc::new(CommentOnBugToAcknowledgeMerge),
            ),
        );
        let state = ref_state(&cfg);
        let store = MemoryStore::new();
        store
            .put_commit(&RelevantCommit {
                result: vec![required],
                ..action_required(&cfg, "badc0de")
            })
            .await
            .unwrap();
        let fakes = FakeClients::new();
        for id in [1, 2] {
            fakes.monorail.add_issue(Issue {
                id,
                ..Default::default()
            });
        }
        fakes
            .monorail
            .fail_next_comment(2, ClientError::Transport("timeout".to_string()));

        notify_about_violations(&cfg, &state, &fakes.clients(), &store, &fast_backoff())
            .await
            .unwrap();
        let stored = store.get_commit(&cfg.repo_url(), "badc0de").await.unwrap().unwrap();
        assert!(!stored.notified_all);
        assert_eq!(
            stored.notification_states,
            vec!["ack:Commenting on BUG(S)=1".to_string()]
        );

        notify_about_violations(&cfg, &state, &fakes.clients(), &store, &fast_backoff())
            .await
            .unwrap();
        let stored = store.get_commit(&cfg.repo_url(), "badc0de").await.unwrap().unwrap();
        assert!(stored.notified_all);
        assert_eq!(
            stored.notification_states,
            vec!["ack:Comment posted on BUG(S)=1,2".to_string()]
        );
        let bugs: Vec<i64> = fakes
            .monorail
            .posted_comments()
            .iter()
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(bugs, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_report_audit_failure_once() {
        let cfg = config_with(Arc::new(CountingNotification::default()));
        let state = ref_state(&cfg);
        let store = MemoryStore::new();
        store
            .put_commit(&RelevantCommit {
                status: AuditStatus::AuditFailed,
                retries: 7,
                result: Vec::new(),
                ..action_required(&cfg, "f00d")
            })
            .await
            .unwrap();
        let fakes = FakeClients::new();

        let reported = report_audit_failure(&cfg, &state, &fakes.clients(), &store, &fast_backoff())
            .await
            .unwrap();
        assert_eq!(reported, 1);
        let filed = fakes.monorail.inserted();
        assert_eq!(filed[0].summary, "Audit on \"f00d\" failed over 7 times");
        assert_eq!(filed[0].labels, vec!["AuditFailure".to_string()]);
        assert_eq!(filed[0].components, audit_components());

        let stored = store.get_commit(&cfg.repo_url(), "f00d").await.unwrap().unwrap();
        assert!(stored.notified_all);
        assert_eq!(stored.get_notification_state(AUDIT_FAILURE_STATE), "BUG=12345");

        let reported = report_audit_failure(&cfg, &state, &fakes.clients(), &store, &fast_backoff())
            .await
            .unwrap();
        assert_eq!(reported, 0);
        assert_eq!(fakes.monorail.inserted().len(), 1);
    }

    #[tokio::test]
    async fn test_pause_ref_auditing() {
        let cfg = test_ref_config();
        let mut state = RefState {
            last_known_commit: "c0ffee".to_string(),
            ..ref_state(&cfg)
        };
        let store = MemoryStore::new();
        let fakes = FakeClients::new();

        pause_ref_auditing(&cfg, &mut state, &fakes.clients(), &store)
            .await
            .unwrap();

        assert!(state.paused);
        assert_eq!(store.get_ref_state(&state.repo_url).await.unwrap(), Some(state));
        let filed = fakes.monorail.inserted();
        assert_eq!(filed[0].summary, "Failed to get commits from a-main");
        assert_eq!(filed[0].labels, vec!["GetRefCommitFailure".to_string()]);
        assert!(filed[0].description.contains("LastKnownCommit: c0ffee"));
    }

    #[tokio::test]
    async fn test_save_only_overwrites_undecided() {
        let cfg = test_ref_config();
        let store = MemoryStore::new();
        let decided = RelevantCommit {
            status: AuditStatus::AuditCompleted,
            ..action_required(&cfg, "d0ne")
        };
        let undecided = RelevantCommit {
            status: AuditStatus::AuditScheduled,
            ..action_required(&cfg, "n0tyet")
        };
        store.insert_new_commits(&[decided, undecided]).await.unwrap();

        let audited = vec![
            RelevantCommit {
                status: AuditStatus::AuditFailed,
                ..action_required(&cfg, "d0ne")
            },
            RelevantCommit {
                status: AuditStatus::AuditCompleted,
                ..action_required(&cfg, "n0tyet")
            },
        ];
        let saved = save_audited_commits(&store, &audited, &fast_backoff())
            .await
            .unwrap();

        assert_eq!(saved, 1);
        let d0ne = store.get_commit(&cfg.repo_url(), "d0ne").await.unwrap().unwrap();
        assert_eq!(d0ne.status, AuditStatus::AuditCompleted);
    }

    #[tokio::test]
    async fn test_ensure_ref_states() {
        use crate::clients::Release;
        use crate::config::DynamicRef;

        let fakes = FakeClients::new();
        fakes.releases.set_releases(vec![Release {
            milestone: 70,
            branch: "3538".to_string(),
        }]);
        let main = RefConfig {
            starting_commit: "5747".to_string(),
            ..test_ref_config()
        };
        let release = RefConfig {
            name: "a-release".to_string(),
            branch_name: String::new(),
            dynamic_ref: Some(DynamicRef::ReleaseBranches),
            ..test_ref_config()
        };
        let config = Config::default().with_ref(main).with_ref(release);
        let store = Arc::new(MemoryStore::new());
        let auditor = Auditor::new(&config, fakes.clients(), store.clone());
        let now = Utc::now();

        let keys = auditor.ensure_ref_states(now).await.unwrap();

        assert_eq!(
            keys,
            vec![
                "https://a.googlesource.com/a.git/+/master".to_string(),
                "https://a.googlesource.com/a.git/+/refs/branch-heads/3538".to_string(),
            ]
        );
        let main = store.get_ref_state(&keys[0]).await.unwrap().unwrap();
        assert_eq!(main.last_known_commit, "5747");
        assert_eq!(main.last_updated_time, now);
        let release = store.get_ref_state(&keys[1]).await.unwrap().unwrap();
        assert_eq!(release.config_name, "a-release");
        assert_eq!(release.metadata.as_deref(), Some("MilestoneNumber:70"));

        // Existing states are left alone.
        let later = now + chrono::Duration::hours(1);
        auditor.ensure_ref_states(later).await.unwrap();
        let main = store.get_ref_state(&keys[0]).await.unwrap().unwrap();
        assert_eq!(main.last_updated_time, now);
    }
}
