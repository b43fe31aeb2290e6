use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::config::{RefConfig, DEFAULT_EXTERNAL_POLL_INTERVAL_SECS};
use crate::model::RefState;
use crate::store::CommitStore;

/// Context passed to rules for evaluation
#[derive(Clone)]
pub struct AuditParams {
    /// Account the matched ruleset is keyed on; the commit author for `*`.
    pub triggering_account: String,
    pub repo_config: Arc<RefConfig>,
    pub ref_state: RefState,
    /// Point lookups of older relevant commits.
    pub store: Arc<dyn CommitStore>,
    /// Time the audit pass started.
    pub now: DateTime<Utc>,
    pub external_poll_interval: Duration,
}

impl AuditParams {
    pub fn new(repo_config: Arc<RefConfig>, ref_state: RefState, store: Arc<dyn CommitStore>) -> Self {
        Self {
            triggering_account: String::new(),
            repo_config,
            ref_state,
            store,
            now: Utc::now(),
            external_poll_interval: Duration::seconds(DEFAULT_EXTERNAL_POLL_INTERVAL_SECS),
        }
    }

    pub fn with_triggering_account(mut self, account: impl Into<String>) -> Self {
        self.triggering_account = account.into();
        self
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_external_poll_interval(mut self, interval: Duration) -> Self {
        self.external_poll_interval = interval;
        self
    }
}
