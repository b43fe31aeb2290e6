use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{AuditStatus, RuleStatus};

/// Outcome of one rule applied to one commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleResult {
    pub rule_name: String,
    pub rule_result_status: RuleStatus,
    /// Human readable explanation, empty on success.
    #[serde(default)]
    pub message: String,
    /// Packed `key:value` tokens, see [`crate::model::get_token`].
    #[serde(default)]
    pub meta_data: String,
}

impl RuleResult {
    pub fn new(rule_name: &str, status: RuleStatus) -> Self {
        Self {
            rule_name: rule_name.to_string(),
            rule_result_status: status,
            message: String::new(),
            meta_data: String::new(),
        }
    }

    pub fn passed(rule_name: &str) -> Self {
        Self::new(rule_name, RuleStatus::RulePassed)
    }

    pub fn skipped(rule_name: &str) -> Self {
        Self::new(rule_name, RuleStatus::RuleSkipped)
    }

    pub fn failed(rule_name: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::new(rule_name, RuleStatus::RuleFailed)
        }
    }

    pub fn pending(rule_name: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::new(rule_name, RuleStatus::RulePending)
        }
    }
}

/// A commit observed on a monitored ref that is subject to audit.
///
/// Relevant commits of a ref form a singly linked list through
/// `previous_relevant_commit`, walked from newest to oldest. They are never
/// deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RelevantCommit {
    pub ref_state_key: String,
    pub commit_hash: String,
    /// Hash of the next older relevant commit, empty at the root.
    #[serde(default)]
    pub previous_relevant_commit: String,
    pub status: AuditStatus,
    /// One entry per rule name.
    #[serde(default)]
    pub result: Vec<RuleResult>,
    pub commit_time: DateTime<Utc>,
    pub committer_account: String,
    pub author_account: String,
    #[serde(default)]
    pub commit_message: String,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub notified_all: bool,
    /// `"<ruleset>:<opaque state>"` entries.
    #[serde(default)]
    pub notification_states: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_external_poll: Option<DateTime<Utc>>,
}

impl RelevantCommit {
    /// Merge a rule outcome into `result`.
    ///
    /// Returns false when an identical result is already stored. A changed
    /// result replaces the existing entry in place; a new one is appended.
    pub fn set_result(&mut self, new_result: RuleResult) -> bool {
        match self
            .result
            .iter_mut()
            .find(|r| r.rule_name == new_result.rule_name)
        {
            Some(existing) if *existing == new_result => false,
            Some(existing) => {
                *existing = new_result;
                true
            }
            None => {
                self.result.push(new_result);
                true
            }
        }
    }

    pub fn get_result(&self, rule_name: &str) -> Option<&RuleResult> {
        self.result.iter().find(|r| r.rule_name == rule_name)
    }

    /// Results of rules that failed on this commit.
    pub fn get_violations(&self) -> Vec<&RuleResult> {
        self.results_with_status(RuleStatus::RuleFailed)
    }

    pub fn results_with_status(&self, status: RuleStatus) -> Vec<&RuleResult> {
        self.result
            .iter()
            .filter(|r| r.rule_result_status == status)
            .collect()
    }

    /// Notification state stored for `rule_set`, empty if never notified.
    pub fn get_notification_state(&self, rule_set: &str) -> String {
        self.notification_states
            .iter()
            .find_map(|s| {
                let (name, state) = s.split_once(':')?;
                (name == rule_set).then(|| state.to_string())
            })
            .unwrap_or_default()
    }

    /// Store `state` for `rule_set`, replacing any previous entry.
    pub fn set_notification_state(&mut self, rule_set: &str, state: &str) {
        let entry = format!("{rule_set}:{state}");
        let prefix = format!("{rule_set}:");
        match self
            .notification_states
            .iter_mut()
            .find(|s| s.starts_with(&prefix))
        {
            Some(existing) => *existing = entry,
            None => self.notification_states.push(entry),
        }
    }
}

/// Scanning and audit progress of one concrete monitored ref.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RefState {
    /// `<base repo url>/+/<branch>`; also the key of the ref's commits.
    pub repo_url: String,
    pub config_name: String,
    /// Concrete branch of a dynamically resolved ref.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    /// Concrete metadata of a dynamically resolved ref.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default)]
    pub last_known_commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_commit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_relevant_commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_relevant_commit_time: Option<DateTime<Utc>>,
    pub last_updated_time: DateTime<Utc>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub accepted_overwrite_last_known_commit: String,
}
