use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clients::{Commit, ReleaseClient};
use crate::error::AuditError;
use crate::model::{get_token, set_token, RefState, RelevantCommit};
use crate::notify::{CommentOrFileMonorailIssue, Notification};
use crate::rules::{OnlyModifiesFilesAndDirsRule, Rule};

/// Account pattern matching every commit.
pub const ANY_ACCOUNT: &str = "*";

/// Metadata token holding a release milestone.
pub const MILESTONE_NUMBER_TOKEN: &str = "MilestoneNumber";

/// The rules and notifier applying to commits by one account pattern.
#[derive(Clone)]
pub struct AccountRules {
    /// Author or committer email, or `*`.
    pub account: String,
    pub rules: Vec<Arc<dyn Rule>>,
    pub notification: Arc<dyn Notification>,
}

impl AccountRules {
    pub fn new(
        account: impl Into<String>,
        rules: Vec<Arc<dyn Rule>>,
        notification: Arc<dyn Notification>,
    ) -> Self {
        Self {
            account: account.into(),
            rules,
            notification,
        }
    }

    /// Whether a scanned commit falls under this ruleset.
    pub fn matches_commit(&self, commit: &Commit) -> bool {
        self.account == ANY_ACCOUNT
            || commit.author_email() == self.account
            || commit.committer_email() == self.account
    }

    pub fn matches_relevant_commit(&self, commit: &RelevantCommit) -> bool {
        self.account == ANY_ACCOUNT
            || commit.author_account == self.account
            || commit.committer_account == self.account
    }

    /// Account handed to rules as the one that triggered the audit.
    pub fn triggering_account<'a>(&'a self, commit: &'a RelevantCommit) -> &'a str {
        if self.account == ANY_ACCOUNT {
            &commit.author_account
        } else {
            &self.account
        }
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }
}

impl fmt::Debug for AccountRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRules")
            .field("account", &self.account)
            .field("rules", &self.rule_names())
            .finish_non_exhaustive()
    }
}

/// Ruleset guarding commits that may only touch the given files and dirs,
/// as used for autoroller accounts.
pub fn auto_roll_rules(account: &str, files: Vec<String>, dirs: Vec<String>) -> AccountRules {
    AccountRules::new(
        account,
        vec![Arc::new(OnlyModifiesFilesAndDirsRule {
            name: "AutoRollRulesFilesAndDirs".to_string(),
            files,
            dirs,
        })],
        Arc::new(CommentOrFileMonorailIssue {
            components: vec!["Infra>Security>Audit".to_string()],
            labels: vec!["CommitLog-Audit-Violation".to_string()],
        }),
    )
}

/// How the concrete refs of a dynamic ref config are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicRef {
    /// One ref per active release branch, `refs/branch-heads/<branch>`.
    ReleaseBranches,
}

/// A concrete ref produced by a [`DynamicRef`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteRef {
    pub branch_name: String,
    pub metadata: String,
}

/// Static configuration of one monitored ref.
#[derive(Debug, Clone, Default)]
pub struct RefConfig {
    /// Config name, e.g. `chromium-src-main`.
    pub name: String,
    pub base_repo_url: String,
    pub gerrit_url: String,
    /// Empty for dynamic refs until made concrete.
    pub branch_name: String,
    pub starting_commit: String,
    pub monorail_api_url: String,
    pub monorail_project: String,
    pub notifier_email: String,
    /// Ruleset name to ruleset.
    pub rules: BTreeMap<String, AccountRules>,
    /// Packed `key:value` tokens, see [`get_token`].
    pub metadata: String,
    /// Commit to restart from when unpausing the ref.
    pub overwrite_last_known_commit: String,
    pub dynamic_ref: Option<DynamicRef>,
}

impl RefConfig {
    /// Key of the ref state, `<base repo url>/+/<branch>`.
    pub fn repo_url(&self) -> String {
        format!("{}/+/{}", self.base_repo_url, self.branch_name)
    }

    pub fn link_to_commit(&self, hash: &str) -> String {
        format!("{}/+/{}", self.base_repo_url, hash)
    }

    pub fn metadata_token(&self, key: &str) -> Option<String> {
        get_token(key, &self.metadata)
    }

    /// First ruleset whose account pattern matches the commit.
    pub fn matching_ruleset(&self, commit: &Commit) -> Option<(&str, &AccountRules)> {
        self.rules
            .iter()
            .find(|(_, rules)| rules.matches_commit(commit))
            .map(|(name, rules)| (name.as_str(), rules))
    }

    /// Copy of this config bound to the branch and metadata of a dynamically
    /// resolved ref state. Static configs are returned unchanged.
    pub fn set_concrete_ref(&self, state: &RefState) -> RefConfig {
        let mut concrete = self.clone();
        if let Some(branch) = &state.branch_name {
            concrete.branch_name = branch.clone();
        }
        if let Some(metadata) = &state.metadata {
            concrete.metadata = metadata.clone();
        }
        concrete
    }

    /// Resolve the concrete refs of a dynamic config.
    pub async fn concrete_refs(
        &self,
        releases: &dyn ReleaseClient,
    ) -> Result<Vec<ConcreteRef>, AuditError> {
        match self.dynamic_ref {
            None => Ok(Vec::new()),
            Some(DynamicRef::ReleaseBranches) => {
                let mut refs = Vec::new();
                for release in releases.active_releases().await? {
                    refs.push(ConcreteRef {
                        branch_name: format!("refs/branch-heads/{}", release.branch),
                        metadata: set_token(
                            MILESTONE_NUMBER_TOKEN,
                            &release.milestone.to_string(),
                            &self.metadata,
                        )?,
                    });
                }
                Ok(refs)
            }
        }
    }
}
