//! File representation of ref configs and the rules and notifiers they name.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ref_config::{auto_roll_rules, AccountRules, DynamicRef, RefConfig, MILESTONE_NUMBER_TOKEN};
use crate::clients::parse_repo_url;
use crate::model::get_token;
use crate::notify::{
    CommentOnBugToAcknowledgeMerge, CommentOrFileMonorailIssue, FileBugForMergeApprovalViolation,
    Notification,
};
use crate::rules::{
    AcknowledgeMerge, AutoCommitsPerDay, AutoRevertsPerDay, ChangeReviewed, CulpritAge,
    CulpritInBuild, FailedBuildIsAppropriateFailure, OnlyCommitsOwnChange,
    OnlyMergeApprovedChange, OnlyModifiesFilesAndDirsRule, RevertOfCulprit, Rule,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleSpec {
    OnlyModifiesFilesAndDirs {
        name: String,
        #[serde(default)]
        files: Vec<String>,
        #[serde(default)]
        dirs: Vec<String>,
    },
    ChangeReviewed {
        #[serde(default)]
        robots: Vec<String>,
    },
    AutoCommitsPerDay,
    AutoRevertsPerDay,
    CulpritAge,
    CulpritInBuild,
    FailedBuildIsAppropriateFailure,
    RevertOfCulprit,
    OnlyCommitsOwnChange,
    OnlyMergeApprovedChange {
        #[serde(default)]
        allowed_users: Vec<String>,
        #[serde(default)]
        allowed_robots: Vec<String>,
    },
    AcknowledgeMerge,
}

impl RuleSpec {
    pub fn build(&self) -> Arc<dyn Rule> {
        match self {
            RuleSpec::OnlyModifiesFilesAndDirs { name, files, dirs } => {
                Arc::new(OnlyModifiesFilesAndDirsRule {
                    name: name.clone(),
                    files: files.clone(),
                    dirs: dirs.clone(),
                })
            }
            RuleSpec::ChangeReviewed { robots } => Arc::new(ChangeReviewed {
                robots: robots.clone(),
            }),
            RuleSpec::AutoCommitsPerDay => Arc::new(AutoCommitsPerDay),
            RuleSpec::AutoRevertsPerDay => Arc::new(AutoRevertsPerDay),
            RuleSpec::CulpritAge => Arc::new(CulpritAge),
            RuleSpec::CulpritInBuild => Arc::new(CulpritInBuild),
            RuleSpec::FailedBuildIsAppropriateFailure => Arc::new(FailedBuildIsAppropriateFailure),
            RuleSpec::RevertOfCulprit => Arc::new(RevertOfCulprit),
            RuleSpec::OnlyCommitsOwnChange => Arc::new(OnlyCommitsOwnChange),
            RuleSpec::OnlyMergeApprovedChange {
                allowed_users,
                allowed_robots,
            } => Arc::new(OnlyMergeApprovedChange {
                allowed_users: allowed_users.clone(),
                allowed_robots: allowed_robots.clone(),
            }),
            RuleSpec::AcknowledgeMerge => Arc::new(AcknowledgeMerge),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationSpec {
    CommentOrFileMonorailIssue {
        #[serde(default)]
        components: Vec<String>,
        #[serde(default)]
        labels: Vec<String>,
    },
    FileBugForMergeApprovalViolation {
        #[serde(default)]
        components: Vec<String>,
        #[serde(default)]
        labels: Vec<String>,
    },
    CommentOnBugToAcknowledgeMerge,
}

impl NotificationSpec {
    pub fn build(&self) -> Arc<dyn Notification> {
        match self {
            NotificationSpec::CommentOrFileMonorailIssue { components, labels } => {
                Arc::new(CommentOrFileMonorailIssue {
                    components: components.clone(),
                    labels: labels.clone(),
                })
            }
            NotificationSpec::FileBugForMergeApprovalViolation { components, labels } => {
                Arc::new(FileBugForMergeApprovalViolation {
                    components: components.clone(),
                    labels: labels.clone(),
                })
            }
            NotificationSpec::CommentOnBugToAcknowledgeMerge => {
                Arc::new(CommentOnBugToAcknowledgeMerge)
            }
        }
    }

    fn needs_milestone(&self) -> bool {
        matches!(
            self,
            NotificationSpec::FileBugForMergeApprovalViolation { .. }
                | NotificationSpec::CommentOnBugToAcknowledgeMerge
        )
    }
}

/// Shorthand for an autoroller ruleset, see [`auto_roll_rules`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoRollSpec {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub dirs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesetSpec {
    pub account: String,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    #[serde(default)]
    pub notification: Option<NotificationSpec>,
    #[serde(default)]
    pub auto_roll: Option<AutoRollSpec>,
}

impl RulesetSpec {
    fn rule_names(&self) -> Vec<String> {
        self.rules
            .iter()
            .map(|spec| spec.build().name().to_string())
            .collect()
    }

    pub fn build(&self) -> AccountRules {
        match (&self.auto_roll, &self.notification) {
            (Some(auto_roll), _) => auto_roll_rules(
                &self.account,
                auto_roll.files.clone(),
                auto_roll.dirs.clone(),
            ),
            (None, notification) => AccountRules::new(
                self.account.clone(),
                self.rules.iter().map(RuleSpec::build).collect(),
                notification
                    .as_ref()
                    .map(NotificationSpec::build)
                    .unwrap_or_else(|| Arc::new(CommentOrFileMonorailIssue::default())),
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefSpec {
    pub base_repo_url: String,
    #[serde(default)]
    pub gerrit_url: String,
    #[serde(default)]
    pub branch_name: String,
    #[serde(default)]
    pub starting_commit: String,
    #[serde(default)]
    pub monorail_api_url: String,
    #[serde(default)]
    pub monorail_project: String,
    #[serde(default)]
    pub notifier_email: String,
    #[serde(default)]
    pub metadata: String,
    #[serde(default)]
    pub overwrite_last_known_commit: String,
    #[serde(default)]
    pub dynamic_ref: Option<DynamicRef>,
    #[serde(default)]
    pub rules: BTreeMap<String, RulesetSpec>,
}

impl RefSpec {
    /// Every problem with this ref's configuration, as readable messages.
    pub fn problems(&self, name: &str) -> Vec<String> {
        let mut problems = Vec::new();
        if let Err(e) = parse_repo_url(&self.base_repo_url) {
            problems.push(format!("ref {name}: invalid base_repo_url: {e}"));
        }
        if self.dynamic_ref.is_none() && self.branch_name.is_empty() {
            problems.push(format!("ref {name}: branch_name is required for static refs"));
        }
        if self.rules.is_empty() {
            problems.push(format!("ref {name}: no rulesets configured"));
        }
        let has_milestone = get_token(MILESTONE_NUMBER_TOKEN, &self.metadata).is_some();
        for (ruleset_name, ruleset) in &self.rules {
            let at = format!("ref {name}, ruleset {ruleset_name}");
            if ruleset.account.is_empty() {
                problems.push(format!("{at}: account must not be empty"));
            }
            match (&ruleset.auto_roll, &ruleset.notification) {
                (Some(_), _) if !ruleset.rules.is_empty() || ruleset.notification.is_some() => {
                    problems.push(format!(
                        "{at}: auto_roll cannot be combined with rules or notification"
                    ));
                }
                (Some(_), _) => {}
                (None, None) => problems.push(format!("{at}: notification is required")),
                (None, Some(notification)) => {
                    if ruleset.rules.is_empty() {
                        problems.push(format!("{at}: no rules configured"));
                    }
                    if notification.needs_milestone()
                        && self.dynamic_ref.is_none()
                        && !has_milestone
                    {
                        problems.push(format!(
                            "{at}: notifier requires a {MILESTONE_NUMBER_TOKEN} metadata token"
                        ));
                    }
                }
            }
            let mut seen = HashSet::new();
            for rule_name in ruleset.rule_names() {
                if !seen.insert(rule_name.clone()) {
                    problems.push(format!("{at}: duplicate rule name {rule_name}"));
                }
            }
        }
        problems
    }

    pub fn build(&self, name: &str) -> RefConfig {
        RefConfig {
            name: name.to_string(),
            base_repo_url: self.base_repo_url.clone(),
            gerrit_url: self.gerrit_url.clone(),
            branch_name: self.branch_name.clone(),
            starting_commit: self.starting_commit.clone(),
            monorail_api_url: self.monorail_api_url.clone(),
            monorail_project: self.monorail_project.clone(),
            notifier_email: self.notifier_email.clone(),
            rules: self
                .rules
                .iter()
                .map(|(name, spec)| (name.clone(), spec.build()))
                .collect(),
            metadata: self.metadata.clone(),
            overwrite_last_known_commit: self.overwrite_last_known_commit.clone(),
            dynamic_ref: self.dynamic_ref,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ref_spec(toml_src: &str) -> RefSpec {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn test_rule_spec_tagged_parsing() {
        let spec = ref_spec(
            r#"
            base_repo_url = "https://a.googlesource.com/a.git"
            branch_name = "main"

            [rules.findit]
            account = "findit@test.com"
            rules = [
                { kind = "auto_commits_per_day" },
                { kind = "change_reviewed", robots = ["bot@test.com"] },
                { kind = "only_modifies_files_and_dirs", name = "Release", files = ["VERSION"] },
            ]
            notification = { kind = "comment_or_file_monorail_issue", labels = ["L"] }
            "#,
        );

        let ruleset = &spec.rules["findit"];
        assert_eq!(
            ruleset.rules,
            vec![
                RuleSpec::AutoCommitsPerDay,
                RuleSpec::ChangeReviewed {
                    robots: vec!["bot@test.com".to_string()]
                },
                RuleSpec::OnlyModifiesFilesAndDirs {
                    name: "Release".to_string(),
                    files: vec!["VERSION".to_string()],
                    dirs: vec![],
                },
            ]
        );
        assert!(spec.problems("a").is_empty());

        let built = spec.build("a");
        assert_eq!(
            built.rules["findit"].rule_names(),
            vec!["AutoCommitsPerDay", "ChangeReviewed", "Release"]
        );
    }

    #[test]
    fn test_auto_roll_shorthand() {
        let spec = ref_spec(
            r#"
            base_repo_url = "https://a.googlesource.com/a.git"
            branch_name = "main"

            [rules.autoroll]
            account = "roller@test.com"
            auto_roll = { files = ["DEPS"] }
            "#,
        );
        assert!(spec.problems("a").is_empty());
        assert_eq!(
            spec.build("a").rules["autoroll"].rule_names(),
            vec!["AutoRollRulesFilesAndDirs"]
        );
    }

    #[test]
    fn test_problems_reported() {
        let spec = ref_spec(
            r#"
            base_repo_url = "not a url"

            [rules.merges]
            account = ""
            rules = [{ kind = "culprit_age" }, { kind = "culprit_age" }]
            notification = { kind = "file_bug_for_merge_approval_violation" }
            "#,
        );
        let problems = spec.problems("bad");
        assert!(problems.iter().any(|p| p.contains("invalid base_repo_url")));
        assert!(problems.iter().any(|p| p.contains("branch_name is required")));
        assert!(problems.iter().any(|p| p.contains("account must not be empty")));
        assert!(problems.iter().any(|p| p.contains("duplicate rule name CulpritAge")));
        assert!(problems.iter().any(|p| p.contains("MilestoneNumber")));
    }

    #[test]
    fn test_dynamic_ref_does_not_need_milestone() {
        let spec = ref_spec(
            r#"
            base_repo_url = "https://a.googlesource.com/a.git"
            dynamic_ref = "release_branches"

            [rules.merge-ack-rules]
            account = "*"
            rules = [{ kind = "acknowledge_merge" }]
            notification = { kind = "comment_on_bug_to_acknowledge_merge" }
            "#,
        );
        assert_eq!(spec.problems("release"), Vec::<String>::new());
        assert_eq!(spec.dynamic_ref, Some(DynamicRef::ReleaseBranches));
    }

    #[test]
    fn test_missing_notification_reported() {
        let spec = ref_spec(
            r#"
            base_repo_url = "https://a.googlesource.com/a.git"
            branch_name = "main"

            [rules.r]
            account = "*"
            rules = [{ kind = "culprit_age" }]
            "#,
        );
        assert_eq!(
            spec.problems("a"),
            vec!["ref a, ruleset r: notification is required".to_string()]
        );
    }
}
