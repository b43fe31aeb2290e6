use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::{AuditStatus, RelevantCommit};
use crate::store::Snapshot;

/// Audit results of the stored refs, as shown by `commitaudit report`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditReport {
    pub report_id: String,
    pub generated_at: String,
    pub refs: Vec<RefSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RefSummary {
    pub repo_url: String,
    pub config_name: String,
    pub paused: bool,
    pub last_known_commit: String,
    /// Commit count per audit status.
    pub status_counts: BTreeMap<String, usize>,
    /// Commits that need a human: violations and failed audits.
    pub findings: Vec<CommitFinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitFinding {
    pub commit_hash: String,
    pub status: AuditStatus,
    pub author: String,
    /// `"<rule>: <message>"` of every failed rule.
    pub violations: Vec<String>,
    pub notification_states: Vec<String>,
    pub notified_all: bool,
}

impl CommitFinding {
    fn from_commit(commit: &RelevantCommit) -> Self {
        Self {
            commit_hash: commit.commit_hash.clone(),
            status: commit.status,
            author: commit.author_account.clone(),
            violations: commit
                .get_violations()
                .iter()
                .map(|v| format!("{}: {}", v.rule_name, v.message))
                .collect(),
            notification_states: commit.notification_states.clone(),
            notified_all: commit.notified_all,
        }
    }
}

impl AuditReport {
    /// Summarize a store snapshot, optionally only the ref keyed `ref_filter`.
    pub fn from_snapshot(snapshot: &Snapshot, ref_filter: Option<&str>) -> Self {
        let keys: BTreeSet<&str> = snapshot
            .ref_states
            .keys()
            .chain(snapshot.commits.keys())
            .map(String::as_str)
            .filter(|key| ref_filter.map_or(true, |r| r == *key))
            .collect();

        let refs = keys
            .into_iter()
            .map(|key| {
                let mut summary = match snapshot.ref_states.get(key) {
                    Some(state) => RefSummary {
                        repo_url: state.repo_url.clone(),
                        config_name: state.config_name.clone(),
                        paused: state.paused,
                        last_known_commit: state.last_known_commit.clone(),
                        ..Default::default()
                    },
                    None => RefSummary {
                        repo_url: key.to_string(),
                        ..Default::default()
                    },
                };
                for commit in snapshot.commits(Some(key)) {
                    *summary
                        .status_counts
                        .entry(commit.status.to_short_string().to_string())
                        .or_default() += 1;
                    if matches!(
                        commit.status,
                        AuditStatus::AuditCompletedWithActionRequired | AuditStatus::AuditFailed
                    ) {
                        summary.findings.push(CommitFinding::from_commit(commit));
                    }
                }
                summary
            })
            .collect();

        Self {
            report_id: uuid::Uuid::new_v4().to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            refs,
        }
    }

    pub fn findings_count(&self) -> usize {
        self.refs.iter().map(|r| r.findings.len()).sum()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{RefState, RuleResult};
    use pretty_assertions::assert_eq;

    const MAIN: &str = "https://a.googlesource.com/a.git/+/refs/heads/main";
    const OTHER: &str = "https://b.googlesource.com/b.git/+/refs/heads/main";

    fn commit(ref_key: &str, hash: &str, status: AuditStatus) -> RelevantCommit {
        RelevantCommit {
            ref_state_key: ref_key.to_string(),
            commit_hash: hash.to_string(),
            author_account: "author@test.com".to_string(),
            status,
            ..Default::default()
        }
    }

    pub(crate) fn test_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.ref_states.insert(
            MAIN.to_string(),
            RefState {
                repo_url: MAIN.to_string(),
                config_name: "a-main".to_string(),
                last_known_commit: "c0ffee".to_string(),
                ..Default::default()
            },
        );
        let mut bad = commit(MAIN, "badc0de", AuditStatus::AuditCompletedWithActionRequired);
        bad.result = vec![
            RuleResult::passed("ChangeReviewed"),
            RuleResult::failed("OnlyModifiesFilesAndDirsRule", "touched src/main.rs"),
        ];
        bad.notification_states = vec!["rules:BUG=12345".to_string()];
        bad.notified_all = true;
        for c in [
            commit(MAIN, "600dc0de", AuditStatus::AuditCompleted),
            commit(MAIN, "9e9d", AuditStatus::AuditPending),
            bad,
            commit(OTHER, "f00d", AuditStatus::AuditFailed),
        ] {
            snapshot
                .commits
                .entry(c.ref_state_key.clone())
                .or_default()
                .insert(c.commit_hash.clone(), c);
        }
        snapshot
    }

    #[test]
    fn test_report_from_snapshot() {
        let report = AuditReport::from_snapshot(&test_snapshot(), None);

        assert_eq!(report.refs.len(), 2);
        let main = &report.refs[0];
        assert_eq!(main.config_name, "a-main");
        assert_eq!(main.last_known_commit, "c0ffee");
        assert_eq!(
            main.status_counts,
            BTreeMap::from([
                ("action_required".to_string(), 1),
                ("completed".to_string(), 1),
                ("pending".to_string(), 1),
            ])
        );
        assert_eq!(main.findings.len(), 1);
        assert_eq!(
            main.findings[0].violations,
            vec!["OnlyModifiesFilesAndDirsRule: touched src/main.rs".to_string()]
        );

        // Refs with commits but no state are still reported.
        let other = &report.refs[1];
        assert_eq!(other.repo_url, OTHER);
        assert_eq!(other.config_name, "");
        assert_eq!(other.findings[0].status, AuditStatus::AuditFailed);
        assert_eq!(report.findings_count(), 2);
    }

    #[test]
    fn test_report_ref_filter() {
        let report = AuditReport::from_snapshot(&test_snapshot(), Some(OTHER));
        assert_eq!(report.refs.len(), 1);
        assert_eq!(report.refs[0].repo_url, OTHER);

        let report = AuditReport::from_snapshot(&test_snapshot(), Some("unknown"));
        assert!(report.refs.is_empty());
    }
}
