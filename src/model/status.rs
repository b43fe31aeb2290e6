use serde::{Deserialize, Serialize};

/// Aggregate audit status of a relevant commit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    #[default]
    AuditScheduled,
    AuditCompleted,
    AuditCompletedWithActionRequired,
    AuditFailed,
    AuditPending,
}

impl AuditStatus {
    /// Whether the commit still needs to go through the rules.
    pub fn is_undecided(self) -> bool {
        matches!(self, AuditStatus::AuditScheduled | AuditStatus::AuditPending)
    }

    pub fn to_short_string(self) -> &'static str {
        match self {
            AuditStatus::AuditScheduled => "scheduled",
            AuditStatus::AuditCompleted => "completed",
            AuditStatus::AuditCompletedWithActionRequired => "action_required",
            AuditStatus::AuditFailed => "failed",
            AuditStatus::AuditPending => "pending",
        }
    }
}

/// Outcome of a single rule on a single commit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    RuleFailed,
    RulePassed,
    RuleSkipped,
    NotificationRequired,
    RulePending,
    /// Only used by tests to represent a result that should never be stored.
    RuleInvalid,
}

impl RuleStatus {
    pub fn to_short_string(self) -> &'static str {
        match self {
            RuleStatus::RuleFailed => "failed",
            RuleStatus::RulePassed => "passed",
            RuleStatus::RuleSkipped => "skipped",
            RuleStatus::NotificationRequired => "notification_required",
            RuleStatus::RulePending => "pending",
            RuleStatus::RuleInvalid => "invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_status_serialization() {
        assert_eq!(
            serde_json::to_string(&AuditStatus::AuditCompletedWithActionRequired).unwrap(),
            "\"audit_completed_with_action_required\""
        );
        let parsed: AuditStatus = serde_json::from_str("\"audit_pending\"").unwrap();
        assert_eq!(parsed, AuditStatus::AuditPending);
    }

    #[test]
    fn test_undecided_statuses() {
        assert!(AuditStatus::AuditScheduled.is_undecided());
        assert!(AuditStatus::AuditPending.is_undecided());
        assert!(!AuditStatus::AuditCompleted.is_undecided());
        assert!(!AuditStatus::AuditFailed.is_undecided());
        assert!(!AuditStatus::AuditCompletedWithActionRequired.is_undecided());
    }

    #[test]
    fn test_default_is_scheduled() {
        assert_eq!(AuditStatus::default(), AuditStatus::AuditScheduled);
    }
}
