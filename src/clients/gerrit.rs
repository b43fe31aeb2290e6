use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

pub const CODE_REVIEW_LABEL: &str = "Code-Review";
pub const BOT_COMMIT_LABEL: &str = "Bot-Commit";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountInfo {
    pub account_id: i64,
    #[serde(default)]
    pub email: String,
}

/// One vote on a label.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalInfo {
    pub account_id: i64,
    pub value: i32,
}

/// Detailed label information as returned with `DETAILED_LABELS`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelInfo {
    /// Vote string (`"-1"`, `" 0"`, `"+1"`) to its description.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    #[serde(default)]
    pub all: Vec<ApprovalInfo>,
}

impl LabelInfo {
    /// Highest vote value the label allows.
    pub fn max_value(&self) -> Option<i32> {
        self.values
            .keys()
            .filter_map(|k| k.trim().trim_start_matches('+').parse::<i32>().ok())
            .max()
    }

    /// Votes cast at the label's maximum value.
    pub fn max_votes(&self) -> impl Iterator<Item = &ApprovalInfo> {
        let max = self.max_value();
        self.all.iter().filter(move |v| Some(v.value) == max)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Change {
    pub change_id: String,
    pub change_number: i64,
    #[serde(default)]
    pub owner: AccountInfo,
    #[serde(default)]
    pub current_revision: String,
    /// Number of the change this one reverts, 0 if none.
    #[serde(default)]
    pub revert_of: i64,
    #[serde(default)]
    pub labels: HashMap<String, LabelInfo>,
}

#[async_trait]
pub trait GerritClient: Send + Sync {
    /// Run a change search such as `commit:<hash>`.
    async fn change_query(&self, query: &str) -> Result<Vec<Change>, ClientError>;

    async fn change_details(&self, change_id: &str, options: &[&str])
        -> Result<Change, ClientError>;

    async fn is_change_pure_revert(&self, change_id: &str) -> Result<bool, ClientError>;

    async fn set_review(
        &self,
        change_id: &str,
        revision: &str,
        message: &str,
    ) -> Result<(), ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(values: &[&str], votes: &[(i64, i32)]) -> LabelInfo {
        LabelInfo {
            values: values
                .iter()
                .map(|v| (v.to_string(), String::new()))
                .collect(),
            all: votes
                .iter()
                .map(|&(account_id, value)| ApprovalInfo { account_id, value })
                .collect(),
        }
    }

    #[test]
    fn test_max_value_parses_vote_strings() {
        let l = label(&["-2", "-1", " 0", "+1", "+2"], &[]);
        assert_eq!(l.max_value(), Some(2));
        let l = label(&["-1", " 0", "+1"], &[]);
        assert_eq!(l.max_value(), Some(1));
        assert_eq!(LabelInfo::default().max_value(), None);
    }

    #[test]
    fn test_max_votes() {
        let l = label(&["-1", " 0", "+1"], &[(1, 1), (2, 0), (3, 1)]);
        let ids: Vec<i64> = l.max_votes().map(|v| v.account_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
