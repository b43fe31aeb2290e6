use async_trait::async_trait;

use super::context::AuditParams;
use crate::clients::Clients;
use crate::error::AuditError;
use crate::model::{RelevantCommit, RuleResult};

/// Trait for implementing audit rules
///
/// A rule only reads external state. It may be run any number of times for
/// the same commit; the only thing it may change on the commit is
/// `last_external_poll`.
///
/// Policy violations are reported as a [`RuleResult`] with
/// `RuleFailed` status. `Err` is reserved for the rule being unable to decide,
/// which makes the auditor retry the commit on a later pass.
#[async_trait]
pub trait Rule: Send + Sync {
    /// Stable name, unique within a ruleset. Used as the result key.
    fn name(&self) -> &str;

    async fn run(
        &self,
        params: &AuditParams,
        commit: &mut RelevantCommit,
        clients: &Clients,
    ) -> Result<RuleResult, AuditError>;
}

/// Rule that always returns the configured result.
#[derive(Debug, Clone)]
pub struct DummyRule {
    pub name: String,
    pub result: RuleResult,
}

impl DummyRule {
    pub fn new(result: RuleResult) -> Self {
        Self {
            name: result.rule_name.clone(),
            result,
        }
    }
}

#[async_trait]
impl Rule for DummyRule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        _params: &AuditParams,
        _commit: &mut RelevantCommit,
        _clients: &Clients,
    ) -> Result<RuleResult, AuditError> {
        Ok(self.result.clone())
    }
}
