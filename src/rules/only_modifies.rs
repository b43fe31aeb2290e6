use async_trait::async_trait;

use super::context::AuditParams;
use super::engine::Rule;
use crate::clients::{parse_repo_url, Clients, LogRequest, TreeDiff};
use crate::error::AuditError;
use crate::model::{RelevantCommit, RuleResult};

/// Passes only when every path the commit touches is an allowed file or lies
/// under an allowed directory.
#[derive(Debug, Clone, Default)]
pub struct OnlyModifiesFilesAndDirsRule {
    pub name: String,
    pub files: Vec<String>,
    pub dirs: Vec<String>,
}

impl OnlyModifiesFilesAndDirsRule {
    fn is_allowed(&self, path: &str) -> bool {
        self.files.iter().any(|f| f == path)
            || self.dirs.iter().any(|dir| {
                let dir = dir.trim_end_matches('/');
                path.strip_prefix(dir)
                    .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
            })
    }

    /// Paths of `diff` that are not allowed. Both sides of a rename or
    /// modification count; absent sides of adds and deletes do not.
    fn disallowed_paths<'a>(&self, diff: &'a TreeDiff) -> Vec<&'a str> {
        [diff.old_path.as_str(), diff.new_path.as_str()]
            .into_iter()
            .filter(|p| !p.is_empty() && *p != "/dev/null")
            .filter(|p| !self.is_allowed(p))
            .collect()
    }
}

#[async_trait]
impl Rule for OnlyModifiesFilesAndDirsRule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        params: &AuditParams,
        commit: &mut RelevantCommit,
        clients: &Clients,
    ) -> Result<RuleResult, AuditError> {
        let (host, project) = parse_repo_url(&params.repo_config.base_repo_url)?;
        let log = clients
            .gitiles
            .log(
                &host,
                &LogRequest {
                    project,
                    committish: commit.commit_hash.clone(),
                    page_size: 1,
                    tree_diff: true,
                    ..Default::default()
                },
            )
            .await?;
        let Some(details) = log.first() else {
            return Err(AuditError::indeterminate(
                &self.name,
                format!("commit {} not found in repo", commit.commit_hash),
            ));
        };

        let mut disallowed: Vec<&str> = Vec::new();
        for diff in &details.tree_diff {
            for path in self.disallowed_paths(diff) {
                if !disallowed.contains(&path) {
                    disallowed.push(path);
                }
            }
        }
        if disallowed.is_empty() {
            return Ok(RuleResult::passed(&self.name));
        }
        Ok(RuleResult::failed(
            &self.name,
            format!(
                "The automated account {} was expected to only modify {} on the automated commit {} but it instead modified {}",
                params.triggering_account,
                self.allowed_description(),
                commit.commit_hash,
                disallowed.join(", ")
            ),
        ))
    }
}

impl OnlyModifiesFilesAndDirsRule {
    fn allowed_description(&self) -> String {
        let mut parts = Vec::new();
        if !self.files.is_empty() {
            parts.push(format!("files [{}]", self.files.join(", ")));
        }
        if !self.dirs.is_empty() {
            parts.push(format!("directories [{}]", self.dirs.join(", ")));
        }
        if parts.is_empty() {
            return "nothing".to_string();
        }
        parts.join(" and ")
    }
}
