use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::CommitStore;
use crate::error::StoreError;
use crate::model::{AuditStatus, RefState, RelevantCommit};

/// Serializable image of the whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    #[serde(default)]
    pub ref_states: BTreeMap<String, RefState>,
    /// Ref state key to commit hash to commit.
    #[serde(default)]
    pub commits: BTreeMap<String, BTreeMap<String, RelevantCommit>>,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Every stored commit, optionally restricted to one ref, oldest first.
    pub fn commits(&self, ref_key: Option<&str>) -> Vec<&RelevantCommit> {
        let mut commits: Vec<&RelevantCommit> = self
            .commits
            .iter()
            .filter(|(key, _)| ref_key.map_or(true, |r| r == key.as_str()))
            .flat_map(|(_, by_hash)| by_hash.values())
            .collect();
        commits.sort_by(|a, b| {
            a.commit_time
                .cmp(&b.commit_time)
                .then_with(|| a.commit_hash.cmp(&b.commit_hash))
        });
        commits
    }
}

/// In-process [`CommitStore`] that can be loaded from and written to a JSON
/// snapshot.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::from_snapshot(Snapshot::load(path)?))
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.read().await.clone()
    }

    pub async fn write_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        self.inner.read().await.write(path)
    }
}

#[async_trait]
impl CommitStore for MemoryStore {
    async fn get_ref_state(&self, repo_url: &str) -> Result<Option<RefState>, StoreError> {
        Ok(self.inner.read().await.ref_states.get(repo_url).cloned())
    }

    async fn put_ref_state(&self, state: &RefState) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .ref_states
            .insert(state.repo_url.clone(), state.clone());
        Ok(())
    }

    async fn list_ref_states(&self) -> Result<Vec<RefState>, StoreError> {
        Ok(self.inner.read().await.ref_states.values().cloned().collect())
    }

    async fn get_commit(
        &self,
        ref_key: &str,
        hash: &str,
    ) -> Result<Option<RelevantCommit>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .commits
            .get(ref_key)
            .and_then(|by_hash| by_hash.get(hash))
            .cloned())
    }

    async fn put_commit(&self, commit: &RelevantCommit) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .commits
            .entry(commit.ref_state_key.clone())
            .or_default()
            .insert(commit.commit_hash.clone(), commit.clone());
        Ok(())
    }

    async fn insert_new_commits(&self, commits: &[RelevantCommit]) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        let mut written = 0;
        for commit in commits {
            let by_hash = inner
                .commits
                .entry(commit.ref_state_key.clone())
                .or_default();
            if by_hash.contains_key(&commit.commit_hash) {
                debug!(commit = %commit.commit_hash, "commit already stored, skipping");
                continue;
            }
            by_hash.insert(commit.commit_hash.clone(), commit.clone());
            written += 1;
        }
        Ok(written)
    }

    async fn commits_with_status(
        &self,
        ref_key: &str,
        statuses: &[AuditStatus],
    ) -> Result<Vec<RelevantCommit>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .commits(Some(ref_key))
            .into_iter()
            .filter(|c| statuses.contains(&c.status))
            .cloned()
            .collect())
    }

    async fn put_audited_commits(&self, commits: &[RelevantCommit]) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        let mut written = 0;
        for commit in commits {
            let by_hash = inner
                .commits
                .entry(commit.ref_state_key.clone())
                .or_default();
            match by_hash.get(&commit.commit_hash) {
                Some(stored) if !stored.status.is_undecided() => {
                    debug!(
                        commit = %commit.commit_hash,
                        status = stored.status.to_short_string(),
                        "commit already decided, not overwriting"
                    );
                }
                _ => {
                    by_hash.insert(commit.commit_hash.clone(), commit.clone());
                    written += 1;
                }
            }
        }
        Ok(written)
    }
}
