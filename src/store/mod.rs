mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{AuditStatus, RefState, RelevantCommit};

pub use memory::{MemoryStore, Snapshot};

/// Persistent audit state: one `RefState` per monitored ref and the relevant
/// commits of each ref keyed by `(ref_state_key, commit_hash)`.
///
/// History walks go through [`CommitStore::get_commit`] one back-pointer at a
/// time; nothing here loads a ref's whole history.
#[async_trait]
pub trait CommitStore: Send + Sync {
    async fn get_ref_state(&self, repo_url: &str) -> Result<Option<RefState>, StoreError>;

    async fn put_ref_state(&self, state: &RefState) -> Result<(), StoreError>;

    async fn list_ref_states(&self) -> Result<Vec<RefState>, StoreError>;

    async fn get_commit(
        &self,
        ref_key: &str,
        hash: &str,
    ) -> Result<Option<RelevantCommit>, StoreError>;

    /// Unconditionally write one commit.
    async fn put_commit(&self, commit: &RelevantCommit) -> Result<(), StoreError>;

    /// Store newly scanned commits, leaving already stored ones untouched.
    /// Returns how many were written.
    async fn insert_new_commits(&self, commits: &[RelevantCommit]) -> Result<usize, StoreError>;

    /// Commits of a ref whose status is one of `statuses`, oldest first.
    async fn commits_with_status(
        &self,
        ref_key: &str,
        statuses: &[AuditStatus],
    ) -> Result<Vec<RelevantCommit>, StoreError>;

    /// Write audited commits, skipping any whose stored copy is no longer
    /// scheduled or pending. Returns how many were written.
    async fn put_audited_commits(&self, commits: &[RelevantCommit]) -> Result<usize, StoreError>;
}
