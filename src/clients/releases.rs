use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// An active release branch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Release {
    pub milestone: u32,
    /// Branch number, e.g. `"4044"` for `refs/branch-heads/4044`.
    pub branch: String,
}

#[async_trait]
pub trait ReleaseClient: Send + Sync {
    /// Releases whose branches are currently receiving merges.
    async fn active_releases(&self) -> Result<Vec<Release>, ClientError>;
}
