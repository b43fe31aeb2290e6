use thiserror::Error;

/// Failure talking to one of the external services (Gerrit, Gitiles,
/// Monorail, Buildbucket, release info).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("not found: {0}")]
    NotFound(String),
    /// The service understood the request but refused it (bad owner, ACLs).
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

/// Failure reading or writing persisted audit state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ref state {0} not found")]
    RefStateNotFound(String),
    #[error("relevant commit {hash} not found in {ref_key}")]
    CommitNotFound { ref_key: String, hash: String },
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("transient store failure: {0}")]
    Transient(String),
}

/// Errors produced by the audit engine.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A rule could not determine whether the commit complies.
    #[error("rule {rule} could not determine compliance: {reason}")]
    Indeterminate { rule: String, reason: String },

    /// The ruleset or ref is misconfigured; retrying will not help.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid token: {0}")]
    Token(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("ref {0} needs to be paused")]
    PauseRef(String),

    #[error("audit pass cancelled")]
    Cancelled,

    /// A notifier completed part of its side effects before failing.
    /// `state` records the part that happened and must be stored so the
    /// next attempt resumes from it.
    #[error("notification incomplete ({state}): {source}")]
    PartiallyNotified {
        state: String,
        #[source]
        source: Box<AuditError>,
    },
}

impl AuditError {
    pub fn indeterminate(rule: &str, reason: impl Into<String>) -> Self {
        AuditError::Indeterminate {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, AuditError::Config(_))
    }

    /// State a failed notifier managed to reach, if any.
    pub fn partial_state(&self) -> Option<&str> {
        match self {
            AuditError::PartiallyNotified { state, .. } => Some(state),
            _ => None,
        }
    }
}

pub type Result<T, E = AuditError> = std::result::Result<T, E>;
