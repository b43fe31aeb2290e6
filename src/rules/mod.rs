mod change_reviewed;
mod context;
mod engine;
mod findit;
mod merge;
mod only_modifies;

pub use change_reviewed::{ChangeReviewed, REVIEW_GRACE_DAYS};
pub use context::AuditParams;
pub use engine::{DummyRule, Rule};
pub use findit::{
    count_relevant_commits, AutoCommitsPerDay, AutoRevertsPerDay, CulpritAge, CulpritInBuild,
    FailedBuildIsAppropriateFailure, OnlyCommitsOwnChange, RevertOfCulprit, Role,
    MAX_AUTO_COMMITS_PER_DAY, MAX_AUTO_REVERTS_PER_DAY, MAX_CULPRIT_AGE_HOURS,
};
pub use merge::{merge_approved_label, AcknowledgeMerge, OnlyMergeApprovedChange, BUG_NUMBERS_TOKEN};
pub use only_modifies::OnlyModifiesFilesAndDirsRule;

#[cfg(test)]
pub(crate) use context::tests::{test_params, test_params_with_store, test_ref_config};
