mod commit;
mod status;
mod token;

pub use commit::{RefState, RelevantCommit, RuleResult};
pub use status::{AuditStatus, RuleStatus};
pub use token::{get_token, set_token};
