mod json;
mod report;
mod summary;

pub use json::write_report;
pub use report::{AuditReport, CommitFinding, RefSummary};
pub use summary::{format_summary, print_summary};
