mod auditor;
mod scan;
mod worker;

pub use auditor::{
    notify_about_violations, pause_ref_auditing, report_audit_failure, report_ref_failure,
    save_audited_commits, Auditor, PassOutcome, AUDIT_FAILURE_STATE,
};
pub use scan::{get_commit_log, scan_commits, SCAN_BATCH_SIZE};
pub use worker::{audit_commit, perform_scheduled_audits, AuditBatch};
