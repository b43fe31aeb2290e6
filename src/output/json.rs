use super::report::AuditReport;
use anyhow::{Context, Result};
use std::path::Path;

/// Write report to JSON file
pub fn write_report(report: &AuditReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .context("Failed to serialize report to JSON")?;

    std::fs::write(path, &json)
        .with_context(|| format!("Failed to write report to {:?}", path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::report::tests::test_snapshot;
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_report_valid_json() {
        let report = AuditReport::from_snapshot(&test_snapshot(), None);
        let temp = NamedTempFile::new().unwrap();

        write_report(&report, temp.path()).unwrap();

        let content = std::fs::read_to_string(temp.path()).unwrap();
        let parsed: AuditReport = serde_json::from_str(&content).unwrap();
        assert_eq!(report, parsed);
        // Pretty printed JSON has newlines
        assert!(content.contains('\n'));
        assert!(content.contains("\"action_required\": 1"));
    }

    #[test]
    fn test_write_report_bad_path() {
        let report = AuditReport::from_snapshot(&test_snapshot(), None);
        let dir = tempfile::tempdir().unwrap();
        let err = write_report(&report, &dir.path().join("missing").join("report.json"))
            .unwrap_err();
        assert!(format!("{err:#}").contains("Failed to write report"));
    }
}
