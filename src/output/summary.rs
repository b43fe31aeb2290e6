use super::report::AuditReport;
use crate::model::AuditStatus;

/// Print human-readable summary to stdout
pub fn print_summary(report: &AuditReport) {
    println!();
    println!("╭───────────────────────────────────────────────────────────────╮");
    println!("│                  Commit Audit Summary                         │");
    println!("╰───────────────────────────────────────────────────────────────╯");
    println!();
    println!("Generated: {}", report.generated_at);
    println!();
    print!("{}", format_summary(report));
}

fn status_icon(status: AuditStatus) -> &'static str {
    match status {
        AuditStatus::AuditFailed => "💥",
        _ => "🚨",
    }
}

/// Format summary as string
pub fn format_summary(report: &AuditReport) -> String {
    let mut output = String::new();
    if report.refs.is_empty() {
        output.push_str("No audited refs.\n");
        return output;
    }

    for summary in &report.refs {
        let name = if summary.config_name.is_empty() {
            "unknown config"
        } else {
            summary.config_name.as_str()
        };
        output.push_str(&format!("Ref: {} ({})\n", summary.repo_url, name));
        if summary.paused {
            output.push_str("  Auditing is PAUSED\n");
        }
        if !summary.last_known_commit.is_empty() {
            output.push_str(&format!("  Last known commit: {}\n", summary.last_known_commit));
        }

        let counts: Vec<String> = summary
            .status_counts
            .iter()
            .map(|(status, count)| format!("{status}={count}"))
            .collect();
        if counts.is_empty() {
            output.push_str("  Commits: none\n");
        } else {
            output.push_str(&format!("  Commits: {}\n", counts.join(", ")));
        }

        for finding in &summary.findings {
            output.push_str(&format!(
                "  {} {} [{}] by {}\n",
                status_icon(finding.status),
                finding.commit_hash,
                finding.status.to_short_string(),
                finding.author
            ));
            for violation in &finding.violations {
                output.push_str(&format!("      - {violation}\n"));
            }
            if finding.notification_states.is_empty() {
                output.push_str("      not notified yet\n");
            } else {
                output.push_str(&format!(
                    "      notified: {}{}\n",
                    finding.notification_states.join(", "),
                    if finding.notified_all { "" } else { " (incomplete)" }
                ));
            }
        }
        output.push('\n');
    }

    output.push_str(&format!("Findings: {}\n", report.findings_count()));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::report::tests::test_snapshot;

    #[test]
    fn test_format_summary_empty() {
        let report = AuditReport::from_snapshot(&Default::default(), None);
        assert_eq!(format_summary(&report), "No audited refs.\n");
    }

    #[test]
    fn test_format_summary_with_findings() {
        let report = AuditReport::from_snapshot(&test_snapshot(), None);
        let output = format_summary(&report);

        assert!(output.contains("Ref: https://a.googlesource.com/a.git/+/refs/heads/main (a-main)"));
        assert!(output.contains("Commits: action_required=1, completed=1, pending=1"));
        assert!(output.contains("badc0de [action_required] by author@test.com"));
        assert!(output.contains("- OnlyModifiesFilesAndDirsRule: touched src/main.rs"));
        assert!(output.contains("notified: rules:BUG=12345\n"));
        assert!(output.contains("f00d [failed]"));
        assert!(output.contains("not notified yet"));
        assert!(output.ends_with("Findings: 2\n"));
    }

    #[test]
    fn test_format_summary_paused_ref() {
        let mut report = AuditReport::from_snapshot(&test_snapshot(), None);
        report.refs[0].paused = true;
        assert!(format_summary(&report).contains("Auditing is PAUSED"));
    }
}
