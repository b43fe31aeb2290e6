//! Parsers for the micro-formats embedded in commit messages.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Line prefix naming the build a revert was triggered by.
pub const FAILED_BUILD_PREFIX: &str = "Sample Failed Build:";
/// Line prefix naming the failing step of that build.
pub const FAILED_STEP_PREFIX: &str = "Sample Failed Step:";
/// Line prefix present on reverts of flaky-test culprits.
pub const FLAKY_TEST_PREFIX: &str = "Sample Flaky Test:";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("no bug id found in commit message")]
    NoBug,
    #[error("commit message has no line starting with {0:?}")]
    MissingField(&'static str),
}

fn bug_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi)^\s*bug\s*[:=]\s*(.*)$").expect("bug line regex is valid")
    })
}

/// Extract bug ids from `Bug:` / `BUG=` footer lines.
///
/// Accepts comma or space separated lists and `project:id` forms. Ids are
/// returned in order of appearance without duplicates.
pub fn bug_ids_from_commit_message(message: &str) -> Result<Vec<String>, MessageError> {
    let mut ids: Vec<String> = Vec::new();
    for caps in bug_line_regex().captures_iter(message) {
        let list = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        for item in list.split(|c: char| c == ',' || c.is_whitespace()) {
            let id = item.rsplit(':').next().unwrap_or_default().trim();
            if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) && !ids.iter().any(|b| b == id)
            {
                ids.push(id.to_string());
            }
        }
    }
    if ids.is_empty() {
        return Err(MessageError::NoBug);
    }
    Ok(ids)
}

fn field_from_commit_message(
    message: &str,
    prefix: &'static str,
) -> Result<String, MessageError> {
    message
        .lines()
        .find_map(|line| line.trim_start().strip_prefix(prefix))
        .map(|rest| rest.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(MessageError::MissingField(prefix))
}

/// URL of the failed build referenced by an automatic revert.
pub fn failed_build_from_commit_message(message: &str) -> Result<String, MessageError> {
    field_from_commit_message(message, FAILED_BUILD_PREFIX)
}

/// Name of the failed step referenced by an automatic revert.
pub fn failed_step_from_commit_message(message: &str) -> Result<String, MessageError> {
    field_from_commit_message(message, FAILED_STEP_PREFIX)
}

pub fn is_flake_revert(message: &str) -> bool {
    message
        .lines()
        .any(|line| line.trim_start().starts_with(FLAKY_TEST_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REVERT_MESSAGE: &str = "Revert \"Break everything\"\n\
        \n\
        This reverts commit badc0de.\n\
        \n\
        Sample Failed Build: https://ci.chromium.org/b/8912345\n\
        Sample Failed Step: browser_tests\n\
        \n\
        Bug: 123456\n";

    #[test]
    fn test_bug_ids_single() {
        assert_eq!(
            bug_ids_from_commit_message(REVERT_MESSAGE).unwrap(),
            vec!["123456"]
        );
    }

    #[test]
    fn test_bug_ids_list_without_space() {
        assert_eq!(
            bug_ids_from_commit_message("Merge fix\n\nBug:123456, 654321").unwrap(),
            vec!["123456", "654321"]
        );
    }

    #[test]
    fn test_bug_ids_legacy_and_project_forms() {
        let msg = "Fix\n\nBUG=chromium:111 222\nBug: v8:333, 111";
        assert_eq!(
            bug_ids_from_commit_message(msg).unwrap(),
            vec!["111", "222", "333"]
        );
    }

    #[test]
    fn test_bug_ids_missing() {
        assert_eq!(
            bug_ids_from_commit_message("No bug here").unwrap_err(),
            MessageError::NoBug
        );
        assert_eq!(
            bug_ids_from_commit_message("Bug: None").unwrap_err(),
            MessageError::NoBug
        );
    }

    #[test]
    fn test_bug_word_inside_text_is_ignored() {
        assert!(bug_ids_from_commit_message("Fixes a debug: 12 issue").is_err());
    }

    #[test]
    fn test_failed_build_and_step() {
        assert_eq!(
            failed_build_from_commit_message(REVERT_MESSAGE).unwrap(),
            "https://ci.chromium.org/b/8912345"
        );
        assert_eq!(
            failed_step_from_commit_message(REVERT_MESSAGE).unwrap(),
            "browser_tests"
        );
    }

    #[test]
    fn test_missing_fields() {
        assert_eq!(
            failed_build_from_commit_message("nothing").unwrap_err(),
            MessageError::MissingField(FAILED_BUILD_PREFIX)
        );
        assert!(failed_step_from_commit_message("Sample Failed Step:   ").is_err());
    }

    #[test]
    fn test_is_flake_revert() {
        assert!(!is_flake_revert(REVERT_MESSAGE));
        assert!(is_flake_revert(
            "Revert\n\nSample Flaky Test: FooTest.Bar\nBug: 1"
        ));
    }
}
