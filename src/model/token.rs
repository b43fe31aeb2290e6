//! Flat `key:value` token blobs.
//!
//! Ref metadata and rule result metadata are persisted as newline separated
//! `key:value` lines. Keys never contain `:`; values may.

use crate::error::AuditError;

/// Look up `key` in a packed token blob.
pub fn get_token(key: &str, blob: &str) -> Option<String> {
    blob.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        (k == key).then(|| v.to_string())
    })
}

/// Set `key` to `value`, replacing an existing entry in place or appending a
/// new line. Returns the new blob.
pub fn set_token(key: &str, value: &str, blob: &str) -> Result<String, AuditError> {
    if key.is_empty() || key.contains(':') || key.contains('\n') {
        return Err(AuditError::Token(format!("invalid token name {key:?}")));
    }
    if value.contains('\n') {
        return Err(AuditError::Token(format!(
            "value for token {key} must not contain newlines"
        )));
    }

    let entry = format!("{key}:{value}");
    let mut replaced = false;
    let mut lines: Vec<String> = blob
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(':') {
            Some((k, _)) if k == key && !replaced => {
                replaced = true;
                entry.clone()
            }
            _ => line.to_string(),
        })
        .collect();
    if !replaced {
        lines.push(entry);
    }
    Ok(lines.join("\n"))
}
