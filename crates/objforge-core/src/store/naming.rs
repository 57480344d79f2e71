//! Naming conventions shared by submissions and derived artifacts.

use super::{Result, StoreError};

/// Reject names that could escape the storage directories or are unusable as
/// a single path component.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "empty"
    } else if name == "." || name == ".." {
        "relative directory reference"
    } else if name.contains(['/', '\\']) {
        "contains a path separator"
    } else if name.contains('\0') {
        "contains NUL"
    } else {
        return Ok(());
    };

    Err(StoreError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

/// `{timestamp}_{original}` on the first attempt, `{timestamp}-{n}_{original}`
/// on the n-th retry after a collision.
pub fn stored_name(timestamp: i64, original: &str, attempt: u32) -> String {
    if attempt == 0 {
        format!("{timestamp}_{original}")
    } else {
        format!("{timestamp}-{attempt}_{original}")
    }
}

/// Stored name without its final extension (`1700_cat.jpg` -> `1700_cat`).
///
/// A leading dot does not start an extension.
pub fn base_name(stored_name: &str) -> &str {
    match stored_name.rfind('.') {
        Some(idx) if idx > 0 => &stored_name[..idx],
        _ => stored_name,
    }
}

/// Artifact filename derived from a stored name (`1700_cat.jpg` -> `1700_cat.obj`).
pub fn derived_name(stored_name: &str, extension: &str) -> String {
    format!("{}.{extension}", base_name(stored_name))
}
