//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Reference Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Returns true if the query looks like a direct media URL rather than a search term.
#[must_use]
pub fn looks_like_url(query: &str) -> bool {
    let q = query.trim_start();
    q.starts_with("http://") || q.starts_with("https://")
}

/// Validates a destination identifier.
///
/// Destination IDs are used as map keys and URL path segments, so they must be
/// non-empty and limited to a conservative character set.
pub fn validate_destination_id(id: &str) -> Result<(), &'static str> {
    if id.is_empty() {
        return Err("destination id must not be empty");
    }
    if id.len() > 128 {
        return Err("destination id must be at most 128 characters");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err("destination id may only contain letters, digits, '-', '_' and '.'");
    }
    Ok(())
}
