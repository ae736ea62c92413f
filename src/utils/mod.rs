//! Utility functions and helpers
use std::time::Duration;

/// Format duration for human-readable output
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.subsec_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Shorten an identity key for display, keeping the first `digest_len` digest chars
pub fn abbreviate_key(key: &str, digest_len: usize) -> &str {
    match key.rfind(':') {
        Some(pos) if key.len() - pos - 1 > digest_len => &key[..pos + 1 + digest_len],
        _ => key,
    }
}
