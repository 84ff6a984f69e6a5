//! Shared utility functions used across multiple modules.

/// Truncate text to at most `max_chars` characters for previews and logs.
pub fn compact_text(value: &str, max_chars: usize) -> String {
    let trimmed = value.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut preview: String = trimmed.chars().take(max_chars).collect();
    preview.push('…');
    preview
}

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
