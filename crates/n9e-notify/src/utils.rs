//! Utility functions for notification records

/// Maximum length of `notification_record.details` in bytes.
pub const MAX_DETAILS_LENGTH: usize = 255;

const TRUNCATED_SUFFIX: &str = "...";

/// Truncate a string to at most `max_len` bytes, cutting on a char boundary.
///
/// When the input is too long, the result ends with `...` and still fits
/// within `max_len`.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    if max_len < TRUNCATED_SUFFIX.len() {
        return s[..floor_char_boundary(s, max_len)].to_string();
    }
    let cut = floor_char_boundary(s, max_len - TRUNCATED_SUFFIX.len());
    format!("{}{}", &s[..cut], TRUNCATED_SUFFIX)
}

/// Caps a delivery diagnostic to what the record column holds.
pub fn truncate_details(details: &str) -> String {
    truncate_string(details, MAX_DETAILS_LENGTH)
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
