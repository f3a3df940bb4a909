//! Encoders for the space separated columns (`notify_channels`,
//! `notify_groups`, `callbacks`, `append_tags`).

use crate::error::ValidationError;

/// Splits on any run of whitespace, dropping empty tokens.
pub fn split_fields(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

pub fn join_fields<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses whitespace separated integer ids, e.g. `user_group_ids = "7 8"`.
pub fn parse_ids(field: &str, raw: &str) -> Result<Vec<i64>, ValidationError> {
    raw.split_whitespace()
        .map(|token| {
            token.parse::<i64>().map_err(|_| {
                ValidationError::new(field, format!("'{token}' is not an integer id"))
            })
        })
        .collect()
}

/// Parses `append_tags` entries of the form `k=v`. Entries without `=` or
/// with an empty key are dropped.
pub fn parse_append_tags<S: AsRef<str>>(items: &[S]) -> Vec<(String, String)> {
    items
        .iter()
        .filter_map(|item| {
            let (k, v) = item.as_ref().split_once('=')?;
            let k = k.trim();
            if k.is_empty() {
                return None;
            }
            Some((k.to_string(), v.trim().to_string()))
        })
        .collect()
}

/// Renders a sample value the way it is stored in `trigger_value`.
pub fn format_value(value: f64) -> String {
    if value.is_finite() {
        format!("{value}")
    } else if value.is_nan() {
        "NaN".to_string()
    } else if value > 0.0 {
        "+Inf".to_string()
    } else {
        "-Inf".to_string()
    }
}
