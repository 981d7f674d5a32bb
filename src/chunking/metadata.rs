//! Metadata key sanitization.
//!
//! Vector index property names must be GraphQL identifiers:
//! `[A-Za-z_][A-Za-z0-9_]*`, at most 230 characters.

use crate::models::Metadata;

const MAX_KEY_LEN: usize = 230;

/// Map an arbitrary metadata key to a valid property name.
pub fn sanitize_key(key: &str) -> String {
    let mut sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                // '.', '-', ' ' and anything else outside the identifier set
                '_'
            }
        })
        .collect();

    match sanitized.chars().next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        Some(_) => sanitized.insert(0, '_'),
        None => sanitized.push('_'),
    }

    // All characters are ASCII at this point, so byte truncation is safe.
    sanitized.truncate(MAX_KEY_LEN);
    sanitized
}

/// Rewrite every key of `metadata`. Later keys win when two sanitize alike.
pub fn sanitize_metadata(metadata: Metadata) -> Metadata {
    metadata
        .into_iter()
        .map(|(key, value)| (sanitize_key(&key), value))
        .collect()
}
