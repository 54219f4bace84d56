//! Helpers for keeping sensitive data out of logs and span attributes.
//!
//! Remote error bodies can echo tokens or message content, and sender
//! addresses are personal data. Everything logged about them goes through
//! these functions.

/// Maximum length for remote error bodies that end up in logs or errors.
pub const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Truncates a remote error body on a character boundary.
pub fn truncate_error_body(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
        Some((cut, _)) => format!("{}... (truncated)", &body[..cut]),
        None => body.to_string(),
    }
}

/// Masks the local part of an email address.
///
/// - `jane.doe@example.com` → `j***@example.com`
/// - `not-an-address` → `***`
pub fn redact_email(address: &str) -> String {
    match address.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
            let first = local.chars().next().unwrap_or('*');
            format!("{first}***@{domain}")
        }
        _ => "***".to_string(),
    }
}

/// Shortens an opaque provider id for log lines.
pub fn short_id(id: &str) -> String {
    const KEEP: usize = 12;
    match id.char_indices().nth(KEEP) {
        Some((cut, _)) => format!("{}…", &id[..cut]),
        None => id.to_string(),
    }
}
