//! Secret resolution and random material.
//!
//! A secret named `NAME` is resolved in priority order:
//!
//! 1. **Direct value** - the variable `NAME` itself (e.g. `CLIENT_SECRET=...`)
//! 2. **File reference** - the file named by `NAME_FILE`, for the Docker
//!    secrets pattern (e.g. `CLIENT_SECRET_FILE=/run/secrets/client_secret`)
//!
//! Lookups go through a caller-supplied function so configuration can be
//! loaded from the process environment or from a fixed map in tests.

use secrecy::SecretString;
use std::fs;

/// Why a secret could not be obtained.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Secret '{name}' not set (set {name} or {name}_FILE)")]
    NotSet { name: String },

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Secret file '{path}' is empty")]
    EmptyFile { path: String },

    #[error("Failed to generate random bytes: {0}")]
    Random(String),
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves the secret `name` from its direct value or its `_FILE` reference.
///
/// # Examples
///
/// ```ignore
/// use mailticket::secrets::resolve_secret;
///
/// let secret = resolve_secret(|k| std::env::var(k).ok(), "CLIENT_SECRET")?;
/// ```
pub fn resolve_secret<F>(lookup: F, name: &str) -> Result<SecretString>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(name) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Ok(SecretString::from(trimmed));
        }
    }

    // Fall back to the `_FILE` reference.
    if let Some(path) = lookup(&format!("{name}_FILE")) {
        let path = path.trim();
        if !path.is_empty() {
            let expanded = expand_home(path);
            let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
                path: expanded.clone(),
                source: e,
            })?;
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Err(SecretError::EmptyFile { path: expanded });
            }
            return Ok(SecretString::from(trimmed));
        }
    }

    Err(SecretError::NotSet {
        name: name.to_string(),
    })
}

/// Resolves a secret, returning None if neither source is set.
pub fn resolve_secret_optional<F>(lookup: F, name: &str) -> Result<Option<SecretString>>
where
    F: Fn(&str) -> Option<String>,
{
    match resolve_secret(lookup, name) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NotSet { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// `~` and `~/...` resolve against the home directory; `~user` is left alone.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            let home = home.to_string_lossy();
            if path == "~" {
                return home.into_owned();
            }
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}

/// `N` bytes from the OS CSPRNG.
pub fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    getrandom::fill(&mut bytes).map_err(|e| SecretError::Random(e.to_string()))?;
    Ok(bytes)
}
