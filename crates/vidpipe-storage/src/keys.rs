//! Object key construction.
//!
//! Keys always use forward-slash separators regardless of the host path
//! conventions, so the same local tree produces the same key layout on any
//! OS. Centralized here so every backend and the upload stage agree.

use std::path::Path;

use crate::traits::{StorageError, StorageResult};

/// Join a key prefix and a local relative path into an object key, using
/// posix separators. The prefix's trailing slash is normalized away.
pub fn object_key(prefix: &str, relative: &Path) -> StorageResult<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            std::path::Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    StorageError::InvalidKey(format!(
                        "non-UTF8 path component in {}",
                        relative.display()
                    ))
                })?;
                parts.push(part);
            }
            std::path::Component::CurDir => {}
            _ => {
                return Err(StorageError::InvalidKey(format!(
                    "relative path escapes its root: {}",
                    relative.display()
                )));
            }
        }
    }
    if parts.is_empty() {
        return Err(StorageError::InvalidKey("empty relative path".to_string()));
    }
    Ok(format!("{}/{}", prefix.trim_end_matches('/'), parts.join("/")))
}

/// Validate a key coming from an untrusted source (the edge proxy's
/// request path). Rejects traversal and absolute keys.
pub fn validate_key(key: &str) -> StorageResult<&str> {
    if key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|seg| seg.is_empty() || seg == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(key)
}
