//! Identifier helpers: slugs, digests and name-based UUIDs.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Lowercases `input` and collapses every run of non-alphanumerics into `-`.
///
/// Returns `"unnamed"` when nothing survives.
#[must_use]
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    for c in input.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug
    }
}

/// Hex encoding of the first 16 bytes of SHA-256 over `input`.
#[must_use]
pub fn short_digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// Name-based (v5) UUID, stable for the same input.
#[must_use]
pub fn name_uuid(name: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
}
