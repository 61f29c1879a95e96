//! ID generation and parsing for dogcat issues and proposals.
//!
//! Full ids look like `namespace-hash` (issues) or `namespace-inbox-hash`
//! (proposals). Ids are hash-derived rather than sequential so that two
//! clones creating issues concurrently never collide on merge.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate a 4-character lowercase alphanumeric hash suffix.
fn generate_hash() -> String {
    let uuid = Uuid::new_v4();
    let timestamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(uuid.as_bytes());
    hasher.update(timestamp.to_le_bytes());
    let hash = hasher.finalize();

    base32::encode(base32::Alphabet::Crockford, &hash[..4])
        .to_lowercase()
        .chars()
        .take(4)
        .collect()
}

/// Generate a full issue id: `namespace-hash`.
pub fn generate_issue_id(namespace: &str) -> String {
    format!("{namespace}-{}", generate_hash())
}

/// Generate a full proposal id: `namespace-inbox-hash`.
pub fn generate_proposal_id(namespace: &str) -> String {
    format!("{namespace}-inbox-{}", generate_hash())
}

/// Split a combined id on the *last* hyphen, producing `(namespace, id)`.
///
/// Used to recover `namespace`/`id` from a historical record that only
/// carries a combined `id` field (spec: "splits on the last hyphen").
pub fn split_full_id(full_id: &str) -> Option<(&str, &str)> {
    let pos = full_id.rfind('-')?;
    if pos == 0 || pos == full_id.len() - 1 {
        return None;
    }
    Some((&full_id[..pos], &full_id[pos + 1..]))
}

/// Generate a short, human-readable comment id.
pub fn generate_comment_id() -> String {
    format!("c-{}", generate_hash())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_id_has_namespace_prefix() {
        let id = generate_issue_id("dc");
        assert!(id.starts_with("dc-"));
        assert_eq!(id.len(), "dc-".len() + 4);
    }

    #[test]
    fn proposal_id_has_inbox_marker() {
        let id = generate_proposal_id("dc");
        assert!(id.starts_with("dc-inbox-"));
    }

    #[test]
    fn split_full_id_uses_last_hyphen() {
        assert_eq!(split_full_id("my-project-3hup"), Some(("my-project", "3hup")));
        assert_eq!(split_full_id("dc-abcd"), Some(("dc", "abcd")));
        assert_eq!(split_full_id("noseparator"), None);
    }

    #[test]
    fn ids_are_unique() {
        let a = generate_issue_id("dc");
        let b = generate_issue_id("dc");
        assert_ne!(a, b);
    }
}
