//! Event records: derived audit trail, never the source of truth.
//!
//! Events are appended by the store during mutations and replayed only for
//! display. Dedup is by `(event_type, issue_id, timestamp, by, changes)` so
//! that re-appending the same mutation (e.g. during a retried merge) does
//! not double the trail.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Fields tracked for diffing between the old and new state of an issue.
pub const TRACKED_FIELDS: &[&str] = &[
    "title",
    "status",
    "priority",
    "issue_type",
    "owner",
    "parent",
    "labels",
    "external_ref",
    "description",
    "close_reason",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Updated,
    Closed,
    Reopened,
    Deleted,
    DependencyAdded,
    DependencyRemoved,
    LinkAdded,
    LinkRemoved,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventType::Created => "created",
            EventType::Updated => "updated",
            EventType::Closed => "closed",
            EventType::Reopened => "reopened",
            EventType::Deleted => "deleted",
            EventType::DependencyAdded => "dependency_added",
            EventType::DependencyRemoved => "dependency_removed",
            EventType::LinkAdded => "link_added",
            EventType::LinkRemoved => "link_removed",
        };
        write!(f, "{s}")
    }
}

/// A single field's before/after value in a change set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
}

/// Derived audit record produced by a mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub issue_id: String,
    pub timestamp: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub changes: BTreeMap<String, FieldChange>,
}

impl Event {
    pub fn new(event_type: EventType, issue_id: impl Into<String>, by: Option<String>) -> Self {
        Self {
            event_type,
            issue_id: issue_id.into(),
            timestamp: chrono::Utc::now().fixed_offset(),
            by,
            title: None,
            changes: BTreeMap::new(),
        }
    }

    /// A canonical string used as the dedup key across reloads/compactions.
    ///
    /// `changes` is a `BTreeMap` so key ordering (and therefore this
    /// string) is deterministic regardless of insertion order.
    pub fn dedup_key(&self) -> String {
        let changes = serde_json::to_string(&self.changes).unwrap_or_default();
        format!(
            "{}|{}|{}|{}|{}",
            self.event_type,
            self.issue_id,
            self.timestamp.to_rfc3339(),
            self.by.as_deref().unwrap_or(""),
            changes
        )
    }
}

/// Compute the tracked-field diff between an old and new issue snapshot,
/// serialized generically so this works for both `Issue` and `Proposal`.
pub fn diff_tracked_fields(old: &Value, new: &Value) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();
    for field in TRACKED_FIELDS {
        let old_val = old.get(field).cloned();
        let new_val = new.get(field).cloned();
        if old_val != new_val {
            changes.insert(
                (*field).to_string(),
                FieldChange {
                    old: old_val,
                    new: new_val,
                },
            );
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dedup_key_is_stable_across_change_insertion_order() {
        let mut e1 = Event::new(EventType::Updated, "dc-abcd", Some("alice".into()));
        e1.timestamp = "2026-01-01T00:00:00+00:00".parse().unwrap();
        e1.changes.insert(
            "title".into(),
            FieldChange {
                old: Some(json!("a")),
                new: Some(json!("b")),
            },
        );
        e1.changes.insert(
            "status".into(),
            FieldChange {
                old: Some(json!("open")),
                new: Some(json!("closed")),
            },
        );

        let mut e2 = e1.clone();
        e2.changes = BTreeMap::new();
        e2.changes.insert(
            "status".into(),
            FieldChange {
                old: Some(json!("open")),
                new: Some(json!("closed")),
            },
        );
        e2.changes.insert(
            "title".into(),
            FieldChange {
                old: Some(json!("a")),
                new: Some(json!("b")),
            },
        );

        assert_eq!(e1.dedup_key(), e2.dedup_key());
    }

    #[test]
    fn diff_tracked_fields_ignores_untracked_keys() {
        let old = json!({"title": "a", "untracked": "x"});
        let new = json!({"title": "b", "untracked": "y"});
        let diff = diff_tracked_fields(&old, &new);
        assert_eq!(diff.len(), 1);
        assert!(diff.contains_key("title"));
    }
}
