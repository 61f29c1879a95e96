//! Dependency and link records: standalone edges in the issue graph.
//!
//! Unlike the original beads-viewer shape, dependencies are not embedded in
//! the owning `Issue` — they are independent append-only log records so
//! that concurrent edits from two clones merge cleanly.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Dependency edge type, restricted to `Blocks` for cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyType {
    #[default]
    Blocks,
    ParentChild,
    Related,
}

impl std::str::FromStr for DependencyType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "blocks" => Ok(DependencyType::Blocks),
            "parent-child" => Ok(DependencyType::ParentChild),
            "related" => Ok(DependencyType::Related),
            other => Err(crate::Error::InvalidField {
                field: "type".into(),
                reason: format!("unknown dependency type '{other}'"),
            }),
        }
    }
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DependencyType::Blocks => "blocks",
            DependencyType::ParentChild => "parent-child",
            DependencyType::Related => "related",
        };
        write!(f, "{s}")
    }
}

/// A dependency edge: `issue_id` depends on `depends_on_id`.
///
/// `op: remove` marks a removal appended to the log rather than an edit of
/// the original record (dependencies are add-only otherwise).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub issue_id: String,
    pub depends_on_id: String,
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
    pub created_at: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<RecordOp>,
}

impl Dependency {
    pub fn new(issue_id: impl Into<String>, depends_on_id: impl Into<String>, dep_type: DependencyType) -> Self {
        Self {
            issue_id: issue_id.into(),
            depends_on_id: depends_on_id.into(),
            dep_type,
            created_at: chrono::Utc::now().fixed_offset(),
            created_by: None,
            op: None,
        }
    }

    pub fn removal(&self) -> Self {
        let mut d = self.clone();
        d.op = Some(RecordOp::Remove);
        d.created_at = chrono::Utc::now().fixed_offset();
        d
    }

    pub fn is_removal(&self) -> bool {
        self.op == Some(RecordOp::Remove)
    }

    pub fn key(&self) -> (String, String) {
        (self.issue_id.clone(), self.depends_on_id.clone())
    }
}

/// A non-blocking link between two issues (`from_id -> to_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub from_id: String,
    pub to_id: String,
    pub link_type: String,
    pub created_at: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<RecordOp>,
}

impl Link {
    pub fn new(from_id: impl Into<String>, to_id: impl Into<String>, link_type: impl Into<String>) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            link_type: link_type.into(),
            created_at: chrono::Utc::now().fixed_offset(),
            created_by: None,
            op: None,
        }
    }

    pub fn removal(&self) -> Self {
        let mut l = self.clone();
        l.op = Some(RecordOp::Remove);
        l.created_at = chrono::Utc::now().fixed_offset();
        l
    }

    pub fn is_removal(&self) -> bool {
        self.op == Some(RecordOp::Remove)
    }

    pub fn key(&self) -> (String, String, String) {
        (self.from_id.clone(), self.to_id.clone(), self.link_type.clone())
    }
}

/// Marker for an appended removal of a dependency or link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOp {
    Remove,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_type_parses_kebab_and_snake() {
        use std::str::FromStr;
        assert_eq!(DependencyType::from_str("parent-child").unwrap(), DependencyType::ParentChild);
        assert_eq!(DependencyType::from_str("parent_child").unwrap(), DependencyType::ParentChild);
    }

    #[test]
    fn removal_marker_round_trips() {
        let dep = Dependency::new("dc-a", "dc-b", DependencyType::Blocks);
        let removal = dep.removal();
        assert!(removal.is_removal());
        assert!(!dep.is_removal());

        let json = serde_json::to_string(&removal).unwrap();
        assert!(json.contains("\"op\":\"remove\""));
    }

    #[test]
    fn dependency_without_op_omits_field() {
        let dep = Dependency::new("dc-a", "dc-b", DependencyType::Blocks);
        let json = serde_json::to_string(&dep).unwrap();
        assert!(!json.contains("\"op\""));
    }
}
