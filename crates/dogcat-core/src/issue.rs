//! The issue record: identity, lifecycle fields, and embedded comments.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Issue status. `Closed` and `Tombstone` are terminal; `Tombstone` is the
/// only status that implies the issue's dependencies/links were purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    InReview,
    Blocked,
    Deferred,
    Closed,
    Tombstone,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Closed | Status::Tombstone)
    }

    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::str::FromStr for Status {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "open" => Ok(Status::Open),
            "in_progress" => Ok(Status::InProgress),
            "in_review" => Ok(Status::InReview),
            "blocked" => Ok(Status::Blocked),
            "deferred" => Ok(Status::Deferred),
            "closed" => Ok(Status::Closed),
            "tombstone" => Ok(Status::Tombstone),
            other => Err(crate::Error::InvalidField {
                field: "status".into(),
                reason: format!("unknown status '{other}'"),
            }),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Open => "open",
            Status::InProgress => "in_progress",
            Status::InReview => "in_review",
            Status::Blocked => "blocked",
            Status::Deferred => "deferred",
            Status::Closed => "closed",
            Status::Tombstone => "tombstone",
        };
        write!(f, "{s}")
    }
}

/// Issue type. `Subtask` and `Draft` are current, first-class variants;
/// `sub_task`/`sub-task`/`draft_task` are accepted historical spellings
/// that normalize onto them without a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    #[default]
    Task,
    Bug,
    Feature,
    Story,
    Chore,
    Epic,
    Subtask,
    Question,
    Draft,
}

impl std::str::FromStr for IssueType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "task" => Ok(IssueType::Task),
            "bug" => Ok(IssueType::Bug),
            "feature" => Ok(IssueType::Feature),
            "story" => Ok(IssueType::Story),
            "chore" => Ok(IssueType::Chore),
            "epic" => Ok(IssueType::Epic),
            "subtask" | "sub_task" => Ok(IssueType::Subtask),
            "question" => Ok(IssueType::Question),
            "draft" | "draft_task" => Ok(IssueType::Draft),
            other => Err(crate::Error::InvalidField {
                field: "issue_type".into(),
                reason: format!("unknown issue type '{other}'"),
            }),
        }
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IssueType::Task => "task",
            IssueType::Bug => "bug",
            IssueType::Feature => "feature",
            IssueType::Story => "story",
            IssueType::Chore => "chore",
            IssueType::Epic => "epic",
            IssueType::Subtask => "subtask",
            IssueType::Question => "question",
            IssueType::Draft => "draft",
        };
        write!(f, "{s}")
    }
}

fn normalize(s: &str) -> String {
    s.to_lowercase().replace('-', "_")
}

/// Validate priority is in the accepted range `0..=4`.
pub fn validate_priority(priority: u8) -> crate::Result<()> {
    if priority > 4 {
        return Err(crate::Error::InvalidField {
            field: "priority".into(),
            reason: format!("priority {priority} out of range 0..=4"),
        });
    }
    Ok(())
}

/// A comment embedded in its owning issue, ordered by insertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    pub issue_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub text: String,
    pub created_at: DateTime<FixedOffset>,
}

/// An issue record. Identity is `(namespace, id)`; `full_id()` joins them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub namespace: String,
    pub id: String,

    pub title: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub issue_type: IssueType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_type: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<FixedOffset>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,

    /// Forward-compatible overflow for unknown fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_priority() -> u8 {
    2
}

impl Issue {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = chrono::Utc::now().fixed_offset();
        Self {
            namespace: namespace.into(),
            id: id.into(),
            title: title.into(),
            status: Status::Open,
            priority: default_priority(),
            issue_type: IssueType::Task,
            description: None,
            owner: None,
            parent: None,
            labels: Vec::new(),
            external_ref: None,
            design: None,
            acceptance: None,
            notes: None,
            plan: None,
            duplicate_of: None,
            close_reason: None,
            delete_reason: None,
            original_type: None,
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
            closed_at: None,
            deleted_at: None,
            created_by: None,
            updated_by: None,
            closed_by: None,
            deleted_by: None,
            comments: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn full_id(&self) -> String {
        format!("{}-{}", self.namespace, self.id)
    }

    /// Whether `metadata.manual == true`, marking this as human-only work.
    pub fn is_manual(&self) -> bool {
        self.metadata
            .get("manual")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Touch `updated_at` forward so it stays ≥ all prior values on this id.
    pub fn touch(&mut self, at: DateTime<FixedOffset>, by: Option<String>) {
        if at > self.updated_at {
            self.updated_at = at;
        } else {
            self.updated_at = self.updated_at + chrono::Duration::microseconds(1);
        }
        if by.is_some() {
            self.updated_by = by;
        }
    }

    pub fn close(&mut self, reason: Option<String>, by: Option<String>, at: DateTime<FixedOffset>) {
        self.status = Status::Closed;
        self.close_reason = reason;
        self.closed_at = Some(at);
        self.closed_by = by.clone();
        self.touch(at, by);
    }

    pub fn tombstone(&mut self, reason: Option<String>, by: Option<String>, at: DateTime<FixedOffset>) {
        self.original_type = self
            .original_type
            .clone()
            .or_else(|| Some(self.issue_type.to_string()));
        self.status = Status::Tombstone;
        self.delete_reason = reason;
        self.deleted_at = Some(at);
        self.deleted_by = by.clone();
        self.touch(at, by);
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [P{}] [{}] {} - {}",
            self.full_id(),
            self.priority,
            self.issue_type,
            self.status,
            self.title
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_id_joins_namespace_and_id() {
        let issue = Issue::new("dc", "3hup", "Title");
        assert_eq!(issue.full_id(), "dc-3hup");
    }

    #[test]
    fn status_round_trips_through_json() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let back: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Status::InProgress);
    }

    #[test]
    fn legacy_issue_type_spellings_parse() {
        use std::str::FromStr;
        assert_eq!(IssueType::from_str("sub_task").unwrap(), IssueType::Subtask);
        assert_eq!(IssueType::from_str("SubTask").unwrap(), IssueType::Subtask);
        assert_eq!(IssueType::from_str("draft_task").unwrap(), IssueType::Draft);
    }

    #[test]
    fn priority_out_of_range_rejected() {
        assert!(validate_priority(4).is_ok());
        assert!(validate_priority(5).is_err());
    }

    #[test]
    fn unknown_fields_round_trip_via_overflow_map() {
        let mut issue = Issue::new("dc", "ab12", "Title");
        issue
            .extra
            .insert("future_field".into(), Value::String("kept".into()));
        let json = serde_json::to_string(&issue).unwrap();
        let back: Issue = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.extra.get("future_field"),
            Some(&Value::String("kept".into()))
        );
    }

    #[test]
    fn tombstone_sets_original_type_once() {
        let mut issue = Issue::new("dc", "ab12", "Title");
        issue.status = Status::InProgress;
        issue.issue_type = IssueType::Bug;
        let now = chrono::Utc::now().fixed_offset();
        issue.tombstone(Some("obsolete".into()), Some("alice".into()), now);
        assert_eq!(issue.status, Status::Tombstone);
        assert_eq!(issue.original_type, Some("bug".into()));
        assert_eq!(issue.deleted_by.as_deref(), Some("alice"));
    }
}
