//! Proposal records: the inbox's parallel, simpler issue-shaped record.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Proposal status. Narrower than `issue::Status` — no `in_progress`,
/// `blocked`, etc.; proposals are triaged, not worked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    #[default]
    Open,
    Closed,
    Tombstone,
}

impl std::str::FromStr for ProposalStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(ProposalStatus::Open),
            "closed" => Ok(ProposalStatus::Closed),
            "tombstone" => Ok(ProposalStatus::Tombstone),
            other => Err(crate::Error::InvalidField {
                field: "status".into(),
                reason: format!("unknown proposal status '{other}'"),
            }),
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProposalStatus::Open => "open",
            ProposalStatus::Closed => "closed",
            ProposalStatus::Tombstone => "tombstone",
        };
        write!(f, "{s}")
    }
}

/// Fields tracked for the proposal event trail (spec-equivalent of
/// `issue::TRACKED_FIELDS`, narrowed to what a proposal actually carries).
pub const TRACKED_PROPOSAL_FIELDS: &[&str] = &["title", "status", "description", "resolved_issue"];

/// An inbox proposal: a lightweight, unconfirmed issue candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub namespace: String,
    pub id: String,

    pub title: String,
    #[serde(default)]
    pub status: ProposalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_repo: Option<String>,

    pub created_at: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Proposal {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
            title: title.into(),
            status: ProposalStatus::Open,
            description: None,
            proposed_by: None,
            source_repo: None,
            created_at: chrono::Utc::now().fixed_offset(),
            closed_at: None,
            closed_by: None,
            close_reason: None,
            resolved_issue: None,
            deleted_at: None,
            deleted_by: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn full_id(&self) -> String {
        format!("{}-inbox-{}", self.namespace, self.id)
    }

    pub fn close(&mut self, reason: Option<String>, by: Option<String>, resolved_issue: Option<String>, at: DateTime<FixedOffset>) {
        self.status = ProposalStatus::Closed;
        self.close_reason = reason;
        self.closed_by = by;
        self.closed_at = Some(at);
        if resolved_issue.is_some() {
            self.resolved_issue = resolved_issue;
        }
    }

    pub fn tombstone(&mut self, by: Option<String>, at: DateTime<FixedOffset>) {
        self.status = ProposalStatus::Tombstone;
        self.deleted_by = by;
        self.deleted_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_id_uses_inbox_marker() {
        let p = Proposal::new("dc", "ab12", "A proposal");
        assert_eq!(p.full_id(), "dc-inbox-ab12");
    }

    #[test]
    fn close_sets_resolved_issue_when_given() {
        let mut p = Proposal::new("dc", "ab12", "A proposal");
        let now = chrono::Utc::now().fixed_offset();
        p.close(Some("done".into()), Some("bob".into()), Some("dc-zz99".into()), now);
        assert_eq!(p.status, ProposalStatus::Closed);
        assert_eq!(p.resolved_issue.as_deref(), Some("dc-zz99"));
    }
}
