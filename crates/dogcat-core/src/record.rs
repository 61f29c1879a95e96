//! The record sum type and its version-tolerant line codec.

use crate::dependency::{Dependency, Link};
use crate::event::Event;
use crate::issue::Issue;
use crate::proposal::Proposal;
use crate::{Error, Result};
use serde_json::Value;

/// Provenance tag written on encode, ignored on decode.
pub const DCAT_VERSION: &str = "1";

#[derive(Debug, Clone)]
pub enum Record {
    Issue(Issue),
    Dependency(Dependency),
    Link(Link),
    Event(Event),
    Proposal(Proposal),
    /// A syntactically valid JSON object of a kind we don't model.
    /// Passed through untouched by the merge engine.
    Unknown(Value),
}

impl Record {
    /// Decode one JSONL line. `line_no` is 1-based, used for error context.
    pub fn decode_line(line: &str, line_no: usize) -> Result<Self> {
        let mut value: Value = serde_json::from_str(line).map_err(|e| Error::MalformedRecord {
            line: line_no,
            message: e.to_string(),
        })?;

        let record_type = value.get("record_type").and_then(Value::as_str).map(str::to_string);

        let kind = record_type.unwrap_or_else(|| classify_heuristically(&value));

        apply_legacy_fixups(&mut value);

        let record = match kind.as_str() {
            "issue" => Record::Issue(serde_json::from_value(value).map_err(|e| Error::MalformedRecord {
                line: line_no,
                message: e.to_string(),
            })?),
            "dependency" => Record::Dependency(serde_json::from_value(value).map_err(|e| Error::MalformedRecord {
                line: line_no,
                message: e.to_string(),
            })?),
            "link" => Record::Link(serde_json::from_value(value).map_err(|e| Error::MalformedRecord {
                line: line_no,
                message: e.to_string(),
            })?),
            "event" => Record::Event(serde_json::from_value(value).map_err(|e| Error::MalformedRecord {
                line: line_no,
                message: e.to_string(),
            })?),
            "proposal" => Record::Proposal(serde_json::from_value(value).map_err(|e| Error::MalformedRecord {
                line: line_no,
                message: e.to_string(),
            })?),
            _ => Record::Unknown(value),
        };

        Ok(record)
    }

    /// Encode this record to a single JSON line, tagging `record_type` and
    /// `dcat_version`. Returns a line with no trailing newline.
    pub fn encode(&self) -> Result<String> {
        let (kind, mut value) = match self {
            Record::Issue(i) => ("issue", serde_json::to_value(i)?),
            Record::Dependency(d) => ("dependency", serde_json::to_value(d)?),
            Record::Link(l) => ("link", serde_json::to_value(l)?),
            Record::Event(e) => ("event", serde_json::to_value(e)?),
            Record::Proposal(p) => ("proposal", serde_json::to_value(p)?),
            Record::Unknown(v) => {
                let line = serde_json::to_string(v)?;
                return Ok(line);
            }
        };

        if let Value::Object(ref mut map) = value {
            map.insert("record_type".into(), Value::String(kind.into()));
            map.insert("dcat_version".into(), Value::String(DCAT_VERSION.into()));
        }

        Ok(serde_json::to_string(&value)?)
    }

    pub fn is_event(&self) -> bool {
        matches!(self, Record::Event(_))
    }
}

/// `record_type` absent: classify by telltale field presence, per the
/// decoder's fallback heuristic.
fn classify_heuristically(value: &Value) -> String {
    let has = |k: &str| value.get(k).is_some();
    if has("from_id") && has("to_id") {
        "link".to_string()
    } else if has("issue_id") && has("depends_on_id") {
        "dependency".to_string()
    } else if has("event_type") {
        "event".to_string()
    } else if has("proposed_by") || has("source_repo") {
        "proposal".to_string()
    } else {
        "issue".to_string()
    }
}

/// Apply the version-tolerant fixups described for issue-shaped records:
/// combined-id splitting and notes-embedded close-reason extraction.
fn apply_legacy_fixups(value: &mut Value) {
    let Value::Object(map) = value else { return };

    if !map.contains_key("namespace") {
        if let Some(id) = map.get("id").and_then(Value::as_str) {
            if let Some((ns, short)) = crate::id::split_full_id(id) {
                let ns = ns.to_string();
                let short = short.to_string();
                map.insert("namespace".into(), Value::String(ns));
                map.insert("id".into(), Value::String(short));
            }
        }
    }

    if !map.contains_key("close_reason") {
        if let Some(notes) = map.get("notes").and_then(Value::as_str) {
            if let Some(pos) = notes.find("\n\nClosed: ") {
                let reason = notes[pos + "\n\nClosed: ".len()..].trim().to_string();
                let remaining = notes[..pos].to_string();
                map.insert("close_reason".into(), Value::String(reason));
                if remaining.is_empty() {
                    map.remove("notes");
                } else {
                    map.insert("notes".into(), Value::String(remaining));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_dispatch_classifies_link_over_dependency() {
        let line = r#"{"from_id":"dc-a","to_id":"dc-b","link_type":"relates_to","created_at":"2026-01-01T00:00:00+00:00"}"#;
        let record = Record::decode_line(line, 1).unwrap();
        assert!(matches!(record, Record::Link(_)));
    }

    #[test]
    fn heuristic_dispatch_classifies_dependency() {
        let line = r#"{"issue_id":"dc-a","depends_on_id":"dc-b","type":"blocks","created_at":"2026-01-01T00:00:00+00:00"}"#;
        let record = Record::decode_line(line, 1).unwrap();
        assert!(matches!(record, Record::Dependency(_)));
    }

    #[test]
    fn heuristic_dispatch_falls_back_to_issue() {
        let line = r#"{"namespace":"dc","id":"abcd","title":"T","status":"open","created_at":"2026-01-01T00:00:00+00:00","updated_at":"2026-01-01T00:00:00+00:00"}"#;
        let record = Record::decode_line(line, 1).unwrap();
        assert!(matches!(record, Record::Issue(_)));
    }

    #[test]
    fn combined_id_splits_on_last_hyphen() {
        let line = r#"{"id":"my-project-3hup","title":"T","status":"open","created_at":"2026-01-01T00:00:00+00:00","updated_at":"2026-01-01T00:00:00+00:00"}"#;
        let record = Record::decode_line(line, 1).unwrap();
        match record {
            Record::Issue(issue) => {
                assert_eq!(issue.namespace, "my-project");
                assert_eq!(issue.id, "3hup");
            }
            _ => panic!("expected issue"),
        }
    }

    #[test]
    fn close_reason_extracted_from_notes() {
        let line = r#"{"namespace":"dc","id":"abcd","title":"T","status":"closed","notes":"Some context.\n\nClosed: no longer needed","created_at":"2026-01-01T00:00:00+00:00","updated_at":"2026-01-01T00:00:00+00:00"}"#;
        let record = Record::decode_line(line, 1).unwrap();
        match record {
            Record::Issue(issue) => {
                assert_eq!(issue.close_reason.as_deref(), Some("no longer needed"));
                assert_eq!(issue.notes.as_deref(), Some("Some context."));
            }
            _ => panic!("expected issue"),
        }
    }

    #[test]
    fn close_reason_not_overwritten_if_already_present() {
        let line = r#"{"namespace":"dc","id":"abcd","title":"T","status":"closed","close_reason":"explicit","notes":"ctx\n\nClosed: ignored","created_at":"2026-01-01T00:00:00+00:00","updated_at":"2026-01-01T00:00:00+00:00"}"#;
        let record = Record::decode_line(line, 1).unwrap();
        match record {
            Record::Issue(issue) => {
                assert_eq!(issue.close_reason.as_deref(), Some("explicit"));
                assert!(issue.notes.as_deref().unwrap().contains("Closed: ignored"));
            }
            _ => panic!("expected issue"),
        }
    }

    #[test]
    fn malformed_json_reports_line_number() {
        let err = Record::decode_line("{not json", 42).unwrap_err();
        match err {
            Error::MalformedRecord { line, .. } => assert_eq!(line, 42),
            other => panic!("expected MalformedRecord, got {other:?}"),
        }
    }

    #[test]
    fn encode_tags_record_type_and_version() {
        let issue = Issue::new("dc", "abcd", "Title");
        let record = Record::Issue(issue);
        let line = record.encode().unwrap();
        assert!(line.contains("\"record_type\":\"issue\""));
        assert!(line.contains("\"dcat_version\":\"1\""));
    }
}
