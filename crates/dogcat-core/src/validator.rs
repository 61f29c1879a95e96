//! Integrity validator: a pure function over a parsed record list.
//!
//! Grounded on `examples/original_source/tests/test_validate.py`'s semantics:
//! dangling `parent`/dependency/link references are errors, a dangling event
//! reference is a warning, and a `blocks` cycle is an error. Nothing here
//! touches disk or the store directly — it consumes whatever records the
//! caller already loaded, so it composes with both a live `Store` and raw
//! merge-driver input.

use crate::dependency::{Dependency, DependencyType, Link};
use crate::event::Event;
use crate::graph::BlocksGraph;
use crate::issue::Issue;
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Error,
    Warning,
}

/// One validation result. `issue_id` is attached when the finding is
/// scoped to a specific issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub level: Level,
    pub line: usize,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
}

impl Finding {
    fn error(line: usize, message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            line,
            message: message.into(),
            issue_id: None,
        }
    }

    fn warning(line: usize, message: impl Into<String>) -> Self {
        Self {
            level: Level::Warning,
            line,
            message: message.into(),
            issue_id: None,
        }
    }

    fn with_issue(mut self, issue_id: impl Into<String>) -> Self {
        self.issue_id = Some(issue_id.into());
        self
    }
}

/// Concurrent-edit advisory: a field touched on both sides of a merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrentEdit {
    pub issue_id: String,
    pub fields: Vec<String>,
}

/// Validate a fully decoded set of records (as the store already has them
/// in memory). Structural checks run on `issues`; referential checks cross
/// `issues` against `deps`/`links`/`events`; the cycle check runs over
/// `blocks` edges.
pub fn validate(
    issues: &HashMap<String, Issue>,
    deps: &[Dependency],
    links: &[Link],
    events: &[Event],
) -> Vec<Finding> {
    let mut findings = Vec::new();

    for issue in issues.values() {
        if issue.title.trim().is_empty() {
            findings.push(Finding::error(0, format!("issue {} has an empty title", issue.full_id())).with_issue(issue.full_id()));
        }
        if issue.priority > 4 {
            findings.push(
                Finding::error(0, format!("issue {} priority {} out of range 0..=4", issue.full_id(), issue.priority))
                    .with_issue(issue.full_id()),
            );
        }
        if let Some(parent) = &issue.parent {
            if !issues.contains_key(parent) {
                findings.push(
                    Finding::error(0, format!("issue {} has dangling parent {parent}", issue.full_id()))
                        .with_issue(issue.full_id()),
                );
            }
        }
    }

    for dep in deps {
        if dep.is_removal() {
            continue;
        }
        if !issues.contains_key(&dep.issue_id) {
            findings.push(Finding::error(0, format!("dependency references unknown issue {}", dep.issue_id)).with_issue(dep.issue_id.clone()));
        }
        if !issues.contains_key(&dep.depends_on_id) {
            findings.push(
                Finding::error(0, format!("dependency {} references unknown issue {}", dep.issue_id, dep.depends_on_id))
                    .with_issue(dep.issue_id.clone()),
            );
        }
    }

    for link in links {
        if link.is_removal() {
            continue;
        }
        if !issues.contains_key(&link.from_id) {
            findings.push(Finding::error(0, format!("link references unknown issue {}", link.from_id)).with_issue(link.from_id.clone()));
        }
        if !issues.contains_key(&link.to_id) {
            findings.push(Finding::error(0, format!("link {} references unknown issue {}", link.from_id, link.to_id)).with_issue(link.from_id.clone()));
        }
    }

    for event in events {
        if !issues.contains_key(&event.issue_id) {
            findings.push(
                Finding::warning(0, format!("event references unknown issue {}", event.issue_id)).with_issue(event.issue_id.clone()),
            );
        }
    }

    let blocks_deps: Vec<Dependency> = deps
        .iter()
        .filter(|d| d.dep_type == DependencyType::Blocks && !d.is_removal())
        .cloned()
        .collect();
    let graph = BlocksGraph::build(issues, &blocks_deps);
    if graph.has_cycles() {
        findings.push(Finding::error(0, "blocks dependency graph contains a cycle"));
    }

    findings
}

/// Parse raw JSONL lines for validator use, tolerating (but noting) any
/// non-JSON "line" such as a leftover git conflict marker — the validator
/// reports a finding instead of failing outright, since `doctor` must run
/// on whatever is currently on disk, including mid-conflict files.
pub fn parse_for_validation(lines: &[String]) -> (Vec<Record>, Vec<Finding>) {
    let mut records = Vec::new();
    let mut findings = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let line_no = i + 1;
        match Record::decode_line(line, line_no) {
            Ok(record) => records.push(record),
            Err(e) => findings.push(Finding::error(line_no, e.to_string())),
        }
    }
    (records, findings)
}

/// Post-merge concurrent-edit detection (spec §4.5): given the tracked
/// fields each parent side changed relative to the merge base, flag issues
/// both sides touched. `ours_changes`/`theirs_changes` map issue id to the
/// set of changed field names on that side (the caller derives these from
/// `git show <parent>:<path>` diffs against the merge base).
pub fn detect_concurrent_edits(
    ours_changes: &HashMap<String, HashSet<String>>,
    theirs_changes: &HashMap<String, HashSet<String>>,
) -> Vec<ConcurrentEdit> {
    let mut out = Vec::new();
    for (issue_id, our_fields) in ours_changes {
        let Some(their_fields) = theirs_changes.get(issue_id) else {
            continue;
        };
        let mut shared: Vec<String> = our_fields.intersection(their_fields).cloned().collect();
        if shared.is_empty() {
            continue;
        }
        shared.sort();
        out.push(ConcurrentEdit {
            issue_id: issue_id.clone(),
            fields: shared,
        });
    }
    out.sort_by(|a, b| a.issue_id.cmp(&b.issue_id));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::DependencyType;

    fn issue(ns: &str, id: &str) -> Issue {
        Issue::new(ns, id, "T")
    }

    #[test]
    fn dangling_parent_is_an_error() {
        let mut issues = HashMap::new();
        let mut i = issue("dc", "a");
        i.parent = Some("dc-missing".into());
        issues.insert(i.full_id(), i);

        let findings = validate(&issues, &[], &[], &[]);
        assert!(findings.iter().any(|f| matches!(f.level, Level::Error) && f.message.contains("dangling parent")));
    }

    #[test]
    fn valid_parent_produces_no_finding() {
        let mut issues = HashMap::new();
        let parent = issue("dc", "p");
        let mut child = issue("dc", "c");
        child.parent = Some(parent.full_id());
        issues.insert(parent.full_id(), parent);
        issues.insert(child.full_id(), child);

        let findings = validate(&issues, &[], &[], &[]);
        assert!(findings.is_empty());
    }

    #[test]
    fn dangling_dependency_is_an_error() {
        let mut issues = HashMap::new();
        issues.insert("dc-a".into(), issue("dc", "a"));
        let deps = vec![Dependency::new("dc-a", "dc-missing", DependencyType::Related)];

        let findings = validate(&issues, &deps, &[], &[]);
        assert!(findings.iter().any(|f| f.level == Level::Error));
    }

    #[test]
    fn removed_dependency_is_not_flagged() {
        let issues = HashMap::new();
        let dep = Dependency::new("dc-a", "dc-b", DependencyType::Related);
        let deps = vec![dep.removal()];

        let findings = validate(&issues, &deps, &[], &[]);
        assert!(findings.is_empty());
    }

    #[test]
    fn event_for_unknown_issue_is_a_warning_not_an_error() {
        let issues = HashMap::new();
        let events = vec![Event::new(crate::event::EventType::Created, "dc-ghost", None)];
        let findings = validate(&issues, &[], &[], &events);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].level, Level::Warning);
    }

    #[test]
    fn circular_blocks_dependency_is_an_error() {
        let mut issues = HashMap::new();
        issues.insert("dc-a".into(), issue("dc", "a"));
        issues.insert("dc-b".into(), issue("dc", "b"));
        let deps = vec![
            Dependency::new("dc-a", "dc-b", DependencyType::Blocks),
            Dependency::new("dc-b", "dc-a", DependencyType::Blocks),
        ];
        let findings = validate(&issues, &deps, &[], &[]);
        assert!(findings.iter().any(|f| f.message.contains("cycle")));
    }

    #[test]
    fn priority_out_of_range_is_an_error() {
        let mut issues = HashMap::new();
        let mut i = issue("dc", "a");
        i.priority = 9;
        issues.insert(i.full_id(), i);
        let findings = validate(&issues, &[], &[], &[]);
        assert!(findings.iter().any(|f| f.message.contains("priority")));
    }

    #[test]
    fn empty_title_is_an_error() {
        let mut issues = HashMap::new();
        let mut i = issue("dc", "a");
        i.title = "   ".into();
        issues.insert(i.full_id(), i);
        let findings = validate(&issues, &[], &[], &[]);
        assert!(findings.iter().any(|f| f.message.contains("empty title")));
    }

    #[test]
    fn concurrent_edits_require_a_shared_field() {
        let mut ours = HashMap::new();
        ours.insert("dc-a".to_string(), HashSet::from(["title".to_string()]));
        let mut theirs = HashMap::new();
        theirs.insert("dc-a".to_string(), HashSet::from(["title".to_string(), "status".to_string()]));

        let edits = detect_concurrent_edits(&ours, &theirs);
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].issue_id, "dc-a");
        assert_eq!(edits[0].fields, vec!["title".to_string()]);
    }

    #[test]
    fn disjoint_field_edits_are_not_flagged() {
        let mut ours = HashMap::new();
        ours.insert("dc-a".to_string(), HashSet::from(["title".to_string()]));
        let mut theirs = HashMap::new();
        theirs.insert("dc-a".to_string(), HashSet::from(["status".to_string()]));

        let edits = detect_concurrent_edits(&ours, &theirs);
        assert!(edits.is_empty());
    }
}
