//! Command implementations backing the `dcat` subcommands.
//!
//! Each function opens the store rooted at the current directory, does one
//! thing, and prints either human-readable or `--json` output. Mutating
//! commands read the current user from `$DCAT_USER` (falling back to the
//! OS username, then `None`) so events carry an attribution without
//! requiring a flag on every call.

use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use dogcat_core::{Config, DependencyType, Issue, Status, Store};
use std::env;
use std::path::{Path, PathBuf};

fn current_user() -> Option<String> {
    env::var("DCAT_USER")
        .ok()
        .or_else(|| env::var("USER").ok())
        .or_else(|| env::var("USERNAME").ok())
}

fn project_root() -> Result<PathBuf> {
    env::current_dir().context("reading current directory")
}

fn open_store() -> Result<Store> {
    let root = project_root()?;
    let dogcats_dir = Store::find_root(&root)?;
    let config = Config::load(&dogcats_dir.join("config.toml"))?;
    Ok(Store::open(dogcats_dir, config.namespace)?)
}

fn open_inbox() -> Result<dogcat_core::InboxStore> {
    let root = project_root()?;
    let dogcats_dir = Store::find_root(&root)?;
    let config = Config::load(&dogcats_dir.join("config.toml"))?;
    Ok(dogcat_core::InboxStore::open(dogcats_dir, config.namespace)?)
}

fn resolve(store: &Store, partial: &str) -> Result<String> {
    store
        .resolve_id(partial)?
        .ok_or_else(|| anyhow!("no issue matches '{partial}'"))
}

fn status_colored(status: Status) -> colored::ColoredString {
    match status {
        Status::Open => "open".white(),
        Status::InProgress => "in_progress".yellow(),
        Status::InReview => "in_review".yellow(),
        Status::Blocked => "blocked".red(),
        Status::Deferred => "deferred".dimmed(),
        Status::Closed => "closed".green(),
        Status::Tombstone => "tombstone".dimmed(),
    }
}

fn print_issue_line(issue: &Issue) {
    println!(
        "{} [P{}] [{}] {} - {}",
        issue.full_id().cyan(),
        issue.priority,
        issue.issue_type.to_string().blue(),
        status_colored(issue.status),
        issue.title
    );
}

// ---- Lifecycle ----------------------------------------------------------

pub fn init(namespace: Option<String>) -> Result<()> {
    let root = project_root()?;
    let namespace = namespace.unwrap_or_else(|| Config::namespace_from_dir(&root));
    Store::init(&root, &namespace)?;
    println!("{} initialized .dogcats/ with namespace '{}'", "✓".green(), namespace);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn create(
    title: &str,
    issue_type: &str,
    priority: u8,
    description: Option<String>,
    parent: Option<String>,
    owner: Option<String>,
    labels: Option<String>,
    json: bool,
) -> Result<()> {
    let mut store = open_store()?;
    let by = current_user();

    let issue_type: dogcat_core::IssueType = issue_type.parse()?;
    dogcat_core::issue::validate_priority(priority)?;

    let parent_full = parent.map(|p| resolve(&store, &p)).transpose()?;

    let mut issue = store.create(title.to_string(), by.clone())?;

    let mut patch = serde_json::Map::new();
    patch.insert("issue_type".into(), serde_json::Value::String(issue_type.to_string()));
    patch.insert("priority".into(), serde_json::Value::from(priority));
    if let Some(d) = description {
        patch.insert("description".into(), serde_json::Value::String(d));
    }
    if let Some(p) = parent_full {
        patch.insert("parent".into(), serde_json::Value::String(p));
    }
    if let Some(o) = owner {
        patch.insert("owner".into(), serde_json::Value::String(o));
    }
    if let Some(l) = labels {
        let list: Vec<serde_json::Value> = l.split(',').map(|s| serde_json::Value::String(s.trim().to_string())).collect();
        patch.insert("labels".into(), serde_json::Value::Array(list));
    }
    if !patch.is_empty() {
        issue = store.update(&issue.full_id(), patch, by)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&issue)?);
    } else {
        println!("{} created {}", "✓".green(), issue.full_id().cyan().bold());
        print_issue_line(&issue);
    }
    Ok(())
}

pub fn list(status: Option<String>, issue_type: Option<String>, all: bool, json: bool) -> Result<()> {
    let store = open_store()?;
    let status: Option<Status> = status.map(|s| s.parse()).transpose()?;
    let issue_type: Option<dogcat_core::IssueType> = issue_type.map(|t| t.parse()).transpose()?;

    let mut issues = store.list(all);
    issues.retain(|i| status.map(|s| i.status == s).unwrap_or(true));
    issues.retain(|i| issue_type.map(|t| i.issue_type == t).unwrap_or(true));
    issues.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.full_id().cmp(&b.full_id())));

    if json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
        return Ok(());
    }

    if issues.is_empty() {
        println!("no issues found");
        return Ok(());
    }
    for issue in issues {
        print_issue_line(issue);
    }
    Ok(())
}

pub fn show(id: &str, json: bool) -> Result<()> {
    let store = open_store()?;
    let full_id = resolve(&store, id)?;
    let issue = store.get(&full_id).ok_or_else(|| anyhow!("no issue '{full_id}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(issue)?);
        return Ok(());
    }

    println!("{}", issue.full_id().cyan().bold());
    println!("  title:    {}", issue.title);
    println!("  status:   {}", status_colored(issue.status));
    println!("  priority: P{}", issue.priority);
    println!("  type:     {}", issue.issue_type.to_string().blue());
    if let Some(owner) = &issue.owner {
        println!("  owner:    {owner}");
    }
    if let Some(parent) = &issue.parent {
        println!("  parent:   {parent}");
    }
    if !issue.labels.is_empty() {
        println!("  labels:   {}", issue.labels.join(", "));
    }
    if let Some(description) = &issue.description {
        println!("\n{description}");
    }

    let deps = store.get_dependencies(&full_id);
    if !deps.is_empty() {
        println!("\n{}", "dependencies:".bold());
        for dep in deps {
            println!("  {} {} {}", dep.dep_type, "->".dimmed(), dep.depends_on_id);
        }
    }
    let links = store.get_links(&full_id);
    if !links.is_empty() {
        println!("\n{}", "links:".bold());
        for link in links {
            println!("  {} {} {}", link.link_type, "->".dimmed(), link.to_id);
        }
    }
    let children = store.get_children(&full_id);
    if !children.is_empty() {
        println!("\n{}", "children:".bold());
        for child in children {
            print_issue_line(child);
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn update(
    id: &str,
    title: Option<String>,
    status: Option<String>,
    issue_type: Option<String>,
    priority: Option<u8>,
    description: Option<String>,
    owner: Option<String>,
    parent: Option<String>,
    json: bool,
) -> Result<()> {
    let mut store = open_store()?;
    let full_id = resolve(&store, id)?;
    let by = current_user();

    let mut patch = serde_json::Map::new();
    if let Some(t) = title {
        patch.insert("title".into(), serde_json::Value::String(t));
    }
    if let Some(s) = status {
        patch.insert("status".into(), serde_json::Value::String(s));
    }
    if let Some(t) = issue_type {
        patch.insert("issue_type".into(), serde_json::Value::String(t));
    }
    if let Some(p) = priority {
        patch.insert("priority".into(), serde_json::Value::from(p));
    }
    if let Some(d) = description {
        patch.insert("description".into(), serde_json::Value::String(d));
    }
    if let Some(o) = owner {
        patch.insert("owner".into(), serde_json::Value::String(o));
    }
    if let Some(p) = parent {
        let resolved = resolve(&store, &p)?;
        patch.insert("parent".into(), serde_json::Value::String(resolved));
    }

    if patch.is_empty() {
        bail!("no fields given to update");
    }

    let issue = store.update(&full_id, patch, by)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&issue)?);
    } else {
        println!("{} updated {}", "✓".green(), issue.full_id().cyan());
        print_issue_line(&issue);
    }
    Ok(())
}

pub fn close(id: &str, reason: Option<String>, json: bool) -> Result<()> {
    let mut store = open_store()?;
    let full_id = resolve(&store, id)?;
    let issue = store.close(&full_id, reason, current_user())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&issue)?);
    } else {
        println!("{} closed {}", "✓".green(), issue.full_id().cyan());
    }
    Ok(())
}

pub fn delete(id: &str, reason: Option<String>, json: bool) -> Result<()> {
    let mut store = open_store()?;
    let full_id = resolve(&store, id)?;
    let issue = store.delete(&full_id, reason, current_user())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&issue)?);
    } else {
        println!("{} deleted {}", "✓".green(), issue.full_id().cyan());
    }
    Ok(())
}

pub fn prune() -> Result<()> {
    let mut store = open_store()?;
    let removed = store.prune_tombstones()?;
    println!("{} pruned {} tombstoned issue(s)", "✓".green(), removed);
    Ok(())
}

// ---- Graph ----------------------------------------------------------

pub fn ready(json: bool) -> Result<()> {
    let store = open_store()?;
    let issues = store.get_ready_work();
    if json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
        return Ok(());
    }
    if issues.is_empty() {
        println!("no ready work");
        return Ok(());
    }
    for issue in issues {
        print_issue_line(issue);
    }
    Ok(())
}

pub fn blocked(json: bool) -> Result<()> {
    let store = open_store()?;
    let pairs = store.get_blocked_issues();

    if json {
        #[derive(serde::Serialize)]
        struct BlockedEntry<'a> {
            issue: &'a Issue,
            blockers: Vec<&'a Issue>,
        }
        let out: Vec<BlockedEntry> = pairs.iter().map(|(i, b)| BlockedEntry { issue: i, blockers: b.clone() }).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if pairs.is_empty() {
        println!("no blocked issues");
        return Ok(());
    }
    for (issue, blockers) in pairs {
        print_issue_line(issue);
        for blocker in blockers {
            println!("  {} {}", "blocked by".red(), blocker.full_id());
        }
    }
    Ok(())
}

pub fn dep_add(id: &str, depends_on: &str, dep_type: &str, json: bool) -> Result<()> {
    let mut store = open_store()?;
    let issue_id = resolve(&store, id)?;
    let depends_on_id = resolve(&store, depends_on)?;
    let dep_type: DependencyType = dep_type.parse()?;
    let dep = store.add_dependency(&issue_id, &depends_on_id, dep_type, current_user())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&dep)?);
    } else {
        println!("{} {} {} {} {}", "✓".green(), issue_id.cyan(), dep.dep_type, "->".dimmed(), depends_on_id.cyan());
    }
    Ok(())
}

pub fn dep_rm(id: &str, depends_on: &str) -> Result<()> {
    let mut store = open_store()?;
    let issue_id = resolve(&store, id)?;
    let depends_on_id = resolve(&store, depends_on)?;
    store.remove_dependency(&issue_id, &depends_on_id, current_user())?;
    println!("{} removed dependency {} -> {}", "✓".green(), issue_id.cyan(), depends_on_id.cyan());
    Ok(())
}

pub fn dep_tree(id: &str, json: bool) -> Result<()> {
    let store = open_store()?;
    let full_id = resolve(&store, id)?;
    let chain = store.get_dependency_chain(&full_id);
    if json {
        println!("{}", serde_json::to_string_pretty(&chain)?);
        return Ok(());
    }
    if chain.is_empty() {
        println!("{full_id} has no blocking dependencies");
        return Ok(());
    }
    for dep_id in chain {
        println!("  {dep_id}");
    }
    Ok(())
}

pub fn link_add(from: &str, to: &str, link_type: Option<String>, json: bool) -> Result<()> {
    let mut store = open_store()?;
    let from_id = resolve(&store, from)?;
    let to_id = resolve(&store, to)?;
    let link = store.add_link(&from_id, &to_id, link_type, current_user())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&link)?);
    } else {
        println!("{} {} {} {} {}", "✓".green(), from_id.cyan(), link.link_type, "->".dimmed(), to_id.cyan());
    }
    Ok(())
}

pub fn link_rm(from: &str, to: &str) -> Result<()> {
    let mut store = open_store()?;
    let from_id = resolve(&store, from)?;
    let to_id = resolve(&store, to)?;
    store.remove_link(&from_id, &to_id, current_user())?;
    println!("{} removed link {} -> {}", "✓".green(), from_id.cyan(), to_id.cyan());
    Ok(())
}

// ---- Inbox ----------------------------------------------------------

pub fn inbox_propose(title: &str, description: Option<String>, by: Option<String>, json: bool) -> Result<()> {
    let mut inbox = open_inbox()?;
    let proposed_by = by.or_else(current_user);
    let proposal = inbox.create(title.to_string(), proposed_by, None, description)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&proposal)?);
    } else {
        println!("{} proposed {}", "✓".green(), proposal.full_id().cyan());
    }
    Ok(())
}

pub fn inbox_list(all: bool, json: bool) -> Result<()> {
    let inbox = open_inbox()?;
    let mut proposals = inbox.list(all);
    proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    if json {
        println!("{}", serde_json::to_string_pretty(&proposals)?);
        return Ok(());
    }
    if proposals.is_empty() {
        println!("inbox is empty");
        return Ok(());
    }
    for proposal in proposals {
        println!("{} [{}] {}", proposal.full_id().cyan(), proposal.status, proposal.title);
    }
    Ok(())
}

pub fn inbox_close(id: &str, reason: Option<String>, resolved_issue: Option<String>, json: bool) -> Result<()> {
    let mut inbox = open_inbox()?;
    let full_id = inbox.resolve_id(id)?.ok_or_else(|| anyhow!("no proposal matches '{id}'"))?;
    let proposal = inbox.close(&full_id, reason, current_user(), resolved_issue)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&proposal)?);
    } else {
        println!("{} closed {}", "✓".green(), proposal.full_id().cyan());
    }
    Ok(())
}

pub fn inbox_delete(id: &str) -> Result<()> {
    let mut inbox = open_inbox()?;
    let full_id = inbox.resolve_id(id)?.ok_or_else(|| anyhow!("no proposal matches '{id}'"))?;
    let proposal = inbox.delete(&full_id, current_user())?;
    println!("{} deleted {}", "✓".green(), proposal.full_id().cyan());
    Ok(())
}

// ---- Doctor / merge-driver / config ----------------------------------------------------------

#[derive(serde::Serialize)]
struct CheckResult {
    passed: bool,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fix: Option<&'static str>,
}

/// The named checks `doctor` reports, in spec order, and the substring used
/// to decide whether a given `Finding`'s message belongs to that check.
const CHECKS: &[(&str, &str, &str, Option<&str>)] = &[
    ("no_empty_titles", "empty title", "every issue has a non-blank title", Some("set a title with `dcat update <id> --title ...`")),
    ("priority_range", "priority", "every issue's priority is in range 0..=4", Some("set a valid priority with `dcat update <id> --priority ...`")),
    ("parent_references", "dangling parent", "every issue's parent reference resolves to an existing issue", Some("clear or fix the parent with `dcat update <id> --parent ...`")),
    ("dependency_references", "dependency", "every dependency edge references existing issues", Some("remove the dangling edge with `dcat dep rm`")),
    ("link_references", "link", "every link edge references existing issues", Some("remove the dangling edge with `dcat link rm`")),
    ("event_references", "event references", "every event in the audit trail references an existing issue", None),
    ("no_blocking_cycles", "cycle", "the blocks-dependency graph is acyclic", Some("remove one edge in the cycle with `dcat dep rm`")),
];

fn check_passed(findings: &[dogcat_core::validator::Finding], needle: &str) -> bool {
    !findings.iter().any(|f| f.message.contains(needle))
}

pub fn doctor(fix: bool, json: bool) -> Result<()> {
    let mut store = open_store()?;
    let findings = store_findings(&store);

    if fix && findings.iter().any(|f| f.message.contains("tombstone")) {
        store.prune_tombstones()?;
    }

    let has_errors = findings.iter().any(|f| f.level == dogcat_core::validator::Level::Error);
    let status = if has_errors || !findings.is_empty() { "issues_found" } else { "ok" };

    if json {
        let checks: std::collections::BTreeMap<&'static str, CheckResult> = CHECKS
            .iter()
            .map(|&(name, needle, description, remedy)| {
                let passed = check_passed(&findings, needle);
                (name, CheckResult { passed, description, fix: if passed { None } else { remedy } })
            })
            .collect();

        #[derive(serde::Serialize)]
        struct DoctorReport {
            status: &'static str,
            checks: std::collections::BTreeMap<&'static str, CheckResult>,
            validation_details: Vec<dogcat_core::validator::Finding>,
            concurrent_edits: Vec<dogcat_core::validator::ConcurrentEdit>,
        }
        let report = DoctorReport {
            status,
            checks,
            validation_details: findings,
            concurrent_edits: Vec::new(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if findings.is_empty() {
        println!("{} database is healthy", "✓".green());
        return Ok(());
    }
    for finding in &findings {
        let prefix = match finding.level {
            dogcat_core::validator::Level::Error => "error".red(),
            dogcat_core::validator::Level::Warning => "warning".yellow(),
        };
        println!("[{prefix}] {}", finding.message);
    }
    if has_errors {
        std::process::exit(1);
    }
    Ok(())
}

fn store_findings(store: &Store) -> Vec<dogcat_core::validator::Finding> {
    let issues: std::collections::HashMap<String, Issue> = store
        .list(true)
        .into_iter()
        .map(|i| (i.full_id(), i.clone()))
        .collect();
    let deps: Vec<_> = issues
        .keys()
        .flat_map(|id| store.get_dependencies(id))
        .cloned()
        .collect();
    let links: Vec<_> = issues
        .keys()
        .flat_map(|id| store.get_links(id))
        .cloned()
        .collect();
    dogcat_core::validator::validate(&issues, &deps, &links, &[])
}

pub fn merge_driver(base: &str, ours: &str, theirs: &str) -> Result<()> {
    let result = dogcat_core::merge::run_merge_driver(Path::new(base), Path::new(ours), Path::new(theirs));
    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("merge-driver failed: {e}");
            std::process::exit(1);
        }
    }
}

pub fn config_show(json: bool) -> Result<()> {
    let root = project_root()?;
    let dogcats_dir = Store::find_root(&root)?;
    let config = Config::load(&dogcats_dir.join("config.toml"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("namespace:          {}", config.namespace);
        println!("git_tracking:       {}", config.git_tracking);
        if let Some(visible) = &config.visible_namespaces {
            println!("visible_namespaces: {}", visible.join(", "));
        }
        if !config.hidden_namespaces.is_empty() {
            println!("hidden_namespaces:  {}", config.hidden_namespaces.join(", "));
        }
    }
    Ok(())
}
