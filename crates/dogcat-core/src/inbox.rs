//! The inbox store: same append/compaction discipline as the log store,
//! keyed on proposals rather than issues, in a separate `inbox.jsonl`.
//!
//! Grounded on `examples/original_source/src/dogcat/inbox.py`'s
//! `InboxStorage` (`_file_lock`, `_append`, `_save`, `close`/`delete`/
//! `prune_tombstones`). Proposals are flat: no graph operations.

use crate::lockfile::LockGuard;
use crate::proposal::{Proposal, ProposalStatus};
use crate::record::Record;
use crate::{id, Error, Result};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const INBOX_FILE: &str = "inbox.jsonl";
const LOCK_FILE: &str = ".issues.lock";
const COMPACTION_MIN_BASE: usize = 20;

/// An append-only JSONL store of proposals, sharing the `.issues.lock`
/// lock file with the main log store in the same `.dogcats` directory.
pub struct InboxStore {
    root: PathBuf,
    namespace: String,
    proposals: HashMap<String, Proposal>,
    needs_compaction: bool,
    lines_on_disk: usize,
}

impl InboxStore {
    pub fn open(dogcats_dir: PathBuf, namespace: String) -> Result<Self> {
        let mut store = Self {
            root: dogcats_dir,
            namespace,
            proposals: HashMap::new(),
            needs_compaction: false,
            lines_on_disk: 0,
        };
        store.reload()?;
        Ok(store)
    }

    pub fn inbox_path(&self) -> PathBuf {
        self.root.join(INBOX_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn reload(&mut self) -> Result<()> {
        self.proposals.clear();
        self.needs_compaction = false;

        let path = self.inbox_path();
        if !path.exists() {
            self.lines_on_disk = 0;
            return Ok(());
        }

        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        self.lines_on_disk = lines.len();

        for (i, line) in lines.iter().enumerate() {
            let line_no = i + 1;
            let is_last = i == lines.len() - 1;
            match Record::decode_line(line, line_no) {
                Ok(Record::Proposal(proposal)) => {
                    self.proposals.insert(proposal.full_id(), proposal);
                }
                Ok(_) => {
                    // A stray issue/dep/link/event line in the inbox file is
                    // tolerated and simply not indexed, same as the log
                    // store tolerates a stray proposal.
                    self.needs_compaction = true;
                }
                Err(e) if is_last => {
                    tracing::warn!(line = line_no, error = %e, "tolerating torn final line on inbox reload");
                    self.needs_compaction = true;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    fn append(&mut self, records: Vec<Record>) -> Result<()> {
        if self.needs_compaction || self.should_adaptive_compact() {
            self.compact()?;
        }

        let mut buffer = String::new();
        for record in &records {
            buffer.push_str(&record.encode()?);
            buffer.push('\n');
        }

        let _lock = LockGuard::acquire(&self.lock_path())?;

        let path = self.inbox_path();
        let needs_heal = path.exists() && path.metadata()?.len() > 0 && !file_ends_with_newline(&path)?;
        if needs_heal {
            buffer.insert(0, '\n');
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(buffer.as_bytes())?;
        file.flush()?;
        file.sync_all()?;

        self.lines_on_disk += records.len();
        Ok(())
    }

    fn should_adaptive_compact(&self) -> bool {
        if !crate::gitutil::is_on_default_branch(self.root.parent().unwrap_or(&self.root)) {
            return false;
        }
        self.lines_on_disk >= COMPACTION_MIN_BASE && self.lines_on_disk > self.proposals.len() * 2
    }

    pub fn compact(&mut self) -> Result<()> {
        let _lock = LockGuard::acquire(&self.lock_path())?;

        let tmp_path = self.root.join(format!(".{INBOX_FILE}.tmp"));
        let mut tmp = fs::File::create(&tmp_path)?;

        let mut count = 0usize;
        for proposal in self.proposals.values() {
            writeln!(tmp, "{}", Record::Proposal(proposal.clone()).encode()?)?;
            count += 1;
        }

        tmp.flush()?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, self.inbox_path())?;
        self.lines_on_disk = count;
        self.needs_compaction = false;
        Ok(())
    }

    pub fn prune_tombstones(&mut self) -> Result<usize> {
        let removed: Vec<String> = self
            .proposals
            .iter()
            .filter(|(_, p)| p.status == ProposalStatus::Tombstone)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &removed {
            self.proposals.remove(id);
        }
        self.compact()?;
        Ok(removed.len())
    }

    // ---- Queries ------------------------------------------------------

    pub fn get(&self, full_id: &str) -> Option<&Proposal> {
        self.proposals.get(full_id)
    }

    pub fn list(&self, include_tombstones: bool) -> Vec<&Proposal> {
        self.proposals
            .values()
            .filter(|p| include_tombstones || p.status != ProposalStatus::Tombstone)
            .collect()
    }

    pub fn resolve_id(&self, partial: &str) -> Result<Option<String>> {
        if self.proposals.contains_key(partial) {
            return Ok(Some(partial.to_string()));
        }
        let suffix = format!("-{partial}");
        let mut matches: Vec<&String> = self
            .proposals
            .keys()
            .filter(|id| id.ends_with(&suffix) || id.rsplit('-').next() == Some(partial))
            .collect();
        matches.sort();
        matches.dedup();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches[0].clone())),
            _ => Err(Error::AmbiguousId {
                partial: partial.to_string(),
                candidates: matches.into_iter().take(5).cloned().collect(),
            }),
        }
    }

    // ---- Mutations ------------------------------------------------------

    pub fn create(&mut self, title: String, proposed_by: Option<String>, source_repo: Option<String>, description: Option<String>) -> Result<Proposal> {
        let full = id::generate_proposal_id(&self.namespace);
        let short_id = full
            .strip_prefix(&format!("{}-inbox-", self.namespace))
            .expect("generated proposal id always carries the inbox marker")
            .to_string();

        let mut proposal = Proposal::new(self.namespace.clone(), short_id, title);
        proposal.proposed_by = proposed_by;
        proposal.source_repo = source_repo;
        proposal.description = description;

        if self.proposals.contains_key(&proposal.full_id()) {
            return Err(Error::DuplicateId(proposal.full_id()));
        }

        self.proposals.insert(proposal.full_id(), proposal.clone());
        self.append(vec![Record::Proposal(proposal.clone())])?;
        Ok(proposal)
    }

    pub fn close(&mut self, full_id: &str, reason: Option<String>, closed_by: Option<String>, resolved_issue: Option<String>) -> Result<Proposal> {
        let mut proposal = self.proposals.get(full_id).cloned().ok_or_else(|| Error::NotFound(full_id.to_string()))?;
        let now = chrono::Utc::now().fixed_offset();
        proposal.close(reason, closed_by, resolved_issue, now);
        self.proposals.insert(full_id.to_string(), proposal.clone());
        self.append(vec![Record::Proposal(proposal.clone())])?;
        Ok(proposal)
    }

    pub fn delete(&mut self, full_id: &str, deleted_by: Option<String>) -> Result<Proposal> {
        let mut proposal = self.proposals.get(full_id).cloned().ok_or_else(|| Error::NotFound(full_id.to_string()))?;
        let now = chrono::Utc::now().fixed_offset();
        proposal.tombstone(deleted_by, now);
        self.proposals.insert(full_id.to_string(), proposal.clone());
        self.append(vec![Record::Proposal(proposal.clone())])?;
        Ok(proposal)
    }
}

fn file_ends_with_newline(path: &Path) -> Result<bool> {
    let mut file = fs::File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    let mut last_byte = [0u8; 1];
    use std::io::Seek;
    file.seek(std::io::SeekFrom::End(-1))?;
    file.read_exact(&mut last_byte)?;
    Ok(last_byte[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, InboxStore) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path()).unwrap();
        let store = InboxStore::open(dir.path().to_path_buf(), "dc".into()).unwrap();
        (dir, store)
    }

    #[test]
    fn create_and_get_round_trips() {
        let (_dir, mut store) = open_temp();
        let proposal = store.create("Idea".into(), Some("alice".into()), None, Some("details".into())).unwrap();
        let fetched = store.get(&proposal.full_id()).unwrap();
        assert_eq!(fetched.title, "Idea");
        assert_eq!(fetched.description.as_deref(), Some("details"));
        assert!(proposal.full_id().contains("-inbox-"));
    }

    #[test]
    fn reload_sees_appended_proposal() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = InboxStore::open(dir.path().to_path_buf(), "dc".into()).unwrap();
        let proposal = store.create("Idea".into(), None, None, None).unwrap();

        let reopened = InboxStore::open(dir.path().to_path_buf(), "dc".into()).unwrap();
        assert!(reopened.get(&proposal.full_id()).is_some());
    }

    #[test]
    fn close_records_resolved_issue() {
        let (_dir, mut store) = open_temp();
        let proposal = store.create("Idea".into(), None, None, None).unwrap();
        let closed = store
            .close(&proposal.full_id(), Some("done".into()), Some("bob".into()), Some("dc-zz99".into()))
            .unwrap();
        assert_eq!(closed.status, ProposalStatus::Closed);
        assert_eq!(closed.resolved_issue.as_deref(), Some("dc-zz99"));
    }

    #[test]
    fn prune_tombstones_removes_deleted() {
        let (_dir, mut store) = open_temp();
        let proposal = store.create("Idea".into(), None, None, None).unwrap();
        store.delete(&proposal.full_id(), None).unwrap();
        let removed = store.prune_tombstones().unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(&proposal.full_id()).is_none());
    }

    #[test]
    fn list_excludes_tombstones_by_default() {
        let (_dir, mut store) = open_temp();
        let proposal = store.create("Idea".into(), None, None, None).unwrap();
        store.delete(&proposal.full_id(), None).unwrap();
        assert!(store.list(false).is_empty());
        assert_eq!(store.list(true).len(), 1);
    }
}
