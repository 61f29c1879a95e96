//! dogcat-core: the storage and consistency engine behind `dcat`.
//!
//! A local, git-friendly issue tracker whose entire database is a single
//! append-only JSONL file per project. This crate owns the log format, the
//! compaction/reload discipline, the dependency graph invariants and the
//! three-way merge algorithm; everything else (the CLI, a TUI, import
//! tooling) is a thin collaborator built on top of the API here.

pub mod config;
pub mod dependency;
pub mod error;
pub mod event;
pub mod gitutil;
pub mod graph;
pub mod id;
pub mod inbox;
pub mod issue;
pub mod lockfile;
pub mod merge;
pub mod proposal;
pub mod record;
pub mod store;
pub mod validator;

pub use config::Config;
pub use dependency::{Dependency, DependencyType, Link, RecordOp};
pub use error::{Error, Result};
pub use event::{Event, EventType, FieldChange};
pub use inbox::InboxStore;
pub use issue::{Comment, Issue, IssueType, Status};
pub use proposal::{Proposal, ProposalStatus};
pub use record::Record;
pub use store::Store;
