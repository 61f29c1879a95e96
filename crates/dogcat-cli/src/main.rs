//! dcat - a local, git-friendly issue tracker
//!
//! No daemon, no SQLite - just an append-only JSONL log in `.dogcats/`.
//! This binary is a thin mapping onto `dogcat-core`'s storage API; it also
//! doubles as the git merge driver and the `doctor` validator surface.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "dcat")]
#[command(about = "A local, git-friendly issue tracker backed by append-only JSONL")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new dogcat database in .dogcats/
    Init {
        /// Primary namespace for new records
        #[arg(long)]
        namespace: Option<String>,
    },

    /// Create a new issue
    Create {
        /// Issue title
        title: String,

        /// Issue type (task, bug, feature, story, chore, epic, subtask, question, draft)
        #[arg(short = 't', long = "type", default_value = "task")]
        issue_type: String,

        /// Priority (0=critical .. 4=backlog)
        #[arg(short, long, default_value = "2")]
        priority: u8,

        /// Description
        #[arg(short, long)]
        description: Option<String>,

        /// Parent issue id
        #[arg(long)]
        parent: Option<String>,

        /// Owner
        #[arg(long)]
        owner: Option<String>,

        /// Comma-separated labels
        #[arg(long)]
        labels: Option<String>,
    },

    /// List issues
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by type
        #[arg(short = 't', long = "type")]
        issue_type: Option<String>,

        /// Show all, including closed and tombstoned issues
        #[arg(short, long)]
        all: bool,
    },

    /// Show issue details
    Show {
        /// Issue id, or a unique suffix of one
        id: String,
    },

    /// Update an issue
    Update {
        /// Issue id, or a unique suffix of one
        id: String,

        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(short, long = "type")]
        issue_type: Option<String>,
        #[arg(short, long)]
        priority: Option<u8>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        parent: Option<String>,
    },

    /// Close an issue
    Close {
        id: String,
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Tombstone (soft-delete) an issue
    Delete {
        id: String,
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Permanently remove tombstoned issues from the log
    Prune,

    /// Show ready (unblocked) work
    Ready,

    /// Show blocked issues and their open blockers
    Blocked,

    /// Manage dependencies between issues
    Dep {
        #[command(subcommand)]
        command: DepCommands,
    },

    /// Manage non-blocking links between issues
    Link {
        #[command(subcommand)]
        command: LinkCommands,
    },

    /// Manage inbox proposals
    Inbox {
        #[command(subcommand)]
        command: InboxCommands,
    },

    /// Diagnose database health (structural and referential integrity)
    Doctor {
        /// Attempt to automatically fix what can be fixed
        #[arg(long)]
        fix: bool,
    },

    /// Git merge driver entry point: <cmd> %O %A %B
    #[command(name = "merge-driver", hide = true)]
    MergeDriver {
        base: String,
        ours: String,
        theirs: String,
    },

    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
enum DepCommands {
    /// Add a dependency (default type: blocks)
    Add {
        id: String,
        depends_on: String,
        #[arg(short = 't', long = "type", default_value = "blocks")]
        dep_type: String,
    },
    /// Remove a dependency
    Rm { id: String, depends_on: String },
    /// Show the blocks-dependency chain reachable from an issue
    Tree { id: String },
}

#[derive(Subcommand)]
enum LinkCommands {
    /// Add a link between two issues
    Add {
        from: String,
        to: String,
        #[arg(long = "type")]
        link_type: Option<String>,
    },
    /// Remove a link
    Rm { from: String, to: String },
}

#[derive(Subcommand)]
enum InboxCommands {
    /// Propose a new issue for triage
    Propose {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        by: Option<String>,
    },
    /// List open proposals
    List {
        #[arg(short, long)]
        all: bool,
    },
    /// Close a proposal, optionally citing the issue it resolved into
    Close {
        id: String,
        #[arg(short, long)]
        reason: Option<String>,
        #[arg(long)]
        resolved_issue: Option<String>,
    },
    /// Tombstone a proposal
    Delete { id: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { namespace } => commands::init(namespace),
        Commands::Create {
            title,
            issue_type,
            priority,
            description,
            parent,
            owner,
            labels,
        } => commands::create(&title, &issue_type, priority, description, parent, owner, labels, cli.json),
        Commands::List { status, issue_type, all } => commands::list(status, issue_type, all, cli.json),
        Commands::Show { id } => commands::show(&id, cli.json),
        Commands::Update {
            id,
            title,
            status,
            issue_type,
            priority,
            description,
            owner,
            parent,
        } => commands::update(&id, title, status, issue_type, priority, description, owner, parent, cli.json),
        Commands::Close { id, reason } => commands::close(&id, reason, cli.json),
        Commands::Delete { id, reason } => commands::delete(&id, reason, cli.json),
        Commands::Prune => commands::prune(),
        Commands::Ready => commands::ready(cli.json),
        Commands::Blocked => commands::blocked(cli.json),
        Commands::Dep { command } => match command {
            DepCommands::Add { id, depends_on, dep_type } => commands::dep_add(&id, &depends_on, &dep_type, cli.json),
            DepCommands::Rm { id, depends_on } => commands::dep_rm(&id, &depends_on),
            DepCommands::Tree { id } => commands::dep_tree(&id, cli.json),
        },
        Commands::Link { command } => match command {
            LinkCommands::Add { from, to, link_type } => commands::link_add(&from, &to, link_type, cli.json),
            LinkCommands::Rm { from, to } => commands::link_rm(&from, &to),
        },
        Commands::Inbox { command } => match command {
            InboxCommands::Propose { title, description, by } => commands::inbox_propose(&title, description, by, cli.json),
            InboxCommands::List { all } => commands::inbox_list(all, cli.json),
            InboxCommands::Close { id, reason, resolved_issue } => commands::inbox_close(&id, reason, resolved_issue, cli.json),
            InboxCommands::Delete { id } => commands::inbox_delete(&id),
        },
        Commands::Doctor { fix } => commands::doctor(fix, cli.json),
        Commands::MergeDriver { base, ours, theirs } => commands::merge_driver(&base, &ours, &theirs),
        Commands::Config => commands::config_show(cli.json),
    }
}
