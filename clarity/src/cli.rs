//! Command-line surface

use clap::{Args, Parser, Subcommand, ValueEnum};
use clarity_core::config::ENV_ACTOR;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clarity")]
#[command(about = "Outline projects, work items, comments and worklogs")]
#[command(version)]
pub struct Cli {
    /// Named workspace under the config directory
    #[arg(short, long, global = true)]
    pub workspace: Option<String>,

    /// Workspace directory; wins over --workspace
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Act as this actor instead of the workspace's current actor
    #[arg(long, global = true, env = ENV_ACTOR)]
    pub actor: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the workspace, optionally with its first human actor
    Init {
        /// Name of the first human actor
        #[arg(long)]
        name: Option<String>,
    },
    /// List named workspaces
    Workspaces,
    #[command(subcommand)]
    Actor(ActorCommand),
    #[command(subcommand)]
    Project(ProjectCommand),
    #[command(subcommand)]
    Outline(OutlineCommand),
    /// Edit an outline's status definitions
    #[command(subcommand)]
    Status(StatusCommand),
    #[command(subcommand)]
    Item(ItemCommand),
    /// Comment on an item
    Comment(CommentArgs),
    /// Record work done on an item
    Worklog {
        item: String,
        body: String,
    },
    #[command(subcommand)]
    Attach(AttachCommand),
    #[command(subcommand)]
    Dep(DepCommand),
    /// Show the outline as an indented tree
    Tree {
        outline: String,
        /// Collapse these items
        #[arg(long = "collapse", value_name = "ITEM")]
        collapse: Vec<String>,
        /// Show comments and worklog under this item
        #[arg(long)]
        open: Option<String>,
    },
    /// Show the outline's root items grouped by status
    Board { outline: String },
    /// Show open work across all projects
    Agenda {
        /// Expand these parents
        #[arg(long = "expand", value_name = "ITEM")]
        expand: Vec<String>,
    },
    /// Show archived projects, outlines and items
    Archived,
    /// Show recent events
    Events {
        /// Only events touching this entity
        #[arg(long)]
        entity: Option<String>,
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Follow an outline, redrawing when the workspace changes
    Watch {
        /// Outline to show; defaults to the saved view
        outline: Option<String>,
        /// Poll interval in milliseconds
        #[arg(long)]
        poll: Option<u64>,
        /// Rows to show per redraw
        #[arg(long, default_value = "40")]
        rows: usize,
    },
    /// File a new item through a capture template
    Capture(CaptureArgs),
    #[command(subcommand)]
    Git(GitCommand),
}

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    Human,
    Agent,
}

#[derive(Subcommand)]
pub enum ActorCommand {
    /// Add an actor; agents act on behalf of a human
    Add {
        name: String,
        #[arg(long, value_enum, default_value = "human")]
        kind: KindArg,
        /// Human the agent acts for
        #[arg(long)]
        user: Option<String>,
    },
    /// Make an actor the workspace's current actor
    Use { id: String },
    List,
}

#[derive(Subcommand)]
pub enum ProjectCommand {
    Add { name: String },
    Rename { id: String, name: String },
    Archive { id: String },
    Unarchive { id: String },
    /// Make a project the current project
    Use { id: String },
    List {
        /// Include archived projects
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
pub enum OutlineCommand {
    Add {
        project: String,
        name: Option<String>,
    },
    /// Rename; omit the name to clear it
    Rename { id: String, name: Option<String> },
    Describe { id: String, description: String },
    Archive { id: String },
    Unarchive { id: String },
    List {
        /// Only outlines of this project; defaults to the current project
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
pub enum StatusCommand {
    Add {
        outline: String,
        label: String,
        /// Items in this status count as done
        #[arg(long)]
        end: bool,
        /// Entering this status requires a note
        #[arg(long)]
        note: bool,
    },
    Rename {
        outline: String,
        id: String,
        label: String,
    },
    /// Set the display order; list every status id once
    Reorder {
        outline: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    Remove { outline: String, id: String },
    ToggleEnd { outline: String, id: String },
    ToggleNote { outline: String, id: String },
    List { outline: String },
}

#[derive(Subcommand)]
pub enum ItemCommand {
    Add(ItemAddArgs),
    Show { id: String },
    Title { id: String, title: String },
    Describe { id: String, description: String },
    /// Set the status; an empty id clears it
    Status {
        id: String,
        status: String,
        #[arg(long)]
        note: Option<String>,
    },
    Priority { id: String },
    Hold { id: String },
    /// Set the due date (YYYY-MM-DD [HH:MM]); omit to clear
    Due { id: String, date: Option<String> },
    /// Set the schedule date (YYYY-MM-DD [HH:MM]); omit to clear
    Schedule { id: String, date: Option<String> },
    /// Replace the tags
    Tags { id: String, tags: Vec<String> },
    /// Assign to an actor; omit to unassign
    Assign { id: String, actor: Option<String> },
    Archive { id: String },
    Unarchive { id: String },
    Duplicate { id: String },
    /// Move within the outline
    Move(MoveArgs),
    /// Move an item and its subtree to another outline
    MoveOutline {
        id: String,
        outline: String,
        /// Status to use in the target outline
        #[arg(long)]
        status: Option<String>,
    },
    History {
        id: String,
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Args)]
pub struct ItemAddArgs {
    pub outline: String,
    pub title: String,
    #[arg(long)]
    pub parent: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
    #[arg(long)]
    pub due: Option<String>,
    #[arg(long)]
    pub schedule: Option<String>,
    #[arg(long)]
    pub priority: bool,
    #[arg(long)]
    pub assign: Option<String>,
}

#[derive(Args)]
pub struct MoveArgs {
    pub id: String,
    /// New parent; omit (or use --root) to keep it among the roots
    #[arg(long, conflicts_with = "root")]
    pub parent: Option<String>,
    /// Make the item a root; without --parent or --root the parent is kept
    #[arg(long)]
    pub root: bool,
    #[arg(long, conflicts_with_all = ["after", "start", "end"])]
    pub before: Option<String>,
    #[arg(long, conflicts_with_all = ["start", "end"])]
    pub after: Option<String>,
    #[arg(long, conflicts_with = "end")]
    pub start: bool,
    #[arg(long)]
    pub end: bool,
}

#[derive(Args)]
pub struct CommentArgs {
    pub item: String,
    pub body: String,
    /// Comment this one replies to
    #[arg(long)]
    pub reply_to: Option<String>,
    /// Files to attach to the new comment
    #[arg(long = "attach", value_name = "PATH")]
    pub attach: Vec<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OwnerArg {
    Item,
    Comment,
}

#[derive(Subcommand)]
pub enum AttachCommand {
    /// Copy a file into the workspace and attach it
    Add {
        #[arg(value_enum)]
        kind: OwnerArg,
        entity: String,
        path: PathBuf,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        alt: String,
    },
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        alt: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum DepArg {
    Blocks,
    Related,
}

#[derive(Subcommand)]
pub enum DepCommand {
    Add {
        from: String,
        to: String,
        #[arg(long = "type", value_enum, default_value = "blocks")]
        dep_type: DepArg,
    },
    Remove {
        from: String,
        to: String,
        #[arg(long = "type", value_enum, default_value = "blocks")]
        dep_type: DepArg,
    },
}

#[derive(Args)]
pub struct CaptureArgs {
    /// Key sequence selecting the template, one character per key
    pub keys: Option<String>,
    /// Target outline instead of the template's
    #[arg(long)]
    pub outline: Option<String>,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Extra tags on top of the template's
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
    /// Placeholder value, e.g. --var ticket=ABC-1
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", raw)),
    }
}

#[derive(Subcommand)]
pub enum GitCommand {
    Status,
    /// Commit pending workspace changes
    Commit,
    Pull,
    Push,
    /// Initialise the repository and optionally connect a remote
    Setup {
        #[arg(long)]
        remote: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var("a=b=c").unwrap(), ("a".to_string(), "b=c".to_string()));
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["clarity", "tree", "out-1", "--dir", "/tmp/ws", "--json"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.dir, Some(PathBuf::from("/tmp/ws")));
        assert!(matches!(cli.command, Command::Tree { .. }));
    }
}
