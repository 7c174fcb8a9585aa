//! Command dispatch

use crate::cli::*;
use crate::render;
use anyhow::{bail, Context as _, Result};
use clarity_core::capture::{expand, CaptureDraft, ExpandContext, Press, TemplateTree};
use clarity_core::engine::normalize_tags;
use clarity_core::git::{AutoCommitter, GitStatus, GitSync};
use clarity_core::reload::{PreviewRequest, Session, PREVIEW_DEBOUNCE, RELOAD_INTERVAL};
use clarity_core::views::{self, activity_rows, outline_rows, CollapseSet, RowKey};
use clarity_core::workspace::{self, WorkspaceRef, Workspaces};
use clarity_core::{
    ActorKind, AttachmentDraft, AttachmentOwner, Config, Db, DepType, Engine, ItemDate, NewItem, Placement,
    StatusDefEdit, Store,
};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-invocation state shared by every command.
pub struct Context<'a> {
    config: &'a Config,
    workspaces: Workspaces,
    workspace: WorkspaceRef,
    actor: Option<String>,
    json: bool,
}

/// An engine plus the auto-committer listening to it.
struct Writer {
    engine: Engine,
    committer: Option<Arc<AutoCommitter>>,
}

impl Writer {
    /// Flush pending auto-commit work; git failures never fail the command.
    fn finish(self) {
        let Writer { engine, committer } = self;
        drop(engine);
        if let Some(committer) = committer {
            if let Some(err) = committer.shutdown() {
                eprintln!("warning: auto-commit failed: {}", err);
            }
        }
    }
}

impl<'a> Context<'a> {
    pub fn new(config: &'a Config, cli: &Cli) -> Result<Self> {
        let workspaces = Workspaces::from_env();
        let workspace = workspace::resolve(config, &workspaces, cli.workspace.as_deref(), cli.dir.as_deref())
            .context("failed to resolve workspace")?;
        tracing::debug!(workspace = %workspace.name, dir = %workspace.dir.display(), "Resolved workspace");
        Ok(Self {
            config,
            workspaces,
            workspace,
            actor: cli.actor.clone().filter(|a| !a.trim().is_empty()),
            json: cli.json,
        })
    }

    fn writer_at(&self, dir: &Path) -> Result<Writer> {
        let mut engine = Engine::open(dir)
            .with_context(|| format!("failed to open workspace at {}", dir.display()))?
            .with_actor(self.actor.clone())
            .with_max_attachment_bytes(self.config.attachments.max_bytes);
        let mut committer = None;
        if Config::autocommit_enabled() {
            let c = Arc::new(AutoCommitter::for_workspace(
                dir,
                Duration::from_millis(self.config.git.debounce_ms),
                Config::autopush_enabled(),
            )?);
            engine = engine.with_notifier(c.clone());
            committer = Some(c);
        }
        Ok(Writer { engine, committer })
    }

    fn writer(&self) -> Result<Writer> {
        self.writer_at(&self.workspace.dir)
    }

    /// Engine for reads only; no auto-commit worker.
    fn reader(&self) -> Result<Engine> {
        Ok(Engine::open(&self.workspace.dir)?.with_actor(self.actor.clone()))
    }

    fn load(&self) -> Result<Db> {
        let store = Store::open(&self.workspace.dir)?;
        Ok(store.load()?)
    }

    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Report the id of something just created.
    fn created(&self, id: &str) -> Result<()> {
        if self.json {
            self.print_json(&json!({ "id": id }))
        } else {
            println!("{}", id);
            Ok(())
        }
    }

    fn done(&self, message: &str) -> Result<()> {
        if self.json {
            self.print_json(&json!({ "ok": true, "message": message }))
        } else {
            println!("{}", message);
            Ok(())
        }
    }
}

fn parse_date(raw: Option<&str>) -> Result<Option<ItemDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => match ItemDate::parse(s) {
            Some(date) => Ok(Some(date)),
            None => bail!("invalid date '{}': expected YYYY-MM-DD or YYYY-MM-DD HH:MM", s),
        },
    }
}

fn actor_kind(kind: KindArg) -> ActorKind {
    match kind {
        KindArg::Human => ActorKind::Human,
        KindArg::Agent => ActorKind::Agent,
    }
}

fn owner_kind(kind: OwnerArg) -> AttachmentOwner {
    match kind {
        OwnerArg::Item => AttachmentOwner::Item,
        OwnerArg::Comment => AttachmentOwner::Comment,
    }
}

fn dep_type(kind: DepArg) -> DepType {
    match kind {
        DepArg::Blocks => DepType::Blocks,
        DepArg::Related => DepType::Related,
    }
}

fn mark(current: bool) -> &'static str {
    if current {
        "*"
    } else {
        " "
    }
}

pub fn run(cli: Cli, config: &Config) -> Result<()> {
    let ctx = Context::new(config, &cli)?;
    match cli.command {
        Command::Init { name } => init(&ctx, name.as_deref()),
        Command::Workspaces => list_workspaces(&ctx),
        Command::Actor(cmd) => actor(&ctx, cmd),
        Command::Project(cmd) => project(&ctx, cmd),
        Command::Outline(cmd) => outline(&ctx, cmd),
        Command::Status(cmd) => status(&ctx, cmd),
        Command::Item(cmd) => item(&ctx, cmd),
        Command::Comment(args) => comment(&ctx, args),
        Command::Worklog { item, body } => {
            let w = ctx.writer()?;
            let id = w.engine.add_worklog(&item, &body)?;
            w.finish();
            ctx.created(&id)
        }
        Command::Attach(cmd) => attach(&ctx, cmd),
        Command::Dep(cmd) => dep(&ctx, cmd),
        Command::Tree { outline, collapse, open } => tree(&ctx, &outline, collapse, open.as_deref()),
        Command::Board { outline } => board(&ctx, &outline),
        Command::Agenda { expand } => agenda(&ctx, expand),
        Command::Archived => archived(&ctx),
        Command::Events { entity, limit } => events(&ctx, entity.as_deref(), limit),
        Command::Watch { outline, poll, rows } => watch(&ctx, outline.as_deref(), poll, rows),
        Command::Capture(args) => capture(&ctx, args),
        Command::Git(cmd) => git(&ctx, cmd),
    }
}

// ============================================
// Workspace and people
// ============================================

fn init(ctx: &Context<'_>, name: Option<&str>) -> Result<()> {
    let w = ctx.writer()?;
    if let Some(name) = name {
        let id = w.engine.create_actor(ActorKind::Human, name, None)?;
        println!("Created actor {}", id);
    }
    println!("Workspace {} at {}", ctx.workspace.name, ctx.workspace.dir.display());
    w.finish();
    Ok(())
}

fn list_workspaces(ctx: &Context<'_>) -> Result<()> {
    let names = ctx.workspaces.list()?;
    if ctx.json {
        return ctx.print_json(&names);
    }
    for name in names {
        println!("{} {}", mark(name == ctx.workspace.name), name);
    }
    Ok(())
}

fn actor(ctx: &Context<'_>, cmd: ActorCommand) -> Result<()> {
    match cmd {
        ActorCommand::Add { name, kind, user } => {
            let w = ctx.writer()?;
            let id = w.engine.create_actor(actor_kind(kind), &name, user.as_deref())?;
            w.finish();
            ctx.created(&id)
        }
        ActorCommand::Use { id } => {
            let w = ctx.writer()?;
            w.engine.use_actor(&id)?;
            w.finish();
            ctx.done(&format!("Acting as {}", id))
        }
        ActorCommand::List => {
            let db = ctx.load()?;
            if ctx.json {
                return ctx.print_json(&db.actors);
            }
            for a in &db.actors {
                let on_behalf = a
                    .user_id
                    .as_deref()
                    .map(|u| format!(" (for {})", u))
                    .unwrap_or_default();
                println!(
                    "{} {:<8} {:<6} {}{}",
                    mark(db.current_actor_id.as_deref() == Some(a.id.as_str())),
                    a.id,
                    a.kind.as_str(),
                    a.name,
                    on_behalf
                );
            }
            Ok(())
        }
    }
}

// ============================================
// Projects, outlines, statuses
// ============================================

fn project(ctx: &Context<'_>, cmd: ProjectCommand) -> Result<()> {
    if let ProjectCommand::List { all } = cmd {
        let db = ctx.load()?;
        let projects: Vec<_> = db.projects.iter().filter(|p| all || !p.archived).collect();
        if ctx.json {
            return ctx.print_json(&projects);
        }
        for p in projects {
            let archived = if p.archived { " (archived)" } else { "" };
            println!(
                "{} {:<10} {}{}",
                mark(db.current_project_id.as_deref() == Some(p.id.as_str())),
                p.id,
                p.name,
                archived
            );
        }
        return Ok(());
    }

    let w = ctx.writer()?;
    let result = match cmd {
        ProjectCommand::Add { name } => w.engine.create_project(&name).map(Some),
        ProjectCommand::Rename { id, name } => w.engine.rename_project(&id, &name).map(|_| None),
        ProjectCommand::Archive { id } => w.engine.archive_project(&id).map(|_| None),
        ProjectCommand::Unarchive { id } => w.engine.unarchive_project(&id).map(|_| None),
        ProjectCommand::Use { id } => w.engine.use_project(&id).map(|_| None),
        ProjectCommand::List { .. } => Ok(None),
    };
    w.finish();
    match result? {
        Some(id) => ctx.created(&id),
        None => ctx.done("ok"),
    }
}

fn outline(ctx: &Context<'_>, cmd: OutlineCommand) -> Result<()> {
    if let OutlineCommand::List { project, all } = cmd {
        let db = ctx.load()?;
        let project = project.or_else(|| db.current_project_id.clone());
        let outlines: Vec<_> = db
            .outlines
            .iter()
            .filter(|o| all || !o.archived)
            .filter(|o| project.as_deref().map_or(true, |p| o.project_id == p))
            .collect();
        if ctx.json {
            return ctx.print_json(&outlines);
        }
        for o in outlines {
            let archived = if o.archived { " (archived)" } else { "" };
            println!("{:<10} {:<10} {}{}", o.id, o.project_id, o.display_name(), archived);
        }
        return Ok(());
    }

    let w = ctx.writer()?;
    let result = match cmd {
        OutlineCommand::Add { project, name } => w.engine.create_outline(&project, name.as_deref()).map(Some),
        OutlineCommand::Rename { id, name } => w.engine.rename_outline(&id, name.as_deref()).map(|_| None),
        OutlineCommand::Describe { id, description } => {
            w.engine.set_outline_description(&id, &description).map(|_| None)
        }
        OutlineCommand::Archive { id } => w.engine.archive_outline(&id).map(|_| None),
        OutlineCommand::Unarchive { id } => w.engine.unarchive_outline(&id).map(|_| None),
        OutlineCommand::List { .. } => Ok(None),
    };
    w.finish();
    match result? {
        Some(id) => ctx.created(&id),
        None => ctx.done("ok"),
    }
}

fn status(ctx: &Context<'_>, cmd: StatusCommand) -> Result<()> {
    let (outline_id, edit) = match cmd {
        StatusCommand::List { outline } => {
            let db = ctx.load()?;
            let outline = db.require_outline(&outline)?;
            if ctx.json {
                return ctx.print_json(&outline.status_defs);
            }
            for def in &outline.status_defs {
                let mut flags = Vec::new();
                if def.is_end_state {
                    flags.push("end");
                }
                if def.requires_note {
                    flags.push("note");
                }
                println!("{:<14} {:<16} {}", def.id, def.label, flags.join(" "));
            }
            return Ok(());
        }
        StatusCommand::Add { outline, label, end, note } => (
            outline,
            StatusDefEdit::Add {
                label,
                is_end_state: end,
                requires_note: note,
            },
        ),
        StatusCommand::Rename { outline, id, label } => (outline, StatusDefEdit::Rename { id, label }),
        StatusCommand::Reorder { outline, ids } => (outline, StatusDefEdit::Reorder(ids)),
        StatusCommand::Remove { outline, id } => (outline, StatusDefEdit::Remove { id }),
        StatusCommand::ToggleEnd { outline, id } => (outline, StatusDefEdit::ToggleEndState { id }),
        StatusCommand::ToggleNote { outline, id } => (outline, StatusDefEdit::ToggleRequiresNote { id }),
    };
    let w = ctx.writer()?;
    let result = w.engine.edit_status_defs(&outline_id, &edit);
    w.finish();
    ctx.created(&result?)
}

// ============================================
// Items
// ============================================

fn item(ctx: &Context<'_>, cmd: ItemCommand) -> Result<()> {
    match cmd {
        ItemCommand::Show { id } => return show_item(ctx, &id),
        ItemCommand::History { id, limit } => {
            let events = ctx.reader()?.history(&id, limit)?;
            return print_events(ctx, &events);
        }
        _ => {}
    }

    let w = ctx.writer()?;
    let e = &w.engine;
    let message = match cmd {
        ItemCommand::Add(args) => {
            let id = e.create_item(&NewItem {
                outline_id: args.outline,
                parent_id: args.parent,
                title: args.title,
                description: args.description,
                status_id: args.status,
                priority: args.priority,
                tags: args.tags,
                due: parse_date(args.due.as_deref())?,
                schedule: parse_date(args.schedule.as_deref())?,
                assigned_actor_id: args.assign,
            });
            w.finish();
            return ctx.created(&id?);
        }
        ItemCommand::Duplicate { id } => {
            let copy = e.duplicate_item(&id);
            w.finish();
            return ctx.created(&copy?);
        }
        ItemCommand::Title { id, title } => e.set_title(&id, &title).map(|_| "ok".to_string()),
        ItemCommand::Describe { id, description } => {
            e.set_description(&id, &description).map(|_| "ok".to_string())
        }
        ItemCommand::Status { id, status, note } => {
            e.set_status(&id, &status, note.as_deref()).map(|_| "ok".to_string())
        }
        ItemCommand::Priority { id } => e
            .toggle_priority(&id)
            .map(|on| format!("priority {}", if on { "on" } else { "off" })),
        ItemCommand::Hold { id } => e
            .toggle_on_hold(&id)
            .map(|on| format!("on hold {}", if on { "on" } else { "off" })),
        ItemCommand::Due { id, date } => {
            let date = parse_date(date.as_deref())?;
            e.set_due(&id, date).map(|_| "ok".to_string())
        }
        ItemCommand::Schedule { id, date } => {
            let date = parse_date(date.as_deref())?;
            e.set_schedule(&id, date).map(|_| "ok".to_string())
        }
        ItemCommand::Tags { id, tags } => e.set_tags(&id, &tags).map(|tags| tags.join(" ")),
        ItemCommand::Assign { id, actor } => e.set_assignee(&id, actor.as_deref()).map(|_| "ok".to_string()),
        ItemCommand::Archive { id } => e.archive_item(&id).map(|_| "ok".to_string()),
        ItemCommand::Unarchive { id } => e.unarchive_item(&id).map(|_| "ok".to_string()),
        ItemCommand::Move(args) => move_item(e, args).map(|_| "ok".to_string()),
        ItemCommand::MoveOutline { id, outline, status } => e
            .move_to_outline(&id, &outline, status.as_deref())
            .map(|_| "ok".to_string()),
        ItemCommand::Show { .. } | ItemCommand::History { .. } => Ok(String::new()),
    };
    w.finish();
    ctx.done(&message?)
}

fn move_item(engine: &Engine, args: MoveArgs) -> clarity_core::Result<()> {
    let parent = if args.root {
        None
    } else if args.parent.is_some() {
        args.parent
    } else {
        engine.load()?.require_item(&args.id)?.parent_id.clone()
    };
    let placement = match (args.before, args.after) {
        (Some(before), _) => Placement::Before(before),
        (None, Some(after)) => Placement::After(after),
        (None, None) if args.start => Placement::Start,
        (None, None) => Placement::End,
    };
    engine.move_within_outline(&args.id, parent.as_deref(), &placement)
}

fn show_item(ctx: &Context<'_>, id: &str) -> Result<()> {
    let db = ctx.load()?;
    let item = db.require_item(id)?;
    if ctx.json {
        return ctx.print_json(&json!({
            "item": item,
            "comments": db.comments_for_item(id),
            "worklog": db.worklog_for_item(id),
            "attachments": db.attachments_for(AttachmentOwner::Item, id),
            "deps": db.deps_from(id),
        }));
    }
    print!("{}", render::item_detail(&db, item));

    let mut expanded = CollapseSet::new();
    for c in db.comments_for_item(id) {
        expanded.set(RowKey::Comment(c.id.clone()), true);
    }
    for w in db.worklog_for_item(id) {
        expanded.set(RowKey::Worklog(w.id.clone()), true);
    }
    let rows = activity_rows(&db, id, 0, &CollapseSet::new(), &expanded);
    if !rows.is_empty() {
        println!();
    }
    for row in &rows {
        println!("{}", render::activity_row(&db, row));
    }
    Ok(())
}

// ============================================
// Activity
// ============================================

fn comment(ctx: &Context<'_>, args: CommentArgs) -> Result<()> {
    if args.reply_to.is_some() && !args.attach.is_empty() {
        bail!("--reply-to cannot be combined with --attach");
    }
    let w = ctx.writer()?;
    let result = if args.attach.is_empty() {
        w.engine.add_comment(&args.item, &args.body, args.reply_to.as_deref())
    } else {
        let drafts: Vec<AttachmentDraft> = args
            .attach
            .into_iter()
            .map(|path| AttachmentDraft {
                path,
                title: String::new(),
                alt: String::new(),
            })
            .collect();
        w.engine
            .add_comment_with_attachments(&args.item, &args.body, &drafts)
            .map(|(id, _)| id)
    };
    w.finish();
    ctx.created(&result?)
}

fn attach(ctx: &Context<'_>, cmd: AttachCommand) -> Result<()> {
    let w = ctx.writer()?;
    match cmd {
        AttachCommand::Add {
            kind,
            entity,
            path,
            title,
            alt,
        } => {
            let result = w.engine.add_attachment(owner_kind(kind), &entity, &path, &title, &alt);
            w.finish();
            ctx.created(&result?)
        }
        AttachCommand::Update { id, title, alt } => {
            let result = w.engine.update_attachment(&id, title.as_deref(), alt.as_deref());
            w.finish();
            result?;
            ctx.done("ok")
        }
    }
}

fn dep(ctx: &Context<'_>, cmd: DepCommand) -> Result<()> {
    let w = ctx.writer()?;
    let result = match cmd {
        DepCommand::Add { from, to, dep_type: t } => w.engine.add_dep(&from, &to, dep_type(t)),
        DepCommand::Remove { from, to, dep_type: t } => w.engine.remove_dep(&from, &to, dep_type(t)),
    };
    w.finish();
    result?;
    ctx.done("ok")
}

// ============================================
// Views
// ============================================

fn tree(ctx: &Context<'_>, outline_id: &str, collapse: Vec<String>, open: Option<&str>) -> Result<()> {
    let db = ctx.load()?;
    db.require_outline(outline_id)?;
    let mut collapsed = CollapseSet::new();
    for id in collapse {
        collapsed.set(RowKey::Item(id), true);
    }
    let rows = outline_rows(&db, outline_id, &collapsed);

    if ctx.json {
        let out: Vec<_> = rows
            .iter()
            .map(|r| {
                json!({
                    "id": r.item.id,
                    "title": r.item.title,
                    "statusId": r.item.status_id,
                    "depth": r.depth,
                    "hasChildren": r.has_children,
                    "collapsed": r.collapsed,
                    "doneChildren": r.done_children,
                    "totalChildren": r.total_children,
                })
            })
            .collect();
        return ctx.print_json(&out);
    }

    let mut expanded = CollapseSet::new();
    if let Some(id) = open {
        for c in db.comments_for_item(id) {
            expanded.set(RowKey::Comment(c.id.clone()), true);
        }
    }
    for row in &rows {
        println!("{}", render::outline_row(&db, row));
        if open == Some(row.item.id.as_str()) {
            for activity in activity_rows(&db, &row.item.id, row.depth + 1, &CollapseSet::new(), &expanded) {
                println!("{}", render::activity_row(&db, &activity));
            }
        }
    }
    Ok(())
}

fn board(ctx: &Context<'_>, outline_id: &str) -> Result<()> {
    let db = ctx.load()?;
    let columns = views::board_columns(&db, outline_id)?;
    if ctx.json {
        let out: Vec<_> = columns
            .iter()
            .map(|c| json!({ "statusId": c.status_id, "label": c.label, "items": c.items }))
            .collect();
        return ctx.print_json(&out);
    }
    print!("{}", render::board(&db, &columns));
    Ok(())
}

fn agenda(ctx: &Context<'_>, expand: Vec<String>) -> Result<()> {
    let db = ctx.load()?;
    let mut expanded = CollapseSet::new();
    for id in expand {
        expanded.set(RowKey::Item(id), true);
    }
    let groups = views::agenda(&db, &expanded);
    if ctx.json {
        let out: Vec<_> = groups
            .iter()
            .map(|g| {
                json!({
                    "projectId": g.project_id,
                    "projectName": g.project_name,
                    "outlineId": g.outline_id,
                    "outlineName": g.outline_name,
                    "items": g.rows.iter().map(|r| json!({
                        "id": r.item.id,
                        "title": r.item.title,
                        "depth": r.depth,
                        "collapsed": r.collapsed,
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        return ctx.print_json(&out);
    }
    print!("{}", render::agenda(&db, &groups));
    Ok(())
}

fn archived(ctx: &Context<'_>) -> Result<()> {
    let db = ctx.load()?;
    let view = views::archived(&db);
    if ctx.json {
        return ctx.print_json(&json!({
            "projects": view.projects,
            "outlines": view.outlines,
            "items": view.items,
        }));
    }
    print!("{}", render::archived(&view));
    Ok(())
}

fn events(ctx: &Context<'_>, entity: Option<&str>, limit: usize) -> Result<()> {
    let engine = ctx.reader()?;
    let events = match entity {
        Some(entity) => engine.history(entity, limit)?,
        None => engine.recent_events(limit)?,
    };
    print_events(ctx, &events)
}

fn print_events(ctx: &Context<'_>, events: &[clarity_core::Event]) -> Result<()> {
    if ctx.json {
        return ctx.print_json(events);
    }
    let db = ctx.load()?;
    for event in events {
        println!("{}", render::event(&db, event));
    }
    Ok(())
}

// ============================================
// Watch
// ============================================

/// Item detail cut to the request's box.
fn preview_text(db: &Db, req: &PreviewRequest) -> Option<String> {
    let item = db.item(&req.item_id)?;
    let lines: Vec<String> = render::item_detail(db, item)
        .lines()
        .take(req.height as usize)
        .map(|line| line.chars().take(req.width as usize).collect())
        .collect();
    Some(lines.join("\n"))
}

fn draw(session: &Session, preview: Option<&str>) {
    let db = session.db();
    let name = db
        .outline(session.outline_id())
        .map(|o| o.display_name().to_string())
        .unwrap_or_else(|| session.outline_id().to_string());
    println!("--- {} ({}) ---", name, chrono::Local::now().format("%H:%M:%S"));
    for row in session.visible_rows() {
        println!("{}", render::session_row(db, row));
    }
    if let Some(event) = session.recent_events().last() {
        println!("last change: {}", render::event(db, event));
    }
    if let Some(preview) = preview {
        println!("{}", preview);
    }
}

fn watch(ctx: &Context<'_>, outline: Option<&str>, poll: Option<u64>, rows: usize) -> Result<()> {
    let store = Store::open(&ctx.workspace.dir)?;
    let mut session = match outline {
        Some(id) => Session::open(store, id)?,
        None => match Session::restore(store)? {
            Some(session) => session,
            None => bail!("no outline given and no saved view to restore"),
        },
    };
    session.set_viewport(rows);
    session.set_preview_size(80, 12);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    let interval = poll.map(Duration::from_millis).unwrap_or(RELOAD_INTERVAL);
    tracing::info!(outline = %session.outline_id(), interval_ms = interval.as_millis() as u64, "Watching outline");
    println!("Watching (Ctrl+C to stop)...");

    let mut preview: Option<String> = None;
    let mut dirty = true;
    while running.load(Ordering::SeqCst) {
        // Rows are drawn once the preview they trigger has settled.
        if let Some(req) = session.preview().due(Instant::now()) {
            if session.preview().is_current(req.seq) {
                preview = preview_text(session.db(), &req);
                dirty = true;
            }
        }
        if dirty && !session.preview().is_pending() {
            draw(&session, preview.as_deref());
            dirty = false;
        }

        let wait = if session.preview().is_pending() {
            PREVIEW_DEBOUNCE
        } else {
            interval
        };
        std::thread::sleep(wait);
        match session.tick() {
            Ok(Some(_)) => dirty = true,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Reload failed");
                eprintln!("reload failed: {}", e);
            }
        }
    }

    session.save_view().context("failed to save view")?;
    Ok(())
}

// ============================================
// Capture
// ============================================

fn capture(ctx: &Context<'_>, args: CaptureArgs) -> Result<()> {
    let mut tree = TemplateTree::new(
        ctx.config.capture_templates.clone(),
        ctx.config.capture_template_groups.clone(),
    )?;

    let Some(keys) = args.keys else {
        let options = tree.options();
        if options.is_empty() {
            println!("No capture templates configured");
        }
        for option in options {
            let more = if option.is_leaf { "" } else { " ..." };
            println!("{}  {}{}", option.key, option.name, more);
        }
        return Ok(());
    };

    let mut selected = None;
    let pressed: Vec<String> = keys.chars().map(|c| c.to_string()).collect();
    for (i, key) in pressed.iter().enumerate() {
        match tree.press(key) {
            Press::Pending => {}
            Press::Selected(template) => {
                if i + 1 < pressed.len() {
                    bail!("no capture template for keys '{}'", keys);
                }
                selected = Some(template);
            }
            Press::NoMatch => bail!("no capture template for keys '{}'", keys),
        }
    }
    let template = match selected.or_else(|| tree.enter()) {
        Some(t) => t,
        None => {
            let options: Vec<String> = tree.options().into_iter().map(|o| o.key).collect();
            bail!("keys '{}' need one more of: {}", keys, options.join(", "));
        }
    };

    let mut expand_ctx = ExpandContext::new(&ctx.workspace.name, "").with_env();
    expand_ctx.vars.extend(args.vars);
    let mut draft = CaptureDraft::open(&template, &ctx.workspaces, &ctx.workspace, &expand_ctx)?;
    if let Some(outline) = args.outline.as_deref() {
        draft.set_outline(outline)?;
    }
    if let Some(title) = args.title.as_deref() {
        draft.title = expand(title, &expand_ctx);
    }
    if let Some(description) = args.description.as_deref() {
        draft.description = expand(description, &expand_ctx);
    }
    if !args.tags.is_empty() {
        let mut tags = draft.tags.clone();
        tags.extend(args.tags);
        draft.tags = normalize_tags(&tags);
    }

    let w = ctx.writer_at(&draft.dir)?;
    let result = draft.commit(&w.engine);
    w.finish();
    let result = result?;
    if ctx.json {
        return ctx.print_json(&json!({ "workspace": result.workspace, "id": result.item_id }));
    }
    println!("{} {}", result.workspace, result.item_id);
    Ok(())
}

// ============================================
// Git
// ============================================

fn git_status_json(status: &GitStatus) -> serde_json::Value {
    json!({
        "isRepo": status.is_repo,
        "branch": status.branch,
        "upstream": status.upstream,
        "ahead": status.ahead,
        "behind": status.behind,
        "dirtyTracked": status.dirty_tracked,
        "unmerged": status.unmerged,
        "inProgress": status.in_progress,
        "lastError": status.last_error,
    })
}

fn git(ctx: &Context<'_>, cmd: GitCommand) -> Result<()> {
    let git = GitSync::open(ctx.workspace.dir.clone())?;
    let actor = || -> String {
        ctx.reader()
            .and_then(|e| Ok(e.write_actor()?))
            .unwrap_or_else(|_| "unknown".to_string())
    };
    match cmd {
        GitCommand::Status => {
            let status = git.status();
            if ctx.json {
                return ctx.print_json(&git_status_json(&status));
            }
            print!("{}", render::git_status(&status));
            Ok(())
        }
        GitCommand::Commit => {
            let committed = git.commit(&actor())?;
            ctx.done(if committed { "committed" } else { "nothing to commit" })
        }
        GitCommand::Pull => {
            git.pull()?;
            ctx.done("pulled")
        }
        GitCommand::Push => {
            git.push(&actor())?;
            ctx.done("pushed")
        }
        GitCommand::Setup { remote } => {
            git.setup(remote.as_deref(), &actor())?;
            ctx.done(&format!("git ready at {}", git.dir().display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date(None).unwrap(), None);
        assert_eq!(parse_date(Some("  ")).unwrap(), None);
        assert_eq!(
            parse_date(Some("2024-05-01 09:30")).unwrap().map(|d| d.to_string()),
            Some("2024-05-01 09:30".to_string())
        );
        assert!(parse_date(Some("tomorrow")).is_err());
    }
}
