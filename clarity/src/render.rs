//! Plain-text rendering of views

use clarity_core::format::{format_bytes, format_progress, format_relative_time, status_label};
use clarity_core::git::GitStatus;
use clarity_core::reload::SessionRow;
use clarity_core::views::{ActivityLine, ActivityRow, AgendaGroup, ArchivedView, BoardColumn, OutlineRow};
use clarity_core::{AttachmentOwner, Db, Event, Item};

const INDENT: &str = "  ";

fn actor_name<'a>(db: &'a Db, actor_id: &'a str) -> &'a str {
    db.actor(actor_id).map(|a| a.name.as_str()).unwrap_or(actor_id)
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

/// Status, progress and flags after an item's title.
fn item_suffix(db: &Db, item: &Item, progress: &str) -> String {
    let mut parts = Vec::new();
    let label = status_label(db.outline(&item.outline_id), &item.status_id);
    if !label.is_empty() {
        parts.push(format!("[{}]", label));
    }
    if !progress.is_empty() {
        parts.push(progress.to_string());
    }
    if item.priority {
        parts.push("!".to_string());
    }
    if item.on_hold {
        parts.push("(on hold)".to_string());
    }
    if let Some(due) = &item.due {
        parts.push(format!("due {}", due));
    }
    if let Some(schedule) = &item.schedule {
        parts.push(format!("sched {}", schedule));
    }
    if let Some(assignee) = &item.assigned_actor_id {
        parts.push(format!("@{}", actor_name(db, assignee)));
    }
    for tag in &item.tags {
        parts.push(format!("#{}", tag));
    }
    parts.push(format!("({})", item.id));
    parts.join(" ")
}

pub fn outline_row(db: &Db, row: &OutlineRow) -> String {
    let marker = match (row.has_children, row.collapsed) {
        (true, true) => "+",
        (true, false) => "-",
        (false, _) => "*",
    };
    let progress = format_progress(row.done_children, row.total_children);
    format!(
        "{}{} {} {}",
        INDENT.repeat(row.depth),
        marker,
        row.item.title,
        item_suffix(db, &row.item, &progress)
    )
}

pub fn activity_row(db: &Db, row: &ActivityRow) -> String {
    let indent = INDENT.repeat(row.depth);
    let marker = |open: bool| if open { "-" } else { "+" };
    match &row.line {
        ActivityLine::CommentsRoot { count, expanded } => {
            format!("{}{} Comments ({})", indent, marker(*expanded), count)
        }
        ActivityLine::WorklogRoot { count, expanded } => {
            format!("{}{} Worklog ({})", indent, marker(*expanded), count)
        }
        ActivityLine::Comment {
            comment,
            expanded,
            replies,
        } => {
            let hidden = match (*expanded, *replies) {
                (false, 1) => " [1 reply]".to_string(),
                (false, n) if n > 1 => format!(" [{} replies]", n),
                _ => String::new(),
            };
            format!(
                "{}{} {} {}: {}{} ({})",
                indent,
                marker(*expanded),
                actor_name(db, &comment.author_id),
                format_relative_time(comment.created_at),
                first_line(&comment.body),
                hidden,
                comment.id
            )
        }
        ActivityLine::Worklog { entry, expanded } => format!(
            "{}{} {} {}: {} ({})",
            indent,
            marker(*expanded),
            actor_name(db, &entry.author_id),
            format_relative_time(entry.created_at),
            first_line(&entry.body),
            entry.id
        ),
        ActivityLine::Body { text } => format!("{}{}", indent, text),
    }
}

pub fn session_row(db: &Db, row: &SessionRow) -> String {
    match row {
        SessionRow::Item(row) => outline_row(db, row),
        SessionRow::Activity(row) => activity_row(db, row),
    }
}

pub fn board(db: &Db, columns: &[BoardColumn]) -> String {
    let mut out = String::new();
    for column in columns {
        out.push_str(&format!("== {} ({}) ==\n", column.label, column.items.len()));
        for item in &column.items {
            out.push_str(&format!("{}{} {}\n", INDENT, item.title, item_suffix(db, item, "")));
        }
    }
    out
}

pub fn agenda(db: &Db, groups: &[AgendaGroup]) -> String {
    if groups.is_empty() {
        return "Nothing on the agenda\n".to_string();
    }
    let mut out = String::new();
    for group in groups {
        out.push_str(&format!("{} / {}\n", group.project_name, group.outline_name));
        for row in &group.rows {
            out.push_str(INDENT);
            out.push_str(&outline_row(db, row));
            out.push('\n');
        }
    }
    out
}

pub fn archived(view: &ArchivedView) -> String {
    if view.is_empty() {
        return "Nothing archived\n".to_string();
    }
    let mut out = String::new();
    if !view.projects.is_empty() {
        out.push_str("Projects:\n");
        for p in &view.projects {
            out.push_str(&format!("{}{} ({})\n", INDENT, p.name, p.id));
        }
    }
    if !view.outlines.is_empty() {
        out.push_str("Outlines:\n");
        for o in &view.outlines {
            out.push_str(&format!("{}{} ({})\n", INDENT, o.display_name(), o.id));
        }
    }
    if !view.items.is_empty() {
        out.push_str("Items:\n");
        for i in &view.items {
            out.push_str(&format!("{}{} ({}, {})\n", INDENT, i.title, i.outline_id, i.id));
        }
    }
    out
}

pub fn event(db: &Db, event: &Event) -> String {
    format!(
        "{} {:<24} {:<10} {}",
        event.ts.format("%Y-%m-%d %H:%M:%S"),
        event.kind,
        event.entity_id,
        actor_name(db, &event.actor_id)
    )
}

/// Full detail of one item.
pub fn item_detail(db: &Db, item: &Item) -> String {
    let mut out = format!("{}\n{}{}\n", item.title, INDENT, item_suffix(db, item, ""));
    let outline = db.outline(&item.outline_id);
    out.push_str(&format!(
        "{}outline: {}\n",
        INDENT,
        outline.map(|o| o.display_name()).unwrap_or(&item.outline_id)
    ));
    out.push_str(&format!(
        "{}owner: {}  created {} by {}\n",
        INDENT,
        actor_name(db, &item.owner_actor_id),
        format_relative_time(item.created_at),
        actor_name(db, &item.created_by)
    ));
    if item.archived {
        out.push_str(&format!("{}archived\n", INDENT));
    }
    if !item.description.is_empty() {
        out.push('\n');
        for line in item.description.lines() {
            out.push_str(&format!("{}{}\n", INDENT, line));
        }
    }

    let deps = db.deps_from(&item.id);
    if !deps.is_empty() {
        out.push_str("\nDependencies:\n");
        for dep in deps {
            let title = db.item(&dep.to_item_id).map(|i| i.title.as_str()).unwrap_or_default();
            out.push_str(&format!(
                "{}{} {} {}\n",
                INDENT,
                dep.dep_type.as_str(),
                dep.to_item_id,
                title
            ));
        }
    }

    let attachments = db.attachments_for(AttachmentOwner::Item, &item.id);
    if !attachments.is_empty() {
        out.push_str("\nAttachments:\n");
        for a in attachments {
            let name = if a.title.is_empty() { &a.original_name } else { &a.title };
            out.push_str(&format!(
                "{}{} {} ({})\n",
                INDENT,
                name,
                format_bytes(a.size_bytes),
                a.id
            ));
        }
    }
    out
}

pub fn git_status(status: &GitStatus) -> String {
    if !status.is_repo {
        return match &status.last_error {
            Some(e) => format!("not a git repository ({})\n", e),
            None => "not a git repository\n".to_string(),
        };
    }
    let mut out = format!(
        "branch: {}\n",
        status.branch.as_deref().unwrap_or("(detached)")
    );
    match &status.upstream {
        Some(upstream) => out.push_str(&format!(
            "upstream: {} (ahead {}, behind {})\n",
            upstream, status.ahead, status.behind
        )),
        None => out.push_str("upstream: none\n"),
    }
    if status.dirty_tracked {
        out.push_str("uncommitted changes\n");
    }
    if status.unmerged {
        out.push_str("unmerged paths\n");
    }
    if status.in_progress {
        out.push_str("merge or rebase in progress\n");
    }
    if let Some(e) = &status.last_error {
        out.push_str(&format!("last error: {}\n", e));
    }
    out
}
