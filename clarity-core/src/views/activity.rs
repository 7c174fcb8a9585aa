//! Comments and worklog rendered as a sub-tree under an item
//!
//! Layout under the item:
//!
//! ```text
//! Comments (n)          <- open unless collapsed
//!   comment             <- closed unless expanded
//!     body line ...
//!     reply             <- only under an expanded comment
//! Worklog (n)
//!   entry
//!     body line ...
//! ```

use super::{CollapseSet, RowKey};
use crate::db::Db;
use crate::types::{Comment, WorklogEntry};
use std::collections::{HashMap, HashSet};

/// Reply nesting beyond this depth renders flat.
pub const MAX_THREAD_DEPTH: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum ActivityLine {
    CommentsRoot { count: usize, expanded: bool },
    /// `replies` counts direct replies, shown or not
    Comment {
        comment: Comment,
        expanded: bool,
        replies: usize,
    },
    WorklogRoot { count: usize, expanded: bool },
    Worklog { entry: WorklogEntry, expanded: bool },
    /// One line of an expanded comment or worklog body
    Body { text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRow {
    pub key: RowKey,
    pub depth: usize,
    pub line: ActivityLine,
}

/// Comments of an item in thread order with their reply depth.
///
/// Roots and replies are chronological. A reply whose parent is missing is
/// shown as a root.
pub fn comment_threads<'a>(comments: &[&'a Comment]) -> Vec<(&'a Comment, usize)> {
    let ids: HashSet<&str> = comments.iter().map(|c| c.id.as_str()).collect();
    let mut sorted: Vec<&'a Comment> = comments.to_vec();
    sorted.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut roots = Vec::new();
    let mut replies: HashMap<&str, Vec<&'a Comment>> = HashMap::new();
    for &c in &sorted {
        match c.reply_to_comment_id.as_deref() {
            Some(parent) if parent != c.id && ids.contains(parent) => {
                replies.entry(parent).or_default().push(c)
            }
            _ => roots.push(c),
        }
    }

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    fn visit<'a>(
        c: &'a Comment,
        depth: usize,
        replies: &HashMap<&str, Vec<&'a Comment>>,
        seen: &mut HashSet<String>,
        out: &mut Vec<(&'a Comment, usize)>,
    ) {
        if !seen.insert(c.id.clone()) {
            return;
        }
        out.push((c, depth));
        for r in replies.get(c.id.as_str()).into_iter().flatten() {
            visit(r, depth + 1, replies, seen, out);
        }
    }
    for root in roots {
        visit(root, 0, &replies, &mut seen, &mut out);
    }
    // Reply cycles have no root; show them flat at the end.
    for &c in &sorted {
        if !seen.contains(&c.id) {
            visit(c, 0, &replies, &mut seen, &mut out);
        }
    }
    out
}

fn body_rows(
    key: impl Fn(usize) -> RowKey,
    body: &str,
    depth: usize,
    rows: &mut Vec<ActivityRow>,
) {
    for (n, line) in body.lines().enumerate() {
        rows.push(ActivityRow {
            key: key(n),
            depth,
            line: ActivityLine::Body {
                text: line.trim_end().to_string(),
            },
        });
    }
}

/// Activity rows for `item_id`, starting at `base_depth`.
///
/// `collapse` closes the section headers; `expanded` opens individual
/// comments and worklog entries. A comment's replies show only while it
/// is expanded.
pub fn activity_rows(
    db: &Db,
    item_id: &str,
    base_depth: usize,
    collapse: &CollapseSet,
    expanded: &CollapseSet,
) -> Vec<ActivityRow> {
    let mut rows = Vec::new();

    let comments = db.comments_for_item(item_id);
    if !comments.is_empty() {
        let key = RowKey::CommentsRoot(item_id.to_string());
        let open = !collapse.is_collapsed(&key);
        rows.push(ActivityRow {
            key,
            depth: base_depth,
            line: ActivityLine::CommentsRoot {
                count: comments.len(),
                expanded: open,
            },
        });
        if open {
            let threads = comment_threads(&comments);
            let mut reply_counts: HashMap<&str, usize> = HashMap::new();
            for &(c, depth) in &threads {
                if depth > 0 {
                    if let Some(parent) = c.reply_to_comment_id.as_deref() {
                        *reply_counts.entry(parent).or_default() += 1;
                    }
                }
            }

            // Thread depth below which rows are hidden by a closed ancestor.
            let mut hidden_below: Option<usize> = None;
            for (comment, thread_depth) in threads {
                match hidden_below {
                    Some(d) if thread_depth > d => continue,
                    _ => hidden_below = None,
                }
                let key = RowKey::Comment(comment.id.clone());
                let depth = base_depth + 1 + thread_depth.min(MAX_THREAD_DEPTH);
                let is_open = expanded.is_collapsed(&key);
                rows.push(ActivityRow {
                    key,
                    depth,
                    line: ActivityLine::Comment {
                        comment: comment.clone(),
                        expanded: is_open,
                        replies: reply_counts.get(comment.id.as_str()).copied().unwrap_or(0),
                    },
                });
                if is_open {
                    let id = &comment.id;
                    body_rows(|n| RowKey::CommentBody(id.clone(), n), &comment.body, depth + 1, &mut rows);
                } else {
                    hidden_below = Some(thread_depth);
                }
            }
        }
    }

    let worklog = db.worklog_for_item(item_id);
    if !worklog.is_empty() {
        let key = RowKey::WorklogRoot(item_id.to_string());
        let open = !collapse.is_collapsed(&key);
        rows.push(ActivityRow {
            key,
            depth: base_depth,
            line: ActivityLine::WorklogRoot {
                count: worklog.len(),
                expanded: open,
            },
        });
        if open {
            for entry in worklog {
                let key = RowKey::Worklog(entry.id.clone());
                let is_open = expanded.is_collapsed(&key);
                rows.push(ActivityRow {
                    key,
                    depth: base_depth + 1,
                    line: ActivityLine::Worklog {
                        entry: entry.clone(),
                        expanded: is_open,
                    },
                });
                if is_open {
                    let id = &entry.id;
                    body_rows(|n| RowKey::WorklogBody(id.clone(), n), &entry.body, base_depth + 2, &mut rows);
                }
            }
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;

    fn comment(id: &str, reply: Option<&str>, at: i64, body: &str) -> Comment {
        Comment {
            id: id.into(),
            item_id: "a".into(),
            author_id: "act-1".into(),
            body: body.into(),
            reply_to_comment_id: reply.map(str::to_string),
            created_at: ts(at),
            ..Default::default()
        }
    }

    fn db_with_activity() -> Db {
        let mut db = seeded_db();
        db.items.push(item("a", None, "h", "todo"));
        db.comments.push(comment("cmt-2", Some("cmt-1"), 2, "reply"));
        db.comments.push(comment("cmt-1", None, 1, "first\nsecond line"));
        db.comments.push(comment("cmt-3", Some("cmt-99"), 3, "orphan"));
        db.worklog.push(WorklogEntry {
            id: "wl-1".into(),
            item_id: "a".into(),
            author_id: "act-1".into(),
            body: "30m on it".into(),
            created_at: ts(4),
            ..Default::default()
        });
        db
    }

    #[test]
    fn test_threads() {
        let db = db_with_activity();
        let comments = db.comments_for_item("a");
        let threads: Vec<(&str, usize)> = comment_threads(&comments)
            .into_iter()
            .map(|(c, d)| (c.id.as_str(), d))
            .collect();
        assert_eq!(threads, vec![("cmt-1", 0), ("cmt-2", 1), ("cmt-3", 0)]);
    }

    #[test]
    fn test_entries_collapsed_by_default() {
        let db = db_with_activity();
        let rows = activity_rows(&db, "a", 1, &CollapseSet::new(), &CollapseSet::new());
        let keys: Vec<&RowKey> = rows.iter().map(|r| &r.key).collect();
        assert_eq!(
            keys,
            vec![
                &RowKey::CommentsRoot("a".into()),
                &RowKey::Comment("cmt-1".into()),
                &RowKey::Comment("cmt-3".into()),
                &RowKey::WorklogRoot("a".into()),
                &RowKey::Worklog("wl-1".into()),
            ]
        );
        assert!(matches!(rows[1].line, ActivityLine::Comment { replies: 1, expanded: false, .. }));
    }

    #[test]
    fn test_replies_show_under_expanded_comment() {
        let db = db_with_activity();
        let mut expanded = CollapseSet::new();
        expanded.set(RowKey::Comment("cmt-1".into()), true);

        let rows = activity_rows(&db, "a", 1, &CollapseSet::new(), &expanded);
        let keys: Vec<&RowKey> = rows.iter().map(|r| &r.key).collect();
        assert_eq!(
            &keys[..6],
            &[
                &RowKey::CommentsRoot("a".into()),
                &RowKey::Comment("cmt-1".into()),
                &RowKey::CommentBody("cmt-1".into(), 0),
                &RowKey::CommentBody("cmt-1".into(), 1),
                &RowKey::Comment("cmt-2".into()),
                &RowKey::Comment("cmt-3".into()),
            ]
        );
        assert_eq!(rows[4].depth, 3);
    }

    #[test]
    fn test_expanding_shows_body_rows() {
        let db = db_with_activity();
        let mut expanded = CollapseSet::new();
        expanded.set(RowKey::Comment("cmt-1".into()), true);
        let mut collapse = CollapseSet::new();
        collapse.set(RowKey::WorklogRoot("a".into()), true);

        let rows = activity_rows(&db, "a", 0, &collapse, &expanded);
        let bodies: Vec<(&RowKey, &ActivityLine)> = rows
            .iter()
            .filter(|r| matches!(r.line, ActivityLine::Body { .. }))
            .map(|r| (&r.key, &r.line))
            .collect();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0].0, &RowKey::CommentBody("cmt-1".into(), 0));
        assert_eq!(bodies[1].0, &RowKey::CommentBody("cmt-1".into(), 1));
        assert!(!rows.iter().any(|r| r.key == RowKey::Worklog("wl-1".into())));
    }

    #[test]
    fn test_deep_threads_are_capped() {
        let mut db = seeded_db();
        db.items.push(item("a", None, "h", "todo"));
        db.comments.push(comment("c0", None, 0, "x"));
        for i in 1..10 {
            let prev = format!("c{}", i - 1);
            db.comments
                .push(comment(&format!("c{}", i), Some(&prev), i, "x"));
        }
        let mut expanded = CollapseSet::new();
        for i in 0..10 {
            expanded.set(RowKey::Comment(format!("c{}", i)), true);
        }
        let rows = activity_rows(&db, "a", 0, &CollapseSet::new(), &expanded);
        let max = rows
            .iter()
            .filter(|r| matches!(r.line, ActivityLine::Comment { .. }))
            .map(|r| r.depth)
            .max()
            .unwrap();
        assert_eq!(max, 1 + MAX_THREAD_DEPTH);

        // Closing the root hides the whole thread.
        expanded.set(RowKey::Comment("c0".into()), false);
        let rows = activity_rows(&db, "a", 0, &CollapseSet::new(), &expanded);
        assert_eq!(rows.len(), 2);
    }
}
