//! Archived projects, outlines and items

use crate::db::{sibling_order, Db};
use crate::types::{Item, Outline, Project};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchivedView {
    pub projects: Vec<Project>,
    pub outlines: Vec<Outline>,
    pub items: Vec<Item>,
}

impl ArchivedView {
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.outlines.is_empty() && self.items.is_empty()
    }
}

/// Everything archived directly. Items are grouped by outline and kept in
/// rank order inside each outline.
pub fn archived(db: &Db) -> ArchivedView {
    let mut items: Vec<Item> = db.items.iter().filter(|i| i.archived).cloned().collect();
    items.sort_by(|a, b| {
        a.project_id
            .cmp(&b.project_id)
            .then_with(|| a.outline_id.cmp(&b.outline_id))
            .then_with(|| sibling_order(a, b))
    });
    ArchivedView {
        projects: db.projects.iter().filter(|p| p.archived).cloned().collect(),
        outlines: db.outlines.iter().filter(|o| o.archived).cloned().collect(),
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;

    #[test]
    fn test_archived_lists_direct_archives_only() {
        let mut db = seeded_db();
        let mut b = item("b", None, "t", "todo");
        b.archived = true;
        let mut a = item("a", None, "h", "todo");
        a.archived = true;
        db.items.push(b);
        db.items.push(a);
        db.items.push(item("kid", Some("a"), "h", "todo"));
        db.outlines[0].archived = true;

        let view = archived(&db);
        assert!(view.projects.is_empty());
        assert_eq!(view.outlines.len(), 1);
        let ids: Vec<&str> = view.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(!view.is_empty());
    }
}
