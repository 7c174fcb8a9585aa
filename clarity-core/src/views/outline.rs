//! Flattened outline tree

use super::CollapseSet;
use crate::db::{sibling_order, Db};
use crate::status::item_is_done;
use crate::types::Item;
use std::collections::{HashMap, HashSet};

/// One visible item in an outline.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineRow {
    pub item: Item,
    pub depth: usize,
    pub has_children: bool,
    pub collapsed: bool,
    /// Direct children with an explicit status that is an end state
    pub done_children: usize,
    /// Direct children with an explicit status
    pub total_children: usize,
}

/// Parent/child structure over a chosen set of items.
///
/// An item whose parent is not in the set (missing, archived, filtered out)
/// is treated as a root.
#[derive(Debug, Clone, Default)]
pub struct OutlineTree<'a> {
    roots: Vec<&'a Item>,
    children: HashMap<&'a str, Vec<&'a Item>>,
}

impl<'a> OutlineTree<'a> {
    /// Tree of `items`, each sibling list in rank order.
    pub fn from_items(items: Vec<&'a Item>) -> Self {
        let ids: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
        let mut tree = OutlineTree::default();
        for item in items {
            match item.parent_id.as_deref() {
                Some(parent) if parent != item.id && ids.contains(parent) => {
                    tree.children.entry(parent).or_default().push(item);
                }
                _ => tree.roots.push(item),
            }
        }
        tree.roots.sort_by(|a, b| sibling_order(a, b));
        for list in tree.children.values_mut() {
            list.sort_by(|a, b| sibling_order(a, b));
        }

        // Items caught in a parent cycle are unreachable from any root.
        let mut reachable: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = tree.roots.iter().map(|i| i.id.clone()).collect();
        while let Some(id) = stack.pop() {
            stack.extend(tree.children(&id).iter().map(|c| c.id.clone()));
            reachable.insert(id);
        }
        let mut stranded: Vec<&'a Item> = tree
            .children
            .values()
            .flatten()
            .copied()
            .filter(|i| !reachable.contains(&i.id))
            .collect();
        if !stranded.is_empty() {
            stranded.sort_by(|a, b| sibling_order(a, b));
            for list in tree.children.values_mut() {
                list.retain(|i| reachable.contains(&i.id));
            }
            tree.roots.extend(stranded);
            tree.roots.sort_by(|a, b| sibling_order(a, b));
        }
        tree
    }

    /// Non-archived items of one outline.
    pub fn for_outline(db: &'a Db, outline_id: &str) -> Self {
        Self::from_items(
            db.items
                .iter()
                .filter(|i| i.outline_id == outline_id && !i.archived)
                .collect(),
        )
    }

    pub fn roots(&self) -> &[&'a Item] {
        &self.roots
    }

    pub fn children(&self, item_id: &str) -> &[&'a Item] {
        self.children.get(item_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_children(&self, item_id: &str) -> bool {
        !self.children(item_id).is_empty()
    }

    /// Every item of the tree with its depth, depth-first in display order.
    pub fn walk(&self) -> Vec<(&'a Item, usize)> {
        let mut out = Vec::new();
        for root in &self.roots {
            self.walk_from(root, 0, &mut out);
        }
        out
    }

    /// `item` and its subtree with depths relative to `item`.
    pub fn walk_from(&self, item: &'a Item, depth: usize, out: &mut Vec<(&'a Item, usize)>) {
        out.push((item, depth));
        for child in self.children(&item.id) {
            self.walk_from(child, depth + 1, out);
        }
    }

    /// Display rows, skipping the subtrees of collapsed items.
    pub fn flatten(&self, db: &Db, is_collapsed: impl Fn(&str) -> bool) -> Vec<OutlineRow> {
        let mut rows = Vec::new();
        for root in &self.roots {
            self.flatten_into(db, root, 0, &is_collapsed, &mut rows);
        }
        rows
    }

    fn flatten_into(
        &self,
        db: &Db,
        item: &Item,
        depth: usize,
        is_collapsed: &impl Fn(&str) -> bool,
        rows: &mut Vec<OutlineRow>,
    ) {
        let children = self.children(&item.id);
        let has_children = !children.is_empty();
        let collapsed = has_children && is_collapsed(&item.id);

        let with_status: Vec<&&Item> = children.iter().filter(|c| !c.status_id.is_empty()).collect();
        let done_children = with_status.iter().filter(|c| item_is_done(db, c)).count();

        rows.push(OutlineRow {
            item: item.clone(),
            depth,
            has_children,
            collapsed,
            done_children,
            total_children: with_status.len(),
        });
        if !collapsed {
            for child in children {
                self.flatten_into(db, child, depth + 1, is_collapsed, rows);
            }
        }
    }
}

/// Visible rows of an outline under the given collapse state.
pub fn outline_rows(db: &Db, outline_id: &str, collapse: &CollapseSet) -> Vec<OutlineRow> {
    OutlineTree::for_outline(db, outline_id).flatten(db, |id| collapse.is_item_collapsed(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;
    use crate::views::RowKey;

    fn ids(rows: &[OutlineRow]) -> Vec<(&str, usize)> {
        rows.iter().map(|r| (r.item.id.as_str(), r.depth)).collect()
    }

    #[test]
    fn test_tree_order_and_depth() {
        let mut db = seeded_db();
        db.items.push(item("b", None, "t", "todo"));
        db.items.push(item("a", None, "h", "todo"));
        db.items.push(item("a2", Some("a"), "t", "done"));
        db.items.push(item("a1", Some("a"), "h", "todo"));
        db.items.push(item("a1x", Some("a1"), "h", ""));

        let rows = outline_rows(&db, "out-1", &CollapseSet::new());
        assert_eq!(
            ids(&rows),
            vec![("a", 0), ("a1", 1), ("a1x", 2), ("a2", 1), ("b", 0)]
        );
        let a = &rows[0];
        assert!(a.has_children);
        assert_eq!((a.done_children, a.total_children), (1, 2));
        // a1x has no status and is not counted under a1.
        assert_eq!((rows[1].done_children, rows[1].total_children), (0, 0));
    }

    #[test]
    fn test_orphans_become_roots() {
        let mut db = seeded_db();
        let mut gone = item("gone", None, "a", "todo");
        gone.archived = true;
        db.items.push(gone);
        db.items.push(item("kid", Some("gone"), "h", "todo"));
        db.items.push(item("lost", Some("item-404"), "t", "todo"));

        let rows = outline_rows(&db, "out-1", &CollapseSet::new());
        assert_eq!(ids(&rows), vec![("kid", 0), ("lost", 0)]);
    }

    #[test]
    fn test_collapsed_hides_subtree() {
        let mut db = seeded_db();
        db.items.push(item("a", None, "h", "todo"));
        db.items.push(item("b", Some("a"), "h", "todo"));
        db.items.push(item("leaf", None, "t", "todo"));

        let mut collapse = CollapseSet::new();
        collapse.set(RowKey::Item("a".into()), true);
        collapse.set(RowKey::Item("leaf".into()), true);
        let rows = outline_rows(&db, "out-1", &collapse);
        assert_eq!(ids(&rows), vec![("a", 0), ("leaf", 0)]);
        assert!(rows[0].collapsed);
        // A leaf is never shown as collapsed.
        assert!(!rows[1].collapsed);
    }

    #[test]
    fn test_cycle_members_still_render() {
        let mut db = seeded_db();
        db.items.push(item("x", Some("y"), "h", ""));
        db.items.push(item("y", Some("x"), "t", ""));
        let rows = outline_rows(&db, "out-1", &CollapseSet::new());
        assert_eq!(rows.len(), 2);
    }
}
