//! "Collapse all" cycling
//!
//! Repeated presses walk all-collapsed -> first layer open -> all open ->
//! all-collapsed. Only items that have children take part; a leaf has no
//! collapsed state to speak of.

use super::outline::OutlineTree;
use super::{CollapseSet, RowKey};
use crate::db::Db;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollapseState {
    AllCollapsed,
    /// Top layer of parents open, deeper parents collapsed
    FirstLayer,
    AllExpanded,
    Mixed,
}

/// Parents in scope with their depth relative to the scope.
///
/// `scope` limits the cycle to one item's subtree (the item itself is depth
/// 0); `None` covers the whole outline.
fn parents_in_scope(db: &Db, outline_id: &str, scope: Option<&str>) -> Vec<(String, usize)> {
    let tree = OutlineTree::for_outline(db, outline_id);
    let walked = match scope {
        None => tree.walk(),
        Some(id) => {
            let mut out = Vec::new();
            let root = tree
                .walk()
                .into_iter()
                .find(|(item, _)| item.id == id)
                .map(|(item, _)| item);
            if let Some(root) = root {
                tree.walk_from(root, 0, &mut out);
            }
            out
        }
    };
    walked
        .into_iter()
        .filter(|(item, _)| tree.has_children(&item.id))
        .map(|(item, depth)| (item.id.clone(), depth))
        .collect()
}

fn classify(parents: &[(String, usize)], collapse: &CollapseSet) -> CollapseState {
    let collapsed = |id: &str| collapse.is_item_collapsed(id);
    if parents.iter().all(|(id, _)| collapsed(id)) {
        CollapseState::AllCollapsed
    } else if parents.iter().all(|(id, _)| !collapsed(id)) {
        CollapseState::AllExpanded
    } else if parents
        .iter()
        .all(|(id, depth)| collapsed(id) == (*depth > 0))
    {
        CollapseState::FirstLayer
    } else {
        CollapseState::Mixed
    }
}

/// Where the cycle currently stands for `scope`.
pub fn collapse_state(
    db: &Db,
    outline_id: &str,
    scope: Option<&str>,
    collapse: &CollapseSet,
) -> CollapseState {
    classify(&parents_in_scope(db, outline_id, scope), collapse)
}

/// Advance the cycle one step and return the state reached.
pub fn toggle_collapse_all(
    db: &Db,
    outline_id: &str,
    scope: Option<&str>,
    collapse: &mut CollapseSet,
) -> CollapseState {
    let parents = parents_in_scope(db, outline_id, scope);
    let next = match classify(&parents, collapse) {
        CollapseState::AllCollapsed => CollapseState::FirstLayer,
        CollapseState::FirstLayer => CollapseState::AllExpanded,
        CollapseState::AllExpanded | CollapseState::Mixed => CollapseState::AllCollapsed,
    };
    for (id, depth) in &parents {
        let collapsed = match next {
            CollapseState::FirstLayer => *depth > 0,
            CollapseState::AllExpanded => false,
            _ => true,
        };
        collapse.set(RowKey::Item(id.clone()), collapsed);
    }
    next
}
