//! Open work across the whole workspace

use super::outline::{OutlineRow, OutlineTree};
use super::{CollapseSet, RowKey};
use crate::db::Db;
use crate::status::item_is_done;

/// Agenda rows of one outline.
#[derive(Debug, Clone, PartialEq)]
pub struct AgendaGroup {
    pub project_id: String,
    pub project_name: String,
    pub outline_id: String,
    pub outline_name: String,
    pub rows: Vec<OutlineRow>,
}

/// Every item that is still actionable: not archived or hidden by an
/// archived container, not in an end state, not on hold.
///
/// Parent/child structure survives among the listed items. Parents start
/// collapsed; `expanded` holds the ones the user opened. Groups follow
/// project then outline creation order and empty groups are dropped.
pub fn agenda(db: &Db, expanded: &CollapseSet) -> Vec<AgendaGroup> {
    let mut projects: Vec<_> = db.projects.iter().filter(|p| !p.archived).collect();
    projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut groups = Vec::new();
    for project in projects {
        let mut outlines: Vec<_> = db
            .outlines
            .iter()
            .filter(|o| o.project_id == project.id && !o.archived)
            .collect();
        outlines.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        for outline in outlines {
            let open: Vec<_> = db
                .items
                .iter()
                .filter(|i| i.outline_id == outline.id)
                .filter(|i| !db.is_hidden_by_archive(i) && !i.on_hold && !item_is_done(db, i))
                .collect();
            if open.is_empty() {
                continue;
            }
            let rows = OutlineTree::from_items(open)
                .flatten(db, |id| !expanded.is_collapsed(&RowKey::Item(id.to_string())));
            groups.push(AgendaGroup {
                project_id: project.id.clone(),
                project_name: project.name.clone(),
                outline_id: outline.id.clone(),
                outline_name: outline.display_name().to_string(),
                rows,
            });
        }
    }
    groups
}
