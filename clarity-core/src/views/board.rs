//! Status columns of one outline

use super::outline::OutlineTree;
use crate::db::Db;
use crate::error::Result;
use crate::types::Item;

pub const NO_STATUS_LABEL: &str = "(no status)";

#[derive(Debug, Clone, PartialEq)]
pub struct BoardColumn {
    /// `None` for the "(no status)" column
    pub status_id: Option<String>,
    pub label: String,
    pub items: Vec<Item>,
}

/// "(no status)" first, then one column per status definition.
///
/// Only top-level items appear; children stay with their parent's card.
/// Items whose status is no longer defined land in "(no status)".
pub fn board_columns(db: &Db, outline_id: &str) -> Result<Vec<BoardColumn>> {
    let outline = db.require_outline(outline_id)?;
    let tree = OutlineTree::for_outline(db, outline_id);

    let mut columns = vec![BoardColumn {
        status_id: None,
        label: NO_STATUS_LABEL.to_string(),
        items: Vec::new(),
    }];
    columns.extend(outline.status_defs.iter().map(|def| BoardColumn {
        status_id: Some(def.id.clone()),
        label: def.label.clone(),
        items: Vec::new(),
    }));

    for item in tree.roots() {
        let idx = columns
            .iter()
            .position(|c| c.status_id.as_deref() == Some(item.status_id.as_str()))
            .unwrap_or(0);
        columns[idx].items.push((*item).clone());
    }
    Ok(columns)
}
