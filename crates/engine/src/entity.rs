//! Tagged union over every entity kind that can sit in the subscription graph.

use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::entity_id::{EntityKey, EntityKind, SheetId};
use crate::sheet::{SheetInfo, Sindex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "lowercase")]
pub enum Entity {
    Sheet(SheetInfo),
    Sindex(Sindex),
    Cell(Cell),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Sheet(_) => EntityKind::Sheet,
            Entity::Sindex(_) => EntityKind::Sindex,
            Entity::Cell(_) => EntityKind::Cell,
        }
    }

    pub fn key(&self) -> EntityKey {
        match self {
            Entity::Sheet(info) => info.key(),
            Entity::Sindex(sindex) => sindex.key(),
            Entity::Cell(cell) => cell.key(),
        }
    }

    /// The sheet this entity belongs to (itself, for a sheet).
    pub fn sheet_id(&self) -> SheetId {
        match self {
            Entity::Sheet(info) => info.id,
            Entity::Sindex(sindex) => sindex.sheet_id,
            Entity::Cell(cell) => cell.sheet_id,
        }
    }

    pub fn as_cell(&self) -> Option<&Cell> {
        match self {
            Entity::Cell(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn as_sindex(&self) -> Option<&Sindex> {
        match self {
            Entity::Sindex(sindex) => Some(sindex),
            _ => None,
        }
    }

    pub fn as_sheet(&self) -> Option<&SheetInfo> {
        match self {
            Entity::Sheet(info) => Some(info),
            _ => None,
        }
    }
}

impl From<Cell> for Entity {
    fn from(cell: Cell) -> Self {
        Entity::Cell(cell)
    }
}

impl From<Sindex> for Entity {
    fn from(sindex: Sindex) -> Self {
        Entity::Sindex(sindex)
    }
}

impl From<SheetInfo> for Entity {
    fn from(info: SheetInfo) -> Self {
        Entity::Sheet(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellValue;
    use crate::entity_id::SindexId;
    use crate::sheet::{Axis, SheetKind};

    #[test]
    fn test_serde_keeps_every_variant() {
        let info = SheetInfo::new("Check", SheetKind::Checker);
        let sindex = Sindex::new(info.id, Axis::Row, 0, 24);
        let cell = Cell::new(info.id, sindex.id, SindexId::new(), CellValue::Int(7));

        for (entity, tag) in [
            (Entity::Sheet(info), "sheet"),
            (Entity::Sindex(sindex), "sindex"),
            (Entity::Cell(cell), "cell"),
        ] {
            let value = serde_json::to_value(&entity).unwrap();
            assert_eq!(value["entity"], tag);
            let back: Entity = serde_json::from_value(value).unwrap();
            assert_eq!(back, entity);
        }
    }
}
