//! Entity identity for the subscription graph.
//!
//! Every sheet-owned record carries a stable identifier. An [`EntityKey`]
//! pairs that identifier with an [`EntityKind`] tag and is what the broker
//! stores: two snapshots of the same entity always resolve to the same key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Allocate a fresh random identifier.
            #[inline]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[inline]
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            #[inline]
            pub fn uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", $prefix, self.0)
            }
        }
    };
}

entity_id!(
    /// Identity of a sheet (its `SheetInfo`).
    SheetId,
    "sheet"
);
entity_id!(
    /// Identity of a row or column index.
    SindexId,
    "sindex"
);
entity_id!(
    /// Identity of a cell. Stable across moves; never reused.
    CellId,
    "cell"
);

/// Kind tag used to rebuild a concrete subscriber from a bare identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Sheet,
    Sindex,
    Cell,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Sheet, EntityKind::Sindex, EntityKind::Cell];

    pub fn tag(&self) -> &'static str {
        match self {
            EntityKind::Sheet => "sheet",
            EntityKind::Sindex => "sindex",
            EntityKind::Cell => "cell",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == s)
            .ok_or_else(|| format!("unknown entity kind: {s}"))
    }
}

/// Broker key: `(kind, id)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl EntityKey {
    #[inline]
    pub fn new(kind: EntityKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

impl From<SheetId> for EntityKey {
    fn from(id: SheetId) -> Self {
        Self::new(EntityKind::Sheet, id.uuid())
    }
}

impl From<SindexId> for EntityKey {
    fn from(id: SindexId) -> Self {
        Self::new(EntityKind::Sindex, id.uuid())
    }
}

impl From<CellId> for EntityKey {
    fn from(id: CellId) -> Self {
        Self::new(EntityKind::Cell, id.uuid())
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
