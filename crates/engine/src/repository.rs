//! Repository collaborator interfaces.
//!
//! The engine never talks to storage directly. It loads and saves entities by
//! id and by structural position through [`Repository`], one per entity kind.
//! [`MemoryRepository`] is the in-process implementation used by default and
//! in tests; persistent backends implement the same trait.
//!
//! Filters mirror the lookup syntax of the persistence layer:
//!
//! ```text
//! "sheet_id"            equals
//! "position.__gte"      greater than or equal
//! "position.__lt"       less than
//! "id.__in"             member of a list
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::ops::Range;

use uuid::Uuid;

use crate::cell::Cell;
use crate::entity::Entity;
use crate::entity_id::{CellId, EntityKey, EntityKind, SheetId, SindexId};
use crate::error::{EngineError, Result};
use crate::sheet::{Axis, SheetInfo, SheetKind, Sindex};

/// Comparable projection of an entity field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Id(Uuid),
    List(Vec<FieldValue>),
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Int(n)
    }
}

impl From<usize> for FieldValue {
    fn from(n: usize) -> Self {
        FieldValue::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        FieldValue::Int(i64::from(n))
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<Uuid> for FieldValue {
    fn from(id: Uuid) -> Self {
        FieldValue::Id(id)
    }
}

impl From<SheetId> for FieldValue {
    fn from(id: SheetId) -> Self {
        FieldValue::Id(id.uuid())
    }
}

impl From<SindexId> for FieldValue {
    fn from(id: SindexId) -> Self {
        FieldValue::Id(id.uuid())
    }
}

impl From<CellId> for FieldValue {
    fn from(id: CellId) -> Self {
        FieldValue::Id(id.uuid())
    }
}

impl From<Axis> for FieldValue {
    fn from(axis: Axis) -> Self {
        FieldValue::Str(axis.tag().to_string())
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(values: Vec<T>) -> Self {
        FieldValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// A record the repository can filter and order.
pub trait Record: Clone {
    type Id: Copy + Eq + Ord + Hash + fmt::Debug + Into<Uuid>;

    const KIND: EntityKind;

    fn id(&self) -> Self::Id;

    /// Project a named field, `None` if the record has no such field.
    fn field(&self, name: &str) -> Option<FieldValue>;
}

impl Record for SheetInfo {
    type Id = SheetId;
    const KIND: EntityKind = EntityKind::Sheet;

    fn id(&self) -> SheetId {
        self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        Some(match name {
            "id" => self.id.into(),
            "name" => self.name.as_str().into(),
            "kind" => match self.kind {
                SheetKind::Regular => "regular".into(),
                SheetKind::Checker => "checker".into(),
            },
            "rows" => self.rows().into(),
            "cols" => self.cols().into(),
            _ => return None,
        })
    }
}

impl Record for Sindex {
    type Id = SindexId;
    const KIND: EntityKind = EntityKind::Sindex;

    fn id(&self) -> SindexId {
        self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        Some(match name {
            "id" => self.id.into(),
            "sheet_id" => self.sheet_id.into(),
            "axis" => self.axis.into(),
            "position" => self.position.into(),
            "size" => self.size.into(),
            "is_readonly" => self.is_readonly.into(),
            "is_freeze" => self.is_freeze.into(),
            _ => return None,
        })
    }
}

impl Record for Cell {
    type Id = CellId;
    const KIND: EntityKind = EntityKind::Cell;

    fn id(&self) -> CellId {
        self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        Some(match name {
            "id" => self.id.into(),
            "sheet_id" => self.sheet_id.into(),
            "row_id" => self.row_id.into(),
            "col_id" => self.col_id.into(),
            "background" => self.background.clone()?.into(),
            "has_formula" => self.formula.is_some().into(),
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Eq(FieldValue),
    In(Vec<FieldValue>),
    Gte(FieldValue),
    Lt(FieldValue),
}

impl Predicate {
    fn matches(&self, actual: &FieldValue) -> bool {
        match self {
            Predicate::Eq(expected) => actual == expected,
            Predicate::In(options) => options.contains(actual),
            Predicate::Gte(bound) => actual >= bound,
            Predicate::Lt(bound) => actual < bound,
        }
    }
}

/// Conjunction of field predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Predicate)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.clauses.push((field.to_string(), Predicate::Eq(value.into())));
        self
    }

    pub fn is_in<T: Into<FieldValue>>(mut self, field: &str, values: impl IntoIterator<Item = T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.clauses.push((field.to_string(), Predicate::In(values)));
        self
    }

    pub fn gte(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.clauses.push((field.to_string(), Predicate::Gte(value.into())));
        self
    }

    pub fn lt(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.clauses.push((field.to_string(), Predicate::Lt(value.into())));
        self
    }

    /// Add a clause using the `"field"` / `"field.__op"` lookup syntax.
    pub fn lookup(self, key: &str, value: impl Into<FieldValue>) -> Result<Self> {
        let value = value.into();
        let (field, op) = key.split_once(".__").unwrap_or((key, ""));
        match (op, value) {
            ("", value) => Ok(self.eq(field, value)),
            ("in", FieldValue::List(values)) => Ok(self.is_in(field, values)),
            ("in", value) => Ok(self.is_in(field, [value])),
            ("gte", value) => Ok(self.gte(field, value)),
            ("lt", value) => Ok(self.lt(field, value)),
            _ => Err(EngineError::Invariant(format!("unknown filter lookup: {key}"))),
        }
    }

    pub fn matches<E: Record>(&self, record: &E) -> bool {
        self.clauses.iter().all(|(field, predicate)| {
            record
                .field(field)
                .is_some_and(|actual| predicate.matches(&actual))
        })
    }
}

/// `(fields, ascending)` ordering; fields compare left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub fields: Vec<String>,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self { fields: vec![field.to_string()], ascending: true }
    }

    pub fn desc(field: &str) -> Self {
        Self { fields: vec![field.to_string()], ascending: false }
    }

    pub fn by(fields: &[&str], ascending: bool) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            ascending,
        }
    }

    fn sort<E: Record>(&self, records: &mut [E]) {
        records.sort_by(|a, b| {
            let ord = self
                .fields
                .iter()
                .map(|f| a.field(f).cmp(&b.field(f)))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal);
            if self.ascending { ord } else { ord.reverse() }
        });
    }
}

/// Storage for one entity kind.
pub trait Repository<E: Record> {
    /// Insert new records. Fails if any id already exists.
    fn add_many(&mut self, entities: Vec<E>) -> Result<()>;

    fn get_one_by_id(&self, id: E::Id) -> Result<E>;

    fn get_many(
        &self,
        filter: &Filter,
        order_by: Option<&OrderBy>,
        slice: Option<Range<usize>>,
    ) -> Result<Vec<E>>;

    /// Records for the given ids, in id order given; unknown ids are skipped.
    fn get_many_by_id(&self, ids: &[E::Id]) -> Result<Vec<E>>;

    /// Replace an existing record. Fails with `NotFound` if it is absent.
    fn update_one(&mut self, entity: E) -> Result<()>;

    fn update_many(&mut self, entities: Vec<E>) -> Result<()> {
        entities.into_iter().try_for_each(|e| self.update_one(e))
    }

    /// Remove records; unknown ids are ignored.
    fn remove_many(&mut self, ids: &[E::Id]) -> Result<()>;

    fn contains(&self, id: E::Id) -> bool;
}

/// In-memory repository keyed by id.
#[derive(Debug, Clone)]
pub struct MemoryRepository<E: Record> {
    records: BTreeMap<E::Id, E>,
}

impl<E: Record> Default for MemoryRepository<E> {
    fn default() -> Self {
        Self { records: BTreeMap::new() }
    }
}

impl<E: Record> MemoryRepository<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<E: Record> Repository<E> for MemoryRepository<E> {
    fn add_many(&mut self, entities: Vec<E>) -> Result<()> {
        if let Some(dup) = entities.iter().find(|e| self.records.contains_key(&e.id())) {
            return Err(EngineError::Invariant(format!(
                "{} {:?} already exists",
                E::KIND,
                dup.id()
            )));
        }
        for entity in entities {
            self.records.insert(entity.id(), entity);
        }
        Ok(())
    }

    fn get_one_by_id(&self, id: E::Id) -> Result<E> {
        self.records
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(E::KIND, id))
    }

    fn get_many(
        &self,
        filter: &Filter,
        order_by: Option<&OrderBy>,
        slice: Option<Range<usize>>,
    ) -> Result<Vec<E>> {
        let mut found: Vec<E> = self
            .records
            .values()
            .filter(|e| filter.matches(*e))
            .cloned()
            .collect();
        if let Some(order_by) = order_by {
            order_by.sort(&mut found);
        }
        if let Some(range) = slice {
            let end = range.end.min(found.len());
            let start = range.start.min(end);
            found = found.drain(start..end).collect();
        }
        Ok(found)
    }

    fn get_many_by_id(&self, ids: &[E::Id]) -> Result<Vec<E>> {
        Ok(ids.iter().filter_map(|id| self.records.get(id).cloned()).collect())
    }

    fn update_one(&mut self, entity: E) -> Result<()> {
        match self.records.get_mut(&entity.id()) {
            Some(slot) => {
                *slot = entity;
                Ok(())
            }
            None => Err(EngineError::not_found(E::KIND, entity.id())),
        }
    }

    fn remove_many(&mut self, ids: &[E::Id]) -> Result<()> {
        for id in ids {
            self.records.remove(id);
        }
        Ok(())
    }

    fn contains(&self, id: E::Id) -> bool {
        self.records.contains_key(&id)
    }
}

/// One repository per entity kind.
pub struct Repositories {
    pub sheets: Box<dyn Repository<SheetInfo>>,
    pub sindexes: Box<dyn Repository<Sindex>>,
    pub cells: Box<dyn Repository<Cell>>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            sheets: Box::new(MemoryRepository::<SheetInfo>::new()),
            sindexes: Box::new(MemoryRepository::<Sindex>::new()),
            cells: Box::new(MemoryRepository::<Cell>::new()),
        }
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        match key.kind {
            EntityKind::Sheet => self.sheets.contains(SheetId::from_uuid(key.id)),
            EntityKind::Sindex => self.sindexes.contains(SindexId::from_uuid(key.id)),
            EntityKind::Cell => self.cells.contains(CellId::from_uuid(key.id)),
        }
    }

    pub fn load(&self, key: EntityKey) -> Result<Entity> {
        Ok(match key.kind {
            EntityKind::Sheet => self.sheets.get_one_by_id(SheetId::from_uuid(key.id))?.into(),
            EntityKind::Sindex => self.sindexes.get_one_by_id(SindexId::from_uuid(key.id))?.into(),
            EntityKind::Cell => self.cells.get_one_by_id(CellId::from_uuid(key.id))?.into(),
        })
    }

    /// Persist an updated entity into the repository of its kind.
    pub fn save(&mut self, entity: Entity) -> Result<()> {
        match entity {
            Entity::Sheet(info) => self.sheets.update_one(info),
            Entity::Sindex(sindex) => self.sindexes.update_one(sindex),
            Entity::Cell(cell) => self.cells.update_one(cell),
        }
    }
}

impl Default for Repositories {
    fn default() -> Self {
        Self::in_memory()
    }
}
