use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use allocative::Allocative;

use crate::data_type::StorageType;
use crate::error::{MdbError, Result};
use crate::row::{Row, RowId};
use crate::value::Value;

/// An index owned by its column and shared, read-only, with the foreign-key
/// columns pointing at it.
pub type SharedIndex = Rc<RefCell<Index>>;

/// The lookup structures a column can be indexed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Allocative)]
pub enum IndexKind {
    /// Integer keys, unique or not. Without uniqueness the most recent row
    /// inserted for a key wins.
    Int,
    /// Unique integer keys.
    IntMap,
    /// Unique string keys.
    StrMap,
}

impl IndexKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Int => "IntIndex",
            Self::IntMap => "IntMapIndex",
            Self::StrMap => "StrMapIndex",
        }
    }

    /// Storage type of the column values used as keys.
    pub fn key_type(self) -> StorageType {
        match self {
            Self::Int | Self::IntMap => StorageType::Int,
            Self::StrMap => StorageType::Str,
        }
    }
}

#[derive(Debug, Allocative)]
enum Keys {
    Int(HashMap<i32, RowId>),
    Str(HashMap<String, RowId>),
}

/// Maps the value of one column to the row holding it.
///
/// Entries are keyed by the row's *current* field value: a row must be
/// removed before its indexed field changes, otherwise the removal looks up
/// the new value and misses the old entry. NULL values are never indexed.
#[derive(Debug, Allocative)]
pub struct Index {
    column: usize,
    unique: bool,
    kind: IndexKind,
    keys: Keys,
}

impl Index {
    /// Creates an empty index on column number `column`.
    ///
    /// `IntMap` and `StrMap` indexes are always unique. `capacity` is the
    /// number of entries to reserve room for.
    pub fn new(column: usize, kind: IndexKind, unique: bool, capacity: usize) -> Self {
        let keys = match kind {
            IndexKind::Int | IndexKind::IntMap => Keys::Int(HashMap::with_capacity(capacity)),
            IndexKind::StrMap => Keys::Str(HashMap::with_capacity(capacity)),
        };
        Self {
            column,
            unique: unique || kind != IndexKind::Int,
            kind,
            keys,
        }
    }

    pub fn into_shared(self) -> SharedIndex {
        Rc::new(RefCell::new(self))
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn len(&self) -> usize {
        match &self.keys {
            Keys::Int(map) => map.len(),
            Keys::Str(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserves room for `additional` more keys.
    pub fn reserve(&mut self, additional: usize) {
        match &mut self.keys {
            Keys::Int(map) => map.reserve(additional),
            Keys::Str(map) => map.reserve(additional),
        }
    }

    /// Fails with [MdbError::DuplicateKey] if `row` cannot be added to a
    /// unique index because its key is taken.
    pub fn check_row(&self, row: &Row) -> Result<()> {
        let field = row.field(self.column);
        if !self.unique || field.is_null() {
            return Ok(());
        }
        let taken = match &self.keys {
            Keys::Int(map) => map.contains_key(&field.get_int()),
            Keys::Str(map) => map.contains_key(field.get_str()),
        };
        if taken {
            return Err(MdbError::DuplicateKey {
                column: self.column,
                key: field.value().to_string(),
            });
        }
        Ok(())
    }

    /// Adds `row` under its current key.
    pub fn add_row(&mut self, id: RowId, row: &Row) -> Result<()> {
        self.check_row(row)?;
        let field = row.field(self.column);
        if field.is_null() {
            return Ok(());
        }
        match &mut self.keys {
            Keys::Int(map) => {
                map.insert(field.get_int(), id);
            }
            Keys::Str(map) => {
                map.insert(field.get_str().to_owned(), id);
            }
        }
        Ok(())
    }

    /// Whether the entry under `row`'s current key points at `id`.
    pub fn owns(&self, id: RowId, row: &Row) -> bool {
        let field = row.field(self.column);
        if field.is_null() {
            return false;
        }
        let entry = match &self.keys {
            Keys::Int(map) => map.get(&field.get_int()),
            Keys::Str(map) => map.get(field.get_str()),
        };
        entry == Some(&id)
    }

    /// Removes the entry of `row` under its current key. An entry that now
    /// belongs to another row is left alone.
    pub fn remove_row(&mut self, id: RowId, row: &Row) {
        let field = row.field(self.column);
        if field.is_null() {
            return;
        }
        match &mut self.keys {
            Keys::Int(map) => {
                let key = field.get_int();
                if map.get(&key) == Some(&id) {
                    map.remove(&key);
                }
            }
            Keys::Str(map) => {
                let key = field.get_str();
                if map.get(key) == Some(&id) {
                    map.remove(key);
                }
            }
        }
    }

    /// Looks up the row holding `key`. NULL never matches.
    pub fn find_row(&self, key: &Value) -> Result<Option<RowId>> {
        match (&self.keys, key) {
            (_, Value::Null) => Ok(None),
            (Keys::Int(map), Value::Int(k)) => Ok(map.get(k).copied()),
            (Keys::Str(map), Value::Str(k)) => Ok(map.get(k.as_str()).copied()),
            (_, other) => Err(MdbError::TypeMismatch {
                expected: self.kind.key_type(),
                found: other.storage_type(),
            }),
        }
    }

    /// Drops every entry; the index stays bound to its column.
    pub fn truncate(&mut self) {
        match &mut self.keys {
            Keys::Int(map) => map.clear(),
            Keys::Str(map) => map.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, ColumnFlags};
    use crate::data_type::ColumnType;
    use crate::row::{RowLayout, RowStatus};

    fn layout() -> Rc<RowLayout> {
        let columns = vec![
            Column::new("n".into(), ColumnType::Int, 0, ColumnFlags::NULLABLE),
            Column::new("s".into(), ColumnType::VarString, 8, ColumnFlags::NULLABLE),
        ];
        Rc::new(RowLayout::new("t", &columns))
    }

    fn row(layout: &Rc<RowLayout>, n: Option<i32>, s: Option<&str>) -> Row {
        let mut row = Row::new(Rc::clone(layout));
        row.field_mut(0).set_value(&n.into());
        row.field_mut(1).set_value(&s.into());
        row.set_status(RowStatus::INSERTED);
        row
    }

    // ─────────────────────────────────────────────────────────────
    // Test 1 : unique int index
    // ─────────────────────────────────────────────────────────────
    #[test]
    fn test_int_map_add_find_remove() {
        let layout = layout();
        let mut index = Index::new(0, IndexKind::IntMap, false, 4);
        assert!(index.is_unique());

        let a = row(&layout, Some(1), None);
        let b = row(&layout, Some(2), None);
        index.add_row(RowId(0), &a).unwrap();
        index.add_row(RowId(1), &b).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.find_row(&Value::Int(2)).unwrap(), Some(RowId(1)));
        assert_eq!(index.find_row(&Value::Int(3)).unwrap(), None);

        index.remove_row(RowId(0), &a);
        assert_eq!(index.find_row(&Value::Int(1)).unwrap(), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_unique_rejects_duplicate() {
        let layout = layout();
        let mut index = Index::new(0, IndexKind::Int, true, 0);
        index.add_row(RowId(0), &row(&layout, Some(5), None)).unwrap();

        let err = index.add_row(RowId(1), &row(&layout, Some(5), None));
        assert!(matches!(err, Err(MdbError::DuplicateKey { column: 0, .. })));
        assert_eq!(index.find_row(&Value::Int(5)).unwrap(), Some(RowId(0)));
    }

    // ─────────────────────────────────────────────────────────────
    // Test 2 : non-unique int index
    // ─────────────────────────────────────────────────────────────
    #[test]
    fn test_non_unique_keeps_latest() {
        let layout = layout();
        let mut index = Index::new(0, IndexKind::Int, false, crate::config::DEF_MAP_SIZE);
        let a = row(&layout, Some(5), None);
        let b = row(&layout, Some(5), None);
        index.add_row(RowId(0), &a).unwrap();
        index.add_row(RowId(1), &b).unwrap();
        assert_eq!(index.find_row(&Value::Int(5)).unwrap(), Some(RowId(1)));

        // removing the shadowed row keeps the newer entry
        index.remove_row(RowId(0), &a);
        assert_eq!(index.find_row(&Value::Int(5)).unwrap(), Some(RowId(1)));
    }

    // ─────────────────────────────────────────────────────────────
    // Test 3 : string index
    // ─────────────────────────────────────────────────────────────
    #[test]
    fn test_str_map() {
        let layout = layout();
        let mut index = Index::new(1, IndexKind::StrMap, false, 0);
        index.reserve(16);
        index.add_row(RowId(3), &row(&layout, None, Some("alpha"))).unwrap();
        // null keys are not indexed
        index.add_row(RowId(4), &row(&layout, None, None)).unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.find_row(&Value::from("alpha")).unwrap(), Some(RowId(3)));
        assert_eq!(index.find_row(&Value::Null).unwrap(), None);
        assert!(matches!(
            index.find_row(&Value::Int(1)),
            Err(MdbError::TypeMismatch {
                expected: StorageType::Str,
                found: Some(StorageType::Int)
            })
        ));
    }

    // ─────────────────────────────────────────────────────────────
    // Test 4 : stale key on removal
    // ─────────────────────────────────────────────────────────────
    #[test]
    fn test_remove_after_mutation_misses_entry() {
        let layout = layout();
        let mut index = Index::new(0, IndexKind::IntMap, true, 0);
        let mut a = row(&layout, Some(1), None);
        index.add_row(RowId(0), &a).unwrap();

        a.field_mut(0).set_int(2);
        index.remove_row(RowId(0), &a);
        // the entry under the old key survives
        assert_eq!(index.find_row(&Value::Int(1)).unwrap(), Some(RowId(0)));
    }

    #[test]
    fn test_truncate_keeps_binding() {
        let layout = layout();
        let mut index = Index::new(0, IndexKind::IntMap, true, 0);
        index.add_row(RowId(0), &row(&layout, Some(1), None)).unwrap();
        index.truncate();
        assert!(index.is_empty());
        assert_eq!(index.column(), 0);
        index.add_row(RowId(0), &row(&layout, Some(1), None)).unwrap();
        assert_eq!(index.len(), 1);
    }
}
