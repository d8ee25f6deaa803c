use std::fmt;
use std::ops::BitOr;

use allocative::Allocative;

use crate::data_type::{ColumnType, StorageType};
use crate::index::SharedIndex;
use crate::value::Value;

/// Attribute set of a [Column].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Allocative)]
pub struct ColumnFlags(u8);

impl ColumnFlags {
    pub const NULLABLE: Self = Self(1);
    pub const UNIQUE: Self = Self(1 << 1);
    pub const FOREIGN_KEY: Self = Self(1 << 2);
    pub const PRIMARY_KEY: Self = Self(1 << 3);
    /// Kept in memory only, never read from or written to a SQL source.
    pub const TRANSIENT: Self = Self(1 << 4);
    /// Rejected by the typed setters.
    pub const READ_ONLY: Self = Self(1 << 5);

    const NAMES: [(Self, &'static str); 6] = [
        (Self::NULLABLE, "NULLABLE"),
        (Self::UNIQUE, "UNIQUE"),
        (Self::FOREIGN_KEY, "FOREIGN_KEY"),
        (Self::PRIMARY_KEY, "PRIMARY_KEY"),
        (Self::TRANSIENT, "TRANSIENT"),
        (Self::READ_ONLY, "READ_ONLY"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for ColumnFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for ColumnFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

/// Reference from a foreign-key column to the unique column it points at.
///
/// The index handle is a lookup path only; the referenced column keeps
/// ownership of its index.
#[derive(Clone, Allocative)]
pub struct ForeignKey {
    pub(crate) table: String,
    pub(crate) column: String,
    pub(crate) kind: ColumnType,
    pub(crate) length: usize,
    #[allocative(skip)]
    pub(crate) index: SharedIndex,
}

impl ForeignKey {
    /// Name of the referenced table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Name of the referenced column.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Returns `true` if the referenced column holds `key`.
    pub fn contains(&self, key: &Value) -> bool {
        matches!(self.index.borrow().find_row(key), Ok(Some(_)))
    }
}

impl fmt::Debug for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Schema descriptor of one table attribute.
///
/// A column is immutable once added to a table, apart from its optional
/// index which may be replaced while the table is still empty.
#[derive(Clone, Allocative)]
pub struct Column {
    name: String,
    kind: ColumnType,
    length: usize,
    alloc_size: usize,
    flags: ColumnFlags,
    foreign: Option<ForeignKey>,
    index: Option<SharedIndex>,
}

impl Column {
    pub(crate) fn new(name: String, kind: ColumnType, length: usize, flags: ColumnFlags) -> Self {
        let length = if kind.is_string() { length } else { 0 };
        Self {
            name,
            kind,
            length,
            alloc_size: kind.alloc_size(length),
            flags,
            foreign: None,
            index: None,
        }
    }

    /// Builds a column mirroring the referenced column of `foreign`.
    /// Identity targets collapse to plain integers.
    pub(crate) fn new_foreign(name: String, flags: ColumnFlags, foreign: ForeignKey) -> Self {
        let kind = match foreign.kind {
            ColumnType::Identity => ColumnType::Int,
            other => other,
        };
        let mut column = Self::new(name, kind, foreign.length, flags | ColumnFlags::FOREIGN_KEY);
        column.foreign = Some(foreign);
        column
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The logical type declared for this column.
    pub fn kind(&self) -> ColumnType {
        self.kind
    }

    /// The [Value](crate::Value) tag this column stores.
    pub fn storage(&self) -> StorageType {
        self.kind.storage()
    }

    /// Declared maximum length, only meaningful for string columns.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Bytes reserved in a row buffer.
    pub fn alloc_size(&self) -> usize {
        self.alloc_size
    }

    pub fn flags(&self) -> ColumnFlags {
        self.flags
    }

    pub fn is_nullable(&self) -> bool {
        self.flags.contains(ColumnFlags::NULLABLE)
    }

    pub fn is_unique(&self) -> bool {
        self.flags.contains(ColumnFlags::UNIQUE)
    }

    pub fn is_primary_key(&self) -> bool {
        self.flags.contains(ColumnFlags::PRIMARY_KEY)
    }

    pub fn is_transient(&self) -> bool {
        self.flags.contains(ColumnFlags::TRANSIENT)
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(ColumnFlags::READ_ONLY)
    }

    pub fn is_identity(&self) -> bool {
        self.kind == ColumnType::Identity
    }

    pub fn foreign(&self) -> Option<&ForeignKey> {
        self.foreign.as_ref()
    }

    pub fn index(&self) -> Option<&SharedIndex> {
        self.index.as_ref()
    }

    /// Replaces the column's index, dropping the previous one.
    pub(crate) fn set_index(&mut self, index: Option<SharedIndex>) {
        self.index = index;
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("length", &self.length)
            .field("alloc_size", &self.alloc_size)
            .field("flags", &self.flags)
            .field("foreign", &self.foreign)
            .field("indexed", &self.index.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Index, IndexKind};

    // ─────────────────────────────────────────────────────────────
    // Test 1 : Creation
    // ─────────────────────────────────────────────────────────────
    #[test]
    fn test_column_new() {
        let col = Column::new("age".into(), ColumnType::Int, 99, ColumnFlags::NULLABLE);

        assert_eq!(col.name(), "age");
        assert_eq!(col.kind(), ColumnType::Int);
        assert_eq!(col.storage(), StorageType::Int);
        // length only applies to strings
        assert_eq!(col.length(), 0);
        assert_eq!(col.alloc_size(), 4);
        assert!(col.is_nullable());
        assert!(!col.is_unique());
        assert!(col.index().is_none());
    }

    // ─────────────────────────────────────────────────────────────
    // Test 2 : Flags
    // ─────────────────────────────────────────────────────────────
    #[test]
    fn test_flags() {
        let flags = ColumnFlags::UNIQUE | ColumnFlags::PRIMARY_KEY;
        assert!(flags.contains(ColumnFlags::UNIQUE));
        assert!(flags.contains(ColumnFlags::PRIMARY_KEY));
        assert!(!flags.contains(ColumnFlags::NULLABLE));
        assert!(!flags.without(ColumnFlags::UNIQUE).contains(ColumnFlags::UNIQUE));
        assert_eq!(format!("{flags:?}"), "{UNIQUE, PRIMARY_KEY}");
        assert!(ColumnFlags::empty().contains(ColumnFlags::empty()));
    }

    // ─────────────────────────────────────────────────────────────
    // Test 3 : Foreign key mirrors its target
    // ─────────────────────────────────────────────────────────────
    #[test]
    fn test_foreign_column_collapses_identity() {
        let index = Index::new(0, IndexKind::Int, true, 0).into_shared();
        let foreign = ForeignKey {
            table: "users".into(),
            column: "id".into(),
            kind: ColumnType::Identity,
            length: 0,
            index,
        };
        let col = Column::new_foreign("user_id".into(), ColumnFlags::empty(), foreign);

        assert_eq!(col.kind(), ColumnType::Int);
        assert!(!col.is_identity());
        assert!(col.flags().contains(ColumnFlags::FOREIGN_KEY));
        assert_eq!(col.foreign().unwrap().table(), "users");
        assert_eq!(col.foreign().unwrap().column(), "id");
        assert!(!col.foreign().unwrap().contains(&Value::Int(1)));
    }

    #[test]
    fn test_foreign_string_column_keeps_length() {
        let index = Index::new(0, IndexKind::StrMap, true, 0).into_shared();
        let foreign = ForeignKey {
            table: "codes".into(),
            column: "code".into(),
            kind: ColumnType::FixedString,
            length: 6,
            index,
        };
        let col = Column::new_foreign("code".into(), ColumnFlags::NULLABLE, foreign);
        assert_eq!(col.kind(), ColumnType::FixedString);
        assert_eq!(col.length(), 6);
        assert_eq!(col.alloc_size(), 8);
    }
}
