//! Pairing of two table columns.
//!
//! A [Join] only records and validates which columns relate two tables; the
//! crate does not evaluate joins.

use crate::database::Mdb;
use crate::error::{MdbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// One end of a join: a table and a column number in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSide {
    table: String,
    column: usize,
}

impl JoinSide {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(&self) -> usize {
        self.column
    }

    fn resolve(mdb: &Mdb, table: &str, column: &str) -> Result<Self> {
        let column = mdb.table(table)?.column_position(column)?;
        Ok(Self {
            table: table.to_owned(),
            column,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    kind: JoinKind,
    left: JoinSide,
    right: JoinSide,
}

impl Join {
    /// Pairs `left.0`.`left.1` with `right.0`.`right.1`. Both columns must
    /// exist and store the same type.
    pub fn new(mdb: &Mdb, kind: JoinKind, left: (&str, &str), right: (&str, &str)) -> Result<Self> {
        let left = JoinSide::resolve(mdb, left.0, left.1)?;
        let right = JoinSide::resolve(mdb, right.0, right.1)?;
        let expected = mdb.table(&left.table)?.column(left.column)?.storage();
        let found = mdb.table(&right.table)?.column(right.column)?.storage();
        if expected != found {
            return Err(MdbError::TypeMismatch {
                expected,
                found: Some(found),
            });
        }
        Ok(Self { kind, left, right })
    }

    /// Inner join from a foreign-key column to the column it references.
    pub fn foreign(mdb: &Mdb, table: &str, column: &str) -> Result<Self> {
        let source = mdb.table(table)?;
        let n = source.column_position(column)?;
        let foreign = source.columns()[n]
            .foreign()
            .ok_or_else(|| MdbError::BadForeignTarget {
                table: table.to_owned(),
                column: column.to_owned(),
            })?;
        Self::new(
            mdb,
            JoinKind::Inner,
            (table, column),
            (foreign.table(), foreign.column()),
        )
    }

    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    pub fn left(&self) -> &JoinSide {
        &self.left
    }

    pub fn right(&self) -> &JoinSide {
        &self.right
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnFlags;
    use crate::data_type::{ColumnType, StorageType};

    fn mdb() -> Mdb {
        let mut mdb = Mdb::new();
        let users = mdb.create_table("users").unwrap();
        users
            .add_column("id", ColumnType::Identity, 0, ColumnFlags::empty())
            .unwrap();
        users
            .add_column("name", ColumnType::VarString, 12, ColumnFlags::empty())
            .unwrap();
        mdb.create_table("posts").unwrap();
        mdb.add_foreign_column("posts", "author", ColumnFlags::empty(), "users", "id")
            .unwrap();
        mdb.table_mut("posts")
            .unwrap()
            .add_column("title", ColumnType::VarString, 40, ColumnFlags::NULLABLE)
            .unwrap();
        mdb
    }

    #[test]
    fn test_join_between_int_columns() {
        let mdb = mdb();
        let join = Join::new(&mdb, JoinKind::Left, ("posts", "author"), ("users", "id")).unwrap();
        assert_eq!(join.kind(), JoinKind::Left);
        assert_eq!(join.left().table(), "posts");
        assert_eq!(join.left().column(), 0);
        assert_eq!(join.right().column(), 0);
    }

    #[test]
    fn test_join_through_foreign_key() {
        let mdb = mdb();
        let join = Join::foreign(&mdb, "posts", "author").unwrap();
        assert_eq!(join.right().table(), "users");
        assert_eq!(join.kind(), JoinKind::Inner);
        assert!(matches!(
            Join::foreign(&mdb, "posts", "title"),
            Err(MdbError::BadForeignTarget { .. })
        ));
    }

    #[test]
    fn test_join_validation() {
        let mdb = mdb();
        assert!(matches!(
            Join::new(&mdb, JoinKind::Inner, ("posts", "title"), ("users", "id")),
            Err(MdbError::TypeMismatch {
                expected: StorageType::Str,
                found: Some(StorageType::Int)
            })
        ));
        assert!(matches!(
            Join::new(&mdb, JoinKind::Inner, ("nope", "id"), ("users", "id")),
            Err(MdbError::UnknownTable(_))
        ));
        assert!(matches!(
            Join::new(&mdb, JoinKind::Inner, ("users", "nope"), ("users", "id")),
            Err(MdbError::UnknownColumn { .. })
        ));
    }
}
