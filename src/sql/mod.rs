//! Boundary to the SQL data source.
//!
//! The store never talks to a driver directly: it runs queries through a
//! [SqlSource], reads result sets through a [Cursor] and binds statement
//! parameters through [Params]. Any driver binding can implement these
//! traits; [scripted::ScriptedSource] is an in-memory one.

pub mod scripted;

use thiserror::Error;
use tracing::warn;

use crate::column::ColumnFlags;
use crate::data_type::ColumnType;
use crate::row::Row;
use crate::value::Value;

/// Failure class reported by a SQL source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlErrorKind {
    ConnectFailed,
    AllocFailed,
    ExecFailed,
    FetchFailed,
    TransFailed,
}

/// Error raised by a SQL source, with the driver's diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct SqlError {
    pub kind: SqlErrorKind,
    pub message: String,
}

impl SqlError {
    pub fn new(kind: SqlErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

pub type SqlResult<T> = std::result::Result<T, SqlError>;

/// Driver type codes reported for result columns.
pub mod native {
    pub const CHAR: i16 = 1;
    pub const INTEGER: i16 = 4;
    pub const DOUBLE: i16 = 8;
    pub const VARCHAR: i16 = 12;
    pub const BIT: i16 = -7;
    pub const TYPE_TIMESTAMP: i16 = 93;
}

/// Description of one result set column.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorColumn {
    pub name: String,
    /// Driver type code, see [native].
    pub native_type: i16,
    /// Logical type the native type maps to.
    pub kind: ColumnType,
    /// Declared size; the maximum length for strings.
    pub size: usize,
    pub flags: ColumnFlags,
}

impl CursorColumn {
    /// Describes a column, deriving the driver type code from `kind`.
    pub fn new(name: impl Into<String>, kind: ColumnType, size: usize, flags: ColumnFlags) -> Self {
        let native_type = match kind {
            ColumnType::Int | ColumnType::Identity => native::INTEGER,
            ColumnType::Double => native::DOUBLE,
            ColumnType::Char | ColumnType::FixedString => native::CHAR,
            ColumnType::VarString => native::VARCHAR,
            ColumnType::Bool => native::BIT,
            ColumnType::DateTime | ColumnType::Timestamp => native::TYPE_TIMESTAMP,
        };
        Self {
            name: name.into(),
            native_type,
            kind,
            size,
            flags,
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.flags.contains(ColumnFlags::NULLABLE)
    }
}

/// Forward-only iterator over a query's result set.
pub trait Cursor {
    fn num_columns(&self) -> usize;

    fn column(&self, n: usize) -> &CursorColumn;

    /// Advances to the next row. Returns `false` once the set is exhausted.
    fn fetch(&mut self) -> SqlResult<bool>;

    /// Value of column `n` in the current row, converted to its logical type.
    fn value(&self, n: usize) -> Value;

    /// Copies the current row into `row`, column `n` into field `n`. NULLs
    /// clear the field.
    fn set_row(&self, row: &mut Row) {
        for n in 0..self.num_columns() {
            row.field_mut(n).load(&self.value(n));
        }
    }
}

/// Input parameters bound to a prepared statement.
pub trait Params {
    fn num_params(&self) -> usize;

    /// Value currently bound to parameter `n`.
    fn param(&self, n: usize) -> &Value;

    fn set_value(&mut self, n: usize, value: &Value);

    /// Binds field `n` of `row` to parameter `n`.
    fn set_row(&mut self, row: &Row) {
        for n in 0..self.num_params().min(row.column_count()) {
            self.set_value(n, &row.field(n).value());
        }
    }
}

/// A connection to a SQL data source.
pub trait SqlSource {
    fn open(&mut self, connect: &str) -> SqlResult<()>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Executes a statement, with bound parameters if given.
    fn exec_stmt(&mut self, stmt: &str, params: Option<&dyn Params>) -> SqlResult<()>;

    fn exec_query(&mut self, query: &str) -> SqlResult<Box<dyn Cursor>>;

    /// Prepares `count` parameters for `stmt`.
    fn create_params(&mut self, stmt: &str, count: usize) -> SqlResult<Box<dyn Params>>;

    fn in_trans(&self) -> bool;

    fn begin_trans(&mut self) -> SqlResult<()>;

    fn commit_trans(&mut self) -> SqlResult<()>;

    fn rollback_trans(&mut self) -> SqlResult<()>;
}

/// Scoped transaction: begins on construction and rolls back when dropped
/// unless [Transaction::commit] succeeded.
pub struct Transaction<'a, S: SqlSource + ?Sized> {
    source: &'a mut S,
    committed: bool,
}

impl<'a, S: SqlSource + ?Sized> Transaction<'a, S> {
    pub fn begin(source: &'a mut S) -> SqlResult<Self> {
        source.begin_trans()?;
        Ok(Self {
            source,
            committed: false,
        })
    }

    pub fn source(&mut self) -> &mut S {
        self.source
    }

    pub fn commit(mut self) -> SqlResult<()> {
        self.source.commit_trans()?;
        self.committed = true;
        Ok(())
    }
}

impl<S: SqlSource + ?Sized> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(err) = self.source.rollback_trans() {
            warn!(error = %err, "transaction rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::scripted::ScriptedSource;
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SqlError::new(SqlErrorKind::ExecFailed, "syntax error near FROM");
        assert_eq!(err.to_string(), "ExecFailed: syntax error near FROM");
    }

    #[test]
    fn test_native_types() {
        let col = CursorColumn::new("ts", ColumnType::Timestamp, 16, ColumnFlags::NULLABLE);
        assert_eq!(col.native_type, native::TYPE_TIMESTAMP);
        assert!(col.is_nullable());
        let col = CursorColumn::new("id", ColumnType::Identity, 4, ColumnFlags::empty());
        assert_eq!(col.native_type, native::INTEGER);
    }

    #[test]
    fn test_transaction_commit() {
        let mut source = ScriptedSource::new();
        source.open("memory").unwrap();
        let mut txn = Transaction::begin(&mut source).unwrap();
        assert!(txn.source().in_trans());
        txn.commit().unwrap();
        assert!(!source.in_trans());
        assert_eq!(source.transactions(), ["begin", "commit"]);
    }

    #[test]
    fn test_transaction_rolls_back_on_drop() {
        let mut source = ScriptedSource::new();
        source.open("memory").unwrap();
        {
            let mut txn = Transaction::begin(&mut source).unwrap();
            txn.source().exec_stmt("DELETE FROM t", None).unwrap();
        }
        assert!(!source.in_trans());
        assert_eq!(source.transactions(), ["begin", "rollback"]);
    }

    #[test]
    fn test_failed_commit_still_rolls_back() {
        let mut source = ScriptedSource::new();
        source.open("memory").unwrap();
        source.fail_commit();
        let txn = Transaction::begin(&mut source).unwrap();
        let err = txn.commit().unwrap_err();
        assert_eq!(err.kind, SqlErrorKind::TransFailed);
        assert_eq!(source.transactions(), ["begin", "rollback"]);
    }
}
