use thiserror::Error;

use crate::data_type::StorageType;
use crate::sql::SqlError;

/// Errors returned by schema, table and database operations.
///
/// Field-level misuse (reading a null field, writing the wrong type, writing a
/// read-only column) is a programming error and panics instead; see
/// [`crate::Field`] and [`crate::FieldMut`].
#[derive(Debug, Error)]
pub enum MdbError {
    #[error("table {0:?} already exists in the database")]
    DuplicateTable(String),

    #[error("table {0:?} does not exist")]
    UnknownTable(String),

    #[error("column {column:?} already exists in table {table:?}")]
    DuplicateColumn { table: String, column: String },

    #[error("column {column:?} does not exist in table {table:?}")]
    UnknownColumn { table: String, column: String },

    #[error("column number {column} is out of range for table {table:?}")]
    ColumnOutOfRange { table: String, column: usize },

    /// Schema changes are only allowed while the table holds no rows.
    #[error("table {0:?} already holds rows, its schema can no longer change")]
    SchemaLocked(String),

    #[error("table {0:?} already has an identity column")]
    DuplicateIdentity(String),

    #[error("column {0:?} cannot be both nullable and unique")]
    NullableUnique(String),

    #[error("column {column:?} of table {table:?} cannot be indexed as {kind}")]
    NotIndexable {
        table: String,
        column: String,
        kind: &'static str,
    },

    /// Point lookups need a unique column backed by an index.
    #[error("column {column:?} of table {table:?} is not a unique indexed column")]
    NotIndexed { table: String, column: String },

    /// The index is the target of a foreign key and cannot be replaced.
    #[error("index on {table:?}.{column:?} is referenced by a foreign key")]
    IndexReferenced { table: String, column: String },

    #[error("foreign key target {table:?}.{column:?} must be unique and indexed")]
    BadForeignTarget { table: String, column: String },

    #[error("type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        expected: StorageType,
        found: Option<StorageType>,
    },

    #[error("duplicate key {key} in unique index on column {column}")]
    DuplicateKey { column: usize, key: String },

    #[error("row was not created by table {0:?}")]
    ForeignRow(String),

    #[error("row is already part of a table")]
    AlreadyInserted,

    #[error("row {0} does not exist")]
    UnknownRow(u32),

    #[error("row position {position} is out of range ({len} rows)")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("column {column:?} of table {table:?} is not nullable but holds NULL")]
    NullViolation { table: String, column: String },

    #[error("value {value} of column {column:?} has no match in {target:?}")]
    ForeignKeyViolation {
        column: String,
        target: String,
        value: String,
    },

    /// The result set of a query does not fit the table schema.
    #[error("result column {position} ({name:?}) does not match table {table:?}: {reason}")]
    SchemaMismatch {
        table: String,
        position: usize,
        name: String,
        reason: &'static str,
    },

    #[error("table {0:?} has no primary key column")]
    NoPrimaryKey(String),

    #[error(transparent)]
    Sql(#[from] SqlError),

    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, MdbError>;
