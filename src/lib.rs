pub mod column;
pub mod config;
pub mod data_type;
pub mod database;
pub mod error;
pub mod field;
pub mod index;
pub mod join;
pub mod row;
pub mod sql;
mod stream;
pub mod table;
pub mod value;
pub mod where_clause;

pub use column::{Column, ColumnFlags, ForeignKey};
pub use config::MdbConfig;
pub use data_type::{ColumnType, StorageType};
pub use database::Mdb;
pub use error::{MdbError, Result};
pub use field::{Field, FieldMut};
pub use index::{Index, IndexKind};
pub use join::{Join, JoinKind};
pub use row::{Row, RowId, RowLayout, RowStatus};
pub use sql::{Cursor, CursorColumn, Params, SqlError, SqlErrorKind, SqlSource, Transaction};
pub use table::{RowSet, SortKey, Table, TableHooks};
pub use value::{Timestamp, Value};
pub use where_clause::{CmpOp, Logic, Where};
