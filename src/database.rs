use std::io::{Read, Write};

use allocative::Allocative;
use tracing::{debug, warn};

use crate::column::ColumnFlags;
use crate::config::MdbConfig;
use crate::error::{MdbError, Result};
use crate::sql::SqlSource;
use crate::table::Table;

/// The in-memory database: an ordered set of uniquely named tables.
///
/// Tables keep the order they were added in. Loading, saving and the binary
/// stream all walk them in that order, so a table referenced by foreign keys
/// must be added before the tables pointing at it.
#[derive(Debug, Default, Allocative)]
pub struct Mdb {
    config: MdbConfig,
    tables: Vec<Table>,
}

impl Mdb {
    pub fn new() -> Self {
        Self::default()
    }

    /// A database whose new tables inherit `config`.
    pub fn with_config(config: MdbConfig) -> Self {
        Self {
            config,
            tables: Vec::new(),
        }
    }

    pub fn config(&self) -> &MdbConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> + '_ {
        self.tables.iter()
    }

    /// Table names in insertion order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(Table::name).collect()
    }

    pub fn find_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name() == name)
    }

    pub fn find_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.name() == name)
    }

    /// Like [Mdb::find_table], failing with [MdbError::UnknownTable].
    pub fn table(&self, name: &str) -> Result<&Table> {
        self.find_table(name)
            .ok_or_else(|| MdbError::UnknownTable(name.to_owned()))
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.find_table_mut(name)
            .ok_or_else(|| MdbError::UnknownTable(name.to_owned()))
    }

    /// Takes ownership of `table`.
    ///
    /// # Errors
    /// Returns an error if a table with the same name already exists.
    pub fn add_table(&mut self, table: Table) -> Result<&mut Table> {
        if self.find_table(table.name()).is_some() {
            return Err(MdbError::DuplicateTable(table.name().to_owned()));
        }
        debug!(table = table.name(), "table added");
        let n = self.tables.len();
        self.tables.push(table);
        Ok(&mut self.tables[n])
    }

    /// Creates an empty table using the database configuration.
    pub fn create_table(&mut self, name: &str) -> Result<&mut Table> {
        self.add_table(Table::with_config(name, self.config.clone()))
    }

    /// Creates a table from the result set of `query`, `SELECT * FROM
    /// <name>` when `None`: the columns mirror the result columns and every
    /// row is loaded as original.
    ///
    /// On any failure the database is left unchanged.
    pub fn create_table_from_sql<S: SqlSource + ?Sized>(
        &mut self,
        name: &str,
        source: &mut S,
        query: Option<&str>,
    ) -> Result<&mut Table> {
        if self.find_table(name).is_some() {
            return Err(MdbError::DuplicateTable(name.to_owned()));
        }
        let query = match query {
            Some(query) => query.to_owned(),
            None => format!("SELECT * FROM {name}"),
        };
        let mut table = Table::with_config(name, self.config.clone());
        match populate(&mut table, source, &query) {
            Ok(rows) => debug!(table = name, %query, rows, "table created from query"),
            Err(err) => {
                warn!(table = name, %query, error = %err, "table creation aborted");
                return Err(err);
            }
        }
        self.add_table(table)
    }

    /// Removes a table and hands it back.
    ///
    /// Foreign keys of other tables pointing at it keep working against its
    /// index, which outlives the table while referenced.
    pub fn drop_table(&mut self, name: &str) -> Result<Table> {
        let n = self
            .tables
            .iter()
            .position(|t| t.name() == name)
            .ok_or_else(|| MdbError::UnknownTable(name.to_owned()))?;
        debug!(table = name, "table dropped");
        Ok(self.tables.remove(n))
    }

    /// Adds a column to `table` referencing `target_table.target_column`.
    pub fn add_foreign_column(
        &mut self,
        table: &str,
        name: &str,
        flags: ColumnFlags,
        target_table: &str,
        target_column: &str,
    ) -> Result<usize> {
        let foreign = self.table(target_table)?.foreign_key(target_column)?;
        self.table_mut(table)?
            .add_foreign_column(name, flags, foreign)
    }

    /// Whether any non-temporary table changed since the last load or save.
    pub fn modified(&self) -> bool {
        self.tables.iter().any(Table::modified)
    }

    /// Writes every non-temporary table in order.
    pub fn write_to<W: Write + ?Sized>(&mut self, w: &mut W) -> Result<()> {
        for table in &mut self.tables {
            table.write_to(w)?;
        }
        Ok(())
    }

    /// Reads a stream written by [Mdb::write_to] into a database with the
    /// same tables and schemas.
    pub fn read_from<R: Read + ?Sized>(&mut self, r: &mut R) -> Result<()> {
        for table in &mut self.tables {
            table.read_from(r)?;
        }
        Ok(())
    }

    /// Loads every non-temporary table from `source`, returning the total
    /// number of rows. Stops at the first failing table.
    pub fn load_from<S: SqlSource + ?Sized>(&mut self, source: &mut S) -> Result<usize> {
        let mut rows = 0;
        for table in &mut self.tables {
            rows += table.load_from(source)?;
        }
        Ok(rows)
    }

    /// Saves every modified table, each in its own transaction, returning
    /// the number of statements run. Stops at the first failing table.
    pub fn save_to<S: SqlSource + ?Sized>(&mut self, source: &mut S) -> Result<usize> {
        let mut statements = 0;
        for table in &mut self.tables {
            statements += table.save_to(source)?;
        }
        Ok(statements)
    }

    /// Heap bytes held by every table.
    pub fn memory_usage(&self) -> usize {
        allocative::size_of_unique_allocated_data(self)
    }
}

fn populate<S: SqlSource + ?Sized>(table: &mut Table, source: &mut S, query: &str) -> Result<usize> {
    let mut cursor = source.exec_query(query)?;
    for n in 0..cursor.num_columns() {
        let column = cursor.column(n);
        table.add_column(&column.name, column.kind, column.size, column.flags)?;
    }
    let columns: Vec<usize> = (0..cursor.num_columns()).collect();
    let mut rows = 0;
    while cursor.fetch()? {
        let row = table.load_row(cursor.as_ref(), &columns)?;
        table.insert_row(row)?;
        rows += 1;
    }
    table.mark_saved();
    Ok(rows)
}
