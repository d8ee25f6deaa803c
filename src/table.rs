use std::cmp::Ordering;
use std::fmt;
use std::io::{self, Read, Write};
use std::rc::Rc;

use allocative::Allocative;
use tracing::{debug, trace, warn};

use crate::column::{Column, ColumnFlags, ForeignKey};
use crate::config::MdbConfig;
use crate::data_type::ColumnType;
use crate::error::{MdbError, Result};
use crate::field;
use crate::index::{Index, IndexKind, SharedIndex};
use crate::row::{Row, RowId, RowLayout, RowStatus};
use crate::sql::{Cursor, SqlSource, Transaction};
use crate::stream;
use crate::value::Value;
use crate::where_clause::Where;

/// Callbacks run around row insertion and deletion. Every method defaults to
/// doing nothing.
pub trait TableHooks {
    /// Runs before any check, and may still fill in fields.
    fn on_before_insert(&mut self, _row: &mut Row) {}

    fn on_after_insert(&mut self, _id: RowId, _row: &Row) {}

    fn on_before_delete(&mut self, _id: RowId, _row: &Row) {}

    fn on_after_delete(&mut self, _id: RowId) {}
}

/// One sort criterion of [RowSet::sort_by].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub column: usize,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(column: usize) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    pub fn desc(column: usize) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

/// Handles of the rows matched by [Table::select], in table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    ids: Vec<RowId>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[RowId] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = RowId> + '_ {
        self.ids.iter().copied()
    }

    /// The rows behind the handles. Handles deleted since the selection are
    /// skipped.
    pub fn rows<'t>(&'t self, table: &'t Table) -> impl Iterator<Item = &'t Row> + 't {
        self.ids.iter().filter_map(move |id| table.row(*id))
    }

    /// Orders the set by `keys`, the first key deciding first. NULL sorts
    /// before any value; rows comparing equal keep their relative order.
    ///
    /// # Panics
    /// Panics if a key names a column out of range.
    pub fn sort_by(&mut self, table: &Table, keys: &[SortKey]) {
        self.ids.sort_by(|a, b| {
            let (Some(a), Some(b)) = (table.row(*a), table.row(*b)) else {
                return Ordering::Equal;
            };
            for key in keys {
                let mut ord = a.field(key.column).compare_field(&b.field(key.column));
                if key.descending {
                    ord = ord.reverse();
                }
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    /// Keeps the first `count` handles.
    pub fn limit(mut self, count: usize) -> Self {
        self.ids.truncate(count);
        self
    }
}

impl FromIterator<RowId> for RowSet {
    fn from_iter<I: IntoIterator<Item = RowId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for RowSet {
    type Item = RowId;
    type IntoIter = std::vec::IntoIter<RowId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}

#[derive(Debug, Clone, Copy, Allocative)]
struct Identity {
    column: usize,
    next: i32,
}

/// A named collection of rows sharing one schema.
///
/// Rows live in slots addressed by [RowId]; the table also keeps their
/// insertion order, which [Table::row_at] and [Table::select] follow. Every
/// indexed column is kept in sync on insert, delete and [Table::update_row].
#[derive(Allocative)]
pub struct Table {
    name: String,
    temporary: bool,
    config: MdbConfig,
    columns: Vec<Column>,
    layout: Rc<RowLayout>,
    slots: Vec<Option<Row>>,
    free: Vec<RowId>,
    order: Vec<RowId>,
    identity: Option<Identity>,
    had_insert: bool,
    had_delete: bool,
    /// Primary keys of deleted rows that exist in the SQL source.
    deleted_keys: Vec<Value>,
    #[allocative(skip)]
    hooks: Option<Box<dyn TableHooks>>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, MdbConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: MdbConfig) -> Self {
        let name = name.into();
        let layout = Rc::new(RowLayout::new(&name, &[]));
        Self {
            name,
            temporary: false,
            config,
            columns: Vec::new(),
            layout,
            slots: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
            identity: None,
            had_insert: false,
            had_delete: false,
            deleted_keys: Vec::new(),
            hooks: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &MdbConfig {
        &self.config
    }

    /// Temporary tables are skipped by stream and SQL persistence and never
    /// report modifications.
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn set_temporary(&mut self, temporary: bool) {
        self.temporary = temporary;
    }

    pub fn set_hooks(&mut self, hooks: impl TableHooks + 'static) {
        self.hooks = Some(Box::new(hooks));
    }

    // ---- schema ----

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, n: usize) -> Result<&Column> {
        self.columns.get(n).ok_or_else(|| MdbError::ColumnOutOfRange {
            table: self.name.clone(),
            column: n,
        })
    }

    pub fn column_position(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| MdbError::UnknownColumn {
                table: self.name.clone(),
                column: name.to_owned(),
            })
    }

    /// The buffer layout shared by the rows of this table.
    pub fn layout(&self) -> &Rc<RowLayout> {
        &self.layout
    }

    /// First column flagged as primary key, the identity column if any.
    pub fn primary_key(&self) -> Option<usize> {
        self.columns.iter().position(Column::is_primary_key)
    }

    /// Value the identity column hands out next.
    pub fn next_identity(&self) -> Option<i32> {
        self.identity.map(|ident| ident.next)
    }

    fn ensure_empty(&self) -> Result<()> {
        if self.order.is_empty() {
            Ok(())
        } else {
            Err(MdbError::SchemaLocked(self.name.clone()))
        }
    }

    fn check_new_column(&self, name: &str, flags: ColumnFlags) -> Result<()> {
        self.ensure_empty()?;
        if self.columns.iter().any(|c| c.name() == name) {
            return Err(MdbError::DuplicateColumn {
                table: self.name.clone(),
                column: name.to_owned(),
            });
        }
        if flags.contains(ColumnFlags::NULLABLE) && flags.contains(ColumnFlags::UNIQUE) {
            return Err(MdbError::NullableUnique(name.to_owned()));
        }
        Ok(())
    }

    fn push_column(&mut self, column: Column) -> usize {
        let n = self.columns.len();
        debug!(
            table = %self.name,
            column = column.name(),
            kind = ?column.kind(),
            flags = ?column.flags(),
            "column added"
        );
        self.columns.push(column);
        self.layout = Rc::new(RowLayout::new(&self.name, &self.columns));
        n
    }

    /// Appends a column and returns its number.
    ///
    /// An `Identity` column is never nullable and always unique, read-only
    /// and primary key; it gets an integer index of its own. `length` only
    /// matters for string columns.
    pub fn add_column(
        &mut self,
        name: &str,
        kind: ColumnType,
        length: usize,
        flags: ColumnFlags,
    ) -> Result<usize> {
        let flags = if kind == ColumnType::Identity {
            if self.identity.is_some() {
                return Err(MdbError::DuplicateIdentity(self.name.clone()));
            }
            flags.without(ColumnFlags::NULLABLE)
                | ColumnFlags::UNIQUE
                | ColumnFlags::READ_ONLY
                | ColumnFlags::PRIMARY_KEY
        } else {
            flags
        };
        self.check_new_column(name, flags)?;

        let mut column = Column::new(name.to_owned(), kind, length, flags);
        let n = self.columns.len();
        if kind == ColumnType::Identity {
            let index = Index::new(n, IndexKind::Int, true, self.config.index_buckets);
            column.set_index(Some(index.into_shared()));
            self.identity = Some(Identity { column: n, next: 1 });
        }
        Ok(self.push_column(column))
    }

    /// Describes column `name` as the target of a foreign key. The column
    /// must be unique and indexed.
    pub fn foreign_key(&self, name: &str) -> Result<ForeignKey> {
        let column = &self.columns[self.column_position(name)?];
        match column.index() {
            Some(index) if column.is_unique() => Ok(ForeignKey {
                table: self.name.clone(),
                column: column.name().to_owned(),
                kind: column.kind(),
                length: column.length(),
                index: Rc::clone(index),
            }),
            _ => Err(MdbError::BadForeignTarget {
                table: self.name.clone(),
                column: name.to_owned(),
            }),
        }
    }

    /// Appends a column referencing `foreign`, typed like its target.
    pub fn add_foreign_column(
        &mut self,
        name: &str,
        flags: ColumnFlags,
        foreign: ForeignKey,
    ) -> Result<usize> {
        self.check_new_column(name, flags)?;
        let column = Column::new_foreign(name.to_owned(), flags, foreign);
        Ok(self.push_column(column))
    }

    /// Indexes column `n`, replacing any previous index.
    ///
    /// Integer kinds need an integer column and `StrMap` a string column.
    /// `approx_rows` sizes the index up front.
    pub fn add_index(&mut self, n: usize, kind: IndexKind, approx_rows: usize) -> Result<()> {
        self.ensure_empty()?;
        self.ensure_unreferenced(n)?;
        let column = self.column(n)?;
        if column.storage() != kind.key_type() {
            return Err(MdbError::NotIndexable {
                table: self.name.clone(),
                column: column.name().to_owned(),
                kind: kind.name(),
            });
        }
        let capacity = match kind {
            IndexKind::Int => approx_rows.max(self.config.index_buckets),
            IndexKind::IntMap => approx_rows,
            IndexKind::StrMap => approx_rows.max(self.config.str_index_capacity),
        };
        let index = Index::new(n, kind, column.is_unique(), capacity);
        debug!(table = %self.name, column = column.name(), kind = kind.name(), "index added");
        self.columns[n].set_index(Some(index.into_shared()));
        Ok(())
    }

    pub fn drop_index(&mut self, n: usize) -> Result<()> {
        self.ensure_empty()?;
        self.ensure_unreferenced(n)?;
        self.columns[n].set_index(None);
        Ok(())
    }

    /// Foreign-key columns share the index of the column they point at, so
    /// that index must stay in place while any of them is alive.
    fn ensure_unreferenced(&self, n: usize) -> Result<()> {
        let column = self.column(n)?;
        match column.index() {
            Some(index) if Rc::strong_count(index) > 1 => Err(MdbError::IndexReferenced {
                table: self.name.clone(),
                column: column.name().to_owned(),
            }),
            _ => Ok(()),
        }
    }

    // ---- rows ----

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// A fresh row for this table, every field null. It joins the table
    /// through [Table::insert_row].
    pub fn create_row(&self) -> Row {
        Row::new(Rc::clone(&self.layout))
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.slots.get(id.slot()).and_then(Option::as_ref)
    }

    /// Mutable access to a row. Changing an indexed field this way leaves
    /// the index stale; go through [Table::update_row] instead.
    pub fn row_mut(&mut self, id: RowId) -> Option<&mut Row> {
        self.slots.get_mut(id.slot()).and_then(Option::as_mut)
    }

    /// Handle of the row at insertion-order `position`.
    pub fn id_at(&self, position: usize) -> Option<RowId> {
        self.order.get(position).copied()
    }

    pub fn row_at(&self, position: usize) -> Option<&Row> {
        self.id_at(position).and_then(|id| self.row(id))
    }

    pub fn position(&self, id: RowId) -> Option<usize> {
        self.order.iter().position(|r| *r == id)
    }

    /// Rows in insertion order.
    pub fn rows(&self) -> impl Iterator<Item = (RowId, &Row)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.row(*id).map(|row| (*id, row)))
    }

    fn indexes(&self) -> impl Iterator<Item = &SharedIndex> + '_ {
        self.columns.iter().filter_map(Column::index)
    }

    /// Adds `row` to the table and returns its handle.
    ///
    /// A null identity field receives the next identity value; an explicit
    /// one is kept and pushes the counter past it. Fails without changing
    /// the table if the row belongs elsewhere, is already inserted, breaks
    /// a unique index or, with `verify_integrity`, holds NULL in a
    /// non-nullable column or a dangling foreign key.
    pub fn insert_row(&mut self, mut row: Row) -> Result<RowId> {
        if !row.is_from(&self.layout) {
            return Err(MdbError::ForeignRow(self.name.clone()));
        }
        if row.status() != RowStatus::ALLOCATED {
            return Err(MdbError::AlreadyInserted);
        }
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.on_before_insert(&mut row);
        }
        let next_identity = self.assign_identity(&mut row);
        if self.config.verify_integrity {
            verify_row(&self.name, &self.columns, &row)?;
        }

        let id = self.attach(row, RowStatus::INSERTED)?;
        if let (Some(ident), Some(next)) = (self.identity.as_mut(), next_identity) {
            ident.next = next;
        }
        self.had_insert = true;
        trace!(table = %self.name, %id, "row inserted");

        if let (Some(hooks), Some(row)) = (self.hooks.as_mut(), self.slots[id.slot()].as_ref()) {
            hooks.on_after_insert(id, row);
        }
        Ok(id)
    }

    /// Fills a null identity field and returns the counter value to keep
    /// once the row is in.
    fn assign_identity(&self, row: &mut Row) -> Option<i32> {
        let ident = self.identity?;
        let field = row.field(ident.column);
        if field.is_null() {
            row.field_mut(ident.column).load(&Value::Int(ident.next));
            Some(ident.next.saturating_add(1))
        } else {
            Some(ident.next.max(field.get_int().saturating_add(1)))
        }
    }

    /// Indexes `row` and stores it under a free handle.
    fn attach(&mut self, mut row: Row, status: RowStatus) -> Result<RowId> {
        for index in self.indexes() {
            index.borrow().check_row(&row)?;
        }
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                self.slots.push(None);
                RowId((self.slots.len() - 1) as u32)
            }
        };
        for index in self.indexes() {
            index.borrow_mut().add_row(id, &row)?;
        }
        row.set_status(status);
        self.slots[id.slot()] = Some(row);
        self.order.push(id);
        Ok(id)
    }

    pub fn delete_row(&mut self, id: RowId) -> Result<()> {
        let position = self.position(id).ok_or(MdbError::UnknownRow(id.as_u32()))?;
        self.delete_at(position)
    }

    /// Deletes the row at insertion-order `position`; later rows move up.
    pub fn delete_at(&mut self, position: usize) -> Result<()> {
        let id = self.id_at(position).ok_or(MdbError::PositionOutOfRange {
            position,
            len: self.order.len(),
        })?;
        let row = self.slots[id.slot()]
            .as_ref()
            .ok_or(MdbError::UnknownRow(id.as_u32()))?;
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.on_before_delete(id, row);
        }
        for index in self.columns.iter().filter_map(Column::index) {
            index.borrow_mut().remove_row(id, row);
        }
        let key = self.persisted_key(row);

        self.order.remove(position);
        self.slots[id.slot()] = None;
        self.free.push(id);
        self.deleted_keys.extend(key);
        self.had_delete = true;
        trace!(table = %self.name, %id, "row deleted");

        if let Some(hooks) = self.hooks.as_mut() {
            hooks.on_after_delete(id);
        }
        Ok(())
    }

    /// Primary key a row has in the SQL source, `None` for rows that only
    /// exist in memory.
    fn persisted_key(&self, row: &Row) -> Option<Value> {
        if row.inserted() || row.status() == RowStatus::ALLOCATED {
            return None;
        }
        self.primary_key().map(|pk| row.field(pk).value())
    }

    fn clear_rows(&mut self) {
        for index in self.indexes() {
            index.borrow_mut().truncate();
        }
        self.slots.clear();
        self.free.clear();
        self.order.clear();
    }

    /// Deletes every row. Indexes stay in place and the identity counter
    /// keeps counting.
    pub fn truncate(&mut self) {
        if self.order.is_empty() {
            return;
        }
        let keys: Vec<Value> = self
            .rows()
            .filter_map(|(_, row)| self.persisted_key(row))
            .collect();
        self.deleted_keys.extend(keys);
        self.clear_rows();
        self.had_delete = true;
        debug!(table = %self.name, "table truncated");
    }

    /// Runs `f` on a row and re-indexes it afterwards.
    ///
    /// A row goes back into an index if it held the entry for its key before
    /// the change, or if its key changed. A row shadowed by a newer row with
    /// the same key in a non-unique index stays shadowed.
    ///
    /// If the changed row collides with another row in a unique index, or
    /// fails the integrity checks, the row is restored and the error
    /// returned.
    pub fn update_row<F>(&mut self, id: RowId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Row),
    {
        let row = self
            .slots
            .get_mut(id.slot())
            .and_then(Option::as_mut)
            .ok_or(MdbError::UnknownRow(id.as_u32()))?;
        let indexes: Vec<&SharedIndex> = self.columns.iter().filter_map(Column::index).collect();
        let backup = row.clone();
        let owned: Vec<bool> = indexes
            .iter()
            .map(|index| index.borrow().owns(id, &*row))
            .collect();
        for index in &indexes {
            index.borrow_mut().remove_row(id, row);
        }

        f(&mut *row);

        let mut reindex: Vec<bool> = indexes
            .iter()
            .zip(&owned)
            .map(|(index, &owned)| {
                let n = index.borrow().column();
                owned || row.field(n).compare_field(&backup.field(n)) != Ordering::Equal
            })
            .collect();
        let mut outcome = Ok(());
        for (index, _) in indexes.iter().zip(&reindex).filter(|(_, again)| **again) {
            if let Err(err) = index.borrow().check_row(row) {
                outcome = Err(err);
                break;
            }
        }
        if outcome.is_ok() && self.config.verify_integrity {
            outcome = verify_row(&self.name, &self.columns, row);
        }
        if outcome.is_err() {
            *row = backup;
            reindex = owned;
        }
        for (index, _) in indexes.iter().zip(&reindex).filter(|(_, again)| **again) {
            index.borrow_mut().add_row(id, row)?;
        }
        outcome
    }

    /// Looks a row up by key through the index of a unique column.
    pub fn select_row(&self, n: usize, key: &Value) -> Result<Option<RowId>> {
        let column = self.column(n)?;
        match column.index() {
            Some(index) if column.is_unique() => index.borrow().find_row(key),
            _ => Err(MdbError::NotIndexed {
                table: self.name.clone(),
                column: column.name().to_owned(),
            }),
        }
    }

    /// [Table::select_row], returning the row itself.
    pub fn find(&self, n: usize, key: &Value) -> Result<Option<&Row>> {
        Ok(self.select_row(n, key)?.and_then(|id| self.row(id)))
    }

    /// Handles of every row matching `filter`, in insertion order.
    pub fn select(&self, filter: &Where) -> RowSet {
        self.rows()
            .filter(|(_, row)| filter.matches(row))
            .map(|(id, _)| id)
            .collect()
    }

    // ---- state ----

    /// Whether anything changed since the last load or save. Always `false`
    /// for temporary tables.
    pub fn modified(&self) -> bool {
        !self.temporary
            && (self.had_insert
                || self.had_delete
                || self.rows().any(|(_, row)| row.modified()))
    }

    /// Marks every row original and forgets pending deletes.
    pub(crate) fn mark_saved(&mut self) {
        for row in self.slots.iter_mut().flatten() {
            row.set_status(RowStatus::ORIGINAL);
        }
        self.had_insert = false;
        self.had_delete = false;
        self.deleted_keys.clear();
    }

    /// Heap bytes held by the table: rows, indexes and schema.
    pub fn memory_usage(&self) -> usize {
        allocative::size_of_unique_allocated_data(self)
    }

    // ---- binary stream ----

    /// Writes the row count, every row in order, then the identity counter.
    /// All rows count as saved afterwards.
    pub fn write_to<W: Write + ?Sized>(&mut self, w: &mut W) -> Result<()> {
        if self.temporary {
            return Ok(());
        }
        let count = i32::try_from(self.order.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many rows"))?;
        stream::write_i32(w, count)?;
        for (_, row) in self.rows() {
            row.write_to(w)?;
        }
        stream::write_i32(w, self.identity.map_or(0, |ident| ident.next))?;
        self.mark_saved();
        debug!(table = %self.name, rows = count, "table written");
        Ok(())
    }

    /// Replaces the rows with those of a stream produced by
    /// [Table::write_to] for the same schema.
    pub fn read_from<R: Read + ?Sized>(&mut self, r: &mut R) -> Result<()> {
        if self.temporary {
            return Ok(());
        }
        self.clear_rows();
        let count = stream::read_count(r)?;
        for _ in 0..count {
            let mut row = self.create_row();
            row.read_from(r)?;
            self.attach(row, RowStatus::ORIGINAL)?;
        }
        let next = stream::read_i32(r)?;
        if let Some(ident) = self.identity.as_mut() {
            ident.next = next;
        }
        self.mark_saved();
        debug!(table = %self.name, rows = count, "table read");
        Ok(())
    }

    // ---- SQL ----

    fn persistent_columns(&self) -> Vec<usize> {
        (0..self.columns.len())
            .filter(|&n| !self.columns[n].is_transient())
            .collect()
    }

    fn column_list(&self, columns: &[usize]) -> String {
        columns
            .iter()
            .map(|&n| self.columns[n].name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Appends every row of `SELECT <columns> FROM <table>`, transient
    /// columns excluded, and returns how many were loaded.
    ///
    /// Loaded rows are original. If a fetch or an insert fails, the rows
    /// loaded so far stay in the table.
    pub fn load_from<S: SqlSource + ?Sized>(&mut self, source: &mut S) -> Result<usize> {
        if self.temporary {
            return Ok(0);
        }
        let columns = self.persistent_columns();
        let query = format!("SELECT {} FROM {}", self.column_list(&columns), self.name);
        debug!(table = %self.name, %query, "loading table");
        let mut cursor = source.exec_query(&query)?;
        if self.config.verify_integrity {
            self.check_result_set(cursor.as_ref(), &columns)?;
        }

        let had_insert = self.had_insert;
        let mut loaded = 0;
        let outcome: Result<usize> = loop {
            match cursor.fetch() {
                Ok(true) => {}
                Ok(false) => break Ok(loaded),
                Err(err) => break Err(err.into()),
            }
            let row = match self.load_row(cursor.as_ref(), &columns) {
                Ok(row) => row,
                Err(err) => break Err(err),
            };
            match self.insert_row(row) {
                Ok(id) => {
                    if let Some(row) = self.row_mut(id) {
                        row.set_status(RowStatus::ORIGINAL);
                    }
                    loaded += 1;
                }
                Err(err) => break Err(err),
            }
        };
        self.had_insert = had_insert;

        match &outcome {
            Ok(rows) => debug!(table = %self.name, rows, "table loaded"),
            Err(err) => warn!(table = %self.name, loaded, error = %err, "table load aborted"),
        }
        outcome
    }

    /// Builds a row from the cursor's current values, result column `i` going
    /// to field `columns[i]`. A value of the wrong type or too long for its
    /// column is a [MdbError::SchemaMismatch].
    pub(crate) fn load_row(&self, cursor: &dyn Cursor, columns: &[usize]) -> Result<Row> {
        let mut row = self.create_row();
        for (position, &n) in columns.iter().enumerate() {
            let value = cursor.value(position);
            if let Some(reason) = field::rejects(row.describe(n), &value) {
                return Err(MdbError::SchemaMismatch {
                    table: self.name.clone(),
                    position,
                    name: self.columns[n].name().to_owned(),
                    reason,
                });
            }
            row.field_mut(n).load(&value);
        }
        Ok(row)
    }

    /// Checks result columns against the table: count, names, types,
    /// nullability and string widths.
    fn check_result_set(&self, cursor: &dyn Cursor, columns: &[usize]) -> Result<()> {
        let mismatch = |position: usize, name: &str, reason| MdbError::SchemaMismatch {
            table: self.name.clone(),
            position,
            name: name.to_owned(),
            reason,
        };
        if cursor.num_columns() != columns.len() {
            return Err(mismatch(cursor.num_columns(), "", "column count differs"));
        }
        for (position, &n) in columns.iter().enumerate() {
            let actual = cursor.column(position);
            let column = &self.columns[n];
            let reason = if !actual.name.eq_ignore_ascii_case(column.name()) {
                Some("name differs")
            } else if actual.kind.storage() != column.storage() {
                Some("type differs")
            } else if actual.is_nullable() != column.is_nullable() {
                Some("nullability differs")
            } else if column.kind().is_string() && actual.size > column.length() {
                Some("string column too narrow")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(mismatch(position, &actual.name, reason));
            }
        }
        Ok(())
    }

    /// Writes pending changes back inside one transaction: DELETE for
    /// removed rows, INSERT for new rows and UPDATE for changed ones, the
    /// last two keyed by primary key. Returns the number of statements.
    ///
    /// On failure the transaction is rolled back and the table keeps its
    /// pending changes.
    pub fn save_to<S: SqlSource + ?Sized>(&mut self, source: &mut S) -> Result<usize> {
        if !self.modified() {
            return Ok(0);
        }
        let statements = match self.write_back(source) {
            Ok(statements) => statements,
            Err(err) => {
                warn!(table = %self.name, error = %err, "table save rolled back");
                return Err(err);
            }
        };
        self.mark_saved();
        debug!(table = %self.name, statements, "table saved");
        Ok(statements)
    }

    fn write_back<S: SqlSource + ?Sized>(&self, source: &mut S) -> Result<usize> {
        let needs_key = !self.deleted_keys.is_empty()
            || self
                .rows()
                .any(|(_, row)| row.updated() && !row.inserted());
        let key = self.primary_key();
        if needs_key && key.is_none() {
            return Err(MdbError::NoPrimaryKey(self.name.clone()));
        }

        let columns = self.persistent_columns();
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name,
            self.column_list(&columns),
            vec!["?"; columns.len()].join(", ")
        );

        let mut txn = Transaction::begin(source)?;
        let mut statements = 0;

        if let Some(key) = key {
            let key_name = self.columns[key].name();
            let delete = format!("DELETE FROM {} WHERE {key_name} = ?", self.name);
            for value in &self.deleted_keys {
                execute(&mut txn, &delete, std::slice::from_ref(value))?;
                statements += 1;
            }
        }

        let assigned: Vec<usize> = columns
            .iter()
            .copied()
            .filter(|&n| Some(n) != key && !self.columns[n].is_read_only())
            .collect();
        let update = key.map(|key| {
            let sets = assigned
                .iter()
                .map(|&n| format!("{} = ?", self.columns[n].name()))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "UPDATE {} SET {sets} WHERE {} = ?",
                self.name,
                self.columns[key].name()
            )
        });

        for (_, row) in self.rows() {
            if row.inserted() {
                let values: Vec<Value> = columns.iter().map(|&n| row.field(n).value()).collect();
                execute(&mut txn, &insert, &values)?;
                statements += 1;
            } else if row.updated() && !assigned.is_empty() {
                if let (Some(key), Some(update)) = (key, &update) {
                    let mut values: Vec<Value> =
                        assigned.iter().map(|&n| row.field(n).value()).collect();
                    values.push(row.field(key).value());
                    execute(&mut txn, update, &values)?;
                    statements += 1;
                }
            }
        }

        txn.commit()?;
        Ok(statements)
    }
}

fn execute<S: SqlSource + ?Sized>(
    txn: &mut Transaction<'_, S>,
    stmt: &str,
    values: &[Value],
) -> Result<()> {
    let source = txn.source();
    let mut params = source.create_params(stmt, values.len())?;
    for (n, value) in values.iter().enumerate() {
        params.set_value(n, value);
    }
    source.exec_stmt(stmt, Some(params.as_ref()))?;
    trace!(stmt, "statement executed");
    Ok(())
}

/// NULL and foreign-key checks run on insert when `verify_integrity` is set.
fn verify_row(table: &str, columns: &[Column], row: &Row) -> Result<()> {
    for (n, column) in columns.iter().enumerate() {
        let field = row.field(n);
        if field.is_null() {
            if !column.is_nullable() {
                return Err(MdbError::NullViolation {
                    table: table.to_owned(),
                    column: column.name().to_owned(),
                });
            }
            continue;
        }
        if let Some(foreign) = column.foreign() {
            let value = field.value();
            if !foreign.contains(&value) {
                return Err(MdbError::ForeignKeyViolation {
                    column: column.name().to_owned(),
                    target: format!("{foreign:?}"),
                    value: value.to_string(),
                });
            }
        }
    }
    Ok(())
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("temporary", &self.temporary)
            .field("columns", &self.columns)
            .field("rows", &self.order.len())
            .finish()
    }
}
