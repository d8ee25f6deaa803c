use std::fmt;
use std::io::{Read, Write};
use std::ops::BitOr;
use std::rc::Rc;

use allocative::Allocative;
use bitvec::prelude::*;

use crate::column::{Column, ColumnFlags, ForeignKey};
use crate::data_type::{ColumnType, StorageType, align4};
use crate::error::Result;
use crate::field::{Field, FieldMut};
use crate::value::Value;

/// Stable handle of a row inside its table.
///
/// Handles stay valid until the row is deleted; a freed handle may be handed
/// out again by a later insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Allocative)]
pub struct RowId(pub(crate) u32);

impl RowId {
    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle and dirty state of a row.
///
/// `ALLOCATED` is the empty set; the other states are flags and may combine,
/// e.g. a row inserted and then changed is `INSERTED | UPDATED`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Allocative)]
pub struct RowStatus(u8);

impl RowStatus {
    pub const ALLOCATED: Self = Self(0);
    pub const ORIGINAL: Self = Self(1);
    pub const INSERTED: Self = Self(1 << 1);
    pub const UPDATED: Self = Self(1 << 2);
    pub const DELETED: Self = Self(1 << 3);

    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for RowStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ALLOCATED {
            return f.write_str("ALLOCATED");
        }
        let names = [
            (Self::ORIGINAL, "ORIGINAL"),
            (Self::INSERTED, "INSERTED"),
            (Self::UPDATED, "UPDATED"),
            (Self::DELETED, "DELETED"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Where one column lives inside a row buffer.
#[derive(Debug, Clone, Allocative)]
pub struct FieldLayout {
    pub(crate) name: String,
    pub(crate) kind: ColumnType,
    pub(crate) length: usize,
    pub(crate) flags: ColumnFlags,
    pub(crate) offset: usize,
    pub(crate) alloc_size: usize,
    pub(crate) foreign: Option<ForeignKey>,
}

impl FieldLayout {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnType {
        self.kind
    }

    pub fn storage(&self) -> StorageType {
        self.kind.storage()
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn flags(&self) -> ColumnFlags {
        self.flags
    }

    pub fn alloc_size(&self) -> usize {
        self.alloc_size
    }
}

/// Offset table shared by every row of a table.
///
/// A buffer starts with the null bitmap (one bit per column, padded to a
/// word), followed by each column's value slot in schema order.
#[derive(Debug, Allocative)]
pub struct RowLayout {
    table: String,
    fields: Vec<FieldLayout>,
    null_bytes: usize,
    size: usize,
}

impl RowLayout {
    pub(crate) fn new(table: &str, columns: &[Column]) -> Self {
        let null_bytes = align4(columns.len().div_ceil(8));
        let mut offset = null_bytes;
        let fields = columns
            .iter()
            .map(|column| {
                let desc = FieldLayout {
                    name: column.name().to_owned(),
                    kind: column.kind(),
                    length: column.length(),
                    flags: column.flags(),
                    offset,
                    alloc_size: column.alloc_size(),
                    foreign: column.foreign().cloned(),
                };
                offset += column.alloc_size();
                desc
            })
            .collect();
        Self {
            table: table.to_owned(),
            fields,
            null_bytes,
            size: offset,
        }
    }

    /// Name of the table the layout was built for.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Total bytes of one row buffer.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Bytes of the packed value region, i.e. the buffer without its null bitmap.
    pub fn value_size(&self) -> usize {
        self.size - self.null_bytes
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// One record: a single buffer holding every field of the row.
#[derive(Clone, Allocative)]
pub struct Row {
    #[allocative(skip)]
    layout: Rc<RowLayout>,
    status: RowStatus,
    buf: Box<[u8]>,
}

impl Row {
    /// Allocates a zeroed buffer for `layout` with every field null.
    pub(crate) fn new(layout: Rc<RowLayout>) -> Self {
        let mut buf = vec![0u8; layout.size].into_boxed_slice();
        let count = layout.fields.len();
        buf[..layout.null_bytes].view_bits_mut::<Lsb0>()[..count].fill(true);
        Self {
            layout,
            status: RowStatus::ALLOCATED,
            buf,
        }
    }

    pub fn layout(&self) -> &Rc<RowLayout> {
        &self.layout
    }

    /// Returns `true` if the row was built from `layout`.
    pub fn is_from(&self, layout: &Rc<RowLayout>) -> bool {
        Rc::ptr_eq(&self.layout, layout)
    }

    pub fn column_count(&self) -> usize {
        self.layout.fields.len()
    }

    /// Read access to field `n`.
    ///
    /// # Panics
    /// Panics if `n` is not a column of the row.
    pub fn field(&self, n: usize) -> Field<'_> {
        assert!(n < self.column_count(), "column {n} is out of range");
        Field::new(self, n)
    }

    /// Write access to field `n`.
    ///
    /// # Panics
    /// Panics if `n` is not a column of the row.
    pub fn field_mut(&mut self, n: usize) -> FieldMut<'_> {
        assert!(n < self.column_count(), "column {n} is out of range");
        FieldMut::new(self, n)
    }

    pub fn field_by_name(&self, name: &str) -> Option<Field<'_>> {
        self.layout.position(name).map(|n| Field::new(self, n))
    }

    pub fn field_by_name_mut(&mut self, name: &str) -> Option<FieldMut<'_>> {
        self.layout.position(name).map(|n| FieldMut::new(self, n))
    }

    pub fn status(&self) -> RowStatus {
        self.status
    }

    /// Overwrites the status, used for bulk transitions such as marking a
    /// freshly loaded row original.
    pub fn set_status(&mut self, status: RowStatus) {
        self.status = status;
    }

    /// Adds `flag` to the status. A row that is still `ALLOCATED` is not part
    /// of a table yet and keeps its status.
    pub fn add_status(&mut self, flag: RowStatus) {
        if self.status != RowStatus::ALLOCATED {
            self.status = self.status | flag;
        }
    }

    pub fn modified(&self) -> bool {
        self.status != RowStatus::ALLOCATED && self.status != RowStatus::ORIGINAL
    }

    pub fn original(&self) -> bool {
        self.status == RowStatus::ORIGINAL
    }

    pub fn inserted(&self) -> bool {
        self.status.contains(RowStatus::INSERTED)
    }

    pub fn updated(&self) -> bool {
        self.status.contains(RowStatus::UPDATED)
    }

    pub fn deleted(&self) -> bool {
        self.status.contains(RowStatus::DELETED)
    }

    /// Snapshot of every field in column order.
    pub fn values(&self) -> Vec<Value> {
        (0..self.column_count()).map(|n| self.field(n).value()).collect()
    }

    /// Writes the null flags (one byte per column) followed by the packed
    /// value region. The block carries no schema information.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        let flags: Vec<u8> = self.null_bits()[..self.column_count()]
            .iter()
            .map(|bit| u8::from(*bit))
            .collect();
        w.write_all(&flags)?;
        w.write_all(&self.buf[self.layout.null_bytes..])?;
        Ok(())
    }

    /// Reads a block produced by [Row::write_to] for the same layout into
    /// this row. The status is left untouched.
    pub fn read_from<R: Read + ?Sized>(&mut self, r: &mut R) -> Result<()> {
        let count = self.column_count();
        let mut flags = vec![0u8; count];
        r.read_exact(&mut flags)?;
        let null_bytes = self.layout.null_bytes;
        r.read_exact(&mut self.buf[null_bytes..])?;
        let bits = &mut self.buf[..null_bytes].view_bits_mut::<Lsb0>()[..count];
        for (n, flag) in flags.into_iter().enumerate() {
            bits.set(n, flag != 0);
        }
        Ok(())
    }

    // Raw access used by Field and FieldMut.

    pub(crate) fn describe(&self, n: usize) -> &FieldLayout {
        &self.layout.fields[n]
    }

    fn null_bits(&self) -> &BitSlice<u8, Lsb0> {
        self.buf[..self.layout.null_bytes].view_bits::<Lsb0>()
    }

    pub(crate) fn is_null_at(&self, n: usize) -> bool {
        self.null_bits()[n]
    }

    pub(crate) fn set_null_at(&mut self, n: usize, null: bool) {
        let null_bytes = self.layout.null_bytes;
        self.buf[..null_bytes].view_bits_mut::<Lsb0>().set(n, null);
    }

    pub(crate) fn slot(&self, n: usize) -> &[u8] {
        let desc = &self.layout.fields[n];
        &self.buf[desc.offset..desc.offset + desc.alloc_size]
    }

    pub(crate) fn slot_mut(&mut self, n: usize) -> &mut [u8] {
        let desc = &self.layout.fields[n];
        let range = desc.offset..desc.offset + desc.alloc_size;
        &mut self.buf[range]
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("table", &self.layout.table)
            .field("status", &self.status)
            .field("values", &self.values())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Rc<RowLayout> {
        let columns = vec![
            Column::new("id".into(), ColumnType::Int, 0, ColumnFlags::empty()),
            Column::new("name".into(), ColumnType::VarString, 10, ColumnFlags::NULLABLE),
            Column::new("score".into(), ColumnType::Double, 0, ColumnFlags::NULLABLE),
            Column::new("flag".into(), ColumnType::Bool, 0, ColumnFlags::NULLABLE),
        ];
        Rc::new(RowLayout::new("t", &columns))
    }

    // ─────────────────────────────────────────────────────────────
    // Test 1 : Layout offsets
    // ─────────────────────────────────────────────────────────────
    #[test]
    fn test_layout_offsets() {
        let layout = layout();
        // 4 columns fit one bitmap byte, padded to 4
        assert_eq!(layout.fields()[0].offset, 4);
        assert_eq!(layout.fields()[1].offset, 8);
        // "name" takes 10 + 1 rounded to 12
        assert_eq!(layout.fields()[2].offset, 20);
        assert_eq!(layout.fields()[3].offset, 28);
        assert_eq!(layout.size(), 32);
        assert_eq!(layout.value_size(), 28);
        assert_eq!(layout.position("score"), Some(2));
        assert_eq!(layout.position("nope"), None);
    }

    // ─────────────────────────────────────────────────────────────
    // Test 2 : New rows
    // ─────────────────────────────────────────────────────────────
    #[test]
    fn test_new_row_is_allocated_and_null() {
        let row = Row::new(layout());
        assert_eq!(row.status(), RowStatus::ALLOCATED);
        assert!(!row.modified());
        assert_eq!(row.column_count(), 4);
        assert!((0..4).all(|n| row.field(n).is_null()));
        assert_eq!(row.values(), vec![Value::Null; 4]);
    }

    // ─────────────────────────────────────────────────────────────
    // Test 3 : Status transitions
    // ─────────────────────────────────────────────────────────────
    #[test]
    fn test_add_status_ignored_while_allocated() {
        let mut row = Row::new(layout());
        row.add_status(RowStatus::UPDATED);
        assert_eq!(row.status(), RowStatus::ALLOCATED);

        row.set_status(RowStatus::ORIGINAL);
        assert!(row.original());
        assert!(!row.modified());

        row.add_status(RowStatus::UPDATED);
        assert!(row.updated());
        assert!(row.modified());
        assert_eq!(row.status(), RowStatus::ORIGINAL | RowStatus::UPDATED);
    }

    #[test]
    fn test_status_debug() {
        assert_eq!(format!("{:?}", RowStatus::ALLOCATED), "ALLOCATED");
        assert_eq!(
            format!("{:?}", RowStatus::INSERTED | RowStatus::UPDATED),
            "INSERTED | UPDATED"
        );
    }

    // ─────────────────────────────────────────────────────────────
    // Test 4 : Raw block round trip
    // ─────────────────────────────────────────────────────────────
    #[test]
    fn test_block_round_trip() {
        let layout = layout();
        let mut row = Row::new(Rc::clone(&layout));
        row.field_mut(0).set_int(7);
        row.field_mut(1).set_str("seven");
        row.field_mut(3).set_bool(true);

        let mut bytes = Vec::new();
        row.write_to(&mut bytes).unwrap();
        // one flag per column, then the value region
        assert_eq!(bytes.len(), 4 + layout.value_size());
        assert_eq!(&bytes[..4], &[0, 0, 1, 0]);

        let mut copy = Row::new(layout);
        copy.read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(copy.values(), row.values());
        assert_eq!(copy.status(), RowStatus::ALLOCATED);
    }

    #[test]
    fn test_block_read_truncated_input_fails() {
        let mut row = Row::new(layout());
        let bytes = [0u8; 6];
        assert!(row.read_from(&mut bytes.as_slice()).is_err());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_field_out_of_range() {
        let row = Row::new(layout());
        let _ = row.field(4);
    }
}
