//! Typed views over one value slot of a [Row] buffer.
//!
//! Getters and setters check the column's storage type on every access. A
//! mismatch, a read of a null field or a write to a read-only column is a
//! programming error and panics.

use std::cmp::Ordering;

use crate::column::ColumnFlags;
use crate::data_type::{ColumnType, StorageType};
use crate::row::{FieldLayout, Row, RowStatus};
use crate::value::{Timestamp, Value};

/// Read access to one field of a row.
#[derive(Clone, Copy)]
pub struct Field<'a> {
    row: &'a Row,
    column: usize,
}

impl<'a> Field<'a> {
    pub(crate) fn new(row: &'a Row, column: usize) -> Self {
        Self { row, column }
    }

    /// Column number of the field.
    pub fn column(&self) -> usize {
        self.column
    }

    pub fn describe(&self) -> &'a FieldLayout {
        self.row.describe(self.column)
    }

    pub fn is_null(&self) -> bool {
        self.row.is_null_at(self.column)
    }

    fn slot(&self) -> &'a [u8] {
        self.row.slot(self.column)
    }

    fn expect(&self, storage: StorageType) -> &'a [u8] {
        let desc = self.describe();
        assert_eq!(
            desc.storage(),
            storage,
            "column {:?} stores {:?}",
            desc.name,
            desc.storage()
        );
        assert!(!self.is_null(), "column {:?} is null", desc.name);
        self.slot()
    }

    pub fn get_int(&self) -> i32 {
        read_i32(self.expect(StorageType::Int))
    }

    pub fn get_double(&self) -> f64 {
        let slot = self.expect(StorageType::Double);
        f64::from_le_bytes(slot[..8].try_into().unwrap_or_default())
    }

    pub fn get_char(&self) -> u8 {
        self.expect(StorageType::Char)[0]
    }

    pub fn get_str(&self) -> &'a str {
        decode_str(self.expect(StorageType::Str))
    }

    pub fn get_bool(&self) -> bool {
        self.expect(StorageType::Bool)[0] != 0
    }

    /// Epoch seconds of a `DateTime` or `Timestamp` column.
    pub fn get_time(&self) -> i64 {
        read_i64(self.expect(StorageType::Time))
    }

    /// Full precision time; `DateTime` columns report a zero fraction.
    pub fn get_timestamp(&self) -> Timestamp {
        let slot = self.expect(StorageType::Time);
        let nanos = match self.describe().kind {
            ColumnType::Timestamp => u32::from_le_bytes(slot[8..12].try_into().unwrap_or_default()),
            _ => 0,
        };
        Timestamp::new(read_i64(slot), nanos)
    }

    /// The field as an owned [Value], [Value::Null] when null.
    pub fn value(&self) -> Value {
        if self.is_null() {
            return Value::Null;
        }
        match self.describe().storage() {
            StorageType::Int => Value::Int(self.get_int()),
            StorageType::Double => Value::Double(self.get_double()),
            StorageType::Char => Value::Char(self.get_char()),
            StorageType::Str => Value::Str(self.get_str().to_owned()),
            StorageType::Bool => Value::Bool(self.get_bool()),
            StorageType::Time if self.describe().kind == ColumnType::Timestamp => {
                Value::Timestamp(self.get_timestamp())
            }
            StorageType::Time => Value::Time(self.get_time()),
        }
    }

    /// Equality against a value: NULL equals NULL, NULL never equals a
    /// non-null value, otherwise the tags must match the column.
    ///
    /// # Panics
    /// Panics if `value` is non-null and of another type than the column.
    pub fn eq_value(&self, value: &Value) -> bool {
        match (self.is_null(), value) {
            (true, Value::Null) => true,
            (true, _) | (false, Value::Null) => false,
            (false, Value::Int(v)) => self.get_int() == *v,
            (false, Value::Double(v)) => self.get_double() == *v,
            (false, Value::Char(v)) => self.get_char() == *v,
            (false, Value::Str(v)) => self.get_str() == v,
            (false, Value::Bool(v)) => self.get_bool() == *v,
            (false, Value::Time(v)) => self.get_time() == *v,
            (false, Value::Timestamp(v)) => self.get_timestamp() == *v,
        }
    }

    /// Three-way comparison with `value`, NULL ordering first.
    ///
    /// # Panics
    /// Panics if both sides are non-null and `value` is of another type than
    /// the column.
    pub fn compare(&self, value: &Value) -> Ordering {
        match (self.is_null(), value) {
            (true, Value::Null) => Ordering::Equal,
            (true, _) => Ordering::Less,
            (false, Value::Null) => Ordering::Greater,
            (false, Value::Int(v)) => self.get_int().cmp(v),
            (false, Value::Double(v)) => self.get_double().total_cmp(v),
            (false, Value::Char(v)) => self.get_char().cmp(v),
            (false, Value::Str(v)) => self.get_str().as_bytes().cmp(v.as_bytes()),
            (false, Value::Bool(v)) => self.get_bool().cmp(v),
            (false, Value::Time(v)) => self.get_time().cmp(v),
            (false, Value::Timestamp(v)) => self.get_timestamp().cmp(v),
        }
    }

    /// Three-way comparison between two fields of the same column type,
    /// NULL ordering first. Time fields compare at full precision.
    pub fn compare_field(&self, other: &Field<'_>) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        match self.describe().storage() {
            StorageType::Int => self.get_int().cmp(&other.get_int()),
            StorageType::Double => self.get_double().total_cmp(&other.get_double()),
            StorageType::Char => self.get_char().cmp(&other.get_char()),
            StorageType::Str => self.get_str().as_bytes().cmp(other.get_str().as_bytes()),
            StorageType::Bool => self.get_bool().cmp(&other.get_bool()),
            StorageType::Time => self.get_timestamp().cmp(&other.get_timestamp()),
        }
    }
}

/// Write access to one field of a row.
pub struct FieldMut<'a> {
    row: &'a mut Row,
    column: usize,
}

impl<'a> FieldMut<'a> {
    pub(crate) fn new(row: &'a mut Row, column: usize) -> Self {
        Self { row, column }
    }

    /// Read view of the same field.
    pub fn as_field(&self) -> Field<'_> {
        Field::new(&*self.row, self.column)
    }

    pub fn is_null(&self) -> bool {
        self.row.is_null_at(self.column)
    }

    fn check_write(&self, storage: StorageType) -> &FieldLayout {
        let desc = self.row.describe(self.column);
        assert_eq!(
            desc.storage(),
            storage,
            "column {:?} stores {:?}",
            desc.name,
            desc.storage()
        );
        assert!(
            !desc.flags.contains(ColumnFlags::READ_ONLY),
            "column {:?} is read-only",
            desc.name
        );
        desc
    }

    /// Stores `bytes` at the head of the slot and zeroes the rest. Writing
    /// the image already held by a non-null field changes nothing.
    fn store(&mut self, bytes: &[u8]) {
        let was_null = self.is_null();
        let slot = self.row.slot_mut(self.column);
        let (head, tail) = slot.split_at_mut(bytes.len());
        if !was_null && head == bytes && tail.iter().all(|b| *b == 0) {
            return;
        }
        head.copy_from_slice(bytes);
        tail.fill(0);
        self.row.set_null_at(self.column, false);
        self.row.add_status(RowStatus::UPDATED);
    }

    /// # Panics
    /// In debug builds, also panics when the column is a foreign key and
    /// `value` has no match in the referenced column.
    pub fn set_int(&mut self, value: i32) {
        let desc = self.check_write(StorageType::Int);
        if cfg!(debug_assertions) {
            if let Some(foreign) = &desc.foreign {
                assert!(
                    foreign.contains(&Value::Int(value)),
                    "foreign key {:?} = {value} has no match in {foreign:?}",
                    desc.name
                );
            }
        }
        self.store(&value.to_le_bytes());
    }

    pub fn set_double(&mut self, value: f64) {
        self.check_write(StorageType::Double);
        self.store(&value.to_le_bytes());
    }

    pub fn set_char(&mut self, value: u8) {
        self.check_write(StorageType::Char);
        self.store(&[value]);
    }

    /// # Panics
    /// Panics if `value` is longer than the column's declared length.
    pub fn set_str(&mut self, value: &str) {
        let desc = self.check_write(StorageType::Str);
        assert!(
            value.len() <= desc.length,
            "{:?} does not fit column {:?} of length {}",
            value,
            desc.name,
            desc.length
        );
        self.store(value.as_bytes());
    }

    pub fn set_bool(&mut self, value: bool) {
        self.check_write(StorageType::Bool);
        self.store(&[u8::from(value)]);
    }

    /// Sets epoch seconds; a `Timestamp` column gets a zero fraction.
    pub fn set_time(&mut self, secs: i64) {
        self.check_write(StorageType::Time);
        self.store(&secs.to_le_bytes());
    }

    /// Sets a full precision time; a `DateTime` column drops the fraction.
    pub fn set_timestamp(&mut self, value: Timestamp) {
        let desc = self.check_write(StorageType::Time);
        if desc.kind == ColumnType::Timestamp {
            let mut bytes = [0u8; 12];
            bytes[..8].copy_from_slice(&value.secs.to_le_bytes());
            bytes[8..].copy_from_slice(&value.nanos.to_le_bytes());
            self.store(&bytes);
        } else {
            self.store(&value.secs.to_le_bytes());
        }
    }

    /// Dispatches to the typed setter matching `value`'s tag.
    pub fn set_value(&mut self, value: &Value) {
        match value {
            Value::Null => self.set_null(),
            Value::Int(v) => self.set_int(*v),
            Value::Double(v) => self.set_double(*v),
            Value::Char(v) => self.set_char(*v),
            Value::Str(v) => self.set_str(v),
            Value::Bool(v) => self.set_bool(*v),
            Value::Time(v) => self.set_time(*v),
            Value::Timestamp(v) => self.set_timestamp(*v),
        }
    }

    /// Marks the field null. Nothing happens if it already is.
    pub fn set_null(&mut self) {
        let desc = self.row.describe(self.column);
        assert!(
            !desc.flags.contains(ColumnFlags::READ_ONLY),
            "column {:?} is read-only",
            desc.name
        );
        if self.is_null() {
            return;
        }
        self.row.slot_mut(self.column).fill(0);
        self.row.set_null_at(self.column, true);
        self.row.add_status(RowStatus::UPDATED);
    }

    /// Copies a full slot image without any type or read-only check. The
    /// field becomes non-null and the row is marked updated even if the bytes
    /// did not change.
    ///
    /// # Panics
    /// Panics if `bytes` is not exactly the column's allocation size.
    pub fn set_raw(&mut self, bytes: &[u8]) {
        let slot = self.row.slot_mut(self.column);
        assert_eq!(bytes.len(), slot.len(), "raw image has the wrong size");
        slot.copy_from_slice(bytes);
        self.row.set_null_at(self.column, false);
        self.row.add_status(RowStatus::UPDATED);
    }

    /// Bulk-load path used by cursors: encodes `value` into a slot image and
    /// stores it through [FieldMut::set_raw]. NULL clears the field. Read-only
    /// columns are accepted.
    pub fn load(&mut self, value: &Value) {
        if value.is_null() {
            self.row.slot_mut(self.column).fill(0);
            self.row.set_null_at(self.column, true);
            self.row.add_status(RowStatus::UPDATED);
            return;
        }
        let desc = self.row.describe(self.column);
        let mut image = vec![0u8; desc.alloc_size];
        encode(desc, value, &mut image);
        self.set_raw(&image);
    }
}

/// Writes the slot image of `value` for the column described by `desc`.
///
/// # Panics
/// Panics if `value` does not match the column's storage type or a string is
/// too long.
pub(crate) fn encode(desc: &FieldLayout, value: &Value, out: &mut [u8]) {
    match (desc.storage(), value) {
        (StorageType::Int, Value::Int(v)) => out[..4].copy_from_slice(&v.to_le_bytes()),
        (StorageType::Double, Value::Double(v)) => out[..8].copy_from_slice(&v.to_le_bytes()),
        (StorageType::Char, Value::Char(v)) => out[0] = *v,
        (StorageType::Str, Value::Str(v)) => {
            assert!(
                v.len() <= desc.length,
                "{v:?} does not fit column {:?} of length {}",
                desc.name,
                desc.length
            );
            out[..v.len()].copy_from_slice(v.as_bytes());
        }
        (StorageType::Bool, Value::Bool(v)) => out[0] = u8::from(*v),
        (StorageType::Time, Value::Time(v)) => out[..8].copy_from_slice(&v.to_le_bytes()),
        (StorageType::Time, Value::Timestamp(v)) => {
            out[..8].copy_from_slice(&v.secs.to_le_bytes());
            if desc.kind == ColumnType::Timestamp {
                out[8..12].copy_from_slice(&v.nanos.to_le_bytes());
            }
        }
        (storage, value) => panic!(
            "cannot store {value:?} in column {:?} of type {storage:?}",
            desc.name
        ),
    }
}

/// Why `value` cannot be encoded for the column described by `desc`, if it
/// cannot. [encode] panics exactly when this returns `Some`.
pub(crate) fn rejects(desc: &FieldLayout, value: &Value) -> Option<&'static str> {
    match value {
        Value::Null => None,
        _ if value.storage_type() != Some(desc.storage()) => Some("value type differs"),
        Value::Str(v) if v.len() > desc.length => Some("value too long"),
        _ => None,
    }
}

fn read_i32(slot: &[u8]) -> i32 {
    i32::from_le_bytes(slot[..4].try_into().unwrap_or_default())
}

fn read_i64(slot: &[u8]) -> i64 {
    i64::from_le_bytes(slot[..8].try_into().unwrap_or_default())
}

/// Strings end at the first zero byte. Bytes that are not valid UTF-8, which
/// only a raw write can produce, are cut at the last valid character.
fn decode_str(slot: &[u8]) -> &str {
    let end = slot.iter().position(|b| *b == 0).unwrap_or(slot.len());
    let bytes = &slot[..end];
    match std::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
    }
}
