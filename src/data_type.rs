use allocative::Allocative;

/// Size in bytes of a packed `Timestamp` slot: seconds, nanoseconds, padding.
pub const TIMESTAMP_SIZE: usize = 16;

/// Logical column types understood by the schema.
/// A logical type decides how a column is stored and how many bytes it takes
/// inside a row buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Allocative)]
pub enum ColumnType {
    /// A 32-bit signed integer.
    Int,
    /// A 64-bit floating-point number.
    Double,
    /// A single byte character.
    Char,
    /// A string of at most `length` bytes, padded on storage.
    FixedString,
    /// A string of at most `length` bytes.
    VarString,
    /// A boolean value (true or false).
    Bool,
    /// An auto-assigned, unique, read-only integer key.
    Identity,
    /// Seconds since the Unix epoch.
    DateTime,
    /// Seconds since the Unix epoch plus a nanosecond fraction.
    Timestamp,
}

/// Physical representation of a column, one per [crate::Value] tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Allocative)]
pub enum StorageType {
    Int,
    Double,
    Char,
    Str,
    Bool,
    Time,
}

impl ColumnType {
    /// Returns the storage type backing this logical type.
    pub fn storage(self) -> StorageType {
        match self {
            Self::Int | Self::Identity => StorageType::Int,
            Self::Double => StorageType::Double,
            Self::Char => StorageType::Char,
            Self::FixedString | Self::VarString => StorageType::Str,
            Self::Bool => StorageType::Bool,
            Self::DateTime | Self::Timestamp => StorageType::Time,
        }
    }

    /// Number of bytes the value takes in a row buffer, before word alignment.
    ///
    /// Strings keep one extra byte for their terminator.
    pub fn raw_size(self, length: usize) -> usize {
        match self {
            Self::Int | Self::Identity => size_of::<i32>(),
            Self::Double => size_of::<f64>(),
            Self::Char | Self::Bool => 1,
            Self::FixedString | Self::VarString => length + 1,
            Self::DateTime => size_of::<i64>(),
            Self::Timestamp => TIMESTAMP_SIZE,
        }
    }

    /// Number of bytes reserved in a row buffer, rounded up to 4 bytes.
    pub fn alloc_size(self, length: usize) -> usize {
        align4(self.raw_size(length))
    }

    /// Returns `true` for the string types, the only ones using a length.
    pub fn is_string(self) -> bool {
        matches!(self, Self::FixedString | Self::VarString)
    }
}

/// Rounds `n` up to the next multiple of 4.
pub(crate) const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_mapping() {
        assert_eq!(ColumnType::Identity.storage(), StorageType::Int);
        assert_eq!(ColumnType::FixedString.storage(), StorageType::Str);
        assert_eq!(ColumnType::VarString.storage(), StorageType::Str);
        assert_eq!(ColumnType::Timestamp.storage(), StorageType::Time);
        assert_eq!(ColumnType::DateTime.storage(), StorageType::Time);
    }

    #[test]
    fn test_alloc_sizes_are_word_aligned() {
        assert_eq!(ColumnType::Int.alloc_size(0), 4);
        assert_eq!(ColumnType::Double.alloc_size(0), 8);
        assert_eq!(ColumnType::Char.alloc_size(0), 4);
        assert_eq!(ColumnType::Bool.alloc_size(0), 4);
        assert_eq!(ColumnType::Identity.alloc_size(0), 4);
        assert_eq!(ColumnType::DateTime.alloc_size(0), 8);
        assert_eq!(ColumnType::Timestamp.alloc_size(0), 16);
        // 20 chars + terminator = 21, rounded to 24
        assert_eq!(ColumnType::VarString.alloc_size(20), 24);
        assert_eq!(ColumnType::FixedString.alloc_size(3), 4);
        assert_eq!(ColumnType::FixedString.alloc_size(0), 4);
    }
}
