use std::cmp::Ordering;
use std::fmt;

use allocative::Allocative;

use crate::data_type::StorageType;

/// Represents a single data value stored in the database.
///
/// This enum wraps every supported scalar into a single type that can be
/// passed around the engine. A string payload is owned and deep-copied on
/// clone. It includes support for SQL `NULL` values.
#[derive(Debug, Clone, PartialEq, Allocative)]
pub enum Value {
    /// represents an empty or missing value.
    Null,
    /// A 32-bit signed integer value.
    Int(i32),
    /// A 64-bit floating-point value.
    Double(f64),
    /// A single byte character.
    Char(u8),
    /// An owned UTF-8 string value.
    Str(String),
    /// A boolean value.
    Bool(bool),
    /// Seconds since the Unix epoch.
    Time(i64),
    /// A full precision point in time, as held by `Timestamp` columns.
    Timestamp(Timestamp),
}

/// A point in time with sub-second precision, stored by `Timestamp` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Allocative)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub secs: i64,
    /// Fraction of the second, in nanoseconds.
    pub nanos: u32,
}

impl Timestamp {
    pub const fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }
}

impl Value {
    /// Returns `true` if the value is [Value::Null].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the inner integer value if this is a [Value::Int].
    /// Otherwise, returns `None`.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the inner float value if this is a [Value::Double].
    /// Otherwise, returns `None`.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the inner character if this is a [Value::Char].
    pub fn as_char(&self) -> Option<u8> {
        match self {
            Self::Char(c) => Some(*c),
            _ => None,
        }
    }

    /// Returns a reference to the inner string slice if this is a [Value::Str].
    /// Otherwise, returns `None`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the inner boolean value if this is a [Value::Bool].
    /// Otherwise, returns `None`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the inner epoch seconds if this is a [Value::Time].
    pub fn as_time(&self) -> Option<i64> {
        match self {
            Self::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// Returns the inner time if this is a [Value::Timestamp]. A
    /// [Value::Time] reads as a zero fraction.
    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::Time(t) => Some(Timestamp::new(*t, 0)),
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Returns the [StorageType] corresponding to this value.
    ///
    /// Returns `None` if the value is [Value::Null], because a standalone NULL
    /// is untyped until it is placed in a column.
    pub fn storage_type(&self) -> Option<StorageType> {
        match self {
            Self::Null => None,
            Self::Int(_) => Some(StorageType::Int),
            Self::Double(_) => Some(StorageType::Double),
            Self::Char(_) => Some(StorageType::Char),
            Self::Str(_) => Some(StorageType::Str),
            Self::Bool(_) => Some(StorageType::Bool),
            Self::Time(_) | Self::Timestamp(_) => Some(StorageType::Time),
        }
    }

    /// Three-way comparison used by sorting and `Cmp` predicates.
    ///
    /// NULL sorts before every other value and equals NULL.
    ///
    /// # Panics
    /// Panics when both values are non-null and carry different tags.
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,
            (Self::Int(l), Self::Int(r)) => l.cmp(r),
            (Self::Double(l), Self::Double(r)) => l.total_cmp(r),
            (Self::Char(l), Self::Char(r)) => l.cmp(r),
            (Self::Str(l), Self::Str(r)) => l.as_bytes().cmp(r.as_bytes()),
            (Self::Bool(l), Self::Bool(r)) => l.cmp(r),
            (Self::Time(l), Self::Time(r)) => l.cmp(r),
            (Self::Time(_) | Self::Timestamp(_), Self::Time(_) | Self::Timestamp(_)) => {
                self.as_timestamp().cmp(&other.as_timestamp())
            }
            _ => panic!("cannot compare {self:?} with {other:?}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::Char(c) => write!(f, "{:?}", *c as char),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Time(t) => write!(f, "@{t}"),
            Self::Timestamp(t) => write!(f, "@{}.{:09}", t.secs, t.nanos),
        }
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Self::Timestamp(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
