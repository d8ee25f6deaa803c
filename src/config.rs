use allocative::Allocative;
use serde::Deserialize;

use crate::error::Result;

/// Initial bucket count of a non-unique integer index.
pub const DEF_MAP_SIZE: usize = 17;

/// Tunables shared by a database and its tables.
///
/// Every field has a default, so a TOML document only needs to name the
/// values it overrides:
///
/// ```
/// # use memdb::MdbConfig;
/// let config = MdbConfig::from_toml_str("verify_integrity = true").unwrap();
/// assert!(config.verify_integrity);
/// assert_eq!(config.index_buckets, memdb::config::DEF_MAP_SIZE);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Allocative)]
#[serde(default, deny_unknown_fields)]
pub struct MdbConfig {
    /// Run the null and foreign-key checks on insert and the result set
    /// checks on SQL loads. On by default in debug builds only.
    pub verify_integrity: bool,
    /// Initial buckets of a non-unique integer index.
    pub index_buckets: usize,
    /// Capacity reserved by a string index when the caller gives no hint.
    pub str_index_capacity: usize,
}

impl Default for MdbConfig {
    fn default() -> Self {
        Self {
            verify_integrity: cfg!(debug_assertions),
            index_buckets: DEF_MAP_SIZE,
            str_index_capacity: 0,
        }
    }
}

impl MdbConfig {
    /// Parses a configuration from a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }
}
