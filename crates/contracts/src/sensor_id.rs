//! SensorId - vendor sensor identifier
//!
//! Sensor IDs come back from the cloud API as opaque strings such as
//! `"16234567.2384712973412"`. They are cloned into every sample of a batch,
//! so the string is shared behind an `Arc<str>`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Vendor sensor identifier with O(1) clone.
///
/// # Examples
/// ```
/// use contracts::SensorId;
///
/// let id: SensorId = "16234567.2384712973412".into();
/// let copy = id.clone();
/// assert_eq!(id, copy);
/// assert_eq!(id.as_str(), "16234567.2384712973412");
/// ```
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SensorId(Arc<str>);

impl SensorId {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a comma separated filter list (`"a, b,c"`), skipping blanks.
    ///
    /// The result is sorted and deduplicated so that equal filters always
    /// map to the same watermark scope.
    pub fn parse_list(list: &str) -> Vec<SensorId> {
        let mut ids: Vec<SensorId> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(SensorId::from)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

impl Deref for SensorId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

// Arc<str> hashes like str, so maps keyed by SensorId accept &str lookups.
impl Borrow<str> for SensorId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SensorId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for SensorId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensorId({})", self.0)
    }
}

impl PartialEq<&str> for SensorId {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl Serialize for SensorId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SensorId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}
