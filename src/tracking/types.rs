//! Identifiers of tracked markers.

use serde::{Deserialize, Serialize};

/// Unique identifier of a tracked marker.
///
/// Ids are assigned sequentially by a `MarkerTracker` and never reused
/// during its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// Reserved value that never identifies a marker.
    pub const INVALID: ObjectId = ObjectId(u64::MAX);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "M{}", self.0)
    }
}
