//! Tracking state of a single marker record.

/// State of a tracked marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackingState {
    /// Record not yet initialized; never present in a tracker's map.
    Unknown,
    /// Pose confirmed by the latest tracking step or detection.
    Tracking,
    /// Tracking failed, waiting for re-detection or eviction.
    Lost,
}

impl Default for TrackingState {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for TrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::Tracking => "TRACKING",
            Self::Lost => "LOST",
        };
        f.write_str(name)
    }
}
