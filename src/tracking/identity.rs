//! Matching fresh detections against the markers already tracked.

use std::collections::HashMap;

use crate::geometry::SE3;
use crate::marker::MarkerPayload;
use crate::tracking::record::TrackedMarker;
use crate::tracking::types::ObjectId;

/// Relative size tolerance for two sightings of the same marker.
pub const SIZE_TOLERANCE: f64 = 0.05;

/// Find the record a detection belongs to.
///
/// Candidates must have the same payload (module bits ignored) and a size
/// within 5% of `size`; among those the one closest to `t_world_marker`
/// wins, ties going to the lowest id. Orientation is not compared.
pub fn is_already_tracked(
    tracked_markers: &HashMap<ObjectId, TrackedMarker>,
    payload: &MarkerPayload,
    t_world_marker: &SE3,
    size: f64,
) -> Option<ObjectId> {
    let min_size = (1.0 - SIZE_TOLERANCE) * size;
    let max_size = (1.0 + SIZE_TOLERANCE) * size;

    let mut best: Option<(ObjectId, f64)> = None;

    for (&object_id, record) in tracked_markers {
        if record.size() < min_size || record.size() > max_size {
            continue;
        }
        if !payload.is_same(record.payload(), true) {
            continue;
        }

        let sqr_distance = (record.t_world_marker().translation - t_world_marker.translation).norm_squared();
        let is_better = match best {
            None => true,
            Some((best_id, best_sqr_distance)) => {
                sqr_distance < best_sqr_distance || (sqr_distance == best_sqr_distance && object_id < best_id)
            }
        };
        if is_better {
            best = Some((object_id, sqr_distance));
        }
    }

    best.map(|(object_id, _)| object_id)
}
