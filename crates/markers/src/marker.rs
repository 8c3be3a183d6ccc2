use serde::{Deserialize, Serialize};

use crate::error::{MarkerError, Result};

/// A named point in time on a video.
///
/// Markers carry no identity of their own; the store addresses them by
/// `seconds`, which it keeps unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub seconds: f64,
    pub name: String,
}

impl Marker {
    pub fn new(seconds: f64, name: impl Into<String>) -> Self {
        Self {
            seconds,
            name: name.into(),
        }
    }
}

/// Rejects times that cannot be placed on a timeline.
pub(crate) fn validate_seconds(seconds: f64) -> Result<f64> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(MarkerError::InvalidSeconds { seconds });
    }
    Ok(seconds)
}

/// Sorts markers ascending by time. Ties keep no particular order.
pub(crate) fn sort_markers(markers: &mut [Marker]) {
    markers.sort_unstable_by(|a, b| a.seconds.total_cmp(&b.seconds));
}

/// Index of the marker with the greatest `seconds <= at` in a sorted slice.
pub(crate) fn index_at_or_before(sorted: &[Marker], at: f64) -> Option<usize> {
    sorted
        .partition_point(|marker| marker.seconds <= at)
        .checked_sub(1)
}
