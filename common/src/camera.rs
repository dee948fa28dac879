//! Camera visibility model
//!
//! Cameras 0..50 each watch a 20-unit horizontal strip of the y axis and
//! cameras 50..100 a vertical strip of the x axis. A camera that can see the
//! tracked object streams at full quality (`Off`); every other camera has
//! its P-slices filtered (`DropP`).

use crate::{
    constants::*,
    types::{FilterMode, TrackedCoordinate, VideoStat},
    video::VideoState,
};

/// Filtering mode camera `camera_id` should use while the object is at `(x, y)`
///
/// Ids at or above 100 have no strip and always map to `DropP`, but the
/// coordinate update never writes them.
#[inline(always)]
pub fn camera_mode_for(camera_id: u32, x: u32, y: u32) -> FilterMode {
    let (strip, axis) = if camera_id < NUM_HORIZONTAL_STRIPS {
        (camera_id, y)
    } else if camera_id < NUM_HORIZONTAL_STRIPS + NUM_VERTICAL_STRIPS {
        (camera_id - NUM_HORIZONTAL_STRIPS, x)
    } else {
        return FilterMode::DropP;
    };

    let lo = strip * STRIP_WIDTH;
    if axis >= lo && axis < lo + STRIP_WIDTH {
        FilterMode::Off
    } else {
        FilterMode::DropP
    }
}

/// Ingest a tracked-object position
///
/// The raw values are always recorded for debugging. An out-of-range
/// coordinate stops there and returns `false`; otherwise every camera in
/// `0..UPDATED_CAMERAS` is rewritten and `coords_updated` is bumped.
///
/// The table is rewritten entry by entry with no lock, so a concurrent
/// reader may see a mix of old and new modes.
#[inline(always)]
pub fn apply_coordinate<S: VideoState + ?Sized>(state: &S, coord: TrackedCoordinate) -> bool {
    state.record_coordinates(coord.x, coord.y);

    if !coord.in_range() {
        return false;
    }

    for camera_id in 0..UPDATED_CAMERAS {
        state.set_camera_mode(camera_id, camera_mode_for(camera_id, coord.x, coord.y));
    }

    state.increment(VideoStat::CoordsUpdated);
    true
}
