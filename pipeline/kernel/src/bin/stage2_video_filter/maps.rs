//! BPF map definitions for the video filter
//!
//! Pinned by name like the dispatcher's maps, so the control plane and the
//! stats reader find them in the registry.

use aya_ebpf::{macros::map, maps::Array};
use pipeline_common::{constants::*, MAX_VIDEO_STATS};

/// Global fallback filtering mode (single slot)
#[map(name = "filtering_mode")]
pub static FILTERING_MODE: Array<u32> = Array::pinned(1, 0);

/// Per-camera filtering mode
///
/// Key: camera id (destination port - 5000)
/// Value: FilterMode
#[map(name = "camera_filtering_mode")]
pub static CAMERA_FILTERING_MODE: Array<u32> = Array::pinned(NUM_CAMERAS, 0);

/// P-frame-in-progress flag (single slot, 0 or 1)
#[map(name = "p_frame_state")]
pub static P_FRAME_STATE: Array<u32> = Array::pinned(1, 0);

/// Last raw coordinate received
///
/// Key 0: x, key 1: y
#[map(name = "robot_coords_debug")]
pub static COORDS_DEBUG: Array<u32> = Array::pinned(2, 0);

/// Video filter statistics
///
/// Key: VideoStat index
/// Value: u64 counter
#[map(name = "video_stats")]
pub static VIDEO_STATS: Array<u64> = Array::pinned(MAX_VIDEO_STATS, 0);
