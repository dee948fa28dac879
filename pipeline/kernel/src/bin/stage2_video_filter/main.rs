//! Stage 2 extension: camera-aware H.265 P-slice filter
//!
//! Replaces the dispatcher's `stage2` slot. Coordinate-update packets
//! rewrite the camera table; RTP video to a camera whose mode filters has
//! its P-slices dropped. The stage never writes the routing decision: its
//! return code is its only verdict.

#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::{xdp_action, xdp_md},
    programs::XdpContext,
};
use pipeline_common::{constants::*, video, FilterMode, PacketMetadata, VideoStat, VideoState};
use xdp_pipeline_ebpf::{
    helpers::{bump_counter, rc_from_disposition, read_slot, write_slot},
    packet::XdpPacket,
};

mod maps;

use maps::*;

/// Video filter state backed by the pinned maps
struct MapState;

impl VideoState for MapState {
    #[inline(always)]
    fn increment(&self, stat: VideoStat) {
        bump_counter(&VIDEO_STATS, stat.index());
    }

    #[inline(always)]
    fn camera_mode(&self, camera_id: u32) -> Option<u32> {
        read_slot(&CAMERA_FILTERING_MODE, camera_id)
    }

    #[inline(always)]
    fn set_camera_mode(&self, camera_id: u32, mode: FilterMode) {
        write_slot(&CAMERA_FILTERING_MODE, camera_id, mode as u32);
    }

    #[inline(always)]
    fn global_mode(&self) -> Option<u32> {
        read_slot(&FILTERING_MODE, 0)
    }

    #[inline(always)]
    fn p_frame_in_progress(&self) -> bool {
        read_slot(&P_FRAME_STATE, 0).unwrap_or(0) != 0
    }

    #[inline(always)]
    fn set_p_frame_in_progress(&self, in_progress: bool) {
        write_slot(&P_FRAME_STATE, 0, in_progress as u32);
    }

    #[inline(always)]
    fn record_coordinates(&self, x: u32, y: u32) {
        write_slot(&COORDS_DEBUG, COORD_SLOT_X, x);
        write_slot(&COORDS_DEBUG, COORD_SLOT_Y, y);
    }
}

#[no_mangle]
#[link_section = "freplace/stage2"]
pub extern "C" fn stage2(ctx: *mut xdp_md, _meta: *mut PacketMetadata) -> i32 {
    if ctx.is_null() {
        return xdp_action::XDP_PASS as i32;
    }
    let ctx = XdpContext::new(ctx);
    rc_from_disposition(video::process(&XdpPacket::new(&ctx), &MapState))
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
