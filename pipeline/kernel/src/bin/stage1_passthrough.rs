//! Stage 1 extension: pass-through
//!
//! Replaces the dispatcher's `stage1` slot and asks for the next stage on
//! every packet, so traffic reaches stage 2 unchanged.

#![no_std]
#![no_main]

use aya_ebpf::bindings::{xdp_action, xdp_md};
use pipeline_common::{stage::passthrough_stage, PacketMetadata};
use xdp_pipeline_ebpf::helpers::rc_from_disposition;

#[no_mangle]
#[link_section = "freplace/stage1"]
pub extern "C" fn stage1(_ctx: *mut xdp_md, meta: *mut PacketMetadata) -> i32 {
    // SAFETY: the dispatcher passes its per-CPU slot or null
    match unsafe { meta.as_mut() } {
        Some(meta) => rc_from_disposition(passthrough_stage(meta)),
        None => xdp_action::XDP_PASS as i32,
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
