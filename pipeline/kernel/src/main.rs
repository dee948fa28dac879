//! XDP Stage Dispatcher - Kernel Space Program
//!
//! Entry point for every frame on the attached interface. The dispatcher
//! admits the packet, handles the bridge short-circuit, resets the per-CPU
//! metadata and then walks the two stage slots, which extensions replace
//! at runtime without reloading this program.
//!
//! ## Architecture
//!
//! ```text
//! xdp_dispatcher() -> bridge_mode? -> bpf_redirect(peer)
//!        |
//!        v
//!   stage1(ctx, meta)   <- freplace: stage1-passthrough
//!        |
//!        v
//!   stage2(ctx, meta)   <- freplace: stage2-video-filter
//!        |
//!        v
//!   XDP_DROP / XDP_PASS / bpf_redirect(output)
//! ```
//!
//! ## Usage
//!
//! This program must be compiled for the bpfel-unknown-none target:
//!
//! ```bash
//! cargo build --release
//! ```
//!
//! `pipeline-ctl load` attaches it and pins it under the registry.

#![no_std]
#![no_main]
#![feature(linkage)]

use aya_ebpf::{bindings::xdp_action, helpers::bpf_redirect, macros::xdp, programs::XdpContext};
use aya_log_ebpf::error;
use pipeline_common::{dispatch, Action, DispatchState};
use xdp_pipeline_ebpf::helpers::{bump_counter, read_slot};

mod handlers;
mod maps;

use handlers::BoundStages;
use maps::{CONTROL_MAP, COUNTERS, IFACE_CONFIG, PKT_META_MAP};

/// Dispatcher state backed by the pinned maps
struct MapState;

impl DispatchState for MapState {
    #[inline(always)]
    fn bump(&self, counter: u32) {
        bump_counter(&COUNTERS, counter);
    }

    #[inline(always)]
    fn control_flag(&self, slot: u32) -> Option<u32> {
        read_slot(&CONTROL_MAP, slot)
    }

    #[inline(always)]
    fn iface_config(&self, slot: u32) -> Option<u32> {
        read_slot(&IFACE_CONFIG, slot)
    }
}

#[xdp]
pub fn xdp_dispatcher(ctx: XdpContext) -> u32 {
    let mut stages = BoundStages::new(ctx.ctx);

    let action = dispatch(&MapState, &mut stages, || {
        // SAFETY: the per-CPU slot is only touched by this CPU for this packet
        let meta = unsafe { PKT_META_MAP.get_ptr_mut(0).and_then(|ptr| ptr.as_mut()) };
        if meta.is_none() {
            error!(&ctx, "pkt_meta_map slot missing, passing packet");
        }
        meta
    });

    match action {
        Action::Pass => xdp_action::XDP_PASS,
        Action::Drop => xdp_action::XDP_DROP,
        // SAFETY: plain helper call, returns XDP_REDIRECT on success
        Action::Redirect(ifindex) => unsafe { bpf_redirect(ifindex, 0) as u32 },
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    // eBPF programs cannot panic - this should never be reached
    loop {}
}
