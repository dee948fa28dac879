//! Stage slots called by the dispatcher
//!
//! `stage1` and `stage2` are exported global functions with weak linkage.
//! The defaults below just pass; an extension loaded against the running
//! dispatcher replaces one of them in place. They must stay out of line and
//! their bodies must not be assumed by the caller, or the call would be
//! folded away before it can be replaced.

use aya_ebpf::bindings::{xdp_action, xdp_md};
use pipeline_common::{
    stage::default_stage,
    Disposition, PacketMetadata, StageChain,
};
use xdp_pipeline_ebpf::helpers::{disposition_from_rc, rc_from_disposition};

/// Stage slot 1
#[no_mangle]
#[inline(never)]
#[linkage = "weak"]
pub extern "C" fn stage1(_ctx: *mut xdp_md, meta: *mut PacketMetadata) -> i32 {
    run_default(meta)
}

/// Stage slot 2
#[no_mangle]
#[inline(never)]
#[linkage = "weak"]
pub extern "C" fn stage2(_ctx: *mut xdp_md, meta: *mut PacketMetadata) -> i32 {
    run_default(meta)
}

#[inline(always)]
fn run_default(meta: *mut PacketMetadata) -> i32 {
    // SAFETY: the dispatcher passes its per-CPU slot or null
    match unsafe { meta.as_mut() } {
        Some(meta) => rc_from_disposition(default_stage(meta)),
        None => xdp_action::XDP_PASS as i32,
    }
}

/// The dispatcher's view of the two slots for one packet
pub struct BoundStages {
    ctx: *mut xdp_md,
}

impl BoundStages {
    #[inline(always)]
    pub fn new(ctx: *mut xdp_md) -> Self {
        Self { ctx }
    }
}

impl StageChain for BoundStages {
    #[inline(always)]
    fn stage1(&mut self, meta: &mut PacketMetadata) -> Disposition {
        disposition_from_rc(stage1(self.ctx, meta))
    }

    #[inline(always)]
    fn stage2(&mut self, meta: &mut PacketMetadata) -> Disposition {
        disposition_from_rc(stage2(self.ctx, meta))
    }
}
