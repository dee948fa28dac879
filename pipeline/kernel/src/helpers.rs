//! Helper functions for the pipeline programs
//!
//! Map counters are bumped with an atomic add on the value slot, never a
//! lookup-then-update, so concurrent CPUs cannot lose increments. Counters
//! saturate at `u64::MAX`.

use core::sync::atomic::AtomicU64;

use aya_ebpf::{bindings::xdp_action, maps::Array};
use pipeline_common::{saturating_increment, Disposition};

/// Add one to `map[index]`, saturating; silently ignored if the slot does not exist
#[inline(always)]
pub fn bump_counter(map: &Array<u64>, index: u32) {
    if let Some(ptr) = map.get_ptr_mut(index) {
        // SAFETY: array values are 8-byte aligned and live as long as the map
        let counter = unsafe { AtomicU64::from_ptr(ptr) };
        saturating_increment(counter);
    }
}

/// Read a `u32` array slot; `None` on lookup failure
#[inline(always)]
pub fn read_slot(map: &Array<u32>, index: u32) -> Option<u32> {
    map.get(index).copied()
}

/// Overwrite a `u32` array slot; a missing slot is ignored
#[inline(always)]
pub fn write_slot(map: &Array<u32>, index: u32, value: u32) {
    if let Some(ptr) = map.get_ptr_mut(index) {
        // SAFETY: the pointer came from a successful lookup
        unsafe { ptr.write_volatile(value) };
    }
}

/// Stage return code to disposition: only `XDP_DROP` drops
#[inline(always)]
pub fn disposition_from_rc(rc: i32) -> Disposition {
    if rc == xdp_action::XDP_DROP as i32 {
        Disposition::Drop
    } else {
        Disposition::Pass
    }
}

/// Disposition to the return code a stage hands back to the dispatcher
#[inline(always)]
pub fn rc_from_disposition(disposition: Disposition) -> i32 {
    match disposition {
        Disposition::Pass => xdp_action::XDP_PASS as i32,
        Disposition::Drop => xdp_action::XDP_DROP as i32,
    }
}
