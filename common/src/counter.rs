//! Shared 64-bit counter increment
//!
//! A single atomic add per packet, then a fix-up store when the add
//! wrapped, so concurrent CPUs never lose an increment and a counter that
//! reached `u64::MAX` stays there.

use core::sync::atomic::{AtomicU64, Ordering};

/// Add one to `counter`, saturating at `u64::MAX`
#[inline(always)]
pub fn saturating_increment(counter: &AtomicU64) {
    if counter.fetch_add(1, Ordering::Relaxed) == u64::MAX {
        counter.store(u64::MAX, Ordering::Relaxed);
    }
}
