//! Stage dispatcher state machine
//!
//! The dispatcher owns the packet: it admits it, optionally short-circuits
//! it to a bridge peer, and otherwise walks the stage chain until a stage
//! drops it, passes it on, or the hop budget runs out.
//!
//! ```text
//! admit -> bridge? --yes--> Redirect(peer)
//!            |
//!            no -> reset metadata -> stage1 enabled? --no--> Pass
//!                                        |
//!       +------------------------------ yes
//!       v
//!   [stage1] --CALL_NEXT + stage2 enabled--> [stage2] --RETURN--+
//!       ^                                                         |
//!       +---------------------------------------------------------+
//! ```
//!
//! The same function drives the in-kernel program and the host tests; the
//! kernel supplies map-backed state and the two bound stage functions.

use crate::{
    constants::*,
    types::{Action, Disposition, PacketMetadata, RoutingDecision},
};

/// Dispatcher-owned maps
pub trait DispatchState {
    /// Atomically add one to `counters[counter]`
    fn bump(&self, counter: u32);

    /// `control_map[slot]`, `None` on lookup failure
    fn control_flag(&self, slot: u32) -> Option<u32>;

    /// `iface_config[slot]`, `None` on lookup failure
    fn iface_config(&self, slot: u32) -> Option<u32>;
}

/// The two stage slots the dispatcher calls
///
/// A stage returns its own disposition and may leave a routing decision
/// in the metadata as a side channel.
pub trait StageChain {
    fn stage1(&mut self, meta: &mut PacketMetadata) -> Disposition;
    fn stage2(&mut self, meta: &mut PacketMetadata) -> Disposition;
}

impl<A, B> StageChain for (A, B)
where
    A: FnMut(&mut PacketMetadata) -> Disposition,
    B: FnMut(&mut PacketMetadata) -> Disposition,
{
    fn stage1(&mut self, meta: &mut PacketMetadata) -> Disposition {
        (self.0)(meta)
    }

    fn stage2(&mut self, meta: &mut PacketMetadata) -> Disposition {
        (self.1)(meta)
    }
}

/// Run one packet through the dispatcher
///
/// `fetch_meta` yields the per-CPU metadata slot; it is only called once
/// the bridge short-circuit has been ruled out.
#[inline(always)]
pub fn dispatch<'m, S, C, F>(state: &S, stages: &mut C, fetch_meta: F) -> Action
where
    S: DispatchState + ?Sized,
    C: StageChain + ?Sized,
    F: FnOnce() -> Option<&'m mut PacketMetadata>,
{
    state.bump(COUNTER_ADMITTED);

    if let Some(peer) = bridge_peer(state) {
        state.bump(COUNTER_BRIDGED);
        return Action::Redirect(peer);
    }

    let Some(meta) = fetch_meta() else {
        return Action::Pass;
    };
    meta.reset();

    if !is_enabled(state, CONTROL_STAGE1_ENABLED) {
        return Action::Pass;
    }

    for _ in 0..MAX_STAGE_HOPS {
        if meta.stage1_visits < MAX_STAGE_VISITS {
            meta.stage1_visits += 1;
            state.bump(COUNTER_STAGE1);

            let rc = stages.stage1(meta);
            if is_drop(rc, meta) {
                return Action::Drop;
            }
            match meta.decision() {
                Ok(RoutingDecision::CallNext) => {}
                // PASS, RETURN and unknown values all leave the pipeline
                _ => return route_to_output(state),
            }
            if !is_enabled(state, CONTROL_STAGE2_ENABLED) {
                return Action::Pass;
            }
        }

        if meta.stage2_visits < MAX_STAGE_VISITS {
            meta.stage2_visits += 1;
            state.bump(COUNTER_STAGE2);

            let rc = stages.stage2(meta);
            if is_drop(rc, meta) {
                return Action::Drop;
            }
            match meta.decision() {
                Ok(RoutingDecision::Return) => {
                    meta.set_decision(RoutingDecision::CallNext);
                    continue;
                }
                _ => return route_to_output(state),
            }
        }

        break;
    }

    Action::Pass
}

/// Bridge peer to short-circuit to, if bridge mode is on and a peer is set
#[inline(always)]
fn bridge_peer<S: DispatchState + ?Sized>(state: &S) -> Option<u32> {
    if state.iface_config(IFACE_BRIDGE_MODE)? != FLAG_ENABLED {
        return None;
    }
    match state.iface_config(IFACE_PEER_IFINDEX)? {
        0 => None,
        peer => Some(peer),
    }
}

#[inline(always)]
fn is_enabled<S: DispatchState + ?Sized>(state: &S, slot: u32) -> bool {
    state.control_flag(slot) == Some(FLAG_ENABLED)
}

#[inline(always)]
fn is_drop(rc: Disposition, meta: &PacketMetadata) -> bool {
    rc == Disposition::Drop || meta.decision() == Ok(RoutingDecision::Drop)
}

/// Redirect to the configured output interface, or pass up the stack
#[inline(always)]
pub fn route_to_output<S: DispatchState + ?Sized>(state: &S) -> Action {
    match state.iface_config(IFACE_OUTPUT_IFINDEX) {
        Some(ifindex) if ifindex > 0 => {
            state.bump(COUNTER_OUTPUT_REDIRECTS);
            Action::Redirect(ifindex)
        }
        _ => Action::Pass,
    }
}
