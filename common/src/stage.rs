//! Built-in stage bodies
//!
//! `default_stage` is what an unbound stage slot runs. `passthrough_stage`
//! is the stage-1 extension: it hands every packet on to stage 2.

use crate::types::{Disposition, PacketMetadata, RoutingDecision};

/// Always pass and leave the pipeline
#[inline(always)]
pub fn default_stage(meta: &mut PacketMetadata) -> Disposition {
    meta.set_decision(RoutingDecision::Pass);
    Disposition::Pass
}

/// Always pass and ask the dispatcher to call the next stage
#[inline(always)]
pub fn passthrough_stage(meta: &mut PacketMetadata) -> Disposition {
    meta.set_decision(RoutingDecision::CallNext);
    Disposition::Pass
}
