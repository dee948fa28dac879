//! BPF map definitions for the dispatcher
//!
//! Every map is pinned by name under the pipeline registry so that stage
//! extensions and the control plane open the live instances.

use aya_ebpf::{
    macros::map,
    maps::{Array, PerCpuArray},
};
use pipeline_common::{constants::*, PacketMetadata};

/// Dispatcher counters
///
/// Key: COUNTER_* index (admitted, stage1, stage2, bridged, output redirects)
/// Value: u64 packet count
#[map(name = "counters")]
pub static COUNTERS: Array<u64> = Array::pinned(MAX_DISPATCH_COUNTERS, 0);

/// Stage enable flags, written by the control plane
///
/// Key: CONTROL_STAGE1_ENABLED / CONTROL_STAGE2_ENABLED
/// Value: 1 = enabled, anything else = disabled
#[map(name = "control_map")]
pub static CONTROL_MAP: Array<u32> = Array::pinned(MAX_CONTROL_SLOTS, 0);

/// Per-CPU scratch metadata, reset for every packet
#[map(name = "pkt_meta_map")]
pub static PKT_META_MAP: PerCpuArray<PacketMetadata> = PerCpuArray::pinned(1, 0);

/// Interface configuration
///
/// Key 0: peer ifindex (bridge mode)
/// Key 1: bridge mode (1 = enabled)
/// Key 2: output ifindex (pipeline routing)
#[map(name = "iface_config")]
pub static IFACE_CONFIG: Array<u32> = Array::pinned(MAX_IFACE_SLOTS, 0);
