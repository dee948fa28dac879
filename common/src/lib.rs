//! Shared types and logic for the XDP stage pipeline
//!
//! This crate is linked into the eBPF programs and into the userspace
//! control plane. It holds the map schema, the wire headers and the
//! packet-path logic itself (dispatcher, pass-through stage, video filter)
//! written against small state traits, so the same code runs over BPF maps
//! in the kernel and over atomics in host tests.

#![cfg_attr(not(any(test, feature = "test-utils")), no_std)]

pub mod camera;
pub mod constants;
pub mod counter;
pub mod dispatch;
pub mod packet;
pub mod stage;
pub mod types;
pub mod video;

#[cfg(any(test, feature = "test-utils"))]
pub mod tables;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export commonly used types
pub use constants::*;
pub use counter::saturating_increment;
pub use dispatch::{dispatch, DispatchState, StageChain};
pub use types::{
    Action, Disposition, FilterMode, PacketMetadata, RoutingDecision, TrackedCoordinate,
    VideoStat, MAX_VIDEO_STATS,
};
pub use video::VideoState;
