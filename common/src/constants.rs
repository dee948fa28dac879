//! Shared constants for the XDP stage pipeline
//!
//! These constants are used by the kernel programs and the userspace
//! control plane to agree on map layouts, slot indices and wire values.

// ============================================================================
// Pin Registry
// ============================================================================

/// Root of the filesystem-backed registry every map, program and link is pinned under
pub const PIN_ROOT: &str = "/sys/fs/bpf/xdp_pipeline";

/// Pinned name of the dispatcher program (its link is pinned with a `_link` suffix)
pub const DISPATCHER_PROGRAM: &str = "xdp_dispatcher";

/// Suffix appended to a program pin path to pin its attachment link
pub const LINK_PIN_SUFFIX: &str = "_link";

pub const MAP_COUNTERS: &str = "counters";
pub const MAP_CONTROL: &str = "control_map";
pub const MAP_PKT_META: &str = "pkt_meta_map";
pub const MAP_IFACE_CONFIG: &str = "iface_config";
pub const MAP_FILTERING_MODE: &str = "filtering_mode";
pub const MAP_CAMERA_FILTERING_MODE: &str = "camera_filtering_mode";
pub const MAP_P_FRAME_STATE: &str = "p_frame_state";
pub const MAP_COORDS_DEBUG: &str = "robot_coords_debug";
pub const MAP_VIDEO_STATS: &str = "video_stats";

// ============================================================================
// Dispatcher
// ============================================================================

/// Hard cap on dispatcher loop iterations
pub const MAX_STAGE_HOPS: u32 = 8;

/// Per-stage visit budget within one packet
pub const MAX_STAGE_VISITS: u32 = 4;

/// Packets admitted by the dispatcher
pub const COUNTER_ADMITTED: u32 = 0;

/// Stage-1 invocations
pub const COUNTER_STAGE1: u32 = 1;

/// Stage-2 invocations
pub const COUNTER_STAGE2: u32 = 2;

/// Packets redirected by the bridge short-circuit
pub const COUNTER_BRIDGED: u32 = 3;

/// Packets that left the pipeline through the output interface
pub const COUNTER_OUTPUT_REDIRECTS: u32 = 4;

/// Number of dispatcher counters
pub const MAX_DISPATCH_COUNTERS: u32 = 5;

/// `control_map` slot gating stage 1
pub const CONTROL_STAGE1_ENABLED: u32 = 0;

/// `control_map` slot gating stage 2
pub const CONTROL_STAGE2_ENABLED: u32 = 1;

/// Number of `control_map` slots
pub const MAX_CONTROL_SLOTS: u32 = 2;

/// Value a control slot must hold to count as enabled
pub const FLAG_ENABLED: u32 = 1;

/// `iface_config` slot: peer interface for bridge mode
pub const IFACE_PEER_IFINDEX: u32 = 0;

/// `iface_config` slot: bridge mode (1 = enabled)
pub const IFACE_BRIDGE_MODE: u32 = 1;

/// `iface_config` slot: output interface for pipeline routing
pub const IFACE_OUTPUT_IFINDEX: u32 = 2;

/// Number of `iface_config` slots
pub const MAX_IFACE_SLOTS: u32 = 3;

// ============================================================================
// Protocol Numbers
// ============================================================================

/// EtherType for IPv4
pub const ETH_P_IP: u16 = 0x0800;

/// UDP protocol number
pub const IPPROTO_UDP: u8 = 17;

/// Minimum IPv4 header length in 32-bit words
pub const IPV4_MIN_IHL: u8 = 5;

/// The only RTP version accepted
pub const RTP_VERSION: u8 = 2;

/// H.265 NAL unit type of a fragmentation unit
pub const H265_NAL_FU: u8 = 49;

/// First H.265 NAL unit type treated as a P-slice
pub const H265_P_SLICE_MIN: u8 = 1;

/// Last H.265 NAL unit type treated as a P-slice
pub const H265_P_SLICE_MAX: u8 = 9;

// ============================================================================
// Video Filter Addressing
// ============================================================================

/// Destination host of the filtered video streams (10.1.1.2)
pub const VIDEO_HOST_ADDR: [u8; 4] = [10, 1, 1, 2];

/// First camera port; `port - CAMERA_BASE_PORT` is the camera id
pub const CAMERA_BASE_PORT: u16 = 5000;

/// UDP destination port of coordinate-update packets
pub const POSITION_PORT: u16 = 5555;

/// Camera table capacity (and width of the camera port range)
pub const NUM_CAMERAS: u32 = 200;

/// Cameras actually recomputed by a coordinate update (ids 0..99)
pub const UPDATED_CAMERAS: u32 = 100;

/// Cameras 0..49 watch horizontal strips of the y axis
pub const NUM_HORIZONTAL_STRIPS: u32 = 50;

/// Cameras 50..99 watch vertical strips of the x axis
pub const NUM_VERTICAL_STRIPS: u32 = 50;

/// Width of one visibility strip
pub const STRIP_WIDTH: u32 = 20;

/// Exclusive upper bound of a valid coordinate on either axis
pub const COORD_MAX: u32 = 1000;

/// Coordinate debug slot holding the last raw x
pub const COORD_SLOT_X: u32 = 0;

/// Coordinate debug slot holding the last raw y
pub const COORD_SLOT_Y: u32 = 1;
