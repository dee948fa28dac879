//! Shared data structures between the dispatcher, its stages and userspace
//!
//! `PacketMetadata` crosses the dispatcher/extension call boundary by
//! pointer, so it is `repr(C)` and its size is checked at compile time.

/// Per-packet scratch record owned by the dispatcher
///
/// One slot per CPU, reset before any stage runs.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketMetadata {
    /// Times stage 1 has been entered for this packet
    pub stage1_visits: u32,
    /// Times stage 2 has been entered for this packet
    pub stage2_visits: u32,
    /// Raw routing decision (see `RoutingDecision`)
    pub routing_decision: u32,
    /// Flow identifier, reserved for stages
    pub flow_id: u32,
}

impl PacketMetadata {
    /// Clear every field back to the start-of-packet state
    #[inline(always)]
    pub fn reset(&mut self) {
        self.stage1_visits = 0;
        self.stage2_visits = 0;
        self.routing_decision = RoutingDecision::Pass as u32;
        self.flow_id = 0;
    }

    /// Decode the routing decision, returning the raw value if it is unknown
    #[inline(always)]
    pub fn decision(&self) -> Result<RoutingDecision, u32> {
        RoutingDecision::try_from(self.routing_decision)
    }

    #[inline(always)]
    pub fn set_decision(&mut self, decision: RoutingDecision) {
        self.routing_decision = decision as u32;
    }
}

/// Side-channel signal a stage leaves for the dispatcher
///
/// One encoding shared by the dispatcher and every stage.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutingDecision {
    Pass = 0,
    Drop = 1,
    CallNext = 2,
    Return = 3,
}

impl TryFrom<u32> for RoutingDecision {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pass),
            1 => Ok(Self::Drop),
            2 => Ok(Self::CallNext),
            3 => Ok(Self::Return),
            other => Err(other),
        }
    }
}

/// What a stage returns as its own verdict on the packet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Pass,
    Drop,
}

/// Final disposition handed back to the packet-delivery layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Pass,
    Drop,
    /// Redirect to the interface with this index
    Redirect(u32),
}

/// Per-camera (or global fallback) P-slice filtering mode
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterMode {
    /// No filtering: the camera can see the tracked object
    #[default]
    Off = 0,
    DropP = 1,
    ForwardP = 2,
}

impl TryFrom<u32> for FilterMode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::DropP),
            2 => Ok(Self::ForwardP),
            other => Err(other),
        }
    }
}

/// Last tracked-object position, decoded from a coordinate-update packet
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackedCoordinate {
    pub x: u32,
    pub y: u32,
}

impl TrackedCoordinate {
    /// Both axes inside `[0, COORD_MAX)`
    #[inline(always)]
    pub fn in_range(&self) -> bool {
        self.x < crate::constants::COORD_MAX && self.y < crate::constants::COORD_MAX
    }
}

/// Index into the `video_stats` counter array
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoStat {
    TotalPackets = 0,
    RtpPackets,
    FuStart,
    PSlices,
    Dropped,
    Forwarded,
    PositionPackets,
    ModeOff,
    ModeDropP,
    ModeForwardP,
    CameraOutOfRange,
    MapLookupFailed,
    CoordsUpdated,
    PositionPortMatched,
    Stage2Entry,
    Ipv4Packets,
    UdpPackets,
    PrePortCheck,
    WrongIp,
    WrongPortRange,
    RtpVersionFail,
}

/// Number of `video_stats` counters
pub const MAX_VIDEO_STATS: u32 = VideoStat::RtpVersionFail as u32 + 1;

impl VideoStat {
    /// Every counter in index order
    pub const ALL: [VideoStat; MAX_VIDEO_STATS as usize] = [
        VideoStat::TotalPackets,
        VideoStat::RtpPackets,
        VideoStat::FuStart,
        VideoStat::PSlices,
        VideoStat::Dropped,
        VideoStat::Forwarded,
        VideoStat::PositionPackets,
        VideoStat::ModeOff,
        VideoStat::ModeDropP,
        VideoStat::ModeForwardP,
        VideoStat::CameraOutOfRange,
        VideoStat::MapLookupFailed,
        VideoStat::CoordsUpdated,
        VideoStat::PositionPortMatched,
        VideoStat::Stage2Entry,
        VideoStat::Ipv4Packets,
        VideoStat::UdpPackets,
        VideoStat::PrePortCheck,
        VideoStat::WrongIp,
        VideoStat::WrongPortRange,
        VideoStat::RtpVersionFail,
    ];

    #[inline(always)]
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Stable snake_case name used by the exporters
    pub fn name(self) -> &'static str {
        match self {
            VideoStat::TotalPackets => "total_packets",
            VideoStat::RtpPackets => "rtp_packets",
            VideoStat::FuStart => "fu_start",
            VideoStat::PSlices => "p_slices",
            VideoStat::Dropped => "dropped",
            VideoStat::Forwarded => "forwarded",
            VideoStat::PositionPackets => "position_packets",
            VideoStat::ModeOff => "mode_off",
            VideoStat::ModeDropP => "mode_drop_p",
            VideoStat::ModeForwardP => "mode_forward_p",
            VideoStat::CameraOutOfRange => "camera_out_of_range",
            VideoStat::MapLookupFailed => "map_lookup_failed",
            VideoStat::CoordsUpdated => "coords_updated",
            VideoStat::PositionPortMatched => "position_port_matched",
            VideoStat::Stage2Entry => "stage2_entry",
            VideoStat::Ipv4Packets => "ipv4_packets",
            VideoStat::UdpPackets => "udp_packets",
            VideoStat::PrePortCheck => "pre_port_check",
            VideoStat::WrongIp => "wrong_ip",
            VideoStat::WrongPortRange => "wrong_port_range",
            VideoStat::RtpVersionFail => "rtp_version_fail",
        }
    }
}

// Compile-time layout checks
const _: () = {
    assert!(core::mem::size_of::<PacketMetadata>() == 16);
    assert!(core::mem::size_of::<TrackedCoordinate>() == 8);
    assert!(MAX_VIDEO_STATS == 21);
};

#[cfg(feature = "userspace")]
mod userspace_impls {
    use super::*;

    // Per-CPU metadata is read back by the stats collector
    unsafe impl aya::Pod for PacketMetadata {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_metadata() {
        let mut meta = PacketMetadata {
            stage1_visits: 3,
            stage2_visits: 2,
            routing_decision: RoutingDecision::Return as u32,
            flow_id: 77,
        };
        meta.reset();
        assert_eq!(meta, PacketMetadata::default());
        assert_eq!(meta.decision(), Ok(RoutingDecision::Pass));
    }

    #[test]
    fn test_unknown_decision_is_preserved() {
        let meta = PacketMetadata {
            routing_decision: 42,
            ..Default::default()
        };
        assert_eq!(meta.decision(), Err(42));
    }

    #[test]
    fn test_stat_indices_are_dense() {
        for (i, stat) in VideoStat::ALL.iter().enumerate() {
            assert_eq!(stat.index() as usize, i);
        }
        assert_eq!(VideoStat::Dropped.index(), 4);
        assert_eq!(VideoStat::Forwarded.index(), 5);
    }

    #[test]
    fn test_filter_mode_decoding() {
        assert_eq!(FilterMode::try_from(1), Ok(FilterMode::DropP));
        assert_eq!(FilterMode::try_from(9), Err(9));
        assert_eq!(FilterMode::default(), FilterMode::Off);
    }
}
