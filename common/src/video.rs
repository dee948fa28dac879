//! RTP/H.265 video filter
//!
//! Runs as the second pipeline stage. Coordinate-update packets on the
//! position port rewrite the camera table; RTP streams to the video host
//! have their P-slices dropped when their camera's mode says so.
//!
//! ## Decision flow
//!
//! ```text
//! Ethernet -> IPv4 -> UDP --dport == 5555--> coordinate ingestion -> PASS
//!                          |
//!                          +--> host? port range? RTP v2? -> camera mode
//!                                                             |
//!                             OFF -> PASS      DROP_P / FORWARD_P
//!                                                             |
//!                                  H.265 NAL type / FU header -> DROP or PASS
//! ```
//!
//! Malformed or truncated input always passes. Only a classified P-slice is
//! ever dropped.

use crate::{
    camera::apply_coordinate,
    constants::*,
    packet::*,
    types::{Disposition, FilterMode, TrackedCoordinate, VideoStat},
};

/// State the video filter reads and writes
///
/// Implemented over BPF maps in the kernel and over atomics on the host.
/// All methods take `&self`: every backing store is shared between CPUs.
pub trait VideoState {
    fn increment(&self, stat: VideoStat);

    /// Raw mode for a camera, `None` when the entry is missing
    fn camera_mode(&self, camera_id: u32) -> Option<u32>;

    fn set_camera_mode(&self, camera_id: u32, mode: FilterMode);

    /// Raw global fallback mode, `None` when the entry is missing
    fn global_mode(&self) -> Option<u32>;

    fn p_frame_in_progress(&self) -> bool;

    fn set_p_frame_in_progress(&self, in_progress: bool);

    /// Last raw coordinate seen, kept even when it is rejected
    fn record_coordinates(&self, x: u32, y: u32);
}

/// Classify one packet
#[inline(always)]
pub fn process<P, S>(pkt: &P, state: &S) -> Disposition
where
    P: PacketBuf + ?Sized,
    S: VideoState + ?Sized,
{
    state.increment(VideoStat::Stage2Entry);
    state.increment(VideoStat::TotalPackets);

    let (ip, udp_offset) = match locate_udp(pkt, state) {
        Ok(found) => found,
        Err(_) => return forward(state),
    };

    let Some(udp) = pkt.load::<UdpHdr>(udp_offset) else {
        return Disposition::Pass;
    };
    state.increment(VideoStat::PrePortCheck);

    let payload = udp_offset + UDP_HDR_LEN;
    let dport = udp.dest();

    if dport == POSITION_PORT {
        state.increment(VideoStat::PositionPortMatched);
        return ingest_coordinates(pkt, payload, state);
    }

    filter_video(pkt, &ip, dport, payload, state)
}

/// Walk Ethernet and IPv4 up to the UDP header offset
#[inline(always)]
fn locate_udp<P, S>(pkt: &P, state: &S) -> Result<(Ipv4Hdr, usize), ParseError>
where
    P: PacketBuf + ?Sized,
    S: VideoState + ?Sized,
{
    let eth: EthHdr = pkt.read(0)?;
    if !eth.is_ipv4() {
        return Err(ParseError::NotIpv4);
    }
    state.increment(VideoStat::Ipv4Packets);

    let ip: Ipv4Hdr = pkt.read(ETH_HDR_LEN)?;
    if !ip.is_udp() {
        return Err(ParseError::NotUdp);
    }
    state.increment(VideoStat::UdpPackets);

    let offset = ETH_HDR_LEN + ip.header_len()?;
    Ok((ip, offset))
}

#[inline(always)]
fn ingest_coordinates<P, S>(pkt: &P, offset: usize, state: &S) -> Disposition
where
    P: PacketBuf + ?Sized,
    S: VideoState + ?Sized,
{
    state.increment(VideoStat::PositionPackets);

    if let Some(rec) = pkt.load::<CoordinateRecord>(offset) {
        apply_coordinate(
            state,
            TrackedCoordinate {
                x: rec.x(),
                y: rec.y(),
            },
        );
    }

    // Control traffic is never filtered
    Disposition::Pass
}

#[inline(always)]
fn filter_video<P, S>(pkt: &P, ip: &Ipv4Hdr, dport: u16, payload: usize, state: &S) -> Disposition
where
    P: PacketBuf + ?Sized,
    S: VideoState + ?Sized,
{
    if ip.dst_addr != VIDEO_HOST_ADDR {
        state.increment(VideoStat::WrongIp);
        return forward(state);
    }

    let base = CAMERA_BASE_PORT as u32;
    let port = dport as u32;
    if port < base || port >= base + NUM_CAMERAS {
        state.increment(VideoStat::WrongPortRange);
        return forward(state);
    }

    let camera_id = port - base;
    if camera_id >= NUM_CAMERAS {
        state.increment(VideoStat::CameraOutOfRange);
        return forward(state);
    }

    let Some(rtp) = pkt.load::<RtpHdr>(payload) else {
        return Disposition::Pass;
    };
    if rtp.version() != RTP_VERSION {
        state.increment(VideoStat::RtpVersionFail);
        return Disposition::Pass;
    }
    state.increment(VideoStat::RtpPackets);

    match active_mode(camera_id, state) {
        FilterMode::Off => {
            state.increment(VideoStat::ModeOff);
            return forward(state);
        }
        FilterMode::DropP => state.increment(VideoStat::ModeDropP),
        FilterMode::ForwardP => state.increment(VideoStat::ModeForwardP),
    }

    classify_h265(pkt, payload + core::mem::size_of::<RtpHdr>(), state)
}

/// Per-camera mode, falling back to the global mode, then to `Off`
#[inline(always)]
fn active_mode<S: VideoState + ?Sized>(camera_id: u32, state: &S) -> FilterMode {
    let raw = match state.camera_mode(camera_id) {
        Some(mode) => mode,
        None => {
            state.increment(VideoStat::MapLookupFailed);
            state.global_mode().unwrap_or(FilterMode::Off as u32)
        }
    };
    FilterMode::try_from(raw).unwrap_or(FilterMode::Off)
}

#[inline(always)]
fn classify_h265<P, S>(pkt: &P, offset: usize, state: &S) -> Disposition
where
    P: PacketBuf + ?Sized,
    S: VideoState + ?Sized,
{
    let Some(ph) = pkt.load::<H265PayloadHdr>(offset) else {
        return forward(state);
    };

    if ph.is_fragment() {
        let Some(fu) = pkt.load::<FuHdr>(offset + core::mem::size_of::<H265PayloadHdr>()) else {
            return forward(state);
        };

        let mut in_p_frame = state.p_frame_in_progress();
        if fu.is_start() {
            state.increment(VideoStat::FuStart);
            if is_p_slice(fu.inner_type()) {
                state.set_p_frame_in_progress(true);
                in_p_frame = true;
            }
        }

        if in_p_frame {
            if fu.is_end() {
                state.set_p_frame_in_progress(false);
            }
            return drop_p_slice(state);
        }
    } else if is_p_slice(ph.nal_type()) {
        return drop_p_slice(state);
    }

    forward(state)
}

#[inline(always)]
fn drop_p_slice<S: VideoState + ?Sized>(state: &S) -> Disposition {
    state.increment(VideoStat::PSlices);
    state.increment(VideoStat::Dropped);
    Disposition::Drop
}

#[inline(always)]
fn forward<S: VideoState + ?Sized>(state: &S) -> Disposition {
    state.increment(VideoStat::Forwarded);
    Disposition::Pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::InMemoryMaps;
    use crate::testing::FrameBuilder;

    fn video(port: u16) -> FrameBuilder {
        FrameBuilder::udp(VIDEO_HOST_ADDR, port).rtp(2)
    }

    #[test]
    fn test_single_p_slice_dropped_when_filtering() {
        let maps = InMemoryMaps::new();
        maps.set_camera_mode(7, FilterMode::DropP);

        let pkt = video(5007).h265(1).build();
        assert_eq!(process(&pkt[..], &maps), Disposition::Drop);
        assert_eq!(maps.stat(VideoStat::PSlices), 1);
        assert_eq!(maps.stat(VideoStat::Dropped), 1);
        assert_eq!(maps.stat(VideoStat::ModeDropP), 1);
        assert_eq!(maps.stat(VideoStat::Forwarded), 0);
    }

    #[test]
    fn test_forward_p_mode_also_classifies() {
        let maps = InMemoryMaps::new();
        maps.set_camera_mode(3, FilterMode::ForwardP);

        let pkt = video(5003).h265(9).build();
        assert_eq!(process(&pkt[..], &maps), Disposition::Drop);
        assert_eq!(maps.stat(VideoStat::ModeForwardP), 1);
    }

    #[test]
    fn test_off_mode_forwards_everything() {
        let maps = InMemoryMaps::new();
        let pkt = video(5000).h265(1).build();
        assert_eq!(process(&pkt[..], &maps), Disposition::Pass);
        assert_eq!(maps.stat(VideoStat::ModeOff), 1);
        assert_eq!(maps.stat(VideoStat::Forwarded), 1);
        assert_eq!(maps.stat(VideoStat::RtpPackets), 1);
    }

    #[test]
    fn test_non_p_nal_forwarded() {
        let maps = InMemoryMaps::new();
        maps.set_camera_mode(0, FilterMode::DropP);
        // 19 is an IDR slice
        let pkt = video(5000).h265(19).build();
        assert_eq!(process(&pkt[..], &maps), Disposition::Pass);
        assert_eq!(maps.stat(VideoStat::Forwarded), 1);
    }

    #[test]
    fn test_fragmented_p_frame_dropped_until_end_bit() {
        let maps = InMemoryMaps::new();
        maps.set_camera_mode(1, FilterMode::DropP);

        let start = video(5001).fu(true, false, 1).build();
        let middle = video(5001).fu(false, false, 1).build();
        let end = video(5001).fu(false, true, 1).build();
        let after = video(5001).fu(false, false, 1).build();

        assert_eq!(process(&start[..], &maps), Disposition::Drop);
        assert!(maps.p_frame_in_progress());
        assert_eq!(process(&middle[..], &maps), Disposition::Drop);
        assert_eq!(process(&end[..], &maps), Disposition::Drop);
        assert!(!maps.p_frame_in_progress());
        assert_eq!(process(&after[..], &maps), Disposition::Pass);

        assert_eq!(maps.stat(VideoStat::FuStart), 1);
        assert_eq!(maps.stat(VideoStat::Dropped), 3);
        assert_eq!(maps.stat(VideoStat::Forwarded), 1);
    }

    #[test]
    fn test_fragmented_idr_not_dropped() {
        let maps = InMemoryMaps::new();
        maps.set_camera_mode(1, FilterMode::DropP);
        let start = video(5001).fu(true, false, 19).build();
        assert_eq!(process(&start[..], &maps), Disposition::Pass);
        assert!(!maps.p_frame_in_progress());
        assert_eq!(maps.stat(VideoStat::FuStart), 1);
    }

    #[test]
    fn test_wrong_host_and_port_range() {
        let maps = InMemoryMaps::new();
        let other_host = FrameBuilder::udp([10, 1, 1, 3], 5001).rtp(2).h265(1).build();
        assert_eq!(process(&other_host[..], &maps), Disposition::Pass);
        assert_eq!(maps.stat(VideoStat::WrongIp), 1);

        let below = video(4999).h265(1).build();
        let above = video(5200).h265(1).build();
        assert_eq!(process(&below[..], &maps), Disposition::Pass);
        assert_eq!(process(&above[..], &maps), Disposition::Pass);
        assert_eq!(maps.stat(VideoStat::WrongPortRange), 2);
        assert_eq!(maps.stat(VideoStat::Forwarded), 3);
    }

    #[test]
    fn test_rtp_version_mismatch_passes_uncounted() {
        let maps = InMemoryMaps::new();
        maps.set_camera_mode(2, FilterMode::DropP);
        let pkt = FrameBuilder::udp(VIDEO_HOST_ADDR, 5002).rtp(1).h265(1).build();
        assert_eq!(process(&pkt[..], &maps), Disposition::Pass);
        assert_eq!(maps.stat(VideoStat::RtpVersionFail), 1);
        assert_eq!(maps.stat(VideoStat::RtpPackets), 0);
        assert_eq!(maps.stat(VideoStat::Forwarded), 0);
    }

    #[test]
    fn test_truncated_packets_never_drop() {
        let maps = InMemoryMaps::new();
        maps.set_camera_mode(1, FilterMode::DropP);
        let full = video(5001).fu(true, false, 1).build();

        for len in 0..full.len() {
            assert_eq!(
                process(&full[..len], &maps),
                Disposition::Pass,
                "truncated to {len} bytes"
            );
        }
        // none of the prefixes reached the FU start
        assert!(!maps.p_frame_in_progress());
    }

    #[test]
    fn test_ipv4_with_short_ihl_is_malformed() {
        let maps = InMemoryMaps::new();
        maps.set_camera_mode(1, FilterMode::DropP);
        let pkt = video(5001).h265(1).ihl(4).build();
        assert_eq!(process(&pkt[..], &maps), Disposition::Pass);
        assert_eq!(maps.stat(VideoStat::PrePortCheck), 0);
        assert_eq!(maps.stat(VideoStat::Forwarded), 1);
    }

    #[test]
    fn test_ip_options_shift_udp_header() {
        let maps = InMemoryMaps::new();
        maps.set_camera_mode(1, FilterMode::DropP);
        let pkt = video(5001).h265(1).ihl(6).build();
        assert_eq!(process(&pkt[..], &maps), Disposition::Drop);
    }

    #[test]
    fn test_missing_camera_entry_falls_back_to_global() {
        let maps = InMemoryMaps::new();
        maps.set_global_mode(FilterMode::DropP as u32);
        maps.remove_camera(4);

        let pkt = video(5004).h265(1).build();
        assert_eq!(process(&pkt[..], &maps), Disposition::Drop);
        assert_eq!(maps.stat(VideoStat::MapLookupFailed), 1);
    }

    #[test]
    fn test_unknown_mode_value_treated_as_off() {
        let maps = InMemoryMaps::new();
        maps.set_camera_mode_raw(4, 7);
        let pkt = video(5004).h265(1).build();
        assert_eq!(process(&pkt[..], &maps), Disposition::Pass);
        assert_eq!(maps.stat(VideoStat::ModeOff), 1);
    }

    #[test]
    fn test_position_packet_updates_table_and_passes() {
        let maps = InMemoryMaps::new();
        // position packets are accepted for any destination host
        let pkt = FrameBuilder::udp([192, 168, 0, 9], POSITION_PORT)
            .coordinate(500, 105)
            .build();

        assert_eq!(process(&pkt[..], &maps), Disposition::Pass);
        assert_eq!(maps.stat(VideoStat::PositionPortMatched), 1);
        assert_eq!(maps.stat(VideoStat::PositionPackets), 1);
        assert_eq!(maps.stat(VideoStat::CoordsUpdated), 1);
        assert_eq!(maps.camera_mode(5), Some(FilterMode::Off as u32));
        assert_eq!(maps.camera_mode(0), Some(FilterMode::DropP as u32));
    }

    #[test]
    fn test_truncated_position_packet_passes_without_update() {
        let maps = InMemoryMaps::new();
        let pkt = FrameBuilder::udp(VIDEO_HOST_ADDR, POSITION_PORT)
            .coordinate(1, 1)
            .build();
        let short = &pkt[..pkt.len() - 1];

        assert_eq!(process(short, &maps), Disposition::Pass);
        assert_eq!(maps.stat(VideoStat::PositionPackets), 1);
        assert_eq!(maps.stat(VideoStat::CoordsUpdated), 0);
        assert_eq!(maps.coordinates(), (0, 0));
    }

    #[test]
    fn test_entry_counters_counted_once() {
        let maps = InMemoryMaps::new();
        let pkt = video(5000).h265(19).build();
        process(&pkt[..], &maps);
        assert_eq!(maps.stat(VideoStat::TotalPackets), 1);
        assert_eq!(maps.stat(VideoStat::Stage2Entry), 1);
        assert_eq!(maps.stat(VideoStat::Ipv4Packets), 1);
        assert_eq!(maps.stat(VideoStat::UdpPackets), 1);
        assert_eq!(maps.stat(VideoStat::PrePortCheck), 1);
    }
}
