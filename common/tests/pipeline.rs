//! End-to-end behaviour of the dispatcher chained into the video filter,
//! driven over the in-memory maps.

use pipeline_common::{
    camera::apply_coordinate,
    dispatch,
    stage::passthrough_stage,
    tables::InMemoryMaps,
    testing::FrameBuilder,
    video::{self, VideoState},
    Action, Disposition, FilterMode, PacketMetadata, RoutingDecision, TrackedCoordinate,
    VideoStat, CAMERA_BASE_PORT, COUNTER_ADMITTED, COUNTER_BRIDGED, COUNTER_OUTPUT_REDIRECTS,
    COUNTER_STAGE1, COUNTER_STAGE2, CONTROL_STAGE1_ENABLED, CONTROL_STAGE2_ENABLED, FLAG_ENABLED,
    IFACE_BRIDGE_MODE, IFACE_OUTPUT_IFINDEX, IFACE_PEER_IFINDEX, MAX_STAGE_VISITS, NUM_CAMERAS,
    POSITION_PORT, UPDATED_CAMERAS, VIDEO_HOST_ADDR,
};

const P_SLICE: u8 = 1;
const IDR: u8 = 19;

fn pipeline_maps() -> InMemoryMaps {
    let maps = InMemoryMaps::new();
    maps.set_control(CONTROL_STAGE1_ENABLED, FLAG_ENABLED);
    maps.set_control(CONTROL_STAGE2_ENABLED, FLAG_ENABLED);
    maps
}

/// Dispatch one frame through pass-through -> video filter
fn run_packet(maps: &InMemoryMaps, frame: &[u8]) -> (Action, PacketMetadata) {
    let mut meta = PacketMetadata::default();
    let slot = &mut meta;
    let mut stages = (passthrough_stage, |_: &mut PacketMetadata| {
        video::process(frame, maps)
    });
    let action = dispatch(maps, &mut stages, move || Some(slot));
    (action, meta)
}

fn camera_frame(camera_id: u16) -> FrameBuilder {
    FrameBuilder::udp(VIDEO_HOST_ADDR, CAMERA_BASE_PORT + camera_id).rtp(2)
}

fn position_frame(x: u32, y: u32) -> Vec<u8> {
    FrameBuilder::udp(VIDEO_HOST_ADDR, POSITION_PORT)
        .coordinate(x, y)
        .build()
}

fn off_cameras(maps: &InMemoryMaps) -> Vec<u32> {
    maps.camera_table()
        .iter()
        .enumerate()
        .filter(|(_, &mode)| mode == FilterMode::Off as u32)
        .map(|(id, _)| id as u32)
        .collect()
}

#[test]
fn test_every_position_unfilters_exactly_two_cameras() {
    let maps = InMemoryMaps::new();

    for (x, y) in [(0, 0), (19, 20), (500, 500), (999, 999), (250, 730)] {
        assert!(apply_coordinate(&maps, TrackedCoordinate { x, y }));

        let off: Vec<u32> = off_cameras(&maps)
            .into_iter()
            .filter(|&id| id < UPDATED_CAMERAS)
            .collect();
        assert_eq!(off, vec![y / 20, 50 + x / 20], "position ({}, {})", x, y);

        // ids past the updated range are never written
        let table = maps.camera_table();
        assert!(table[UPDATED_CAMERAS as usize..]
            .iter()
            .all(|&mode| mode == FilterMode::Off as u32));
        assert_eq!(table.len(), NUM_CAMERAS as usize);
    }
    assert_eq!(maps.stat(VideoStat::CoordsUpdated), 5);
}

#[test]
fn test_out_of_range_position_leaves_table_alone() {
    let maps = pipeline_maps();
    run_packet(&maps, &position_frame(500, 500));
    let before = maps.camera_table();

    let (action, _) = run_packet(&maps, &position_frame(1000, 10));

    assert_eq!(action, Action::Pass);
    assert_eq!(maps.camera_table(), before);
    // the raw value is still recorded for debugging
    assert_eq!(maps.coordinates(), (1000, 10));
    assert_eq!(maps.stat(VideoStat::PositionPackets), 2);
    assert_eq!(maps.stat(VideoStat::CoordsUpdated), 1);
}

#[test]
fn test_repeating_a_position_is_idempotent() {
    let maps = pipeline_maps();
    run_packet(&maps, &position_frame(123, 456));
    let once = maps.camera_table();
    run_packet(&maps, &position_frame(123, 456));
    assert_eq!(maps.camera_table(), once);
}

#[test]
fn test_filtered_camera_drops_p_slices_and_keeps_idr() {
    let maps = pipeline_maps();
    // object at (500, 500): cameras 25 and 75 see it, camera 7 does not
    run_packet(&maps, &position_frame(500, 500));

    let (action, meta) = run_packet(&maps, &camera_frame(7).h265(P_SLICE).build());
    assert_eq!(action, Action::Drop);
    assert_eq!(meta.stage1_visits, 1);
    assert_eq!(meta.stage2_visits, 1);

    let (action, _) = run_packet(&maps, &camera_frame(7).h265(IDR).build());
    assert_eq!(action, Action::Pass);

    assert_eq!(maps.stat(VideoStat::Dropped), 1);
    assert_eq!(maps.stat(VideoStat::PSlices), 1);
    assert_eq!(maps.stat(VideoStat::ModeDropP), 2);
}

#[test]
fn test_visible_camera_forwards_everything() {
    let maps = pipeline_maps();
    run_packet(&maps, &position_frame(500, 500));

    for frame in [
        camera_frame(25).h265(P_SLICE).build(),
        camera_frame(75).fu(true, false, P_SLICE).build(),
        camera_frame(75).fu(false, true, P_SLICE).build(),
    ] {
        assert_eq!(run_packet(&maps, &frame).0, Action::Pass);
    }
    assert_eq!(maps.stat(VideoStat::ModeOff), 3);
    assert_eq!(maps.stat(VideoStat::Dropped), 0);
}

#[test]
fn test_fragmented_p_slice_is_dropped_whole() {
    let maps = pipeline_maps();
    run_packet(&maps, &position_frame(500, 500));

    let fragments = [
        camera_frame(3).fu(true, false, P_SLICE).build(),
        camera_frame(3).fu(false, false, P_SLICE).build(),
        camera_frame(3).fu(false, true, P_SLICE).build(),
    ];
    for fragment in &fragments {
        assert_eq!(run_packet(&maps, fragment).0, Action::Drop);
    }
    assert!(!maps.p_frame_in_progress());
    assert_eq!(maps.stat(VideoStat::FuStart), 1);
    assert_eq!(maps.stat(VideoStat::Dropped), 3);

    // the next frame starts clean
    let idr = camera_frame(3).fu(true, true, IDR).build();
    assert_eq!(run_packet(&maps, &idr).0, Action::Pass);
}

#[test]
fn test_forward_p_mode_classifies_like_drop_p() {
    let maps = pipeline_maps();
    maps.set_camera_mode_raw(9, FilterMode::ForwardP as u32);

    assert_eq!(
        run_packet(&maps, &camera_frame(9).h265(P_SLICE).build()).0,
        Action::Drop
    );
    assert_eq!(maps.stat(VideoStat::ModeForwardP), 1);
}

#[test]
fn test_survivors_are_routed_to_the_output_interface() {
    let maps = pipeline_maps();
    maps.set_iface(IFACE_OUTPUT_IFINDEX, 9);
    run_packet(&maps, &position_frame(500, 500));

    let (action, _) = run_packet(&maps, &camera_frame(7).h265(IDR).build());
    assert_eq!(action, Action::Redirect(9));
    // drops never leave through the output
    let (action, _) = run_packet(&maps, &camera_frame(7).h265(P_SLICE).build());
    assert_eq!(action, Action::Drop);

    // position packet and IDR left through the output, the drop did not
    assert_eq!(maps.counter(COUNTER_OUTPUT_REDIRECTS), 2);
}

#[test]
fn test_bridge_mode_skips_every_stage() {
    let maps = pipeline_maps();
    maps.set_iface(IFACE_BRIDGE_MODE, FLAG_ENABLED);
    maps.set_iface(IFACE_PEER_IFINDEX, 4);

    let (action, _) = run_packet(&maps, &camera_frame(7).h265(P_SLICE).build());

    assert_eq!(action, Action::Redirect(4));
    assert_eq!(maps.counter(COUNTER_ADMITTED), 1);
    assert_eq!(maps.counter(COUNTER_BRIDGED), 1);
    assert_eq!(maps.counter(COUNTER_OUTPUT_REDIRECTS), 0);
    assert_eq!(maps.counter(COUNTER_STAGE1), 0);
    assert_eq!(maps.stat(VideoStat::Stage2Entry), 0);
}

#[test]
fn test_returning_stage_loop_is_bounded() {
    let maps = pipeline_maps();
    let mut meta = PacketMetadata::default();
    let slot = &mut meta;
    let mut stages = (passthrough_stage, |meta: &mut PacketMetadata| {
        meta.set_decision(RoutingDecision::Return);
        Disposition::Pass
    });

    let action = dispatch(&maps, &mut stages, move || Some(slot));

    assert_eq!(action, Action::Pass);
    assert_eq!(meta.stage1_visits, MAX_STAGE_VISITS);
    assert_eq!(meta.stage2_visits, MAX_STAGE_VISITS);
    assert_eq!(maps.counter(COUNTER_STAGE1), u64::from(MAX_STAGE_VISITS));
    assert_eq!(maps.counter(COUNTER_STAGE2), u64::from(MAX_STAGE_VISITS));
}

#[test]
fn test_unknown_decision_leaves_through_output() {
    let maps = pipeline_maps();
    maps.set_iface(IFACE_OUTPUT_IFINDEX, 6);
    let mut meta = PacketMetadata::default();
    let slot = &mut meta;
    let mut stages = (
        |meta: &mut PacketMetadata| {
            meta.routing_decision = 42;
            Disposition::Pass
        },
        |_: &mut PacketMetadata| Disposition::Drop,
    );

    let action = dispatch(&maps, &mut stages, move || Some(slot));

    assert_eq!(action, Action::Redirect(6));
    assert_eq!(maps.counter(COUNTER_STAGE2), 0);
}

#[test]
fn test_malformed_frames_pass() {
    let maps = pipeline_maps();
    let frame = camera_frame(7).h265(P_SLICE).build();

    // cut inside the IPv4 header
    assert_eq!(run_packet(&maps, &frame[..14 + 10]).0, Action::Pass);
    // IHL below the minimum
    let bad_ihl = camera_frame(7).ihl(4).h265(P_SLICE).build();
    assert_eq!(run_packet(&maps, &bad_ihl).0, Action::Pass);
    // wrong destination host
    let elsewhere = FrameBuilder::udp([10, 1, 1, 3], CAMERA_BASE_PORT).rtp(2).h265(P_SLICE).build();
    assert_eq!(run_packet(&maps, &elsewhere).0, Action::Pass);

    assert_eq!(maps.stat(VideoStat::Dropped), 0);
    assert_eq!(maps.stat(VideoStat::WrongIp), 1);
    assert_eq!(maps.stat(VideoStat::Stage2Entry), 3);
}

#[test]
fn test_concurrent_packets_lose_no_counts() {
    let maps = pipeline_maps();
    run_packet(&maps, &position_frame(500, 500));
    let p_slice = camera_frame(7).h265(P_SLICE).build();

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..1_000 {
                    assert_eq!(run_packet(&maps, &p_slice).0, Action::Drop);
                }
            });
        }
    });

    assert_eq!(maps.counter(COUNTER_ADMITTED), 8_001);
    assert_eq!(maps.stat(VideoStat::Dropped), 8_000);
    assert_eq!(maps.stat(VideoStat::TotalPackets), 8_001);
}
