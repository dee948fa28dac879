//! In-memory map store for running the pipeline off-kernel
//!
//! Mirrors the pinned map layout with atomics so the dispatcher and the
//! video filter can be driven from ordinary threads. Counters saturate
//! instead of wrapping.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::{
    constants::*,
    counter::saturating_increment,
    dispatch::DispatchState,
    types::{FilterMode, VideoStat, MAX_VIDEO_STATS},
    video::VideoState,
};

const CAMERAS: usize = NUM_CAMERAS as usize;

pub struct InMemoryMaps {
    counters: [AtomicU64; MAX_DISPATCH_COUNTERS as usize],
    control: [AtomicU32; MAX_CONTROL_SLOTS as usize],
    iface: [AtomicU32; MAX_IFACE_SLOTS as usize],
    global_mode: AtomicU32,
    cameras: [AtomicU32; CAMERAS],
    camera_present: [AtomicBool; CAMERAS],
    p_frame: AtomicU32,
    coords: [AtomicU32; 2],
    stats: [AtomicU64; MAX_VIDEO_STATS as usize],
}

impl Default for InMemoryMaps {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMaps {
    /// Every slot zeroed, matching freshly created BPF arrays
    pub fn new() -> Self {
        Self {
            counters: core::array::from_fn(|_| AtomicU64::new(0)),
            control: core::array::from_fn(|_| AtomicU32::new(0)),
            iface: core::array::from_fn(|_| AtomicU32::new(0)),
            global_mode: AtomicU32::new(FilterMode::Off as u32),
            cameras: core::array::from_fn(|_| AtomicU32::new(FilterMode::Off as u32)),
            camera_present: core::array::from_fn(|_| AtomicBool::new(true)),
            p_frame: AtomicU32::new(0),
            coords: core::array::from_fn(|_| AtomicU32::new(0)),
            stats: core::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    pub fn set_control(&self, slot: u32, value: u32) {
        if let Some(cell) = self.control.get(slot as usize) {
            cell.store(value, Ordering::Relaxed);
        }
    }

    pub fn set_iface(&self, slot: u32, value: u32) {
        if let Some(cell) = self.iface.get(slot as usize) {
            cell.store(value, Ordering::Relaxed);
        }
    }

    pub fn set_global_mode(&self, raw: u32) {
        self.global_mode.store(raw, Ordering::Relaxed);
    }

    /// Store a mode value without validating it
    pub fn set_camera_mode_raw(&self, camera_id: u32, raw: u32) {
        if let Some(cell) = self.cameras.get(camera_id as usize) {
            cell.store(raw, Ordering::Relaxed);
            self.camera_present[camera_id as usize].store(true, Ordering::Relaxed);
        }
    }

    /// Make lookups for `camera_id` miss
    pub fn remove_camera(&self, camera_id: u32) {
        if let Some(flag) = self.camera_present.get(camera_id as usize) {
            flag.store(false, Ordering::Relaxed);
        }
    }

    pub fn counter(&self, counter: u32) -> u64 {
        self.counters
            .get(counter as usize)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn stat(&self, stat: VideoStat) -> u64 {
        self.stats[stat.index() as usize].load(Ordering::Relaxed)
    }

    /// Last raw `(x, y)` recorded by coordinate ingestion
    pub fn coordinates(&self) -> (u32, u32) {
        (
            self.coords[COORD_SLOT_X as usize].load(Ordering::Relaxed),
            self.coords[COORD_SLOT_Y as usize].load(Ordering::Relaxed),
        )
    }

    /// Snapshot of every camera mode
    pub fn camera_table(&self) -> [u32; CAMERAS] {
        core::array::from_fn(|i| self.cameras[i].load(Ordering::Relaxed))
    }
}

impl DispatchState for InMemoryMaps {
    fn bump(&self, counter: u32) {
        if let Some(cell) = self.counters.get(counter as usize) {
            saturating_increment(cell);
        }
    }

    fn control_flag(&self, slot: u32) -> Option<u32> {
        self.control
            .get(slot as usize)
            .map(|c| c.load(Ordering::Relaxed))
    }

    fn iface_config(&self, slot: u32) -> Option<u32> {
        self.iface.get(slot as usize).map(|c| c.load(Ordering::Relaxed))
    }
}

impl VideoState for InMemoryMaps {
    fn increment(&self, stat: VideoStat) {
        if let Some(cell) = self.stats.get(stat.index() as usize) {
            saturating_increment(cell);
        }
    }

    fn camera_mode(&self, camera_id: u32) -> Option<u32> {
        let idx = camera_id as usize;
        if !self.camera_present.get(idx)?.load(Ordering::Relaxed) {
            return None;
        }
        Some(self.cameras[idx].load(Ordering::Relaxed))
    }

    fn set_camera_mode(&self, camera_id: u32, mode: FilterMode) {
        self.set_camera_mode_raw(camera_id, mode as u32);
    }

    fn global_mode(&self) -> Option<u32> {
        Some(self.global_mode.load(Ordering::Relaxed))
    }

    fn p_frame_in_progress(&self) -> bool {
        self.p_frame.load(Ordering::Relaxed) != 0
    }

    fn set_p_frame_in_progress(&self, in_progress: bool) {
        self.p_frame.store(in_progress as u32, Ordering::Relaxed);
    }

    fn record_coordinates(&self, x: u32, y: u32) {
        self.coords[COORD_SLOT_X as usize].store(x, Ordering::Relaxed);
        self.coords[COORD_SLOT_Y as usize].store(y, Ordering::Relaxed);
    }
}
