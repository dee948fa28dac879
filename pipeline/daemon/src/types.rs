//! Userspace type definitions
//!
//! Defines the data structures the control plane reads out of the pinned
//! maps and the snapshot it exports.
//!
//! ## Organization
//!
//! - **Kernel Types**: map values shared with the eBPF programs (from pipeline_common)
//! - **Userspace Types**: samples, interval deltas and export snapshots

use pipeline_common::{MAX_DISPATCH_COUNTERS, MAX_VIDEO_STATS, UPDATED_CAMERAS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Kernel Types (from eBPF programs)
// ============================================================================

pub mod kernel {
    //! Types shared between the eBPF programs and userspace
    //!
    //! These are re-exported from the pipeline-common crate and must
    //! maintain binary compatibility with the eBPF programs.

    pub use pipeline_common::constants;
    pub use pipeline_common::types::{FilterMode, PacketMetadata, VideoStat};
}

pub use kernel::{FilterMode, PacketMetadata, VideoStat};

/// `video_stats` in index order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoCounters(pub [u64; MAX_VIDEO_STATS as usize]);

impl VideoCounters {
    /// Build from a map dump; missing trailing slots read as zero
    pub fn from_slice(values: &[u64]) -> Self {
        let mut out = [0u64; MAX_VIDEO_STATS as usize];
        for (slot, value) in out.iter_mut().zip(values) {
            *slot = *value;
        }
        Self(out)
    }

    pub fn get(&self, stat: VideoStat) -> u64 {
        self.0[stat.index() as usize]
    }

    /// Counter growth since `earlier`
    ///
    /// Saturates at zero if a counter went backwards (maps recreated).
    pub fn since(&self, earlier: &VideoCounters) -> VideoCounters {
        let mut out = [0u64; MAX_VIDEO_STATS as usize];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.0[i].saturating_sub(earlier.0[i]);
        }
        Self(out)
    }

    /// Share of classified video packets that were dropped
    pub fn drop_ratio(&self) -> f64 {
        let dropped = self.get(VideoStat::Dropped);
        let forwarded = self.get(VideoStat::Forwarded);
        let total = dropped + forwarded;
        if total == 0 {
            0.0
        } else {
            dropped as f64 / total as f64
        }
    }

    /// Named view for export
    pub fn to_named(&self) -> BTreeMap<String, u64> {
        VideoStat::ALL
            .iter()
            .map(|stat| (stat.name().to_string(), self.get(*stat)))
            .collect()
    }
}

/// Dispatcher `counters` map
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherCounters {
    /// Packets seen by the dispatcher
    pub admitted: u64,
    /// Stage 1 invocations
    pub stage1: u64,
    /// Stage 2 invocations
    pub stage2: u64,
    /// Packets sent straight to the bridge peer
    pub bridged: u64,
    /// Packets redirected to the output interface after the stages
    #[serde(default)]
    pub output_redirects: u64,
}

impl DispatcherCounters {
    pub fn from_slice(values: &[u64]) -> Self {
        let at = |i: u32| values.get(i as usize).copied().unwrap_or(0);
        debug_assert!(values.len() <= MAX_DISPATCH_COUNTERS as usize);
        Self {
            admitted: at(pipeline_common::COUNTER_ADMITTED),
            stage1: at(pipeline_common::COUNTER_STAGE1),
            stage2: at(pipeline_common::COUNTER_STAGE2),
            bridged: at(pipeline_common::COUNTER_BRIDGED),
            output_redirects: at(pipeline_common::COUNTER_OUTPUT_REDIRECTS),
        }
    }

    pub fn since(&self, earlier: &DispatcherCounters) -> DispatcherCounters {
        DispatcherCounters {
            admitted: self.admitted.saturating_sub(earlier.admitted),
            stage1: self.stage1.saturating_sub(earlier.stage1),
            stage2: self.stage2.saturating_sub(earlier.stage2),
            bridged: self.bridged.saturating_sub(earlier.bridged),
            output_redirects: self.output_redirects.saturating_sub(earlier.output_redirects),
        }
    }
}

/// One read of every observable map
#[derive(Debug, Clone, Default)]
pub struct StatsSample {
    pub video: VideoCounters,
    pub dispatcher: DispatcherCounters,
    /// Last raw coordinate, `(x, y)`
    pub coordinates: (u32, u32),
    /// `camera_filtering_mode`, one raw value per camera id
    pub cameras: Vec<u32>,
    /// Last packet's metadata on each CPU (empty if the map is unreadable)
    pub metadata: Vec<PacketMetadata>,
}

/// Growth between two consecutive samples
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct IntervalReport {
    pub admitted: u64,
    pub rtp: u64,
    pub dropped: u64,
    pub forwarded: u64,
    pub drop_ratio: f64,
}

/// Tracked object position
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

/// Camera table summary
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct CameraSummary {
    /// Addressable camera ids currently streaming unfiltered
    pub unfiltered: Vec<u32>,
    /// Number of cameras with P-slice filtering
    pub filtering: u32,
}

impl CameraSummary {
    /// Summarise the addressable part of the camera table
    ///
    /// Ids from `UPDATED_CAMERAS` up are never written by position updates
    /// and would always read as unfiltered, so they are left out.
    pub fn from_table(table: &[u32]) -> Self {
        let mut summary = CameraSummary::default();
        for (id, raw) in table.iter().take(UPDATED_CAMERAS as usize).enumerate() {
            match FilterMode::try_from(*raw) {
                Ok(FilterMode::DropP) | Ok(FilterMode::ForwardP) => summary.filtering += 1,
                _ => summary.unfiltered.push(id as u32),
            }
        }
        summary
    }
}

/// Largest visit counts left in the per-CPU metadata
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VisitSummary {
    pub max_stage1_visits: u32,
    pub max_stage2_visits: u32,
}

impl VisitSummary {
    pub fn from_metadata(metadata: &[PacketMetadata]) -> Self {
        metadata.iter().fold(VisitSummary::default(), |acc, meta| VisitSummary {
            max_stage1_visits: acc.max_stage1_visits.max(meta.stage1_visits),
            max_stage2_visits: acc.max_stage2_visits.max(meta.stage2_visits),
        })
    }
}

/// Aggregated statistics for export
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StatsSnapshot {
    /// ISO 8601 timestamp when the snapshot was taken
    pub timestamp: String,
    /// Duration of the collection period in seconds
    pub duration_seconds: u64,
    /// Number of samples taken
    pub samples: u64,
    /// Dispatcher counter growth over the period
    pub dispatcher: DispatcherCounters,
    /// Video filter counter growth over the period
    pub video: BTreeMap<String, u64>,
    /// Absolute video filter counters at the end of the period
    pub video_totals: BTreeMap<String, u64>,
    /// dropped / (dropped + forwarded) over the period
    pub drop_ratio: f64,
    /// Highest per-interval drop ratio seen
    pub peak_interval_drop_ratio: f64,
    /// Last coordinate the filter received
    pub position: Position,
    pub cameras: CameraSummary,
    pub visits: VisitSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_counters_delta_and_ratio() {
        let mut before = VideoCounters::default();
        before.0[VideoStat::Dropped.index() as usize] = 10;
        before.0[VideoStat::Forwarded.index() as usize] = 10;

        let mut after = before;
        after.0[VideoStat::Dropped.index() as usize] = 40;
        after.0[VideoStat::Forwarded.index() as usize] = 20;

        let delta = after.since(&before);
        assert_eq!(delta.get(VideoStat::Dropped), 30);
        assert_eq!(delta.get(VideoStat::Forwarded), 10);
        assert!((delta.drop_ratio() - 0.75).abs() < f64::EPSILON);

        // a reset map never produces a negative delta
        assert_eq!(before.since(&after).get(VideoStat::Dropped), 0);
        assert_eq!(VideoCounters::default().drop_ratio(), 0.0);
    }

    #[test]
    fn test_counters_from_short_slice() {
        let video = VideoCounters::from_slice(&[5, 4]);
        assert_eq!(video.get(VideoStat::TotalPackets), 5);
        assert_eq!(video.get(VideoStat::RtpPackets), 4);
        assert_eq!(video.get(VideoStat::RtpVersionFail), 0);

        let dispatcher = DispatcherCounters::from_slice(&[9, 8, 7, 6]);
        assert_eq!(dispatcher.admitted, 9);
        assert_eq!(dispatcher.bridged, 6);
        assert_eq!(dispatcher.output_redirects, 0);

        let dispatcher = DispatcherCounters::from_slice(&[9, 8, 7, 6, 5]);
        assert_eq!(dispatcher.output_redirects, 5);
    }

    #[test]
    fn test_camera_summary() {
        let mut table = vec![FilterMode::DropP as u32; 100];
        table[5] = FilterMode::Off as u32;
        table[75] = FilterMode::Off as u32;
        table.extend(std::iter::repeat(0).take(100));

        let summary = CameraSummary::from_table(&table);
        assert_eq!(summary.filtering, 98);
        assert_eq!(summary.unfiltered, vec![5, 75]);
    }

    #[test]
    fn test_named_counters_cover_every_stat() {
        let named = VideoCounters::default().to_named();
        assert_eq!(named.len(), VideoStat::ALL.len());
        assert!(named.contains_key("wrong_port_range"));
    }
}
