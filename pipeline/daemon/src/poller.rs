//! Periodic polling of the pinned stats maps
//!
//! A background task samples the maps on a fixed interval, feeds the
//! collector and logs per-interval progress.

use crate::{
    collector::StatsCollector,
    registry::{read_all, Registry},
    types::{DispatcherCounters, PacketMetadata, StatsSample, VideoCounters},
};
use anyhow::{Context, Result};
use aya::maps::{Array, MapData, PerCpuArray};
use log::{debug, info, warn};
use pipeline_common::{
    COORD_SLOT_X, COORD_SLOT_Y, MAP_CAMERA_FILTERING_MODE, MAP_COORDS_DEBUG, MAP_COUNTERS,
    MAP_PKT_META, MAP_VIDEO_STATS,
};
use std::{sync::Arc, time::Duration};
use tokio::{sync::Mutex, task::JoinHandle, time::interval};

/// Anything that can produce a full stats sample
pub trait SampleSource: Send + Sync + 'static {
    fn sample(&self) -> Result<StatsSample>;
}

/// Handles to the observable maps in the pin registry
pub struct PinnedStats {
    video: Array<MapData, u64>,
    counters: Array<MapData, u64>,
    coords: Array<MapData, u32>,
    cameras: Array<MapData, u32>,
    metadata: Option<PerCpuArray<MapData, PacketMetadata>>,
}

impl PinnedStats {
    /// Open the stats maps
    ///
    /// The per-CPU metadata map is optional; without it visit counts are
    /// reported as zero.
    pub fn open(registry: &Registry) -> Result<Self> {
        let metadata = match registry.per_cpu_array::<PacketMetadata>(MAP_PKT_META) {
            Ok(map) => Some(map),
            Err(e) => {
                warn!("  ⚠ Per-CPU metadata not available: {:#}", e);
                None
            }
        };

        Ok(Self {
            video: registry.array(MAP_VIDEO_STATS)?,
            counters: registry.array(MAP_COUNTERS)?,
            coords: registry.array(MAP_COORDS_DEBUG)?,
            cameras: registry.array(MAP_CAMERA_FILTERING_MODE)?,
            metadata,
        })
    }
}

/// Per-CPU metadata from a read, or none after logging why the read failed
fn metadata_or_warn<E: std::fmt::Display>(
    read: std::result::Result<Vec<PacketMetadata>, E>,
) -> Vec<PacketMetadata> {
    match read {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("  ⚠ Failed to read {}: {}", MAP_PKT_META, e);
            Vec::new()
        }
    }
}

impl SampleSource for PinnedStats {
    fn sample(&self) -> Result<StatsSample> {
        let video = read_all(&self.video).context("Failed to read video_stats")?;
        let counters = read_all(&self.counters).context("Failed to read counters")?;
        let x = self.coords.get(&COORD_SLOT_X, 0).context("Failed to read coordinates")?;
        let y = self.coords.get(&COORD_SLOT_Y, 0).context("Failed to read coordinates")?;
        let cameras = read_all(&self.cameras).context("Failed to read camera table")?;

        let metadata = match &self.metadata {
            Some(map) => {
                metadata_or_warn(map.get(&0, 0).map(|values| values.iter().copied().collect()))
            }
            None => Vec::new(),
        };

        Ok(StatsSample {
            video: VideoCounters::from_slice(&video),
            dispatcher: DispatcherCounters::from_slice(&counters),
            coordinates: (x, y),
            cameras,
            metadata,
        })
    }
}

/// Polls a sample source into a shared collector
pub struct StatsPoller<S: SampleSource> {
    source: Arc<S>,
    collector: Arc<Mutex<StatsCollector>>,
    verbose: bool,
}

impl<S: SampleSource> StatsPoller<S> {
    /// Create a new poller
    ///
    /// # Arguments
    ///
    /// * `source` - Where samples come from
    /// * `collector` - Shared stats collector
    /// * `verbose` - Log the tracked position every interval
    pub fn new(source: S, collector: Arc<Mutex<StatsCollector>>, verbose: bool) -> Self {
        Self {
            source: Arc::new(source),
            collector,
            verbose,
        }
    }

    /// Take one sample right now
    pub async fn poll_once(&self) -> Result<()> {
        let sample = self.source.sample()?;
        self.collector.lock().await.record(sample);
        Ok(())
    }

    /// Spawn the polling task
    ///
    /// The first tick fires immediately and sets the baseline.
    pub fn spawn(&self, period: Duration) -> JoinHandle<()> {
        let source = Arc::clone(&self.source);
        let collector = Arc::clone(&self.collector);
        let verbose = self.verbose;

        tokio::spawn(async move {
            let mut ticker = interval(period);

            loop {
                ticker.tick().await;

                let sample = match source.sample() {
                    Ok(sample) => sample,
                    Err(e) => {
                        warn!("Error sampling stats maps: {:#}", e);
                        continue;
                    }
                };
                let (x, y) = sample.coordinates;

                let mut collector = collector.lock().await;
                let first = collector.sample_count() == 0;
                let report = collector.record(sample);
                if first {
                    continue;
                }

                info!(
                    "📈 Progress: {} admitted, {} rtp, {} dropped, {} forwarded, drop ratio {:.1}%",
                    report.admitted,
                    report.rtp,
                    report.dropped,
                    report.forwarded,
                    report.drop_ratio * 100.0
                );
                if verbose {
                    debug!("Tracked position: ({}, {})", x, y);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VideoStat;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Every sample drops 3 and forwards 1 more than the previous one
    struct RampSource {
        calls: AtomicU64,
    }

    impl SampleSource for RampSource {
        fn sample(&self) -> Result<StatsSample> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed);
            let mut video = VideoCounters::default();
            video.0[VideoStat::Dropped.index() as usize] = 3 * n;
            video.0[VideoStat::Forwarded.index() as usize] = n;
            Ok(StatsSample {
                video,
                ..Default::default()
            })
        }
    }

    struct BrokenSource;

    impl SampleSource for BrokenSource {
        fn sample(&self) -> Result<StatsSample> {
            anyhow::bail!("map gone")
        }
    }

    #[test]
    fn test_metadata_read_failure_yields_no_visits() {
        let read: std::result::Result<Vec<PacketMetadata>, String> =
            Err("map lookup failed".to_string());
        assert!(metadata_or_warn(read).is_empty());

        let meta = PacketMetadata {
            stage1_visits: 2,
            ..Default::default()
        };
        assert_eq!(metadata_or_warn::<String>(Ok(vec![meta])), vec![meta]);
    }

    #[tokio::test]
    async fn test_poll_once_records_sample() {
        let collector = Arc::new(Mutex::new(StatsCollector::new()));
        let poller = StatsPoller::new(
            RampSource {
                calls: AtomicU64::new(0),
            },
            Arc::clone(&collector),
            false,
        );

        poller.poll_once().await.unwrap();
        poller.poll_once().await.unwrap();

        let collector = collector.lock().await;
        assert_eq!(collector.sample_count(), 2);
        let snapshot = collector.generate_snapshot(1).unwrap();
        assert_eq!(snapshot.video["dropped"], 3);
        assert!((snapshot.drop_ratio - 0.75).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_spawned_poller_keeps_sampling() {
        let collector = Arc::new(Mutex::new(StatsCollector::new()));
        let poller = StatsPoller::new(
            RampSource {
                calls: AtomicU64::new(0),
            },
            Arc::clone(&collector),
            true,
        );

        let handle = poller.spawn(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();

        let collector = collector.lock().await;
        assert!(collector.sample_count() >= 2);
        assert!(collector.generate_snapshot(0).unwrap().peak_interval_drop_ratio > 0.7);
    }

    #[tokio::test]
    async fn test_failing_source_records_nothing() {
        let collector = Arc::new(Mutex::new(StatsCollector::new()));
        let poller = StatsPoller::new(BrokenSource, Arc::clone(&collector), false);

        assert!(poller.poll_once().await.is_err());
        let handle = poller.spawn(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();

        assert_eq!(collector.lock().await.sample_count(), 0);
    }
}
