//! Stats collection and aggregation
//!
//! Keeps the first and latest map samples plus per-interval deltas, and
//! turns them into an exportable snapshot.

use crate::types::*;

/// Aggregates periodic samples of the pipeline maps
#[derive(Default)]
pub struct StatsCollector {
    /// First sample, the baseline for session deltas
    baseline: Option<StatsSample>,
    /// Most recent sample
    latest: Option<StatsSample>,
    /// Highest per-interval drop ratio
    peak_drop_ratio: f64,
    /// Total number of samples recorded
    samples: u64,
}

impl StatsCollector {
    /// Create a new stats collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample and return the growth since the previous one
    ///
    /// The first sample only establishes the baseline and reports zeros.
    pub fn record(&mut self, sample: StatsSample) -> IntervalReport {
        let report = match &self.latest {
            Some(previous) => interval_between(previous, &sample),
            None => IntervalReport::default(),
        };

        if report.dropped + report.forwarded > 0 {
            self.peak_drop_ratio = self.peak_drop_ratio.max(report.drop_ratio);
        }
        if self.baseline.is_none() {
            self.baseline = Some(sample.clone());
        }
        self.latest = Some(sample);
        self.samples += 1;

        report
    }

    /// Get number of samples recorded
    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    /// Build the export snapshot
    ///
    /// # Arguments
    ///
    /// * `elapsed_secs` - Duration of collection period in seconds
    ///
    /// Returns `None` until at least one sample has been recorded.
    pub fn generate_snapshot(&self, elapsed_secs: u64) -> Option<StatsSnapshot> {
        let baseline = self.baseline.as_ref()?;
        let latest = self.latest.as_ref()?;

        let video = latest.video.since(&baseline.video);
        let (x, y) = latest.coordinates;

        Some(StatsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            duration_seconds: elapsed_secs,
            samples: self.samples,
            dispatcher: latest.dispatcher.since(&baseline.dispatcher),
            video: video.to_named(),
            video_totals: latest.video.to_named(),
            drop_ratio: video.drop_ratio(),
            peak_interval_drop_ratio: self.peak_drop_ratio,
            position: Position { x, y },
            cameras: CameraSummary::from_table(&latest.cameras),
            visits: VisitSummary::from_metadata(&latest.metadata),
        })
    }
}

fn interval_between(previous: &StatsSample, current: &StatsSample) -> IntervalReport {
    let video = current.video.since(&previous.video);
    IntervalReport {
        admitted: current.dispatcher.since(&previous.dispatcher).admitted,
        rtp: video.get(VideoStat::RtpPackets),
        dropped: video.get(VideoStat::Dropped),
        forwarded: video.get(VideoStat::Forwarded),
        drop_ratio: video.drop_ratio(),
    }
}
