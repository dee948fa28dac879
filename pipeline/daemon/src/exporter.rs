//! Stats exporters
//!
//! Provides different exporters for stats snapshots (JSON, Prometheus, etc.)

use crate::types::StatsSnapshot;
use anyhow::{bail, Context, Result};
use std::{fs::File, io::Write, path::PathBuf};

/// Trait for stats exporters
pub trait MetricsExporter {
    /// Export a snapshot
    ///
    /// # Arguments
    ///
    /// * `snapshot` - Aggregated stats to export
    fn export(&self, snapshot: &StatsSnapshot) -> Result<()>;
}

/// Export format type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExporterType {
    /// JSON format
    Json,
    /// Prometheus format
    Prometheus,
    /// InfluxDB line protocol
    Influx,
}

impl ExporterType {
    pub fn parse(format: &str) -> Result<Self> {
        match format.to_lowercase().as_str() {
            "json" => Ok(ExporterType::Json),
            "prometheus" | "prom" => Ok(ExporterType::Prometheus),
            "influx" | "influxdb" => Ok(ExporterType::Influx),
            _ => bail!(
                "Unsupported format: {}. Use json, prometheus, or influx",
                format
            ),
        }
    }

    /// Build the exporter writing to `output`
    pub fn exporter(self, output: PathBuf) -> Box<dyn MetricsExporter> {
        match self {
            ExporterType::Json => Box::new(JsonExporter::new(output, true)),
            ExporterType::Prometheus => Box::new(PrometheusExporter::new(output)),
            ExporterType::Influx => {
                Box::new(InfluxExporter::new(output, "xdp_pipeline".to_string()))
            }
        }
    }
}

fn write_output(path: &PathBuf, data: &str) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create output file: {:?}", path))?;

    file.write_all(data.as_bytes())
        .with_context(|| format!("Failed to write to output file: {:?}", path))?;

    Ok(())
}

/// JSON exporter
pub struct JsonExporter {
    output_path: PathBuf,
    pretty: bool,
}

impl JsonExporter {
    /// Create a new JSON exporter
    ///
    /// # Arguments
    ///
    /// * `output_path` - Path to output file
    /// * `pretty` - Enable pretty-printing
    pub fn new(output_path: PathBuf, pretty: bool) -> Self {
        Self {
            output_path,
            pretty,
        }
    }
}

impl MetricsExporter for JsonExporter {
    fn export(&self, snapshot: &StatsSnapshot) -> Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(snapshot)?
        } else {
            serde_json::to_string(snapshot)?
        };

        write_output(&self.output_path, &json)
    }
}

/// Prometheus exporter
pub struct PrometheusExporter {
    output_path: PathBuf,
}

impl PrometheusExporter {
    /// Create a new Prometheus exporter
    ///
    /// # Arguments
    ///
    /// * `output_path` - Path to output file
    pub fn new(output_path: PathBuf) -> Self {
        Self { output_path }
    }

    fn metric(output: &mut String, name: &str, kind: &str, help: &str) {
        output.push_str(&format!("# HELP xdp_pipeline_{} {}\n", name, help));
        output.push_str(&format!("# TYPE xdp_pipeline_{} {}\n", name, kind));
    }

    /// Convert a snapshot to Prometheus format
    fn to_prometheus_format(snapshot: &StatsSnapshot) -> String {
        let mut output = String::new();

        Self::metric(&mut output, "duration_seconds", "gauge", "Duration of collection period");
        output.push_str(&format!("xdp_pipeline_duration_seconds {}\n", snapshot.duration_seconds));
        output.push('\n');

        // Dispatcher
        Self::metric(&mut output, "dispatcher_packets", "counter", "Dispatcher counters over the collection period");
        let d = &snapshot.dispatcher;
        for (counter, value) in [
            ("admitted", d.admitted),
            ("stage1", d.stage1),
            ("stage2", d.stage2),
            ("bridged", d.bridged),
            ("output_redirects", d.output_redirects),
        ] {
            output.push_str(&format!(
                "xdp_pipeline_dispatcher_packets{{counter=\"{}\"}} {}\n",
                counter, value
            ));
        }
        output.push('\n');

        // Video filter
        Self::metric(&mut output, "video_packets", "counter", "Video filter counters over the collection period");
        for (stat, value) in &snapshot.video {
            output.push_str(&format!(
                "xdp_pipeline_video_packets{{stat=\"{}\"}} {}\n",
                stat, value
            ));
        }
        output.push('\n');

        Self::metric(&mut output, "drop_ratio", "gauge", "Dropped share of classified video packets");
        output.push_str(&format!("xdp_pipeline_drop_ratio {}\n", snapshot.drop_ratio));
        output.push_str(&format!(
            "xdp_pipeline_drop_ratio{{window=\"peak_interval\"}} {}\n",
            snapshot.peak_interval_drop_ratio
        ));
        output.push('\n');

        // Tracking
        Self::metric(&mut output, "position", "gauge", "Last tracked object coordinate");
        output.push_str(&format!("xdp_pipeline_position{{axis=\"x\"}} {}\n", snapshot.position.x));
        output.push_str(&format!("xdp_pipeline_position{{axis=\"y\"}} {}\n", snapshot.position.y));
        output.push('\n');

        Self::metric(&mut output, "cameras_filtering", "gauge", "Cameras with P-slice filtering");
        output.push_str(&format!("xdp_pipeline_cameras_filtering {}\n", snapshot.cameras.filtering));
        output.push('\n');

        output
    }
}

impl MetricsExporter for PrometheusExporter {
    fn export(&self, snapshot: &StatsSnapshot) -> Result<()> {
        write_output(&self.output_path, &Self::to_prometheus_format(snapshot))
    }
}

/// InfluxDB line protocol exporter
pub struct InfluxExporter {
    output_path: PathBuf,
    measurement: String,
}

impl InfluxExporter {
    /// Create a new InfluxDB exporter
    ///
    /// # Arguments
    ///
    /// * `output_path` - Path to output file
    /// * `measurement` - Measurement name for InfluxDB
    pub fn new(output_path: PathBuf, measurement: String) -> Self {
        Self {
            output_path,
            measurement,
        }
    }

    /// Convert a snapshot to InfluxDB line protocol
    fn to_influx_format(snapshot: &StatsSnapshot, measurement: &str) -> String {
        let mut output = String::new();
        let timestamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);

        output.push_str(&format!(
            "{},type=summary duration_seconds={}i,samples={}i,drop_ratio={},peak_interval_drop_ratio={} {}\n",
            measurement,
            snapshot.duration_seconds,
            snapshot.samples,
            snapshot.drop_ratio,
            snapshot.peak_interval_drop_ratio,
            timestamp
        ));

        let d = &snapshot.dispatcher;
        output.push_str(&format!(
            "{},type=dispatcher admitted={}i,stage1={}i,stage2={}i,bridged={}i,output_redirects={}i {}\n",
            measurement, d.admitted, d.stage1, d.stage2, d.bridged, d.output_redirects, timestamp
        ));

        let fields = snapshot
            .video
            .iter()
            .map(|(stat, value)| format!("{}={}i", stat, value))
            .collect::<Vec<_>>()
            .join(",");
        output.push_str(&format!(
            "{},type=video {} {}\n",
            measurement, fields, timestamp
        ));

        output.push_str(&format!(
            "{},type=tracking x={}i,y={}i,cameras_filtering={}i {}\n",
            measurement,
            snapshot.position.x,
            snapshot.position.y,
            snapshot.cameras.filtering,
            timestamp
        ));

        output
    }
}

impl MetricsExporter for InfluxExporter {
    fn export(&self, snapshot: &StatsSnapshot) -> Result<()> {
        write_output(
            &self.output_path,
            &Self::to_influx_format(snapshot, &self.measurement),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    fn create_test_snapshot() -> StatsSnapshot {
        let mut video = VideoCounters::default();
        video.0[VideoStat::Dropped.index() as usize] = 300;
        video.0[VideoStat::Forwarded.index() as usize] = 700;

        StatsSnapshot {
            timestamp: "2025-01-01T00:00:00Z".to_string(),
            duration_seconds: 60,
            samples: 61,
            dispatcher: DispatcherCounters {
                admitted: 1000,
                stage1: 1000,
                stage2: 1000,
                bridged: 0,
                output_redirects: 700,
            },
            video: video.to_named(),
            video_totals: video.to_named(),
            drop_ratio: video.drop_ratio(),
            peak_interval_drop_ratio: 0.5,
            position: Position { x: 500, y: 900 },
            cameras: CameraSummary {
                unfiltered: vec![45, 75],
                filtering: 98,
            },
            visits: VisitSummary::default(),
        }
    }

    #[test]
    fn test_prometheus_format() {
        let snapshot = create_test_snapshot();
        let prometheus = PrometheusExporter::to_prometheus_format(&snapshot);

        assert!(prometheus.contains("xdp_pipeline_duration_seconds 60"));
        assert!(prometheus.contains("xdp_pipeline_dispatcher_packets{counter=\"admitted\"} 1000"));
        assert!(prometheus.contains(
            "xdp_pipeline_dispatcher_packets{counter=\"output_redirects\"} 700"
        ));
        assert!(prometheus.contains("xdp_pipeline_video_packets{stat=\"dropped\"} 300"));
        assert!(prometheus.contains("xdp_pipeline_drop_ratio 0.3"));
        assert!(prometheus.contains("xdp_pipeline_position{axis=\"y\"} 900"));
    }

    #[test]
    fn test_influx_format() {
        let snapshot = create_test_snapshot();
        let influx = InfluxExporter::to_influx_format(&snapshot, "pipeline");

        assert!(influx.contains("pipeline,type=summary"));
        assert!(influx.contains("samples=61i"));
        assert!(influx.contains("admitted=1000i"));
        assert!(influx.contains("output_redirects=700i"));
        assert!(influx.contains("dropped=300i"));
        assert!(influx.contains("cameras_filtering=98i"));
    }

    #[test]
    fn test_json_export_roundtrips_through_file() {
        let snapshot = create_test_snapshot();
        let path = std::env::temp_dir().join(format!("pipeline-stats-{}.json", std::process::id()));

        ExporterType::Json.exporter(path.clone()).export(&snapshot).unwrap();

        let parsed: StatsSnapshot =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.video["forwarded"], 700);
        assert_eq!(parsed.cameras.unfiltered, vec![45, 75]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(ExporterType::parse("PROM").unwrap(), ExporterType::Prometheus);
        assert_eq!(ExporterType::parse("influxdb").unwrap(), ExporterType::Influx);
        assert!(ExporterType::parse("csv").is_err());
    }
}
