//! XDP Stage Pipeline - Control Plane
//!
//! Loads the XDP dispatcher, binds stage extensions to its slots,
//! configures the pipeline through its pinned maps and reports stats.
//!
//! ## Usage
//!
//! ```bash
//! # Attach the dispatcher and print its program id
//! sudo ./pipeline-ctl load --iface veth0 --object xdp-dispatcher
//!
//! # Bind the pass-through stage and the video filter
//! sudo ./pipeline-ctl attach-ext --object stage1-passthrough --prog-id 42 --func stage1
//! sudo ./pipeline-ctl attach-ext --object stage2-video-filter --prog-id 42 --func stage2
//!
//! # Enable both stages and route survivors to veth1
//! sudo ./pipeline-ctl config --stage1 on --stage2 on --output veth1
//!
//! # Move the tracked object and watch the filter for 60 seconds
//! sudo ./pipeline-ctl robot --duration 60 --loops 0 &
//! sudo ./pipeline-ctl stats --duration 60 --format prometheus --output stats.prom
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::info;
use pipeline_common::{POSITION_PORT, VIDEO_HOST_ADDR};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::{
    signal,
    sync::Mutex,
    time::{sleep, Instant},
};
use xdp_pipeline::{
    control::{parse_filter_mode, resolve_ifindex},
    exporter::ExporterType,
    loader::xdp_flags,
    simulator::{self, DirectWriter, PathConfig, PositionSink},
    attach_extension, DispatcherLoader, ExtensionRequest, PinnedStats, PipelineConfig,
    PipelineStatus, Registry, StatsCollector, StatsPoller, StatsSnapshot,
};

/// XDP stage pipeline control plane
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Pin registry directory
    #[clap(long, global = true, default_value = pipeline_common::PIN_ROOT)]
    pin_root: PathBuf,

    /// Verbose logging
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the dispatcher and attach it to an interface
    Load {
        /// Interface to attach to
        #[clap(short, long)]
        iface: String,

        /// Path to the dispatcher eBPF object
        #[clap(long)]
        object: PathBuf,

        /// XDP attach mode (skb, drv, hw)
        #[clap(short, long, default_value = "skb")]
        mode: String,

        /// Stay in the foreground and print in-kernel log records
        #[clap(short, long)]
        follow: bool,

        /// With --follow, exit after this many seconds (0 = until Ctrl-C)
        #[clap(short, long, default_value_t = 0)]
        duration: u64,
    },

    /// Bind a stage extension to a dispatcher slot
    AttachExt {
        /// Path to the extension eBPF object
        #[clap(long)]
        object: PathBuf,

        /// Program id of the loaded dispatcher
        #[clap(long)]
        prog_id: u32,

        /// Slot function to replace (stage1, stage2)
        #[clap(long)]
        func: String,

        /// Pin path of the extension (default: <pin-root>/<func>)
        #[clap(long)]
        pin_path: Option<PathBuf>,
    },

    /// Write pipeline settings; omitted settings are left unchanged
    Config {
        /// Stage 1 gate (on, off)
        #[clap(long, value_parser = parse_switch)]
        stage1: Option<bool>,

        /// Stage 2 gate (on, off)
        #[clap(long, value_parser = parse_switch)]
        stage2: Option<bool>,

        /// Bridge peer interface (name or ifindex)
        #[clap(long)]
        peer: Option<String>,

        /// Bridge mode (on, off)
        #[clap(long, value_parser = parse_switch)]
        bridge: Option<bool>,

        /// Output interface for packets leaving the pipeline (name or ifindex, 0 = none)
        #[clap(long)]
        output: Option<String>,

        /// Global filter mode used when a camera has no entry (off, drop-p, forward-p)
        #[clap(long)]
        mode: Option<String>,
    },

    /// Poll pipeline stats and export a snapshot
    Stats {
        /// Duration to collect (in seconds, 0 = infinite)
        #[clap(short, long, default_value_t = 60)]
        duration: u64,

        /// Output file for the snapshot
        #[clap(short, long, default_value = "pipeline-stats.json")]
        output: PathBuf,

        /// Output format (json, prometheus, influx)
        #[clap(short, long, default_value = "json")]
        format: String,

        /// Polling interval in seconds
        #[clap(long, default_value_t = 1)]
        interval: u64,
    },

    /// Move a simulated tracked object
    Robot {
        /// Position port address
        #[clap(long)]
        target: Option<SocketAddr>,

        /// Write camera modes straight into the maps instead of sending packets
        #[clap(long)]
        direct: bool,

        /// Circle center X
        #[clap(long, default_value_t = 500)]
        center_x: u32,

        /// Circle center Y
        #[clap(long, default_value_t = 500)]
        center_y: u32,

        /// Circle radius (0 = diagonal sweep)
        #[clap(long, default_value_t = 400)]
        radius: u32,

        /// Duration of one round in seconds
        #[clap(short, long, default_value_t = 60)]
        duration: u64,

        /// Position update frequency in Hz
        #[clap(long, default_value_t = 10)]
        update_hz: u32,

        /// Number of rounds (0 = infinite)
        #[clap(long, default_value_t = 1)]
        loops: u32,
    },

    /// Remove every pin from the registry
    Unload,
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "on" | "1" | "true" | "yes" => Ok(true),
        "off" | "0" | "false" | "no" => Ok(false),
        _ => Err(format!("expected on or off, got '{}'", value)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let registry = Registry::new(args.pin_root.clone());

    match args.command {
        Command::Load {
            iface,
            object,
            mode,
            follow,
            duration,
        } => {
            print_banner();
            let flags = xdp_flags(&mode)?;
            let mut loader = DispatcherLoader::load(&object, registry)?;
            if follow {
                loader.init_logger();
            }
            let prog_id = loader.attach(&iface, flags)?;
            info!("Dispatcher program id: {}", prog_id);
            println!("{}", prog_id);

            if follow {
                info!("Following in-kernel log records...");
                wait_for_shutdown(duration).await?;
            }
        }

        Command::AttachExt {
            object,
            prog_id,
            func,
            pin_path,
        } => {
            if func != "stage1" && func != "stage2" {
                bail!("Unsupported slot: {}. Use stage1 or stage2", func);
            }
            let pin_path = pin_path.unwrap_or_else(|| registry.path(&func));
            let request = ExtensionRequest {
                object,
                target_prog_id: prog_id,
                target_func: func,
                pin_path,
            };
            let attached = attach_extension(&request, &registry)?;
            info!(
                "Extension {} bound ({} new map(s) pinned)",
                attached.program,
                attached.pinned_maps.len()
            );
        }

        Command::Config {
            stage1,
            stage2,
            peer,
            bridge,
            output,
            mode,
        } => {
            let config = PipelineConfig {
                stage1_enabled: stage1,
                stage2_enabled: stage2,
                peer_ifindex: peer.as_deref().map(resolve_ifindex).transpose()?,
                bridge_mode: bridge,
                output_ifindex: output.as_deref().map(resolve_ifindex).transpose()?,
                global_mode: mode.as_deref().map(parse_filter_mode).transpose()?,
            };
            if config.is_empty() {
                info!("No settings given, showing current configuration");
            } else {
                config.apply(&registry)?;
            }

            let status = PipelineStatus::read(&registry)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }

        Command::Stats {
            duration,
            output,
            format,
            interval,
        } => {
            print_banner();
            let export_format = ExporterType::parse(&format)?;
            if interval == 0 {
                bail!("Polling interval must be >= 1 second");
            }

            info!("Collecting stats...");
            info!(
                "   Duration: {} seconds",
                if duration == 0 {
                    "infinite".to_string()
                } else {
                    duration.to_string()
                }
            );
            info!("   Output: {:?}", output);
            info!("   Format: {}", format);

            let collector = Arc::new(Mutex::new(StatsCollector::new()));
            let poller = StatsPoller::new(
                PinnedStats::open(&registry)?,
                Arc::clone(&collector),
                args.verbose,
            );
            let task = poller.spawn(Duration::from_secs(interval));

            let start_time = Instant::now();
            wait_for_shutdown(duration).await?;
            task.abort();
            poller.poll_once().await?;
            let elapsed = start_time.elapsed().as_secs();

            info!("Generating stats report...");
            let collector = collector.lock().await;
            let Some(snapshot) = collector.generate_snapshot(elapsed) else {
                bail!("No samples collected");
            };

            export_format.exporter(output.clone()).export(&snapshot)?;
            info!("Stats written to {:?}", output);

            print_summary(&snapshot);
        }

        Command::Robot {
            target,
            direct,
            center_x,
            center_y,
            radius,
            duration,
            update_hz,
            loops,
        } => {
            let path = PathConfig {
                center_x,
                center_y,
                radius,
                duration_secs: duration,
                update_hz,
            };

            let mut sink = if direct {
                info!("Writing camera modes directly into {:?}", registry.root());
                PositionSink::Direct(DirectWriter::open(&registry)?)
            } else {
                let target = target.unwrap_or_else(|| {
                    SocketAddr::from((VIDEO_HOST_ADDR, POSITION_PORT))
                });
                info!("Sending positions to {}", target);
                PositionSink::udp(target).await?
            };

            info!("Circular path: center=({}, {}), radius={}", center_x, center_y, radius);
            info!("Update rate: {} Hz, {} seconds/round", update_hz, duration);

            tokio::select! {
                result = simulator::run(path, loops, &mut sink) => {
                    let published = result?;
                    info!("Published {} positions", published);
                }
                _ = signal::ctrl_c() => {
                    info!("Interrupted, stopping robot...");
                }
            }
        }

        Command::Unload => {
            let removed = registry.clear()?;
            for name in &removed {
                info!("  ✓ Unpinned {}", name);
            }
            info!("Removed {} pin(s) from {:?}", removed.len(), registry.root());
        }
    }

    Ok(())
}

/// Block until the duration elapses (0 = forever) or Ctrl-C
async fn wait_for_shutdown(duration_secs: u64) -> Result<()> {
    if duration_secs > 0 {
        tokio::select! {
            _ = sleep(Duration::from_secs(duration_secs)) => {
                info!("Duration reached, shutting down...");
            }
            _ = signal::ctrl_c() => {
                info!("Interrupted, shutting down...");
            }
        }
    } else {
        signal::ctrl_c().await?;
        info!("Interrupted, shutting down...");
    }
    Ok(())
}

fn print_banner() {
    println!(
        r#"
╔═══════════════════════════════════════════════════╗
║          XDP Stage Pipeline - Video Filter        ║
║                  Control Plane                    ║
╚═══════════════════════════════════════════════════╝
    "#
    );
}

fn print_summary(snapshot: &StatsSnapshot) {
    let video = |name: &str| snapshot.video.get(name).copied().unwrap_or(0);

    info!("");
    info!("============================================");
    info!("             Summary Report");
    info!("============================================");
    info!("");
    info!("  Duration:           {} seconds", snapshot.duration_seconds);
    info!("  Samples:            {}", snapshot.samples);
    info!("");
    info!("  Dispatcher:");
    info!("    admitted:  {:>10}", snapshot.dispatcher.admitted);
    info!("    stage1:    {:>10}", snapshot.dispatcher.stage1);
    info!("    stage2:    {:>10}", snapshot.dispatcher.stage2);
    info!("    bridged:   {:>10}", snapshot.dispatcher.bridged);
    info!("    output:    {:>10}", snapshot.dispatcher.output_redirects);
    info!("");
    info!("  Video Filter:");
    info!("    rtp:       {:>10}", video("rtp_packets"));
    info!("    p_slices:  {:>10}", video("p_slices"));
    info!("    dropped:   {:>10}", video("dropped"));
    info!("    forwarded: {:>10}", video("forwarded"));
    info!("    positions: {:>10}", video("position_packets"));
    info!(
        "    drop ratio: {:>8.1}% (peak interval {:.1}%)",
        snapshot.drop_ratio * 100.0,
        snapshot.peak_interval_drop_ratio * 100.0
    );
    info!("");
    info!("  Tracking:");
    info!(
        "    position:  ({}, {})",
        snapshot.position.x, snapshot.position.y
    );
    info!("    unfiltered cameras: {:?}", snapshot.cameras.unfiltered);
    info!(
        "    max visits: stage1 {} / stage2 {}",
        snapshot.visits.max_stage1_visits, snapshot.visits.max_stage2_visits
    );
    info!("");
    info!("============================================");
}
