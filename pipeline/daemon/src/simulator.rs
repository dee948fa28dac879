//! Tracked-object simulator
//!
//! Drives the camera table by moving a virtual robot along a path. Positions
//! are either sent as coordinate packets to the filter's position port, or
//! written straight into the pinned maps.

use crate::registry::Registry;
use anyhow::{bail, Context, Result};
use aya::maps::{Array, MapData};
use bytes::{BufMut, BytesMut};
use log::{debug, info};
use pipeline_common::{
    camera::camera_mode_for, packet::CoordinateRecord, COORD_MAX, COORD_SLOT_X, COORD_SLOT_Y,
    MAP_CAMERA_FILTERING_MODE, MAP_COORDS_DEBUG, UPDATED_CAMERAS,
};
use std::{f64::consts::PI, net::SocketAddr, time::Duration};
use tokio::{net::UdpSocket, time::interval};

/// Path the robot follows during one round
#[derive(Debug, Clone, Copy)]
pub struct PathConfig {
    pub center_x: u32,
    pub center_y: u32,
    /// 0 selects a diagonal sweep from (10, 10) to (990, 990) and back
    pub radius: u32,
    pub duration_secs: u64,
    pub update_hz: u32,
}

impl PathConfig {
    pub fn updates_per_round(&self) -> u64 {
        self.duration_secs * u64::from(self.update_hz)
    }

    /// Positions of one round, clamped to the valid coordinate range
    pub fn positions(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let total = self.updates_per_round();
        (0..total).map(move |i| {
            let t = i as f64 / total as f64;
            let (x, y) = if self.radius == 0 {
                let progress = if t < 0.5 { t * 2.0 } else { 2.0 - t * 2.0 };
                let v = 10.0 + progress * 980.0;
                (v, v)
            } else {
                let angle = 2.0 * PI * t;
                let r = f64::from(self.radius);
                (
                    f64::from(self.center_x) + r * angle.cos(),
                    f64::from(self.center_y) + r * angle.sin(),
                )
            };
            (clamp(x), clamp(y))
        })
    }
}

fn clamp(v: f64) -> u32 {
    // truncates toward zero like the coordinate feed
    (v as i64).clamp(0, i64::from(COORD_MAX - 1)) as u32
}

/// Encode a coordinate record as it goes on the wire
pub fn encode_position(x: u32, y: u32) -> BytesMut {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u32(x);
    buf.put_u32(y);
    debug_assert_eq!(&buf[..], &CoordinateRecord::new(x, y).to_bytes()[..]);
    buf
}

/// Where positions go
pub enum PositionSink {
    /// Coordinate packets to the position port
    Udp { socket: UdpSocket, target: SocketAddr },
    /// Direct writes into the camera table
    Direct(DirectWriter),
}

impl PositionSink {
    pub async fn udp(target: SocketAddr) -> Result<Self> {
        let bind: SocketAddr = if target.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        }
        .parse()
        .context("Invalid bind address")?;
        let socket = UdpSocket::bind(bind)
            .await
            .context("Failed to bind UDP socket")?;
        Ok(PositionSink::Udp { socket, target })
    }

    async fn publish(&mut self, x: u32, y: u32) -> Result<()> {
        match self {
            PositionSink::Udp { socket, target } => {
                let payload = encode_position(x, y);
                socket
                    .send_to(&payload, *target)
                    .await
                    .with_context(|| format!("Failed to send position to {}", target))?;
            }
            PositionSink::Direct(writer) => writer.write(x, y)?,
        }
        Ok(())
    }
}

/// Writes camera modes from userspace, bypassing the position port
pub struct DirectWriter {
    cameras: Array<MapData, u32>,
    coords: Array<MapData, u32>,
}

impl DirectWriter {
    pub fn open(registry: &Registry) -> Result<Self> {
        Ok(Self {
            cameras: registry.array(MAP_CAMERA_FILTERING_MODE)?,
            coords: registry.array(MAP_COORDS_DEBUG)?,
        })
    }

    fn write(&mut self, x: u32, y: u32) -> Result<()> {
        for (camera_id, mode) in camera_modes(x, y) {
            self.cameras
                .set(camera_id, mode, 0)
                .with_context(|| format!("Failed to write camera {}", camera_id))?;
        }
        self.coords
            .set(COORD_SLOT_X, x, 0)
            .context("Failed to write x coordinate")?;
        self.coords
            .set(COORD_SLOT_Y, y, 0)
            .context("Failed to write y coordinate")?;
        Ok(())
    }
}

/// Raw mode of every updated camera for an object at `(x, y)`
pub fn camera_modes(x: u32, y: u32) -> impl Iterator<Item = (u32, u32)> {
    (0..UPDATED_CAMERAS).map(move |id| (id, camera_mode_for(id, x, y) as u32))
}

/// Run the robot for `loops` rounds (0 = until cancelled)
///
/// Returns the number of positions published.
pub async fn run(path: PathConfig, loops: u32, sink: &mut PositionSink) -> Result<u64> {
    if path.update_hz == 0 {
        bail!("Update rate must be >= 1 Hz");
    }
    if path.updates_per_round() == 0 {
        bail!("Round duration must be >= 1 second");
    }

    let mut ticker = interval(Duration::from_secs_f64(1.0 / f64::from(path.update_hz)));
    let mut published = 0u64;
    let mut round = 0u32;

    loop {
        round += 1;
        info!("Starting round {}...", round);

        for (x, y) in path.positions() {
            ticker.tick().await;
            sink.publish(x, y).await?;
            debug!("  Position: ({:4}, {:4})", x, y);
            published += 1;
        }

        info!("  ✓ Round {} complete", round);
        if loops > 0 && round >= loops {
            break;
        }
    }

    Ok(published)
}
