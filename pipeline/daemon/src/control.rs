//! Runtime configuration of the pipeline
//!
//! Stage gating, interface roles and the global filter mode all live in
//! pinned maps. This module turns a partial `PipelineConfig` into slot
//! writes and reads the current state back.

use crate::registry::{read_all, Registry};
use anyhow::{bail, Context, Result};
use log::{debug, info};
use pipeline_common::{
    FilterMode, CONTROL_STAGE1_ENABLED, CONTROL_STAGE2_ENABLED, FLAG_ENABLED, IFACE_BRIDGE_MODE,
    IFACE_OUTPUT_IFINDEX, IFACE_PEER_IFINDEX, MAP_CONTROL, MAP_FILTERING_MODE, MAP_IFACE_CONFIG,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Requested configuration; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    pub stage1_enabled: Option<bool>,
    pub stage2_enabled: Option<bool>,
    pub peer_ifindex: Option<u32>,
    pub bridge_mode: Option<bool>,
    pub output_ifindex: Option<u32>,
    pub global_mode: Option<FilterMode>,
}

/// A single `map[index] = value` update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotWrite {
    pub map: &'static str,
    pub index: u32,
    pub value: u32,
}

fn flag(enabled: bool) -> u32 {
    if enabled {
        FLAG_ENABLED
    } else {
        0
    }
}

impl PipelineConfig {
    pub fn is_empty(&self) -> bool {
        *self == PipelineConfig::default()
    }

    /// Slot updates for every provided field
    pub fn writes(&self) -> Vec<SlotWrite> {
        let mut writes = Vec::new();
        let mut push = |map, index, value: Option<u32>| {
            if let Some(value) = value {
                writes.push(SlotWrite { map, index, value });
            }
        };

        push(MAP_CONTROL, CONTROL_STAGE1_ENABLED, self.stage1_enabled.map(flag));
        push(MAP_CONTROL, CONTROL_STAGE2_ENABLED, self.stage2_enabled.map(flag));
        push(MAP_IFACE_CONFIG, IFACE_PEER_IFINDEX, self.peer_ifindex);
        push(MAP_IFACE_CONFIG, IFACE_BRIDGE_MODE, self.bridge_mode.map(flag));
        push(MAP_IFACE_CONFIG, IFACE_OUTPUT_IFINDEX, self.output_ifindex);
        push(MAP_FILTERING_MODE, 0, self.global_mode.map(|m| m as u32));

        writes
    }

    /// Write the provided fields into the pinned maps
    pub fn apply(&self, registry: &Registry) -> Result<()> {
        let writes = self.writes();

        for map_name in [MAP_CONTROL, MAP_IFACE_CONFIG, MAP_FILTERING_MODE] {
            let mut pending = writes.iter().filter(|w| w.map == map_name).peekable();
            if pending.peek().is_none() {
                continue;
            }

            let mut map = registry.array::<u32>(map_name)?;
            for write in pending {
                map.set(write.index, write.value, 0).with_context(|| {
                    format!("Failed to write {}[{}]", write.map, write.index)
                })?;
                debug!("{}[{}] = {}", write.map, write.index, write.value);
            }
            info!("  ✓ Updated {}", map_name);
        }

        Ok(())
    }
}

/// Current configuration as stored in the maps
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatus {
    pub stage1_enabled: bool,
    pub stage2_enabled: bool,
    pub peer_ifindex: u32,
    pub bridge_mode: bool,
    pub output_ifindex: u32,
    pub global_mode: String,
}

impl PipelineStatus {
    pub fn read(registry: &Registry) -> Result<Self> {
        let control = read_all(&registry.array::<u32>(MAP_CONTROL)?)?;
        let iface = read_all(&registry.array::<u32>(MAP_IFACE_CONFIG)?)?;
        let global = registry
            .array::<u32>(MAP_FILTERING_MODE)?
            .get(&0, 0)
            .context("Failed to read filtering_mode[0]")?;
        Ok(Self::from_slots(&control, &iface, global))
    }

    /// Decode raw slot values; missing slots read as zero
    pub fn from_slots(control: &[u32], iface: &[u32], global_mode: u32) -> Self {
        let at = |slots: &[u32], i: u32| slots.get(i as usize).copied().unwrap_or(0);
        Self {
            stage1_enabled: at(control, CONTROL_STAGE1_ENABLED) == FLAG_ENABLED,
            stage2_enabled: at(control, CONTROL_STAGE2_ENABLED) == FLAG_ENABLED,
            peer_ifindex: at(iface, IFACE_PEER_IFINDEX),
            bridge_mode: at(iface, IFACE_BRIDGE_MODE) == FLAG_ENABLED,
            output_ifindex: at(iface, IFACE_OUTPUT_IFINDEX),
            global_mode: mode_label(global_mode),
        }
    }
}

/// Human-readable name of a raw mode value
pub fn mode_label(raw: u32) -> String {
    match FilterMode::try_from(raw) {
        Ok(FilterMode::Off) => "off".to_string(),
        Ok(FilterMode::DropP) => "drop-p".to_string(),
        Ok(FilterMode::ForwardP) => "forward-p".to_string(),
        // the filter treats these as off
        Err(other) => format!("unknown({})", other),
    }
}

pub fn parse_filter_mode(value: &str) -> Result<FilterMode> {
    match value.to_lowercase().as_str() {
        "off" | "0" => Ok(FilterMode::Off),
        "drop-p" | "drop_p" | "1" => Ok(FilterMode::DropP),
        "forward-p" | "forward_p" | "2" => Ok(FilterMode::ForwardP),
        _ => bail!(
            "Unsupported filter mode: {}. Use off, drop-p or forward-p",
            value
        ),
    }
}

/// Interface index from a number or an interface name
pub fn resolve_ifindex(value: &str) -> Result<u32> {
    resolve_ifindex_in(Path::new("/sys/class/net"), value)
}

fn resolve_ifindex_in(sysfs: &Path, value: &str) -> Result<u32> {
    if let Ok(index) = value.parse::<u32>() {
        return Ok(index);
    }

    let path = sysfs.join(value).join("ifindex");
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Unknown interface '{}' (no {:?})", value, path))?;
    raw.trim()
        .parse::<u32>()
        .with_context(|| format!("Malformed ifindex in {:?}", path))
}
