//! eBPF program loader
//!
//! Loads the XDP dispatcher onto an interface and binds stage extensions
//! to its `stage1`/`stage2` slots. Programs, links and maps are all pinned
//! in the registry so they outlive this process.

use crate::registry::Registry;
use anyhow::{bail, Context, Result};
use aya::{
    maps::Map,
    programs::{
        links::FdLink, loaded_programs, Extension, ProgramFd, Xdp, XdpFlags,
    },
    Bpf, BpfLoader,
};
use aya_log::BpfLogger;
use log::{info, warn};
use pipeline_common::DISPATCHER_PROGRAM;
use std::path::{Path, PathBuf};

/// Parse an XDP attach mode
pub fn xdp_flags(mode: &str) -> Result<XdpFlags> {
    match mode.to_lowercase().as_str() {
        "skb" | "generic" => Ok(XdpFlags::SKB_MODE),
        "drv" | "native" => Ok(XdpFlags::DRV_MODE),
        "hw" | "offload" => Ok(XdpFlags::HW_MODE),
        _ => bail!("Unsupported XDP mode: {}. Use skb, drv or hw", mode),
    }
}

fn open_object(object: &Path, registry: &Registry, extension: Option<&str>) -> Result<Bpf> {
    if !object.exists() {
        bail!("eBPF object file not found: {:?}", object);
    }
    registry.ensure()?;

    let mut loader = BpfLoader::new();
    loader.map_pin_path(registry.root());
    if let Some(func) = extension {
        loader.extension(func);
    }
    loader
        .load_file(object)
        .with_context(|| format!("Failed to load eBPF object {:?}", object))
}

/// Loaded XDP dispatcher
pub struct DispatcherLoader {
    bpf: Bpf,
    registry: Registry,
    // kept alive so records keep flowing
    _logger: Option<BpfLogger>,
}

impl DispatcherLoader {
    /// Load the dispatcher object, reusing maps already in the registry
    pub fn load(object: &Path, registry: Registry) -> Result<Self> {
        info!("Loading XDP dispatcher from {:?}...", object);
        let bpf = open_object(object, &registry, None)?;
        info!("eBPF object loaded successfully");

        Ok(Self {
            bpf,
            registry,
            _logger: None,
        })
    }

    /// Forward in-kernel log records to the `log` facade
    ///
    /// Non-fatal if it fails.
    pub fn init_logger(&mut self) {
        match BpfLogger::init(&mut self.bpf) {
            Ok(logger) => self._logger = Some(logger),
            Err(e) => warn!("  ⚠ Failed to initialize eBPF logger: {}", e),
        }
    }

    /// Load, pin and attach the dispatcher
    ///
    /// # Returns
    ///
    /// The kernel program id, which extensions need as their target.
    pub fn attach(&mut self, interface: &str, mode: XdpFlags) -> Result<u32> {
        let pin_path = self.registry.dispatcher_path();
        let link_path = Registry::link_path(&pin_path);

        let program: &mut Xdp = self
            .bpf
            .program_mut(DISPATCHER_PROGRAM)
            .with_context(|| format!("{} program not found in eBPF object", DISPATCHER_PROGRAM))?
            .try_into()
            .with_context(|| format!("Failed to get {} as XDP", DISPATCHER_PROGRAM))?;
        program
            .load()
            .with_context(|| format!("Failed to load {}", DISPATCHER_PROGRAM))?;
        program
            .pin(&pin_path)
            .with_context(|| format!("Failed to pin {} at {:?}", DISPATCHER_PROGRAM, pin_path))?;
        info!("  ✓ Pinned program at {:?}", pin_path);

        let link_id = program.attach(interface, mode).with_context(|| {
            format!(
                "Failed to attach XDP to interface '{}' - check permissions and interface exists",
                interface
            )
        })?;
        let link = program
            .take_link(link_id)
            .context("Failed to take dispatcher link")?;
        let link: FdLink = link
            .try_into()
            .context("XDP link is not fd-based (kernel too old to pin XDP links)")?;
        link.pin(&link_path)
            .with_context(|| format!("Failed to pin link at {:?}", link_path))?;
        info!("  ✓ Attached XDP to {}, link pinned at {:?}", interface, link_path);

        let prog_id = program
            .info()
            .context("Failed to query dispatcher program info")?
            .id();
        Ok(prog_id)
    }
}

/// What to bind and where
#[derive(Debug, Clone)]
pub struct ExtensionRequest {
    /// Extension object file
    pub object: PathBuf,
    /// Kernel id of the program whose function is replaced
    pub target_prog_id: u32,
    /// Function to replace (`stage1` or `stage2`)
    pub target_func: String,
    /// Where to pin the extension program; its link gets a `_link` suffix
    pub pin_path: PathBuf,
}

/// Outcome of a successful extension bind
#[derive(Debug, Clone)]
pub struct AttachedExtension {
    pub program: String,
    pub pin_path: PathBuf,
    pub link_path: PathBuf,
    /// Maps this call added to the registry
    pub pinned_maps: Vec<String>,
}

/// Replace `target_func` in a loaded program with the object's extension
///
/// Steps 1-6 abort on failure. Pinning leftover maps afterwards only warns.
pub fn attach_extension(request: &ExtensionRequest, registry: &Registry) -> Result<AttachedExtension> {
    info!(
        "Binding {:?} to {} of program {}...",
        request.object, request.target_func, request.target_prog_id
    );
    let link_path = Registry::link_path(&request.pin_path);

    let mut bpf = open_object(&request.object, registry, Some(&request.target_func))?;

    let program_name = {
        let mut programs = bpf.programs_mut();
        let (name, program) = programs
            .next()
            .with_context(|| format!("No program found in {:?}", request.object))?;
        if programs.next().is_some() {
            warn!("  ⚠ {:?} has more than one program, using {}", request.object, name);
        }
        let name = name.to_string();

        let extension: &mut Extension = program
            .try_into()
            .with_context(|| format!("Program {} is not an extension", name))?;

        let target = target_program_fd(request.target_prog_id)?;
        extension
            .load(target, &request.target_func)
            .with_context(|| {
                format!(
                    "Failed to load {} against {} of program {}",
                    name, request.target_func, request.target_prog_id
                )
            })?;
        extension
            .pin(&request.pin_path)
            .with_context(|| format!("Failed to pin {} at {:?}", name, request.pin_path))?;
        info!("  ✓ Pinned extension at {:?}", request.pin_path);

        let link_id = extension
            .attach()
            .with_context(|| format!("Failed to attach extension {}", name))?;
        let link: FdLink = extension
            .take_link(link_id)
            .context("Failed to take extension link")?
            .into();
        link.pin(&link_path)
            .with_context(|| format!("Failed to pin link at {:?}", link_path))?;
        info!("  ✓ Attached {} to {}, link pinned at {:?}", name, request.target_func, link_path);

        name
    };

    let pinned_maps = pin_new_maps(&mut bpf, registry);

    Ok(AttachedExtension {
        program: program_name,
        pin_path: request.pin_path.clone(),
        link_path,
        pinned_maps,
    })
}

/// Look up a loaded program by id and open an fd to it
fn target_program_fd(prog_id: u32) -> Result<ProgramFd> {
    for info in loaded_programs() {
        let info = info.context("Failed to enumerate loaded programs")?;
        if info.id() == prog_id {
            return info
                .fd()
                .with_context(|| format!("Failed to open program {}", prog_id));
        }
    }
    bail!("No loaded program with id {}", prog_id)
}

/// Maps that belong in the registry
///
/// Section maps (`.rodata`, `.bss`) and aya's log ring stay private.
fn should_pin(name: &str) -> bool {
    !name.starts_with('.') && !name.starts_with("AYA_")
}

/// Pin every registry-worthy map of `bpf` that is not pinned yet
fn pin_new_maps(bpf: &mut Bpf, registry: &Registry) -> Vec<String> {
    let mut pinned = Vec::new();

    for (name, map) in bpf.maps_mut() {
        if !should_pin(name) || registry.contains(name) {
            continue;
        }

        let path = registry.path(name);
        let data = match map {
            Map::Array(data)
            | Map::PerCpuArray(data)
            | Map::HashMap(data)
            | Map::PerCpuHashMap(data)
            | Map::LruHashMap(data) => data,
            _ => {
                warn!("  ⚠ Map {} has a type that is not pinned", name);
                continue;
            }
        };

        match data.pin(&path) {
            Ok(()) => {
                info!("  ✓ Pinned map {} at {:?}", name, path);
                pinned.push(name.to_string());
            }
            Err(e) => warn!("  ⚠ Failed to pin map {} at {:?}: {}", name, path, e),
        }
    }

    pinned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xdp_flags() {
        assert_eq!(xdp_flags("skb").unwrap().bits(), XdpFlags::SKB_MODE.bits());
        assert_eq!(xdp_flags("DRV").unwrap().bits(), XdpFlags::DRV_MODE.bits());
        assert_eq!(xdp_flags("offload").unwrap().bits(), XdpFlags::HW_MODE.bits());
        assert!(xdp_flags("tc").is_err());
    }

    #[test]
    fn test_should_pin() {
        assert!(should_pin("video_stats"));
        assert!(should_pin("camera_filtering_mode"));
        assert!(!should_pin(".rodata"));
        assert!(!should_pin("AYA_LOGS"));
    }

    #[test]
    fn test_missing_object_is_rejected() {
        let registry = Registry::new(std::env::temp_dir().join("pipeline-loader-test"));
        let request = ExtensionRequest {
            object: PathBuf::from("/nonexistent/stage2-video-filter"),
            target_prog_id: 1,
            target_func: "stage2".to_string(),
            pin_path: registry.path("stage2"),
        };

        let err = attach_extension(&request, &registry).unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert!(DispatcherLoader::load(&request.object, registry).is_err());
    }
}
