//! Pin registry access
//!
//! Every map, program and link of the pipeline lives under one bpffs
//! directory. Maps are reopened here by name so the control plane can run
//! in a different process from the loader.

use anyhow::{Context, Result};
use aya::{
    maps::{Array, Map, MapData, PerCpuArray},
    Pod,
};
use pipeline_common::{DISPATCHER_PROGRAM, LINK_PIN_SUFFIX, PIN_ROOT};
use std::path::{Path, PathBuf};

/// Filesystem-backed registry of pinned objects
#[derive(Debug, Clone)]
pub struct Registry {
    root: PathBuf,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(PIN_ROOT)
    }
}

impl Registry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pin path of the object called `name`
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Pin path of the link belonging to the program pinned at `program`
    pub fn link_path(program: &Path) -> PathBuf {
        let mut raw = program.as_os_str().to_os_string();
        raw.push(LINK_PIN_SUFFIX);
        PathBuf::from(raw)
    }

    pub fn dispatcher_path(&self) -> PathBuf {
        self.path(DISPATCHER_PROGRAM)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    /// Create the registry directory if it is missing
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create pin registry {:?}", self.root))
    }

    /// Remove every pin in the registry
    ///
    /// Dropping the link pins detaches the programs once no process holds
    /// them open.
    pub fn clear(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list pin registry {:?}", self.root))?;
        for entry in entries {
            let entry = entry.context("Failed to read registry entry")?;
            let path = entry.path();
            std::fs::remove_file(&path).with_context(|| format!("Failed to unpin {:?}", path))?;
            removed.push(entry.file_name().to_string_lossy().into_owned());
        }
        removed.sort();
        Ok(removed)
    }

    fn open(&self, name: &str) -> Result<MapData> {
        let path = self.path(name);
        MapData::from_pin(&path).with_context(|| {
            format!(
                "Failed to open pinned map {:?} - is the pipeline loaded?",
                path
            )
        })
    }

    /// Reopen a pinned `Array` map
    pub fn array<V: Pod>(&self, name: &str) -> Result<Array<MapData, V>> {
        let data = self.open(name)?;
        Array::try_from(Map::Array(data))
            .with_context(|| format!("Pinned map {} is not an array of the expected value size", name))
    }

    /// Reopen a pinned `PerCpuArray` map
    pub fn per_cpu_array<V: Pod>(&self, name: &str) -> Result<PerCpuArray<MapData, V>> {
        let data = self.open(name)?;
        PerCpuArray::try_from(Map::PerCpuArray(data)).with_context(|| {
            format!(
                "Pinned map {} is not a per-CPU array of the expected value size",
                name
            )
        })
    }
}

/// Read every slot of an array map in index order
pub fn read_all<V: Pod>(map: &Array<MapData, V>) -> Result<Vec<V>> {
    (0..map.len())
        .map(|index| {
            map.get(&index, 0)
                .with_context(|| format!("Failed to read slot {}", index))
        })
        .collect()
}
