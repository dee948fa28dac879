//! XDP Pipeline Control Plane Library
//!
//! Provides reusable components for loading the dispatcher, binding stage
//! extensions, configuring the pipeline and collecting its stats.

pub mod collector;
pub mod control;
pub mod exporter;
pub mod loader;
pub mod poller;
pub mod registry;
pub mod simulator;
pub mod types;

pub use collector::StatsCollector;
pub use control::{PipelineConfig, PipelineStatus};
pub use exporter::{ExporterType, JsonExporter, MetricsExporter};
pub use loader::{attach_extension, DispatcherLoader, ExtensionRequest};
pub use poller::{PinnedStats, StatsPoller};
pub use registry::Registry;
pub use types::*;
