#![deny(missing_docs)]
#![doc = "Window enumeration, the per-window sampling state machine and the umbrella window scheduler."]

/// YAML configuration schema and defaults.
pub mod config;
/// Run manifest and per-window CSV summary.
pub mod manifest;
/// Minimize, equilibrate and produce for a single window.
pub mod sampler;
/// Sequential and partitioned execution of all windows.
pub mod scheduler;
/// Deterministic window enumeration.
pub mod windows;

pub use config::{
    AxisConfig, ExecutionConfig, OutputConfig, ProtocolConfig, RunConfig, SeedPolicy,
};
pub use manifest::{RunManifest, StateCounts, WindowRecord};
pub use sampler::{Phase, WindowReport, WindowSampler};
pub use scheduler::{
    CancelToken, LogObserver, RunObserver, RunOpts, RunOutcome, Scheduler, WindowOutcome,
    WindowState,
};
pub use windows::{
    enumerate_windows, partition, window_at, window_count, PlanTable, WindowIter, WindowPlan,
};
