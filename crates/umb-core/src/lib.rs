#![deny(missing_docs)]
#![doc = "Core traits and data types shared by the umbrella window scheduler crates."]

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod errors;
pub mod provenance;
pub mod rng;
mod types;

pub use errors::{ErrorInfo, UmbError};
pub use provenance::{RunProvenance, SchemaVersion};
pub use rng::{derive_substream_seed, window_seed, RngHandle};
pub use types::{IntegratorSettings, OrderParameterAxis, Platform, Vec3, Window, WindowCoordinate};

/// Mutable simulation state driven by the window sampler.
///
/// A context is a single stateful physics engine instance. It is reused across
/// many bias settings and must never be shared between concurrently running
/// windows.
pub trait SimulationContext: Send {
    /// Number of particles in the underlying system.
    fn num_particles(&self) -> usize;

    /// Sets a named global parameter (bias centers, force constants).
    fn set_parameter(&mut self, name: &str, value: f64) -> Result<(), UmbError>;

    /// Returns the current value of a named global parameter.
    fn parameter(&self, name: &str) -> Result<f64, UmbError>;

    /// Replaces all particle positions.
    fn set_positions(&mut self, positions: &[Vec3]) -> Result<(), UmbError>;

    /// Reseeds the thermostat noise stream.
    fn set_random_seed(&mut self, seed: u64);

    /// Advances the integrator by `steps` time steps.
    fn step(&mut self, steps: usize) -> Result<(), UmbError>;

    /// Runs at most `max_iterations` iterations of local energy minimization.
    fn minimize(&mut self, tolerance: f64, max_iterations: usize) -> Result<(), UmbError>;

    /// Potential energy of the current configuration in kJ/mol.
    fn potential_energy(&self) -> Result<f64, UmbError>;

    /// Current particle positions.
    fn positions(&self) -> Result<Vec<Vec3>, UmbError>;
}

/// Builds independent simulation contexts over one immutable system.
pub trait ContextFactory: Sync {
    /// Concrete context type produced by the factory.
    type Context: SimulationContext;

    /// Creates a fresh context.
    fn create_context(&self) -> Result<Self::Context, UmbError>;
}

/// Location and size of a finalized trajectory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    /// Final path of the trajectory file.
    pub path: PathBuf,
    /// Number of frames stored.
    pub frames: usize,
}

/// Sink receiving the production frames of one window.
///
/// Dropping a writer without calling [`TrajectoryWriter::finish`] must release
/// the underlying resource and leave the output marked as incomplete.
pub trait TrajectoryWriter {
    /// Appends one frame of positions.
    fn write_frame(&mut self, positions: &[Vec3]) -> Result<(), UmbError>;

    /// Number of frames appended so far.
    fn frames_written(&self) -> usize;

    /// Flushes, closes and publishes the trajectory under its final name.
    fn finish(self) -> Result<TrajectoryRecord, UmbError>;
}

/// Per-window addressable trajectory storage.
pub trait TrajectoryStore: Sync {
    /// Writer type opened for each window.
    type Writer: TrajectoryWriter;

    /// Final location of the trajectory belonging to `window`.
    fn location(&self, window: &Window) -> PathBuf;

    /// Opens a fresh writer for `window`, replacing any previous partial output.
    fn create(&self, window: &Window) -> Result<Self::Writer, UmbError>;

    /// Frame count of an already finalized trajectory for `window`, if any.
    fn completed_frames(&self, window: &Window) -> Result<Option<usize>, UmbError>;
}
