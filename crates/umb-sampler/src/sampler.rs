use serde::{Deserialize, Serialize};
use umb_core::errors::{ErrorInfo, UmbError};
use umb_core::{
    window_seed, SimulationContext, TrajectoryRecord, TrajectoryStore, TrajectoryWriter, Vec3,
    Window,
};

use crate::config::ProtocolConfig;

/// Phases every window passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Bias centers set, positions reset.
    Idle,
    /// Repeated local minimization.
    Minimizing,
    /// Unsampled dynamics.
    Equilibrating,
    /// Sampled dynamics streaming frames.
    Producing,
    /// Trajectory finalized.
    Done,
}

impl Phase {
    /// Lower-case phase label.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Minimizing => "minimizing",
            Phase::Equilibrating => "equilibrating",
            Phase::Producing => "producing",
            Phase::Done => "done",
        }
    }
}

/// Result of sampling one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowReport {
    /// Window sampled.
    pub window: Window,
    /// Phases visited, in order.
    pub phases: Vec<Phase>,
    /// Potential energy after the last minimizer call.
    pub minimized_energy: f64,
    /// Potential energy after the last production frame.
    pub final_energy: f64,
    /// Finalized trajectory.
    pub trajectory: TrajectoryRecord,
}

/// Runs minimize, equilibrate and produce for one window on a borrowed context.
#[derive(Debug, Clone, Copy)]
pub struct WindowSampler<'a> {
    protocol: &'a ProtocolConfig,
    reference: &'a [Vec3],
    master_seed: u64,
}

impl<'a> WindowSampler<'a> {
    /// `reference` is the pose every window starts from.
    pub fn new(protocol: &'a ProtocolConfig, reference: &'a [Vec3], master_seed: u64) -> Self {
        Self {
            protocol,
            reference,
            master_seed,
        }
    }

    /// Samples `window`, streaming production frames into `store`.
    ///
    /// On failure the writer (if opened) is dropped, leaving a partial file.
    pub fn sample<C, S>(
        &self,
        context: &mut C,
        store: &S,
        window: &Window,
    ) -> Result<WindowReport, UmbError>
    where
        C: SimulationContext,
        S: TrajectoryStore,
    {
        let mut phases = vec![Phase::Idle];
        let annotate = move |phase: Phase| move |err: UmbError| window_error(err, window, phase);

        for coord in &window.coordinates {
            context
                .set_parameter(&coord.axis, coord.center)
                .map_err(annotate(Phase::Idle))?;
        }
        context
            .set_positions(self.reference)
            .map_err(annotate(Phase::Idle))?;
        context.set_random_seed(window_seed(self.master_seed, window.linear_index));

        phases.push(Phase::Minimizing);
        log::debug!("{window}: minimizing");
        let minimization_energy = |context: &C, calls: usize| -> Result<f64, UmbError> {
            let energy = context
                .potential_energy()
                .map_err(annotate(Phase::Minimizing))?;
            if !energy.is_finite() {
                return Err(window_error(
                    non_finite("non-finite-energy", "potential energy is not finite")
                        .with_context("minimize_calls_done", calls.to_string()),
                    window,
                    Phase::Minimizing,
                ));
            }
            Ok(energy)
        };
        let mut minimized_energy = minimization_energy(&*context, 0)?;
        for call in 0..self.protocol.minimize_calls {
            context
                .minimize(self.protocol.minimize_tolerance, self.protocol.minimize_iterations)
                .map_err(annotate(Phase::Minimizing))?;
            minimized_energy = minimization_energy(&*context, call + 1)?;
        }

        phases.push(Phase::Equilibrating);
        log::debug!("{window}: equilibrating for {} steps", self.protocol.equilibration_steps);
        context
            .step(self.protocol.equilibration_steps)
            .map_err(annotate(Phase::Equilibrating))?;

        phases.push(Phase::Producing);
        log::debug!("{window}: producing {} frames", self.protocol.production_samples);
        let mut writer = store.create(window).map_err(annotate(Phase::Producing))?;
        for sample in 0..self.protocol.production_samples {
            context
                .step(self.protocol.steps_per_sample)
                .map_err(annotate(Phase::Producing))?;
            let positions = context.positions().map_err(annotate(Phase::Producing))?;
            if positions.iter().flatten().any(|value| !value.is_finite()) {
                return Err(window_error(
                    non_finite("non-finite-positions", "positions are not finite")
                        .with_context("sample", sample.to_string()),
                    window,
                    Phase::Producing,
                ));
            }
            writer
                .write_frame(&positions)
                .map_err(annotate(Phase::Producing))?;
        }
        let final_energy = context
            .potential_energy()
            .map_err(annotate(Phase::Producing))?;
        if !final_energy.is_finite() {
            return Err(window_error(
                non_finite("non-finite-energy", "potential energy is not finite"),
                window,
                Phase::Producing,
            ));
        }

        let trajectory = writer.finish().map_err(annotate(Phase::Done))?;
        phases.push(Phase::Done);
        Ok(WindowReport {
            window: window.clone(),
            phases,
            minimized_energy,
            final_energy,
            trajectory,
        })
    }
}

fn non_finite(code: &str, message: &str) -> UmbError {
    UmbError::Numerical(ErrorInfo::new(code, message))
}

/// Attaches window identity and phase to an error.
pub(crate) fn window_error(err: UmbError, window: &Window, phase: Phase) -> UmbError {
    let centers = window
        .centers()
        .iter()
        .map(|center| format!("{center:.6}"))
        .collect::<Vec<_>>()
        .join(",");
    err.with_context("window", window.to_string())
        .with_context("centers", centers)
        .with_context("phase", phase.label())
}
