use std::collections::BTreeMap;
use std::sync::Arc;

use umb_core::errors::{ErrorInfo, UmbError};
use umb_core::{
    ContextFactory, IntegratorSettings, Platform, RngHandle, SimulationContext, Vec3,
};
use umb_system::MolecularSystem;

use crate::forces::{self, V3};
use crate::integrator::LangevinMiddle;
use crate::minimizer::SteepestDescent;

/// Builds [`ReferenceContext`]s over one shared system.
#[derive(Debug, Clone)]
pub struct ReferenceEngine {
    system: Arc<MolecularSystem>,
    settings: IntegratorSettings,
    platform: Platform,
}

impl ReferenceEngine {
    /// Validates the integrator settings and wraps the system.
    pub fn new(
        system: Arc<MolecularSystem>,
        settings: IntegratorSettings,
        platform: Platform,
    ) -> Result<Self, UmbError> {
        settings.validate()?;
        Ok(Self {
            system,
            settings,
            platform,
        })
    }

    /// Shared system description.
    pub fn system(&self) -> &Arc<MolecularSystem> {
        &self.system
    }

    /// Platform every context is created for.
    pub fn platform(&self) -> Platform {
        self.platform
    }
}

impl ContextFactory for ReferenceEngine {
    type Context = ReferenceContext;

    fn create_context(&self) -> Result<Self::Context, UmbError> {
        log::debug!(
            "creating {} context for {} particles",
            self.platform.name(),
            self.system.num_particles()
        );
        Ok(ReferenceContext::new(
            Arc::clone(&self.system),
            &self.settings,
            self.platform,
        ))
    }
}

/// Mutable Langevin dynamics state over a [`MolecularSystem`].
#[derive(Debug, Clone)]
pub struct ReferenceContext {
    system: Arc<MolecularSystem>,
    platform: Platform,
    parameters: BTreeMap<String, f64>,
    masses: Vec<f64>,
    positions: Vec<V3>,
    velocities: Vec<V3>,
    forces: Vec<V3>,
    energy: f64,
    positions_set: bool,
    integrator: LangevinMiddle,
    minimizer: SteepestDescent,
    rng: RngHandle,
}

impl ReferenceContext {
    /// Creates a context with default parameters and all particles at the origin.
    pub fn new(system: Arc<MolecularSystem>, settings: &IntegratorSettings, platform: Platform) -> Self {
        let count = system.num_particles();
        Self {
            parameters: system.parameters.clone(),
            masses: system.particles.iter().map(|particle| particle.mass).collect(),
            positions: vec![V3::zeros(); count],
            velocities: vec![V3::zeros(); count],
            forces: vec![V3::zeros(); count],
            energy: 0.0,
            positions_set: false,
            integrator: LangevinMiddle::new(settings),
            minimizer: SteepestDescent::default(),
            rng: RngHandle::from_seed(0),
            system,
            platform,
        }
    }

    /// Current velocities in nm/ps.
    pub fn velocities(&self) -> Vec<Vec3> {
        self.velocities.iter().map(to_array).collect()
    }

    fn refresh(&mut self) {
        self.energy = forces::evaluate(
            &self.system,
            &self.parameters,
            &self.positions,
            &mut self.forces,
            self.platform,
        );
    }

    fn require_positions(&self, operation: &str) -> Result<(), UmbError> {
        if self.positions_set {
            return Ok(());
        }
        Err(UmbError::Engine(
            ErrorInfo::new("positions-unset", "positions must be set before driving the context")
                .with_context("operation", operation),
        ))
    }

    fn check_finite(&self, operation: &str) -> Result<(), UmbError> {
        let finite_positions = self
            .positions
            .iter()
            .all(|x| x.iter().all(|value| value.is_finite()));
        if self.energy.is_finite() && finite_positions {
            return Ok(());
        }
        Err(UmbError::Numerical(
            ErrorInfo::new("non-finite-state", "energy or positions became non-finite")
                .with_context("operation", operation)
                .with_context("energy", self.energy.to_string()),
        ))
    }
}

impl SimulationContext for ReferenceContext {
    fn num_particles(&self) -> usize {
        self.masses.len()
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<(), UmbError> {
        let slot = self.parameters.get_mut(name).ok_or_else(|| {
            UmbError::Config(
                ErrorInfo::new("unknown-parameter", "system does not declare this parameter")
                    .with_context("parameter", name),
            )
        })?;
        if !value.is_finite() {
            return Err(UmbError::Config(
                ErrorInfo::new("invalid-parameter", "parameter value must be finite")
                    .with_context("parameter", name)
                    .with_context("value", value.to_string()),
            ));
        }
        *slot = value;
        if self.positions_set {
            self.refresh();
        }
        Ok(())
    }

    fn parameter(&self, name: &str) -> Result<f64, UmbError> {
        self.parameters.get(name).copied().ok_or_else(|| {
            UmbError::Config(
                ErrorInfo::new("unknown-parameter", "system does not declare this parameter")
                    .with_context("parameter", name),
            )
        })
    }

    fn set_positions(&mut self, positions: &[Vec3]) -> Result<(), UmbError> {
        if positions.len() != self.num_particles() {
            return Err(UmbError::Engine(
                ErrorInfo::new("positions-shape", "position count does not match particle count")
                    .with_context("expected", self.num_particles().to_string())
                    .with_context("actual", positions.len().to_string()),
            ));
        }
        for (slot, position) in self.positions.iter_mut().zip(positions) {
            *slot = V3::from(*position);
        }
        self.velocities.iter_mut().for_each(|v| *v = V3::zeros());
        self.minimizer.reset();
        self.positions_set = true;
        self.refresh();
        self.check_finite("set_positions")
    }

    fn set_random_seed(&mut self, seed: u64) {
        self.rng.reseed(seed);
    }

    fn step(&mut self, steps: usize) -> Result<(), UmbError> {
        self.require_positions("step")?;
        for _ in 0..steps {
            self.integrator.advance(
                &mut self.positions,
                &mut self.velocities,
                &self.forces,
                &self.masses,
                &mut self.rng,
            );
            self.refresh();
            if !self.energy.is_finite() {
                break;
            }
        }
        self.check_finite("step")
    }

    fn minimize(&mut self, tolerance: f64, max_iterations: usize) -> Result<(), UmbError> {
        self.require_positions("minimize")?;
        let system = Arc::clone(&self.system);
        let parameters = &self.parameters;
        let platform = self.platform;
        let summary = self.minimizer.minimize(
            &mut self.positions,
            &mut self.forces,
            self.energy,
            tolerance,
            max_iterations,
            |positions, forces| forces::evaluate(&system, parameters, positions, forces, platform),
        );
        self.energy = summary.energy;
        log::trace!(
            "minimize: {} iterations, {} accepted, energy {:.4}, max force {:.4}",
            summary.iterations,
            summary.accepted,
            summary.energy,
            summary.max_force
        );
        self.check_finite("minimize")
    }

    fn potential_energy(&self) -> Result<f64, UmbError> {
        self.require_positions("potential_energy")?;
        Ok(self.energy)
    }

    fn positions(&self) -> Result<Vec<Vec3>, UmbError> {
        self.require_positions("positions")?;
        Ok(self.positions.iter().map(to_array).collect())
    }
}

fn to_array(v: &V3) -> Vec3 {
    [v.x, v.y, v.z]
}
