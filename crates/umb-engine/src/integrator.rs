use rand_distr::{Distribution, StandardNormal};
use umb_core::{IntegratorSettings, RngHandle};

use crate::forces::V3;
use crate::BOLTZMANN;

/// Langevin "middle" splitting: kick, drift, thermostat, drift.
///
/// Forces must be current on entry; the caller recomputes them after each
/// step.
#[derive(Debug, Clone)]
pub struct LangevinMiddle {
    step_size: f64,
    damping: f64,
    noise: f64,
    kt: f64,
}

impl LangevinMiddle {
    /// Precomputes the thermostat coefficients.
    pub fn new(settings: &IntegratorSettings) -> Self {
        let damping = (-settings.friction * settings.step_size).exp();
        Self {
            step_size: settings.step_size,
            damping,
            noise: (1.0 - damping * damping).max(0.0).sqrt(),
            kt: BOLTZMANN * settings.temperature,
        }
    }

    /// Step size in ps.
    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    /// Kick and first half drift, followed by the velocity thermostat and the
    /// second half drift.
    pub fn advance(
        &self,
        positions: &mut [V3],
        velocities: &mut [V3],
        forces: &[V3],
        masses: &[f64],
        rng: &mut RngHandle,
    ) {
        let dt = self.step_size;
        for ((x, v), (f, &m)) in positions
            .iter_mut()
            .zip(velocities.iter_mut())
            .zip(forces.iter().zip(masses))
        {
            *v += f * (dt / m);
            *x += *v * (0.5 * dt);
            let sigma = (self.kt / m).sqrt();
            let xi = V3::new(
                StandardNormal.sample(rng),
                StandardNormal.sample(rng),
                StandardNormal.sample(rng),
            );
            *v = *v * self.damping + xi * (self.noise * sigma);
            *x += *v * (0.5 * dt);
        }
    }
}
