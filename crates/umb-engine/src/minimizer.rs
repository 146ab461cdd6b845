use crate::forces::V3;

const INITIAL_STEP_NM: f64 = 0.01;
const GROW: f64 = 1.2;
const SHRINK: f64 = 0.2;
const MIN_STEP_NM: f64 = 1e-10;

/// Adaptive steepest descent with a step length carried across calls.
///
/// Trial moves displace every atom along its force, scaled so that the atom
/// under the largest force moves by the current step length. A trial is kept
/// only when it lowers the energy, so the energy never increases.
#[derive(Debug, Clone)]
pub struct SteepestDescent {
    step: f64,
}

impl Default for SteepestDescent {
    fn default() -> Self {
        Self {
            step: INITIAL_STEP_NM,
        }
    }
}

/// Outcome of one minimization call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimizeSummary {
    /// Iterations actually performed.
    pub iterations: usize,
    /// Accepted trial moves.
    pub accepted: usize,
    /// Energy at exit in kJ/mol.
    pub energy: f64,
    /// Largest force magnitude at exit in kJ/mol/nm.
    pub max_force: f64,
}

impl SteepestDescent {
    /// Restores the initial step length.
    pub fn reset(&mut self) {
        self.step = INITIAL_STEP_NM;
    }

    /// Current step length in nm.
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Runs at most `max_iterations` iterations.
    ///
    /// `evaluate` fills the force buffer for the given positions and returns
    /// the energy. `positions` and `forces` hold the accepted state on return.
    pub fn minimize<F>(
        &mut self,
        positions: &mut Vec<V3>,
        forces: &mut Vec<V3>,
        mut energy: f64,
        tolerance: f64,
        max_iterations: usize,
        mut evaluate: F,
    ) -> MinimizeSummary
    where
        F: FnMut(&[V3], &mut [V3]) -> f64,
    {
        let mut trial = positions.clone();
        let mut trial_forces = forces.clone();
        let mut accepted = 0;
        let mut iterations = 0;
        let mut max_force = max_norm(forces);
        while iterations < max_iterations {
            if max_force < tolerance || max_force == 0.0 || !max_force.is_finite() {
                break;
            }
            iterations += 1;
            let scale = self.step / max_force;
            for ((t, x), f) in trial.iter_mut().zip(positions.iter()).zip(forces.iter()) {
                *t = x + f * scale;
            }
            let trial_energy = evaluate(&trial, &mut trial_forces);
            if trial_energy.is_finite() && trial_energy < energy {
                std::mem::swap(positions, &mut trial);
                std::mem::swap(forces, &mut trial_forces);
                energy = trial_energy;
                max_force = max_norm(forces);
                accepted += 1;
                self.step *= GROW;
            } else {
                self.step = (self.step * SHRINK).max(MIN_STEP_NM);
            }
        }
        MinimizeSummary {
            iterations,
            accepted,
            energy,
            max_force,
        }
    }
}

fn max_norm(forces: &[V3]) -> f64 {
    forces.iter().map(|f| f.norm()).fold(0.0, f64::max)
}
