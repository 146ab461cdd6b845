#![deny(missing_docs)]
#![doc = "Reference Langevin dynamics engine implementing the simulation context traits."]

/// Context and factory over a shared molecular system.
pub mod context;
/// Energy and force kernels.
pub mod forces;
/// Langevin integrator.
pub mod integrator;
/// Local energy minimization.
pub mod minimizer;

pub use context::{ReferenceContext, ReferenceEngine};
pub use forces::{dihedral, wrap_angle, DihedralGeometry};
pub use integrator::LangevinMiddle;
pub use minimizer::{MinimizeSummary, SteepestDescent};

/// Molar Boltzmann constant in kJ/mol/K.
pub const BOLTZMANN: f64 = 0.008_314_462_618;
