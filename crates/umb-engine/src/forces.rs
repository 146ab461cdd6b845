use std::collections::BTreeMap;
use std::f64::consts::{PI, TAU};

use nalgebra::Vector3;
use rayon::prelude::*;
use umb_core::Platform;
use umb_system::{ForceTerm, MolecularSystem};

/// Vector type used by the kernels.
pub type V3 = Vector3<f64>;

const GEOMETRY_EPS: f64 = 1e-12;

/// Dihedral angle and its gradient with respect to the four atom positions.
#[derive(Debug, Clone, PartialEq)]
pub struct DihedralGeometry {
    /// Angle in (-π, π].
    pub angle: f64,
    /// dφ/dr for each of the four atoms.
    pub gradient: [V3; 4],
}

/// Wraps an angle difference into [-π, π).
pub fn wrap_angle(delta: f64) -> f64 {
    (delta + PI).rem_euclid(TAU) - PI
}

/// IUPAC dihedral of `p0-p1-p2-p3` with its Cartesian gradient.
///
/// Returns `None` when three consecutive atoms are collinear and the angle is
/// undefined.
pub fn dihedral(p0: &V3, p1: &V3, p2: &V3, p3: &V3) -> Option<DihedralGeometry> {
    let f = p0 - p1;
    let g = p1 - p2;
    let h = p3 - p2;
    let a = f.cross(&g);
    let b = h.cross(&g);
    let a2 = a.norm_squared();
    let b2 = b.norm_squared();
    let g_norm = g.norm();
    if a2 < GEOMETRY_EPS || b2 < GEOMETRY_EPS || g_norm < GEOMETRY_EPS {
        return None;
    }
    let angle = (-g_norm * f.dot(&b)).atan2(a.dot(&b));

    let fg = f.dot(&g);
    let hg = h.dot(&g);
    let d0 = a * (-g_norm / a2);
    let d3 = b * (g_norm / b2);
    let d1 = a * (g_norm / a2) + a * (fg / (a2 * g_norm)) - b * (hg / (b2 * g_norm));
    let d2 = b * (hg / (b2 * g_norm)) - a * (fg / (a2 * g_norm)) - b * (g_norm / b2);
    Some(DihedralGeometry {
        angle,
        gradient: [d0, d1, d2, d3],
    })
}

/// Evaluates the potential energy and writes forces into `forces`.
pub fn evaluate(
    system: &MolecularSystem,
    parameters: &BTreeMap<String, f64>,
    positions: &[V3],
    forces: &mut [V3],
    platform: Platform,
) -> f64 {
    forces.iter_mut().for_each(|force| *force = V3::zeros());
    match platform {
        Platform::Reference => system
            .terms
            .iter()
            .map(|term| accumulate(term, parameters, positions, forces))
            .sum(),
        Platform::Cpu => {
            let count = positions.len();
            let (energy, partial) = system
                .terms
                .par_iter()
                .fold(
                    || (0.0, vec![V3::zeros(); count]),
                    |(energy, mut local), term| {
                        let contribution = accumulate(term, parameters, positions, &mut local);
                        (energy + contribution, local)
                    },
                )
                .reduce(
                    || (0.0, vec![V3::zeros(); count]),
                    |(energy_a, mut forces_a), (energy_b, forces_b)| {
                        for (lhs, rhs) in forces_a.iter_mut().zip(forces_b) {
                            *lhs += rhs;
                        }
                        (energy_a + energy_b, forces_a)
                    },
                );
            forces.copy_from_slice(&partial);
            energy
        }
    }
}

/// Potential energy only.
pub fn energy(
    system: &MolecularSystem,
    parameters: &BTreeMap<String, f64>,
    positions: &[V3],
    platform: Platform,
) -> f64 {
    let mut scratch = vec![V3::zeros(); positions.len()];
    evaluate(system, parameters, positions, &mut scratch, platform)
}

fn accumulate(
    term: &ForceTerm,
    parameters: &BTreeMap<String, f64>,
    positions: &[V3],
    forces: &mut [V3],
) -> f64 {
    match term {
        ForceTerm::HarmonicBond { atoms, length, k } => {
            let [i, j] = *atoms;
            let delta = positions[i] - positions[j];
            let r = delta.norm();
            let stretch = r - length;
            if r > GEOMETRY_EPS {
                let gradient = delta * (k * stretch / r);
                forces[i] -= gradient;
                forces[j] += gradient;
            }
            0.5 * k * stretch * stretch
        }
        ForceTerm::HarmonicAngle { atoms, angle, k } => {
            let [i, j, l] = *atoms;
            let a = positions[i] - positions[j];
            let b = positions[l] - positions[j];
            let la = a.norm();
            let lb = b.norm();
            if la < GEOMETRY_EPS || lb < GEOMETRY_EPS {
                return 0.0;
            }
            let cos = (a.dot(&b) / (la * lb)).clamp(-1.0, 1.0);
            let theta = cos.acos();
            let bend = theta - angle;
            let sin = (1.0 - cos * cos).sqrt().max(1e-8);
            let dtheta_da = -(b / (la * lb) - a * (cos / (la * la))) / sin;
            let dtheta_db = -(a / (la * lb) - b * (cos / (lb * lb))) / sin;
            let de_dtheta = k * bend;
            forces[i] -= dtheta_da * de_dtheta;
            forces[l] -= dtheta_db * de_dtheta;
            forces[j] += (dtheta_da + dtheta_db) * de_dtheta;
            0.5 * k * bend * bend
        }
        ForceTerm::PeriodicTorsion {
            atoms,
            periodicity,
            phase,
            k,
        } => {
            let n = f64::from(*periodicity);
            apply_dihedral(atoms, positions, forces, |phi| {
                let arg = n * phi - phase;
                (k * (1.0 + arg.cos()), -k * n * arg.sin())
            })
        }
        ForceTerm::LennardJones {
            atoms,
            sigma,
            epsilon,
        } => {
            let [i, j] = *atoms;
            let delta = positions[i] - positions[j];
            let r2 = delta.norm_squared();
            if r2 < GEOMETRY_EPS {
                return 0.0;
            }
            let sr2 = sigma * sigma / r2;
            let sr6 = sr2 * sr2 * sr2;
            let sr12 = sr6 * sr6;
            // dE/dr divided by r
            let de_dr_over_r = 4.0 * epsilon * (-12.0 * sr12 + 6.0 * sr6) / r2;
            let gradient = delta * de_dr_over_r;
            forces[i] -= gradient;
            forces[j] += gradient;
            4.0 * epsilon * (sr12 - sr6)
        }
        ForceTerm::DihedralRestraint {
            atoms,
            center,
            force_constant,
        } => {
            let theta0 = parameters.get(center).copied().unwrap_or(0.0);
            let k = parameters.get(force_constant).copied().unwrap_or(0.0);
            if k == 0.0 {
                return 0.0;
            }
            apply_dihedral(atoms, positions, forces, |phi| {
                let deviation = wrap_angle(phi - theta0);
                (0.5 * k * deviation * deviation, k * deviation)
            })
        }
    }
}

/// Applies a dihedral potential given as `phi -> (energy, dE/dphi)`.
fn apply_dihedral(
    atoms: &[usize; 4],
    positions: &[V3],
    forces: &mut [V3],
    potential: impl Fn(f64) -> (f64, f64),
) -> f64 {
    let [i, j, k, l] = *atoms;
    let Some(geometry) = dihedral(&positions[i], &positions[j], &positions[k], &positions[l])
    else {
        return 0.0;
    };
    let (energy, de_dphi) = potential(geometry.angle);
    for (atom, gradient) in [i, j, k, l].into_iter().zip(geometry.gradient.iter()) {
        forces[atom] -= gradient * de_dphi;
    }
    energy
}
