use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use umb_core::errors::{ErrorInfo, UmbError};
use umb_core::SchemaVersion;

use crate::hash::stable_hash_string;

/// A particle of the molecular system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// Mass in amu.
    pub mass: f64,
    /// Optional label carried through for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Force terms understood by the reference engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ForceTerm {
    /// `0.5 k (r - length)^2`.
    HarmonicBond {
        /// Bonded atom pair.
        atoms: [usize; 2],
        /// Equilibrium length in nm.
        length: f64,
        /// Force constant in kJ/mol/nm².
        k: f64,
    },
    /// `0.5 k (theta - angle)^2`, with the vertex at the middle atom.
    HarmonicAngle {
        /// Atom triple; `atoms[1]` is the vertex.
        atoms: [usize; 3],
        /// Equilibrium angle in radians.
        angle: f64,
        /// Force constant in kJ/mol/rad².
        k: f64,
    },
    /// `k (1 + cos(n phi - phase))`.
    PeriodicTorsion {
        /// Atom quadruple defining the dihedral.
        atoms: [usize; 4],
        /// Multiplicity `n`.
        periodicity: u32,
        /// Phase offset in radians.
        phase: f64,
        /// Barrier height in kJ/mol.
        k: f64,
    },
    /// 12-6 Lennard-Jones interaction between an explicit pair.
    LennardJones {
        /// Interacting atom pair.
        atoms: [usize; 2],
        /// Contact distance in nm.
        sigma: f64,
        /// Well depth in kJ/mol.
        epsilon: f64,
    },
    /// Harmonic restraint on a dihedral, parameterized by named globals.
    ///
    /// Energy is `0.5 k d^2` where `d` is the periodic difference between the
    /// dihedral and the center, wrapped into [-π, π).
    DihedralRestraint {
        /// Atom quadruple defining the restrained dihedral.
        atoms: [usize; 4],
        /// Name of the global parameter holding the center (radians).
        center: String,
        /// Name of the global parameter holding the force constant.
        force_constant: String,
    },
}

impl ForceTerm {
    fn atoms(&self) -> &[usize] {
        match self {
            ForceTerm::HarmonicBond { atoms, .. } | ForceTerm::LennardJones { atoms, .. } => {
                &atoms[..]
            }
            ForceTerm::HarmonicAngle { atoms, .. } => &atoms[..],
            ForceTerm::PeriodicTorsion { atoms, .. } | ForceTerm::DihedralRestraint { atoms, .. } => {
                &atoms[..]
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ForceTerm::HarmonicBond { .. } => "harmonic-bond",
            ForceTerm::HarmonicAngle { .. } => "harmonic-angle",
            ForceTerm::PeriodicTorsion { .. } => "periodic-torsion",
            ForceTerm::LennardJones { .. } => "lennard-jones",
            ForceTerm::DihedralRestraint { .. } => "dihedral-restraint",
        }
    }
}

/// Immutable description of particles, force terms and global parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MolecularSystem {
    /// Schema version of the serialized description.
    #[serde(default)]
    pub schema_version: SchemaVersion,
    /// Particles in topology order.
    pub particles: Vec<Particle>,
    /// Global parameters and their default values.
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    /// Force terms summed into the potential.
    #[serde(default)]
    pub terms: Vec<ForceTerm>,
}

impl MolecularSystem {
    /// Parses and validates a system from its JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, UmbError> {
        let system: MolecularSystem = serde_json::from_str(text).map_err(|err| {
            UmbError::Config(
                ErrorInfo::new("system-parse", err.to_string())
                    .with_context("line", err.line().to_string()),
            )
        })?;
        system.validate()?;
        Ok(system)
    }

    /// Loads and validates a system from a JSON file.
    pub fn load(path: &Path) -> Result<Self, UmbError> {
        let text = fs::read_to_string(path).map_err(|err| {
            UmbError::Config(
                ErrorInfo::new("system-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        let system = Self::from_json_str(&text)
            .map_err(|err| err.with_context("path", path.display().to_string()))?;
        log::debug!(
            "loaded system from {}: {} particles, {} terms",
            path.display(),
            system.num_particles(),
            system.terms.len()
        );
        Ok(system)
    }

    /// Number of particles.
    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    /// Checks masses, atom indices and parameter references.
    pub fn validate(&self) -> Result<(), UmbError> {
        if self.particles.is_empty() {
            return Err(UmbError::Config(ErrorInfo::new(
                "system-empty",
                "system declares no particles",
            )));
        }
        for (index, particle) in self.particles.iter().enumerate() {
            if !(particle.mass.is_finite() && particle.mass > 0.0) {
                return Err(UmbError::Config(
                    ErrorInfo::new("invalid-mass", "particle mass must be positive")
                        .with_context("particle", index.to_string())
                        .with_context("mass", particle.mass.to_string()),
                ));
            }
        }
        for (name, value) in &self.parameters {
            if !value.is_finite() {
                return Err(UmbError::Config(
                    ErrorInfo::new("invalid-parameter", "parameter default must be finite")
                        .with_context("parameter", name.clone()),
                ));
            }
        }
        let count = self.num_particles();
        for (term_index, term) in self.terms.iter().enumerate() {
            for &atom in term.atoms() {
                if atom >= count {
                    return Err(UmbError::Config(
                        ErrorInfo::new("atom-out-of-range", "force term references a missing atom")
                            .with_context("term", term_index.to_string())
                            .with_context("kind", term.kind())
                            .with_context("atom", atom.to_string())
                            .with_context("particles", count.to_string()),
                    ));
                }
            }
            if let ForceTerm::DihedralRestraint {
                center,
                force_constant,
                ..
            } = term
            {
                for name in [center, force_constant] {
                    if !self.parameters.contains_key(name) {
                        return Err(UmbError::Config(
                            ErrorInfo::new(
                                "undeclared-parameter",
                                "restraint references an undeclared parameter",
                            )
                            .with_context("term", term_index.to_string())
                            .with_context("parameter", name.clone())
                            .with_hint("declare it under `parameters` with a default value"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Names of the parameters used as bias centers by dihedral restraints.
    pub fn restraint_centers(&self) -> Vec<&str> {
        self.terms
            .iter()
            .filter_map(|term| match term {
                ForceTerm::DihedralRestraint { center, .. } => Some(center.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Stable hash of the canonical serialized system.
    pub fn canonical_hash(&self) -> Result<String, UmbError> {
        stable_hash_string(self)
    }
}
