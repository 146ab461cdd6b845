use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use umb_core::errors::{ErrorInfo, UmbError};
use umb_core::Vec3;

use crate::hash::stable_hash_string;
use crate::system::MolecularSystem;

const ANGSTROM_TO_NM: f64 = 0.1;

/// Topology entry for one atom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomRecord {
    /// Serial number as written in the file.
    pub serial: usize,
    /// Atom name, trimmed.
    pub name: String,
    /// Residue name, trimmed.
    pub residue_name: String,
    /// Residue sequence number.
    pub residue_seq: i64,
    /// Chain identifier (may be empty).
    pub chain_id: String,
    /// Element symbol (may be empty).
    pub element: String,
}

/// Topology plus the reference pose every window is re-seeded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    /// Atoms in file order.
    pub atoms: Vec<AtomRecord>,
    /// Reference positions in nm.
    pub positions: Vec<Vec3>,
}

impl Structure {
    /// Loads the first model of a PDB file.
    pub fn load_pdb(path: &Path) -> Result<Self, UmbError> {
        let text = fs::read_to_string(path).map_err(|err| {
            UmbError::Config(
                ErrorInfo::new("coordinates-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Self::from_pdb_str(&text)
            .map_err(|err| err.with_context("path", path.display().to_string()))
    }

    /// Parses ATOM/HETATM records of the first model of a PDB document.
    pub fn from_pdb_str(text: &str) -> Result<Self, UmbError> {
        let mut atoms = Vec::new();
        let mut positions = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let record = line.get(0..6).unwrap_or(line).trim_end();
            match record {
                "ATOM" | "HETATM" => {
                    let (atom, position) = parse_atom_line(line, line_no + 1, atoms.len())?;
                    atoms.push(atom);
                    positions.push(position);
                }
                "ENDMDL" | "END" => break,
                _ => {}
            }
        }
        if atoms.is_empty() {
            return Err(UmbError::Config(ErrorInfo::new(
                "coordinates-empty",
                "no ATOM or HETATM records found",
            )));
        }
        Ok(Self { atoms, positions })
    }

    /// Number of atoms.
    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    /// Fails unless the structure matches the system's particle count.
    pub fn check_compatible(&self, system: &MolecularSystem) -> Result<(), UmbError> {
        if self.num_atoms() != system.num_particles() {
            return Err(UmbError::Config(
                ErrorInfo::new(
                    "atom-count-mismatch",
                    "coordinate file and system disagree on the number of atoms",
                )
                .with_context("coordinates", self.num_atoms().to_string())
                .with_context("system", system.num_particles().to_string()),
            ));
        }
        Ok(())
    }

    /// Stable hash of the reference positions.
    pub fn positions_hash(&self) -> Result<String, UmbError> {
        stable_hash_string(&self.positions)
    }
}

fn parse_atom_line(
    line: &str,
    line_no: usize,
    fallback_serial: usize,
) -> Result<(AtomRecord, Vec3), UmbError> {
    let column = move |start: usize, end: usize| {
        line.get(start..end.min(line.len()))
            .unwrap_or("")
            .trim()
    };
    let coordinate = |start: usize, end: usize, axis: &str| -> Result<f64, UmbError> {
        let raw = column(start, end);
        raw.parse::<f64>().map_err(|err| {
            UmbError::Config(
                ErrorInfo::new("coordinates-parse", err.to_string())
                    .with_context("line", line_no.to_string())
                    .with_context("axis", axis)
                    .with_context("value", raw),
            )
        })
    };
    let x = coordinate(30, 38, "x")?;
    let y = coordinate(38, 46, "y")?;
    let z = coordinate(46, 54, "z")?;
    let atom = AtomRecord {
        serial: column(6, 11).parse().unwrap_or(fallback_serial + 1),
        name: column(12, 16).to_string(),
        residue_name: column(17, 21).to_string(),
        residue_seq: column(22, 26).parse().unwrap_or(0),
        chain_id: column(21, 22).to_string(),
        element: column(76, 78).to_string(),
    };
    Ok((
        atom,
        [x * ANGSTROM_TO_NM, y * ANGSTROM_TO_NM, z * ANGSTROM_TO_NM],
    ))
}
