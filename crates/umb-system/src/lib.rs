#![deny(missing_docs)]
#![doc = "Loading of serialized molecular systems and reference structures."]

/// Canonical hashing helpers.
pub mod hash;
/// PDB topology and reference coordinate reader.
pub mod structure;
/// Serialized force-field description.
pub mod system;

pub use hash::stable_hash_string;
pub use structure::{AtomRecord, Structure};
pub use system::{ForceTerm, MolecularSystem, Particle};
