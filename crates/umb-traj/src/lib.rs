#![deny(missing_docs)]
#![doc = "DCD trajectory encoding and the per-window trajectory store."]

pub mod dcd;
/// File-backed trajectory store.
pub mod store;

pub use dcd::{read_dcd, DcdHeader, DcdWriter};
pub use store::{
    inspect, partial_path, trajectory_path, DcdFileWriter, DcdStore, DcdSummary,
};
