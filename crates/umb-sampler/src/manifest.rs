use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use umb_core::errors::{ErrorInfo, UmbError};
use umb_core::{RunProvenance, SchemaVersion};
use umb_system::{stable_hash_string, MolecularSystem, Structure};

use crate::config::RunConfig;
use crate::scheduler::{RunOutcome, WindowOutcome, WindowState};

/// Per-window entry of the run manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    /// Row-major linear index.
    pub linear_index: usize,
    /// Per-axis grid indices.
    pub indices: Vec<usize>,
    /// Per-axis bias centers in radians.
    pub centers: Vec<f64>,
    /// Trajectory path.
    pub file: PathBuf,
    /// Lifecycle state.
    pub state: WindowState,
    /// Frames stored.
    pub frames: usize,
    /// Energy after minimization (kJ/mol).
    pub minimized_energy: Option<f64>,
    /// Energy after production (kJ/mol).
    pub final_energy: Option<f64>,
    /// Error that aborted the window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<UmbError>,
}

impl From<&WindowOutcome> for WindowRecord {
    fn from(outcome: &WindowOutcome) -> Self {
        Self {
            linear_index: outcome.window.linear_index,
            indices: outcome.window.indices(),
            centers: outcome.window.centers(),
            file: outcome.file.clone(),
            state: outcome.state,
            frames: outcome.frames,
            minimized_energy: outcome.minimized_energy,
            final_energy: outcome.final_energy,
            error: outcome.error.clone(),
        }
    }
}

/// Window counts by state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateCounts {
    /// Sampled during this run.
    pub complete: usize,
    /// Skipped because already complete.
    pub reused: usize,
    /// Aborted.
    pub failed: usize,
    /// Never attempted.
    pub pending: usize,
}

/// Structured manifest describing a finished or aborted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Manifest schema version.
    pub schema_version: SchemaVersion,
    /// Hashes, seed, timestamp and tool versions.
    pub provenance: RunProvenance,
    /// Configuration used for the run.
    pub config: RunConfig,
    /// Axis names in enumeration order.
    pub axes: Vec<String>,
    /// Window counts by state.
    pub counts: StateCounts,
    /// Failure that stopped the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<UmbError>,
    /// One record per window, in window order.
    pub windows: Vec<WindowRecord>,
}

impl RunManifest {
    /// Assembles the manifest of a run outcome.
    pub fn new(config: &RunConfig, provenance: RunProvenance, outcome: &RunOutcome) -> Self {
        Self {
            schema_version: SchemaVersion::default(),
            provenance,
            config: config.clone(),
            axes: config.axes.iter().map(|axis| axis.name.clone()).collect(),
            counts: StateCounts {
                complete: outcome.count(WindowState::Complete),
                reused: outcome.count(WindowState::Reused),
                failed: outcome.count(WindowState::Failed),
                pending: outcome.count(WindowState::Pending),
            },
            failure: outcome.failure.clone(),
            windows: outcome.windows.iter().map(WindowRecord::from).collect(),
        }
    }

    /// Provenance of a run over `system` starting from `structure`.
    pub fn provenance(
        config: &RunConfig,
        system: &MolecularSystem,
        structure: &Structure,
    ) -> Result<RunProvenance, UmbError> {
        let mut versions = BTreeMap::new();
        versions.insert(
            "umb-sampler".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        Ok(RunProvenance {
            config_hash: stable_hash_string(config)?,
            system_hash: system.canonical_hash()?,
            reference_hash: structure.positions_hash()?,
            seed: config.seed_policy.master_seed,
            created_at: Utc::now().to_rfc3339(),
            tool_versions: versions,
        })
    }

    /// Writes the manifest to a JSON file.
    pub fn write(&self, path: &Path) -> Result<(), UmbError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                UmbError::Serde(
                    ErrorInfo::new("manifest-mkdir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            UmbError::Serde(
                ErrorInfo::new("manifest-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(path, json).map_err(|err| {
            UmbError::Serde(
                ErrorInfo::new("manifest-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Loads a manifest from disk.
    pub fn load(path: &Path) -> Result<Self, UmbError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            UmbError::Serde(
                ErrorInfo::new("manifest-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            UmbError::Serde(
                ErrorInfo::new("manifest-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Writes the flat per-window table.
    pub fn write_summary_csv(&self, path: &Path) -> Result<(), UmbError> {
        let wrap = |err: csv::Error| {
            UmbError::Serde(
                ErrorInfo::new("summary-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        };
        let mut wtr = csv::Writer::from_path(path).map_err(wrap)?;
        let mut header = vec!["linear_index".to_string()];
        header.extend(self.axes.iter().map(|axis| format!("{axis}_index")));
        header.extend(self.axes.iter().map(|axis| format!("{axis}_center")));
        header.extend(
            ["state", "frames", "minimized_energy", "final_energy", "file", "error"]
                .map(String::from),
        );
        wtr.write_record(&header).map_err(wrap)?;
        for record in &self.windows {
            let mut row = vec![record.linear_index.to_string()];
            row.extend(record.indices.iter().map(ToString::to_string));
            row.extend(record.centers.iter().map(|center| format!("{center:.12}")));
            row.push(record.state.label().to_string());
            row.push(record.frames.to_string());
            row.push(optional(record.minimized_energy));
            row.push(optional(record.final_energy));
            row.push(record.file.display().to_string());
            row.push(
                record
                    .error
                    .as_ref()
                    .map(|err| err.info().code.clone())
                    .unwrap_or_default(),
            );
            wtr.write_record(&row).map_err(wrap)?;
        }
        wtr.flush().map_err(|err| wrap(err.into()))
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}
