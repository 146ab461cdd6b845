use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use umb_core::errors::{ErrorInfo, UmbError};
use umb_core::{IntegratorSettings, OrderParameterAxis, Platform};
use umb_system::MolecularSystem;

/// YAML-configurable parameters of an umbrella sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Langevin integrator settings.
    #[serde(default)]
    pub integrator: IntegratorSettings,
    /// Compute platform handed to the engine.
    #[serde(default)]
    pub platform: Platform,
    /// Order-parameter axes, slowest-varying first.
    #[serde(default = "default_axes")]
    pub axes: Vec<AxisConfig>,
    /// Per-window phase lengths.
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Output file layout.
    #[serde(default)]
    pub output: OutputConfig,
    /// Worker count and resume behaviour.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Master seed for thermostat noise.
    #[serde(default)]
    pub seed_policy: SeedPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            integrator: IntegratorSettings::default(),
            platform: Platform::default(),
            axes: default_axes(),
            protocol: ProtocolConfig::default(),
            output: OutputConfig::default(),
            execution: ExecutionConfig::default(),
            seed_policy: SeedPolicy::default(),
        }
    }
}

impl RunConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self, UmbError> {
        let config: RunConfig = serde_yaml::from_str(text).map_err(|err| {
            let mut info = ErrorInfo::new("config-parse", err.to_string());
            if let Some(location) = err.location() {
                info = info.with_context("line", location.line().to_string());
            }
            UmbError::Config(info)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a YAML file.
    pub fn load(path: &Path) -> Result<Self, UmbError> {
        let text = fs::read_to_string(path).map_err(|err| {
            UmbError::Config(
                ErrorInfo::new("config-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Self::from_yaml_str(&text).map_err(|err| err.with_context("path", path.display().to_string()))
    }

    /// Checks every section; the first violation is reported.
    pub fn validate(&self) -> Result<(), UmbError> {
        self.integrator.validate()?;
        self.order_parameter_axes()?;
        self.protocol.validate()?;
        if self.execution.workers == 0 {
            return Err(UmbError::Config(
                ErrorInfo::new("invalid-workers", "worker count must be at least one")
                    .with_context("workers", "0"),
            ));
        }
        Ok(())
    }

    /// Builds the validated axes in configuration order.
    pub fn order_parameter_axes(&self) -> Result<Vec<OrderParameterAxis>, UmbError> {
        if self.axes.is_empty() {
            return Err(UmbError::Config(
                ErrorInfo::new("no-axes", "at least one order-parameter axis is required")
                    .with_hint("add an entry under `axes`"),
            ));
        }
        let mut seen = BTreeSet::new();
        let mut axes = Vec::with_capacity(self.axes.len());
        for axis in &self.axes {
            if !seen.insert(axis.name.as_str()) {
                return Err(UmbError::Config(
                    ErrorInfo::new("duplicate-axis", "axis names must be unique")
                        .with_context("axis", axis.name.clone()),
                ));
            }
            axes.push(axis.build()?);
        }
        Ok(axes)
    }

    /// Names of every parameter the run sets on the context.
    pub fn parameter_names(&self) -> Vec<String> {
        self.axes
            .iter()
            .flat_map(|axis| [axis.name.clone(), axis.force_constant_parameter()])
            .collect()
    }

    /// Fails unless `system` declares every parameter the run will set.
    pub fn check_system(&self, system: &MolecularSystem) -> Result<(), UmbError> {
        for name in self.parameter_names() {
            if !system.parameters.contains_key(&name) {
                return Err(UmbError::Config(
                    ErrorInfo::new("unknown-parameter", "system does not declare parameter")
                        .with_context("parameter", name)
                        .with_hint("add the parameter to the system file or rename the axis"),
                ));
            }
        }
        Ok(())
    }
}

fn default_axes() -> Vec<AxisConfig> {
    vec![AxisConfig::named("psi"), AxisConfig::named("phi")]
}

/// One order-parameter axis as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Axis name; also the bias-center parameter name.
    pub name: String,
    /// Number of grid points `M`.
    #[serde(default = "default_grid_size")]
    pub grid_size: usize,
    /// Bias force constant in kJ/mol/rad².
    #[serde(default = "default_force_constant")]
    pub force_constant: f64,
    /// Force-constant parameter name; defaults to `k_<name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_constant_parameter: Option<String>,
}

fn default_grid_size() -> usize {
    25
}

fn default_force_constant() -> f64 {
    100.0
}

impl AxisConfig {
    /// Axis with default grid size and force constant.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            grid_size: default_grid_size(),
            force_constant: default_force_constant(),
            force_constant_parameter: None,
        }
    }

    /// Resolved force-constant parameter name.
    pub fn force_constant_parameter(&self) -> String {
        self.force_constant_parameter
            .clone()
            .unwrap_or_else(|| format!("k_{}", self.name))
    }

    /// Validated axis.
    pub fn build(&self) -> Result<OrderParameterAxis, UmbError> {
        OrderParameterAxis::new(
            self.name.clone(),
            self.grid_size,
            self.force_constant_parameter(),
            self.force_constant,
        )
    }
}

/// Phase lengths applied identically to every window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Number of minimizer invocations.
    #[serde(default = "default_minimize_calls")]
    pub minimize_calls: usize,
    /// Iteration cap per minimizer invocation.
    #[serde(default = "default_minimize_iterations")]
    pub minimize_iterations: usize,
    /// Force tolerance in kJ/mol/nm.
    #[serde(default = "default_minimize_tolerance")]
    pub minimize_tolerance: f64,
    /// Unsampled steps after minimization.
    #[serde(default = "default_equilibration_steps")]
    pub equilibration_steps: usize,
    /// Frames written per window.
    #[serde(default = "default_production_samples")]
    pub production_samples: usize,
    /// Integrator steps between frames.
    #[serde(default = "default_steps_per_sample")]
    pub steps_per_sample: usize,
}

fn default_minimize_calls() -> usize {
    50
}

fn default_minimize_iterations() -> usize {
    20
}

fn default_minimize_tolerance() -> f64 {
    1.0
}

fn default_equilibration_steps() -> usize {
    5000
}

fn default_production_samples() -> usize {
    500
}

fn default_steps_per_sample() -> usize {
    200
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            minimize_calls: default_minimize_calls(),
            minimize_iterations: default_minimize_iterations(),
            minimize_tolerance: default_minimize_tolerance(),
            equilibration_steps: default_equilibration_steps(),
            production_samples: default_production_samples(),
            steps_per_sample: default_steps_per_sample(),
        }
    }
}

impl ProtocolConfig {
    /// Rejects protocols that cannot produce a trajectory.
    pub fn validate(&self) -> Result<(), UmbError> {
        if self.production_samples == 0 || self.steps_per_sample == 0 {
            return Err(UmbError::Config(
                ErrorInfo::new(
                    "invalid-protocol",
                    "production needs at least one sample of at least one step",
                )
                .with_context("production_samples", self.production_samples.to_string())
                .with_context("steps_per_sample", self.steps_per_sample.to_string()),
            ));
        }
        if !(self.minimize_tolerance.is_finite() && self.minimize_tolerance >= 0.0) {
            return Err(UmbError::Config(
                ErrorInfo::new("invalid-protocol", "minimizer tolerance must be non-negative")
                    .with_context("minimize_tolerance", self.minimize_tolerance.to_string()),
            ));
        }
        Ok(())
    }

    /// Integrator steps and minimizer calls spent on one window.
    pub fn steps_per_window(&self) -> usize {
        self.minimize_calls
            + self.equilibration_steps
            + self.production_samples * self.steps_per_sample
    }
}

/// Output layout relative to the run directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Subdirectory holding the per-window trajectories.
    #[serde(default = "default_trajectory_dir")]
    pub trajectory_dir: PathBuf,
    /// Manifest filename.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: PathBuf,
    /// Per-window CSV summary filename.
    #[serde(default = "default_summary_file")]
    pub summary_file: PathBuf,
}

fn default_trajectory_dir() -> PathBuf {
    PathBuf::from("traj")
}

fn default_manifest_file() -> PathBuf {
    PathBuf::from("manifest.json")
}

fn default_summary_file() -> PathBuf {
    PathBuf::from("windows.csv")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            trajectory_dir: default_trajectory_dir(),
            manifest_file: default_manifest_file(),
            summary_file: default_summary_file(),
        }
    }
}

/// Scheduling policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Number of workers, each with its own context. One runs sequentially.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Skip windows whose trajectory is already complete.
    #[serde(default)]
    pub resume: bool,
}

fn default_workers() -> usize {
    1
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            resume: false,
        }
    }
}

/// Deterministic seeding configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Master seed; each window derives its own substream from it.
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
}

fn default_master_seed() -> u64 {
    0x05EE_D5EE_DD15_5EED_u64
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            master_seed: default_master_seed(),
        }
    }
}
