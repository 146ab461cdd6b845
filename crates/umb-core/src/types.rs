use std::f64::consts::{PI, TAU};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, UmbError};

/// Cartesian position in nanometres.
pub type Vec3 = [f64; 3];

/// One periodic order parameter discretized on a half-open grid over [-π, π).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderParameterAxis {
    name: String,
    grid_size: usize,
    force_constant_parameter: String,
    force_constant: f64,
}

impl OrderParameterAxis {
    /// Creates an axis. `name` doubles as the bias-center parameter name.
    pub fn new(
        name: impl Into<String>,
        grid_size: usize,
        force_constant_parameter: impl Into<String>,
        force_constant: f64,
    ) -> Result<Self, UmbError> {
        let name = name.into();
        if grid_size == 0 {
            return Err(UmbError::Config(
                ErrorInfo::new("invalid-grid-size", "axis grid size must be positive")
                    .with_context("axis", name)
                    .with_context("grid_size", grid_size.to_string()),
            ));
        }
        if !force_constant.is_finite() || force_constant < 0.0 {
            return Err(UmbError::Config(
                ErrorInfo::new(
                    "invalid-force-constant",
                    "bias force constant must be finite and non-negative",
                )
                .with_context("axis", name)
                .with_context("force_constant", force_constant.to_string()),
            ));
        }
        Ok(Self {
            name,
            grid_size,
            force_constant_parameter: force_constant_parameter.into(),
            force_constant,
        })
    }

    /// Axis name, also used as the bias-center parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of grid points `M`.
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// Name of the context parameter holding the bias force constant.
    pub fn force_constant_parameter(&self) -> &str {
        &self.force_constant_parameter
    }

    /// Bias force constant in kJ/mol/rad².
    pub fn force_constant(&self) -> f64 {
        self.force_constant
    }

    /// Distance between neighbouring grid points.
    pub fn spacing(&self) -> f64 {
        TAU / self.grid_size as f64
    }

    /// Center of grid point `index`: `-π + index * 2π/M`.
    pub fn value(&self, index: usize) -> f64 {
        -PI + index as f64 * self.spacing()
    }

    /// All grid values in ascending order. The last value is strictly below π.
    pub fn grid(&self) -> Vec<f64> {
        (0..self.grid_size).map(|index| self.value(index)).collect()
    }
}

/// Position of a window along a single axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowCoordinate {
    /// Axis name.
    pub axis: String,
    /// Integer grid index along the axis.
    pub index: usize,
    /// Cardinality of the axis grid.
    pub grid_size: usize,
    /// Bias center in radians.
    pub center: f64,
}

/// One sampling window: a point of the Cartesian product of the axis grids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// Row-major linear index of the window.
    pub linear_index: usize,
    /// Per-axis coordinates in axis order.
    pub coordinates: Vec<WindowCoordinate>,
}

impl Window {
    /// Per-axis grid indices.
    pub fn indices(&self) -> Vec<usize> {
        self.coordinates.iter().map(|coord| coord.index).collect()
    }

    /// Per-axis bias centers.
    pub fn centers(&self) -> Vec<f64> {
        self.coordinates.iter().map(|coord| coord.center).collect()
    }

    /// File stem addressing this window, e.g. `traj_psi_3_phi_12`.
    pub fn file_stem(&self) -> String {
        let mut stem = String::from("traj");
        for coord in &self.coordinates {
            stem.push('_');
            stem.push_str(&coord.axis);
            stem.push('_');
            stem.push_str(&coord.index.to_string());
        }
        stem
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, coord) in self.coordinates.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(
                f,
                "{} index: {} out of {}",
                coord.axis, coord.index, coord.grid_size
            )?;
        }
        Ok(())
    }
}

/// Compute platform passed through to the simulation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Platform {
    /// Serial reference kernels.
    #[default]
    Reference,
    /// Multi-threaded CPU kernels.
    #[serde(rename = "CPU")]
    Cpu,
}

impl Platform {
    /// Canonical platform name.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Reference => "Reference",
            Platform::Cpu => "CPU",
        }
    }
}

impl FromStr for Platform {
    type Err = UmbError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "reference" => Ok(Platform::Reference),
            "cpu" => Ok(Platform::Cpu),
            _ => Err(UmbError::Config(
                ErrorInfo::new("unknown-platform", "unsupported compute platform")
                    .with_context("platform", value)
                    .with_hint("use Reference or CPU"),
            )),
        }
    }
}

/// Langevin integrator settings fixed at context construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    /// Bath temperature in kelvin.
    pub temperature: f64,
    /// Friction coefficient in 1/ps.
    pub friction: f64,
    /// Integration step size in ps.
    pub step_size: f64,
}

impl IntegratorSettings {
    /// Rejects non-physical settings.
    pub fn validate(&self) -> Result<(), UmbError> {
        let checks = [
            ("temperature", self.temperature, self.temperature >= 0.0),
            ("friction", self.friction, self.friction >= 0.0),
            ("step_size", self.step_size, self.step_size > 0.0),
        ];
        for (name, value, ok) in checks {
            if !value.is_finite() || !ok {
                return Err(UmbError::Config(
                    ErrorInfo::new("invalid-integrator", "integrator setting out of range")
                        .with_context("field", name)
                        .with_context("value", value.to_string()),
                ));
            }
        }
        Ok(())
    }
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            temperature: 298.15,
            friction: 10.0,
            step_size: 0.001,
        }
    }
}
