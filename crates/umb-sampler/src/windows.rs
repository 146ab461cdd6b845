use std::ops::Range;

use serde::{Deserialize, Serialize};
use umb_core::{OrderParameterAxis, Window, WindowCoordinate};

use crate::config::ProtocolConfig;

/// Number of windows in the Cartesian product of the axis grids.
pub fn window_count(axes: &[OrderParameterAxis]) -> usize {
    axes.iter().map(OrderParameterAxis::grid_size).product()
}

/// Lazily enumerates every window in row-major order (first axis slowest).
pub fn enumerate_windows(axes: &[OrderParameterAxis]) -> WindowIter<'_> {
    WindowIter {
        axes,
        next: 0,
        end: window_count(axes),
    }
}

/// Window with linear index `linear_index`, if it exists.
pub fn window_at(axes: &[OrderParameterAxis], linear_index: usize) -> Option<Window> {
    if linear_index >= window_count(axes) {
        return None;
    }
    let mut remainder = linear_index;
    let mut coordinates = Vec::with_capacity(axes.len());
    for axis in axes.iter().rev() {
        let index = remainder % axis.grid_size();
        remainder /= axis.grid_size();
        coordinates.push(WindowCoordinate {
            axis: axis.name().to_string(),
            index,
            grid_size: axis.grid_size(),
            center: axis.value(index),
        });
    }
    coordinates.reverse();
    Some(Window {
        linear_index,
        coordinates,
    })
}

/// Contiguous block of linear indices owned by `worker` out of `workers`.
///
/// Blocks are disjoint, cover `0..total` and differ in length by at most one.
pub fn partition(total: usize, workers: usize, worker: usize) -> Range<usize> {
    let workers = workers.max(1);
    if worker >= workers {
        return total..total;
    }
    let base = total / workers;
    let extra = total % workers;
    let start = worker * base + worker.min(extra);
    let len = base + usize::from(worker < extra);
    start..start + len
}

/// Restartable iterator over a range of windows.
#[derive(Debug, Clone)]
pub struct WindowIter<'a> {
    axes: &'a [OrderParameterAxis],
    next: usize,
    end: usize,
}

impl<'a> WindowIter<'a> {
    /// Restricts the enumeration to a block of linear indices.
    pub fn range(axes: &'a [OrderParameterAxis], range: Range<usize>) -> Self {
        let total = window_count(axes);
        Self {
            axes,
            next: range.start.min(total),
            end: range.end.min(total),
        }
    }
}

impl Iterator for WindowIter<'_> {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.next >= self.end {
            return None;
        }
        let window = window_at(self.axes, self.next);
        self.next += 1;
        window
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for WindowIter<'_> {}

/// Axes plus protocol: everything needed to size a run before it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowPlan {
    /// Axes in enumeration order.
    pub axes: Vec<OrderParameterAxis>,
    /// Per-window protocol.
    pub protocol: ProtocolConfig,
}

impl WindowPlan {
    /// Creates a plan.
    pub fn new(axes: Vec<OrderParameterAxis>, protocol: ProtocolConfig) -> Self {
        Self { axes, protocol }
    }

    /// Number of windows.
    pub fn len(&self) -> usize {
        window_count(&self.axes)
    }

    /// True when no window would be sampled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Windows in execution order.
    pub fn windows(&self) -> WindowIter<'_> {
        enumerate_windows(&self.axes)
    }

    /// Engine work of the full run: per window, minimizer calls plus
    /// equilibration and production steps.
    pub fn total_engine_steps(&self) -> usize {
        self.len() * self.protocol.steps_per_window()
    }

    /// Serializable table of every window.
    pub fn table(&self) -> PlanTable {
        PlanTable {
            windows: self.len(),
            total_engine_steps: self.total_engine_steps(),
            axes: self
                .axes
                .iter()
                .map(|axis| AxisSummary {
                    name: axis.name().to_string(),
                    grid_size: axis.grid_size(),
                    force_constant_parameter: axis.force_constant_parameter().to_string(),
                    force_constant: axis.force_constant(),
                    grid: axis.grid(),
                })
                .collect(),
            entries: self
                .windows()
                .map(|window| PlanEntry {
                    file_stem: window.file_stem(),
                    linear_index: window.linear_index,
                    indices: window.indices(),
                    centers: window.centers(),
                })
                .collect(),
        }
    }
}

/// Printable description of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTable {
    /// Window count.
    pub windows: usize,
    /// See [`WindowPlan::total_engine_steps`].
    pub total_engine_steps: usize,
    /// Axis grids.
    pub axes: Vec<AxisSummary>,
    /// One entry per window, in execution order.
    pub entries: Vec<PlanEntry>,
}

/// Axis grid as shown in a [`PlanTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSummary {
    /// Axis name.
    pub name: String,
    /// Grid cardinality.
    pub grid_size: usize,
    /// Force-constant parameter name.
    pub force_constant_parameter: String,
    /// Force constant.
    pub force_constant: f64,
    /// Grid centers.
    pub grid: Vec<f64>,
}

/// Window row of a [`PlanTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    /// Linear index.
    pub linear_index: usize,
    /// Per-axis indices.
    pub indices: Vec<usize>,
    /// Per-axis centers.
    pub centers: Vec<f64>,
    /// Trajectory file stem.
    pub file_stem: String,
}
