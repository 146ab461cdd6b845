#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use umb_core::errors::{ErrorInfo, UmbError};
use umb_core::{
    ContextFactory, OrderParameterAxis, SimulationContext, TrajectoryRecord, TrajectoryStore,
    TrajectoryWriter, Vec3, Window,
};
use umb_sampler::{ProtocolConfig, WindowPlan};

pub fn two_by_two() -> Vec<OrderParameterAxis> {
    vec![
        OrderParameterAxis::new("psi", 2, "k_psi", 100.0).unwrap(),
        OrderParameterAxis::new("phi", 2, "k_phi", 100.0).unwrap(),
    ]
}

pub fn short_protocol() -> ProtocolConfig {
    ProtocolConfig {
        minimize_calls: 3,
        minimize_iterations: 4,
        minimize_tolerance: 10.0,
        equilibration_steps: 10,
        production_samples: 5,
        steps_per_sample: 2,
    }
}

pub fn plan() -> WindowPlan {
    WindowPlan::new(two_by_two(), short_protocol())
}

pub fn reference() -> Vec<Vec3> {
    vec![[0.0, 0.0, 0.0], [0.15, 0.0, 0.0], [0.15, 0.15, 0.0], [0.3, 0.15, 0.1]]
}

/// Engine call as observed by the mock context.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetParameter(String, f64),
    SetPositions(Vec<Vec3>),
    Seed(u64),
    Minimize(usize),
    Step(usize),
}

/// Failure injected into the window with the given centers.
#[derive(Debug, Clone)]
pub struct Fault {
    pub centers: Vec<(String, f64)>,
    pub kind: FaultKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaultKind {
    /// Production fails after this many frames.
    StepAfter(usize),
    /// Every energy query returns NaN.
    NanEnergy,
}

#[derive(Clone, Default)]
pub struct MockFactory {
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub contexts: Arc<Mutex<usize>>,
    pub fault: Option<Fault>,
}

impl MockFactory {
    pub fn with_fault(fault: Fault) -> Self {
        Self {
            fault: Some(fault),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl ContextFactory for MockFactory {
    type Context = MockContext;

    fn create_context(&self) -> Result<MockContext, UmbError> {
        *self.contexts.lock().unwrap() += 1;
        let parameters = ["psi", "phi", "k_psi", "k_phi"]
            .into_iter()
            .map(|name| (name.to_string(), 0.0))
            .collect();
        Ok(MockContext {
            calls: Arc::clone(&self.calls),
            fault: self.fault.clone(),
            parameters,
            positions: Vec::new(),
            steps_since_reset: 0,
        })
    }
}

pub struct MockContext {
    calls: Arc<Mutex<Vec<Call>>>,
    fault: Option<Fault>,
    parameters: BTreeMap<String, f64>,
    positions: Vec<Vec3>,
    steps_since_reset: usize,
}

impl MockContext {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn faulted(&self) -> Option<FaultKind> {
        let fault = self.fault.as_ref()?;
        let matches = fault
            .centers
            .iter()
            .all(|(name, center)| (self.parameters[name] - center).abs() < 1e-12);
        matches.then_some(fault.kind)
    }
}

impl SimulationContext for MockContext {
    fn num_particles(&self) -> usize {
        4
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<(), UmbError> {
        self.record(Call::SetParameter(name.to_string(), value));
        match self.parameters.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(UmbError::Config(ErrorInfo::new(
                "unknown-parameter",
                "mock context parameter",
            ))),
        }
    }

    fn parameter(&self, name: &str) -> Result<f64, UmbError> {
        Ok(self.parameters[name])
    }

    fn set_positions(&mut self, positions: &[Vec3]) -> Result<(), UmbError> {
        self.record(Call::SetPositions(positions.to_vec()));
        self.positions = positions.to_vec();
        self.steps_since_reset = 0;
        Ok(())
    }

    fn set_random_seed(&mut self, seed: u64) {
        self.record(Call::Seed(seed));
    }

    fn step(&mut self, steps: usize) -> Result<(), UmbError> {
        self.record(Call::Step(steps));
        self.steps_since_reset += 1;
        if let Some(FaultKind::StepAfter(after)) = self.faulted() {
            // one equilibration call precedes the production calls
            if self.steps_since_reset > after + 1 {
                return Err(UmbError::Numerical(ErrorInfo::new(
                    "non-finite-state",
                    "injected fault",
                )));
            }
        }
        for position in &mut self.positions {
            position[0] += 0.001 * steps as f64;
        }
        Ok(())
    }

    fn minimize(&mut self, _tolerance: f64, max_iterations: usize) -> Result<(), UmbError> {
        self.record(Call::Minimize(max_iterations));
        Ok(())
    }

    fn potential_energy(&self) -> Result<f64, UmbError> {
        if self.faulted() == Some(FaultKind::NanEnergy) {
            return Ok(f64::NAN);
        }
        Ok(self.parameters["psi"] + self.parameters["phi"])
    }

    fn positions(&self) -> Result<Vec<Vec3>, UmbError> {
        Ok(self.positions.clone())
    }
}

/// Trajectory as seen by [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredTrajectory {
    pub frames: Vec<Vec<Vec3>>,
    pub finished: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    pub files: Arc<Mutex<BTreeMap<String, StoredTrajectory>>>,
    pub opened: Arc<Mutex<Vec<String>>>,
}

impl MemoryStore {
    pub fn get(&self, stem: &str) -> Option<StoredTrajectory> {
        self.files.lock().unwrap().get(stem).cloned()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn insert_finished(&self, stem: &str, frames: usize) {
        self.files.lock().unwrap().insert(
            stem.to_string(),
            StoredTrajectory {
                frames: vec![Vec::new(); frames],
                finished: true,
            },
        );
    }
}

impl TrajectoryStore for MemoryStore {
    type Writer = MemoryWriter;

    fn location(&self, window: &Window) -> PathBuf {
        PathBuf::from(format!("{}.dcd", window.file_stem()))
    }

    fn create(&self, window: &Window) -> Result<MemoryWriter, UmbError> {
        let stem = window.file_stem();
        self.opened.lock().unwrap().push(stem.clone());
        self.files.lock().unwrap().remove(&stem);
        Ok(MemoryWriter {
            files: Arc::clone(&self.files),
            stem,
            path: self.location(window),
            frames: Vec::new(),
            finished: false,
        })
    }

    fn completed_frames(&self, window: &Window) -> Result<Option<usize>, UmbError> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(&window.file_stem())
            .filter(|stored| stored.finished)
            .map(|stored| stored.frames.len()))
    }
}

pub struct MemoryWriter {
    files: Arc<Mutex<BTreeMap<String, StoredTrajectory>>>,
    stem: String,
    path: PathBuf,
    frames: Vec<Vec<Vec3>>,
    finished: bool,
}

impl TrajectoryWriter for MemoryWriter {
    fn write_frame(&mut self, positions: &[Vec3]) -> Result<(), UmbError> {
        self.frames.push(positions.to_vec());
        Ok(())
    }

    fn frames_written(&self) -> usize {
        self.frames.len()
    }

    fn finish(mut self) -> Result<TrajectoryRecord, UmbError> {
        self.finished = true;
        Ok(TrajectoryRecord {
            path: self.path.clone(),
            frames: self.frames.len(),
        })
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        let stored = StoredTrajectory {
            frames: std::mem::take(&mut self.frames),
            finished: self.finished,
        };
        self.files.lock().unwrap().insert(self.stem.clone(), stored);
    }
}
