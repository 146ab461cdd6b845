use std::ops::Range;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use umb_core::errors::{ErrorInfo, UmbError};
use umb_core::{ContextFactory, SimulationContext, TrajectoryStore, Vec3, Window};

use crate::sampler::{Phase, WindowReport, WindowSampler};
use crate::windows::{partition, WindowIter, WindowPlan};

/// Shared flag checked between windows.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that every worker stop before its next window.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Options governing a scheduler run.
#[derive(Debug, Clone)]
pub struct RunOpts {
    /// Number of workers; one runs every window on a single context in order.
    pub workers: usize,
    /// Skip windows whose trajectory is already complete.
    pub resume: bool,
    /// Cooperative cancellation.
    pub cancel: CancelToken,
}

impl Default for RunOpts {
    fn default() -> Self {
        Self {
            workers: 1,
            resume: false,
            cancel: CancelToken::new(),
        }
    }
}

/// Receives progress notifications. Called from worker threads.
pub trait RunObserver: Sync {
    /// Run is about to start.
    fn run_started(&self, _total: usize, _workers: usize) {}

    /// A window is about to be processed.
    fn window_started(&self, _window: &Window, _total: usize) {}

    /// A window finished, was reused or failed.
    fn window_finished(&self, _outcome: &WindowOutcome, _total: usize) {}
}

/// Observer forwarding progress to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn run_started(&self, total: usize, workers: usize) {
        log::info!("sampling {total} windows with {workers} worker(s)");
    }

    fn window_started(&self, window: &Window, total: usize) {
        log::info!("window {}/{}: {}", window.linear_index + 1, total, window);
    }

    fn window_finished(&self, outcome: &WindowOutcome, _total: usize) {
        match outcome.state {
            WindowState::Failed => {
                if let Some(err) = &outcome.error {
                    log::error!("{} failed: {}", outcome.window, err);
                }
            }
            WindowState::Reused => {
                log::info!("{} reused ({} frames)", outcome.window, outcome.frames)
            }
            _ => log::debug!("{} complete ({} frames)", outcome.window, outcome.frames),
        }
    }
}

/// Lifecycle state of a window within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowState {
    /// Not attempted.
    Pending,
    /// Sampled to completion during this run.
    Complete,
    /// Completed by an earlier run and skipped.
    Reused,
    /// Aborted with an error.
    Failed,
}

impl WindowState {
    /// Lower-case label.
    pub fn label(&self) -> &'static str {
        match self {
            WindowState::Pending => "pending",
            WindowState::Complete => "complete",
            WindowState::Reused => "reused",
            WindowState::Failed => "failed",
        }
    }
}

/// What happened to one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowOutcome {
    /// Window identity.
    pub window: Window,
    /// Final state.
    pub state: WindowState,
    /// Trajectory location.
    pub file: PathBuf,
    /// Frames in the trajectory.
    pub frames: usize,
    /// Phases visited during this run.
    #[serde(default)]
    pub phases: Vec<Phase>,
    /// Energy after minimization.
    pub minimized_energy: Option<f64>,
    /// Energy after production.
    pub final_energy: Option<f64>,
    /// Error that aborted the window.
    pub error: Option<UmbError>,
}

impl WindowOutcome {
    fn pending(window: Window, file: PathBuf) -> Self {
        Self {
            window,
            state: WindowState::Pending,
            file,
            frames: 0,
            phases: Vec::new(),
            minimized_energy: None,
            final_energy: None,
            error: None,
        }
    }

    fn complete(&mut self, report: WindowReport) {
        self.state = WindowState::Complete;
        self.file = report.trajectory.path;
        self.frames = report.trajectory.frames;
        self.phases = report.phases;
        self.minimized_energy = Some(report.minimized_energy);
        self.final_energy = Some(report.final_energy);
    }
}

/// Every window's outcome plus the failure that stopped the run, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Outcomes in window order.
    pub windows: Vec<WindowOutcome>,
    /// Earliest failure in window order.
    pub failure: Option<UmbError>,
}

impl RunOutcome {
    /// Number of windows in `state`.
    pub fn count(&self, state: WindowState) -> usize {
        self.windows
            .iter()
            .filter(|outcome| outcome.state == state)
            .count()
    }

    /// Converts into the window outcomes, or the failure.
    pub fn into_result(self) -> Result<Vec<WindowOutcome>, UmbError> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.windows),
        }
    }
}

/// Drives every window of a plan through the sampler.
pub struct Scheduler<'a, F, S> {
    factory: &'a F,
    store: &'a S,
    plan: &'a WindowPlan,
    reference: &'a [Vec3],
    master_seed: u64,
    observer: &'a dyn RunObserver,
}

impl<'a, F, S> Scheduler<'a, F, S>
where
    F: ContextFactory,
    S: TrajectoryStore,
{
    /// Creates a scheduler that reports progress through [`LogObserver`].
    pub fn new(
        factory: &'a F,
        store: &'a S,
        plan: &'a WindowPlan,
        reference: &'a [Vec3],
        master_seed: u64,
    ) -> Self {
        Self {
            factory,
            store,
            plan,
            reference,
            master_seed,
            observer: &LogObserver,
        }
    }

    /// Replaces the progress observer.
    pub fn with_observer(mut self, observer: &'a dyn RunObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Runs every window. With more than one worker the index space is split
    /// into contiguous blocks, each sampled on its own context.
    pub fn run(&self, opts: &RunOpts) -> RunOutcome {
        let total = self.plan.len();
        let workers = opts.workers.clamp(1, total.max(1));
        self.observer.run_started(total, workers);
        if workers == 1 {
            return Self::merge(vec![self.run_block(0..total, opts)]);
        }
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
        {
            Ok(pool) => pool,
            Err(err) => {
                let windows = self.pending(0..total);
                return RunOutcome {
                    windows,
                    failure: Some(UmbError::Resource(
                        ErrorInfo::new("thread-pool", err.to_string())
                            .with_context("workers", workers.to_string()),
                    )),
                };
            }
        };
        let blocks: Vec<_> = pool.install(|| {
            (0..workers)
                .into_par_iter()
                .map(|worker| self.run_block(partition(total, workers, worker), opts))
                .collect()
        });
        Self::merge(blocks)
    }

    fn merge(blocks: Vec<(Vec<WindowOutcome>, Option<UmbError>)>) -> RunOutcome {
        let mut windows = Vec::new();
        let mut failure = None;
        for (outcomes, block_failure) in blocks {
            windows.extend(outcomes);
            if failure.is_none() {
                failure = block_failure;
            }
        }
        RunOutcome { windows, failure }
    }

    fn pending(&self, range: Range<usize>) -> Vec<WindowOutcome> {
        WindowIter::range(&self.plan.axes, range)
            .map(|window| {
                let file = self.store.location(&window);
                WindowOutcome::pending(window, file)
            })
            .collect()
    }

    fn prepare_context(&self) -> Result<F::Context, UmbError> {
        let mut context = self.factory.create_context()?;
        for axis in &self.plan.axes {
            context.set_parameter(axis.force_constant_parameter(), axis.force_constant())?;
        }
        Ok(context)
    }

    fn run_block(
        &self,
        range: Range<usize>,
        opts: &RunOpts,
    ) -> (Vec<WindowOutcome>, Option<UmbError>) {
        let total = self.plan.len();
        let mut outcomes = self.pending(range);
        if outcomes.is_empty() {
            return (outcomes, None);
        }
        let sampler = WindowSampler::new(&self.plan.protocol, self.reference, self.master_seed);
        let mut context = match self.prepare_context() {
            Ok(context) => context,
            Err(err) => {
                let first = &mut outcomes[0];
                first.state = WindowState::Failed;
                first.error = Some(err.clone());
                self.observer.window_finished(first, total);
                return (outcomes, Some(err));
            }
        };

        for slot in 0..outcomes.len() {
            let outcome = &mut outcomes[slot];
            if opts.cancel.is_cancelled() {
                let err = UmbError::Cancelled(
                    ErrorInfo::new("cancelled", "run cancelled at a window boundary")
                        .with_context("next_window", outcome.window.to_string()),
                );
                log::warn!("cancellation requested before {}", outcome.window);
                return (outcomes, Some(err));
            }
            self.observer.window_started(&outcome.window, total);
            match self.process(&mut context, &sampler, &outcome.window, opts.resume) {
                Ok(Processed::Reused(frames)) => {
                    outcome.state = WindowState::Reused;
                    outcome.frames = frames;
                }
                Ok(Processed::Sampled(report)) => outcome.complete(report),
                Err(err) => {
                    outcome.state = WindowState::Failed;
                    outcome.error = Some(err.clone());
                    self.observer.window_finished(outcome, total);
                    return (outcomes, Some(err));
                }
            }
            self.observer.window_finished(outcome, total);
        }
        (outcomes, None)
    }

    fn process(
        &self,
        context: &mut F::Context,
        sampler: &WindowSampler<'_>,
        window: &Window,
        resume: bool,
    ) -> Result<Processed, UmbError> {
        if resume {
            let expected = self.plan.protocol.production_samples;
            if self.store.completed_frames(window)? == Some(expected) {
                return Ok(Processed::Reused(expected));
            }
        }
        sampler.sample(context, self.store, window).map(Processed::Sampled)
    }
}

enum Processed {
    Reused(usize),
    Sampled(WindowReport),
}
