use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use umb_engine::ReferenceEngine;
use umb_sampler::{
    LogObserver, RunConfig, RunManifest, RunObserver, RunOpts, Scheduler, WindowPlan,
    WindowState,
};
use umb_system::{MolecularSystem, Structure};
use umb_traj::DcdStore;

use crate::progress::WindowProgress;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML run configuration.
    #[arg(long)]
    pub config: PathBuf,
    /// JSON system definition with the restraint parameters.
    #[arg(long)]
    pub system: PathBuf,
    /// PDB file holding the reference pose.
    #[arg(long)]
    pub coords: PathBuf,
    /// Output directory for trajectories, manifest and summary.
    #[arg(long)]
    pub out: PathBuf,
    /// Override the configured worker count.
    #[arg(long)]
    pub workers: Option<usize>,
    /// Skip windows whose trajectory is already complete.
    #[arg(long)]
    pub resume: bool,
    /// Log each window instead of drawing a progress bar.
    #[arg(long)]
    pub no_progress: bool,
}

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let mut config = RunConfig::load(&args.config)?;
    if let Some(workers) = args.workers {
        config.execution.workers = workers;
    }
    config.execution.resume |= args.resume;
    config.validate()?;

    let system = MolecularSystem::load(&args.system)?;
    let structure = Structure::load_pdb(&args.coords)?;
    structure.check_compatible(&system)?;
    config.check_system(&system)?;
    let provenance = RunManifest::provenance(&config, &system, &structure)?;

    let plan = WindowPlan::new(config.order_parameter_axes()?, config.protocol.clone());
    let engine = ReferenceEngine::new(Arc::new(system), config.integrator, config.platform)?;
    let traj_dir = args.out.join(&config.output.trajectory_dir);
    fs::create_dir_all(&traj_dir)?;
    let store = DcdStore::new(
        &traj_dir,
        engine.system().num_particles(),
        config.protocol.steps_per_sample,
        config.integrator.step_size,
    )?;

    log::info!(
        "{} windows, {} engine steps, platform {:?}",
        plan.len(),
        plan.total_engine_steps(),
        engine.platform()
    );
    let progress = (!args.no_progress).then(|| WindowProgress::new(plan.len()));
    let observer: &dyn RunObserver = match &progress {
        Some(bar) => bar,
        None => &LogObserver,
    };
    let opts = RunOpts {
        workers: config.execution.workers,
        resume: config.execution.resume,
        ..RunOpts::default()
    };
    let outcome = Scheduler::new(
        &engine,
        &store,
        &plan,
        &structure.positions,
        config.seed_policy.master_seed,
    )
    .with_observer(observer)
    .run(&opts);
    if let Some(bar) = &progress {
        bar.finish();
    }

    let manifest = RunManifest::new(&config, provenance, &outcome);
    manifest.write(&args.out.join(&config.output.manifest_file))?;
    manifest.write_summary_csv(&args.out.join(&config.output.summary_file))?;

    log::info!(
        "complete {}, reused {}, failed {}, pending {}",
        outcome.count(WindowState::Complete),
        outcome.count(WindowState::Reused),
        outcome.count(WindowState::Failed),
        outcome.count(WindowState::Pending)
    );
    outcome.into_result()?;
    println!(
        "run written to {} (trajectories in {})",
        args.out.display(),
        store.dir().display()
    );
    Ok(())
}
