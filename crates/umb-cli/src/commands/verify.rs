use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use umb_sampler::{RunConfig, WindowPlan};
use umb_system::MolecularSystem;
use umb_traj::{inspect, partial_path, trajectory_path};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// YAML run configuration used for the run.
    #[arg(long)]
    pub config: PathBuf,
    /// Run output directory.
    #[arg(long)]
    pub out: PathBuf,
    /// System definition; when given, atom counts are checked against it.
    #[arg(long)]
    pub system: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct TrajectoryCheck {
    window: String,
    status: &'static str,
    frames: usize,
    atoms: usize,
    partial: bool,
}

#[derive(Debug, Serialize)]
struct VerifyReport {
    windows: usize,
    ok: usize,
    checks: Vec<TrajectoryCheck>,
}

pub fn run(args: &VerifyArgs) -> Result<(), Box<dyn Error>> {
    let config = RunConfig::load(&args.config)?;
    let plan = WindowPlan::new(config.order_parameter_axes()?, config.protocol.clone());
    let mut expected_atoms = match &args.system {
        Some(path) => Some(MolecularSystem::load(path)?.num_particles()),
        None => None,
    };
    let traj_dir = args.out.join(&config.output.trajectory_dir);
    if !traj_dir.is_dir() {
        return Err(format!("no trajectory directory at {}", traj_dir.display()).into());
    }

    let mut checks = Vec::with_capacity(plan.len());
    for window in plan.windows() {
        let path = trajectory_path(&traj_dir, &window);
        let partial = partial_path(&path).exists();
        let mut check = TrajectoryCheck {
            window: window.file_stem(),
            status: "missing",
            frames: 0,
            atoms: 0,
            partial,
        };
        if path.exists() {
            match inspect(&path) {
                Ok(summary) => {
                    check.frames = summary.header.frames;
                    check.atoms = summary.header.atoms;
                    let atoms = *expected_atoms.get_or_insert(summary.header.atoms);
                    check.status = if !summary.consistent() {
                        "corrupt"
                    } else if summary.header.frames != config.protocol.production_samples {
                        "frame-count"
                    } else if summary.header.atoms != atoms {
                        "atom-count"
                    } else {
                        "ok"
                    };
                }
                Err(err) => {
                    log::warn!("{}: {}", path.display(), err);
                    check.status = "corrupt";
                }
            }
        }
        if check.status != "ok" {
            log::warn!("{}: {}", check.window, check.status);
        }
        checks.push(check);
    }

    let report = VerifyReport {
        windows: checks.len(),
        ok: checks.iter().filter(|check| check.status == "ok").count(),
        checks,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.ok != report.windows {
        return Err(format!(
            "{} of {} trajectories failed verification",
            report.windows - report.ok,
            report.windows
        )
        .into());
    }
    Ok(())
}
