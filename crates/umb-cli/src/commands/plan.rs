use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use umb_sampler::{RunConfig, WindowPlan};

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// YAML run configuration.
    #[arg(long)]
    pub config: PathBuf,
    /// Write the table here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run(args: &PlanArgs) -> Result<(), Box<dyn Error>> {
    let config = RunConfig::load(&args.config)?;
    let plan = WindowPlan::new(config.order_parameter_axes()?, config.protocol.clone());
    let json = serde_json::to_string_pretty(&plan.table())?;
    match &args.out {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}
