use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    plan::{self, PlanArgs},
    run::{self, RunArgs},
    verify::{self, VerifyArgs},
};

mod commands;
mod progress;

#[derive(Parser, Debug)]
#[command(name = "umbrella", about = "Umbrella sampling window scan", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample every window of the configured grid.
    Run(RunArgs),
    /// Print the window table without running anything.
    Plan(PlanArgs),
    /// Check frame and atom counts of every trajectory in a run directory.
    Verify(VerifyArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run::run(&args),
        Command::Plan(args) => plan::run(&args),
        Command::Verify(args) => verify::run(&args),
    }
}
