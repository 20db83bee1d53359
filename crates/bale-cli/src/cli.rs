use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "bale",
    author,
    version,
    about = "Bundle code and pip dependencies into deployable zip artifacts"
)]
pub struct BaleCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)")]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(
        long,
        value_name = "PATH",
        help = "Store cache entries and artifacts under PATH (overrides BALE_BUILD_DIR)",
        global = true
    )]
    pub build_dir: Option<PathBuf>,
    #[arg(
        long,
        help = "Skip dependency installation and emit a valid empty archive",
        global = true
    )]
    pub skip_install: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        about = "Build a dependency-only layer artifact (packages under python/)",
        override_usage = "bale layer -r REQUIREMENTS [-r REQUIREMENTS ...]"
    )]
    Layer(LayerArgs),
    #[command(
        about = "Build a function artifact from code directories plus optional dependencies",
        override_usage = "bale function -c DIR [-c DIR ...] [-r REQUIREMENTS ...] [--exclude GLOB ...]"
    )]
    Function(FunctionArgs),
}

#[derive(Args, Debug)]
pub struct LayerArgs {
    #[arg(
        short = 'r',
        long = "requirements",
        value_name = "FILE",
        required = true,
        help = "Requirement manifest to merge into the layer"
    )]
    pub requirements: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct FunctionArgs {
    #[arg(
        short = 'c',
        long = "code",
        value_name = "DIR",
        required = true,
        help = "Code directory to include under its final path segment"
    )]
    pub code: Vec<PathBuf>,
    #[arg(
        short = 'r',
        long = "requirements",
        value_name = "FILE",
        help = "Requirement manifest to install alongside the code"
    )]
    pub requirements: Vec<PathBuf>,
    #[arg(
        long = "exclude",
        value_name = "GLOB",
        help = "Glob pattern to skip when copying code (in addition to __pycache__)"
    )]
    pub exclude: Vec<String>,
}
