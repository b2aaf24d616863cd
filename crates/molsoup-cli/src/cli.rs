use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "molsoup contributors",
    version,
    about = "molsoup CLI - run the particle chemistry sandbox headless and inspect element tables.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the simulation headless for a number of ticks and report the chemistry that emerged.
    Run(RunArgs),
    /// Inspect or export element tables.
    Elements(ElementsArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Element table to use instead of the built-in one.
    #[arg(short, long, value_name = "PATH")]
    pub elements: Option<PathBuf>,

    /// Number of ticks to simulate.
    #[arg(short, long, value_name = "INT")]
    pub ticks: Option<u64>,

    /// Number of atoms to spawn at random before the first tick.
    #[arg(short = 'n', long, value_name = "INT")]
    pub atoms: Option<usize>,

    /// Seed for every random stream in the simulation.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Override `physics.temperature`.
    #[arg(short = 'T', long, value_name = "FLOAT")]
    pub temperature: Option<f32>,

    /// Submit a snapshot for molecular analysis every N ticks.
    #[arg(long, value_name = "INT")]
    pub snapshot_interval: Option<u64>,

    /// Record a statistics sample every N ticks.
    #[arg(long, value_name = "INT")]
    pub sample_interval: Option<u64>,

    /// Restrict analysis to a region, given as `X0,Y0,X1,Y1`.
    #[arg(long, value_name = "X0,Y0,X1,Y1")]
    pub roi: Option<String>,

    /// Write the sampled statistics to a CSV file.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Disable the background molecular analysis entirely.
    #[arg(long)]
    pub no_analysis: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S physics.temperature=0.4
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `elements` subcommand.
#[derive(Args, Debug)]
pub struct ElementsArgs {
    #[command(subcommand)]
    pub command: ElementsCommands,
}

#[derive(Subcommand, Debug)]
pub enum ElementsCommands {
    /// Print the elements and their properties.
    List {
        /// Element table to print instead of the built-in one.
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
    /// Write the built-in element table to a TOML file as a starting point for editing.
    Export {
        #[arg(required = true, value_name = "PATH")]
        output: PathBuf,
        /// Overwrite the file if it already exists.
        #[arg(long)]
        force: bool,
    },
}
