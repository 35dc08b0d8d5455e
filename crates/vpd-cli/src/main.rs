mod client;
mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, overrides::OverrideSubcommand, policy::PolicySubcommand,
    stage::StageSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "vpdctl",
    about = "Grow-tent VPD controller: run the control loop, inspect and steer it",
    version,
    propagate_version = true
)]
struct Cli {
    /// Controller root (default: auto-detect from .vpd/)
    #[arg(long, global = true, env = "VPD_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Device proxy base URL (overrides devices.proxy_url)
    #[arg(long, global = true, env = "VPD_PROXY_URL")]
    proxy_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and empty controller state
    Init,

    /// Run the control loop and the status API until Ctrl-C
    Run {
        /// API port (overrides server.port; 0 = OS-assigned)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Compute air and leaf VPD for a reading
    Calc {
        /// Air temperature in °C
        air: f64,
        /// Relative humidity in %
        humidity: f64,
        /// Leaf temperature in °C (default: air - 1.0)
        #[arg(long)]
        leaf: Option<f64>,
        /// Leaf VPD target; prints the humidity that reaches it
        #[arg(long)]
        target: Option<f64>,
    },

    /// List configured grow stages
    Stages,

    /// Inspect and validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Query the learned policy table offline
    Policy {
        #[command(subcommand)]
        subcommand: PolicySubcommand,
    },

    /// Show the running controller's status
    Status,

    /// Manage manual overrides on the running controller
    Override {
        #[command(subcommand)]
        subcommand: OverrideSubcommand,
    },

    /// Change the running controller's grow stage
    Stage {
        #[command(subcommand)]
        subcommand: StageSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Run { port } => cmd::run::run(&root, cli.proxy_url.as_deref(), port),
        Commands::Calc {
            air,
            humidity,
            leaf,
            target,
        } => cmd::calc::run(air, humidity, leaf, target, cli.json),
        Commands::Stages => cmd::stages::run(&root, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Policy { subcommand } => cmd::policy::run(&root, subcommand, cli.json),
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Override { subcommand } => cmd::overrides::run(&root, subcommand, cli.json),
        Commands::Stage { subcommand } => cmd::stage::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
