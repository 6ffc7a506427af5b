mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, validate::ValidateArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cli-integ",
    about = "Inspect and check CDK/SAM integration test fixtures",
    version,
    propagate_version = true
)]
struct Cli {
    /// Harness config file (default: ./cli-integ.yaml if present)
    #[arg(long, global = true, env = "CLI_INTEG_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Allocate fresh stack-name prefixes
    Prefix {
        #[arg(long, short = 'n', default_value = "1")]
        count: usize,
    },

    /// Pick a random port in [min, max)
    Port {
        #[arg(long, default_value = "30000")]
        min: u32,
        #[arg(long, default_value = "40000")]
        max: u32,
    },

    /// Check a synthesized template's asset metadata against descriptors
    Validate(ValidateArgs),

    /// Inspect the harness configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Prefix { count } => cmd::prefix::run(count, cli.json),
        Commands::Port { min, max } => cmd::prefix::port(min, max, cli.json),
        Commands::Validate(args) => cmd::validate::run(&args, cli.json),
        Commands::Config { subcommand } => {
            cmd::config::run(cli.config.as_deref(), subcommand, cli.json)
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
