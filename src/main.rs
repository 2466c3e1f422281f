use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{artifact, cache, config, error, run};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "courier")]
#[command(version = VERSION)]
#[command(about = "Run deployment command units against a remote host or this machine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task's command units (Init, Script, Copy, DownloadArtifact, Cleanup)
    Run(run::RunArgs),
    /// Artifact repository queries
    Artifact(artifact::ArtifactArgs),
    /// Local artifact cache maintenance
    Cache(cache::CacheArgs),
    /// Manage global Courier configuration
    Config(config::ConfigArgs),
    /// Describe error codes
    Error(error::ErrorArgs),
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("COURIER_LOG").unwrap_or_else(|_| EnvFilter::new("courier=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let global = GlobalArgs {};
    let (json_result, exit_code) = commands::run_json(cli.command, &global);

    if let Err(err) = output::print_json_result(json_result) {
        eprintln!("{}", err.message);
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
