use std::process::ExitCode;

use clap::{Parser, Subcommand};
use readmux::command;
use readmux::runtime::log::setup_logger;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging; RUST_LOG overrides
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Demultiplex FASTQ reads into per-sample outputs
    Demux(command::DemuxCMD),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logger(cli.verbose);

    let result = match cli.command {
        Commands::Demux(mut cmd) => cmd.try_execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
