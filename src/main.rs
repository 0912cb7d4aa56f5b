//! CLI that runs a grain script, printing its output to stdout.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use grain::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "grain")]
#[command(about = "Run a grain record extraction script", long_about = None)]
struct Cli {
    /// Script to run
    script: PathBuf,

    /// Bytes read from a data file at a time
    #[arg(long, default_value_t = grain::reader::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Log more to stderr (-v debug, -vv trace); GRAIN_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GRAIN_LOG").unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let path = cli.script.display();
    let source = match fs::read(&cli.script) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = Config::new().with_chunk_size(cli.chunk_size);
    match grain::run(&source, config, io::stdout().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{path}: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
