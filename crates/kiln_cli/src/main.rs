//! Kiln CLI — inspect and maintain a persistent compiled-artifact store.
//!
//! Provides `kiln stats` for store usage, `kiln verify` for finding malformed
//! records, `kiln clear` for bulk invalidation, `kiln show` for dumping one
//! record's parts, and `kiln digest` for computing the store digest of a key.

#![warn(missing_docs)]

mod clear;
mod digest;
mod show;
mod stats;
mod store;
mod verify;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Kiln — a compiled-artifact cache.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Kiln compiled-artifact cache")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory containing a `kiln.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Store directory, overriding configuration and environment.
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show record count and size of the store.
    Stats(StatsArgs),
    /// Check every record for structural defects.
    Verify(VerifyArgs),
    /// Delete every record in the store.
    Clear,
    /// Print the parts of one record.
    Show(ShowArgs),
    /// Compute the store digest for a program and key.
    Digest(DigestArgs),
}

/// Arguments for the `kiln stats` subcommand.
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Print machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `kiln verify` subcommand.
#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Delete records that fail verification.
    #[arg(long)]
    pub remove: bool,
}

/// Arguments for the `kiln show` subcommand.
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// 40-character hex digest of the record.
    pub digest: String,
}

/// Arguments for the `kiln digest` subcommand.
#[derive(Parser, Debug)]
pub struct DigestArgs {
    /// Program digest as 40 hex characters.
    #[arg(long)]
    pub program: String,

    /// Stage label (`vs`, `tcs`, `tes`, `gs`, `fs`, `cs`).
    #[arg(long)]
    pub category: String,

    /// Raw key bytes as hex.
    #[arg(long)]
    pub key: String,

    /// Also print the manifest the digest is computed over.
    #[arg(long)]
    pub manifest: bool,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Directory holding `kiln.toml`, if given.
    pub config: Option<PathBuf>,
    /// Explicit store directory, if given.
    pub dir: Option<PathBuf>,
}

fn init_logging(global: &GlobalArgs) {
    let filter = if global.verbose {
        EnvFilter::new("debug")
    } else if global.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
        dir: cli.dir,
    };
    init_logging(&global);

    let result = match cli.command {
        Command::Stats(ref args) => stats::run(args, &global),
        Command::Verify(ref args) => verify::run(args, &global),
        Command::Clear => clear::run(&global),
        Command::Show(ref args) => show::run(args, &global),
        Command::Digest(ref args) => digest::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
