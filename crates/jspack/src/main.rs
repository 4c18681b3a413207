use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use jspack::{
    bundle_emitter::LoaderStyle, config::Config, orchestrator::BundleOrchestrator,
    storage::FileSystem, transform::Target,
};
use log::debug;

/// Bundle an ES module entry point and everything it imports into one script
#[derive(Debug, Parser)]
#[command(name = "jspack", version, about, long_about = None)]
struct Cli {
    /// Entry module
    #[arg(short, long)]
    entry: Option<PathBuf>,

    /// Directory the bundle is written to
    #[arg(short = 'o', long)]
    output_dir: Option<PathBuf>,

    /// File name of the bundle inside the output directory
    #[arg(long)]
    output_file: Option<String>,

    /// Config file to use instead of ./jspack.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Language level of generated module code (es5, es2015)
    #[arg(long)]
    target: Option<Target>,

    /// Number of discovery worker threads
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Per-module build deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// How module code is stored in the bundle (eval, factory)
    #[arg(long)]
    loader: Option<LoaderStyle>,

    /// Print the bundle to stdout instead of writing it
    #[arg(long)]
    stdout: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Command line flags are the last configuration layer
    fn apply_to(&self, config: &mut Config) {
        if let Some(entry) = &self.entry {
            config.entry = Some(entry.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.output_directory.clone_from(dir);
        }
        if let Some(file) = &self.output_file {
            config.output_filename.clone_from(file);
        }
        if let Some(target) = self.target {
            config.target = target;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(loader) = self.loader {
            config.loader = loader;
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply_to(&mut config);
    debug!("Effective configuration: {config:?}");

    let cwd = std::env::current_dir().context("Failed to determine the working directory")?;
    let orchestrator = BundleOrchestrator::new(config, Arc::new(FileSystem), cwd);

    if cli.stdout {
        let output = orchestrator.build()?;
        let mut stdout = io::stdout().lock();
        stdout
            .write_all(output.bundle.text.as_bytes())
            .and_then(|()| stdout.flush())
            .context("Failed to write bundle to stdout")?;
    } else {
        let summary = orchestrator.bundle()?;
        log::info!(
            "Bundled {} module(s) from {} into {} (sha256 {})",
            summary.module_count,
            summary.entry,
            summary.output_path.display(),
            summary.hash
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Best effort: nothing sensible is left to do if stderr is gone
            let _ = writeln!(io::stderr(), "error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
