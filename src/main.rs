use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nbpress::config::load_config;
use nbpress::print_err;
use nbpress::run::{preview_frontmatter, process_file};
use nbproc::ProcessorContext;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log every pass and cell decision
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the processor pipeline over a notebook
    Process {
        input: PathBuf,
        /// Where to write the result. Defaults to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Pipeline configuration. Defaults to nbpress.yml if present
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the front matter that would be inferred for a notebook
    Frontmatter { input: PathBuf },
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "nbpress=debug,nbproc=debug"
    } else {
        "nbpress=info,nbproc=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Process {
            input,
            output,
            config,
        } => {
            let dir = env::current_dir()?;
            let pipeline = load_config(config.as_deref(), &dir)
                .context("Error loading pipeline configuration:")?;
            process_file(
                &input,
                output.as_deref(),
                &pipeline,
                &ProcessorContext::default(),
            )
        }
        Commands::Frontmatter { input } => {
            if let Some(fm) = preview_frontmatter(&input)? {
                println!("{}", fm);
            }
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match print_err(run(cli)) {
        Some(()) => ExitCode::SUCCESS,
        None => ExitCode::FAILURE,
    }
}
