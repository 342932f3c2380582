use clap::{crate_version, Parser};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

mod cgprna_commands;
mod defaults;
mod utils;

use cgprna_commands::*;
use utils::prog_utils::ShellExecutor;

/// run the cgpRna RNA-Seq mapping, QC, counting and fusion-detection pipelines
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn main() -> anyhow::Result<()> {
    // Check the `RUST_LOG` variable for the logger level and
    // respect the value found there. If this environment
    // variable is not set then set the logging level to
    // INFO.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli_args = Cli::parse();

    // tool output is streamed to stdout, logs go to stderr
    match cli_args.command {
        Commands::Map(opts) => map_seq_files(opts, ShellExecutor::stdout()),
        Commands::Stats(opts) => generate_stats(opts, ShellExecutor::stdout()),
        Commands::Bigwig(opts) => generate_bigwig(opts, ShellExecutor::stdout()),
        Commands::Count(opts) => count_genes(opts, ShellExecutor::stdout()),
        Commands::TophatFusion(opts) => {
            run_fusion(FusionTool::TophatFusion, opts, ShellExecutor::stdout())
        }
        Commands::StarFusion(opts) => {
            run_fusion(FusionTool::StarFusion, opts, ShellExecutor::stdout())
        }
        Commands::Defuse(opts) => run_fusion(FusionTool::Defuse, opts, ShellExecutor::stdout()),
        Commands::Inspect {} => inspect_tools(crate_version!()),
    }
}
