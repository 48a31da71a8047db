#![recursion_limit = "256"]

mod cli;
mod application;
mod domain;
mod data;
mod ml;
mod infra;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use domain::error::PipelineError;

fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chip_design_llm=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    cli.run().inspect_err(|e| {
        if let Some(kind) = e.downcast_ref::<PipelineError>().map(PipelineError::kind) {
            tracing::error!("{kind}: {e:#}");
        }
    })
}
