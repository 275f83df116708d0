// ABOUTME: Main entry point for the inkview terminal Markdown viewer
// ABOUTME: Loads config, opens the document, waits for images and prints the result

use anyhow::Result;
use clap::Parser;
use inkview::cli::Cli;
use inkview::config::Config;
use inkview::protocols::RenderOptions;
use inkview::viewer::{DocumentSource, Viewer, ViewerOptions};
use inkview_core::{HttpFetcher, ResolutionError};
use owo_colors::OwoColorize;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        if let Some(help) = e
            .downcast_ref::<ResolutionError>()
            .and_then(ResolutionError::help_text)
        {
            eprintln!("{}", help.dimmed());
        }
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise warnings, or debug with --verbose
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    let fetcher = HttpFetcher::new(cli.fetcher_config(&config)?)?;
    let options = ViewerOptions {
        render: RenderOptions::for_terminal(config.max_image_width),
        use_color: cli.use_color(),
    };
    let mut viewer = Viewer::new(Arc::new(fetcher), cli.capability(&config)?, options);

    viewer.open(DocumentSource::parse(&cli.source)).await?;
    viewer.settle().await;
    println!("{}", viewer.render());

    Ok(())
}
