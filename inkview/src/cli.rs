// ABOUTME: CLI argument definitions for the inkview binary
// ABOUTME: Combines flags with the loaded config into fetcher, capability and color settings

use anyhow::Result;
use clap::Parser;
use inkview_core::FetcherConfig;
use std::io::IsTerminal;
use std::time::Duration;

use crate::capability::{self, CapabilityState};
use crate::config::{self, Config};

#[derive(Parser, Debug)]
#[command(name = "inkview")]
#[command(about = "View Markdown in the terminal with inline images", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Markdown file path or http(s) URL
    pub source: String,

    /// Show image placeholders instead of images
    #[arg(long)]
    pub no_images: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Force colored output even when piped
    #[arg(long, conflicts_with = "no_color")]
    pub force_color: bool,

    /// Timeout for remote fetches in seconds (or 30s, 2m)
    #[arg(long, value_name = "SECS", value_parser = config::parse_duration)]
    pub timeout: Option<Duration>,

    /// Largest image to download (e.g. 10MB, 512KB)
    #[arg(long, value_name = "SIZE", value_parser = config::parse_size)]
    pub max_image_size: Option<u64>,

    /// Enable verbose output for debugging
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    pub fn use_color(&self) -> bool {
        if self.force_color {
            return true;
        }
        !self.no_color
            && std::env::var_os("NO_COLOR").is_none()
            && std::env::var("TERM").unwrap_or_default() != "dumb"
            && std::io::stdout().is_terminal()
    }

    /// Flags and config decide before detection runs
    pub fn capability(&self, config: &Config) -> Result<CapabilityState> {
        if self.no_images || !config.inline_images_enabled() {
            return Ok(CapabilityState::disabled());
        }
        match config.protocol_override()? {
            Some(choice) => Ok(CapabilityState::forced(choice)),
            None => Ok(capability::probe()),
        }
    }

    /// Flags win over config, config over built-in defaults
    pub fn fetcher_config(&self, config: &Config) -> Result<FetcherConfig> {
        let defaults = FetcherConfig::default();
        let timeout = match self.timeout {
            Some(timeout) => timeout,
            None => config.fetch_timeout_duration()?.unwrap_or(defaults.timeout),
        };
        let max_bytes = match self.max_image_size {
            Some(bytes) => bytes,
            None => config.max_image_size_bytes()?.unwrap_or(defaults.max_bytes),
        };

        Ok(FetcherConfig::builder()
            .timeout(timeout)
            .max_bytes(max_bytes)
            .user_agent(config.user_agent.clone().unwrap_or(defaults.user_agent))
            .max_redirects(defaults.max_redirects)
            .build())
    }
}
