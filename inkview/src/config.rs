// ABOUTME: Configuration file loading, validation, and hierarchical merging for inkview
// ABOUTME: Supports TOML config files with XDG Base Directory lookup and environment overrides

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capability::ProtocolOverride;
use crate::constants::{config as files, env as env_vars};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct Config {
    /// Show images at all; false behaves like --no-images
    #[serde(default)]
    pub inline_images: Option<bool>,
    #[serde(default, deserialize_with = "validate_protocol")]
    pub force_protocol: Option<String>,
    #[serde(default, deserialize_with = "validate_duration")]
    pub fetch_timeout: Option<String>,
    #[serde(default, deserialize_with = "validate_size")]
    pub max_image_size: Option<String>,
    /// Widest an image may be, in terminal columns
    #[serde(default)]
    pub max_image_width: Option<u16>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Config {
    /// Load configuration from standard locations, then apply environment overrides
    pub fn load() -> Result<Self> {
        let paths = Self::get_config_paths();
        let config = Self::load_from_paths(&paths.iter().map(|p| p.as_str()).collect::<Vec<_>>())?;
        config.with_env_overrides()
    }

    /// Load configuration from file paths, highest precedence first.
    /// Missing files are skipped; malformed files are errors.
    pub fn load_from_paths(paths: &[&str]) -> Result<Self> {
        let mut config = Config::default();

        // Apply lowest precedence first so earlier paths win
        for path in paths.iter().rev() {
            if !Path::new(path).exists() {
                continue;
            }
            let file_config = Self::load_from_file(path)?;
            log::debug!("Loaded config from {}", path);
            config = config.merge(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a single file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content).with_context(|| {
            format!(
                "Failed to parse TOML config file: {}",
                path.as_ref().display()
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get standard config file paths in order of precedence (highest first)
    pub fn get_config_paths() -> Vec<String> {
        let mut paths = Vec::new();

        // 1. Project-specific config (highest precedence)
        if let Ok(current_dir) = std::env::current_dir() {
            paths.push(
                current_dir
                    .join(files::PROJECT_FILE)
                    .to_string_lossy()
                    .to_string(),
            );
        }

        // 2. XDG config home
        if let Some(config_home) = std::env::var_os("XDG_CONFIG_HOME") {
            let path = PathBuf::from(config_home)
                .join(files::APP_DIR)
                .join(files::USER_FILE);
            paths.push(path.to_string_lossy().to_string());
        }

        // 3. User config directory fallback
        if let Some(home_dir) = dirs::home_dir() {
            let path = home_dir
                .join(".config")
                .join(files::APP_DIR)
                .join(files::USER_FILE);
            paths.push(path.to_string_lossy().to_string());
        }

        paths
    }

    /// Merge this config with another, giving precedence to the other config
    pub fn merge(self, other: Config) -> Config {
        Config {
            inline_images: other.inline_images.or(self.inline_images),
            force_protocol: other.force_protocol.or(self.force_protocol),
            fetch_timeout: other.fetch_timeout.or(self.fetch_timeout),
            max_image_size: other.max_image_size.or(self.max_image_size),
            max_image_width: other.max_image_width.or(self.max_image_width),
            user_agent: other.user_agent.or(self.user_agent),
        }
    }

    /// Environment variables beat config files
    pub fn with_env_overrides(self) -> Result<Self> {
        let from_env = Config {
            force_protocol: std::env::var(env_vars::FORCE_PROTOCOL).ok(),
            max_image_size: std::env::var(env_vars::MAX_IMAGE_SIZE).ok(),
            ..Default::default()
        };
        let merged = self.merge(from_env);
        merged
            .validate()
            .context("Invalid value in INKVIEW_* environment variables")?;
        Ok(merged)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        self.protocol_override()?;
        self.fetch_timeout_duration()?;
        self.max_image_size_bytes()?;

        if self.max_image_width == Some(0) {
            return Err(anyhow!("max_image_width must be at least 1 column"));
        }

        Ok(())
    }

    pub fn protocol_override(&self) -> Result<Option<ProtocolOverride>> {
        self.force_protocol
            .as_deref()
            .map(str::parse::<ProtocolOverride>)
            .transpose()
    }

    pub fn fetch_timeout_duration(&self) -> Result<Option<Duration>> {
        self.fetch_timeout.as_deref().map(parse_duration).transpose()
    }

    pub fn max_image_size_bytes(&self) -> Result<Option<u64>> {
        self.max_image_size.as_deref().map(parse_size).transpose()
    }

    pub fn inline_images_enabled(&self) -> bool {
        self.inline_images.unwrap_or(true)
    }
}

/// Parse `30s`, `2m`, `1h` or a bare number of seconds
pub fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    let (number, unit) = match value.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((index, _)) => value.split_at(index),
        None => (value, "s"),
    };

    let number: u64 = number
        .parse()
        .map_err(|_| anyhow!("Invalid duration format '{}'. Expected format like '30s', '2m'", value))?;

    let multiplier: u64 = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(anyhow!(
                "Invalid duration format '{}'. Must end with s, m, or h",
                value
            ));
        }
    };

    match number.checked_mul(multiplier) {
        Some(0) => Err(anyhow!("Duration '{}' must be greater than zero", value)),
        Some(seconds) => Ok(Duration::from_secs(seconds)),
        None => Err(anyhow!("Duration '{}' is too long", value)),
    }
}

/// Parse `10MB`, `512KB`, `1GB`, `2048B` or a bare byte count
pub fn parse_size(value: &str) -> Result<u64> {
    let value = value.trim();
    let upper = value.to_ascii_uppercase();
    let (number, unit) = match upper.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((index, _)) => upper.split_at(index),
        None => (upper.as_str(), "B"),
    };

    let number: u64 = number
        .parse()
        .map_err(|_| anyhow!("Invalid size '{}'. Expected format like '10MB', '512KB'", value))?;

    let multiplier: u64 = match unit.trim() {
        "B" => 1,
        "KB" | "K" => 1024,
        "MB" | "M" => 1024 * 1024,
        "GB" | "G" => 1024 * 1024 * 1024,
        _ => {
            return Err(anyhow!(
                "Invalid size '{}'. Unit must be B, KB, MB or GB",
                value
            ));
        }
    };

    match number.checked_mul(multiplier) {
        Some(0) => Err(anyhow!("Size '{}' must be greater than zero", value)),
        Some(bytes) => Ok(bytes),
        None => Err(anyhow!("Size '{}' is too large", value)),
    }
}

// Custom deserializers so a bad value names the key and file it came from
fn validate_protocol<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value: Option<String> = Option::deserialize(deserializer)?;
    if let Some(ref protocol) = value {
        protocol
            .parse::<ProtocolOverride>()
            .map_err(D::Error::custom)?;
    }
    Ok(value)
}

fn validate_duration<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value: Option<String> = Option::deserialize(deserializer)?;
    if let Some(ref duration) = value {
        parse_duration(duration).map_err(D::Error::custom)?;
    }
    Ok(value)
}

fn validate_size<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value: Option<String> = Option::deserialize(deserializer)?;
    if let Some(ref size) = value {
        parse_size(size).map_err(D::Error::custom)?;
    }
    Ok(value)
}
