// ABOUTME: Terminal capability probe for inline images, memoized for the process lifetime
// ABOUTME: Detection runs behind a scoped environment shim and never panics or errors outward

use anyhow::{Result, anyhow};
use once_cell::sync::OnceCell;
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::io::IsTerminal;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;

use crate::constants::env as env_vars;
use crate::protocols::{Protocol, RenderableFactory};

/// Whether this process can show images, and how
#[derive(Clone)]
pub enum CapabilityState {
    Available(Arc<dyn RenderableFactory>),
    Unavailable(String),
}

impl CapabilityState {
    /// State used when images are turned off by flag or config
    pub fn disabled() -> Self {
        CapabilityState::Unavailable("inline images disabled".to_string())
    }

    pub fn forced(choice: ProtocolOverride) -> Self {
        match choice {
            ProtocolOverride::Use(protocol) => CapabilityState::Available(protocol.factory()),
            ProtocolOverride::Disabled => CapabilityState::disabled(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, CapabilityState::Available(_))
    }

    pub fn factory(&self) -> Option<&Arc<dyn RenderableFactory>> {
        match self {
            CapabilityState::Available(factory) => Some(factory),
            CapabilityState::Unavailable(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            CapabilityState::Available(_) => None,
            CapabilityState::Unavailable(reason) => Some(reason),
        }
    }
}

impl fmt::Debug for CapabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityState::Available(factory) => write!(f, "Available({})", factory.name()),
            CapabilityState::Unavailable(reason) => write!(f, "Unavailable({:?})", reason),
        }
    }
}

/// A protocol choice made by the user instead of detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolOverride {
    Use(Protocol),
    Disabled,
}

impl FromStr for ProtocolOverride {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "kitty" => Ok(ProtocolOverride::Use(Protocol::Kitty)),
            "iterm2" => Ok(ProtocolOverride::Use(Protocol::ITerm2)),
            "none" | "disable" | "disabled" => Ok(ProtocolOverride::Disabled),
            other => Err(anyhow!(
                "Unknown protocol '{}'. Valid values: kitty, iterm2, none",
                other
            )),
        }
    }
}

static CAPABILITY: OnceCell<CapabilityState> = OnceCell::new();

/// Capability of the current process. The first call detects, later calls
/// return the memoized state.
pub fn probe() -> CapabilityState {
    CAPABILITY
        .get_or_init(|| probe_with(std::io::stdout().is_terminal(), detect_state))
        .clone()
}

/// Run `detector` and turn any failure, panics included, into `Unavailable`.
/// When stdout is not a terminal the detector sees a "no TTY" environment.
pub fn probe_with<F>(stdout_is_tty: bool, detector: F) -> CapabilityState
where
    F: FnOnce() -> Result<CapabilityState>,
{
    let outcome = {
        let _shim = (!stdout_is_tty).then(ScopedEnv::no_tty);
        panic::catch_unwind(AssertUnwindSafe(detector))
    };

    match outcome {
        Ok(Ok(state)) => {
            log::debug!("Image capability: {:?}", state);
            state
        }
        Ok(Err(e)) => {
            log::debug!("Capability detection failed: {}", e);
            CapabilityState::Unavailable(format!("capability detection failed: {}", e))
        }
        Err(_) => {
            log::debug!("Capability detection panicked");
            CapabilityState::Unavailable("capability detection failed".to_string())
        }
    }
}

fn detect_state() -> Result<CapabilityState> {
    Ok(TerminalCapabilities::detect().into_state())
}

/// Temporarily overridden environment variables, restored on drop
pub struct ScopedEnv {
    saved: Vec<(String, Option<OsString>)>,
}

impl ScopedEnv {
    pub fn new() -> Self {
        Self { saved: Vec::new() }
    }

    /// Deterministic environment of a process without a terminal
    pub fn no_tty() -> Self {
        let mut scoped = Self::new();
        scoped.set("TERM", "dumb");
        for var in env_vars::TERMINAL_IDENTITY {
            scoped.remove(var);
        }
        scoped
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.save(key);
        env::set_var(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.save(key);
        env::remove_var(key);
    }

    /// Remember only the first value seen, so restore returns the original
    fn save(&mut self, key: &str) {
        if !self.saved.iter().any(|(saved, _)| saved == key) {
            self.saved.push((key.to_string(), env::var_os(key)));
        }
    }
}

impl Default for ScopedEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..).rev() {
            match value {
                Some(value) => env::set_var(&key, value),
                None => env::remove_var(&key),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TerminalCapabilities {
    pub supports_kitty_images: bool,
    pub supports_iterm2_images: bool,
    pub terminal_name: String,
}

impl TerminalCapabilities {
    pub fn detect() -> Self {
        // User override first
        if let Ok(forced) = env::var(env_vars::FORCE_PROTOCOL) {
            match forced.parse::<ProtocolOverride>() {
                Ok(choice) => return Self::from_override(choice),
                Err(e) => log::warn!("Ignoring {}: {}", env_vars::FORCE_PROTOCOL, e),
            }
        }

        let term_program = env::var("TERM_PROGRAM").unwrap_or_default();
        let term = env::var("TERM").unwrap_or_default();
        let wezterm_exe = env::var("WEZTERM_EXECUTABLE").ok();
        let kitty_window_id = env::var("KITTY_WINDOW_ID").ok();

        Self {
            supports_kitty_images: detect_kitty_support(
                &term_program,
                &term,
                wezterm_exe.as_deref(),
                kitty_window_id.as_deref(),
            ),
            supports_iterm2_images: detect_iterm2_support(&term_program, &term),
            terminal_name: determine_terminal_name(&term_program, &term),
        }
    }

    fn from_override(choice: ProtocolOverride) -> Self {
        let (kitty, iterm2, name) = match choice {
            ProtocolOverride::Use(Protocol::Kitty) => (true, false, "kitty"),
            ProtocolOverride::Use(Protocol::ITerm2) => (false, true, "iterm2"),
            ProtocolOverride::Disabled => (false, false, "none"),
        };
        Self {
            supports_kitty_images: kitty,
            supports_iterm2_images: iterm2,
            terminal_name: format!("forced-{}", name),
        }
    }

    /// Kitty wins when a terminal speaks both
    pub fn preferred_protocol(&self) -> Option<Protocol> {
        if self.supports_kitty_images {
            Some(Protocol::Kitty)
        } else if self.supports_iterm2_images {
            Some(Protocol::ITerm2)
        } else {
            None
        }
    }

    pub fn into_state(self) -> CapabilityState {
        match self.preferred_protocol() {
            Some(protocol) => CapabilityState::Available(protocol.factory()),
            None => CapabilityState::Unavailable(format!(
                "{} does not support inline images",
                self.terminal_name
            )),
        }
    }
}

fn detect_kitty_support(
    term_program: &str,
    term: &str,
    wezterm_exe: Option<&str>,
    kitty_window_id: Option<&str>,
) -> bool {
    if term_program == "kitty" || kitty_window_id.is_some() {
        return true;
    }

    if term_program == "WezTerm" || wezterm_exe.is_some() {
        return true;
    }

    if term_program == "ghostty" {
        return true;
    }

    term.contains("kitty") || term.contains("ghostty")
}

fn detect_iterm2_support(term_program: &str, term: &str) -> bool {
    if matches!(
        term_program,
        "iTerm.app" | "WezTerm" | "mintty" | "Hyper" | "Warp" | "Tabby"
    ) {
        return true;
    }

    term.contains("iterm")
}

fn determine_terminal_name(term_program: &str, term: &str) -> String {
    if !term_program.is_empty() {
        term_program.to_string()
    } else if !term.is_empty() {
        term.to_string()
    } else {
        "unknown terminal".to_string()
    }
}
