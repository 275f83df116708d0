// ABOUTME: Terminal image protocols that turn resolved bytes into mountable escape sequences
// ABOUTME: Defines the Renderable value and the RenderableFactory seam used by the capability probe

use anyhow::Result;
use crossterm::terminal::size as terminal_size;
use inkview_core::ResolvedImage;
use std::fmt;
use std::sync::Arc;

use crate::constants::geometry;

pub mod conversion;
pub mod iterm2;
pub mod kitty;

pub use iterm2::ITerm2Renderer;
pub use kitty::KittyRenderer;

/// Display content for a resolved image block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renderable {
    pub protocol: &'static str,
    /// Escape sequence (or other text) written to the terminal
    pub payload: String,
    /// Cells the image occupies once displayed
    pub columns: u16,
    pub rows: u16,
}

impl Renderable {
    pub fn new(protocol: &'static str, payload: impl Into<String>) -> Self {
        Self {
            protocol,
            payload: payload.into(),
            columns: 0,
            rows: 0,
        }
    }

    pub fn with_size(mut self, columns: u16, rows: u16) -> Self {
        self.columns = columns;
        self.rows = rows;
        self
    }
}

/// Space available to an image, in terminal cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub max_columns: u16,
    pub max_rows: u16,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_columns: geometry::DEFAULT_COLUMNS - geometry::MARGIN_COLUMNS * 2,
            max_rows: geometry::MAX_IMAGE_ROWS,
        }
    }
}

impl RenderOptions {
    /// Options sized to the current terminal, optionally capped at `max_width` columns
    pub fn for_terminal(max_width: Option<u16>) -> Self {
        let columns = match terminal_size() {
            Ok((columns, _rows)) => columns,
            Err(e) => {
                log::debug!("Failed to get terminal size, assuming {} columns: {}", geometry::DEFAULT_COLUMNS, e);
                geometry::DEFAULT_COLUMNS
            }
        };
        let available = columns.saturating_sub(geometry::MARGIN_COLUMNS * 2).max(1);

        Self {
            max_columns: max_width.map_or(available, |width| width.clamp(1, available)),
            max_rows: geometry::MAX_IMAGE_ROWS,
        }
    }
}

/// Turns resolved image bytes into a renderable for one terminal protocol.
///
/// Errors mean the bytes cannot be shown (undecodable, vector formats, too
/// large); the mount adapter turns them into placeholders.
pub trait RenderableFactory: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn render(&self, image: &ResolvedImage, options: &RenderOptions) -> Result<Renderable>;
}

/// Protocols the viewer can speak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Kitty,
    ITerm2,
}

impl Protocol {
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Kitty => "kitty",
            Protocol::ITerm2 => "iterm2",
        }
    }

    pub fn factory(&self) -> Arc<dyn RenderableFactory> {
        match self {
            Protocol::Kitty => Arc::new(KittyRenderer),
            Protocol::ITerm2 => Arc::new(ITerm2Renderer),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_factories() {
        assert_eq!(Protocol::Kitty.factory().name(), "kitty");
        assert_eq!(Protocol::ITerm2.factory().name(), "iterm2");
        assert_eq!(Protocol::ITerm2.to_string(), "iterm2");
    }

    #[test]
    fn test_render_options_respect_width_cap() {
        let options = RenderOptions::for_terminal(Some(10));
        assert!(options.max_columns <= 10);
        assert!(options.max_columns >= 1);
    }
}
