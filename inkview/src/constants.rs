// ABOUTME: Centralized constants for the inkview viewer
// ABOUTME: Terminal geometry, protocol limits, environment variable names and UI glyphs

/// Terminal cell geometry used when sizing images
pub mod geometry {
    /// Approximate character cell size in pixels; most terminals are close to 8x16
    pub const CELL_WIDTH_PX: u32 = 8;
    pub const CELL_HEIGHT_PX: u32 = 16;

    /// Width assumed when the terminal size cannot be queried
    pub const DEFAULT_COLUMNS: u16 = 80;

    /// Columns left free on each side of an image
    pub const MARGIN_COLUMNS: u16 = 2;

    /// Upper bound on image height in rows
    pub const MAX_IMAGE_ROWS: u16 = 40;
}

/// Kitty and iTerm2 protocol constants
pub mod protocol {
    /// Kitty payload chunk size; a multiple of 4 so base64 chunks stay aligned
    pub const KITTY_CHUNK_SIZE: usize = 4096;

    /// Kitty format code for PNG payloads
    pub const KITTY_FORMAT_PNG: u32 = 100;
}

/// Environment variables read by the viewer
pub mod env {
    pub const FORCE_PROTOCOL: &str = "INKVIEW_FORCE_PROTOCOL";
    pub const MAX_IMAGE_SIZE: &str = "INKVIEW_MAX_IMAGE_SIZE";

    /// Variables that identify a graphics-capable terminal
    pub const TERMINAL_IDENTITY: &[&str] = &["TERM_PROGRAM", "KITTY_WINDOW_ID", "WEZTERM_EXECUTABLE"];
}

/// UI and formatting constants
pub mod ui {
    /// Glyph used for inline image placeholders
    pub const IMAGE_GLYPH: &str = "🖼";

    /// Width of a horizontal rule
    pub const RULE_WIDTH: usize = 40;

    /// Marker printed before the href of a linked image
    pub const LINK_MARKER: &str = "↳";
}

/// Configuration file names
pub mod config {
    pub const PROJECT_FILE: &str = "inkview.toml";
    pub const APP_DIR: &str = "inkview";
    pub const USER_FILE: &str = "config.toml";
}
