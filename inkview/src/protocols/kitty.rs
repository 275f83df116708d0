// ABOUTME: Kitty terminal graphics protocol renderer
// ABOUTME: Transmits PNG data base64-encoded in chunks and places it over a fixed cell area

use anyhow::{Result, anyhow};
use base64::{Engine, engine::general_purpose::STANDARD};
use inkview_core::{ContentKind, ResolvedImage};

use super::conversion::prepare;
use super::{RenderOptions, Renderable, RenderableFactory};
use crate::constants::protocol::{KITTY_CHUNK_SIZE, KITTY_FORMAT_PNG};

#[derive(Debug, Default)]
pub struct KittyRenderer;

impl RenderableFactory for KittyRenderer {
    fn name(&self) -> &'static str {
        "kitty"
    }

    fn render(&self, image: &ResolvedImage, options: &RenderOptions) -> Result<Renderable> {
        // Kitty only takes PNG (f=100) or raw pixels, so everything else is re-encoded
        let prepared = prepare(image, options, &[ContentKind::Png])?;
        let payload = encode(&prepared.data, prepared.columns, prepared.rows)?;
        Ok(Renderable::new(self.name(), payload).with_size(prepared.columns, prepared.rows))
    }
}

fn encode(png: &[u8], columns: u16, rows: u16) -> Result<String> {
    let base64_data = STANDARD.encode(png);
    let chunks = base64_data
        .as_bytes()
        .chunks(KITTY_CHUNK_SIZE)
        .map(std::str::from_utf8)
        .collect::<Result<Vec<&str>, _>>()
        .map_err(|e| anyhow!("Failed to convert base64 chunk to UTF-8: {}", e))?;

    let mut output = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let more = if i + 1 < chunks.len() { 1 } else { 0 };
        if i == 0 {
            // First chunk carries the action, format and placement size
            output.push_str(&format!(
                "\x1b_Ga=T,q=2,f={},c={},r={},m={};{}\x1b\\",
                KITTY_FORMAT_PNG, columns, rows, more, chunk
            ));
        } else {
            output.push_str(&format!("\x1b_Gm={};{}\x1b\\", more, chunk));
        }
    }

    Ok(output)
}
