// ABOUTME: Image preparation pipeline shared by the terminal protocols
// ABOUTME: Decodes, scales to the available cells and re-encodes formats a protocol cannot take

use anyhow::{Result, anyhow, bail};
use image::{DynamicImage, ImageFormat, imageops::FilterType};
use inkview_core::{ContentKind, ResolvedImage};
use std::io::Cursor;

use super::RenderOptions;
use crate::constants::geometry;

/// Bytes ready for a protocol payload plus the cells they will cover
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub data: Vec<u8>,
    pub format: ContentKind,
    pub columns: u16,
    pub rows: u16,
}

/// Decode and fit an image. Bytes are passed through untouched when the
/// format is in `passthrough` and no scaling is needed; otherwise they are
/// re-encoded as PNG.
pub fn prepare(
    image: &ResolvedImage,
    options: &RenderOptions,
    passthrough: &[ContentKind],
) -> Result<PreparedImage> {
    match image.kind {
        ContentKind::Svg => bail!("svg images cannot be displayed inline"),
        ContentKind::Unknown => bail!("unrecognized image format"),
        _ => {}
    }

    let decoded = image::load_from_memory(&image.bytes)
        .map_err(|e| anyhow!("cannot decode {} image: {}", image.kind, e))?;
    let (width, height) = (decoded.width(), decoded.height());
    if width == 0 || height == 0 {
        bail!("image has no pixels");
    }

    let target = target_dimensions(width, height, options);
    let (data, format) = match target {
        None if passthrough.contains(&image.kind) => (image.bytes.clone(), image.kind),
        None => (encode_png(&decoded)?, ContentKind::Png),
        Some((target_width, target_height)) => {
            log::debug!(
                "Scaling {} from {}x{} to {}x{}",
                image.identity,
                width,
                height,
                target_width,
                target_height
            );
            let scaled = decoded.resize(target_width, target_height, FilterType::Lanczos3);
            (encode_png(&scaled)?, ContentKind::Png)
        }
    };

    let (final_width, final_height) = target.unwrap_or((width, height));
    Ok(PreparedImage {
        data,
        format,
        columns: cells(final_width, geometry::CELL_WIDTH_PX),
        rows: cells(final_height, geometry::CELL_HEIGHT_PX),
    })
}

/// Pixel size that fits the available cells, or None if the image already fits
pub fn target_dimensions(width: u32, height: u32, options: &RenderOptions) -> Option<(u32, u32)> {
    let max_width = options.max_columns as u32 * geometry::CELL_WIDTH_PX;
    let max_height = options.max_rows as u32 * geometry::CELL_HEIGHT_PX;

    if width <= max_width && height <= max_height {
        return None;
    }

    // Smaller ratio so the image fits in both dimensions
    let ratio = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);
    Some((
        ((width as f64 * ratio) as u32).max(1),
        ((height as f64 * ratio) as u32).max(1),
    ))
}

fn cells(pixels: u32, cell: u32) -> u16 {
    pixels.div_ceil(cell).clamp(1, u16::MAX as u32) as u16
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| anyhow!("Failed to encode PNG: {}", e))?;
    Ok(buffer)
}
