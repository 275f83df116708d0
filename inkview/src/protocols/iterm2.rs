// ABOUTME: iTerm2 inline image protocol renderer (OSC 1337)
// ABOUTME: Sends the whole file base64-encoded with its name, size and cell dimensions

use anyhow::Result;
use base64::{Engine, engine::general_purpose::STANDARD};
use inkview_core::{ContentKind, ResolvedImage};

use super::conversion::prepare;
use super::{RenderOptions, Renderable, RenderableFactory};

/// Formats iTerm2 decodes natively
const NATIVE_FORMATS: &[ContentKind] = &[
    ContentKind::Png,
    ContentKind::Jpeg,
    ContentKind::Gif,
    ContentKind::Tiff,
    ContentKind::Bmp,
];

#[derive(Debug, Default)]
pub struct ITerm2Renderer;

impl RenderableFactory for ITerm2Renderer {
    fn name(&self) -> &'static str {
        "iterm2"
    }

    fn render(&self, image: &ResolvedImage, options: &RenderOptions) -> Result<Renderable> {
        let prepared = prepare(image, options, NATIVE_FORMATS)?;
        let filename = file_name(&image.identity.cache_key());

        // \x1b]1337;File=name=<b64 name>;size=<bytes>;width=<cells>;height=<cells>;inline=1:<b64 data>\x07
        let payload = format!(
            "\x1b]1337;File=name={};size={};width={};height={};inline=1:{}\x07",
            STANDARD.encode(filename.as_bytes()),
            prepared.data.len(),
            prepared.columns,
            prepared.rows,
            STANDARD.encode(&prepared.data)
        );

        Ok(Renderable::new(self.name(), payload).with_size(prepared.columns, prepared.rows))
    }
}

/// Last path segment without query or fragment, for the `name` parameter
fn file_name(identity: &str) -> String {
    let path = identity.split(['?', '#']).next().unwrap_or(identity);
    match path.rsplit(['/', '\\']).next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "image".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::test_images::{encoded, png, resolved};
    use image::ImageFormat;

    #[test]
    fn test_file_name_extraction() {
        assert_eq!(file_name("https://example.com/path/to/image.jpg?param=value"), "image.jpg");
        assert_eq!(file_name("https://example.com/path/to/image.gif#fragment"), "image.gif");
        assert_eq!(file_name("/docs/img/screenshot.png"), "screenshot.png");
        assert_eq!(file_name("https://example.com/"), "image");
    }

    #[test]
    fn test_render_png_escape_sequence() {
        let image = png(16, 32);
        let renderable = ITerm2Renderer.render(&image, &RenderOptions::default()).unwrap();

        assert_eq!(renderable.protocol, "iterm2");
        assert!(renderable.payload.starts_with("\x1b]1337;File="));
        assert!(renderable.payload.contains(&format!("size={}", image.bytes.len())));
        assert!(renderable.payload.contains("width=2;height=2;inline=1:"));
        assert!(renderable.payload.contains(&STANDARD.encode("red.png")));
        assert!(renderable.payload.ends_with('\x07'));
    }

    #[test]
    fn test_native_jpeg_is_not_reencoded() {
        let image = resolved(encoded(8, 8, ImageFormat::Jpeg), "photo.jpg");
        let renderable = ITerm2Renderer.render(&image, &RenderOptions::default()).unwrap();
        assert!(renderable.payload.contains(&STANDARD.encode(&image.bytes)));
    }

    #[test]
    fn test_svg_is_an_error() {
        let svg = resolved(b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>".to_vec(), "logo.svg");
        assert!(ITerm2Renderer.render(&svg, &RenderOptions::default()).is_err());
    }
}
