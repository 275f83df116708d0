// ABOUTME: End-to-end tests for the viewer against real files and a mock HTTP server
// ABOUTME: Covers relative resolution, single fetches, degradation and session isolation

use inkview::blocks::BlockState;
use inkview::capability::{CapabilityState, ProtocolOverride};
use inkview::protocols::Protocol;
use inkview::viewer::{DocumentSource, Viewer, ViewerOptions};
use inkview_core::{FetcherConfig, HttpFetcher};
use mockito::Server;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

const KITTY_START: &str = "\x1b_Ga=T";

fn kitty() -> CapabilityState {
    CapabilityState::forced(ProtocolOverride::Use(Protocol::Kitty))
}

fn viewer(capability: CapabilityState) -> Viewer {
    let config = FetcherConfig::builder()
        .timeout(Duration::from_secs(5))
        .build();
    let fetcher = HttpFetcher::new(config).expect("Should build HTTP client");
    Viewer::new(Arc::new(fetcher), capability, ViewerOptions::default())
}

fn write_png(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    image::RgbaImage::from_pixel(16, 16, image::Rgba([0, 120, 200, 255]))
        .save(path)
        .expect("Should write PNG");
}

fn png_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(8, 8, image::Rgba([1, 2, 3, 255])))
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn resolved_count(viewer: &Viewer) -> usize {
    viewer
        .document()
        .unwrap()
        .blocks()
        .iter()
        .filter(|block| {
            matches!(block, inkview::blocks::Block::Image(image) if matches!(image.state, BlockState::Resolved(_)))
        })
        .count()
}

#[tokio::test]
async fn test_local_images_resolve_relative_to_document() {
    let temp_dir = TempDir::new().unwrap();
    let docs = temp_dir.path().join("docs");
    write_png(&docs.join("img").join("diagram.png"));
    write_png(&temp_dir.path().join("shared").join("logo.png"));

    let document = docs.join("guide.md");
    std::fs::write(
        &document,
        "# Guide\n\n![diagram](img/diagram.png)\n\n![logo](../shared/logo.png)\n",
    )
    .unwrap();

    let mut viewer = viewer(kitty());
    viewer.open(DocumentSource::Path(document)).await.unwrap();
    viewer.settle().await;

    assert_eq!(resolved_count(&viewer), 2);
    assert_eq!(viewer.render().matches(KITTY_START).count(), 2);
    assert!(viewer.render().starts_with("# Guide"));
}

#[tokio::test]
async fn test_missing_local_image_shows_alt_text() {
    let temp_dir = TempDir::new().unwrap();
    let document = temp_dir.path().join("README.md");
    std::fs::write(&document, "![system overview](missing/overview.png)\n").unwrap();

    let mut viewer = viewer(kitty());
    viewer.open(DocumentSource::Path(document)).await.unwrap();
    viewer.settle().await;

    let output = viewer.render();
    assert!(output.contains("system overview"));
    assert!(output.contains("image not found"));
}

#[tokio::test]
async fn test_remote_document_images_fetched_once() {
    let mut server = Server::new_async().await;
    let doc_mock = server
        .mock("GET", "/docs/readme.md")
        .with_status(200)
        .with_header("content-type", "text/markdown")
        .with_body("![first](images/a.png)\n\n![second](/docs/images/a.png)\n\n![third](./images/a.png)\n")
        .create_async()
        .await;
    let image_mock = server
        .mock("GET", "/docs/images/a.png")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body(png_bytes())
        .expect(1)
        .create_async()
        .await;

    let url = Url::parse(&format!("{}/docs/readme.md", server.url())).unwrap();
    let mut viewer = viewer(kitty());
    viewer.open(DocumentSource::Url(url.clone())).await.unwrap();
    viewer.settle().await;

    doc_mock.assert_async().await;
    image_mock.assert_async().await;
    assert_eq!(resolved_count(&viewer), 3);
    assert_eq!(viewer.resolver().unwrap().len(), 1);
    assert_eq!(
        viewer.location(),
        Some(&inkview_core::Location::RemoteUrl(url))
    );
}

#[tokio::test]
async fn test_remote_image_error_degrades_to_placeholder() {
    let mut server = Server::new_async().await;
    let _image_mock = server
        .mock("GET", "/gone.png")
        .with_status(404)
        .create_async()
        .await;

    let url = Url::parse(&format!("{}/index.md", server.url())).unwrap();
    let mut viewer = viewer(kitty());
    viewer.show(
        "![removed screenshot](gone.png)\n",
        inkview_core::Location::RemoteUrl(url),
    );
    viewer.settle().await;

    assert_eq!(
        viewer.render(),
        "🖼 [removed screenshot] (HTTP 404 Not Found)"
    );
}

#[tokio::test]
async fn test_unavailable_capability_never_fetches() {
    let mut server = Server::new_async().await;
    let image_mock = server
        .mock("GET", "/a.png")
        .with_status(200)
        .with_body(png_bytes())
        .expect(0)
        .create_async()
        .await;

    let url = Url::parse(&format!("{}/index.md", server.url())).unwrap();
    let mut viewer = viewer(CapabilityState::disabled());
    viewer.show("![chart](a.png)\n", inkview_core::Location::RemoteUrl(url));
    viewer.settle().await;

    image_mock.assert_async().await;
    assert_eq!(viewer.render(), "🖼 [chart] (inline images disabled)");
}

#[tokio::test]
async fn test_mixed_paragraph_stays_inline_with_capability() {
    let temp_dir = TempDir::new().unwrap();
    write_png(&temp_dir.path().join("icon.png"));
    let document = temp_dir.path().join("notes.md");
    std::fs::write(&document, "Click ![gear](icon.png) to open settings.\n").unwrap();

    let mut viewer = viewer(kitty());
    viewer.open(DocumentSource::Path(document)).await.unwrap();
    viewer.settle().await;

    assert_eq!(viewer.render(), "Click 🖼 [gear] to open settings.");
    assert!(viewer.resolver().unwrap().is_empty());
}

#[tokio::test]
async fn test_sessions_do_not_leak_between_documents() {
    let temp_dir = TempDir::new().unwrap();
    let first_dir = temp_dir.path().join("first");
    let second_dir = temp_dir.path().join("second");
    write_png(&first_dir.join("pic.png"));
    std::fs::create_dir_all(&second_dir).unwrap();

    std::fs::write(first_dir.join("doc.md"), "![pic](pic.png)\n").unwrap();
    std::fs::write(second_dir.join("doc.md"), "![pic](pic.png)\n").unwrap();

    let mut viewer = viewer(kitty());
    viewer
        .open(DocumentSource::Path(first_dir.join("doc.md")))
        .await
        .unwrap();
    viewer.settle().await;
    assert_eq!(resolved_count(&viewer), 1);

    // Same src, different document directory: must not reuse the first image
    viewer
        .open(DocumentSource::Path(second_dir.join("doc.md")))
        .await
        .unwrap();
    viewer.settle().await;

    assert_eq!(resolved_count(&viewer), 0);
    assert_eq!(viewer.render(), "🖼 [pic] (image not found)");
    assert_eq!(viewer.generation(), 2);
}

#[tokio::test]
async fn test_failed_document_load_reports_context() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/missing.md")
        .with_status(500)
        .create_async()
        .await;

    let url = Url::parse(&format!("{}/missing.md", server.url())).unwrap();
    let mut viewer = viewer(kitty());
    let err = viewer.open(DocumentSource::Url(url)).await.unwrap_err();

    assert!(format!("{:#}", err).contains("Failed to fetch document"));
    assert!(format!("{:#}", err).contains("HTTP 500"));
}
