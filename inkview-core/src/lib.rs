// ABOUTME: inkview-core resolves image references found in Markdown documents
// ABOUTME: Exposes locations, the fetcher boundary, and the de-duplicating resource resolver

pub mod constants;
pub mod content;
pub mod error;
pub mod fetcher;
pub mod location;
pub mod resolver;

pub use content::ContentKind;
pub use error::ResolutionError;
pub use fetcher::{FetchedBytes, FetcherConfig, HttpFetcher, ResourceFetcher};
pub use location::{ImageReference, Location, ResourceIdentity};
pub use resolver::{ResolvedImage, ResolvedResource, ResourceResolver};
