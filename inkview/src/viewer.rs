// ABOUTME: Viewer session: opens documents, spawns image resolution and applies mount events
// ABOUTME: Each opened document gets a fresh generation, resolver cache and task set

use anyhow::{Context, Result};
use inkview_core::{Location, ResolutionError, ResolvedResource, ResourceFetcher, ResourceResolver};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{self, JoinError, JoinSet};
use url::Url;

use crate::blocks::{BlockBuilder, BlockId};
use crate::capability::CapabilityState;
use crate::document::Document;
use crate::markdown;
use crate::protocols::RenderOptions;

/// Where a document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Path(PathBuf),
    Url(Url),
    /// Markdown already in memory, with the location its images resolve against
    Inline { markdown: String, location: Location },
}

impl DocumentSource {
    /// Interpret a command-line argument: http(s) and file URLs, otherwise a path
    pub fn parse(source: &str) -> Self {
        match Url::parse(source) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => DocumentSource::Url(url),
            Ok(url) if url.scheme() == "file" => match url.to_file_path() {
                Ok(path) => DocumentSource::Path(path),
                Err(()) => DocumentSource::Path(PathBuf::from(source)),
            },
            _ => DocumentSource::Path(PathBuf::from(source)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewerOptions {
    pub render: RenderOptions,
    pub use_color: bool,
}

/// Outcome of one resolution task, addressed to a block of one session
#[derive(Debug)]
pub struct MountEvent {
    pub generation: u64,
    pub block: BlockId,
    pub outcome: ResolvedResource,
}

struct Session {
    location: Location,
    resolver: Arc<ResourceResolver>,
    document: Document,
    // Dropping the set aborts every task still running
    tasks: JoinSet<()>,
    task_blocks: HashMap<task::Id, BlockId>,
}

/// What `settle` woke up for
enum Wakeup {
    Event(MountEvent),
    TaskEnded(Result<task::Id, JoinError>),
    Idle,
}

pub struct Viewer {
    fetcher: Arc<dyn ResourceFetcher>,
    capability: CapabilityState,
    options: ViewerOptions,
    generation: u64,
    session: Option<Session>,
    events_tx: mpsc::UnboundedSender<MountEvent>,
    events_rx: mpsc::UnboundedReceiver<MountEvent>,
}

impl Viewer {
    pub fn new(
        fetcher: Arc<dyn ResourceFetcher>,
        capability: CapabilityState,
        options: ViewerOptions,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            fetcher,
            capability,
            options,
            generation: 0,
            session: None,
            events_tx,
            events_rx,
        }
    }

    /// Load a document and start a new session for it
    pub async fn open(&mut self, source: DocumentSource) -> Result<u64> {
        let (markdown, location) = self.load(source).await?;
        Ok(self.show(&markdown, location))
    }

    async fn load(&self, source: DocumentSource) -> Result<(String, Location)> {
        match source {
            DocumentSource::Path(path) => {
                let markdown = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read document: {}", path.display()))?;
                Ok((markdown, Location::for_document_path(&path)))
            }
            DocumentSource::Url(url) => {
                let markdown = self
                    .fetcher
                    .fetch_text(&url)
                    .await
                    .with_context(|| format!("Failed to fetch document: {}", url))?;
                Ok((markdown, Location::for_document_url(url)))
            }
            DocumentSource::Inline { markdown, location } => Ok((markdown, location)),
        }
    }

    /// Replace the current session with one for `markdown` at `location`.
    /// Must be called inside a Tokio runtime; returns the new generation.
    pub fn show(&mut self, markdown: &str, location: Location) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        log::debug!("Location changed to {} (session {})", location, generation);

        // Abort the previous session's tasks before its cache goes away
        self.session = None;

        let builder = BlockBuilder::new(
            self.capability.clone(),
            location.clone(),
            self.options.use_color,
        );
        let document = Document::new(generation, builder.build_all(&markdown::parse(markdown)));
        let resolver = Arc::new(ResourceResolver::new(Arc::clone(&self.fetcher)));

        let mut tasks = JoinSet::new();
        let mut task_blocks = HashMap::new();
        for image in document.pending() {
            let resolver = Arc::clone(&resolver);
            let events = self.events_tx.clone();
            let reference = image.reference.clone();
            let block = image.id;

            let handle = tasks.spawn(async move {
                let outcome = resolver.resolve(&reference).await;
                if events
                    .send(MountEvent {
                        generation,
                        block,
                        outcome,
                    })
                    .is_err()
                {
                    log::debug!("Viewer closed before block {:?} resolved", block);
                }
            });
            task_blocks.insert(handle.id(), block);
        }
        log::debug!("Session {} started {} image resolutions", generation, tasks.len());

        self.session = Some(Session {
            location,
            resolver,
            document,
            tasks,
            task_blocks,
        });
        generation
    }

    /// Mount one event. Events from earlier sessions are dropped.
    pub fn apply(&mut self, event: MountEvent) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        if event.generation != session.document.generation() {
            log::debug!(
                "Dropping stale mount for {:?} from session {}",
                event.block,
                event.generation
            );
            return false;
        }

        session
            .document
            .mount(event.block, &event.outcome, &self.capability, &self.options.render)
    }

    /// Apply events until every image block of the current session has settled.
    /// A resolution task that dies without reporting fails its block.
    pub async fn settle(&mut self) {
        loop {
            let Some(session) = self.session.as_mut() else {
                return;
            };
            if session.document.is_settled() {
                return;
            }

            let wakeup = tokio::select! {
                Some(event) = self.events_rx.recv() => Wakeup::Event(event),
                Some(joined) = session.tasks.join_next_with_id() => {
                    Wakeup::TaskEnded(joined.map(|(id, ())| id))
                }
                else => Wakeup::Idle,
            };

            match wakeup {
                Wakeup::Event(event) => {
                    self.apply(event);
                }
                // Finished tasks already sent their event
                Wakeup::TaskEnded(Ok(_)) => {}
                Wakeup::TaskEnded(Err(err)) => self.fail_task(err),
                Wakeup::Idle => return,
            }
        }
    }

    fn fail_task(&mut self, err: JoinError) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(block) = session.task_blocks.get(&err.id()).copied() else {
            return;
        };

        log::warn!("Image resolution for block {:?} failed: {}", block, err);
        let outcome: ResolvedResource = Err(ResolutionError::FetchFailed(
            "image loader failed".to_string(),
        ));
        session
            .document
            .mount(block, &outcome, &self.capability, &self.options.render);
    }

    /// Terminal output for the current document; pending images show their caption
    pub fn render(&self) -> String {
        self.session
            .as_ref()
            .map(|session| session.document.render(self.options.use_color))
            .unwrap_or_default()
    }

    pub fn document(&self) -> Option<&Document> {
        self.session.as_ref().map(|session| &session.document)
    }

    pub fn location(&self) -> Option<&Location> {
        self.session.as_ref().map(|session| &session.location)
    }

    pub fn resolver(&self) -> Option<&ResourceResolver> {
        self.session.as_ref().map(|session| session.resolver.as_ref())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn capability(&self) -> &CapabilityState {
        &self.capability
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockState;
    use crate::protocols::{Renderable, RenderableFactory};
    use async_trait::async_trait;
    use inkview_core::{FetchedBytes, ResolutionError, ResolvedImage};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory files keyed by absolute path; counts reads
    struct MemoryFetcher {
        files: HashMap<PathBuf, Vec<u8>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl MemoryFetcher {
        fn new(files: &[(&str, &[u8])], delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                files: files
                    .iter()
                    .map(|(path, bytes)| (PathBuf::from(path), bytes.to_vec()))
                    .collect(),
                delay,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResourceFetcher for MemoryFetcher {
        async fn read_file(&self, path: &Path) -> Result<FetchedBytes, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.files
                .get(path)
                .map(|bytes| FetchedBytes {
                    bytes: bytes.clone(),
                    content_type: None,
                })
                .ok_or_else(|| ResolutionError::NotFound(path.display().to_string()))
        }

        async fn fetch_url(&self, url: &Url) -> Result<FetchedBytes, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ResolutionError::FetchFailed(format!("offline: {}", url)))
        }
    }

    /// Fetcher whose reads blow up for one file name
    struct PanickingFetcher {
        inner: Arc<MemoryFetcher>,
        poisoned: &'static str,
    }

    #[async_trait]
    impl ResourceFetcher for PanickingFetcher {
        async fn read_file(&self, path: &Path) -> Result<FetchedBytes, ResolutionError> {
            if path.ends_with(self.poisoned) {
                panic!("decoder blew up on {}", path.display());
            }
            self.inner.read_file(path).await
        }

        async fn fetch_url(&self, url: &Url) -> Result<FetchedBytes, ResolutionError> {
            self.inner.fetch_url(url).await
        }
    }

    #[derive(Debug)]
    struct ByteCountFactory;

    impl RenderableFactory for ByteCountFactory {
        fn name(&self) -> &'static str {
            "bytes"
        }

        fn render(&self, image: &ResolvedImage, _options: &RenderOptions) -> Result<Renderable> {
            Ok(Renderable::new("bytes", format!("<{} bytes>", image.bytes.len())))
        }
    }

    fn viewer(fetcher: Arc<MemoryFetcher>, capability: CapabilityState) -> Viewer {
        Viewer::new(fetcher, capability, ViewerOptions::default())
    }

    fn available() -> CapabilityState {
        CapabilityState::Available(Arc::new(ByteCountFactory))
    }

    fn docs() -> Location {
        Location::LocalPath(PathBuf::from("/docs"))
    }

    #[test]
    fn test_document_source_parsing() {
        assert_eq!(
            DocumentSource::parse("https://example.com/README.md"),
            DocumentSource::Url(Url::parse("https://example.com/README.md").unwrap())
        );
        assert_eq!(
            DocumentSource::parse("docs/guide.md"),
            DocumentSource::Path(PathBuf::from("docs/guide.md"))
        );
        assert_eq!(
            DocumentSource::parse("file:///tmp/notes.md"),
            DocumentSource::Path(PathBuf::from("/tmp/notes.md"))
        );
    }

    #[tokio::test]
    async fn test_images_resolve_and_mount() {
        let fetcher = MemoryFetcher::new(&[("/docs/cat.png", b"meow")], Duration::ZERO);
        let mut viewer = viewer(fetcher.clone(), available());

        viewer.show("# Cats\n\n![cat](cat.png)\n", docs());
        assert_eq!(viewer.render(), "# Cats\n\n🖼 [cat]");

        viewer.settle().await;
        assert_eq!(viewer.render(), "# Cats\n\n<4 bytes>");
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_capability_starts_no_resolution() {
        let fetcher = MemoryFetcher::new(&[("/docs/cat.png", b"meow")], Duration::ZERO);
        let mut viewer = viewer(
            fetcher.clone(),
            CapabilityState::Unavailable("dumb does not support inline images".to_string()),
        );

        viewer.show("![cat](cat.png)\n", docs());
        viewer.settle().await;

        assert_eq!(
            viewer.render(),
            "🖼 [cat] (dumb does not support inline images)"
        );
        assert!(viewer.resolver().unwrap().is_empty());
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_images_share_one_fetch() {
        let fetcher = MemoryFetcher::new(&[("/docs/cat.png", b"meow")], Duration::from_millis(30));
        let mut viewer = viewer(fetcher.clone(), available());

        viewer.show("![one](cat.png)\n\n![two](./img/../cat.png)\n", docs());
        viewer.settle().await;

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(viewer.render(), "<4 bytes>\n\n<4 bytes>");
        assert_eq!(viewer.resolver().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_image_degrades_to_caption() {
        let fetcher = MemoryFetcher::new(&[], Duration::ZERO);
        let mut viewer = viewer(fetcher, available());

        viewer.show("![architecture diagram](missing.png)\n", docs());
        viewer.settle().await;

        assert_eq!(
            viewer.render(),
            "🖼 [architecture diagram] (image not found)"
        );
    }

    #[tokio::test]
    async fn test_mixed_content_never_requests_resolution() {
        let fetcher = MemoryFetcher::new(&[("/docs/cat.png", b"meow")], Duration::ZERO);
        let mut viewer = viewer(fetcher.clone(), available());

        viewer.show("look: ![cat](cat.png) and ![dog](dog.png)\n", docs());
        viewer.settle().await;

        assert_eq!(viewer.render(), "look: 🖼 [cat] and 🖼 [dog]");
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_navigation_drops_stale_mounts() {
        let fetcher = MemoryFetcher::new(
            &[("/a/pic.png", b"from a"), ("/b/pic.png", b"bb")],
            Duration::from_millis(50),
        );
        let mut viewer = viewer(fetcher, available());

        let first = viewer.show("![pic](pic.png)\n", Location::LocalPath(PathBuf::from("/a")));
        let second = viewer.show("![pic](pic.png)\n", Location::LocalPath(PathBuf::from("/b")));
        assert_eq!(second, first + 1);

        // A late event from the first session changes nothing
        let stale = MountEvent {
            generation: first,
            block: BlockId(0),
            outcome: Err(ResolutionError::NotFound("/a/pic.png".to_string())),
        };
        assert!(!viewer.apply(stale));

        viewer.settle().await;
        assert_eq!(viewer.render(), "<2 bytes>");
        assert_eq!(viewer.location(), Some(&Location::LocalPath(PathBuf::from("/b"))));
    }

    #[tokio::test]
    async fn test_crashed_resolution_fails_its_block() {
        let fetcher = PanickingFetcher {
            inner: MemoryFetcher::new(&[("/docs/cat.png", b"meow")], Duration::ZERO),
            poisoned: "dog.png",
        };
        let mut viewer = Viewer::new(Arc::new(fetcher), available(), ViewerOptions::default());

        viewer.show("![cat](cat.png)\n\n![dog](dog.png)\n", docs());
        tokio::time::timeout(Duration::from_secs(2), viewer.settle())
            .await
            .expect("settle should finish even when a task panics");

        assert!(viewer.document().unwrap().is_settled());
        assert_eq!(
            viewer.render(),
            "<4 bytes>\n\n🖼 [dog] (image loader failed)"
        );
    }

    #[tokio::test]
    async fn test_cache_is_discarded_on_navigation() {
        let fetcher = MemoryFetcher::new(&[("/docs/cat.png", b"meow")], Duration::ZERO);
        let mut viewer = viewer(fetcher.clone(), available());

        viewer.show("![cat](cat.png)\n", docs());
        viewer.settle().await;
        viewer.show("![cat](cat.png)\n", docs());
        viewer.settle().await;

        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_each_block_settles_once() {
        let fetcher = MemoryFetcher::new(&[("/docs/cat.png", b"meow")], Duration::ZERO);
        let mut viewer = viewer(fetcher, available());

        let generation = viewer.show("![cat](cat.png)\n", docs());
        viewer.settle().await;

        let repeat = MountEvent {
            generation,
            block: BlockId(0),
            outcome: Err(ResolutionError::FetchFailed("late".to_string())),
        };
        assert!(!viewer.apply(repeat));
        let image = viewer.document().unwrap().image(BlockId(0)).unwrap();
        assert!(matches!(image.state, BlockState::Resolved(_)));
    }

    #[tokio::test]
    async fn test_open_missing_document_is_an_error() {
        let fetcher = MemoryFetcher::new(&[], Duration::ZERO);
        let mut viewer = viewer(fetcher, available());

        let err = viewer
            .open(DocumentSource::Path(PathBuf::from("/definitely/not/here.md")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read document"));
        assert!(viewer.document().is_none());
    }
}
