// ABOUTME: Resource resolver: normalizes image references and loads each resource once
// ABOUTME: Concurrent requests for one identity share a single in-flight load and its outcome

use crate::content::ContentKind;
use crate::error::ResolutionError;
use crate::fetcher::{FetchedBytes, ResourceFetcher};
use crate::location::{ImageReference, ResourceIdentity};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

/// Bytes of one resolved image; shared by every block that references it
#[derive(Debug, PartialEq, Eq)]
pub struct ResolvedImage {
    pub identity: ResourceIdentity,
    pub bytes: Vec<u8>,
    pub kind: ContentKind,
}

pub type ResolvedResource = Result<Arc<ResolvedImage>, ResolutionError>;

/// Either in flight (cell empty) or settled (cell set); never cleared
type CacheEntry = Arc<OnceCell<ResolvedResource>>;

/// Resolves image references for one document session.
///
/// The cache lives as long as the resolver. Entries are immutable once set,
/// failures included, so a broken image is not retried within a session.
pub struct ResourceResolver {
    fetcher: Arc<dyn ResourceFetcher>,
    entries: Mutex<HashMap<ResourceIdentity, CacheEntry>>,
}

impl ResourceResolver {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            fetcher,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a reference to bytes or a resolution error. Never panics.
    pub async fn resolve(&self, reference: &ImageReference) -> ResolvedResource {
        match reference.identity() {
            Ok(identity) => self.resolve_identity(identity).await,
            Err(err) => {
                log::debug!(
                    "Cannot resolve image '{}' against {}: {}",
                    reference.src,
                    reference.base,
                    err
                );
                Err(err)
            }
        }
    }

    pub async fn resolve_identity(&self, identity: ResourceIdentity) -> ResolvedResource {
        let entry = self.entry(&identity);

        if let Some(settled) = entry.get() {
            log::debug!("Cache hit: {}", identity);
            return settled.clone();
        }

        // Only one caller runs `load`; the rest wait on the cell
        entry.get_or_init(|| self.load(identity)).await.clone()
    }

    /// Identity a reference would be cached under; no I/O
    pub fn identity_for(
        &self,
        reference: &ImageReference,
    ) -> Result<ResourceIdentity, ResolutionError> {
        reference.identity()
    }

    /// Settled outcome for an identity, if any
    pub fn cached(&self, identity: &ResourceIdentity) -> Option<ResolvedResource> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(identity)
            .and_then(|entry| entry.get().cloned())
    }

    /// Number of identities seen so far, in flight or settled
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, identity: &ResourceIdentity) -> CacheEntry {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            entries
                .entry(identity.clone())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    async fn load(&self, identity: ResourceIdentity) -> ResolvedResource {
        log::debug!("Cache miss: {}", identity);

        let fetched: Result<FetchedBytes, ResolutionError> = match &identity {
            ResourceIdentity::Path(path) => self.fetcher.read_file(path).await,
            ResourceIdentity::Url(url) => self.fetcher.fetch_url(url).await,
        };

        match fetched {
            Ok(fetched) => {
                let kind = fetched.kind(&identity.cache_key());
                Ok(Arc::new(ResolvedImage {
                    identity,
                    bytes: fetched.bytes,
                    kind,
                }))
            }
            Err(err) => {
                log::warn!("Failed to resolve image {}: {}", identity, err);
                Err(err)
            }
        }
    }
}
