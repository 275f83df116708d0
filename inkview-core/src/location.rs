// ABOUTME: Document locations, image references and normalized resource identities
// ABOUTME: Turns a (src, base location) pair into the absolute path or URL used as cache key

use crate::error::ResolutionError;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Where the currently viewed document lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Directory containing a local document
    LocalPath(PathBuf),
    /// URL of a remote document; relative sources are URL-joined against it
    RemoteUrl(Url),
}

impl Location {
    /// Location for a local document path. Files (or anything that looks like a
    /// file name) contribute their parent directory.
    pub fn for_document_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let directory = if path.is_file() || path.extension().is_some() {
            match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            }
        } else {
            path.to_path_buf()
        };

        Location::LocalPath(normalize_path(&absolutize(&directory)))
    }

    pub fn for_document_url(url: Url) -> Self {
        Location::RemoteUrl(url)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::LocalPath(dir) => write!(f, "{}", dir.display()),
            Location::RemoteUrl(url) => write!(f, "{}", url),
        }
    }
}

/// An image token lifted out of a parsed document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub src: String,
    pub alt_text: String,
    pub title: String,
    pub base: Location,
}

impl ImageReference {
    pub fn new(src: impl Into<String>, alt_text: impl Into<String>, base: Location) -> Self {
        Self {
            src: src.into(),
            alt_text: alt_text.into(),
            title: String::new(),
            base,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Text shown while loading and in every fallback
    pub fn caption(&self) -> &str {
        [&self.alt_text, &self.title, &self.src]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or("image")
    }

    /// Normalize `src` against `base` into the identity of the resource
    pub fn identity(&self) -> Result<ResourceIdentity, ResolutionError> {
        normalize(&self.src, &self.base)
    }
}

/// Absolute path or URL naming one resource; its string form is the cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceIdentity {
    Path(PathBuf),
    Url(Url),
}

impl ResourceIdentity {
    pub fn cache_key(&self) -> String {
        self.to_string()
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ResourceIdentity::Url(_))
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceIdentity::Path(path) => write!(f, "{}", path.display()),
            ResourceIdentity::Url(url) => write!(f, "{}", url),
        }
    }
}

fn normalize(src: &str, base: &Location) -> Result<ResourceIdentity, ResolutionError> {
    let src = src.trim();
    if src.is_empty() {
        return Err(ResolutionError::FetchFailed("empty image source".to_string()));
    }

    // Absolute filesystem paths never go through URL parsing (think `C:\` on Windows)
    if matches!(base, Location::LocalPath(_)) && Path::new(src).is_absolute() {
        return Ok(ResourceIdentity::Path(normalize_path(Path::new(src))));
    }

    if let Some(url) = parse_absolute_url(src) {
        return match url.scheme() {
            "http" | "https" => Ok(ResourceIdentity::Url(url)),
            "file" => match base {
                Location::LocalPath(_) => url
                    .to_file_path()
                    .map(|path| ResourceIdentity::Path(normalize_path(&path)))
                    .map_err(|_| ResolutionError::FetchFailed(format!("malformed file URL: {}", src))),
                Location::RemoteUrl(_) => Err(ResolutionError::Unsupported(
                    "local file referenced from a remote document".to_string(),
                )),
            },
            scheme => Err(ResolutionError::Unsupported(format!(
                "unsupported URL scheme '{}'",
                scheme
            ))),
        };
    }

    match base {
        Location::LocalPath(directory) => {
            let candidate = expand_home(src);
            let joined = if candidate.is_absolute() {
                candidate
            } else {
                directory.join(candidate)
            };
            Ok(ResourceIdentity::Path(normalize_path(&absolutize(&joined))))
        }
        Location::RemoteUrl(base_url) => {
            let joined = base_url.join(src)?;
            match joined.scheme() {
                "http" | "https" => Ok(ResourceIdentity::Url(joined)),
                scheme => Err(ResolutionError::Unsupported(format!(
                    "unsupported URL scheme '{}'",
                    scheme
                ))),
            }
        }
    }
}

fn parse_absolute_url(src: &str) -> Option<Url> {
    let url = Url::parse(src).ok()?;
    // Single-letter schemes are drive letters, not URLs
    if url.scheme().len() < 2 {
        return None;
    }
    Some(url)
}

fn expand_home(src: &str) -> PathBuf {
    if let Some(rest) = src.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(src)
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Collapse `.` and `..` without touching the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(dir: &str) -> Location {
        Location::LocalPath(PathBuf::from(dir))
    }

    fn remote(url: &str) -> Location {
        Location::RemoteUrl(Url::parse(url).unwrap())
    }

    #[test]
    fn test_relative_local_path_joins_document_directory() {
        let reference = ImageReference::new("img/a.png", "cat", local("/docs"));
        assert_eq!(
            reference.identity().unwrap(),
            ResourceIdentity::Path(PathBuf::from("/docs/img/a.png"))
        );
    }

    #[test]
    fn test_local_path_collapses_dot_segments() {
        let reference = ImageReference::new("./img/../b.png", "", local("/docs/guide"));
        assert_eq!(
            reference.identity().unwrap().cache_key(),
            "/docs/guide/b.png"
        );

        let reference = ImageReference::new("../../../x.png", "", local("/docs"));
        assert_eq!(reference.identity().unwrap().cache_key(), "/x.png");
    }

    #[test]
    fn test_absolute_local_path_ignores_base() {
        let reference = ImageReference::new("/srv/pic.jpg", "", local("/docs"));
        assert_eq!(reference.identity().unwrap().cache_key(), "/srv/pic.jpg");
    }

    #[test]
    fn test_remote_relative_reference_is_url_joined() {
        let reference = ImageReference::new("b.png", "", remote("https://x/doc.md"));
        assert_eq!(reference.identity().unwrap().cache_key(), "https://x/b.png");

        let reference =
            ImageReference::new("img/one.jpg", "", remote("https://example.com/docs/readme.md"));
        assert_eq!(
            reference.identity().unwrap().cache_key(),
            "https://example.com/docs/img/one.jpg"
        );

        let reference = ImageReference::new("/root.png", "", remote("https://example.com/a/b.md"));
        assert_eq!(
            reference.identity().unwrap().cache_key(),
            "https://example.com/root.png"
        );
    }

    #[test]
    fn test_absolute_url_wins_over_any_base() {
        let reference = ImageReference::new("https://cdn.example.com/a.png", "", local("/docs"));
        assert!(reference.identity().unwrap().is_remote());

        let reference =
            ImageReference::new("http://other.org/b.gif", "", remote("https://x/doc.md"));
        assert_eq!(reference.identity().unwrap().cache_key(), "http://other.org/b.gif");
    }

    #[test]
    fn test_file_url_is_a_local_path() {
        let reference = ImageReference::new("file:///tmp/pic.png", "", local("/docs"));
        assert_eq!(
            reference.identity().unwrap(),
            ResourceIdentity::Path(PathBuf::from("/tmp/pic.png"))
        );

        let reference = ImageReference::new("file:///etc/passwd", "", remote("https://x/doc.md"));
        assert!(matches!(
            reference.identity(),
            Err(ResolutionError::Unsupported(_))
        ));
    }

    #[test]
    fn test_unsupported_scheme_and_empty_source() {
        let reference = ImageReference::new("ftp://example.com/a.png", "", local("/docs"));
        assert!(matches!(
            reference.identity(),
            Err(ResolutionError::Unsupported(_))
        ));

        let reference = ImageReference::new("   ", "", local("/docs"));
        assert_eq!(
            reference.identity(),
            Err(ResolutionError::FetchFailed("empty image source".to_string()))
        );
    }

    #[test]
    fn test_location_for_document_path_uses_parent_of_files() {
        assert_eq!(
            Location::for_document_path("/docs/readme.md"),
            Location::LocalPath(PathBuf::from("/docs"))
        );

        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(
            Location::for_document_path(dir.path()),
            Location::LocalPath(normalize_path(dir.path()))
        );
    }

    #[test]
    fn test_caption_fallbacks() {
        let base = local("/docs");
        assert_eq!(ImageReference::new("a.png", "cat", base.clone()).caption(), "cat");
        assert_eq!(
            ImageReference::new("a.png", "", base.clone())
                .with_title("Title")
                .caption(),
            "Title"
        );
        assert_eq!(ImageReference::new("a.png", " ", base.clone()).caption(), "a.png");
        assert_eq!(ImageReference::new("", "", base).caption(), "image");
    }
}
