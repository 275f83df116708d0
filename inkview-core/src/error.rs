// ABOUTME: Resolution error taxonomy shared by every waiter on an image resource
// ABOUTME: Errors are plain values so a cached failure can be handed out repeatedly

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("Image file not found: {0}")]
    NotFound(String),

    #[error("Failed to fetch image: {0}")]
    FetchFailed(String),

    #[error("Unsupported image: {0}")]
    Unsupported(String),
}

impl ResolutionError {
    /// Short reason suitable for a placeholder next to the alt text
    pub fn short_reason(&self) -> String {
        match self {
            ResolutionError::NotFound(_) => "image not found".to_string(),
            ResolutionError::FetchFailed(reason) => reason.clone(),
            ResolutionError::Unsupported(reason) => reason.clone(),
        }
    }

    pub fn help_text(&self) -> Option<&'static str> {
        match self {
            ResolutionError::NotFound(_) => {
                Some("Image paths are resolved relative to the document's directory")
            }
            ResolutionError::FetchFailed(_) => Some("Check your internet connection and try again"),
            ResolutionError::Unsupported(_) => None,
        }
    }

    /// Whether a later session could succeed where this one failed
    pub fn is_transient(&self) -> bool {
        matches!(self, ResolutionError::FetchFailed(_))
    }
}

impl From<reqwest::Error> for ResolutionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ResolutionError::FetchFailed("request timed out".to_string())
        } else if let Some(status) = err.status() {
            ResolutionError::FetchFailed(format!("HTTP {}", status))
        } else {
            ResolutionError::FetchFailed(err.to_string())
        }
    }
}

impl From<url::ParseError> for ResolutionError {
    fn from(err: url::ParseError) -> Self {
        ResolutionError::FetchFailed(format!("malformed URL: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ResolutionError::NotFound("/docs/a.png".to_string()).to_string(),
            "Image file not found: /docs/a.png"
        );
        assert_eq!(
            ResolutionError::FetchFailed("HTTP 404 Not Found".to_string()).to_string(),
            "Failed to fetch image: HTTP 404 Not Found"
        );
        assert_eq!(
            ResolutionError::Unsupported("unknown format".to_string()).to_string(),
            "Unsupported image: unknown format"
        );
    }

    #[test]
    fn test_short_reason() {
        assert_eq!(
            ResolutionError::NotFound("/x.png".to_string()).short_reason(),
            "image not found"
        );
        assert_eq!(
            ResolutionError::FetchFailed("request timed out".to_string()).short_reason(),
            "request timed out"
        );
    }

    #[test]
    fn test_help_text_and_transience() {
        assert!(ResolutionError::NotFound(String::new()).help_text().is_some());
        assert!(ResolutionError::Unsupported(String::new()).help_text().is_none());
        assert!(ResolutionError::FetchFailed(String::new()).is_transient());
        assert!(!ResolutionError::NotFound(String::new()).is_transient());
    }

    #[test]
    fn test_from_url_parse_error() {
        let err: ResolutionError = url::Url::parse("http://[::1").unwrap_err().into();
        assert!(matches!(err, ResolutionError::FetchFailed(ref r) if r.starts_with("malformed URL")));
    }
}
