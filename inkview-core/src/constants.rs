// ABOUTME: Centralized constants for inkview-core
// ABOUTME: Contains fetch timeouts, size limits and HTTP client defaults

/// HTTP and request timeouts
pub mod timeouts {
    use std::time::Duration;

    /// Default timeout for a single image or document fetch
    pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Limits applied to remote resources
pub mod limits {
    /// Largest remote body accepted before the download is aborted
    pub const MAX_FETCH_BYTES: u64 = 10 * 1024 * 1024;

    /// Redirects followed per request
    pub const MAX_REDIRECTS: usize = 3;
}

/// HTTP client identification
pub mod http {
    pub const USER_AGENT: &str = concat!("inkview/", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        assert_eq!(timeouts::FETCH_TIMEOUT, Duration::from_secs(30));
        assert_eq!(limits::MAX_FETCH_BYTES, 10 * 1024 * 1024);
        assert!(http::USER_AGENT.starts_with("inkview/"));
    }
}
