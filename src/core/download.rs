//! Worker script download over HTTP.

use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::utils::io;
use crate::utils::retry::{retry, RetryPolicy};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fetches the worker script into place.
pub trait ArtifactFetcher {
    /// Download `url` to `dest`, returning the number of bytes written.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("bpb-wizard/{}", VERSION))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::internal_io(e.to_string(), Some("create HTTP client".to_string())))?;

        Ok(Self { client })
    }
}

impl ArtifactFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::download_failed(url, None, e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::download_failed(
                url,
                Some(status.as_u16()),
                status.canonical_reason().unwrap_or("unexpected status"),
            ));
        }

        let body = response
            .bytes()
            .map_err(|e| Error::download_failed(url, Some(status.as_u16()), e.to_string()))?;

        if body.is_empty() {
            return Err(Error::download_failed(url, Some(status.as_u16()), "empty response body"));
        }

        io::write_bytes_atomic(dest, &body, &format!("write {}", dest.display()))?;
        Ok(body.len() as u64)
    }
}

/// Download the artifact under the retry budget.
pub fn download_artifact(
    fetcher: &dyn ArtifactFetcher,
    url: &str,
    dest: &Path,
    policy: RetryPolicy,
) -> Result<u64> {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    retry(policy, "download", |attempt| {
        log_status!(
            "download",
            "Attempt {}/{}: downloading {} from {}",
            attempt,
            policy.attempts,
            file_name,
            url
        );
        let bytes = fetcher.fetch(url, dest)?;
        log_status!("download", "Saved {} ({} bytes)", dest.display(), bytes);
        Ok(bytes)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    struct FlakyFetcher {
        failures: Cell<u32>,
        calls: Cell<u32>,
    }

    impl ArtifactFetcher for FlakyFetcher {
        fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
            self.calls.set(self.calls.get() + 1);
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(Error::download_failed(url, Some(503), "Service Unavailable"));
            }
            std::fs::write(dest, b"export default {}").unwrap();
            Ok(17)
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    #[test]
    fn retries_transient_failures() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("worker.js");
        let fetcher = FlakyFetcher { failures: Cell::new(2), calls: Cell::new(0) };

        let bytes = download_artifact(&fetcher, "https://example.com/worker.js", &dest, fast()).unwrap();
        assert_eq!(bytes, 17);
        assert_eq!(fetcher.calls.get(), 3);
        assert!(dest.exists());
    }

    #[test]
    fn surfaces_last_error_after_budget() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("worker.js");
        let fetcher = FlakyFetcher { failures: Cell::new(10), calls: Cell::new(0) };

        let err = download_artifact(&fetcher, "https://example.com/worker.js", &dest, fast()).unwrap_err();
        assert_eq!(err.code.as_str(), "download.failed");
        assert_eq!(err.details["status"], 503);
        assert_eq!(fetcher.calls.get(), 3);
    }

    #[test]
    fn http_fetcher_reports_transport_errors() {
        let dir = TempDir::new().unwrap();
        let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let err = fetcher
            .fetch("http://127.0.0.1:9/worker.js", &dir.path().join("worker.js"))
            .unwrap_err();
        assert_eq!(err.code.as_str(), "download.failed");
    }
}
