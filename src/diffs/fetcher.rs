use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{error, info};
use url::Url;

use crate::constants::{DEFAULT_COMPARE_URL, DEFAULT_FETCH_TIMEOUT_SECS};
use crate::error::{DiffError, MonitorError, Result};
use crate::metrics::DiffMetrics;

/// Retrieves the diff of one revision against its predecessor.
#[async_trait]
pub trait DiffFetcher: Send + Sync {
    async fn fetch(&self, revision: i64) -> std::result::Result<Vec<u8>, DiffError>;
}

/// Compare-API client. One GET per revision, no retries.
#[derive(Debug, Clone)]
pub struct HttpDiffFetcher {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpDiffFetcher {
    pub fn new(compare_url: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(compare_url).map_err(|e| {
            MonitorError::Config(format!("invalid compare url '{}': {}", compare_url, e))
        })?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    /// English Wikipedia endpoint with the standard 10 s timeout.
    pub fn with_defaults() -> Result<Self> {
        Self::new(
            DEFAULT_COMPARE_URL,
            Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        )
    }

    /// Request URL comparing `revision` with the previous revision.
    pub fn compare_url(&self, revision: i64) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("action", "compare")
            .append_pair("format", "json")
            .append_pair("fromrev", &revision.to_string())
            .append_pair("torelative", "prev");
        url
    }
}

#[async_trait]
impl DiffFetcher for HttpDiffFetcher {
    async fn fetch(&self, revision: i64) -> std::result::Result<Vec<u8>, DiffError> {
        let url = self.compare_url(revision);
        info!(url = %url, revision, "Fetching revision");
        let start = Instant::now();

        let body = async {
            let resp = self.client.get(url).send().await?.error_for_status()?;
            resp.bytes().await
        }
        .await
        .map_err(|e| {
            error!(revision, error = %e, "Error querying compare API");
            DiffMetrics::record_fetch_error();
            DiffError::from(e)
        })?;

        let elapsed = start.elapsed();
        info!(
            revision,
            elapsed_ms = elapsed.as_millis() as u64,
            bytes = body.len(),
            "Revision fetched"
        );
        DiffMetrics::record_fetch_success(elapsed.as_secs_f64(), body.len());
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;

    #[test]
    fn test_compare_url_template() {
        let fetcher = HttpDiffFetcher::with_defaults().unwrap();
        assert_eq!(
            fetcher.compare_url(100).as_str(),
            "https://en.wikipedia.org/w/api.php?action=compare&format=json&fromrev=100&torelative=prev"
        );
    }

    #[test]
    fn test_invalid_endpoint_is_config_error() {
        let err = HttpDiffFetcher::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let server = MockServer::start_async().await;
        let compare = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET)
                    .path("/w/api.php")
                    .query_param("action", "compare")
                    .query_param("format", "json")
                    .query_param("fromrev", "100")
                    .query_param("torelative", "prev");
                then.status(200).body("foo");
            })
            .await;

        let fetcher =
            HttpDiffFetcher::new(&server.url("/w/api.php"), Duration::from_secs(5)).unwrap();
        let body = fetcher.fetch(100).await.unwrap();

        assert_eq!(body, b"foo");
        compare.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start_async().await;
        let _ = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/w/api.php");
                then.status(503).body("unavailable");
            })
            .await;

        let fetcher =
            HttpDiffFetcher::new(&server.url("/w/api.php"), Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch(7).await.unwrap_err();
        assert!(matches!(err, DiffError::Request(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_error() {
        let server = MockServer::start_async().await;
        let _ = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/w/api.php");
                then.status(200).delay(Duration::from_millis(500)).body("late");
            })
            .await;

        let fetcher =
            HttpDiffFetcher::new(&server.url("/w/api.php"), Duration::from_millis(50)).unwrap();
        assert!(fetcher.fetch(7).await.is_err());
    }
}
