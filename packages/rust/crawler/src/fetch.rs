//! Stateless HTTP retrieval.
//!
//! The fetcher performs exactly one request per call. It has no retry logic:
//! an item that fails to fetch stays a cache miss and is attempted again on
//! the next crawl.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};

use centipede_shared::{CentipedeError, Result};

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("centipede/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects followed per request.
const MAX_REDIRECTS: usize = 5;

/// Thin wrapper over a shared `reqwest` client.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    timeout: Duration,
}

impl Fetcher {
    /// Build a fetcher whose requests time out after `timeout` unless overridden.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| CentipedeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    /// Fetch `url` and return the raw response body.
    ///
    /// Connection failures, timeouts and non-success statuses all surface as
    /// [`CentipedeError::Network`].
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let timeout = timeout.unwrap_or(self.timeout);
        debug!(timeout_ms = timeout.as_millis() as u64, "fetching");

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| network_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CentipedeError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| network_error(url, &e))?;

        debug!(bytes = body.len(), "fetched");
        Ok(body.to_vec())
    }

    /// Fetch `url` and decode the body as UTF-8, replacing invalid sequences.
    pub async fn fetch_text(&self, url: &str, timeout: Option<Duration>) -> Result<String> {
        let bytes = self.fetch(url, timeout).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn network_error(url: &str, e: &reqwest::Error) -> CentipedeError {
    if e.is_timeout() {
        CentipedeError::Network(format!("{url}: timed out"))
    } else {
        CentipedeError::Network(format!("{url}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_body_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>hello</p>"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
        let body = fetcher
            .fetch(&format!("{}/page", server.uri()), None)
            .await
            .expect("fetch");
        assert_eq!(body, b"<p>hello</p>");
    }

    #[tokio::test]
    async fn non_success_status_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher
            .fetch(&format!("{}/missing", server.uri()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CentipedeError::Network(_)));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(Duration::from_secs(30)).unwrap();
        let err = fetcher
            .fetch(
                &format!("{}/slow", server.uri()),
                Some(Duration::from_millis(200)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CentipedeError::Network(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let server = MockServer::start().await;
        Mock::given(path("/latin1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'F', 0xfc, b'r']))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
        let text = fetcher
            .fetch_text(&format!("{}/latin1", server.uri()), None)
            .await
            .unwrap();
        assert_eq!(text, "F\u{fffd}r");
    }
}
