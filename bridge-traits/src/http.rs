//! HTTP Client Abstraction
//!
//! Provides async HTTP operations with retry logic and per-request timeouts.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Timeout applied to symbol archive downloads unless the caller overrides it.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

/// HTTP request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    /// Overrides the client's default timeout for this request only.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// HTTP response
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if response status indicates a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if response status indicates a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Convert a non-2xx response into a [`BridgeError::Status`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }

        let message = String::from_utf8_lossy(&self.body)
            .chars()
            .take(256)
            .collect::<String>();
        Err(BridgeError::Status {
            status: self.status,
            message,
        })
    }
}

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Whether to use exponential backoff
    pub use_exponential_backoff: bool,
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    ///
    /// Used for archive downloads, where retries belong to the task queue.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
        }
    }
}

/// Options for a single archive download.
///
/// The timeout travels with the request; nothing on the shared client changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub timeout: Duration,
}

impl FetchOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Async HTTP client trait
///
/// This trait abstracts HTTP operations to allow platform-specific implementations.
/// Implementations should handle:
/// - Automatic retry with exponential backoff
/// - TLS certificate validation
/// - Connection pooling and keep-alive
/// - Honouring [`HttpRequest::timeout`] without touching their default timeout
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest, HttpMethod};
///
/// async fn fetch_data(client: &dyn HttpClient) -> Result<Bytes> {
///     let request = HttpRequest::new(HttpMethod::Get, "https://api.example.com/data")
///         .bearer_token("token");
///
///     let response = client.execute(request).await?.error_for_status()?;
///     Ok(response.body)
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Network connection fails
    /// - TLS validation fails
    /// - Request times out
    /// - Maximum retries exceeded
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Execute an HTTP request with custom retry policy
    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let _ = policy;
        self.execute(request).await
    }

    /// Download a resource into memory using the timeout from `options`.
    ///
    /// Non-2xx responses become [`BridgeError::Status`].
    async fn download(&self, url: &str, options: FetchOptions) -> Result<Bytes> {
        let request = HttpRequest::new(HttpMethod::Get, url).timeout(options.timeout);
        let response = self
            .execute_with_retry(request, RetryPolicy::single_attempt())
            .await?
            .error_for_status()?;
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        Client {}

        #[async_trait]
        impl HttpClient for Client {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    #[test]
    fn test_http_request_builder() {
        let request = HttpRequest::new(HttpMethod::Get, "https://example.com")
            .header("User-Agent", "test")
            .bearer_token("secret")
            .timeout(Duration::from_secs(30));

        assert_eq!(request.url, "https://example.com");
        assert_eq!(request.headers.get("User-Agent"), Some(&"test".to_string()));
        assert!(request.headers.contains_key("Authorization"));
        assert_eq!(request.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_http_response_status_checks() {
        let response = HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from("test"),
        };

        assert!(response.is_success());
        assert!(!response.is_client_error());
        assert!(!response.is_server_error());
    }

    #[test]
    fn test_error_for_status() {
        let response = HttpResponse {
            status: 404,
            headers: HashMap::new(),
            body: Bytes::from("missing"),
        };

        let err = response.error_for_status().unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_fetch_options_default() {
        assert_eq!(FetchOptions::default().timeout, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_download_carries_request_timeout() {
        let mut client = MockClient::new();
        client
            .expect_execute()
            .times(1)
            .withf(|req| {
                req.method == HttpMethod::Get && req.timeout == Some(Duration::from_secs(120))
            })
            .returning(|_| {
                Ok(HttpResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body: Bytes::from_static(b"archive"),
                })
            });

        let bytes = client
            .download("https://cdn.example.com/a.zip", FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"archive");
    }

    #[tokio::test]
    async fn test_download_rejects_error_status() {
        let mut client = MockClient::new();
        client.expect_execute().returning(|_| {
            Ok(HttpResponse {
                status: 503,
                headers: HashMap::new(),
                body: Bytes::new(),
            })
        });

        let result = client
            .download("https://cdn.example.com/a.zip", FetchOptions::default())
            .await;
        assert!(matches!(result, Err(BridgeError::Status { status: 503, .. })));
    }
}
