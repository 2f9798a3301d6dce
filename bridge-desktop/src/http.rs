//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Reqwest-based HTTP client implementation
///
/// Provides HTTP operations with:
/// - Connection pooling via reqwest
/// - Automatic retry with exponential backoff on 5xx/429 and network errors
/// - A fixed default timeout that individual requests may override
///
/// The default timeout is set once at construction. A request carrying its own
/// timeout (see [`HttpRequest::timeout`]) gets that timeout applied to the
/// reqwest request builder only; the shared client is never reconfigured.
pub struct ReqwestHttpClient {
    client: Client,
    default_timeout: Duration,
}

impl ReqwestHttpClient {
    /// Default timeout for catalog API calls.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    /// Create a new HTTP client with custom default timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("dsym-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    /// Wrap a preconfigured reqwest client.
    ///
    /// `default_timeout` must match the timeout the client was built with.
    pub fn with_client(client: Client, default_timeout: Duration) -> Self {
        Self {
            client,
            default_timeout,
        }
    }

    /// Timeout applied to requests that do not carry their own.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Convert bridge HttpMethod to reqwest Method
    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    /// Build reqwest request from bridge request
    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let method = Self::convert_method(request.method);
        let mut req = self.client.request(method, &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }

        // Per-request override; the client default stays untouched.
        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    fn classify_error(error: reqwest::Error, url: &str) -> BridgeError {
        if error.is_timeout() {
            BridgeError::Timeout(format!("{} ({})", url, error))
        } else if error.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", error))
        } else {
            BridgeError::OperationFailed(error.to_string())
        }
    }

    fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
        if policy.use_exponential_backoff {
            let exponential_delay = policy.base_delay * 2u32.pow(attempt.saturating_sub(1));
            exponential_delay.min(policy.max_delay)
        } else {
            policy.base_delay
        }
    }

    /// Execute request with retry logic
    async fn execute_with_retry_internal(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < max_attempts {
            debug!(
                attempt = attempt + 1,
                max_attempts,
                url = %request.url,
                timeout_ms = request.timeout.map(|t| t.as_millis() as u64),
                "Executing HTTP request"
            );

            match self.build_request(request.clone()).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if status >= 500 || status == 429 {
                        warn!(
                            status,
                            attempt = attempt + 1,
                            url = %request.url,
                            "HTTP request failed with retryable status"
                        );
                        last_error = Some(BridgeError::Status {
                            status,
                            message: format!("retryable status from {}", request.url),
                        });
                    } else {
                        let headers: HashMap<String, String> = response
                            .headers()
                            .iter()
                            .filter_map(|(k, v)| {
                                v.to_str().ok().map(|s| (k.to_string(), s.to_string()))
                            })
                            .collect();

                        let body = response
                            .bytes()
                            .await
                            .map_err(|e| Self::classify_error(e, &request.url))?;

                        return Ok(HttpResponse {
                            status,
                            headers,
                            body,
                        });
                    }
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        url = %request.url,
                        "HTTP request failed"
                    );
                    last_error = Some(Self::classify_error(e, &request.url));
                }
            }

            attempt += 1;

            if attempt < max_attempts {
                let delay = Self::backoff_delay(&policy, attempt);
                debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
                sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BridgeError::OperationFailed("All retry attempts exhausted".to_string())
        }))
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, RetryPolicy::default())
            .await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        self.execute_with_retry_internal(request, policy).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_creation() {
        let client = ReqwestHttpClient::new().unwrap();
        assert_eq!(client.default_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_method_conversion() {
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Get),
            reqwest::Method::GET
        );
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Post),
            reqwest::Method::POST
        );
    }

    #[test]
    fn test_request_timeout_is_scoped_to_request() {
        let client = ReqwestHttpClient::new().unwrap();

        let long = client
            .build_request(
                HttpRequest::new(HttpMethod::Get, "https://cdn.example.com/symbols.zip")
                    .timeout(Duration::from_secs(120)),
            )
            .build()
            .unwrap();
        assert_eq!(long.timeout(), Some(&Duration::from_secs(120)));

        // A later request without an override carries no per-request timeout,
        // so the client default applies.
        let plain = client
            .build_request(HttpRequest::new(
                HttpMethod::Get,
                "https://api.example.com/apps",
            ))
            .build()
            .unwrap();
        assert_eq!(plain.timeout(), None);
        assert_eq!(client.default_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(
            ReqwestHttpClient::backoff_delay(&policy, 1),
            Duration::from_millis(100)
        );
        assert_eq!(
            ReqwestHttpClient::backoff_delay(&policy, 3),
            Duration::from_millis(400)
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = ReqwestHttpClient::with_timeout(Duration::from_millis(200)).unwrap();
        let result = client
            .execute_with_retry(
                HttpRequest::new(HttpMethod::Get, "http://127.0.0.1:9/unreachable"),
                RetryPolicy::single_attempt(),
            )
            .await;

        assert!(matches!(
            result,
            Err(BridgeError::OperationFailed(_)) | Err(BridgeError::Timeout(_))
        ));
        assert_eq!(client.default_timeout(), Duration::from_millis(200));
    }
}
