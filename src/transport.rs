use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// HTTP method used for remote deliveries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }
}

/// Error returned by an [`HttpTransport`].
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[cfg(feature = "http")]
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("log ingestion failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Other(String),
}

/// Sends one serialized batch of records to the ingestion endpoint.
///
/// The remote stream calls this from its background task only; a slow or
/// failing transport never reaches the producer.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, method: HttpMethod, url: &str, body: String) -> Result<(), TransportError>;
}

/// [`HttpTransport`] backed by `reqwest` with a per-request timeout.
#[cfg(feature = "http")]
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl ReqwestTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, method: HttpMethod, url: &str, body: String) -> Result<(), TransportError> {
        let request = match method {
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
        };
        let resp = request
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(TransportError::Status { status, body })
        }
    }
}

/// Default timeout for a single ingestion request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
