use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::api_types::{ApiError, STATUS_NOT_FOUND};
use crate::{Error, Result};

/// Raw response from the transport layer. Interpretation (JSON decoding,
/// provider error classification) stays with the orchestrator.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-success response into the engine error taxonomy,
    /// distinguishing the provider's "Not Found" reply from everything else.
    pub fn into_error(self) -> Error {
        let message = String::from_utf8_lossy(&self.body).to_string();
        if let Ok(api) = serde_json::from_slice::<ApiError>(&self.body)
            && api.status_code == STATUS_NOT_FOUND
        {
            return Error::NotFound(api.status_message);
        }
        Error::Api {
            status: self.status,
            message,
        }
    }
}

/// Seam between the orchestrator and the network. Tests drive the
/// orchestrator with a scripted implementation instead of real I/O.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<TransportResponse>;
}

/// HTTP transport over a shared reqwest client.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(concat!("mediamatch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse> {
        let response = self.client.get(url).send().await.map_err(Error::Network)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(Error::Network)?.to_vec();

        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let response = TransportResponse {
            status: 404,
            body: br#"{"status_code": 34, "status_message": "The resource you requested could not be found."}"#.to_vec(),
        };
        assert!(!response.is_success());
        assert!(response.into_error().is_not_found());
    }

    #[test]
    fn test_other_errors_keep_raw_text() {
        let response = TransportResponse {
            status: 500,
            body: b"upstream exploded".to_vec(),
        };
        match response.into_error() {
            Error::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
