//! Network seam between the controllers and the result server.

pub mod http;
pub mod lifetime;

pub use http::HttpTransport;
pub use lifetime::PageLifetime;

use crate::form::SubmissionRequest;
use async_trait::async_trait;
use thiserror::Error;

/// Failure before any response was delivered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportFailure {
    #[error("Network failure: {0}")]
    Network(String),
    #[error("Request aborted")]
    Aborted,
}

/// A delivered response, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &'static str;

    /// Issues one request. No retry, no timeout.
    async fn send(&self, request: &SubmissionRequest) -> Result<RawResponse, TransportFailure>;
}
