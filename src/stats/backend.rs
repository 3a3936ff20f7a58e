//! Search backend capability
//!
//! The engine depends only on this trait. Anything that can evaluate a
//! [`SearchRequest`] and return the generic response tree can stand behind
//! it: the in-memory reference backend, or a client for a search cluster
//! using the Elasticsearch adapter.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::request::SearchRequest;
use super::response::Aggregations;

/// Transport-level failure talking to a backend
#[derive(Error, Debug)]
pub enum BackendError {
    /// Backend unreachable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend did not answer in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Backend answered with something that could not be understood
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// What a backend returns for one request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackendResponse {
    /// Whether the backend considered the request successful
    pub valid: bool,
    /// Backend's own error text when `valid` is false
    pub error: Option<String>,
    /// Aggregation results
    pub aggregations: Aggregations,
}

impl BackendResponse {
    /// Successful response
    pub fn ok(aggregations: Aggregations) -> Self {
        Self {
            valid: true,
            error: None,
            aggregations,
        }
    }

    /// Failed response carrying the backend's error text
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            aggregations: Aggregations::new(),
        }
    }
}

/// A search/analytics backend able to run one aggregation request
///
/// Implementations must be safe for concurrent use; the engine shares one
/// handle across all callers.
#[async_trait]
pub trait SearchBackend: Send + Sync + 'static {
    /// Identifier used in logs
    fn backend_id(&self) -> &str;

    /// Run a single request
    async fn execute(&self, request: &SearchRequest) -> Result<BackendResponse, BackendError>;
}
