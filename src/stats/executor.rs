//! Single-shot execution of aggregation requests

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info_span, Instrument};

use super::backend::SearchBackend;
use super::elasticsearch::ElasticsearchAdapter;
use super::request::SearchRequest;
use super::response::Aggregations;
use crate::error::{Error, Result};

/// Sends requests to a [`SearchBackend`] and validates the answer
///
/// Exactly one backend call per [`execute`](Self::execute); no retries and
/// no timeout of its own.
#[derive(Clone)]
pub struct AggregationExecutor {
    backend: Arc<dyn SearchBackend>,
    trace_requests: bool,
}

impl AggregationExecutor {
    /// Create an executor over `backend`
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            backend,
            trace_requests: false,
        }
    }

    /// Log each rendered request at debug level before sending it
    pub fn with_request_tracing(mut self, enabled: bool) -> Self {
        self.trace_requests = enabled;
        self
    }

    /// Run `request` and return its aggregation tree
    ///
    /// # Errors
    ///
    /// [`Error::BackendQueryFailure`] when the backend reports an invalid
    /// response or the transport fails.
    pub async fn execute(&self, request: &SearchRequest) -> Result<Aggregations> {
        let span = info_span!(
            "stats_search",
            backend = self.backend.backend_id(),
            partitions = request.partitions.len()
        );

        async {
            if self.trace_requests {
                debug!(
                    request = %ElasticsearchAdapter::render(request),
                    "Sending search request"
                );
            }

            let started = Instant::now();
            let outcome = self.backend.execute(request).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let response = outcome.map_err(|e| {
                error!(error = %e, elapsed_ms, "Search transport failed");
                Error::backend(e.to_string())
            })?;

            if !response.valid {
                let message = response
                    .error
                    .unwrap_or_else(|| "unknown backend error".to_string());
                error!(error = %message, elapsed_ms, "Search returned an invalid response");
                return Err(Error::backend(message));
            }

            debug!(elapsed_ms, "Search completed");
            Ok(response.aggregations)
        }
        .instrument(span)
        .await
    }
}
