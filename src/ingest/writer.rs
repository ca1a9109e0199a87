//! Downstream write boundary.

use async_trait::async_trait;
use tower::BoxError;

use crate::http::RequestContext;
use crate::ingest::translate::WriteRequest;

/// Sink for translated write requests.
///
/// Implementations observe the context deadline and cancellation.
#[async_trait]
pub trait RemoteWriter: Send + Sync {
    async fn write(&self, ctx: &RequestContext, request: WriteRequest) -> Result<(), BoxError>;
}

/// Writer that logs a summary of every request and drops it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogWriter;

#[async_trait]
impl RemoteWriter for LogWriter {
    async fn write(&self, ctx: &RequestContext, request: WriteRequest) -> Result<(), BoxError> {
        let samples: usize = request.timeseries.iter().map(|ts| ts.samples.len()).sum();
        tracing::debug!(
            org_id = ctx.org_id().unwrap_or_default(),
            series = request.timeseries.len(),
            samples,
            metadata = request.metadata.len(),
            baggage = %ctx.display_baggage(),
            "Write request"
        );
        Ok(())
    }
}
