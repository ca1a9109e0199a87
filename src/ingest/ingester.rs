//! The sink behind the ingestion endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::Counter;
use tower::BoxError;

use crate::http::error::ClassifiedError;
use crate::http::RequestContext;
use crate::ingest::host_tags::HostTagStore;
use crate::ingest::labels::{all_host_tags, LabelSet};
use crate::ingest::payload::{Serie, ServiceCheck};
use crate::ingest::translate::{translate_checks, translate_series};
use crate::ingest::writer::RemoteWriter;

/// Stores agent payloads. Errors may be classified (see `http::error`);
/// anything else is answered with a 500.
#[async_trait]
pub trait Ingester: Send + Sync {
    async fn store_metrics(&self, ctx: &RequestContext, series: Vec<Serie>) -> Result<(), BoxError>;

    async fn store_host_tags(
        &self,
        ctx: &RequestContext,
        hostname: &str,
        system_tags: Vec<String>,
    ) -> Result<(), BoxError>;

    async fn store_check_run(&self, ctx: &RequestContext, checks: Vec<ServiceCheck>) -> Result<(), BoxError>;
}

/// Rejects every write with a `Disabled` error.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledIngester;

#[async_trait]
impl Ingester for DisabledIngester {
    async fn store_metrics(&self, _ctx: &RequestContext, _series: Vec<Serie>) -> Result<(), BoxError> {
        Err(ClassifiedError::disabled().into())
    }

    async fn store_host_tags(
        &self,
        _ctx: &RequestContext,
        _hostname: &str,
        _system_tags: Vec<String>,
    ) -> Result<(), BoxError> {
        Err(ClassifiedError::disabled().into())
    }

    async fn store_check_run(&self, _ctx: &RequestContext, _checks: Vec<ServiceCheck>) -> Result<(), BoxError> {
        Err(ClassifiedError::disabled().into())
    }
}

/// Translates payloads and hands them to a remote writer.
pub struct TranslatingIngester {
    host_tags: Arc<dyn HostTagStore>,
    writer: Arc<dyn RemoteWriter>,
    metrics_parsed: Counter,
}

impl TranslatingIngester {
    pub fn new(
        host_tags: Arc<dyn HostTagStore>,
        writer: Arc<dyn RemoteWriter>,
        metrics_parsed: Counter,
    ) -> Self {
        Self {
            host_tags,
            writer,
            metrics_parsed,
        }
    }
}

#[async_trait]
impl Ingester for TranslatingIngester {
    async fn store_metrics(&self, ctx: &RequestContext, series: Vec<Serie>) -> Result<(), BoxError> {
        let request = translate_series(ctx, &series, self.host_tags.as_ref())
            .await
            .map_err(|err| ClassifiedError::bad_request("can't translate series").with_source(err))?;

        self.metrics_parsed.increment(request.timeseries.len() as u64);

        ctx.run(self.writer.write(ctx, request)).await
    }

    async fn store_host_tags(
        &self,
        ctx: &RequestContext,
        hostname: &str,
        system_tags: Vec<String>,
    ) -> Result<(), BoxError> {
        let mut labels = LabelSet::from_tags(system_tags.iter().map(String::as_str)).into_labels();
        labels.push(all_host_tags(&system_tags));

        ctx.run(self.host_tags.set(ctx, hostname, labels))
            .await
            .map_err(|err| ClassifiedError::internal("can't store host tags").with_source(err).into())
    }

    async fn store_check_run(&self, ctx: &RequestContext, checks: Vec<ServiceCheck>) -> Result<(), BoxError> {
        let request = translate_checks(ctx, &checks, self.host_tags.as_ref())
            .await
            .map_err(|err| ClassifiedError::bad_request("can't translate series").with_source(err))?;

        ctx.run(self.writer.write(ctx, request)).await
    }
}

impl std::fmt::Debug for TranslatingIngester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatingIngester").finish_non_exhaustive()
    }
}
