//! Distributed tracing support.
//!
//! # Responsibilities
//! - Extract trace context from incoming requests
//! - Start a new root trace when no context was propagated
//! - Decide sampling for new roots
//!
//! # Design Decisions
//! - Extraction is a capability trait, one implementation per wire format
//! - Supports W3C Trace Context and Jaeger propagation headers
//! - Spans themselves are `tracing` spans; this module only owns identifiers

use axum::http::HeaderMap;

/// W3C trace context header.
pub const TRACEPARENT: &str = "traceparent";

/// Jaeger propagation header.
pub const UBER_TRACE_ID: &str = "uber-trace-id";

/// Jaeger header forcing a debug trace.
pub const JAEGER_DEBUG_ID: &str = "jaeger-debug-id";

/// Identifiers of the span serving a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanContext {
    /// Lowercase hex, 32 characters.
    pub trace_id: String,
    /// Lowercase hex, 16 characters.
    pub span_id: String,
    pub sampled: bool,
}

impl SpanContext {
    /// Child of this context: same trace and sampling, fresh span id.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: new_span_id(),
            sampled: self.sampled,
        }
    }
}

/// Reads a propagated span context from request headers.
pub trait SpanContextExtractor: Send + Sync {
    fn extract(&self, headers: &HeaderMap) -> Option<SpanContext>;
}

/// `traceparent: 00-<trace-id>-<parent-id>-<flags>`
#[derive(Debug, Default, Clone, Copy)]
pub struct W3cTraceContext;

impl SpanContextExtractor for W3cTraceContext {
    fn extract(&self, headers: &HeaderMap) -> Option<SpanContext> {
        let value = headers.get(TRACEPARENT)?.to_str().ok()?.trim();
        let mut parts = value.split('-');

        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;

        if version.len() != 2 || version == "ff" || !is_hex(version) {
            return None;
        }
        if version == "00" && parts.next().is_some() {
            return None;
        }
        if trace_id.len() != 32 || span_id.len() != 16 || flags.len() != 2 {
            return None;
        }
        if !is_valid_id(trace_id) || !is_valid_id(span_id) {
            return None;
        }

        let flags = u8::from_str_radix(flags, 16).ok()?;
        Some(SpanContext {
            trace_id: trace_id.to_ascii_lowercase(),
            span_id: span_id.to_ascii_lowercase(),
            sampled: flags & 0x01 == 0x01,
        })
    }
}

/// `uber-trace-id: <trace-id>:<span-id>:<parent-span-id>:<flags>`
#[derive(Debug, Default, Clone, Copy)]
pub struct JaegerPropagator;

impl SpanContextExtractor for JaegerPropagator {
    fn extract(&self, headers: &HeaderMap) -> Option<SpanContext> {
        let raw = headers.get(UBER_TRACE_ID)?.to_str().ok()?;
        let value = raw.replace("%3A", ":").replace("%3a", ":");
        let parts: Vec<&str> = value.trim().split(':').collect();
        if parts.len() != 4 {
            return None;
        }

        let (trace_id, span_id, flags) = (parts[0], parts[1], parts[3]);
        if trace_id.is_empty() || trace_id.len() > 32 || span_id.is_empty() || span_id.len() > 16
        {
            return None;
        }
        if !is_valid_id(trace_id) || !is_valid_id(span_id) {
            return None;
        }

        let flags = u8::from_str_radix(flags, 16).ok()?;
        Some(SpanContext {
            trace_id: format!("{:0>32}", trace_id.to_ascii_lowercase()),
            span_id: format!("{:0>16}", span_id.to_ascii_lowercase()),
            sampled: flags & 0x01 == 0x01,
        })
    }
}

fn is_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_valid_id(s: &str) -> bool {
    is_hex(s) && s.bytes().any(|b| b != b'0')
}

fn new_trace_id() -> String {
    format!("{:032x}", uuid::Uuid::new_v4().as_u128())
}

fn new_span_id() -> String {
    format!("{:016x}", fastrand::u64(1..))
}

/// Starts request spans from propagated or freshly minted context.
pub struct Tracer {
    extractors: Vec<Box<dyn SpanContextExtractor>>,
    sampling_ratio: f64,
}

impl Tracer {
    /// Tracer understanding W3C and Jaeger headers, in that order.
    pub fn new(sampling_ratio: f64) -> Self {
        Self::with_extractors(
            vec![Box::new(W3cTraceContext), Box::new(JaegerPropagator)],
            sampling_ratio,
        )
    }

    pub fn with_extractors(
        extractors: Vec<Box<dyn SpanContextExtractor>>,
        sampling_ratio: f64,
    ) -> Self {
        Self {
            extractors,
            sampling_ratio: sampling_ratio.clamp(0.0, 1.0),
        }
    }

    /// Span context for a new request: a child of the propagated context if
    /// any, otherwise a new root sampled with the configured ratio.
    pub fn start(&self, headers: &HeaderMap) -> SpanContext {
        if let Some(parent) = self.extractors.iter().find_map(|e| e.extract(headers)) {
            return parent.child();
        }

        // A debug header forces sampling of a new root.
        let sampled =
            headers.contains_key(JAEGER_DEBUG_ID) || fastrand::f64() < self.sampling_ratio;
        SpanContext {
            trace_id: new_trace_id(),
            span_id: new_span_id(),
            sampled,
        }
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("extractors", &self.extractors.len())
            .field("sampling_ratio", &self.sampling_ratio)
            .finish()
    }
}
