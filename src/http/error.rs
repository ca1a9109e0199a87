//! Error taxonomy and its mapping to HTTP responses.
//!
//! # Responsibilities
//! - Define classified errors carrying an HTTP status and a safe message
//! - Walk an error chain and decide status, severity and response body
//! - Log the decision on the current span
//!
//! # Design Decisions
//! - Cancellation is checked anywhere in the chain before classification
//! - The outermost classified error decides the status
//! - Unclassified errors answer "unknown error" so internals never leak

use std::error::Error as StdError;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tower::BoxError;

/// Non-standard "client closed request" status.
pub const STATUS_CLIENT_CLOSED_REQUEST: u16 = 499;

/// Kind of a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Internal,
    BadRequest,
    /// The request cannot be served locally and belongs to another proxy.
    RequiresProxyRequest,
    Disabled,
    Unimplemented,
    UnprocessableEntity,
    Conflict,
    UnsupportedMediaType,
    TooManyRequests,
    RequestTimeout,
}

impl ErrorClass {
    /// Declared HTTP status of this class.
    pub fn status(self) -> StatusCode {
        match self {
            ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorClass::BadRequest | ErrorClass::RequiresProxyRequest => StatusCode::BAD_REQUEST,
            ErrorClass::Disabled | ErrorClass::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            ErrorClass::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorClass::Conflict => StatusCode::CONFLICT,
            ErrorClass::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorClass::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorClass::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
        }
    }
}

/// An error with an explicit HTTP status and a message safe to return to
/// clients.
#[derive(Debug)]
pub struct ClassifiedError {
    class: ErrorClass,
    message: String,
    reason: Option<String>,
    source: Option<BoxError>,
}

impl ClassifiedError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            reason: None,
            source: None,
        }
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::BadRequest, message)
    }

    /// `reason` must be low-cardinality; it is meant for metric labels.
    pub fn requires_proxy_request(message: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorClass::RequiresProxyRequest, message);
        err.reason = Some(reason.into());
        err
    }

    pub fn disabled() -> Self {
        Self::new(ErrorClass::Disabled, "feature disabled")
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unimplemented, message)
    }

    pub fn class(&self) -> ErrorClass {
        self.class
    }

    pub fn status(&self) -> StatusCode {
        self.class.status()
    }

    /// Client-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.class == ErrorClass::Disabled {
            return f.write_str("disabled");
        }
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message, source),
            None => f.write_str(&self.message),
        }
    }
}

impl StdError for ClassifiedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// The request was cancelled before it completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("context canceled")]
pub struct Canceled;

/// The request deadline passed before it completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("context deadline exceeded")]
pub struct DeadlineExceeded;

/// Log level chosen for a mapped error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warn,
    Error,
}

/// Outcome of mapping an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub severity: Severity,
    /// Response body.
    pub message: String,
    /// Message logged server side.
    pub log_message: String,
    /// Cause logged server side.
    pub cause: String,
}

fn chain<'a>(err: &'a (dyn StdError + 'static)) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |&e| e.source())
}

/// Decide status, severity and messages for an error without logging.
pub fn classify(err: &(dyn StdError + 'static)) -> ErrorResponse {
    if chain(err).any(|e| e.is::<Canceled>()) {
        return ErrorResponse {
            status: StatusCode::from_u16(STATUS_CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            severity: Severity::Error,
            message: "request canceled".to_owned(),
            log_message: "canceled".to_owned(),
            cause: err.to_string(),
        };
    }

    if let Some(classified) = chain(err).find_map(|e| e.downcast_ref::<ClassifiedError>()) {
        let status = classified.status();
        let severity = if status == StatusCode::BAD_REQUEST {
            Severity::Warn
        } else {
            Severity::Error
        };
        let cause = match classified.source() {
            Some(inner) => inner.to_string(),
            None => classified.to_string(),
        };
        return ErrorResponse {
            status,
            severity,
            message: classified.message().to_owned(),
            log_message: classified.message().to_owned(),
            cause,
        };
    }

    ErrorResponse {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        severity: Severity::Error,
        message: "unknown error".to_owned(),
        log_message: "unknown error".to_owned(),
        cause: err.to_string(),
    }
}

/// Log an error and translate it into a plain-text response.
///
/// The event is emitted inside the current span, so it is attached to the
/// request trace when one is active.
pub fn error_response(err: &(dyn StdError + 'static)) -> Response {
    let mapped = classify(err);
    let code = mapped.status.as_u16();

    match mapped.severity {
        Severity::Warn => tracing::warn!(
            response_code = code,
            err = %mapped.cause,
            "{}", mapped.log_message
        ),
        Severity::Error => tracing::error!(
            response_code = code,
            err = %mapped.cause,
            "{}", mapped.log_message
        ),
    }

    (mapped.status, mapped.message).into_response()
}

/// Adapter so handlers can return `Result<_, ApiError>` and use `?`.
#[derive(Debug)]
pub struct ApiError(pub BoxError);

impl<E> From<E> for ApiError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self(Box::new(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_response(self.0.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("wrapped: {0}")]
    struct Wrapper(#[source] BoxError);

    fn status_of(err: BoxError) -> u16 {
        classify(err.as_ref()).status.as_u16()
    }

    #[test]
    fn test_error_mapping_table() {
        assert_eq!(status_of(Box::new(Canceled)), 499);
        assert_eq!(status_of(Box::new(ClassifiedError::bad_request("bad"))), 400);
        assert_eq!(status_of(Box::new(ClassifiedError::disabled())), 501);
        assert_eq!(status_of(Box::new(ClassifiedError::unimplemented("no"))), 501);
        assert_eq!(
            status_of(Box::new(
                ClassifiedError::internal("boom").with_source(ClassifiedError::bad_request("bad"))
            )),
            500
        );
        assert_eq!(status_of("plain".into()), 500);
        assert_eq!(status_of(Box::new(DeadlineExceeded)), 500);
    }

    #[test]
    fn test_every_class_declares_its_status() {
        for (class, code) in [
            (ErrorClass::Internal, 500),
            (ErrorClass::BadRequest, 400),
            (ErrorClass::RequiresProxyRequest, 400),
            (ErrorClass::Disabled, 501),
            (ErrorClass::Unimplemented, 501),
            (ErrorClass::UnprocessableEntity, 422),
            (ErrorClass::Conflict, 409),
            (ErrorClass::UnsupportedMediaType, 415),
            (ErrorClass::TooManyRequests, 429),
            (ErrorClass::RequestTimeout, 408),
        ] {
            assert_eq!(class.status().as_u16(), code, "{class:?}");
        }
    }

    #[test]
    fn test_cancellation_wins_over_classification() {
        let err = ClassifiedError::bad_request("bad").with_source(Canceled);
        let mapped = classify(&err);
        assert_eq!(mapped.status.as_u16(), 499);
        assert_eq!(mapped.message, "request canceled");
    }

    #[test]
    fn test_classified_found_through_wrapper() {
        let err = Wrapper(Box::new(ClassifiedError::bad_request("can't translate series")));
        let mapped = classify(&err);
        assert_eq!(mapped.status, StatusCode::BAD_REQUEST);
        assert_eq!(mapped.severity, Severity::Warn);
        assert_eq!(mapped.message, "can't translate series");
    }

    #[test]
    fn test_cause_is_inner_error() {
        let err = ClassifiedError::internal("can't store host tags").with_source("disk full");
        let mapped = classify(&err);
        assert_eq!(mapped.severity, Severity::Error);
        assert_eq!(mapped.message, "can't store host tags");
        assert_eq!(mapped.cause, "disk full");
        assert_eq!(err.to_string(), "can't store host tags: disk full");
    }

    #[test]
    fn test_unknown_error_does_not_leak() {
        let err: BoxError = "secret bucket gs://internal".into();
        let mapped = classify(err.as_ref());
        assert_eq!(mapped.message, "unknown error");
        assert_eq!(mapped.cause, "secret bucket gs://internal");
    }

    #[test]
    fn test_disabled_text() {
        let err = ClassifiedError::disabled();
        assert_eq!(err.to_string(), "disabled");
        assert_eq!(err.message(), "feature disabled");
    }

    #[tokio::test]
    async fn test_error_response_body() {
        let response = ApiError::from(ClassifiedError::bad_request("nope")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"nope");
    }
}
