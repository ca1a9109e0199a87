//! Request body size limit.
//!
//! Buffers at most `limit + 1` bytes of the body. Anything longer is
//! rejected with `413`; otherwise the handler receives a fresh, fully
//! buffered body. Read failures are classified by cause.

use std::error::Error as StdError;
use std::io;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use bytes::BytesMut;
use futures_util::StreamExt;
use tower::Layer;

use crate::http::error::STATUS_CLIENT_CLOSED_REQUEST;
use crate::http::middleware::{into_handler, Handler, Middleware};

/// Failure while buffering a request body.
#[derive(Debug, thiserror::Error)]
pub enum LimitError {
    #[error("trying to send message larger than max ({read} vs {limit})")]
    TooLarge { read: u64, limit: u64 },
    #[error("failed to read request body: {0}")]
    Timeout(#[source] axum::Error),
    #[error("failed to read request body: {0}")]
    ClientClosed(#[source] axum::Error),
    #[error("failed to read request body: {0}")]
    Read(#[source] axum::Error),
}

impl LimitError {
    fn from_read(err: axum::Error) -> Self {
        if is_timeout(&err) {
            LimitError::Timeout(err)
        } else if is_client_closed(&err) {
            LimitError::ClientClosed(err)
        } else {
            LimitError::Read(err)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            LimitError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            LimitError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            LimitError::ClientClosed(_) => StatusCode::from_u16(STATUS_CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::BAD_REQUEST),
            LimitError::Read(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for LimitError {
    fn into_response(self) -> Response {
        tracing::warn!(err = %self, "failed to read request body");
        (self.status(), self.to_string()).into_response()
    }
}

fn causes<'a>(err: &'a (dyn StdError + 'static)) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |&e| e.source())
}

fn is_timeout(err: &axum::Error) -> bool {
    causes(err).any(|e| {
        e.downcast_ref::<hyper::Error>()
            .is_some_and(hyper::Error::is_timeout)
            || e.downcast_ref::<io::Error>()
                .is_some_and(|e| e.kind() == io::ErrorKind::TimedOut)
    })
}

fn is_client_closed(err: &axum::Error) -> bool {
    causes(err).any(|e| {
        e.downcast_ref::<hyper::Error>().is_some_and(|e| {
            e.is_incomplete_message() || e.is_canceled() || e.is_body_write_aborted()
        }) || e.downcast_ref::<io::Error>().is_some_and(|e| {
            matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            )
        })
    })
}

/// Read at most `limit + 1` bytes of `body`.
pub async fn read_limited(body: Body, limit: u64) -> Result<bytes::Bytes, LimitError> {
    let cap = limit.saturating_add(1);
    let mut buffer = BytesMut::new();
    let mut stream = body.into_data_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(LimitError::from_read)?;
        let room = cap - buffer.len() as u64;
        let take = chunk.len().min(usize::try_from(room).unwrap_or(usize::MAX));
        buffer.extend_from_slice(&chunk[..take]);
        if buffer.len() as u64 >= cap {
            break;
        }
    }

    let read = buffer.len() as u64;
    if read > limit {
        return Err(LimitError::TooLarge { read, limit });
    }
    Ok(buffer.freeze())
}

/// Body size limit middleware.
#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    max_request_body_size: u64,
}

impl RequestLimits {
    pub fn new(max_request_body_size: u64) -> Self {
        Self {
            max_request_body_size,
        }
    }
}

impl Middleware for RequestLimits {
    fn wrap(&self, next: Handler) -> Handler {
        into_handler(from_fn_with_state(*self, limit_body).layer(next))
    }
}

async fn limit_body(State(limits): State<RequestLimits>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    match read_limited(body, limits.max_request_body_size).await {
        Ok(bytes) => next.run(Request::from_parts(parts, Body::from(bytes))).await,
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::stream;

    fn failing(kind: io::ErrorKind) -> Body {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(kind, "connection trouble")),
        ];
        Body::from_stream(stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_at_limit_is_accepted() {
        let bytes = read_limited(Body::from("12345"), 5).await.unwrap();
        assert_eq!(&bytes[..], b"12345");
    }

    #[tokio::test]
    async fn test_one_over_limit_is_rejected() {
        let err = read_limited(Body::from("123456"), 5).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            err.to_string(),
            "trying to send message larger than max (6 vs 5)"
        );
    }

    #[tokio::test]
    async fn test_reading_stops_after_limit_plus_one() {
        let err = read_limited(Body::from(vec![b'x'; 1000]), 10).await.unwrap_err();
        assert!(matches!(err, LimitError::TooLarge { read: 11, limit: 10 }));
    }

    #[tokio::test]
    async fn test_read_failures_are_classified() {
        let cases = [
            (io::ErrorKind::TimedOut, 408),
            (io::ErrorKind::UnexpectedEof, 499),
            (io::ErrorKind::Other, 500),
        ];
        for (kind, code) in cases {
            let err = read_limited(failing(kind), 100).await.unwrap_err();
            assert_eq!(err.status().as_u16(), code, "{kind:?}");
            assert!(err.to_string().starts_with("failed to read request body: "));
        }
    }
}
