//! Request body decoding.

use std::io::Read;

use axum::body::Body;
use axum::http::header::CONTENT_ENCODING;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use serde::de::DeserializeOwned;

/// The only encoding agents use; it carries a zlib stream.
pub const DEFLATE: &str = "deflate";

/// A body that could not be turned into a payload. Always the client's fault.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("{0}")]
    Read(#[source] axum::Error),
    #[error("{0}")]
    Inflate(#[source] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("trying to send message larger than max when decompressed (limit {limit})")]
    TooLarge { limit: u64 },
}

impl IntoResponse for DecodeError {
    fn into_response(self) -> Response {
        if let DecodeError::TooLarge { .. } = self {
            tracing::warn!(response_code = 413, err = %self, "can't read body");
            return (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()).into_response();
        }
        let msg = match &self {
            DecodeError::Json(_) => "can't unmarshal json",
            DecodeError::Read(_) | DecodeError::Inflate(_) | DecodeError::TooLarge { .. } => {
                "can't read body"
            }
        };
        tracing::warn!(response_code = 400, err = %self, "{msg}");
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

fn is_deflate(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case(DEFLATE))
}

/// Buffer the body and inflate it when the encoding header asks for it.
/// The inflated size is capped at `limit` bytes; `0` means no cap.
pub async fn read_body(headers: &HeaderMap, body: Body, limit: u64) -> Result<Bytes, DecodeError> {
    let raw = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(DecodeError::Read)?;
    if !is_deflate(headers) {
        return Ok(raw);
    }

    let cap = if limit == 0 { u64::MAX } else { limit.saturating_add(1) };
    let mut inflated = Vec::with_capacity(raw.len() * 4);
    ZlibDecoder::new(raw.as_ref())
        .take(cap)
        .read_to_end(&mut inflated)
        .map_err(DecodeError::Inflate)?;
    if limit > 0 && inflated.len() as u64 > limit {
        return Err(DecodeError::TooLarge { limit });
    }
    Ok(inflated.into())
}

/// Read and deserialize a JSON body.
pub async fn read_json<T: DeserializeOwned>(
    headers: &HeaderMap,
    body: Body,
    limit: u64,
) -> Result<T, DecodeError> {
    let bytes = read_body(headers, body, limit).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn deflate_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("deflate"));
        headers
    }

    #[tokio::test]
    async fn test_plain_json() {
        let value: serde_json::Value = read_json(&HeaderMap::new(), Body::from(r#"{"a":1}"#), 0)
            .await
            .unwrap();
        assert_eq!(value["a"], 1);
    }

    #[tokio::test]
    async fn test_deflate_json() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(br#"{"a":2}"#).unwrap();
        let compressed = encoder.finish().unwrap();

        let value: serde_json::Value = read_json(&deflate_headers(), Body::from(compressed), 0)
            .await
            .unwrap();
        assert_eq!(value["a"], 2);
    }

    #[tokio::test]
    async fn test_corrupt_deflate_stream() {
        let err = read_json::<serde_json::Value>(&deflate_headers(), Body::from("not zlib"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, DecodeError::Inflate(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_json_keeps_raw_error_text() {
        let err = read_json::<serde_json::Value>(&HeaderMap::new(), Body::from("{"), 0)
            .await
            .unwrap_err();
        let expected = serde_json::from_str::<serde_json::Value>("{").unwrap_err().to_string();
        assert_eq!(err.to_string(), expected);
    }

    fn compressed(payload: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn test_inflated_size_is_capped() {
        let payload = vec![b' '; 1 << 20];
        let body = compressed(&payload);
        assert!(body.len() < 64 * 1024);

        let err = read_body(&deflate_headers(), Body::from(body.clone()), 64 * 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, DecodeError::TooLarge { limit: 65536 }));
        assert_eq!(err.into_response().status(), StatusCode::PAYLOAD_TOO_LARGE);

        let exact = read_body(&deflate_headers(), Body::from(body), 1 << 20)
            .await
            .unwrap();
        assert_eq!(exact.len(), 1 << 20);
    }
}
