//! Byte-counting body wrappers.
//!
//! Both wrappers forward frames, errors and size hints untouched; they only
//! look at the length of data frames.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, HttpBody};
use hyper::body::{Frame, SizeHint};

/// Request body that counts the bytes read by the handler.
#[derive(Debug)]
pub struct CountingBody {
    inner: Body,
    read: Arc<AtomicU64>,
}

impl CountingBody {
    pub fn new(inner: Body, read: Arc<AtomicU64>) -> Self {
        Self { inner, read }
    }
}

impl hyper::body::Body for CountingBody {
    type Data = <Body as HttpBody>::Data;
    type Error = <Body as HttpBody>::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let poll_result = Pin::new(&mut self.inner).poll_frame(cx);

        if let Poll::Ready(Some(Ok(frame))) = &poll_result {
            if let Some(data) = frame.data_ref() {
                self.read.fetch_add(data.len() as u64, Ordering::Relaxed);
            }
        }

        poll_result
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

type Observer = Box<dyn FnOnce(u64) + Send>;

/// Response body that reports the bytes written once the body is finished,
/// failed or dropped, whichever happens first.
pub struct ObservedBody {
    inner: Body,
    written: u64,
    observer: Option<Observer>,
}

impl ObservedBody {
    pub fn new(inner: Body, observer: impl FnOnce(u64) + Send + 'static) -> Self {
        Self {
            inner,
            written: 0,
            observer: Some(Box::new(observer)),
        }
    }

    fn finish(&mut self) {
        if let Some(observer) = self.observer.take() {
            observer(self.written);
        }
    }
}

impl hyper::body::Body for ObservedBody {
    type Data = <Body as HttpBody>::Data;
    type Error = <Body as HttpBody>::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let poll_result = Pin::new(&mut self.inner).poll_frame(cx);

        match &poll_result {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    self.written += data.len() as u64;
                }
            }
            Poll::Ready(None) | Poll::Ready(Some(Err(_))) => self.finish(),
            Poll::Pending => {}
        }

        poll_result
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for ObservedBody {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::stream;
    use std::sync::Mutex;

    fn chunked(chunks: &[&'static str]) -> Body {
        let chunks: Vec<Result<Bytes, std::io::Error>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        Body::from_stream(stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_counting_body_counts_every_chunk() {
        let read = Arc::new(AtomicU64::new(0));
        let body = Body::new(CountingBody::new(chunked(&["abc", "", "defg"]), read.clone()));

        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"abcdefg");
        assert_eq!(read.load(Ordering::Relaxed), 7);
    }

    #[tokio::test]
    async fn test_observed_body_reports_once_at_end() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let body = Body::new(ObservedBody::new(chunked(&["hello", " ", "world"]), move |n| {
            sink.lock().unwrap().push(n)
        }));

        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(bytes.len(), 11);
        assert_eq!(*seen.lock().unwrap(), vec![11]);
    }

    #[test]
    fn test_observed_body_reports_on_drop() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        drop(ObservedBody::new(Body::from("unsent"), move |n| {
            sink.lock().unwrap().push(n)
        }));
        assert_eq!(*seen.lock().unwrap(), vec![0]);
    }
}
