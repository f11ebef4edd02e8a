//! Definitions for the Response body.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::stream::Stream;
use http_body::{Body as HttpBody, Frame, SizeHint};

type BoxStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Body is returned by the webdav handler, and implements both `Stream`
/// and `http_body::Body`.
pub struct Body {
    pub(crate) inner: BodyType,
}

pub(crate) enum BodyType {
    Bytes(Option<Bytes>),
    Stream(BoxStream),
    Empty,
}

impl Body {
    /// Return an empty body.
    pub fn empty() -> Body {
        Body {
            inner: BodyType::Empty,
        }
    }

    /// A body that is produced on the fly. It will be sent chunked
    /// unless the response carries a `Content-Length`.
    pub(crate) fn from_stream<S>(s: S) -> Body
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Body {
            inner: BodyType::Stream(Box::pin(s)),
        }
    }

    /// Length, if it is known in advance.
    pub(crate) fn len(&self) -> Option<u64> {
        match self.inner {
            BodyType::Bytes(ref b) => Some(b.as_ref().map(|b| b.len() as u64).unwrap_or(0)),
            BodyType::Empty => Some(0),
            BodyType::Stream(_) => None,
        }
    }
}

impl Stream for Body {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        match self.inner {
            BodyType::Bytes(ref mut strm) => Poll::Ready(strm.take().map(Ok)),
            BodyType::Stream(ref mut strm) => strm.as_mut().poll_next(cx),
            BodyType::Empty => Poll::Ready(None),
        }
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
        self.poll_next(cx).map(|item| item.map(|res| res.map(Frame::data)))
    }

    fn is_end_stream(&self) -> bool {
        match self.inner {
            BodyType::Bytes(ref b) => b.is_none(),
            BodyType::Empty => true,
            BodyType::Stream(_) => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self.len() {
            Some(n) => SizeHint::with_exact(n),
            None => SizeHint::default(),
        }
    }
}

impl From<String> for Body {
    fn from(t: String) -> Body {
        Body {
            inner: BodyType::Bytes(Some(Bytes::from(t))),
        }
    }
}

impl From<&str> for Body {
    fn from(t: &str) -> Body {
        Body {
            inner: BodyType::Bytes(Some(Bytes::from(t.to_string()))),
        }
    }
}

impl From<Bytes> for Body {
    fn from(t: Bytes) -> Body {
        Body {
            inner: BodyType::Bytes(Some(t)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_collect() {
        let body = Body::from("hello");
        assert_eq!(HttpBody::size_hint(&body).exact(), Some(5));
        let data = body.collect().await.unwrap().to_bytes();
        assert_eq!(data, Bytes::from_static(b"hello"));

        let strm = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"a")),
            Ok(Bytes::from_static(b"bc")),
        ]);
        let body = Body::from_stream(strm);
        assert!(body.len().is_none());
        let data = body.collect().await.unwrap().to_bytes();
        assert_eq!(data, Bytes::from_static(b"abc"));
    }
}
