//! Writing a response to the transport.
//!
//! The status line and headers go out first, followed by the body,
//! framed either by a `Content-Length` or with chunked
//! transfer-encoding.
use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use http::header::{self, HeaderMap};
use http::{Response, StatusCode};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::body::Body;

/// How the length of a response body is communicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContentLength {
    /// Not set by the handler: the body is in memory, so its
    /// length is known.
    NotSet,
    /// Generated on the fly, length unknown: send it chunked.
    Unknown,
    /// Set explicitly by the handler.
    Fixed(u64),
}

impl ContentLength {
    fn from_parts(headers: &HeaderMap, body: &Body) -> ContentLength {
        let fixed = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        match (fixed, body.len()) {
            (Some(n), _) => ContentLength::Fixed(n),
            (None, Some(_)) => ContentLength::NotSet,
            (None, None) => ContentLength::Unknown,
        }
    }
}

fn status_line(status: StatusCode) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_str(),
        status.canonical_reason().unwrap_or("Unknown")
    )
}

/// Serialize the response head. Handler-set headers go out in order,
/// followed by the framing header and `Connection`.
pub(crate) fn response_head(status: StatusCode, headers: &HeaderMap, clen: ContentLength, body_len: u64, keep_alive: bool) -> Vec<u8> {
    let mut head = status_line(status).into_bytes();
    for (name, value) in headers.iter() {
        if name == header::CONTENT_LENGTH || name == header::CONNECTION || name == header::TRANSFER_ENCODING {
            continue;
        }
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    match clen {
        ContentLength::NotSet => head.extend_from_slice(format!("Content-Length: {}\r\n", body_len).as_bytes()),
        ContentLength::Fixed(n) => head.extend_from_slice(format!("Content-Length: {}\r\n", n).as_bytes()),
        ContentLength::Unknown => head.extend_from_slice(b"Transfer-Encoding: chunked\r\n"),
    }
    let conn: &[u8] = if keep_alive { b"keep-alive" } else { b"close" };
    head.extend_from_slice(b"Connection: ");
    head.extend_from_slice(conn);
    head.extend_from_slice(b"\r\n\r\n");
    head
}

// write with a time limit.
async fn write_all<W>(w: &mut W, data: &[u8], timeout: Duration) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match tokio::time::timeout(timeout, w.write_all(data)).await {
        Ok(res) => res,
        Err(_) => Err(io::ErrorKind::TimedOut.into()),
    }
}

/// Write a complete response. Any error means the transport is in an
/// unknown state and must be closed.
pub(crate) async fn write_response<W>(w: &mut W, resp: Response<Body>, keep_alive: bool, timeout: Duration) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let (parts, mut body) = resp.into_parts();
    let clen = ContentLength::from_parts(&parts.headers, &body);
    let body_len = body.len().unwrap_or(0);
    trace!("response {} {:?}", parts.status, clen);

    let head = response_head(parts.status, &parts.headers, clen, body_len, keep_alive);
    write_all(w, &head, timeout).await?;

    let mut sent = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk: Bytes = match chunk {
            Ok(c) => c,
            Err(e) => {
                error!("response body aborted after {} bytes: {}", sent, e);
                return Err(e);
            },
        };
        if chunk.is_empty() {
            continue;
        }
        if clen == ContentLength::Unknown {
            write_all(w, format!("{:x}\r\n", chunk.len()).as_bytes(), timeout).await?;
            write_all(w, &chunk, timeout).await?;
            write_all(w, b"\r\n", timeout).await?;
        } else {
            write_all(w, &chunk, timeout).await?;
        }
        sent += chunk.len() as u64;
    }
    if clen == ContentLength::Unknown {
        write_all(w, b"0\r\n\r\n", timeout).await?;
    } else if let ContentLength::Fixed(n) = clen {
        if sent != n && sent != 0 {
            error!("response body: sent {} bytes, announced {}", sent, n);
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
    }
    match tokio::time::timeout(timeout, w.flush()).await {
        Ok(res) => res,
        Err(_) => Err(io::ErrorKind::TimedOut.into()),
    }
}
