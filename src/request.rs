//! Reading a request from the transport: request line, headers, body.
//!
//! Only a fixed set of headers is recognized, everything else is
//! dropped on the floor. A fresh `HeaderMap` is built for every
//! request, so nothing leaks from one request into the next.
use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode, Version};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};

use crate::DavResult;
use crate::errors::DavError;

// longest request line or header line we accept.
const MAX_LINE: u64 = 8192;
// max. number of header lines.
const MAX_HEADERS: usize = 100;

const RECOGNIZED: &[&str] = &[
    "host",
    "depth",
    "content-length",
    "destination",
    "range",
    "overwrite",
    "if",
    "lock-token",
    "connection",
];

/// The request line and the recognized headers.
#[derive(Debug)]
pub(crate) struct DavRequest {
    pub method: Method,
    /// The raw request-target, still percent-encoded.
    pub target: String,
    pub version: Version,
    pub headers: HeaderMap,
    pub content_length: u64,
}

impl DavRequest {
    /// Does the client want the connection to stay open.
    pub fn keep_alive(&self) -> bool {
        let conn = self
            .headers
            .get(header::CONNECTION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_default();
        match self.version {
            Version::HTTP_10 => conn.contains("keep-alive"),
            _ => !conn.contains("close"),
        }
    }

    /// Header value as a string, if present and valid.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

// Read one line, without the line ending. Ok(None) at end-of-file.
async fn read_line<R>(rd: &mut R, buf: &mut Vec<u8>) -> DavResult<Option<()>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = (&mut *rd).take(MAX_LINE).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') {
        if n as u64 >= MAX_LINE {
            debug!("request line too long");
            return Err(DavError::StatusClose(StatusCode::BAD_REQUEST));
        }
        // partial line, then EOF.
        return Ok(None);
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(()))
}

async fn read_line_timeout<R>(rd: &mut R, buf: &mut Vec<u8>, timeout: Duration) -> DavResult<Option<()>>
where
    R: AsyncBufRead + Unpin,
{
    match tokio::time::timeout(timeout, read_line(rd, buf)).await {
        Ok(res) => res,
        Err(_) => Err(DavError::Timeout),
    }
}

// split the request line in method, target, and version.
fn parse_request_line(line: &[u8]) -> DavResult<(Method, String, Version)> {
    let bad = || DavError::StatusClose(StatusCode::BAD_REQUEST);
    let line = std::str::from_utf8(line).map_err(|_| bad())?;
    let sp1 = line.find(' ').ok_or_else(bad)?;
    let sp2 = line[sp1 + 1..].find(' ').ok_or_else(bad)? + sp1 + 1;
    let method = Method::from_bytes(line[..sp1].as_bytes()).map_err(|_| bad())?;
    let target = &line[sp1 + 1..sp2];
    if target.is_empty() {
        return Err(bad());
    }
    let version = match line[sp2 + 1..].trim() {
        "HTTP/1.0" => Version::HTTP_10,
        v if v.starts_with("HTTP/") => Version::HTTP_11,
        _ => return Err(bad()),
    };
    Ok((method, target.to_string(), version))
}

// "Name: value". Returns None for lines we do not care about.
fn parse_header_line(line: &[u8]) -> Option<(HeaderName, HeaderValue)> {
    let colon = line.iter().position(|&c| c == b':')?;
    let name = std::str::from_utf8(&line[..colon]).ok()?.trim().to_ascii_lowercase();
    if !RECOGNIZED.contains(&name.as_str()) {
        return None;
    }
    let mut value = &line[colon + 1..];
    if value.first() == Some(&b' ') {
        value = &value[1..];
    }
    let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
    let value = HeaderValue::from_bytes(value).ok()?;
    Some((name, value))
}

/// Read the request line and the headers.
///
/// Waiting for the request line is bounded by `idle`; if it expires, or
/// the peer closes the connection, this returns `Ok(None)`. The header
/// lines must then arrive within `read_timeout` each.
pub(crate) async fn read_request<R>(rd: &mut R, idle: Duration, read_timeout: Duration) -> DavResult<Option<DavRequest>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();

    // skip empty lines before the request line.
    loop {
        match read_line_timeout(rd, &mut line, idle).await {
            Ok(Some(())) if line.is_empty() => continue,
            Ok(Some(())) => break,
            Ok(None) | Err(DavError::Timeout) => return Ok(None),
            Err(e) => return Err(e),
        }
    }
    let (method, target, version) = parse_request_line(&line)?;

    let mut headers = HeaderMap::new();
    let mut count = 0;
    loop {
        if read_line_timeout(rd, &mut line, read_timeout).await?.is_none() {
            return Err(DavError::IoError(io::ErrorKind::UnexpectedEof.into()));
        }
        if line.is_empty() {
            break;
        }
        count += 1;
        if count > MAX_HEADERS {
            return Err(DavError::StatusClose(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE));
        }
        if let Some((name, value)) = parse_header_line(&line) {
            trace!("header {}: {:?}", name, value);
            headers.insert(name, value);
        }
    }

    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);

    Ok(Some(DavRequest {
        method,
        target,
        version,
        headers,
        content_length,
    }))
}

/// The request body, as far as it has not been read yet.
pub(crate) struct RequestBody<'r, R> {
    reader: &'r mut R,
    remaining: u64,
}

impl<'r, R> RequestBody<'r, R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: &'r mut R, content_length: u64) -> RequestBody<'r, R> {
        RequestBody {
            reader,
            remaining: content_length,
        }
    }

    /// Bytes of the body that have not been consumed.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Drain the whole body into memory. The body must arrive within
    /// `timeout`, and may not be larger than `max_size`.
    pub async fn read_all(&mut self, max_size: usize, timeout: Duration) -> DavResult<Vec<u8>> {
        if self.remaining == 0 {
            return Ok(Vec::new());
        }
        if self.remaining > max_size as u64 {
            debug!("request body too large: {} bytes", self.remaining);
            return Err(DavError::StatusClose(StatusCode::PAYLOAD_TOO_LARGE));
        }
        let mut data = Vec::with_capacity(self.remaining as usize);
        let mut rd = (&mut *self.reader).take(self.remaining);
        let fut = rd.read_to_end(&mut data);
        match tokio::time::timeout(timeout, fut).await {
            Ok(res) => {
                res?;
            },
            Err(_) => {
                debug!("timeout draining request body");
                return Err(DavError::Timeout);
            },
        }
        self.remaining -= data.len() as u64;
        if self.remaining > 0 {
            return Err(DavError::IoError(io::ErrorKind::UnexpectedEof.into()));
        }
        Ok(data)
    }

    /// Read the next piece of the body, at most `max` bytes. Waits at
    /// most `timeout` for data. Returns an empty buffer when the whole
    /// body has been read.
    pub async fn read_chunk(&mut self, max: usize, timeout: Duration) -> DavResult<Bytes> {
        if self.remaining == 0 {
            return Ok(Bytes::new());
        }
        let want = std::cmp::min(self.remaining, max as u64) as usize;
        let mut buf = BytesMut::with_capacity(want);
        let mut rd = (&mut *self.reader).take(want as u64);
        let fut = rd.read_buf(&mut buf);
        let n = match tokio::time::timeout(timeout, fut).await {
            Ok(res) => res?,
            Err(_) => return Err(DavError::Timeout),
        };
        if n == 0 {
            return Err(DavError::IoError(io::ErrorKind::UnexpectedEof.into()));
        }
        self.remaining -= n as u64;
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    const T: Duration = Duration::from_secs(1);

    async fn parse(data: &'static [u8]) -> DavResult<Option<DavRequest>> {
        let mut rd = BufReader::new(data);
        read_request(&mut rd, T, T).await
    }

    #[tokio::test]
    async fn test_request_line() {
        let req = parse(b"PROPFIND /a//b HTTP/1.1\r\nDepth: 1\r\nX-Other: x\r\n\r\n")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.method.as_str(), "PROPFIND");
        assert_eq!(req.target, "/a//b");
        assert_eq!(req.version, Version::HTTP_11);
        assert_eq!(req.header_str("depth"), Some("1"));
        assert!(req.headers.get("x-other").is_none());
        assert_eq!(req.content_length, 0);
        assert!(req.keep_alive());
    }

    #[tokio::test]
    async fn test_bad_request_line() {
        let err = parse(b"GET/ HTTP/1.1\r\n\r\n").await.unwrap_err();
        assert_eq!(err.statuscode(), StatusCode::BAD_REQUEST);
        assert!(err.must_close());
        let err = parse(b"GET /x\r\n\r\n").await.unwrap_err();
        assert_eq!(err.statuscode(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_eof() {
        assert!(parse(b"").await.unwrap().is_none());
        assert!(parse(b"\r\n").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_content_length_and_keepalive() {
        let req = parse(b"PUT /f HTTP/1.0\r\nContent-Length: abc\r\n\r\n").await.unwrap().unwrap();
        assert_eq!(req.content_length, 0);
        assert!(!req.keep_alive());
        let req = parse(b"PUT /f HTTP/1.0\r\nContent-Length:12\r\nConnection: Keep-Alive\r\n\r\n")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.content_length, 12);
        assert!(req.keep_alive());
    }

    #[tokio::test]
    async fn test_body() {
        let mut rd: &[u8] = b"0123456789rest";
        let mut body = RequestBody::new(&mut rd, 10);
        assert_eq!(body.read_chunk(4, T).await.unwrap(), Bytes::from_static(b"0123"));
        assert_eq!(body.remaining(), 6);
        assert_eq!(body.read_all(100, T).await.unwrap(), b"456789");
        assert_eq!(body.read_chunk(4, T).await.unwrap().len(), 0);
        assert_eq!(rd, b"rest");
    }

    #[tokio::test]
    async fn test_body_too_large() {
        let mut rd: &[u8] = b"0123456789";
        let mut body = RequestBody::new(&mut rd, 10);
        let err = body.read_all(5, T).await.unwrap_err();
        assert_eq!(err.statuscode(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(err.must_close());
    }
}
