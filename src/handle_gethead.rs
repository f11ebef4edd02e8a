use std::io::SeekFrom;

use bytes::Bytes;
use headers::HeaderMapExt;
use http::header::{self, HeaderValue};
use http::{Response, StatusCode};

use crate::DavResult;
use crate::body::Body;
use crate::davhandler::Resource;
use crate::davheaders::ByteRange;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::*;
use crate::request::DavRequest;
use crate::transfer::{Progress, copy_out};
use crate::util::{ALLOW_DIR, ALLOW_FILE, systemtime_to_httpdate};

/// What part of a resource is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Span {
    /// Everything, with status 200.
    Full,
    /// Bytes `start..=end`, with status 206.
    Partial(u64, u64),
    /// 416.
    Unsatisfiable,
}

/// Work out the span to send for a `Range:` request on a resource of
/// `size` bytes. An open-ended range is capped at `max_burst` bytes.
pub(crate) fn resolve_range(range: Option<ByteRange>, size: u64, max_burst: u64) -> Span {
    let r = match range {
        Some(r) if size > 0 => r,
        _ => return Span::Full,
    };
    let last = size - 1;
    if r.start == 0 && r.end.is_none_or(|e| e == last) {
        return Span::Full;
    }
    if r.start >= size {
        return Span::Unsatisfiable;
    }
    let end = match r.end {
        Some(e) if e < r.start => return Span::Unsatisfiable,
        Some(e) => e.min(last),
        None => r.start.saturating_add(max_burst - 1).min(last),
    };
    Span::Partial(r.start, end)
}

fn header_value(s: &str) -> DavResult<HeaderValue> {
    HeaderValue::from_str(s).map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))
}

// a .gz file is sent with the type of what it contains, so it
// must be announced as gzip-encoded.
fn is_gzipped(path: &DavPath, ctype: &str) -> bool {
    path.file_name().ends_with(b".gz") && ctype != "application/x-gzip" && ctype != "application/octet-stream"
}

impl crate::DavInner {
    pub(crate) async fn handle_get(
        &self,
        req: &DavRequest,
        path: &DavPath,
        resource: Resource,
        is_get: bool,
    ) -> DavResult<Response<Body>> {
        match resource {
            Resource::Absent => return Err(DavError::Issue(StatusCode::NOT_FOUND, "Not found")),
            Resource::Directory => return Ok(self.handle_get_dir(path, is_get)),
            Resource::File => {},
        }

        let meta = self.metadata(path).await?;
        let size = meta.len();
        let ctype = path.mime_type();

        let mut res = Response::new(Body::empty());
        {
            let h = res.headers_mut();
            h.insert("allow", HeaderValue::from_static(ALLOW_FILE));
            h.insert(header::CONTENT_TYPE, HeaderValue::from_static(ctype));
            if is_gzipped(path, ctype) {
                h.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            }
            if let Ok(t) = meta.modified() {
                if let Ok(v) = HeaderValue::from_str(&systemtime_to_httpdate(t)) {
                    h.insert(header::LAST_MODIFIED, v);
                }
            }
        }

        let range = req.headers.typed_get::<ByteRange>();
        let (start, count) = match resolve_range(range, size, self.max_burst) {
            Span::Full => {
                *res.status_mut() = StatusCode::OK;
                (0, size)
            },
            Span::Partial(start, end) => {
                let cr = format!("bytes {}-{}/{}", start, end, size);
                res.headers_mut().insert(header::CONTENT_RANGE, header_value(&cr)?);
                *res.status_mut() = StatusCode::PARTIAL_CONTENT;
                (start, end - start + 1)
            },
            Span::Unsatisfiable => {
                debug!("get {}: range {:?} not satisfiable, size {}", path, range, size);
                let cr = format!("bytes */{}", size);
                res.headers_mut().insert(header::CONTENT_RANGE, header_value(&cr)?);
                *res.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
                return Ok(res);
            },
        };
        res.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from(count));

        if !is_get || count == 0 {
            return Ok(res);
        }

        if self.is_version(path) {
            let data = Bytes::from(self.version_text.clone());
            *res.body_mut() = Body::from(data.slice(start as usize..(start + count) as usize));
            return Ok(res);
        }

        let mut file = self.fs.open(path, OpenOptions::read()).await?;
        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
        }
        trace!("get {}: sending {} bytes from {}", path, count, start);
        let name = String::from_utf8_lossy(path.file_name()).into_owned();
        let progress = Progress::new(self.progress.clone(), name, count, false);
        *res.body_mut() = copy_out(file, count, self.read_buf_size, progress);
        Ok(res)
    }

    // A directory cannot be downloaded; say so instead of failing.
    fn handle_get_dir(&self, path: &DavPath, is_get: bool) -> Response<Body> {
        let text = format!("{} is a directory\n", path);
        let mut res = Response::new(Body::empty());
        let h = res.headers_mut();
        h.insert("allow", HeaderValue::from_static(ALLOW_DIR));
        h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        h.insert(header::CONTENT_LENGTH, HeaderValue::from(text.len()));
        if is_get {
            *res.body_mut() = Body::from(text);
        }
        *res.status_mut() = StatusCode::OK;
        res
    }
}
