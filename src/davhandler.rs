//
// This module contains the main entry point of the library,
// DavHandler.
//
use std::io;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use headers::HeaderMapExt;
use http::header::{self, HeaderMap, HeaderValue};
use http::{Response, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use crate::body::Body;
use crate::davheaders::Depth;
use crate::davpath::{self, DavPath};
use crate::errors::DavError;
use crate::fs::*;
use crate::ls::*;
use crate::request::{self, DavRequest, RequestBody};
use crate::response;
use crate::transfer::ProgressFn;
use crate::util::{ALLOW_OPTIONS, ALLOW_OPTIONS_LOCK, DavMethod, dav_method};
use crate::voidfs::VoidFs;
use crate::DavResult;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5000);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_READ_BUF_SIZE: usize = 1460;
const DEFAULT_MAX_BURST: u64 = 65536;
const DEFAULT_MAX_BODY_SIZE: usize = 65536;
const DEFAULT_VERSION_PATH: &str = "/.wiredav";

/// WebDAV request handler.
///
/// Create one with [`builder`](Self::builder), then hand it connections
/// with [`serve`](Self::serve). A `DavHandler` is cheap to clone.
#[derive(Clone)]
pub struct DavHandler {
    pub(crate) config: Arc<DavConfig>,
    started: SystemTime,
}

/// Configuration of the handler.
#[derive(Clone, Default)]
pub struct DavConfig {
    // Prefix to be stripped off when handling request.
    pub(crate) prefix: Option<String>,
    // Filesystem backend.
    pub(crate) fs: Option<Box<dyn DavFileSystem>>,
    // Locksystem backend.
    pub(crate) ls: Option<Box<dyn DavLockSystem>>,
    // how long a single read from the client may take.
    pub(crate) read_timeout: Option<Duration>,
    // how long to wait for the next request on a kept-alive connection.
    pub(crate) idle_timeout: Option<Duration>,
    // read buffer size in bytes
    pub(crate) read_buf_size: Option<usize>,
    // max. size of an open-ended range response.
    pub(crate) max_burst: Option<u64>,
    // max. size of a request body that is read into memory.
    pub(crate) max_body_size: Option<usize>,
    // virtual read-only file: path and contents.
    pub(crate) version_resource: Option<(String, String)>,
    // transfer progress callback.
    pub(crate) progress: Option<Arc<ProgressFn>>,
}

impl DavConfig {
    /// Create a new configuration builder.
    pub fn new() -> DavConfig {
        DavConfig::default()
    }

    /// Use the configuration that was built to generate a DavHandler.
    pub fn build_handler(self) -> DavHandler {
        DavHandler {
            config: Arc::new(self),
            started: SystemTime::now(),
        }
    }

    /// Prefix to be stripped off before translating the rest of
    /// the request path to a filesystem path.
    pub fn strip_prefix(self, prefix: impl Into<String>) -> Self {
        let mut this = self;
        this.prefix = Some(prefix.into());
        this
    }

    /// Set the filesystem to use.
    pub fn filesystem(self, fs: Box<dyn DavFileSystem>) -> Self {
        let mut this = self;
        this.fs = Some(fs);
        this
    }

    /// Set the locksystem to use. Without one, LOCK and UNLOCK
    /// are not available.
    pub fn locksystem(self, ls: Box<dyn DavLockSystem>) -> Self {
        let mut this = self;
        this.ls = Some(ls);
        this
    }

    /// How long to wait for data from the client (default 5 seconds).
    pub fn read_timeout(self, timeout: Duration) -> Self {
        let mut this = self;
        this.read_timeout = Some(timeout);
        this
    }

    /// How long an idle connection is kept open (default 5 seconds).
    pub fn idle_timeout(self, timeout: Duration) -> Self {
        let mut this = self;
        this.idle_timeout = Some(timeout);
        this
    }

    /// Read buffer size in bytes (default 1460).
    pub fn read_buf_size(self, size: usize) -> Self {
        let mut this = self;
        this.read_buf_size = Some(size.max(1));
        this
    }

    /// Largest response to an open-ended range request (default 64 KiB).
    pub fn max_burst(self, size: u64) -> Self {
        let mut this = self;
        this.max_burst = Some(size.max(1));
        this
    }

    /// Largest request body that is buffered in memory (default 64 KiB).
    /// PUT bodies are streamed and not affected by this.
    pub fn max_body_size(self, size: usize) -> Self {
        let mut this = self;
        this.max_body_size = Some(size);
        this
    }

    /// The virtual read-only file that reports the server version.
    /// Default `/.wiredav`, containing `wiredav <version>`.
    pub fn version_resource(self, path: impl Into<String>, text: impl Into<String>) -> Self {
        let mut this = self;
        this.version_resource = Some((path.into(), text.into()));
        this
    }

    /// Called during GET and PUT transfers with the file name, the
    /// percentage done, and `true` when receiving.
    pub fn progress<F>(self, cb: F) -> Self
    where
        F: Fn(&str, u8, bool) + Send + Sync + 'static,
    {
        let mut this = self;
        this.progress = Some(Arc::new(cb));
        this
    }
}

// The actual inner struct.
//
// At the start of a connection, DavConfig is used to generate
// a DavInner struct. DavInner::handle then handles the requests.
pub(crate) struct DavInner {
    pub prefix: String,
    pub fs: Box<dyn DavFileSystem>,
    pub has_fs: bool,
    pub ls: Option<Box<dyn DavLockSystem>>,
    pub read_timeout: Duration,
    pub idle_timeout: Duration,
    pub read_buf_size: usize,
    pub max_burst: u64,
    pub max_body_size: usize,
    pub version_path: Vec<u8>,
    pub version_text: String,
    pub started: SystemTime,
    pub progress: Option<Arc<ProgressFn>>,
}

// Metadata of the virtual version file.
#[derive(Debug, Clone)]
pub(crate) struct VersionMeta {
    len: u64,
    modified: SystemTime,
}

impl DavMetaData for VersionMeta {
    fn len(&self) -> u64 {
        self.len
    }

    fn modified(&self) -> FsResult<SystemTime> {
        Ok(self.modified)
    }

    fn is_dir(&self) -> bool {
        false
    }
}

/// What the request path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resource {
    Absent,
    File,
    Directory,
}

impl DavHandler {
    /// Return a configuration builder.
    pub fn builder() -> DavConfig {
        DavConfig::new()
    }

    fn inner(&self) -> DavInner {
        DavInner::new(self.config.as_ref().clone(), self.started)
    }

    /// Does this URL belong to us, i.e. is it below the prefix.
    pub fn is_dav_path(&self, url: &str) -> bool {
        let prefix = self.config.prefix.as_deref().unwrap_or("");
        DavPath::from_request_target(url, prefix).is_ok()
    }

    /// Service one connection: read requests and write responses until
    /// the client closes the connection, it has been idle for too
    /// long, or an error makes it unusable.
    pub async fn serve<IO>(&self, io: IO) -> io::Result<()>
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let inner = self.inner();
        let (rd, wr) = tokio::io::split(io);
        let mut reader = BufReader::new(rd);
        let mut writer = BufWriter::new(wr);

        loop {
            let req = match request::read_request(&mut reader, inner.idle_timeout, inner.read_timeout).await {
                Ok(Some(req)) => req,
                Ok(None) => {
                    trace!("connection closed or idle");
                    break;
                },
                Err(e) => {
                    debug!("bad request: {:?}", e);
                    let resp = inner.finalize(inner.issue(&e, None));
                    let _ = response::write_response(&mut writer, resp, false, inner.read_timeout).await;
                    break;
                },
            };

            let mut body = RequestBody::new(&mut reader, req.content_length);
            let (resp, close) = inner.handle(&req, &mut body).await;
            let keep_alive = !close && req.keep_alive() && body.remaining() == 0;

            if let Err(e) = response::write_response(&mut writer, resp, keep_alive, inner.read_timeout).await {
                debug!("writing response failed: {}", e);
                break;
            }
            if !keep_alive {
                break;
            }
        }
        let _ = writer.shutdown().await;
        Ok(())
    }

    /// Service exactly one request while refusing real work. OPTIONS is
    /// answered, PROPFIND shows a root directory with a single entry
    /// named `message`, anything else is a 404. The connection is
    /// closed afterwards.
    pub async fn reject<IO>(&self, io: IO, message: &str) -> io::Result<()>
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let inner = self.inner();
        let (rd, wr) = tokio::io::split(io);
        let mut reader = BufReader::new(rd);
        let mut writer = BufWriter::new(wr);

        let resp = match request::read_request(&mut reader, inner.idle_timeout, inner.read_timeout).await {
            Ok(Some(req)) => {
                debug!("rejecting request {} {}: {}", req.method, req.target, message);
                let mut body = RequestBody::new(&mut reader, req.content_length);
                let res = match body.read_all(inner.max_body_size, inner.read_timeout).await {
                    Ok(_) => inner.handle_reject(&req, message).await,
                    Err(e) => Err(e),
                };
                match res {
                    Ok(resp) => resp,
                    Err(e) => inner.issue(&e, Some(&req)),
                }
            },
            Ok(None) => return Ok(()),
            Err(e) => inner.issue(&e, None),
        };
        let resp = inner.finalize(resp);
        let _ = response::write_response(&mut writer, resp, false, inner.read_timeout).await;
        let _ = writer.shutdown().await;
        Ok(())
    }
}

impl DavInner {
    pub fn new(cfg: DavConfig, started: SystemTime) -> DavInner {
        let DavConfig {
            prefix,
            fs,
            ls,
            read_timeout,
            idle_timeout,
            read_buf_size,
            max_burst,
            max_body_size,
            version_resource,
            progress,
        } = cfg;
        let (version_path, version_text) = match version_resource {
            Some((p, t)) => (p, t),
            None => (
                DEFAULT_VERSION_PATH.to_string(),
                format!("wiredav {}", env!("CARGO_PKG_VERSION")),
            ),
        };
        let version_path =
            davpath::normalize(version_path.as_bytes()).unwrap_or_else(|_| DEFAULT_VERSION_PATH.as_bytes().to_vec());
        DavInner {
            prefix: prefix.unwrap_or_default(),
            has_fs: fs.is_some(),
            fs: fs.unwrap_or_else(|| VoidFs::new()),
            ls,
            read_timeout: read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT),
            idle_timeout: idle_timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT),
            read_buf_size: read_buf_size.unwrap_or(DEFAULT_READ_BUF_SIZE),
            max_burst: max_burst.unwrap_or(DEFAULT_MAX_BURST),
            max_body_size: max_body_size.unwrap_or(DEFAULT_MAX_BODY_SIZE),
            version_path,
            version_text,
            started,
            progress,
        }
    }

    // Is this the virtual version file.
    pub(crate) fn is_version(&self, path: &DavPath) -> bool {
        path.as_bytes() == self.version_path.as_slice()
    }

    // The virtual version file, relative to the same prefix as `path`.
    pub(crate) fn version_davpath(&self, path: &DavPath) -> DavPath {
        DavPath {
            path: self.version_path.clone(),
            prefix: path.prefix.clone(),
        }
    }

    pub(crate) fn version_meta(&self) -> Box<dyn DavMetaData> {
        Box::new(VersionMeta {
            len: self.version_text.len() as u64,
            modified: self.started,
        })
    }

    // metadata, including that of the version file.
    pub(crate) async fn metadata(&self, path: &DavPath) -> DavResult<Box<dyn DavMetaData>> {
        if self.is_version(path) {
            return Ok(self.version_meta());
        }
        Ok(self.fs.metadata(path).await?)
    }

    // helper: classify the path.
    pub(crate) async fn resolve(&self, path: &DavPath) -> Resource {
        if self.is_version(path) {
            return Resource::File;
        }
        match self.fs.metadata(path).await {
            Ok(meta) if meta.is_dir() => Resource::Directory,
            Ok(_) => Resource::File,
            Err(_) => Resource::Absent,
        }
    }

    // helper.
    pub(crate) async fn is_dir(&self, path: &DavPath) -> bool {
        matches!(self.fs.metadata(path).await, Ok(m) if m.is_dir())
    }

    // Lock gate. Fails with 423 if `path` or one of its ancestors is
    // locked by someone else.
    pub(crate) fn check_lock(&self, path: &DavPath, owner: u32) -> DavResult<()> {
        if let Some(ref ls) = self.ls {
            if check_allowed(&**ls, path, owner).is_err() {
                debug!("{}: locked", path);
                return Err(DavError::Issue(StatusCode::LOCKED, "Locked"));
            }
        }
        Ok(())
    }

    // If the store has a maximum name length, shorten the last segment.
    pub(crate) fn sanitize(&self, path: DavPath) -> DavPath {
        match self.fs.max_name_len() {
            Some(max) => path.sanitize(max),
            None => path,
        }
    }

    // The single place where errors turn into responses: status line,
    // and a plain-text body that names the offending request.
    pub(crate) fn issue(&self, err: &DavError, req: Option<&DavRequest>) -> Response<Body> {
        let (uri, method) = match req {
            Some(req) => (req.target.as_str(), req.method.as_str()),
            None => ("", ""),
        };
        let text = format!("{}\nURI: {} Method: {}\n", err.text(), uri, method);
        let mut resp = Response::new(Body::from(text));
        *resp.status_mut() = err.statuscode();
        let allow = if self.ls.is_some() {
            ALLOW_OPTIONS_LOCK
        } else {
            ALLOW_OPTIONS
        };
        let h = resp.headers_mut();
        h.insert("allow", HeaderValue::from_static(allow));
        h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        resp
    }

    // Headers that go out with every response, in front of the rest.
    pub(crate) fn finalize(&self, mut resp: Response<Body>) -> Response<Body> {
        let mut headers = HeaderMap::new();
        let dav = if self.ls.is_some() { "1, 2" } else { "1" };
        headers.insert("dav", HeaderValue::from_static(dav));
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.extend(std::mem::take(resp.headers_mut()));
        *resp.headers_mut() = headers;
        resp
    }

    // Handle one request. Returns the response, and whether the
    // connection must be closed afterwards.
    pub(crate) async fn handle<R>(&self, req: &DavRequest, body: &mut RequestBody<'_, R>) -> (Response<Body>, bool)
    where
        R: AsyncRead + Unpin + Send,
    {
        // Turn any DavError results into a HTTP error response.
        let (resp, close) = match self.handle2(req, body).await {
            Ok(resp) => {
                debug!("== END REQUEST result OK");
                (resp, false)
            },
            Err(err) => {
                debug!("== END REQUEST result {:?}", err);
                let mut close = err.must_close();
                // refused before the body was read (PUT): skip over it,
                // so that the connection can be used for the next request.
                if !close && body.remaining() > 0 {
                    if let Err(e) = body.read_all(self.max_body_size, self.read_timeout).await {
                        debug!("unread request body: {:?}", e);
                        close = true;
                    }
                }
                (self.issue(&err, Some(req)), close)
            },
        };
        (self.finalize(resp), close)
    }

    // internal dispatcher part 2.
    async fn handle2<R>(&self, req: &DavRequest, body: &mut RequestBody<'_, R>) -> DavResult<Response<Body>>
    where
        R: AsyncRead + Unpin + Send,
    {
        // translate HTTP method to Webdav method.
        let method = dav_method(&req.method);

        // PUT is the only handler that reads the body itself. For all
        // the other methods it is read into memory first.
        let body_data = match method {
            Ok(DavMethod::Put) => Vec::new(),
            _ => body.read_all(self.max_body_size, self.read_timeout).await?,
        };

        let method = match method {
            Ok(DavMethod::Lock | DavMethod::Unlock) if self.ls.is_none() => Err(DavError::UnknownDavMethod),
            m => m,
        };
        let method = match method {
            Ok(m) => m,
            Err(e) => {
                debug!("refusing method {} request {}", req.method, req.target);
                return Err(e);
            },
        };

        // See if method makes sense if we don't have a filesystem.
        if !self.has_fs && method != DavMethod::Options {
            debug!("no filesystem: method not allowed on request {}", req.target);
            return Err(DavError::StatusClose(StatusCode::METHOD_NOT_ALLOWED));
        }

        // make sure the request path is valid.
        let path = DavPath::from_request_target(&req.target, &self.prefix)?;

        debug!("== START REQUEST {:?} {}", method, path);

        // The version file can be looked at, but not touched.
        if self.is_version(&path) {
            match method {
                DavMethod::Options | DavMethod::Get | DavMethod::Head | DavMethod::PropFind | DavMethod::PropPatch => {},
                _ => return Err(DavError::Issue(StatusCode::FORBIDDEN, "Read-only resource")),
            }
        }

        let resource = self.resolve(&path).await;
        let depth = match req.headers.typed_get::<Depth>() {
            Some(d) => d,
            None => Depth::Zero,
        };
        trace!("resource {:?} depth {:?}", resource, depth);

        match method {
            DavMethod::Options => self.handle_options().await,
            DavMethod::PropFind | DavMethod::PropPatch => {
                self.handle_propfind(req, &path, resource, depth, &body_data).await
            },
            DavMethod::Get => self.handle_get(req, &path, resource, true).await,
            DavMethod::Head => self.handle_get(req, &path, resource, false).await,
            DavMethod::Put => self.handle_put(req, path, resource, body).await,
            DavMethod::MkCol => self.handle_mkcol(req, &path, resource).await,
            DavMethod::Delete => self.handle_delete(req, &path, resource).await,
            DavMethod::Copy => self.handle_copy(req, &path, resource, depth).await,
            DavMethod::Move => self.handle_move(req, &path, resource).await,
            DavMethod::Lock => self.handle_lock(req, &path, resource, &body_data).await,
            DavMethod::Unlock => self.handle_unlock(req, &path).await,
        }
    }
}
