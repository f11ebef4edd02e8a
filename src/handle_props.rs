use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use async_stream::stream;
use bytes::Bytes;
use futures_util::StreamExt;
use headers::HeaderMapExt;
use http::header::HeaderValue;
use http::{Response, StatusCode};
use xml::EmitterConfig;
use xml::common::XmlVersion;
use xml::writer::EventWriter;
use xml::writer::XmlEvent as XmlWEvent;

use crate::DavResult;
use crate::body::Body;
use crate::davhandler::Resource;
use crate::davheaders::Depth;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::*;
use crate::ls::request_owner;
use crate::request::DavRequest;
use crate::util::{ALLOW_DIR, ALLOW_FILE, DavMethod, dav_method, etag, secs_to_systemtime, systemtime_to_httpdate};

const NS_DAV_URI: &str = "DAV:";
const MULTISTATUS_TYPE: &str = "application/xml;charset=utf-8";

// Timestamps of the fake listing in reject mode.
const REJECT_ROOT_MTIME: u64 = 312768000;
const REJECT_ENTRY_MTIME: u64 = 1459526860;

type Emitter = EventWriter<Vec<u8>>;

// What goes into one <D:response> block.
pub(crate) struct PropEntry {
    path: DavPath,
    is_dir: bool,
    len: u64,
    modified: SystemTime,
    created: SystemTime,
}

impl PropEntry {
    fn new(path: DavPath, meta: &dyn DavMetaData) -> PropEntry {
        let modified = meta.modified().unwrap_or(UNIX_EPOCH);
        PropEntry {
            path,
            is_dir: meta.is_dir(),
            len: meta.len(),
            modified,
            created: meta.created().unwrap_or(modified),
        }
    }

    fn fake(path: DavPath, is_dir: bool, mtime: u64) -> PropEntry {
        let t = secs_to_systemtime(mtime);
        PropEntry {
            path,
            is_dir,
            len: 0,
            modified: t,
            created: t,
        }
    }
}

// Generates the multistatus document. The output is collected in
// the emitter's buffer and taken out piece by piece with `take`.
pub(crate) struct PropWriter {
    emitter: Emitter,
    // (available, used)
    quota: Option<(u64, u64)>,
}

impl PropWriter {
    pub fn new(quota: Option<(u64, u64)>) -> DavResult<PropWriter> {
        let mut emitter = EmitterConfig::new()
            .perform_indent(false)
            .normalize_empty_elements(false)
            .create_writer(Vec::new());
        emitter.write(XmlWEvent::StartDocument {
            version: XmlVersion::Version10,
            encoding: Some("utf-8"),
            standalone: None,
        })?;
        emitter.write(XmlWEvent::start_element("D:multistatus").ns("D", NS_DAV_URI))?;
        Ok(PropWriter { emitter, quota })
    }

    fn elem(&mut self, name: &str, text: &str) -> DavResult<()> {
        self.emitter.write(XmlWEvent::start_element(name))?;
        self.emitter.write(XmlWEvent::characters(text))?;
        self.emitter.write(XmlWEvent::end_element())?;
        Ok(())
    }

    pub fn write_entry(&mut self, e: &PropEntry) -> DavResult<()> {
        let href = e.path.as_url_string();
        self.emitter.write(XmlWEvent::start_element("D:response"))?;
        self.elem("D:href", &href)?;
        self.emitter.write(XmlWEvent::start_element("D:propstat"))?;
        self.emitter.write(XmlWEvent::start_element("D:prop"))?;

        self.elem("D:getlastmodified", &systemtime_to_httpdate(e.modified))?;
        self.elem("D:creationdate", &systemtime_to_httpdate(e.created))?;
        self.elem("D:getetag", &format!("\"{}\"", etag(&href, e.modified)))?;
        self.emitter.write(XmlWEvent::start_element("D:resourcetype"))?;
        if e.is_dir {
            self.emitter.write(XmlWEvent::start_element("D:collection"))?;
            self.emitter.write(XmlWEvent::end_element())?;
        }
        self.emitter.write(XmlWEvent::end_element())?;
        if !e.is_dir {
            self.elem("D:getcontentlength", &e.len.to_string())?;
            self.elem("D:getcontenttype", e.path.mime_type())?;
        }
        if let Some((avail, used)) = self.quota {
            self.elem("D:quota-available-bytes", &avail.to_string())?;
            self.elem("D:quota-used-bytes", &used.to_string())?;
        }

        self.emitter.write(XmlWEvent::end_element())?; // prop
        self.elem("D:status", "HTTP/1.1 200 OK")?;
        self.emitter.write(XmlWEvent::end_element())?; // propstat
        self.emitter.write(XmlWEvent::end_element())?; // response
        Ok(())
    }

    // Take what has been generated so far.
    pub fn take(&mut self) -> Bytes {
        Bytes::from(std::mem::take(self.emitter.inner_mut()))
    }

    pub fn close(&mut self) -> DavResult<Bytes> {
        self.emitter.write(XmlWEvent::end_element())?;
        Ok(self.take())
    }
}

fn contains(hay: &[u8], needle: &[u8]) -> bool {
    hay.windows(needle.len()).any(|w| w == needle)
}

fn multistatus(body: Body, allow: &'static str) -> Response<Body> {
    let mut res = Response::new(body);
    *res.status_mut() = StatusCode::MULTI_STATUS;
    let h = res.headers_mut();
    h.insert("allow", HeaderValue::from_static(allow));
    h.insert("content-type", HeaderValue::from_static(MULTISTATUS_TYPE));
    res
}

impl crate::DavInner {
    pub(crate) async fn handle_propfind(
        &self,
        req: &DavRequest,
        path: &DavPath,
        resource: Resource,
        depth: Depth,
        xmldata: &[u8],
    ) -> DavResult<Response<Body>> {
        if resource == Resource::Absent {
            return Err(DavError::Issue(StatusCode::NOT_FOUND, "Not found"));
        }

        // a client that asks for lockdiscovery wants to find out
        // about locks, so it cannot be refused because of one.
        if !contains(xmldata, b"lockdiscovery") {
            let owner = request_owner(req.header_str("if"), xmldata);
            self.check_lock(path, owner)?;
        }

        let quota = if contains(xmldata, b"quota") {
            let (used, total) = self.fs.get_quota().await.unwrap_or((0, None));
            Some((total.unwrap_or(0).saturating_sub(used), used))
        } else {
            None
        };

        let meta = self.metadata(path).await?;
        let is_dir = meta.is_dir();
        let mut pw = PropWriter::new(quota)?;
        pw.write_entry(&PropEntry::new(path.clone(), &*meta))?;

        let allow = if is_dir { ALLOW_DIR } else { ALLOW_FILE };
        if !is_dir || depth == Depth::Zero {
            debug!("propfind {}: single resource", path);
            let data = pw.close()?;
            let body = Body::from_stream(futures_util::stream::once(async move { Ok(data) }));
            return Ok(multistatus(body, allow));
        }

        // directories are listed lazily, one directory per chunk.
        let fs = self.fs.clone();
        let version = (self.version_davpath(path), self.version_meta());
        let start = path.clone();
        let body = Body::from_stream(stream! {
            let mut pw = pw;
            yield Ok(pw.take());

            let mut stack = vec![start];
            while let Some(dir) = stack.pop() {
                let mut entries = Vec::new();
                match fs.read_dir(&dir).await {
                    Ok(mut strm) => {
                        while let Some(dirent) = strm.next().await {
                            let child = dir.join(&dirent.name());
                            match dirent.metadata().await {
                                Ok(meta) => entries.push(PropEntry::new(child, &*meta)),
                                Err(e) => debug!("metadata error on {}. Skipping {:?}", child, e),
                            }
                        }
                    },
                    // if we cannot read_dir, just skip it.
                    Err(e) => error!("read_dir error on {}: {:?}", dir, e),
                }
                if dir.is_root() {
                    entries.retain(|e| e.path != version.0);
                    entries.push(PropEntry::new(version.0.clone(), &*version.1));
                }

                let mut subdirs = Vec::new();
                for entry in &entries {
                    if let Err(e) = pw.write_entry(entry) {
                        yield Err(io::Error::from(e));
                        return;
                    }
                    if depth == Depth::Infinity && entry.is_dir {
                        subdirs.push(entry.path.clone());
                    }
                }
                stack.extend(subdirs.into_iter().rev());
                yield Ok(pw.take());
            }

            match pw.close() {
                Ok(data) => yield Ok(data),
                Err(e) => yield Err(io::Error::from(e)),
            }
        });
        Ok(multistatus(body, allow))
    }

    // Reject mode: OPTIONS works, and PROPFIND shows a root directory
    // with a single entry named after the message.
    pub(crate) async fn handle_reject(&self, req: &DavRequest, message: &str) -> DavResult<Response<Body>> {
        match dav_method(&req.method) {
            Ok(DavMethod::Options) => self.handle_options().await,
            Ok(DavMethod::PropFind) => {
                let root = DavPath {
                    path: b"/".to_vec(),
                    prefix: Vec::new(),
                };
                let mut pw = PropWriter::new(None)?;
                pw.write_entry(&PropEntry::fake(root.clone(), true, REJECT_ROOT_MTIME))?;
                if let Some(Depth::One) = req.headers.typed_get::<Depth>() {
                    let entry = root.join(message.as_bytes());
                    pw.write_entry(&PropEntry::fake(entry, false, REJECT_ENTRY_MTIME))?;
                }
                let data = pw.close()?;
                Ok(multistatus(Body::from(data), ALLOW_DIR))
            },
            _ => Err(DavError::Issue(StatusCode::NOT_FOUND, "Not found")),
        }
    }
}
