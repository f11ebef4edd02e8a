use futures_util::future::{BoxFuture, FutureExt};
use headers::HeaderMapExt;
use http::header::HeaderValue;
use http::{Response, StatusCode};

use crate::DavResult;
use crate::body::Body;
use crate::davhandler::Resource;
use crate::davheaders::{Depth, Overwrite};
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::*;
use crate::ls::request_owner;
use crate::request::DavRequest;
use crate::transfer::copy_file;
use crate::util::ALLOW_CREATED;
use crate::walk::{Visit, Visitor, dump_tree, walk};

// Is `path` equal to, or below, `dir`.
fn is_within(path: &DavPath, dir: &DavPath) -> bool {
    if dir.is_root() {
        return true;
    }
    let (p, d) = (path.as_bytes(), dir.as_bytes());
    p.starts_with(d) && (p.len() == d.len() || p[d.len()] == b'/')
}

// The path that `path` (somewhere below `from`) has below `to`.
fn rebase(path: &DavPath, from: &DavPath, to: &DavPath) -> DavPath {
    let rest = if from.is_root() {
        path.as_bytes()
    } else {
        &path.as_bytes()[from.as_bytes().len()..]
    };
    let mut p = if to.is_root() { Vec::new() } else { to.path.clone() };
    p.extend_from_slice(rest);
    if p.is_empty() {
        p.push(b'/');
    }
    DavPath {
        path: p,
        prefix: to.prefix.clone(),
    }
}

fn done(status: StatusCode) -> Response<Body> {
    let mut res = Response::new(Body::empty());
    res.headers_mut()
        .insert("allow", HeaderValue::from_static(ALLOW_CREATED));
    *res.status_mut() = status;
    res
}

// Copies a directory tree, recreating the directories on the way in.
struct TreeCopier<'a> {
    inner: &'a crate::DavInner,
    from: &'a DavPath,
    to: &'a DavPath,
    overwrite: bool,
    error: Option<DavError>,
}

impl Visitor for TreeCopier<'_> {
    fn enter_dir<'a>(&'a mut self, _depth: usize, path: &'a DavPath) -> BoxFuture<'a, Visit> {
        async move {
            let dest = self.inner.sanitize(rebase(path, self.from, self.to));
            if self.inner.is_dir(&dest).await {
                return Visit::Continue;
            }
            match self.inner.fs.create_dir(&dest).await {
                Ok(()) => Visit::Continue,
                Err(e) => {
                    debug!("copy: mkdir {}: {:?}", dest, e);
                    self.error = Some(DavError::Issue(StatusCode::INTERNAL_SERVER_ERROR, "Unable to create directory"));
                    Visit::Abort
                },
            }
        }
        .boxed()
    }

    fn visit<'a>(&'a mut self, _depth: usize, path: &'a DavPath, meta: &'a dyn DavMetaData) -> BoxFuture<'a, Visit> {
        async move {
            if meta.is_dir() {
                return Visit::Continue;
            }
            let dest = self.inner.sanitize(rebase(path, self.from, self.to));
            trace!("copy: {} -> {}", path, dest);
            match self.inner.copy_one(path, &dest, self.overwrite).await {
                Ok(()) => Visit::Continue,
                Err(e) => {
                    self.error = Some(e);
                    Visit::Abort
                },
            }
        }
        .boxed()
    }
}

impl crate::DavInner {
    // Copy one file.
    pub(crate) async fn copy_one(&self, src: &DavPath, dst: &DavPath, overwrite: bool) -> DavResult<()> {
        if !overwrite && self.fs.metadata(dst).await.is_ok() {
            debug!("copy: {} exists and overwrite is false", dst);
            return Err(DavError::Issue(StatusCode::PRECONDITION_FAILED, "Precondition Failed"));
        }
        let mut srcfile = match self.fs.open(src, OpenOptions::read()).await {
            Ok(f) => f,
            Err(e) => {
                debug!("copy: open {}: {:?}", src, e);
                return Err(DavError::Issue(StatusCode::PAYLOAD_TOO_LARGE, "Request Entity Too Large"));
            },
        };
        let mut dstfile = match self.fs.open(dst, OpenOptions::write()).await {
            Ok(f) => f,
            Err(e) => {
                debug!("copy: create {}: {:?}", dst, e);
                return Err(DavError::Issue(StatusCode::PAYLOAD_TOO_LARGE, "Request Entity Too Large"));
            },
        };
        let n = copy_file(&mut srcfile, &mut dstfile, self.read_buf_size).await?;
        trace!("copy: {} -> {}: {} bytes", src, dst, n);
        Ok(())
    }

    pub(crate) async fn handle_copy(
        &self,
        req: &DavRequest,
        path: &DavPath,
        resource: Resource,
        depth: Depth,
    ) -> DavResult<Response<Body>> {
        if resource == Resource::Absent {
            return Err(DavError::Issue(StatusCode::NOT_FOUND, "Not found"));
        }
        let dest = match req.header_str("destination") {
            Some(d) => d,
            None => return Err(DavError::Issue(StatusCode::NOT_FOUND, "Not found")),
        };

        // "COPY /a http://host/b/" copies into the existing collection b.
        let (mut dest, into) = DavPath::from_destination_slashes(dest, &self.prefix)?;
        let mut status = StatusCode::CREATED;
        if into {
            dest = dest.join(path.file_name());
            status = StatusCode::NO_CONTENT;
        }
        let dest = self.sanitize(dest);
        let parent = dest.parent();
        debug!("copy: {} -> {}", path, dest);

        let owner = request_owner(req.header_str("if"), &[]);
        self.check_lock(&dest, owner)?;
        self.check_lock(&parent, owner)?;

        if self.is_version(&dest) || is_within(&dest, path) {
            return Err(DavError::Issue(StatusCode::FORBIDDEN, "Forbidden"));
        }
        let overwrite = req.headers.typed_get::<Overwrite>().is_none_or(|o| o.0);

        if resource == Resource::File {
            if !self.is_dir(&parent).await {
                debug!("copy: dest dir {} not existing", parent);
                return Err(DavError::Issue(StatusCode::CONFLICT, "Conflict"));
            }
            self.copy_one(path, &dest, overwrite).await?;
            return Ok(done(status));
        }

        // directory.
        if !self.is_dir(&parent).await {
            debug!("copy: {} is not a directory", parent);
            return Err(DavError::Issue(StatusCode::CONFLICT, "Conflict"));
        }
        match self.fs.metadata(&dest).await {
            Ok(_) if !overwrite => {
                return Err(DavError::Issue(StatusCode::PRECONDITION_FAILED, "Precondition Failed"));
            },
            Ok(m) if !m.is_dir() => {
                return Err(DavError::Issue(StatusCode::CONFLICT, "Conflict"));
            },
            Ok(_) => {},
            Err(_) => {
                if let Err(e) = self.fs.create_dir(&dest).await {
                    debug!("copy: mkdir {}: {:?}", dest, e);
                    return Err(DavError::Issue(StatusCode::INTERNAL_SERVER_ERROR, "Unable to create directory"));
                }
            },
        }

        let max_depth = if depth == Depth::Infinity { None } else { Some(0) };
        let mut copier = TreeCopier {
            inner: self,
            from: path,
            to: &dest,
            overwrite,
            error: None,
        };
        walk(&*self.fs, path, max_depth, &mut copier).await?;
        if let Some(e) = copier.error {
            return Err(e);
        }
        Ok(done(status))
    }

    pub(crate) async fn handle_move(
        &self,
        req: &DavRequest,
        path: &DavPath,
        resource: Resource,
    ) -> DavResult<Response<Body>> {
        let dest = match req.header_str("destination") {
            Some(d) if resource != Resource::Absent => d,
            _ => return Err(DavError::Issue(StatusCode::NOT_FOUND, "Not found")),
        };
        let mut dest = self.sanitize(DavPath::from_url(dest, &self.prefix)?);
        debug!("move: {} -> {}", path, dest);

        let owner = request_owner(req.header_str("if"), &[]);
        self.check_lock(path, owner)?;
        self.check_lock(&dest, owner)?;

        // moving onto a collection means moving into it.
        let mut status = StatusCode::CREATED;
        if self.is_dir(&dest).await {
            dest = self.sanitize(dest.join(path.file_name()));
            status = StatusCode::NO_CONTENT;
        }
        if path.is_root() || self.is_version(&dest) || is_within(&dest, path) {
            return Err(DavError::Issue(StatusCode::FORBIDDEN, "Forbidden"));
        }

        if let Ok(meta) = self.fs.metadata(&dest).await {
            if req.headers.typed_get::<Overwrite>() == Some(Overwrite(false)) {
                return Err(DavError::Issue(StatusCode::PRECONDITION_FAILED, "Precondition Failed"));
            }
            let res = if meta.is_dir() {
                self.remove_tree(&dest).await
            } else {
                self.fs.remove_file(&dest).await
            };
            if let Err(e) = res {
                debug!("move: removing {}: {:?}", dest, e);
            }
        }

        if log_enabled!(log::Level::Trace) {
            trace!("move: before\n{}", dump_tree(&*self.fs, &path.parent()).await);
        }
        if let Err(e) = self.fs.rename(path, &dest).await {
            debug!("move: rename {} -> {}: {:?}", path, dest, e);
            return Err(DavError::Issue(StatusCode::INTERNAL_SERVER_ERROR, "Unable to move"));
        }
        if log_enabled!(log::Level::Trace) {
            trace!("move: after\n{}", dump_tree(&*self.fs, &dest.parent()).await);
        }
        Ok(done(status))
    }
}
