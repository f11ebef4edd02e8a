use futures_util::future::{BoxFuture, FutureExt};
use http::header::HeaderValue;
use http::{Response, StatusCode};

use crate::DavResult;
use crate::body::Body;
use crate::davhandler::Resource;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::*;
use crate::ls::request_owner;
use crate::request::DavRequest;
use crate::util::ALLOW_CREATED;
use crate::walk::{Visit, Visitor, walk};

// Removes everything it is shown. Directories are shown after their
// contents, so they are empty by then.
struct Remover<'a> {
    fs: &'a dyn DavFileSystem,
    failed: usize,
}

impl Visitor for Remover<'_> {
    fn visit<'a>(&'a mut self, _depth: usize, path: &'a DavPath, meta: &'a dyn DavMetaData) -> BoxFuture<'a, Visit> {
        async move {
            let (kind, res) = if meta.is_dir() {
                ("[ dir]", self.fs.remove_dir(path).await)
            } else {
                ("[file]", self.fs.remove_file(path).await)
            };
            match res {
                Ok(()) => trace!("delete {} {}: ok", kind, path),
                // some stores drop directories as soon as they are empty.
                Err(FsError::NotFound) if meta.is_dir() => trace!("delete {} {}: gone", kind, path),
                Err(e) => {
                    warn!("delete {} {}: {:?}", kind, path, e);
                    self.failed += 1;
                },
            }
            Visit::Continue
        }
        .boxed()
    }
}

impl crate::DavInner {
    // Remove a directory and everything below it. Failures on single
    // entries are logged, only failing to remove `path` itself is an error.
    pub(crate) async fn remove_tree(&self, path: &DavPath) -> FsResult<()> {
        let mut remover = Remover {
            fs: &*self.fs,
            failed: 0,
        };
        if let Err(e) = walk(&*self.fs, path, None, &mut remover).await {
            warn!("delete {}: walk: {:?}", path, e);
        }
        if remover.failed > 0 {
            debug!("delete {}: {} entries could not be removed", path, remover.failed);
        }
        match self.fs.remove_dir(path).await {
            Err(FsError::NotFound) => Ok(()),
            res => res,
        }
    }

    // Recreate `dir` and whatever ancestors of it have gone missing.
    pub(crate) async fn restore_dir(&self, dir: &DavPath) {
        let mut missing = Vec::new();
        let mut d = dir.clone();
        while !d.is_root() && !self.is_dir(&d).await {
            let parent = d.parent();
            missing.push(d);
            d = parent;
        }
        for d in missing.into_iter().rev() {
            debug!("recreating directory {}", d);
            if let Err(e) = self.fs.create_dir(&d).await {
                warn!("recreating directory {}: {:?}", d, e);
                return;
            }
        }
    }

    pub(crate) async fn handle_delete(
        &self,
        req: &DavRequest,
        path: &DavPath,
        resource: Resource,
    ) -> DavResult<Response<Body>> {
        let res = match resource {
            Resource::Absent => return Err(DavError::Issue(StatusCode::NOT_FOUND, "Not found")),
            Resource::File => {
                let owner = request_owner(req.header_str("if"), &[]);
                self.check_lock(path, owner)?;
                self.fs.remove_file(path).await
            },
            Resource::Directory => {
                let owner = request_owner(req.header_str("if"), &[]);
                self.check_lock(path, owner)?;
                if path.is_root() {
                    return Err(DavError::Issue(StatusCode::FORBIDDEN, "Forbidden"));
                }
                self.remove_tree(path).await
            },
        };

        // the store may have dropped the parent together with its last
        // entry, and the grandparent with it. They have to stay.
        self.restore_dir(&path.parent()).await;

        if let Err(e) = res {
            debug!("delete {}: {:?}", path, e);
            return Err(DavError::Issue(StatusCode::INTERNAL_SERVER_ERROR, "Unable to delete"));
        }

        let mut res = Response::new(Body::empty());
        res.headers_mut()
            .insert("allow", HeaderValue::from_static(ALLOW_CREATED));
        *res.status_mut() = StatusCode::OK;
        Ok(res)
    }
}
