use http::header::HeaderValue;
use http::{Response, StatusCode};
use tokio::io::AsyncRead;

use crate::DavResult;
use crate::body::Body;
use crate::davhandler::Resource;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::*;
use crate::ls::request_owner;
use crate::request::{DavRequest, RequestBody};
use crate::transfer::{Progress, UploadError, copy_in};
use crate::util::ALLOW_FILE;

impl crate::DavInner {
    pub(crate) async fn handle_put<R>(
        &self,
        req: &DavRequest,
        path: DavPath,
        resource: Resource,
        body: &mut RequestBody<'_, R>,
    ) -> DavResult<Response<Body>>
    where
        R: AsyncRead + Unpin + Send,
    {
        if resource == Resource::Directory {
            return Err(DavError::Issue(StatusCode::NOT_FOUND, "Not found"));
        }

        let owner = request_owner(req.header_str("if"), &[]);
        self.check_lock(&path, owner)?;

        let path = self.sanitize(path);
        let existed = match self.resolve(&path).await {
            Resource::Directory => return Err(DavError::Issue(StatusCode::NOT_FOUND, "Not found")),
            Resource::File => true,
            Resource::Absent => false,
        };

        let mut file = match self.fs.open(&path, OpenOptions::write()).await {
            Ok(f) => f,
            Err(e) => {
                debug!("put {}: open: {:?}", path, e);
                return Err(DavError::Issue(StatusCode::INTERNAL_SERVER_ERROR, "Unable to create a new file"));
            },
        };

        let total = body.remaining();
        debug!("put {}: ready for data ({} bytes)", path, total);
        let name = String::from_utf8_lossy(path.file_name()).into_owned();
        let mut progress = Progress::new(self.progress.clone(), name, total, true);
        let res = copy_in(body, &mut file, self.read_buf_size, self.read_timeout, &mut progress).await;
        drop(file);

        let err = match res {
            Ok(n) => {
                debug!("put {}: {} bytes stored", path, n);
                None
            },
            Err(UploadError::ShortWrite) => Some(DavError::Issue(StatusCode::INTERNAL_SERVER_ERROR, "Write data failed")),
            Err(UploadError::Timeout) => Some(DavError::IssueClose(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Timed out waiting for data",
            )),
            Err(UploadError::Failed(e)) => Some(e),
        };
        if let Some(err) = err {
            // never leave a partial file behind.
            if let Err(e) = self.fs.remove_file(&path).await {
                warn!("put {}: removing partial file: {:?}", path, e);
            }
            return Err(err);
        }

        let mut res = Response::new(Body::empty());
        res.headers_mut()
            .insert("allow", HeaderValue::from_static(ALLOW_FILE));
        *res.status_mut() = if existed {
            StatusCode::OK
        } else {
            StatusCode::CREATED
        };
        Ok(res)
    }
}
