use http::header::HeaderValue;
use http::{Response, StatusCode};

use crate::DavResult;
use crate::body::Body;
use crate::davhandler::Resource;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::request::DavRequest;
use crate::util::ALLOW_CREATED;

impl crate::DavInner {
    pub(crate) async fn handle_mkcol(
        &self,
        req: &DavRequest,
        path: &DavPath,
        resource: Resource,
    ) -> DavResult<Response<Body>> {
        if req.content_length > 0 {
            return Err(DavError::Issue(StatusCode::UNSUPPORTED_MEDIA_TYPE, "Unsupported Media Type"));
        }
        if resource != Resource::Absent {
            return Err(DavError::Issue(StatusCode::METHOD_NOT_ALLOWED, "Not allowed"));
        }
        if !self.is_dir(&path.parent()).await {
            debug!("mkcol {}: parent is not a directory", path);
            return Err(DavError::Issue(StatusCode::CONFLICT, "Conflict"));
        }

        if let Err(e) = self.fs.create_dir(path).await {
            debug!("mkcol {}: {:?}", path, e);
            return Err(DavError::Issue(StatusCode::INTERNAL_SERVER_ERROR, "Unable to create directory"));
        }
        debug!("mkcol {}: directory created", path);

        let mut res = Response::new(Body::empty());
        res.headers_mut()
            .insert("allow", HeaderValue::from_static(ALLOW_CREATED));
        *res.status_mut() = StatusCode::CREATED;
        Ok(res)
    }
}
