use http::header::HeaderValue;
use http::{Response, StatusCode};

use crate::DavResult;
use crate::body::Body;
use crate::util::{ALLOW_OPTIONS, ALLOW_OPTIONS_LOCK};

impl crate::DavInner {
    pub(crate) async fn handle_options(&self) -> DavResult<Response<Body>> {
        let allow = if self.ls.is_some() {
            ALLOW_OPTIONS_LOCK
        } else {
            ALLOW_OPTIONS
        };
        let mut res = Response::new(Body::empty());
        *res.status_mut() = StatusCode::OK;
        res.headers_mut().insert("allow", HeaderValue::from_static(allow));
        Ok(res)
    }
}
