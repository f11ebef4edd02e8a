use http::header::HeaderValue;
use http::{Response, StatusCode};

use crate::DavResult;
use crate::body::Body;
use crate::davhandler::Resource;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::ls::*;
use crate::request::DavRequest;
use crate::util::ALLOW_LOCKED;

// Body of a successful LOCK.
fn lock_body(token: &LockToken) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <D:prop xmlns:D=\"DAV:\"><D:lockdiscovery><D:activelock>\
         <D:locktoken><D:href>{}</D:href></D:locktoken>\
         </D:activelock></D:lockdiscovery></D:prop>",
        token
    )
}

impl crate::DavInner {
    pub(crate) async fn handle_lock(
        &self,
        req: &DavRequest,
        path: &DavPath,
        resource: Resource,
        xmldata: &[u8],
    ) -> DavResult<Response<Body>> {
        // must have a locksystem or bail
        let locksystem = match self.ls {
            Some(ref ls) => ls,
            None => return Err(DavError::UnknownDavMethod),
        };
        if resource == Resource::Absent {
            return Err(DavError::Issue(StatusCode::NOT_FOUND, "Not found"));
        }

        // a lock refresh carries the token in If:, a new lock
        // names its owner in the body.
        let owner = request_owner(req.header_str("if"), xmldata);
        if owner == 0 {
            debug!("lock {}: no usable owner", path);
            return Err(DavError::Issue(StatusCode::PRECONDITION_FAILED, "Precondition failed"));
        }

        let token = LockToken {
            path_hash: path_hash(path),
            owner_hash: owner,
        };
        match locksystem.acquire(token.path_hash, token.owner_hash) {
            Ok(outcome) => debug!("lock {}: {:?} token {}", path, outcome, token),
            Err(e) => {
                debug!("lock {}: {:?}", path, e);
                return Err(DavError::Issue(StatusCode::LOCKED, "Locked"));
            },
        }

        let mut res = Response::new(Body::from(lock_body(&token)));
        let h = res.headers_mut();
        h.insert("allow", HeaderValue::from_static(ALLOW_LOCKED));
        if let Ok(v) = HeaderValue::from_str(&format!("<{}>", token)) {
            h.insert("lock-token", v);
        }
        h.insert(
            "content-type",
            HeaderValue::from_static("application/xml;charset=utf-8"),
        );
        *res.status_mut() = StatusCode::OK;
        Ok(res)
    }

    pub(crate) async fn handle_unlock(&self, req: &DavRequest, path: &DavPath) -> DavResult<Response<Body>> {
        // must have a locksystem or bail
        let locksystem = match self.ls {
            Some(ref ls) => ls,
            None => return Err(DavError::UnknownDavMethod),
        };

        let token = match req.header_str("lock-token").and_then(|h| LockToken::extract(h, "<", ">")) {
            Some(t) => t,
            None => {
                debug!("unlock {}: no valid Lock-Token", path);
                return Err(DavError::Issue(StatusCode::LOCKED, "Locked"));
            },
        };
        if let Err(e) = locksystem.release(path_hash(path), token.owner_hash) {
            debug!("unlock {}: {:?}", path, e);
            return Err(DavError::Issue(StatusCode::LOCKED, "Locked"));
        }

        let mut res = Response::new(Body::empty());
        res.headers_mut()
            .insert("allow", HeaderValue::from_static(ALLOW_LOCKED));
        *res.status_mut() = StatusCode::NO_CONTENT;
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_body() {
        let t = LockToken {
            path_hash: 0xabc,
            owner_hash: 1,
        };
        let body = lock_body(&t);
        assert!(body.contains("<D:href>00000abc00000001</D:href>"));
        assert!(body.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?><D:prop xmlns:D=\"DAV:\">"));
    }
}
