use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

use crate::DavResult;
use crate::errors::DavError;
use crate::ls::checksum;

/// HTTP Methods supported by DavHandler.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub(crate) enum DavMethod {
    Head,
    Get,
    Put,
    Options,
    PropFind,
    PropPatch,
    MkCol,
    Copy,
    Move,
    Delete,
    Lock,
    Unlock,
}

// translate method into our own enum that has webdav methods as well.
pub(crate) fn dav_method(m: &http::Method) -> DavResult<DavMethod> {
    let m = match *m {
        http::Method::HEAD => DavMethod::Head,
        http::Method::GET => DavMethod::Get,
        http::Method::PUT => DavMethod::Put,
        http::Method::DELETE => DavMethod::Delete,
        http::Method::OPTIONS => DavMethod::Options,
        _ => match m.as_str() {
            "PROPFIND" => DavMethod::PropFind,
            "PROPPATCH" => DavMethod::PropPatch,
            "MKCOL" => DavMethod::MkCol,
            "COPY" => DavMethod::Copy,
            "MOVE" => DavMethod::Move,
            "LOCK" => DavMethod::Lock,
            "UNLOCK" => DavMethod::Unlock,
            _ => {
                return Err(DavError::UnknownDavMethod);
            },
        },
    };
    Ok(m)
}

// Allow: header values, depending on what the request found or did.
pub(crate) const ALLOW_FILE: &str = "PROPFIND,OPTIONS,DELETE,COPY,MOVE,HEAD,POST,PUT,GET";
pub(crate) const ALLOW_DIR: &str = "PROPFIND,OPTIONS,DELETE,COPY,MOVE";
pub(crate) const ALLOW_CREATED: &str = "OPTIONS,MKCOL,LOCK,POST,PUT";
pub(crate) const ALLOW_OPTIONS: &str = "PROPFIND,GET,DELETE,PUT,COPY,MOVE";
pub(crate) const ALLOW_OPTIONS_LOCK: &str = "PROPFIND,GET,DELETE,PUT,COPY,MOVE,LOCK,UNLOCK";
pub(crate) const ALLOW_LOCKED: &str = "PROPPATCH,PROPFIND,OPTIONS,DELETE,UNLOCK,COPY,LOCK,MOVE,HEAD,POST,PUT,GET";

/// Format a timestamp the way HTTP and WebDAV want it:
/// `Tue, 13 Oct 2015 17:07:35 GMT`.
pub(crate) fn systemtime_to_httpdate(t: SystemTime) -> String {
    DateTime::<Utc>::from(t).format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub(crate) fn systemtime_to_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

pub(crate) fn secs_to_systemtime(secs: u64) -> SystemTime {
    UNIX_EPOCH + std::time::Duration::from_secs(secs)
}

/// Entity tag: checksum over the href followed by the decimal
/// modification time in seconds.
pub(crate) fn etag(href: &str, modified: SystemTime) -> String {
    let mut scratch = href.as_bytes().to_vec();
    scratch.extend_from_slice(systemtime_to_secs(modified).to_string().as_bytes());
    format!("{:08x}", checksum(&scratch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_httpdate() {
        assert_eq!(systemtime_to_httpdate(UNIX_EPOCH), "Thu, 01 Jan 1970 00:00:00 GMT");
        assert_eq!(
            systemtime_to_httpdate(secs_to_systemtime(312768000)),
            "Fri, 30 Nov 1979 00:00:00 GMT"
        );
        assert_eq!(
            systemtime_to_httpdate(secs_to_systemtime(1459526860)),
            "Fri, 01 Apr 2016 16:07:40 GMT"
        );
    }

    #[test]
    fn test_etag() {
        let t = secs_to_systemtime(1000);
        assert_eq!(etag("/a", t), format!("{:08x}", checksum(b"/a1000")));
        assert_eq!(etag("/a", t).len(), 8);
        assert_ne!(etag("/a", t), etag("/b", t));
    }

    #[test]
    fn test_dav_method() {
        let m = http::Method::from_bytes(b"PROPFIND").unwrap();
        assert_eq!(dav_method(&m).unwrap(), DavMethod::PropFind);
        let m = http::Method::from_bytes(b"BREW").unwrap();
        assert!(dav_method(&m).is_err());
    }
}
