//! Utility module to handle the path part of an URL as a filesytem path.
//!
use std::error::Error;
use std::ffi::OsStr;
#[cfg(unix)]
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use percent_encoding as pct;

use crate::DavError;

/// Path information relative to a prefix.
///
/// The path is always percent-decoded and normalized: a single leading
/// slash, no runs of slashes, no trailing slash (except for the root,
/// which is `/`), and no `.` or `..` segments.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DavPath {
    pub(crate) path: Vec<u8>,
    pub(crate) prefix: Vec<u8>,
}

// Encode all non-unreserved characters, except '/'.
// See RFC3986, and https://en.wikipedia.org/wiki/Percent-encoding .
const PATH_ENCODE_SET: &pct::AsciiSet = &pct::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

impl std::fmt::Display for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.with_prefix()))
    }
}

impl std::fmt::Debug for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.with_prefix()))
    }
}

/// Error returned by some of the DavPath methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// cannot parse
    InvalidPath,
    /// outside of prefix
    IllegalPath,
}

impl Error for ParseError {}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<ParseError> for DavError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::InvalidPath => DavError::InvalidPath,
            ParseError::IllegalPath => DavError::IllegalPath,
        }
    }
}

/// Collapse every run of slashes into one, make sure there is exactly
/// one leading slash, and strip the trailing slash unless the result
/// is the root. `.` segments are dropped and `..` removes the previous
/// segment; a `..` above the root is an error.
pub fn normalize(src: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut segs: Vec<&[u8]> = Vec::new();
    for seg in src.split(|&c| c == b'/') {
        match seg {
            b"" | b"." => {},
            b".." => {
                if segs.pop().is_none() {
                    return Err(ParseError::InvalidPath);
                }
            },
            s => segs.push(s),
        }
    }
    let mut out = Vec::with_capacity(src.len() + 1);
    for seg in &segs {
        out.push(b'/');
        out.extend_from_slice(seg);
    }
    if out.is_empty() {
        out.push(b'/');
    }
    Ok(out)
}

// percent-decode, then normalize. NUL bytes are never valid.
fn decode_path(raw: &str) -> Result<Vec<u8>, ParseError> {
    let decoded: Vec<u8> = pct::percent_decode(raw.as_bytes()).collect();
    if decoded.contains(&0) {
        return Err(ParseError::InvalidPath);
    }
    normalize(&decoded)
}

// strip query and fragment.
fn strip_query(raw: &str) -> &str {
    match raw.find(['?', '#']) {
        Some(pos) => &raw[..pos],
        None => raw,
    }
}

impl DavPath {
    /// Create a path from an (optionally percent-encoded) string, without a prefix.
    pub fn new(src: &str) -> Result<DavPath, ParseError> {
        Ok(DavPath {
            path: decode_path(strip_query(src))?,
            prefix: Vec::new(),
        })
    }

    // Split a decoded, normalized full path into prefix and remainder.
    fn from_full_path(full: Vec<u8>, prefix: &str) -> Result<DavPath, ParseError> {
        let prefix = match normalize(prefix.as_bytes())? {
            p if p == b"/" => Vec::new(),
            p => p,
        };
        if prefix.is_empty() {
            return Ok(DavPath { path: full, prefix });
        }
        if !full.starts_with(&prefix) {
            return Err(ParseError::IllegalPath);
        }
        let rest = &full[prefix.len()..];
        let path = match rest {
            b"" => b"/".to_vec(),
            r if r[0] == b'/' => r.to_vec(),
            _ => return Err(ParseError::IllegalPath),
        };
        Ok(DavPath { path, prefix })
    }

    /// From the request target of the request line. Absolute-form targets
    /// (`http://host/path`) are accepted as well.
    pub(crate) fn from_request_target(target: &str, prefix: &str) -> Result<DavPath, ParseError> {
        let target = strip_query(target);
        let raw = match url_path(target) {
            Some(p) => p,
            None => target.to_string(),
        };
        DavPath::from_full_path(decode_path(&raw)?, prefix)
    }

    /// From a `Destination:` header that may be an absolute URL.
    /// The scheme and host are stripped, the rest is handled as a request path.
    pub(crate) fn from_url(dest: &str, prefix: &str) -> Result<DavPath, ParseError> {
        DavPath::from_request_target(dest, prefix)
    }

    /// From a `Destination:` header, locating the start of the path by
    /// skipping past the third slash (`scheme://host/`). Returns the path
    /// and whether the destination ended in a slash.
    pub(crate) fn from_destination_slashes(dest: &str, prefix: &str) -> Result<(DavPath, bool), ParseError> {
        let dest = strip_query(dest);
        let raw = if dest.starts_with('/') {
            dest
        } else {
            match dest.match_indices('/').nth(2) {
                Some((idx, _)) => &dest[idx..],
                None => return Err(ParseError::InvalidPath),
            }
        };
        let trailing = raw.len() > 1 && raw.ends_with('/');
        let path = DavPath::from_full_path(decode_path(raw)?, prefix)?;
        Ok((path, trailing))
    }

    /// Is this the root of the DAV tree.
    pub fn is_root(&self) -> bool {
        self.path == b"/"
    }

    /// The path without the prefix, as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.path
    }

    /// The path including the prefix, as bytes.
    pub fn with_prefix(&self) -> Vec<u8> {
        if self.prefix.is_empty() {
            return self.path.clone();
        }
        let mut p = self.prefix.clone();
        if !self.is_root() {
            p.extend_from_slice(&self.path);
        }
        p
    }

    /// Percent-encoded path including the prefix, for use in hrefs.
    pub fn as_url_string(&self) -> String {
        pct::percent_encode(&self.with_prefix(), PATH_ENCODE_SET).to_string()
    }

    /// Key used for lock hashing: the path with the leading slash removed.
    /// The root maps to the empty key.
    pub fn lock_key(&self) -> &[u8] {
        &self.path[1..]
    }

    /// Relative path for the local filesystem, without the leading slash.
    #[cfg(unix)]
    pub fn as_rel_ospath(&self) -> &Path {
        Path::new(OsStr::from_bytes(self.lock_key()))
    }

    /// The last segment. Empty for the root.
    pub fn file_name(&self) -> &[u8] {
        let p = &self.path;
        match p.iter().rposition(|&c| c == b'/') {
            Some(idx) => &p[idx + 1..],
            None => p,
        }
    }

    /// The parent of this path. The parent of the root is the root.
    pub fn parent(&self) -> DavPath {
        let idx = self.path.iter().rposition(|&c| c == b'/').unwrap_or(0);
        let path = if idx == 0 { b"/".to_vec() } else { self.path[..idx].to_vec() };
        DavPath {
            path,
            prefix: self.prefix.clone(),
        }
    }

    /// A child of this path.
    pub fn join(&self, name: &[u8]) -> DavPath {
        let mut path = self.path.clone();
        if !self.is_root() {
            path.push(b'/');
        }
        path.extend(name.iter().filter(|&&c| c != b'/'));
        DavPath {
            path,
            prefix: self.prefix.clone(),
        }
    }

    /// Guess the mime type from the extension. For gzipped files
    /// (`name.ext.gz`) the type of the inner file is returned.
    pub fn mime_type(&self) -> &'static str {
        let name = String::from_utf8_lossy(self.file_name()).into_owned();
        if let Some(stem) = name.strip_suffix(".gz") {
            return mime_guess::from_path(stem)
                .first_raw()
                .unwrap_or("application/x-gzip");
        }
        mime_guess::from_path(name).first_raw().unwrap_or("application/octet-stream")
    }

    /// Shorten the last segment to at most `max` bytes, cutting from the
    /// stem and keeping the extension.
    pub fn sanitize(&self, max: usize) -> DavPath {
        let name = self.file_name();
        if name.len() <= max {
            return self.clone();
        }
        let ext = match name.iter().rposition(|&c| c == b'.') {
            Some(idx) if idx > 0 && name.len() - idx < max => &name[idx..],
            _ => &b""[..],
        };
        let mut keep = max - ext.len();
        // don't cut an UTF-8 sequence in half.
        while keep > 0 && (name[keep] & 0xc0) == 0x80 {
            keep -= 1;
        }
        let mut new_name = name[..keep].to_vec();
        new_name.extend_from_slice(ext);
        debug!("sanitize: {:?} -> {:?}", String::from_utf8_lossy(name), String::from_utf8_lossy(&new_name));
        self.parent().join(&new_name)
    }
}

// If this is an absolute URL, return its (still encoded) path.
fn url_path(s: &str) -> Option<String> {
    if !s.starts_with("http://") && !s.starts_with("https://") {
        return None;
    }
    url::Url::parse(s).ok().map(|u| u.path().to_string())
}
