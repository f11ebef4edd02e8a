//! Contains the structs and traits that define a `locksystem` backend.
//!
//! Locks are advisory, exclusive, write locks of infinite depth that
//! never expire. A lock is identified by two 32-bit checksums: one over
//! the normalized path (without its leading slash) and one over the
//! identity of the owner. The locksystem itself only stores the mapping
//! from path hash to owner hash.
//!
//! Note that the methods DO NOT return futures, they are synchronous.
//! None of the locksystems do any I/O, all methods return instantly.
//!
use std::fmt::{self, Debug};

use dyn_clone::{DynClone, clone_trait_object};

use crate::davpath::DavPath;

/// Result of a successful `acquire`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// New lock entry.
    Created,
    /// The owner already held this lock.
    Relocked,
}

/// Why a lock operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// Locked by another owner.
    Locked,
    /// There is no lock to release.
    NotLocked,
}

/// The trait that defines a locksystem.
pub trait DavLockSystem: Debug + Send + Sync + DynClone {
    /// Lock the path. Succeeds if there was no lock yet, or if the
    /// existing lock has the same owner.
    fn acquire(&self, path_hash: u32, owner_hash: u32) -> Result<LockOutcome, LockError>;

    /// Remove a lock. The owner must match.
    fn release(&self, path_hash: u32, owner_hash: u32) -> Result<(), LockError>;

    /// Return the owner of the lock on this path, if any.
    fn query(&self, path_hash: u32) -> Option<u32>;
}

clone_trait_object! {DavLockSystem}

/// Checksum used for lock identities (and etags).
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// The lock table key for a path.
pub fn path_hash(path: &DavPath) -> u32 {
    checksum(path.lock_key())
}

/// The token that identifies a lock on the wire: the 8-hex-digit path
/// hash followed by the 8-hex-digit owner hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockToken {
    pub path_hash: u32,
    pub owner_hash: u32,
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:08x}{:08x}", self.path_hash, self.owner_hash)
    }
}

impl LockToken {
    /// Decode a token. The last 8 characters are the owner hash,
    /// anything before that is the path hash.
    pub fn parse(s: &str) -> Option<LockToken> {
        if s.is_empty() || s.len() > 16 || !s.bytes().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let split = s.len().saturating_sub(8);
        let path_hash = match &s[..split] {
            "" => 0,
            p => u32::from_str_radix(p, 16).ok()?,
        };
        let owner_hash = u32::from_str_radix(&s[split..], 16).ok()?;
        Some(LockToken { path_hash, owner_hash })
    }

    /// Find a token between `start` and `end` markers in a header value.
    pub fn extract(header: &str, start: &str, end: &str) -> Option<LockToken> {
        let from = header.find(start)? + start.len();
        let len = header[from..].find(end)?;
        LockToken::parse(&header[from..from + len])
    }
}

/// Checksum over the contents of the first `owner` element in a
/// LOCK request body, with or without a namespace prefix.
/// Returns 0 if there is no owner element.
pub fn owner_from_body(body: &[u8]) -> u32 {
    fn find(hay: &[u8], needle: &[u8], from: usize) -> Option<usize> {
        hay.get(from..)?
            .windows(needle.len())
            .position(|w| w == needle)
            .map(|p| p + from)
    }
    let mut pos = 0;
    while let Some(idx) = find(body, b"owner>", pos) {
        pos = idx + 6;
        // walk back to the '<' that opens this tag.
        let tag_start = match body[..idx].iter().rposition(|&c| c == b'<') {
            Some(s) => s,
            None => continue,
        };
        let name = &body[tag_start + 1..idx];
        if name.first() == Some(&b'/') || !(name.is_empty() || name.ends_with(b":")) {
            continue;
        }
        if name.iter().any(|c| c.is_ascii_whitespace()) {
            continue;
        }
        let close: Vec<u8> = [&b"</"[..], name, &b"owner>"[..]].concat();
        return match find(body, &close, pos) {
            Some(end) => checksum(&body[pos..end]),
            None => 0,
        };
    }
    0
}

/// Work out who is asking: the owner half of the token in the `If:`
/// header, or else a checksum over the `owner` element of the body.
/// 0 means "no usable owner".
pub fn request_owner(if_header: Option<&str>, body: &[u8]) -> u32 {
    match if_header {
        Some(h) => LockToken::extract(h, "(<", ">").map(|t| t.owner_hash).unwrap_or(0),
        None => owner_from_body(body),
    }
}

/// Walk up from `path` to the root, and find the first lock. If there is
/// one, it must be owned by `owner`. Owner 0 never matches a lock.
pub fn check_allowed(ls: &dyn DavLockSystem, path: &DavPath, owner: u32) -> Result<(), LockError> {
    let mut key = path.lock_key();
    loop {
        if let Some(lock_owner) = ls.query(checksum(key)) {
            trace!(
                "lock: found lock on {:?}, {}owner",
                String::from_utf8_lossy(key),
                if lock_owner == owner && owner != 0 { "" } else { "not " }
            );
            return if lock_owner == owner && owner != 0 {
                Ok(())
            } else {
                Err(LockError::Locked)
            };
        }
        if key.is_empty() {
            return Ok(());
        }
        key = match key.iter().rposition(|&c| c == b'/') {
            Some(idx) => &key[..idx],
            None => &b""[..],
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        for (p, o) in [(0u32, 0u32), (1, 0xffffffff), (0xdeadbeef, 0x0000abcd), (0x10, 0x20)] {
            let t = LockToken { path_hash: p, owner_hash: o };
            let s = t.to_string();
            assert_eq!(s.len(), 16);
            assert_eq!(LockToken::parse(&s), Some(t));
        }
    }

    #[test]
    fn test_token_short() {
        let t = LockToken::parse("abc00000001").unwrap();
        assert_eq!(t.path_hash, 0xabc);
        assert_eq!(t.owner_hash, 1);
        let t = LockToken::parse("ff").unwrap();
        assert_eq!(t.path_hash, 0);
        assert_eq!(t.owner_hash, 0xff);
        assert_eq!(LockToken::parse(""), None);
        assert_eq!(LockToken::parse("00000000000000001"), None);
        assert_eq!(LockToken::parse("zz"), None);
    }

    #[test]
    fn test_extract() {
        let t = LockToken::extract("(<0000000100000002>)", "(<", ">").unwrap();
        assert_eq!(t, LockToken { path_hash: 1, owner_hash: 2 });
        assert_eq!(LockToken::extract("<0000000100000002", "<", ">"), None);
    }

    #[test]
    fn test_owner_from_body() {
        let body = br#"<D:lockinfo xmlns:D="DAV:"><D:owner><D:href>me</D:href></D:owner></D:lockinfo>"#;
        assert_eq!(owner_from_body(body), checksum(b"<D:href>me</D:href>"));
        assert_eq!(owner_from_body(b"<owner>me</owner>"), checksum(b"me"));
        assert_eq!(owner_from_body(b"<lockinfo/>"), 0);
    }

    #[test]
    fn test_request_owner() {
        assert_eq!(request_owner(Some("(<0000000100000002>)"), b"<owner>x</owner>"), 2);
        assert_eq!(request_owner(None, b"<owner>x</owner>"), checksum(b"x"));
        assert_eq!(request_owner(Some("garbage"), b""), 0);
    }
}
