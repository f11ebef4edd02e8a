//! Fake locksystem (to make Windows/macOS work).
//!
//! Several Webdav clients, like the ones on Windows and macOS, require just
//! basic functionality to mount the Webdav server in read-only mode. However
//! to be able to mount the Webdav server in read-write mode, they require the
//! Webdav server to have Webdav class 2 compliance - that means, LOCK/UNLOCK
//! support.
//!
//! In many cases, this is not actually important. A lot of the current Webdav
//! server implementations that are used to serve a filesystem just fake it:
//! LOCK/UNLOCK always succeed, checking for locktokens in
//! If: headers always succeeds, and nothing is every really locked.
//!
//! `FakeLs` implements such a fake locksystem.
use crate::ls::*;

/// Fake locksystem implementation.
#[derive(Debug, Clone, Default)]
pub struct FakeLs {}

impl FakeLs {
    /// Create a new "fakels" locksystem.
    pub fn new() -> Box<FakeLs> {
        Box::new(FakeLs {})
    }
}

impl DavLockSystem for FakeLs {
    fn acquire(&self, path_hash: u32, owner_hash: u32) -> Result<LockOutcome, LockError> {
        debug!("fake lock {}", LockToken { path_hash, owner_hash });
        Ok(LockOutcome::Created)
    }

    fn release(&self, _path_hash: u32, _owner_hash: u32) -> Result<(), LockError> {
        Ok(())
    }

    fn query(&self, _path_hash: u32) -> Option<u32> {
        None
    }
}
