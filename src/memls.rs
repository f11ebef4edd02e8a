//! Simple in-memory locksystem.
//!
//! This implementation has state - if you create a
//! new instance in a handler(), it will be empty every time.
//!
//! This means you have to create the instance once, using `MemLs::new`, store
//! it in your handler struct, and clone() it every time you pass
//! it to the DavHandler. As a MemLs struct is just a handle, cloning is cheap.
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ls::*;

/// Ephemeral in-memory LockSystem.
#[derive(Debug, Clone, Default)]
pub struct MemLs(Arc<Mutex<HashMap<u32, u32>>>);

impl MemLs {
    /// Create a new "memls" locksystem.
    pub fn new() -> Box<MemLs> {
        Box::new(MemLs::default())
    }

    /// Number of live locks.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// No live locks at all.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

impl DavLockSystem for MemLs {
    fn acquire(&self, path_hash: u32, owner_hash: u32) -> Result<LockOutcome, LockError> {
        let locks = &mut *self.0.lock();
        match locks.get(&path_hash) {
            None => {
                locks.insert(path_hash, owner_hash);
                trace!("lock {} created", LockToken { path_hash, owner_hash });
                Ok(LockOutcome::Created)
            },
            Some(&owner) if owner == owner_hash => {
                trace!("lock {} relocked", LockToken { path_hash, owner_hash });
                Ok(LockOutcome::Relocked)
            },
            Some(&owner) => {
                debug!("cannot relock {:08x}: owner {:08x} != {:08x}", path_hash, owner, owner_hash);
                Err(LockError::Locked)
            },
        }
    }

    fn release(&self, path_hash: u32, owner_hash: u32) -> Result<(), LockError> {
        let locks = &mut *self.0.lock();
        match locks.get(&path_hash) {
            None => {
                trace!("unlock: {:08x} was not locked", path_hash);
                Err(LockError::NotLocked)
            },
            Some(&owner) if owner != owner_hash => {
                debug!("unlock: bad owner {:08x} != {:08x}", owner_hash, owner);
                Err(LockError::Locked)
            },
            Some(_) => {
                locks.remove(&path_hash);
                Ok(())
            },
        }
    }

    fn query(&self, path_hash: u32) -> Option<u32> {
        self.0.lock().get(&path_hash).copied()
    }
}
