//! Placeholder filesystem. Returns FsError::NotImplemented on every method.
//!
//! This is what a `DavHandler` uses when no filesystem was configured.
//! In that state only `OPTIONS` is answered.

use crate::davpath::DavPath;
use crate::fs::*;

/// Placeholder filesystem.
#[derive(Debug, Clone)]
pub struct VoidFs;

impl VoidFs {
    pub fn new() -> Box<VoidFs> {
        Box::new(VoidFs)
    }
}

impl DavFileSystem for VoidFs {
    fn metadata<'a>(&'a self, _path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        Box::pin(async { Err(FsError::NotImplemented) })
    }

    fn read_dir<'a>(&'a self, _path: &'a DavPath) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        Box::pin(async { Err(FsError::NotImplemented) })
    }

    fn open<'a>(&'a self, _path: &'a DavPath, _options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        Box::pin(async { Err(FsError::NotImplemented) })
    }
}
