//! Contains the structs and traits that define a filesystem backend.
//!
//! You only need this if you are going to implement your own
//! filesystem backend. Otherwise, just use `LocalFs` or `MemFs`.
//!
use std::fmt::Debug;
use std::io::SeekFrom;
use std::pin::Pin;
use std::time::SystemTime;

use bytes::Bytes;
use dyn_clone::{DynClone, clone_trait_object};
use futures_util::{Stream, future::BoxFuture};

use crate::davpath::DavPath;

macro_rules! notimplemented {
    ($method:expr) => {
        Box::pin(async {
            trace!("FS: {} not implemented", $method);
            Err(FsError::NotImplemented)
        })
    };
}

/// Errors generated by a filesystem implementation.
///
/// These are more result-codes than errors, really.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Operation not implemented (501)
    NotImplemented,
    /// Something went wrong (500)
    GeneralFailure,
    /// tried to create something, but it existed (405 / 412)
    Exists,
    /// File / Directory not found (404)
    NotFound,
    /// Not allowed (403)
    Forbidden,
    /// Out of space (507)
    InsufficientStorage,
    /// Name or path too long (414)
    PathTooLong,
    /// File too large (413)
    TooLarge,
}

/// The Result type.
pub type FsResult<T> = std::result::Result<T, FsError>;

/// Future returned by almost all of the DavFileSystem methods.
pub type FsFuture<'a, T> = BoxFuture<'a, FsResult<T>>;

/// Convenience alias for a boxed Stream.
pub type FsStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// The trait that defines a filesystem.
///
/// Paths handed to the filesystem are always normalized: they start with
/// a single slash, have no repeated slashes and no trailing slash
/// (except for the root, which is `/`).
pub trait DavFileSystem: Send + Sync + DynClone {
    /// Open a file.
    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>>;

    /// Lists entries within a directory. Implementations must return
    /// the entries in a stable order.
    fn read_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>>;

    /// Return the metadata of a file or directory.
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>>;

    /// Create a directory.
    ///
    /// The default implementation returns `FsError::NotImplemented`.
    #[allow(unused_variables)]
    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        notimplemented!("create_dir")
    }

    /// Remove a directory. Fails if the directory is not empty.
    ///
    /// The default implementation returns `FsError::NotImplemented`.
    #[allow(unused_variables)]
    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        notimplemented!("remove_dir")
    }

    /// Remove a file.
    ///
    /// The default implementation returns `FsError::NotImplemented`.
    #[allow(unused_variables)]
    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        notimplemented!("remove_file")
    }

    /// Rename a file or directory. The destination must not exist.
    ///
    /// The default implementation returns `FsError::NotImplemented`.
    #[allow(unused_variables)]
    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        notimplemented!("rename")
    }

    /// Get the disk usage of the filesystem: (used, total).
    ///
    /// The default implementation returns `FsError::NotImplemented`,
    /// which is reported to clients as zero usage.
    fn get_quota(&self) -> FsFuture<'_, (u64, Option<u64>)> {
        notimplemented!("get_quota")
    }

    /// Maximum length of a single path segment, if the store has one.
    fn max_name_len(&self) -> Option<usize> {
        None
    }
}

clone_trait_object! {DavFileSystem}

/// One directory entry (or child node).
pub trait DavDirEntry: Send + Sync {
    /// Name of the entry.
    fn name(&self) -> Vec<u8>;

    /// Metadata of the entry.
    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>>;

    /// Default implementation of `is_dir` just returns `metadata()?.is_dir()`.
    /// Implementations can override this if their `metadata()` method is
    /// expensive and there is a cheaper way to provide the same info.
    fn is_dir(&self) -> FsFuture<'_, bool> {
        Box::pin(async move { self.metadata().await.map(|m| m.is_dir()) })
    }
}

/// A `DavFile` is the equivalent of `std::fs::File`, should be
/// readable/writeable/seekable.
pub trait DavFile: Debug + Send + Sync {
    fn metadata(&mut self) -> FsFuture<'_, Box<dyn DavMetaData>>;
    /// Write bytes, returns how many were actually written. Anything
    /// less than `buf.len()` is a short write.
    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, usize>;
    /// Read at most `count` bytes. An empty result means end-of-file.
    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes>;
    fn seek(&mut self, pos: SeekFrom) -> FsFuture<'_, u64>;
    fn flush(&mut self) -> FsFuture<'_, ()>;
}

/// File metadata. Basically type, length, and some timestamps.
pub trait DavMetaData: Debug + Send + Sync + DynClone {
    /// Size of the file.
    fn len(&self) -> u64;
    /// `Modified` timestamp.
    fn modified(&self) -> FsResult<SystemTime>;
    /// File or directory (aka collection).
    fn is_dir(&self) -> bool;

    /// Is this a file and not a directory. Default: `!is_dir()`.
    fn is_file(&self) -> bool {
        !self.is_dir()
    }

    /// Creation time. Default: not implemented.
    fn created(&self) -> FsResult<SystemTime> {
        Err(FsError::NotImplemented)
    }

    /// Is the file empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

clone_trait_object! {DavMetaData}

/// OpenOptions for `open()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// open for reading
    pub read: bool,
    /// open for writing
    pub write: bool,
    /// open in write-append mode
    pub append: bool,
    /// truncate file first when writing
    pub truncate: bool,
    /// create file if it doesn't exist
    pub create: bool,
    /// must create new file, fail if it already exists.
    pub create_new: bool,
}

impl OpenOptions {
    /// Open for reading.
    pub fn read() -> OpenOptions {
        OpenOptions {
            read: true,
            ..OpenOptions::default()
        }
    }

    /// Open for writing: create the file if needed, and truncate it.
    pub fn write() -> OpenOptions {
        OpenOptions {
            write: true,
            create: true,
            truncate: true,
            ..OpenOptions::default()
        }
    }

    /// Open for appending, create the file if needed.
    pub fn append() -> OpenOptions {
        OpenOptions {
            write: true,
            append: true,
            create: true,
            ..OpenOptions::default()
        }
    }
}

impl std::error::Error for FsError {}

impl std::fmt::Display for FsError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

